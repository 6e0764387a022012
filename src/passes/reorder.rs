//! `ReorderStructs` (spec.md §4.5): collects every concrete struct —
//! template instantiations in place of the template itself — and
//! topologically sorts them by by-value field dependency (P9), so the
//! result is a valid C declaration order: forward-declare, then emit
//! bodies in `Program.ordered_structs` order.

use std::collections::HashSet;

use crate::program::Program;
use crate::types::{NamespaceId, StructId};

/// Walk the namespace tree collecting every struct that should get an
/// emitted C body: non-templated structs as-is, and each instantiation
/// of a templated one (never the template itself, which has no
/// concrete field types to emit).
fn collect_concrete(prog: &Program, ns: NamespaceId, out: &mut Vec<StructId>) {
  for &struct_id in &prog.namespaces[ns].structs {
    if prog.structs[struct_id].is_templated {
      out.extend(prog.structs[struct_id].instances.iter().map(|&(_, inst)| inst));
    } else {
      out.push(struct_id);
    }
  }
  for &child in prog.namespaces[ns].children.values() {
    collect_concrete(prog, child, out);
  }
}

/// Post-order DFS over by-value struct fields: a field behind a pointer
/// only needs a forward declaration in C, so it isn't a dependency here.
fn visit(prog: &Program, id: StructId, visited: &mut HashSet<StructId>, order: &mut Vec<StructId>) {
  if !visited.insert(id) {
    return;
  }
  for field in &prog.structs[id].fields {
    if let Some(dep) = field.ty.as_struct() {
      visit(prog, dep, visited, order);
    }
  }
  order.push(id);
}

pub fn run(prog: &mut Program) {
  let mut concrete = Vec::new();
  let global = prog.global;
  collect_concrete(prog, global, &mut concrete);

  let mut visited = HashSet::new();
  let mut order = Vec::with_capacity(concrete.len());
  for id in concrete {
    visit(prog, id, &mut visited, &mut order);
  }
  log::debug!("ReorderStructs: emitting {} concrete structs in dependency order", order.len());
  prog.ordered_structs = order;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::loader::MemoryLoader;
  use crate::parser::load_file;
  use crate::program::CompileOptions;
  use std::path::PathBuf;

  fn compile(src: &str) -> Program {
    let mut loader = MemoryLoader::new();
    loader.add_file("main.oc", src);
    let mut prog = Program::new(CompileOptions::default());
    let global = prog.global;
    load_file(&mut prog, &loader, PathBuf::new(), PathBuf::new(), "main.oc".into(), global, true);
    crate::passes::register_types::run(&mut prog);
    crate::passes::typecheck::run(&mut prog);
    run(&mut prog);
    prog
  }

  #[test]
  fn dependency_struct_is_ordered_before_dependent() {
    let prog = compile("struct Inner { x: i32 }\nstruct Outer { inner: Inner }");
    let names: Vec<_> = prog.ordered_structs.iter()
      .map(|&id| prog.symbols[prog.structs[id].symbol].name.to_string())
      .collect();
    let inner_pos = names.iter().position(|n| n.as_str() == "Inner").unwrap();
    let outer_pos = names.iter().position(|n| n.as_str() == "Outer").unwrap();
    assert!(inner_pos < outer_pos);
  }

  #[test]
  fn pointer_field_is_not_a_dependency() {
    let prog = compile("struct Node { next: &Node }");
    assert_eq!(prog.ordered_structs.len(), 1);
  }

  #[test]
  fn templated_struct_contributes_instances_not_itself() {
    let prog = compile("struct Box<T> { value: T }\nlet a: Box<i32>");
    assert_eq!(prog.ordered_structs.len(), 1);
    let id = prog.ordered_structs[0];
    assert!(!prog.structs[id].is_templated);
  }
}
