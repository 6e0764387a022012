//! End-to-end pipeline tests: source text through `check` (RegisterTypes,
//! TypeChecker, ReorderStructs) and, where relevant, `TextCodeGen`. These
//! exercise the concrete scenarios spec.md §8 calls out, plus the
//! multi-file import graph, using a real temporary directory so the
//! filesystem-backed `FsLoader`/import-resolution path gets covered too
//! (unit tests elsewhere in the crate stick to `MemoryLoader`).

use std::path::PathBuf;

use ocenc_core::codegen::{CodeGen, TextCodeGen};
use ocenc_core::loader::{FileLoader, FsLoader};
use ocenc_core::parser::load_file;
use ocenc_core::program::CompileOptions;
use ocenc_core::{check, Program};

fn compile_memory(src: &str) -> Program {
  let mut loader = ocenc_core::loader::MemoryLoader::new();
  loader.add_file("main.oc", src);
  let mut prog = Program::new(CompileOptions::default());
  let global = prog.global;
  load_file(&mut prog, &loader, PathBuf::new(), PathBuf::new(), "main.oc".into(), global, true);
  check(&mut prog);
  prog
}

#[test]
fn scenario_1_main_returning_an_addition_typechecks_and_emits() {
  let prog = compile_memory("def main(): i32 { return 1 + 2 }");
  assert!(!prog.has_errors(), "{}", prog.render_errors());
  let mut gen = TextCodeGen::new();
  let out = gen.emit(&prog).expect("codegen");
  assert!(out.contains("1 + 2"), "generated C should contain the literal addition:\n{out}");
  assert!(out.contains("main"), "generated C should declare main:\n{out}");
}

#[test]
fn scenario_2_templated_struct_instantiates_once_per_argument_list() {
  let prog = compile_memory("struct P<T> { x: T, y: T }\ndef main() { let a: P<i32> = 0 }");
  assert!(!prog.has_errors(), "{}", prog.render_errors());
  // Exactly one instantiation of P, with fields resolved to i32, and the
  // template itself never appears in emission order.
  assert_eq!(prog.ordered_structs.len(), 1);
  let inst = prog.structs[prog.ordered_structs[0]].clone();
  assert!(inst.fields.iter().all(|f| matches!(f.ty, ocenc_core::types::ty::Type::Scalar(ocenc_core::types::ty::Scalar::I32))));
}

#[test]
fn scenario_3_exhaustive_enum_match_accepted_nonexhaustive_rejected() {
  let ok = compile_memory(
    "enum C { A, B }\ndef f(c: C): str => match c { C::A => \"a\", C::B => \"b\" }",
  );
  assert!(!ok.has_errors(), "{}", ok.render_errors());

  let bad = compile_memory(
    "enum C { A, B }\ndef f(c: C): str => match c { C::A => \"a\" }",
  );
  assert!(bad.has_errors(), "non-exhaustive enum match without else should be rejected");
}

#[test]
fn scenario_4_const_expression_resolves_and_is_usable_outside_const_context() {
  let prog = compile_memory("const K: u32 = 3 + 4\ndef main(): u32 { return K + 1 }");
  assert!(!prog.has_errors(), "{}", prog.render_errors());
}

#[test]
fn scenario_5_format_string_yields_str_with_one_interpolation() {
  let prog = compile_memory("def main() { let s: str = f\"x={1 + 2}\" }");
  assert!(!prog.has_errors(), "{}", prog.render_errors());
}

#[test]
fn scenario_6_missing_import_path_is_a_diagnostic() {
  let prog = compile_memory("import some_missing::thing\ndef main() {}");
  assert!(prog.has_errors());
}

#[test]
fn p9_struct_dependency_order_places_field_types_before_their_containers() {
  let prog = compile_memory("struct Inner { x: i32 }\nstruct Outer { a: Inner, b: i32 }");
  assert!(!prog.has_errors(), "{}", prog.render_errors());
  let positions: Vec<&str> = prog.ordered_structs.iter()
    .map(|&id| prog.symbols[prog.structs[id].symbol].name.as_str())
    .collect();
  let inner_pos = positions.iter().position(|&n| n == "Inner").expect("Inner in order");
  let outer_pos = positions.iter().position(|&n| n == "Outer").expect("Outer in order");
  assert!(inner_pos < outer_pos, "Inner must be emitted before Outer: {positions:?}");
}

#[test]
fn p5_no_two_non_extern_symbols_share_an_out_name() {
  let prog = compile_memory(
    "struct P<T> { x: T }\ndef main() { let a: P<i32> = 0\n let b: P<u8> = 0 }",
  );
  assert!(!prog.has_errors(), "{}", prog.render_errors());
  let mut names = std::collections::HashSet::new();
  for (_, s) in prog.structs.iter_enum() {
    if s.is_templated { continue; }
    let name = prog.out_name(s.symbol);
    assert!(names.insert(name.clone()), "duplicate out_name: {name}");
  }
}

/// Covers the filesystem-backed import path (spec.md §6): `a.oc` imports
/// `b::thing`, which must resolve to `b.oc` in the same directory via the
/// real `FsLoader`, not `MemoryLoader`.
#[test]
fn multi_file_import_resolves_across_real_files() {
  let dir = tempfile::tempdir().expect("tempdir");
  let root = dir.path().to_path_buf();
  std::fs::write(root.join("b.oc"), "def helper(): i32 => 42\n").unwrap();
  std::fs::write(root.join("main.oc"), "import b::helper\ndef main(): i32 => helper()\n").unwrap();

  let loader = FsLoader;
  assert!(loader.is_file(&root.join("main.oc")));

  let mut prog = Program::new(CompileOptions::default());
  let global = prog.global;
  load_file(&mut prog, &loader, root.clone(), root, "main.oc".into(), global, true);
  check(&mut prog);
  assert!(!prog.has_errors(), "{}", prog.render_errors());
}
