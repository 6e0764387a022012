//! Pluggable source loading (spec.md §6). The core import-resolution
//! algorithm (directory-walking rules) lives in `parser::import`; actual
//! filesystem access is abstracted behind this trait so the algorithm is
//! testable without touching disk. A thin `std::fs`-backed default
//! implementation is provided for the (out-of-scope) CLI to wire up.

use std::path::{Path, PathBuf};

/// Where to find `.oc` source files and directories for import resolution.
pub trait FileLoader {
  fn is_dir(&self, path: &Path) -> bool;
  fn is_file(&self, path: &Path) -> bool;
  /// Read a file's full contents as UTF-8 (spec.md §6: files are slurped
  /// as UTF-8 bytes; only ASCII is lexically significant).
  fn read_to_string(&self, path: &Path) -> Result<String, String>;
}

/// The default, real-filesystem loader. Not exercised by this crate's own
/// tests (those use `MemoryLoader`); provided for the CLI collaborator.
#[derive(Default)]
pub struct FsLoader;

impl FileLoader for FsLoader {
  fn is_dir(&self, path: &Path) -> bool { path.is_dir() }
  fn is_file(&self, path: &Path) -> bool { path.is_file() }
  fn read_to_string(&self, path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| e.to_string())
  }
}

/// An in-memory loader for tests: a fixed map of paths to either a
/// directory marker or file content.
#[derive(Default, Clone)]
pub struct MemoryLoader {
  files: hashbrown::HashMap<PathBuf, String>,
  dirs: hashbrown::HashSet<PathBuf>,
}

impl MemoryLoader {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn add_file(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> &mut Self {
    let path = path.into();
    if let Some(parent) = path.parent() {
      self.dirs.insert(parent.to_path_buf());
    }
    self.files.insert(path, content.into());
    self
  }

  pub fn add_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
    self.dirs.insert(path.into());
    self
  }
}

impl FileLoader for MemoryLoader {
  fn is_dir(&self, path: &Path) -> bool { self.dirs.contains(path) }
  fn is_file(&self, path: &Path) -> bool { self.files.contains_key(path) }
  fn read_to_string(&self, path: &Path) -> Result<String, String> {
    self.files.get(path).cloned().ok_or_else(|| format!("no such file: {}", path.display()))
  }
}
