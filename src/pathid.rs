//! Source file bookkeeping. Every loaded file gets a small integer id so line identifiers
//! stay cheap to clone, and the registry doubles as the "already included" set.
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct FileRegistry {
    files: Vec<PathBuf>,
}
impl FileRegistry {
    pub fn new() -> Self { FileRegistry { files: Vec::new() } }
    /// Returns the id of an already registered path, or registers it. Paths are compared
    /// in canonical form, so `lib.asm` and `/src/lib.asm` are the same file.
    pub fn create_id_for_path(&mut self, path: &Path) -> usize {
        self.get_id_from_path(path).unwrap_or_else(|| {
            self.files.push(canonical(path));
            self.files.len() - 1
        })
    }
    pub fn get_id_from_path(&self, path: &Path) -> Option<usize> {
        let path = canonical(path);
        self.files.iter().position(|f| *f == path)
    }
    pub fn get_path_from_id(&self, id: usize) -> Option<&Path> { self.files.get(id).map(|p| p.as_path()) }
    pub fn contains(&self, path: &Path) -> bool { self.get_id_from_path(path).is_some() }
    pub fn len(&self) -> usize { self.files.len() }
}

/// Canonical form of `path`, or the path itself if it can't be resolved.
pub fn canonical(path: &Path) -> PathBuf { path.canonicalize().unwrap_or_else(|_| path.to_path_buf()) }

/// Identifies a source line: the file it came from, its 1-based number, and the macro
/// expansion (if any) that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineId {
    pub file_id: Option<usize>,
    pub file_name: Rc<str>,
    pub line_num: usize,
    pub expansion: Option<Rc<str>>,
}
impl LineId {
    pub fn new(file_id: Option<usize>, file_name: &str, line_num: usize) -> Self {
        LineId {
            file_id,
            file_name: Rc::from(file_name),
            line_num,
            expansion: None,
        }
    }
    /// A line id for objects that don't come from a source file (predefined data, CLI symbols).
    pub fn synthetic(origin: &str) -> Self { LineId::new(None, origin, 0) }
    pub fn for_path(file_id: usize, path: &Path, line_num: usize) -> Self {
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |f| f.to_string_lossy().to_string(),
        );
        LineId::new(Some(file_id), &name, line_num)
    }
    /// Derive the id of a macro-expanded line.
    pub fn in_macro(&self, macro_name: &str, step: usize) -> Self {
        let mut id = self.clone();
        id.expansion = Some(Rc::from(format!("macro {} step {}", macro_name, step).as_str()));
        id
    }
}
impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line_num)?;
        if let Some(exp) = self.expansion.as_ref() {
            write!(f, ", {}", exp)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn registry_ids_are_stable() {
        let mut reg = FileRegistry::new();
        let a = reg.create_id_for_path(Path::new("/tmp/a.asm"));
        let b = reg.create_id_for_path(Path::new("/tmp/b.asm"));
        assert_ne!(a, b);
        assert_eq!(reg.create_id_for_path(Path::new("/tmp/a.asm")), a);
        assert!(reg.contains(Path::new("/tmp/b.asm")));
        let line = LineId::for_path(a, Path::new("/tmp/a.asm"), 12).in_macro("push2", 1);
        assert_eq!(line.to_string(), "a.asm:12, macro push2 step 1");
    }
    #[test]
    fn registry_matches_relative_and_absolute_paths() -> std::io::Result<()> {
        let mut reg = FileRegistry::new();
        let id = reg.create_id_for_path(Path::new("Cargo.toml"));
        let absolute = std::env::current_dir()?.join("Cargo.toml");
        assert!(reg.contains(&absolute));
        assert_eq!(reg.create_id_for_path(&absolute), id);
        assert!(reg.contains(Path::new("./src/../Cargo.toml")));
        Ok(())
    }
}
