//! File access abstraction for specs, rules, maps, transform sources and
//! parameter files.
//!
//! The [`SourceProvider`] trait treats an installed configuration tree as an
//! opaque store of files, so loaders can run against the filesystem or
//! against an in-memory tree in tests.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Trait that abstracts file I/O for loaders.
pub trait SourceProvider {
    /// Read the text of a file.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Resolve a reference relative to a base directory. Absolute
    /// references are returned unchanged.
    fn resolve_relative(&self, base: &Path, reference: &str) -> Result<PathBuf, std::io::Error>;

    /// Canonicalize a path for cycle detection and cache keys.
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error>;

    /// Files directly inside `dir`, sorted by path.
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error>;

    /// Subdirectories directly inside `dir`, sorted by path.
    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error>;

    fn is_file(&self, path: &Path) -> bool;
}

/// Default filesystem-backed provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }

    fn resolve_relative(&self, base: &Path, reference: &str) -> Result<PathBuf, std::io::Error> {
        Ok(base.join(reference))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        path.canonicalize()
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory provider for tests and embedded configuration trees.
///
/// Canonicalization normalizes the path without touching the filesystem.
#[derive(Default)]
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new(files: HashMap<PathBuf, String>) -> Self {
        let files = files
            .into_iter()
            .map(|(k, v)| (Self::normalize_path(&k), v))
            .collect();
        Self { files }
    }

    /// Add or replace one file.
    pub fn with_file(mut self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.files
            .insert(Self::normalize_path(path.as_ref()), text.into());
        self
    }

    /// Resolve `.` and `..` components lexically.
    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                other => components.push(other),
            }
        }
        components.iter().collect()
    }

    fn not_found(path: &Path) -> std::io::Error {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("file not found in memory: {}", path.display()),
        )
    }
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = Self::normalize_path(path);
        self.files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| Self::not_found(&normalized))
    }

    fn resolve_relative(&self, base: &Path, reference: &str) -> Result<PathBuf, std::io::Error> {
        Ok(Self::normalize_path(&base.join(reference)))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        let normalized = Self::normalize_path(path);
        if self.files.contains_key(&normalized)
            || self.files.keys().any(|k| k.starts_with(&normalized))
        {
            Ok(normalized)
        } else {
            Err(Self::not_found(&normalized))
        }
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let dir = Self::normalize_path(dir);
        let mut files: Vec<PathBuf> = self
            .files
            .keys()
            .filter(|k| k.parent() == Some(dir.as_path()))
            .cloned()
            .collect();
        if files.is_empty() && !self.files.keys().any(|k| k.starts_with(&dir)) {
            return Err(Self::not_found(&dir));
        }
        files.sort();
        Ok(files)
    }

    /// Directories are implied by the files stored beneath them.
    fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let dir = Self::normalize_path(dir);
        let mut dirs: Vec<PathBuf> = self
            .files
            .keys()
            .filter_map(|k| k.strip_prefix(&dir).ok())
            .filter_map(|rest| {
                let mut components = rest.components();
                let first = components.next()?;
                components.next().map(|_| dir.join(first))
            })
            .collect();
        if dirs.is_empty() && !self.files.keys().any(|k| k.starts_with(&dir)) {
            return Err(Self::not_found(&dir));
        }
        dirs.sort();
        dirs.dedup();
        Ok(dirs)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&Self::normalize_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_path_resolves_dot_and_dotdot() {
        let p = Path::new("/a/b/../c/./d");
        assert_eq!(InMemoryProvider::normalize_path(p), PathBuf::from("/a/c/d"));
    }

    #[test]
    fn in_memory_read_source_not_found() {
        let provider = InMemoryProvider::default();
        let err = provider.read_source(Path::new("/missing.yaml")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn in_memory_resolve_relative_normalizes() {
        let provider = InMemoryProvider::default();
        let resolved = provider
            .resolve_relative(Path::new("/specs/sub"), "../base.yaml")
            .unwrap();
        assert_eq!(resolved, PathBuf::from("/specs/base.yaml"));
    }

    #[test]
    fn in_memory_canonicalize_existing_and_prefix() {
        let provider = InMemoryProvider::default().with_file("/a/b/spec.yaml", "x: 1");
        assert_eq!(
            provider.canonicalize(Path::new("/a/b/../b/spec.yaml")).unwrap(),
            PathBuf::from("/a/b/spec.yaml")
        );
        assert_eq!(
            provider.canonicalize(Path::new("/a")).unwrap(),
            PathBuf::from("/a")
        );
        assert!(provider.canonicalize(Path::new("/nope")).is_err());
    }

    #[test]
    fn in_memory_list_files_is_shallow_and_sorted() {
        let provider = InMemoryProvider::default()
            .with_file("/rules/b.yaml", "")
            .with_file("/rules/a.yml", "")
            .with_file("/rules/nested/c.yaml", "");
        let files = provider.list_files(Path::new("/rules")).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("/rules/a.yml"), PathBuf::from("/rules/b.yaml")]
        );
        assert!(provider.list_files(Path::new("/other")).is_err());
    }

    #[test]
    fn in_memory_list_dirs_from_file_paths() {
        let provider = InMemoryProvider::default()
            .with_file("/study/subject", "")
            .with_file("/study/3/method", "")
            .with_file("/study/3/pdata/1/visu_pars", "")
            .with_file("/study/10/acqp", "");
        assert_eq!(
            provider.list_dirs(Path::new("/study")).unwrap(),
            vec![PathBuf::from("/study/10"), PathBuf::from("/study/3")]
        );
        assert!(provider.list_dirs(Path::new("/study/3/pdata/1")).unwrap().is_empty());
        assert!(provider.list_dirs(Path::new("/none")).is_err());
    }

    #[test]
    fn filesystem_list_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.yaml"), "a: 1").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let files = FileSystemProvider.list_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("one.yaml")]);
        assert!(FileSystemProvider.is_file(&files[0]));
        let dirs = FileSystemProvider.list_dirs(dir.path()).unwrap();
        assert_eq!(dirs, vec![dir.path().join("sub")]);
    }
}
