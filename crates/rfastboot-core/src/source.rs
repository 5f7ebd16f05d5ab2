//! Image sources
//!
//! An image source hands out image files by name (`boot.img`,
//! `super_empty.img`, ...). Absence is not an error: optional images and the
//! super template are simply skipped when missing.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Provider of image files
pub trait ImageSource {
    /// Read the named image, or `None` if the source does not have it
    fn open(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Whether the named image exists
    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.open(name)?.is_some())
    }
}

/// Images read from a directory on the host (a "product out" directory)
///
/// Absolute names bypass the directory, so explicit paths given on the
/// command line work through the same source.
#[derive(Debug, Clone)]
pub struct DirImageSource {
    root: PathBuf,
}

impl DirImageSource {
    /// Create a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory images are read from
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl ImageSource for DirImageSource {
    fn open(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(name);
        match std::fs::read(&path) {
            Ok(data) => {
                log::debug!("Read {} bytes from {}", data.len(), path.display());
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.path(name).is_file())
    }
}

/// Images held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    images: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an image
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.images.insert(name.into(), data.into());
    }

    /// Builder-style [`Self::insert`]
    pub fn with(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(name, data);
        self
    }
}

impl ImageSource for MemorySource {
    fn open(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.images.get(name).cloned())
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.images.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new().with("boot.img", vec![1, 2, 3]);
        assert_eq!(source.open("boot.img").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(source.open("system.img").unwrap(), None);
        assert!(source.contains("boot.img").unwrap());
    }

    #[test]
    fn test_dir_source_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vendor.img"), b"vendor").unwrap();

        let source = DirImageSource::new(dir.path());
        assert_eq!(source.open("vendor.img").unwrap(), Some(b"vendor".to_vec()));
        assert_eq!(source.open("odm.img").unwrap(), None);
        assert!(!source.contains("odm.img").unwrap());
    }

    #[test]
    fn test_dir_source_absolute_name_bypasses_root() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let image = other.path().join("boot.img");
        std::fs::write(&image, b"boot").unwrap();

        let source = DirImageSource::new(dir.path());
        let name = image.to_string_lossy().into_owned();
        assert_eq!(source.open(&name).unwrap(), Some(b"boot".to_vec()));
    }
}
