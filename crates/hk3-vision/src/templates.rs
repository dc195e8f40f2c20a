use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Frame;

/// Loads reference images from disk and keeps them for the life of the process.
///
/// Entries are keyed by path and never evicted. Failed loads are cached as
/// `None` as well, so a missing file is reported once rather than every frame.
pub struct TemplateStore {
    root: PathBuf,
    cache: HashMap<PathBuf, Option<Arc<Frame>>>,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a template file named relative to the store root.
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    /// Load a template by path. Missing or unreadable files yield `None`.
    pub fn load(&mut self, path: &Path) -> Option<Arc<Frame>> {
        if let Some(entry) = self.cache.get(path) {
            return entry.clone();
        }

        let entry = match read_template(path) {
            Ok(frame) => {
                debug!(
                    "Loaded template {} ({}x{})",
                    path.display(),
                    frame.width(),
                    frame.height()
                );
                Some(Arc::new(frame))
            }
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        };
        self.cache.insert(path.to_path_buf(), entry.clone());
        entry
    }

    /// Number of cached paths, including failed loads.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

fn read_template(path: &Path) -> Result<Frame> {
    if !path.exists() {
        bail!("Template {} not found", path.display());
    }
    let img = image::open(path).with_context(|| format!("Failed to open template {}", path.display()))?;
    Ok(img.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_template_is_none_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TemplateStore::new(dir.path());
        let path = store.resolve("absent.png");

        assert!(store.load(&path).is_none());
        assert!(store.load(&path).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("close.png");
        Frame::from_pixel(12, 8, image::Rgb([255, 0, 0]))
            .save(&path)
            .unwrap();

        let mut store = TemplateStore::new(dir.path());
        let first = store.load(&path).expect("template");
        let second = store.load(&path).expect("template");

        assert_eq!(first.dimensions(), (12, 8));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_unreadable_template_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let mut store = TemplateStore::new(dir.path());
        assert!(store.load(&path).is_none());
    }
}
