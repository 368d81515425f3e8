//! Working directory layout.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const BITMAP_SUBDIR: &str = "bitmaps";
pub const FONT_SUBDIR: &str = "fonts";
pub const STREAM_CONTENTS_SUBDIR: &str = "_contents";
pub const PRIVATE_DATA_FILE: &str = "_private.ai";
pub const MANIFEST_FILE: &str = "source.json";

/// Directory that receives `source.json` and the sidecar files of one run.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh uniquely named directory `<base>_XXXXXX` under
    /// `parent`, or under the system temp directory. The directory is kept
    /// after the process exits.
    pub fn create(parent: Option<&Path>, base: &str) -> Result<Self> {
        let prefix = format!("{base}_");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(Self {
            root: dir.into_path(),
        })
    }

    /// Use `root` as the working directory, creating it if needed.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subdir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn private_data_path(&self) -> PathBuf {
        self.root.join(PRIVATE_DATA_FILE)
    }
}

/// Manifest path of a sidecar: `<subdir>/<file>`.
pub fn relative(subdir: &str, file: &str) -> String {
    format!("{subdir}/{file}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_uses_base_prefix() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(parent.path()), "poster.ai").unwrap();

        let name = ws.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("poster.ai_"));
        assert!(ws.root().is_dir());
        assert_eq!(ws.manifest_path(), ws.root().join("source.json"));
    }

    #[test]
    fn test_distinct_workspaces() {
        let parent = tempfile::tempdir().unwrap();
        let a = Workspace::create(Some(parent.path()), "same").unwrap();
        let b = Workspace::create(Some(parent.path()), "same").unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_relative_paths_use_slash() {
        assert_eq!(relative(BITMAP_SUBDIR, "36.png"), "bitmaps/36.png");
        assert_eq!(relative(FONT_SUBDIR, "12.ttf"), "fonts/12.ttf");
    }
}
