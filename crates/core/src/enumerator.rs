use crate::cancel::CancelFlag;
use crate::error::TriageError;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One directory and the regular files directly inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub path: PathBuf,
    pub files: Vec<OsString>,
    pub has_subfolders: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TreeWalk {
    pub folders: Vec<FolderEntry>,
    pub skipped_subtrees: Vec<PathBuf>,
}

impl TreeWalk {
    pub fn file_count(&self) -> usize {
        self.folders.iter().map(|f| f.files.len()).sum()
    }

    /// Folders without any subfolder, in traversal order.
    pub fn leaf_folders(&self) -> Vec<PathBuf> {
        self.folders
            .iter()
            .filter(|f| !f.has_subfolders)
            .map(|f| f.path.clone())
            .collect()
    }
}

/// Pre-order walk, entries sorted by file name inside each directory.
/// Symlinks are never followed, so link cycles cannot occur.
#[derive(Debug, Clone)]
pub struct TreeEnumerator {
    root: PathBuf,
    exclude: Option<PathBuf>,
    cancel: CancelFlag,
}

impl TreeEnumerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: None,
            cancel: CancelFlag::default(),
        }
    }

    /// Prunes `path` and everything below it from the walk.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude = Some(path.into());
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn enumerate(&self) -> Result<TreeWalk, TriageError> {
        if !self.root.is_dir() {
            return Err(TriageError::NotADirectory(self.root.clone()));
        }

        let mut walk = TreeWalk::default();
        let mut index = HashMap::<PathBuf, usize>::new();
        let exclude = self.exclude.as_deref();

        let entries = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| exclude.map_or(true, |x| entry.path() != x));

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    if err.depth() == 0 {
                        let source = err
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::other("filesystem loop at root"));
                        return Err(TriageError::Traversal { path, source });
                    }
                    warn!(path = %path.display(), error = %err, "skipping unreadable subtree");
                    walk.skipped_subtrees.push(path);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.cancel.is_cancelled() {
                    return Err(TriageError::Cancelled);
                }
                let path = entry.into_path();
                if let Some(&parent) = path.parent().and_then(|p| index.get(p)) {
                    walk.folders[parent].has_subfolders = true;
                }
                index.insert(path.clone(), walk.folders.len());
                walk.folders.push(FolderEntry {
                    path,
                    files: Vec::new(),
                    has_subfolders: false,
                });
            } else if file_type.is_file() {
                let parent = entry.path().parent().and_then(|p| index.get(p)).copied();
                if let Some(parent) = parent {
                    walk.folders[parent].files.push(entry.file_name().to_os_string());
                }
            } else {
                debug!(path = %entry.path().display(), "skipping symlink or special file");
            }
        }

        Ok(walk)
    }
}

pub fn enumerate(root: &Path) -> Result<TreeWalk, TriageError> {
    TreeEnumerator::new(root).enumerate()
}
