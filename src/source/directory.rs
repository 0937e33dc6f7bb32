//! Recursive directory source
//!
//! Walks a dump tree with `walkdir` in file-name order and opens every
//! regular file it finds. Unlike archive traversal, a file that cannot be
//! opened is not fatal: it is handed back as an `Err` so the caller can log
//! it and move on to the next file.

use super::InputEntry;
use crate::error::SourceError;
use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursive walker over the regular files below a root directory
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
    exclude: Vec<Regex>,
}

impl DirectoryWalker {
    /// Walk everything below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
        }
    }

    /// Prune paths matching any of `patterns` (matched against the full path)
    pub fn with_excludes(mut self, patterns: Vec<Regex>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &Path) -> bool {
        is_excluded(&self.exclude, path)
    }

    /// Iterate over the files, opening each one lazily
    pub fn entries(&self) -> DirectoryEntries {
        let exclude = self.exclude.clone();
        let inner = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || !is_excluded(&exclude, e.path()));

        DirectoryEntries {
            inner: Box::new(inner),
        }
    }
}

fn is_excluded(patterns: &[Regex], path: &Path) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let path = path.to_string_lossy();
    patterns.iter().any(|re| re.is_match(&path))
}

/// Iterator over the files of a [`DirectoryWalker`]
pub struct DirectoryEntries {
    inner: Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>>>,
}

impl Iterator for DirectoryEntries {
    type Item = Result<InputEntry<'static>, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(SourceError::Walk(e))),
            };

            if entry.file_type().is_dir() {
                continue;
            }

            // Follows symlinks; sockets, fifos and links to directories are skipped
            let path = entry.into_path();
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(source) => return Some(Err(SourceError::Open { path, source })),
            }

            return Some(match File::open(&path) {
                Ok(file) => Ok(InputEntry::new(path.display().to_string(), file)),
                Err(source) => Err(SourceError::Open { path, source }),
            });
        }
    }
}
