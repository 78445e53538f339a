//
//  walk.rs
//  Trellis
//
//  Created by hak (tharun)
//

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

/// Directories that should never be indexed, even without .gitignore.
const BUILTIN_IGNORE: &[&str] = &[
    "node_modules",
    "vendor",
    "dist",
    "build",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".tox",
    ".venv",
    "venv",
    "env",
    ".env",
    "target",
    ".next",
    ".nuxt",
    "coverage",
    ".cache",
    ".turbo",
    ".output",
];

/// Single-pass repository enumeration with cached results.
///
/// Performs exactly one recursive walk, classifies entries into
/// directories and files, applies the include/exclude pattern sets
/// (exclusion wins when both match) and caches two sorted lists.
/// Every downstream phase reads the cache instead of re-walking.
pub struct FileEnumerator {
    repo_path: PathBuf,
    directories: Vec<PathBuf>,
    files: Vec<PathBuf>,
    enumerated: bool,
}

impl FileEnumerator {
    pub fn new<P: Into<PathBuf>>(repo_path: P) -> Self {
        Self {
            repo_path: repo_path.into(),
            directories: Vec::new(),
            files: Vec::new(),
            enumerated: false,
        }
    }

    /// Walk the repository once and cache the filtered results.
    ///
    /// Calling this a second time is a no-op; the cached lists from the
    /// first walk are kept regardless of the patterns passed later.
    pub fn enumerate(&mut self, exclude_patterns: &[String], include_patterns: &[String]) {
        if self.enumerated {
            debug!("enumeration already performed, skipping walk");
            return;
        }

        let exclude = build_glob_set(exclude_patterns);
        let include = build_glob_set(include_patterns);
        let has_includes = !include_patterns.is_empty();

        let mut directories = vec![self.repo_path.clone()];
        let mut files = Vec::new();

        let walker = WalkBuilder::new(&self.repo_path)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .filter_entry(|entry| !is_builtin_ignored(entry.path()))
            .build();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path == self.repo_path {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&self.repo_path) else {
                continue;
            };
            if exclude.is_match(relative) {
                continue;
            }

            let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
            if is_dir {
                directories.push(path.to_path_buf());
            } else if entry.file_type().is_some_and(|ft| ft.is_file()) {
                if has_includes && !include.is_match(relative) {
                    continue;
                }
                files.push(path.to_path_buf());
            }
        }

        directories.sort();
        files.sort();

        debug!(
            dirs = directories.len(),
            files = files.len(),
            "enumeration complete"
        );

        self.directories = directories;
        self.files = files;
        self.enumerated = true;
    }

    /// Enumerated directories, sorted. The repository root is always first.
    ///
    /// Panics if `enumerate` has not been called — reading the cache
    /// before the walk is a usage bug, not a data condition.
    pub fn directories(&self) -> &[PathBuf] {
        assert!(
            self.enumerated,
            "enumerate() must be called before accessing directories"
        );
        &self.directories
    }

    /// Enumerated files, sorted.
    ///
    /// Panics if `enumerate` has not been called.
    pub fn files(&self) -> &[PathBuf] {
        assert!(
            self.enumerated,
            "enumerate() must be called before accessing files"
        );
        &self.files
    }

    pub fn is_enumerated(&self) -> bool {
        self.enumerated
    }
}

/// Check if a path contains any built-in ignored directory.
fn is_builtin_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        if let std::path::Component::Normal(name) = c {
            BUILTIN_IGNORE.contains(&name.to_str().unwrap_or(""))
        } else {
            false
        }
    })
}

/// Compile glob patterns, dropping (and logging) any that fail to parse.
fn build_glob_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!(pattern = %pattern, "skipping invalid glob pattern: {e}"),
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!("failed to build glob set: {e}");
        GlobSet::empty()
    })
}
