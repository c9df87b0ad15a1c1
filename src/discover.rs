//! File discovery for full indexing passes.

use crate::store::normalize_path;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::warn;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directories never descended into.
pub const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".repo-intel",
    "node_modules",
    "target",
    "dist",
    "build",
    "coverage",
    "__pycache__",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".next",
];

/// Include/exclude glob filter over repository-relative paths.
///
/// With no include patterns every path is included. Exclusion wins over
/// inclusion.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// A filter that accepts every path.
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Whether a repository-relative, `/`-separated path passes the filter.
    pub fn matches(&self, rel_path: &str) -> bool {
        if is_in_skipped_dir(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(rel_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob pattern `{pattern}`"))?);
    }
    Ok(Some(builder.build().context("failed to build glob set")?))
}

/// A candidate file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path
    pub path: PathBuf,
    /// Repository-relative, `/`-separated path
    pub rel_path: String,
}

/// Walk `root` and return every regular file passing `filter`, sorted by
/// relative path. Unreadable entries are logged and skipped.
pub fn discover_files(root: &Path, filter: &FileFilter, follow_symlinks: bool) -> Vec<DiscoveredFile> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|e| should_descend(e, root))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("walk error: {}", err);
                continue;
            }
        };
        // Without follow_links, symlinks report their own type and are skipped here
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = relative_path(root, entry.path());
        if !filter.matches(&rel_path) {
            continue;
        }
        files.push(DiscoveredFile {
            path: entry.path().to_path_buf(),
            rel_path,
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    files
}

fn should_descend(entry: &DirEntry, root: &Path) -> bool {
    let path = entry.path();
    if path == root {
        return true;
    }
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if entry.file_type().is_dir() && SKIP_DIRS.contains(&name) {
            return false;
        }
    }
    true
}

/// True if any directory component of `rel_path` is in `SKIP_DIRS`.
pub fn is_in_skipped_dir(rel_path: &str) -> bool {
    let mut components: Vec<&str> = rel_path.split('/').collect();
    components.pop();
    components.iter().any(|c| SKIP_DIRS.contains(c))
}

/// Repository-relative `/`-separated form of `path`. Paths outside `root`
/// are returned normalized but unchanged.
pub fn relative_path(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => normalize_path(rel),
        Err(_) => normalize_path(path),
    }
}
