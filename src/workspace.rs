//! Locating the repository to index.
//!
//! The root is chosen, in order, from `--workspace`, `REPO_INTEL_WORKSPACE`,
//! or by walking up from the current directory until a directory holding
//! one of `ROOT_MARKERS` is found. The walk never goes above the home
//! directory.

use crate::indexer::Indexer;
use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const ENV_WORKSPACE: &str = "REPO_INTEL_WORKSPACE";
pub const ENV_DB: &str = "REPO_INTEL_DB";

/// Entries that mark a repository root, strongest first.
pub const ROOT_MARKERS: &[&str] = &[
    ".repo-intel",
    ".git",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "tsconfig.json",
];

/// Walk up from `start` to the nearest directory containing a root marker.
pub fn find_repo_root_from(start: &Path) -> Option<PathBuf> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        env::current_dir().ok()?.join(start)
    };
    let home = dirs::home_dir();
    let mut current = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start
    };

    loop {
        if has_root_marker(&current) {
            return Some(current);
        }
        if home.as_deref() == Some(current.as_path()) {
            return None;
        }
        current = match current.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return None,
        };
    }
}

fn has_root_marker(dir: &Path) -> bool {
    ROOT_MARKERS.iter().any(|m| dir.join(m).exists())
}

/// Repository root: CLI flag, then environment, then auto-detection.
pub fn resolve_workspace(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(canonicalize_or_absolute(path));
    }
    if let Ok(path) = env::var(ENV_WORKSPACE) {
        return Ok(canonicalize_or_absolute(Path::new(&path)));
    }
    let cwd = env::current_dir()?;
    if let Some(root) = find_repo_root_from(&cwd) {
        return Ok(root);
    }
    bail!(
        "could not find a repository root above {}; pass --workspace or set {}",
        cwd.display(),
        ENV_WORKSPACE
    )
}

/// Index database: CLI flag, then environment, then `<root>/.repo-intel/index.db`.
/// Relative paths are taken relative to the workspace.
pub fn resolve_db_path(cli_arg: Option<&Path>, workspace: &Path) -> PathBuf {
    let explicit = cli_arg
        .map(Path::to_path_buf)
        .or_else(|| env::var(ENV_DB).ok().map(PathBuf::from));
    match explicit {
        Some(path) if path.is_absolute() => path,
        Some(path) => workspace.join(path),
        None => Indexer::default_db_path(workspace),
    }
}

fn canonicalize_or_absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        }
    })
}
