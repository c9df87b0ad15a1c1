//! Import resolution: turns raw relative import targets into file edges.

use crate::store::{normalize_path, FileDependency, ImportRecord};
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "d.ts", "js", "jsx", "mjs", "cjs"];
const SCRIPT_INDEX_FILES: &[&str] = &["index.ts", "index.tsx", "index.js", "index.jsx"];
const PYTHON_EXTENSIONS: &[&str] = &["py", "pyi"];
const PYTHON_INDEX_FILES: &[&str] = &["__init__.py"];
const RUST_EXTENSIONS: &[&str] = &["rs"];
const RUST_INDEX_FILES: &[&str] = &["mod.rs"];

/// Candidate extensions and directory index files for imports written in `language`.
fn resolution_rules(language: Option<&str>) -> (Vec<&'static str>, Vec<&'static str>) {
    match language {
        Some("typescript" | "javascript") => (SCRIPT_EXTENSIONS.to_vec(), SCRIPT_INDEX_FILES.to_vec()),
        Some("python") => (PYTHON_EXTENSIONS.to_vec(), PYTHON_INDEX_FILES.to_vec()),
        Some("rust") => (RUST_EXTENSIONS.to_vec(), RUST_INDEX_FILES.to_vec()),
        _ => (
            [SCRIPT_EXTENSIONS, PYTHON_EXTENSIONS, RUST_EXTENSIONS].concat(),
            [SCRIPT_INDEX_FILES, PYTHON_INDEX_FILES, RUST_INDEX_FILES].concat(),
        ),
    }
}

/// True for targets the resolver handles (`./x`, `../x`).
pub fn is_relative_target(target: &str) -> bool {
    target.starts_with("./") || target.starts_with("../")
}

/// Resolve a relative import written in `from_file` to an existing file.
///
/// Tries, in order: the literal path, the literal path plus each extension
/// of the importing language (skipped for targets ending in `/`), then
/// directory index files. Returns `None`
/// for package imports and targets with no matching file.
pub fn resolve_import(from_file: &Path, target: &str, language: Option<&str>) -> Option<PathBuf> {
    if !is_relative_target(target) {
        return None;
    }
    let dir = from_file.parent()?;
    let base = normalize_lexically(&dir.join(target));
    let (extensions, index_files) = resolution_rules(language);

    if base.is_file() {
        return Some(base);
    }
    // A trailing `/` names a directory; only its index file can match
    if !target.ends_with('/') {
        let base_str = base.as_os_str().to_string_lossy();
        for ext in &extensions {
            let candidate = PathBuf::from(format!("{base_str}.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    for index in &index_files {
        let candidate = base.join(index);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Resolve every import and merge them into file edges.
///
/// `languages` maps a stored file path to its detected language. Imports of
/// the same target file from one file collapse into one edge: names are
/// unioned in first-seen order and the first import's kind is kept.
/// Self-imports produce no edge. Output is ordered by source, then target.
pub fn build_dependencies(
    imports: &[ImportRecord],
    languages: &HashMap<String, Option<String>>,
) -> Vec<FileDependency> {
    let mut edges: BTreeMap<(String, String), FileDependency> = BTreeMap::new();
    for import in imports {
        let language = languages.get(&import.file).and_then(|l| l.as_deref());
        let Some(resolved) = resolve_import(Path::new(&import.file), &import.target, language)
        else {
            continue;
        };
        let to_file = normalize_path(&resolved);
        if to_file == import.file {
            continue;
        }
        let edge = edges
            .entry((import.file.clone(), to_file.clone()))
            .or_insert_with(|| FileDependency {
                from_file: import.file.clone(),
                to_file,
                kind: import.kind,
                names: Vec::new(),
            });
        for name in &import.names {
            if !edge.names.contains(name) {
                edge.names.push(name.clone());
            }
        }
    }
    edges.into_values().collect()
}

/// Remove `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
