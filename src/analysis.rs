//! Read-only analyses over the stored dependency graph: change impact,
//! hotspot ranking and graph export.

use crate::discover::relative_path;
use crate::history::HistorySource;
use crate::languages::traits::DependencyKind;
use crate::store::{DependencyCache, IndexStore, SymbolFilter, SymbolRecord};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::path::Path;

/// Risk added per dependent file.
pub const RISK_PER_DEPENDENT: u32 = 5;
/// Upper bound of `ImpactResult::risk_score`.
pub const MAX_RISK: u32 = 100;
/// Churn weight per commit touching the file.
pub const CHURN_COMMIT_WEIGHT: u64 = 2;
/// Churn weight per distinct author.
pub const CHURN_AUTHOR_WEIGHT: u64 = 3;
/// How far back churn looks.
pub const CHURN_LOOKBACK_DAYS: i64 = 90;
/// Mermaid output is cut after this many edges.
pub const MERMAID_EDGE_LIMIT: usize = 100;

const TEST_PATH_MARKERS: &[&str] = &[".test.", ".spec.", "/tests/", "/test/", "/__tests__/"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImpactResult {
    pub changed_files: Vec<String>,
    pub direct_dependents: Vec<String>,
    pub transitive_dependents: Vec<String>,
    /// Exported symbols of the first changed file
    pub affected_symbols: Vec<SymbolRecord>,
    pub risk_score: u32,
    /// Largest incoming-edge count among the changed files
    pub hotspot_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HotspotMetric {
    /// Outgoing edges
    Dependencies,
    /// Incoming edges
    Dependents,
    /// Symbol count
    Complexity,
    /// Recent commits and authors
    Churn,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RankedFile {
    pub path: String,
    pub score: u64,
    pub details: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum GraphFormat {
    /// JSON object: file -> sorted list of imported files
    #[default]
    Adjacency,
    /// JSON array of {from, to, kind}
    Edges,
    /// Mermaid flowchart
    Mermaid,
}

#[derive(Debug, Serialize)]
struct EdgeOut<'a> {
    from: String,
    to: String,
    kind: &'a DependencyKind,
}

/// True for paths that look like tests. `rel_path` is repository-relative.
pub fn is_test_path(rel_path: &str) -> bool {
    let path = format!("/{rel_path}");
    TEST_PATH_MARKERS.iter().any(|m| path.contains(m))
}

/// Date `CHURN_LOOKBACK_DAYS` before `now`, as `YYYY-MM-DD`.
pub fn churn_since(now: DateTime<Utc>) -> String {
    (now - Duration::days(CHURN_LOOKBACK_DAYS))
        .format("%Y-%m-%d")
        .to_string()
}

fn risk_score(dependents: usize) -> u32 {
    let raw = (dependents as u64).saturating_mul(RISK_PER_DEPENDENT as u64);
    raw.min(MAX_RISK as u64) as u32
}

/// Breadth-first walk over incoming edges from `changed` (absolute paths).
///
/// Level 1 files are direct dependents, levels `2..=depth` transitive. Each
/// file is visited once. Unless `include_tests`, test files are dropped from
/// the frontier and do not propagate.
pub fn analyze_impact(
    store: &IndexStore,
    root: &str,
    changed: &[String],
    depth: usize,
    include_tests: bool,
) -> Result<ImpactResult> {
    let cache = store.load_dependency_cache()?;
    let rel = |p: &str| relative_path(Path::new(root), Path::new(p));

    let mut visited: HashSet<&str> = changed.iter().map(String::as_str).collect();
    let mut frontier: Vec<&str> = changed.iter().map(String::as_str).collect();
    let mut direct = Vec::new();
    let mut transitive = Vec::new();

    for level in 1..=depth {
        let mut next = Vec::new();
        for file in &frontier {
            for dependent in cache.get_dependents(file) {
                if visited.contains(dependent.as_str()) {
                    continue;
                }
                visited.insert(dependent.as_str());
                if !include_tests && is_test_path(&rel(dependent)) {
                    continue;
                }
                next.push(dependent.as_str());
            }
        }
        if next.is_empty() {
            break;
        }
        let target = if level == 1 { &mut direct } else { &mut transitive };
        target.extend(next.iter().map(|f| rel(f)));
        frontier = next;
    }
    direct.sort();
    transitive.sort();

    let affected_symbols = match changed.first() {
        Some(first) => store.query_symbols(
            &SymbolFilter {
                file: Some(first.clone()),
                exported_only: true,
                ..Default::default()
            },
            None,
            None,
        )?,
        None => Vec::new(),
    };

    let hotspot_score = changed
        .iter()
        .map(|f| cache.get_dependents(f).len() as u32)
        .max()
        .unwrap_or(0);

    let mut changed_files: Vec<String> = changed.iter().map(|f| rel(f)).collect();
    changed_files.sort();
    changed_files.dedup();

    debug!(
        "Impact of {} files: {} direct, {} transitive",
        changed_files.len(),
        direct.len(),
        transitive.len()
    );
    Ok(ImpactResult {
        changed_files,
        risk_score: risk_score(direct.len() + transitive.len()),
        direct_dependents: direct,
        transitive_dependents: transitive,
        affected_symbols,
        hotspot_score,
    })
}

/// Top `limit` indexed files by `metric`, zero scores included.
/// Ties are broken by relative path.
pub fn hotspots(
    store: &IndexStore,
    root: &str,
    history: &dyn HistorySource,
    metric: HotspotMetric,
    limit: usize,
    since: &str,
) -> Result<Vec<RankedFile>> {
    let files: Vec<_> = store
        .list_files()?
        .into_iter()
        .filter(|f| f.language.is_some())
        .collect();
    let cache = store.load_dependency_cache()?;
    let stats: HashMap<String, i64> = store
        .all_file_stats()?
        .into_iter()
        .map(|s| (s.file, s.symbol_count))
        .collect();

    let mut ranked: Vec<RankedFile> = files
        .iter()
        .map(|file| {
            let (score, details) = match metric {
                HotspotMetric::Dependencies => {
                    let n = cache.get_dependencies(&file.path).len() as u64;
                    (n, format!("{n} dependencies"))
                }
                HotspotMetric::Dependents => {
                    let n = cache.get_dependents(&file.path).len() as u64;
                    (n, format!("{n} dependents"))
                }
                HotspotMetric::Complexity => {
                    let n = stats.get(&file.path).copied().unwrap_or(0).max(0) as u64;
                    (n, format!("{n} symbols"))
                }
                HotspotMetric::Churn => churn(history, &file.rel_path, since),
            };
            RankedFile {
                path: relative_path(Path::new(root), Path::new(&file.path)),
                score,
                details,
            }
        })
        .collect();

    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
    ranked.truncate(limit);
    Ok(ranked)
}

fn churn(history: &dyn HistorySource, rel_path: &str, since: &str) -> (u64, String) {
    let commits = history.commit_count(rel_path, since).unwrap_or(0);
    let authors = history.unique_author_count(rel_path, since).unwrap_or(0);
    let score = commits * CHURN_COMMIT_WEIGHT + authors * CHURN_AUTHOR_WEIGHT;
    (score, format!("{commits} commits, {authors} authors"))
}

/// Render the stored graph. Paths are repository-relative.
pub fn dependency_graph(
    store: &IndexStore,
    root: &str,
    format: GraphFormat,
    max_depth: Option<usize>,
) -> Result<String> {
    let mut edges = store.get_all_dependencies()?;
    edges.sort_by(|a, b| {
        a.from_file
            .cmp(&b.from_file)
            .then_with(|| a.to_file.cmp(&b.to_file))
    });
    if let Some(depth) = max_depth {
        let cache = DependencyCache::from_dependencies(&edges);
        let hops = hops_from_entries(&cache);
        edges.retain(|e| {
            hops.get(e.from_file.as_str())
                .map(|h| *h < depth)
                .unwrap_or(false)
        });
    }
    let rel = |p: &str| relative_path(Path::new(root), Path::new(p));

    let out = match format {
        GraphFormat::Adjacency => {
            let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for edge in &edges {
                adjacency
                    .entry(rel(&edge.from_file))
                    .or_default()
                    .push(rel(&edge.to_file));
            }
            for targets in adjacency.values_mut() {
                targets.sort();
            }
            serde_json::to_string_pretty(&adjacency)?
        }
        GraphFormat::Edges => {
            let list: Vec<EdgeOut> = edges
                .iter()
                .map(|e| EdgeOut {
                    from: rel(&e.from_file),
                    to: rel(&e.to_file),
                    kind: &e.kind,
                })
                .collect();
            serde_json::to_string_pretty(&list)?
        }
        GraphFormat::Mermaid => {
            let mut ids: HashMap<String, usize> = HashMap::new();
            let mut nodes = String::new();
            let mut links = String::new();
            for edge in edges.iter().take(MERMAID_EDGE_LIMIT) {
                let mut node_id = |path: &str| {
                    let path = rel(path);
                    let next = ids.len();
                    let id = *ids.entry(path.clone()).or_insert(next);
                    if id == next {
                        let _ = writeln!(nodes, "    n{id}[\"{}\"]", path.replace('"', "'"));
                    }
                    id
                };
                let from = node_id(&edge.from_file);
                let to = node_id(&edge.to_file);
                let _ = writeln!(links, "    n{from} --> n{to}");
            }
            format!("graph LR\n{nodes}{links}")
        }
    };
    Ok(out)
}

/// Fewest forward hops from an entry file (no dependents) to each file.
/// When every file has a dependent, every file is an entry.
fn hops_from_entries(cache: &DependencyCache) -> HashMap<String, usize> {
    let files = cache.files();
    let mut entries: Vec<&String> = files
        .iter()
        .filter(|f| cache.get_dependents(f).is_empty())
        .collect();
    if entries.is_empty() {
        entries = files.iter().collect();
    }

    let mut hops: HashMap<String, usize> = HashMap::new();
    let mut queue = VecDeque::new();
    for entry in entries {
        hops.insert(entry.clone(), 0);
        queue.push_back(entry.clone());
    }
    while let Some(file) = queue.pop_front() {
        let next = hops[&file] + 1;
        for dep in cache.get_dependencies(&file) {
            if !hops.contains_key(dep) {
                hops.insert(dep.clone(), next);
                queue.push_back(dep.clone());
            }
        }
    }
    hops
}
