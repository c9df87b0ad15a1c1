use crate::analysis::{self, GraphFormat, HotspotMetric, ImpactResult, RankedFile};
use crate::config::RepoConfig;
use crate::discover::{discover_files, relative_path, FileFilter};
use crate::error::IndexError;
use crate::history::HistorySource;
use crate::languages::registry::ExtractorRegistry;
use crate::languages::traits::{DependencyKind, Extraction};
use crate::resolve::{build_dependencies, normalize_lexically};
use crate::store::{
    normalize_path, now_unix, DbOpenResult, FileRecord, IndexHealth, IndexStatsSnapshot,
    IndexStore, RepoIndexMetadata, SymbolFilter, SymbolRecord,
};
use anyhow::{Context, Result};
use blake3::Hasher;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Directory holding the index inside a repository.
pub const INDEX_DIR: &str = ".repo-intel";
/// Index database file name inside `INDEX_DIR`.
pub const DB_FILE: &str = "index.db";
/// Files larger than this are recorded without extraction.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Substrings of a file name that mark generated code.
const GENERATED_NAME_MARKERS: &[&str] = &[".min.", ".generated.", "_pb2.py", ".pb.go"];
/// Header markers searched for in the first few lines.
const GENERATED_HEADER_MARKERS: &[&str] = &["@generated", "DO NOT EDIT", "auto-generated"];
const GENERATED_HEADER_LINES: usize = 5;

/// How candidate files are selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Only files changed since the last recorded commit (falls back to a full walk)
    #[default]
    Incremental,
    /// Walk the whole tree; unchanged files are still skipped by hash
    Force,
}

#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub mode: IndexMode,
    /// Language tags to extract; `None` extracts every supported language
    pub languages: Option<Vec<String>>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
    pub follow_symlinks: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            mode: IndexMode::Incremental,
            languages: None,
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            follow_symlinks: false,
        }
    }
}

impl IndexOptions {
    /// Defaults overlaid with a repository config file.
    pub fn from_config(config: &RepoConfig) -> Self {
        let mut options = Self::default();
        config.apply(&mut options);
        options
    }
}

/// Where the candidate set of a run came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Discovery {
    /// Full walk (forced, or first run)
    #[default]
    Full,
    /// Changed and untracked paths reported by history
    Incremental,
    /// Full walk because history was unavailable
    Fallback,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileError {
    /// Repository-relative path
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    /// Files whose rows were (re)written
    pub indexed: usize,
    /// Files left untouched because their hash and language were unchanged
    pub skipped: usize,
    /// Records removed for files no longer present
    pub removed: usize,
    pub errors: Vec<FileError>,
    pub duration_ms: u64,
    /// Files written this run, per detected language
    pub by_language: BTreeMap<String, usize>,
    pub stats: IndexStatsSnapshot,
    pub discovery: Discovery,
}

/// Progress events emitted while indexing.
#[derive(Debug, Clone, Copy)]
pub enum IndexProgress<'a> {
    Started { total: usize },
    File { rel_path: &'a str },
    Resolving,
    Finished,
}

/// Which edges `Indexer::dependencies` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// Files this file imports
    #[default]
    Outgoing,
    /// Files importing this file
    Incoming,
    Both,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DependencyEntry {
    /// Repository-relative path of the other file
    pub path: String,
    pub kind: DependencyKind,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDependencies {
    pub file: String,
    pub outgoing: Vec<DependencyEntry>,
    pub incoming: Vec<DependencyEntry>,
}

struct Candidate {
    path: PathBuf,
    rel_path: String,
    exists: bool,
}

enum FileOutcome {
    Indexed { language: Option<String> },
    Skipped,
    Failed { message: String },
}

/// Index handle bound to one repository.
///
/// Queries take `&self` and may run concurrently. `index` calls must be
/// serialized by the caller: one writer per repository.
pub struct Indexer {
    root: PathBuf,
    root_str: String,
    store: IndexStore,
    registry: ExtractorRegistry,
    history: Box<dyn HistorySource>,
}

impl Indexer {
    /// Default index location for a repository root.
    pub fn default_db_path(root: &Path) -> PathBuf {
        root.join(INDEX_DIR).join(DB_FILE)
    }

    /// Open (or create) the index for `root` at the default location.
    pub fn open(root: &Path, history: Box<dyn HistorySource>) -> Result<Self> {
        let root = canonical_root(root)?;
        let db_path = Self::default_db_path(&root);
        Self::open_at(root, &db_path, history)
    }

    /// Open (or create) the index for `root` stored at `db_path`.
    ///
    /// A corrupt or incompatible database yields `IndexError::Unavailable`;
    /// it is never recreated implicitly.
    pub fn open_with_db(root: &Path, db_path: &Path, history: Box<dyn HistorySource>) -> Result<Self> {
        Self::open_at(canonical_root(root)?, db_path, history)
    }

    /// Delete the index for `root` (default location) and create an empty one.
    pub fn rebuild(root: &Path, history: Box<dyn HistorySource>) -> Result<Self> {
        let root = canonical_root(root)?;
        let db_path = Self::default_db_path(&root);
        Self::rebuild_with_db(&root, &db_path, history)
    }

    /// Delete the index stored at `db_path` and create an empty one.
    pub fn rebuild_with_db(root: &Path, db_path: &Path, history: Box<dyn HistorySource>) -> Result<Self> {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = db_path.as_os_str().to_owned();
            file.push(suffix);
            let file = PathBuf::from(file);
            if file.exists() {
                fs::remove_file(&file)
                    .with_context(|| format!("failed to remove {}", file.display()))?;
            }
        }
        info!("Recreating index at {}", db_path.display());
        Self::open_with_db(root, db_path, history)
    }

    fn open_at(root: PathBuf, db_path: &Path, history: Box<dyn HistorySource>) -> Result<Self> {
        let store = match IndexStore::try_open(db_path)? {
            DbOpenResult::Ready(store) => store,
            DbOpenResult::NeedsRegeneration { reason, path } => {
                return Err(IndexError::Unavailable {
                    path,
                    reason: reason.message(),
                }
                .into());
            }
        };
        Ok(Self {
            root_str: normalize_path(&root),
            root,
            store,
            registry: ExtractorRegistry::new(),
            history,
        })
    }

    /// Replace the extractor registry (for custom languages).
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    // ==================== Indexing ====================

    pub fn index(&self, options: &IndexOptions) -> Result<IndexSummary> {
        self.index_with_progress(options, &mut |_| {})
    }

    /// Run one indexing pass, reporting progress through `progress`.
    pub fn index_with_progress(
        &self,
        options: &IndexOptions,
        progress: &mut dyn FnMut(IndexProgress<'_>),
    ) -> Result<IndexSummary> {
        let started = Instant::now();
        let filter = FileFilter::new(&options.include, &options.exclude)?;
        let previous = self.store.load_metadata()?;
        let (candidates, discovery) = self.select_candidates(options, &filter, previous.as_ref());
        info!(
            "Indexing {} ({} candidates, {:?} discovery)",
            self.root.display(),
            candidates.len(),
            discovery
        );

        let mut summary = IndexSummary {
            discovery,
            ..Default::default()
        };
        progress(IndexProgress::Started {
            total: candidates.len(),
        });

        let mut seen = HashSet::new();
        for candidate in &candidates {
            let path_str = normalize_path(&candidate.path);
            if !candidate.exists {
                if self.store.get_file(&path_str)?.is_some() {
                    self.store.remove_file(&path_str)?;
                    summary.removed += 1;
                }
                continue;
            }
            progress(IndexProgress::File {
                rel_path: &candidate.rel_path,
            });
            seen.insert(path_str);
            let outcome = self
                .index_file(candidate, options)
                .with_context(|| format!("failed to store {}", candidate.rel_path))?;
            match outcome {
                FileOutcome::Indexed { language } => {
                    summary.indexed += 1;
                    if let Some(language) = language {
                        *summary.by_language.entry(language).or_default() += 1;
                    }
                }
                FileOutcome::Skipped => summary.skipped += 1,
                FileOutcome::Failed { message } => {
                    warn!("indexing failed for {}: {message}", candidate.rel_path);
                    summary.errors.push(FileError {
                        path: candidate.rel_path.clone(),
                        message,
                    });
                }
            }
        }

        if discovery != Discovery::Incremental {
            summary.removed += self.prune_deleted(&seen)?;
        }

        progress(IndexProgress::Resolving);
        let edges = self.rebuild_dependencies()?;
        debug!("Resolved {edges} file dependencies");

        // Update query optimizer statistics for optimal index usage
        self.store.analyze()?;

        summary.duration_ms = started.elapsed().as_millis() as u64;
        let mut stats = self.store.compute_stats()?;
        stats.last_duration_ms = summary.duration_ms;
        let now = now_unix();
        let last_commit = match self.history.head_commit() {
            Ok(commit) => Some(commit),
            Err(err) => {
                debug!("no head commit recorded: {err:#}");
                None
            }
        };
        self.store.save_metadata(&RepoIndexMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            root: self.root_str.clone(),
            created_at: previous.as_ref().map(|m| m.created_at).unwrap_or(now),
            updated_at: now,
            last_commit,
            stats: stats.clone(),
        })?;
        summary.stats = stats;
        progress(IndexProgress::Finished);

        info!(
            "Index complete: {} indexed, {} skipped, {} removed, {} errors in {}ms",
            summary.indexed,
            summary.skipped,
            summary.removed,
            summary.errors.len(),
            summary.duration_ms
        );
        Ok(summary)
    }

    fn select_candidates(
        &self,
        options: &IndexOptions,
        filter: &FileFilter,
        previous: Option<&RepoIndexMetadata>,
    ) -> (Vec<Candidate>, Discovery) {
        if options.mode == IndexMode::Force {
            return (self.full_candidates(filter, options), Discovery::Full);
        }
        let Some(previous) = previous else {
            debug!("No previous index; walking the full tree");
            return (self.full_candidates(filter, options), Discovery::Full);
        };
        let Some(base) = previous.last_commit.as_deref() else {
            debug!("No recorded commit; falling back to full discovery");
            return (self.full_candidates(filter, options), Discovery::Fallback);
        };

        match self.changed_paths(base) {
            Ok(paths) => {
                let candidates = paths
                    .into_iter()
                    .filter(|rel| filter.matches(rel))
                    .filter_map(|rel| {
                        let path = normalize_lexically(&self.root.join(&rel));
                        if !options.follow_symlinks && is_symlink(&path) {
                            return None;
                        }
                        let exists = path.is_file();
                        Some(Candidate {
                            path,
                            rel_path: rel,
                            exists,
                        })
                    })
                    .collect();
                (candidates, Discovery::Incremental)
            }
            Err(err) => {
                info!("History unavailable ({err:#}); falling back to full discovery");
                (self.full_candidates(filter, options), Discovery::Fallback)
            }
        }
    }

    /// Changed-since-base ∪ untracked, deduplicated and sorted.
    fn changed_paths(&self, base: &str) -> Result<BTreeSet<String>> {
        let mut paths: BTreeSet<String> = self.history.changed_files_since(base)?.into_iter().collect();
        paths.extend(self.history.untracked_files()?);
        Ok(paths)
    }

    fn full_candidates(&self, filter: &FileFilter, options: &IndexOptions) -> Vec<Candidate> {
        discover_files(&self.root, filter, options.follow_symlinks)
            .into_iter()
            .map(|f| Candidate {
                path: f.path,
                rel_path: f.rel_path,
                exists: true,
            })
            .collect()
    }

    fn prune_deleted(&self, seen: &HashSet<String>) -> Result<usize> {
        let known = self.store.list_paths()?;
        let mut removed = 0;
        for path in known.difference(seen) {
            self.store.remove_file(path)?;
            debug!("Pruned deleted file {path}");
            removed += 1;
        }
        Ok(removed)
    }

    /// Hash, detect language, and (unless unchanged) replace the file's rows.
    ///
    /// Read and extraction problems come back as `FileOutcome::Failed`; an
    /// `Err` means the store itself failed.
    fn index_file(&self, candidate: &Candidate, options: &IndexOptions) -> Result<FileOutcome> {
        let path = &candidate.path;
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                return Ok(FileOutcome::Failed {
                    message: format!("failed to stat {}: {err}", path.display()),
                })
            }
        };
        let size = metadata.len();
        let mtime = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let oversized = size > options.max_file_size;

        let contents = if oversized {
            None
        } else {
            match fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    return Ok(FileOutcome::Failed {
                        message: format!("failed to read {}: {err}", path.display()),
                    })
                }
            }
        };
        let mut hasher = Hasher::new();
        match &contents {
            Some(bytes) => hasher.update(bytes),
            None => hasher.update(format!("{size}:{mtime}").as_bytes()),
        };
        let hash = hasher.finalize().to_hex().to_string();

        let language = if oversized {
            None
        } else {
            self.detect_language(path, options)
        };

        let path_str = normalize_path(path);
        if let Some(existing) = self.store.get_file(&path_str)? {
            if existing.hash == hash && existing.language.as_deref() == language {
                return Ok(FileOutcome::Skipped);
            }
        }

        let source = contents
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
        let mut record = FileRecord {
            path: path_str,
            rel_path: candidate.rel_path.clone(),
            language: language.map(str::to_string),
            size: size as i64,
            hash,
            mtime,
            line_count: source.as_deref().map(count_lines).unwrap_or(0),
            is_generated: is_generated(&candidate.rel_path, source.as_deref()),
            indexed_at: now_unix(),
            parse_error: None,
        };

        let (Some(language), Some(source)) = (language, source.as_deref()) else {
            self.store.save_file_index(&record, &[], &[], &[])?;
            debug!("Recorded {} without extraction", candidate.rel_path);
            return Ok(FileOutcome::Indexed { language: None });
        };

        match self.registry.extract(language, path, source) {
            Ok(Extraction {
                symbols,
                imports,
                exports,
            }) => {
                self.store
                    .save_file_index(&record, &symbols, &imports, &exports)?;
                debug!(
                    "Indexed {} symbols={} imports={} exports={}",
                    candidate.rel_path,
                    symbols.len(),
                    imports.len(),
                    exports.len()
                );
                Ok(FileOutcome::Indexed {
                    language: Some(language.to_string()),
                })
            }
            Err(err) => {
                let message = format!("{err:#}");
                record.parse_error = Some(message.clone());
                self.store.save_file_index(&record, &[], &[], &[])?;
                Ok(FileOutcome::Failed { message })
            }
        }
    }

    fn detect_language(&self, path: &Path, options: &IndexOptions) -> Option<&'static str> {
        let language = self.registry.language_for_path(path)?;
        match &options.languages {
            Some(allowed) if !allowed.iter().any(|l| l == language) => None,
            _ => Some(language),
        }
    }

    /// Replace all file edges with a fresh resolution of every stored import.
    fn rebuild_dependencies(&self) -> Result<usize> {
        let languages: HashMap<String, Option<String>> = self
            .store
            .list_files()?
            .into_iter()
            .map(|f| (f.path, f.language))
            .collect();
        let imports = self.store.all_imports()?;
        let dependencies = build_dependencies(&imports, &languages);
        self.store.replace_all_dependencies(&dependencies)?;
        Ok(dependencies.len())
    }

    // ==================== Queries ====================

    /// Metadata of the last completed run, or `None` before the first run.
    pub fn status(&self) -> Result<Option<RepoIndexMetadata>> {
        self.store.load_metadata()
    }

    pub fn health(&self) -> Result<IndexHealth> {
        self.store.health()
    }

    /// Symbols matching `filter`, ordered by file then start line.
    /// A relative `filter.file` is taken relative to the repository root.
    pub fn query_symbols(
        &self,
        filter: &SymbolFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<SymbolRecord>> {
        let mut filter = filter.clone();
        if let Some(file) = &filter.file {
            let trailing_slash = file.ends_with('/');
            let mut resolved = self.resolve_path(file);
            if trailing_slash && !resolved.ends_with('/') {
                resolved.push('/');
            }
            filter.file = Some(resolved);
        }
        self.store.query_symbols(&filter, limit, offset)
    }

    /// Direct dependency edges of one file.
    pub fn dependencies(&self, file: &str, direction: Direction) -> Result<FileDependencies> {
        let path = self.indexed_path(file)?;
        let entry = |other: String, kind, names| DependencyEntry {
            path: self.relative(&other),
            kind,
            names,
        };
        let outgoing = match direction {
            Direction::Outgoing | Direction::Both => self
                .store
                .get_file_dependencies(&path)?
                .into_iter()
                .map(|d| entry(d.to_file, d.kind, d.names))
                .collect(),
            Direction::Incoming => Vec::new(),
        };
        let incoming = match direction {
            Direction::Incoming | Direction::Both => self
                .store
                .get_dependents(&path)?
                .into_iter()
                .map(|d| entry(d.from_file, d.kind, d.names))
                .collect(),
            Direction::Outgoing => Vec::new(),
        };
        Ok(FileDependencies {
            file: self.relative(&path),
            outgoing,
            incoming,
        })
    }

    /// Files affected by changing `changed` (absolute or repository-relative paths).
    pub fn analyze_impact(
        &self,
        changed: &[String],
        depth: usize,
        include_tests: bool,
    ) -> Result<ImpactResult> {
        let changed: Vec<String> = changed.iter().map(|c| self.resolve_path(c)).collect();
        analysis::analyze_impact(&self.store, &self.root_str, &changed, depth, include_tests)
    }

    pub fn hotspots(&self, metric: HotspotMetric, limit: usize) -> Result<Vec<RankedFile>> {
        let since = analysis::churn_since(chrono::Utc::now());
        analysis::hotspots(
            &self.store,
            &self.root_str,
            self.history.as_ref(),
            metric,
            limit,
            &since,
        )
    }

    pub fn dependency_graph(&self, format: GraphFormat, max_depth: Option<usize>) -> Result<String> {
        analysis::dependency_graph(&self.store, &self.root_str, format, max_depth)
    }

    /// Absolute, normalized form of a user-supplied path.
    fn resolve_path(&self, file: &str) -> String {
        let path = Path::new(file);
        let absolute = if path.is_absolute() {
            path.canonicalize()
                .unwrap_or_else(|_| normalize_lexically(path))
        } else {
            normalize_lexically(&self.root.join(path))
        };
        normalize_path(&absolute)
    }

    fn indexed_path(&self, file: &str) -> Result<String> {
        let path = self.resolve_path(file);
        match self.store.get_file(&path)? {
            Some(_) => Ok(path),
            None => Err(IndexError::FileNotIndexed(file.to_string()).into()),
        }
    }

    fn relative(&self, path: &str) -> String {
        relative_path(Path::new(&self.root_str), Path::new(path))
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize()
        .with_context(|| format!("failed to canonicalize root {}", root.display()))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn count_lines(source: &str) -> i64 {
    if source.is_empty() {
        return 0;
    }
    let newlines = source.bytes().filter(|b| *b == b'\n').count();
    let trailing = usize::from(!source.ends_with('\n'));
    (newlines + trailing) as i64
}

/// Generated-code heuristic over the file name and the first few lines.
fn is_generated(rel_path: &str, source: Option<&str>) -> bool {
    let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
    if GENERATED_NAME_MARKERS.iter().any(|m| name.contains(m)) {
        return true;
    }
    source
        .map(|s| {
            s.lines()
                .take(GENERATED_HEADER_LINES)
                .any(|line| GENERATED_HEADER_MARKERS.iter().any(|m| line.contains(m)))
        })
        .unwrap_or(false)
}
