use crate::languages::traits::{DependencyKind, ExportKind, SymbolKind};
use anyhow::{Context, Result};
use log::{debug, info};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

// Schema version constants
pub const SCHEMA_MAJOR: u32 = 1;
pub const SCHEMA_MINOR: u32 = 0;

/// Schema version for database compatibility checking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub fn current() -> Self {
        Self {
            major: SCHEMA_MAJOR,
            minor: SCHEMA_MINOR,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    pub fn requires_regeneration(&self, current: &Self) -> bool {
        self.major != current.major
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Result of attempting to open a database.
pub enum DbOpenResult {
    /// Database is ready to use
    Ready(IndexStore),
    /// Database cannot be used until it is rebuilt
    NeedsRegeneration {
        reason: RegenerationReason,
        path: PathBuf,
    },
}

/// Reason why database regeneration is needed.
#[derive(Debug)]
pub enum RegenerationReason {
    /// Schema major version is incompatible
    MajorVersionMismatch {
        db_version: String,
        app_version: String,
    },
    /// Database has no version tracking (not ours, or truncated)
    MissingSchemaMeta,
    /// Database file is corrupted or unreadable
    CorruptDatabase(String),
}

impl RegenerationReason {
    /// Get a user-friendly message explaining the regeneration reason.
    pub fn message(&self) -> String {
        match self {
            RegenerationReason::MajorVersionMismatch {
                db_version,
                app_version,
            } => format!(
                "index schema version {} is incompatible with schema {}",
                db_version, app_version
            ),
            RegenerationReason::MissingSchemaMeta => {
                "index database has no schema version information".to_string()
            }
            RegenerationReason::CorruptDatabase(err) => {
                format!("index database appears corrupted: {}", err)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute, `/`-separated path. Primary key.
    pub path: String,
    pub rel_path: String,
    /// `None` means the file is tracked but not indexed (unsupported, filtered or oversized).
    pub language: Option<String>,
    pub size: i64,
    pub hash: String,
    pub mtime: i64,
    pub line_count: i64,
    pub is_generated: bool,
    pub indexed_at: i64,
    /// Set when the extractor failed on this file.
    pub parse_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SymbolRecord {
    pub id: String,
    pub file: String,
    pub name: String,
    pub kind: SymbolKind,
    pub start_line: i64,
    pub end_line: i64,
    pub start_col: i64,
    pub end_col: i64,
    pub signature: Option<String>,
    pub doc: Option<String>,
    pub export_kind: ExportKind,
    pub visibility: Option<String>,
    /// Id of the enclosing symbol for nested members.
    pub parent: Option<String>,
}

/// A raw import statement as written in a file, before resolution.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImportRecord {
    pub file: String,
    /// Literal import target. Local targets start with `./` or `../`.
    pub target: String,
    pub names: Vec<String>,
    pub kind: DependencyKind,
    pub line: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExportRecord {
    pub file: String,
    pub name: String,
    pub alias: Option<String>,
    pub is_default: bool,
    pub is_type_only: bool,
    pub is_reexport: bool,
    /// Module a re-export comes from.
    pub source: Option<String>,
}

/// Resolved file-to-file edge: `from_file` imports `to_file`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileDependency {
    pub from_file: String,
    pub to_file: String,
    pub kind: DependencyKind,
    pub names: Vec<String>,
}

/// Per-file symbol count, maintained on every file save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub file: String,
    pub symbol_count: i64,
}

/// Aggregate counts recorded in the repository metadata after each run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatsSnapshot {
    pub total_files: i64,
    /// Files with a detected language.
    pub indexed_files: i64,
    pub total_symbols: i64,
    pub total_imports: i64,
    pub total_exports: i64,
    pub total_dependencies: i64,
    pub files_by_language: BTreeMap<String, i64>,
    pub last_duration_ms: u64,
}

/// One row per repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoIndexMetadata {
    pub version: String,
    pub root: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// HEAD commit at the end of the last run, used as the incremental base.
    pub last_commit: Option<String>,
    pub stats: IndexStatsSnapshot,
}

/// Physical state of the index database, for the status command.
#[derive(Debug, Clone, Serialize)]
pub struct IndexHealth {
    /// Database file size in bytes
    pub size_bytes: u64,
    /// Most recent file indexing time (ISO 8601)
    pub last_updated: Option<String>,
    pub schema_version: String,
    pub parse_failures: i64,
    /// Failed files, capped to keep output small
    pub failed_files: Vec<String>,
}

const MAX_REPORTED_FAILURES: i64 = 20;

/// Filter for symbol queries. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct SymbolFilter {
    /// Exact symbol name
    pub name: Option<String>,
    /// Glob-style name pattern (`*` any run, `?` one char), ASCII case-insensitive
    pub name_pattern: Option<String>,
    /// Accept any of these kinds; empty accepts all
    pub kinds: Vec<SymbolKind>,
    /// Absolute file path, or a directory prefix when it ends with `/`
    pub file: Option<String>,
    /// Only symbols with a default or named export
    pub exported_only: bool,
}

/// Forward and reverse adjacency built from the stored edges.
/// Lives only for the duration of one query.
#[derive(Debug, Default)]
pub struct DependencyCache {
    /// Forward dependencies: file -> files it depends on
    forward: HashMap<String, Vec<String>>,
    /// Reverse dependencies: file -> files that depend on it
    reverse: HashMap<String, Vec<String>>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of dependencies. Neighbour lists are sorted.
    pub fn from_dependencies(dependencies: &[FileDependency]) -> Self {
        let mut cache = Self::new();
        for dep in dependencies {
            cache
                .forward
                .entry(dep.from_file.clone())
                .or_default()
                .push(dep.to_file.clone());
            cache
                .reverse
                .entry(dep.to_file.clone())
                .or_default()
                .push(dep.from_file.clone());
        }
        for list in cache.forward.values_mut().chain(cache.reverse.values_mut()) {
            list.sort();
            list.dedup();
        }
        cache
    }

    /// Files that `file` depends on.
    pub fn get_dependencies(&self, file: &str) -> &[String] {
        self.forward.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Files that depend on `file`.
    pub fn get_dependents(&self, file: &str) -> &[String] {
        self.reverse.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every file that appears on either side of an edge, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .forward
            .keys()
            .chain(self.reverse.keys())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        files.sort();
        files
    }
}

macro_rules! sql_text_enum {
    ($ty:ty, $what:literal) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                <$ty>::parse(s)
                    .ok_or_else(|| FromSqlError::Other(format!("unknown {}: {s}", $what).into()))
            }
        }
    };
}

sql_text_enum!(SymbolKind, "symbol kind");
sql_text_enum!(ExportKind, "export kind");
sql_text_enum!(DependencyKind, "dependency kind");

const SYMBOL_COLUMNS: &str = "id, file, name, kind, start_line, end_line, start_col, end_col, signature, doc, export_kind, visibility, parent";
const FILE_COLUMNS: &str = "path, rel_path, language, size, hash, mtime, line_count, is_generated, indexed_at, parse_error";

/// SQLite-backed index for one repository.
///
/// The connection is guarded by a mutex, so a single handle can be shared by
/// one writer and any number of readers. Every multi-row write runs in one
/// transaction; readers see either the old or the new rows of a file.
#[derive(Debug)]
pub struct IndexStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl IndexStore {
    /// Open a database, creating it if it doesn't exist.
    /// Use `try_open()` for version-aware opening of existing indexes.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open index database {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Try to open a database with version and integrity checking.
    /// Returns `DbOpenResult::NeedsRegeneration` instead of touching an unusable file.
    pub fn try_open(path: &Path) -> Result<DbOpenResult> {
        if !path.exists() {
            return Ok(DbOpenResult::Ready(Self::open(path)?));
        }

        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(e) => {
                return Ok(DbOpenResult::NeedsRegeneration {
                    reason: RegenerationReason::CorruptDatabase(e.to_string()),
                    path: path.to_path_buf(),
                })
            }
        };

        match conn.query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0)) {
            Ok(status) if status == "ok" => {}
            Ok(status) => {
                return Ok(DbOpenResult::NeedsRegeneration {
                    reason: RegenerationReason::CorruptDatabase(status),
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Ok(DbOpenResult::NeedsRegeneration {
                    reason: RegenerationReason::CorruptDatabase(e.to_string()),
                    path: path.to_path_buf(),
                })
            }
        }

        if !Self::has_schema_meta(&conn) {
            return Ok(DbOpenResult::NeedsRegeneration {
                reason: RegenerationReason::MissingSchemaMeta,
                path: path.to_path_buf(),
            });
        }

        let db_version_str: Option<String> = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(db_version) = db_version_str.and_then(|s| SchemaVersion::parse(&s)) else {
            return Ok(DbOpenResult::NeedsRegeneration {
                reason: RegenerationReason::MissingSchemaMeta,
                path: path.to_path_buf(),
            });
        };

        let current = SchemaVersion::current();
        if db_version.requires_regeneration(&current) {
            return Ok(DbOpenResult::NeedsRegeneration {
                reason: RegenerationReason::MajorVersionMismatch {
                    db_version: db_version.to_string(),
                    app_version: current.to_string(),
                },
                path: path.to_path_buf(),
            });
        }

        drop(conn);
        let store = Self::open(path)?;
        if db_version < current {
            info!("Upgrading index schema from {} to {}", db_version, current);
            store.conn().execute(
                "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
                params![current.to_string()],
            )?;
        }
        Ok(DbOpenResult::Ready(store))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                rel_path TEXT NOT NULL,
                language TEXT,
                size INTEGER NOT NULL,
                hash TEXT NOT NULL,
                mtime INTEGER NOT NULL,
                line_count INTEGER NOT NULL DEFAULT 0,
                is_generated INTEGER NOT NULL DEFAULT 0,
                indexed_at INTEGER NOT NULL,
                parse_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_files_language ON files(language);

            CREATE TABLE IF NOT EXISTS symbols (
                id TEXT PRIMARY KEY,
                file TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                start_col INTEGER NOT NULL,
                end_col INTEGER NOT NULL,
                signature TEXT,
                doc TEXT,
                export_kind TEXT NOT NULL DEFAULT 'none',
                visibility TEXT,
                parent TEXT
            );
            -- Lookups by name, kind and file; (file, start_line) also serves the default ordering
            CREATE INDEX IF NOT EXISTS idx_symbols_file_line ON symbols(file, start_line);
            CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
            CREATE INDEX IF NOT EXISTS idx_symbols_kind_name ON symbols(kind, name);
            CREATE INDEX IF NOT EXISTS idx_symbols_export ON symbols(export_kind, file);

            CREATE TABLE IF NOT EXISTS imports (
                file TEXT NOT NULL,
                target TEXT NOT NULL,
                names TEXT NOT NULL,
                kind TEXT NOT NULL,
                line INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_imports_file ON imports(file, line);

            CREATE TABLE IF NOT EXISTS exports (
                file TEXT NOT NULL,
                name TEXT NOT NULL,
                alias TEXT,
                is_default INTEGER NOT NULL DEFAULT 0,
                is_type_only INTEGER NOT NULL DEFAULT 0,
                is_reexport INTEGER NOT NULL DEFAULT 0,
                source TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_exports_file ON exports(file);

            -- Resolved file dependency graph, rebuilt on every indexing pass
            CREATE TABLE IF NOT EXISTS file_dependencies (
                from_file TEXT NOT NULL,
                to_file TEXT NOT NULL,
                kind TEXT NOT NULL,
                names TEXT NOT NULL,
                PRIMARY KEY (from_file, to_file)
            );
            -- Reverse lookups (who imports X)
            CREATE INDEX IF NOT EXISTS idx_deps_to_file ON file_dependencies(to_file, from_file);

            -- Pre-computed aggregates for instant file statistics
            CREATE TABLE IF NOT EXISTS file_stats (
                file TEXT PRIMARY KEY,
                symbol_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS repo_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version TEXT NOT NULL,
                root TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                last_commit TEXT,
                stats TEXT NOT NULL
            );

            -- Schema metadata for version tracking
            CREATE TABLE IF NOT EXISTS schema_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        self.ensure_schema_version()?;
        Ok(())
    }

    /// Ensure schema_meta has version info. Only inserts if not already present.
    fn ensure_schema_version(&self) -> Result<()> {
        let conn = self.conn();
        let now = now_unix();
        conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
            params![SchemaVersion::current().to_string()],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('tool_version', ?1)",
            params![env!("CARGO_PKG_VERSION")],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('created_at', ?1)",
            params![now.to_string()],
        )?;
        Ok(())
    }

    fn has_schema_meta(conn: &Connection) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_meta'",
            [],
            |_| Ok(true),
        )
        .unwrap_or(false)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Update query optimizer statistics. Call after bulk writes.
    pub fn analyze(&self) -> Result<()> {
        self.conn().execute_batch("ANALYZE")?;
        Ok(())
    }

    // ==================== Files ====================

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"))?;
        Ok(stmt.query_row(params![path], row_to_file).optional()?)
    }

    /// All file records ordered by path.
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM files ORDER BY path"))?;
        let rows = stmt
            .query_map([], row_to_file)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_paths(&self) -> Result<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT path FROM files")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(rows)
    }

    /// Replace everything owned by `file_record.path` in one transaction:
    /// symbols, imports, exports and outgoing edges are deleted, the new rows
    /// inserted and the file record upserted.
    pub fn save_file_index(
        &self,
        file_record: &FileRecord,
        symbols: &[SymbolRecord],
        imports: &[ImportRecord],
        exports: &[ExportRecord],
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let path = &file_record.path;
        tx.execute("DELETE FROM symbols WHERE file = ?1", params![path])?;
        tx.execute("DELETE FROM imports WHERE file = ?1", params![path])?;
        tx.execute("DELETE FROM exports WHERE file = ?1", params![path])?;
        tx.execute(
            "DELETE FROM file_dependencies WHERE from_file = ?1",
            params![path],
        )?;

        {
            let mut insert_symbol = tx.prepare_cached(&format!(
                "INSERT OR IGNORE INTO symbols({SYMBOL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ))?;
            for sym in symbols {
                insert_symbol.execute(params![
                    sym.id,
                    sym.file,
                    sym.name,
                    sym.kind,
                    sym.start_line,
                    sym.end_line,
                    sym.start_col,
                    sym.end_col,
                    sym.signature,
                    sym.doc,
                    sym.export_kind,
                    sym.visibility,
                    sym.parent
                ])?;
            }

            let mut insert_import = tx.prepare_cached(
                "INSERT INTO imports(file, target, names, kind, line) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for import in imports {
                insert_import.execute(params![
                    import.file,
                    import.target,
                    serde_json::to_string(&import.names)?,
                    import.kind,
                    import.line
                ])?;
            }

            let mut insert_export = tx.prepare_cached(
                "INSERT INTO exports(file, name, alias, is_default, is_type_only, is_reexport, source) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for export in exports {
                insert_export.execute(params![
                    export.file,
                    export.name,
                    export.alias,
                    export.is_default,
                    export.is_type_only,
                    export.is_reexport,
                    export.source
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO files(path, rel_path, language, size, hash, mtime, line_count, is_generated, indexed_at, parse_error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(path) DO UPDATE SET
                rel_path=excluded.rel_path,
                language=excluded.language,
                size=excluded.size,
                hash=excluded.hash,
                mtime=excluded.mtime,
                line_count=excluded.line_count,
                is_generated=excluded.is_generated,
                indexed_at=excluded.indexed_at,
                parse_error=excluded.parse_error
            "#,
            params![
                file_record.path,
                file_record.rel_path,
                file_record.language,
                file_record.size,
                file_record.hash,
                file_record.mtime,
                file_record.line_count,
                file_record.is_generated,
                file_record.indexed_at,
                file_record.parse_error
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO file_stats(file, symbol_count) VALUES (?1, ?2)
            ON CONFLICT(file) DO UPDATE SET symbol_count = excluded.symbol_count
            "#,
            params![path, symbols.len() as i64],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Remove a file and every row it owns or is the target of.
    pub fn remove_file(&self, path: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![path])?;
        tx.execute("DELETE FROM symbols WHERE file = ?1", params![path])?;
        tx.execute("DELETE FROM imports WHERE file = ?1", params![path])?;
        tx.execute("DELETE FROM exports WHERE file = ?1", params![path])?;
        tx.execute("DELETE FROM file_stats WHERE file = ?1", params![path])?;
        tx.execute(
            "DELETE FROM file_dependencies WHERE from_file = ?1 OR to_file = ?1",
            params![path],
        )?;
        tx.commit()?;
        debug!("Removed {path} from index");
        Ok(())
    }

    /// Symbol counts for every file.
    pub fn all_file_stats(&self) -> Result<Vec<FileStats>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT file, symbol_count FROM file_stats")?;
        let rows = stmt
            .query_map([], row_to_file_stats)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ==================== Imports / exports ====================

    /// Every stored import, ordered by file then line.
    pub fn all_imports(&self) -> Result<Vec<ImportRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT file, target, names, kind, line FROM imports ORDER BY file, line, rowid",
        )?;
        let rows = stmt
            .query_map([], row_to_import)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ==================== Dependencies ====================

    /// Drop every edge and insert `dependencies` in one transaction.
    pub fn replace_all_dependencies(&self, dependencies: &[FileDependency]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM file_dependencies", [])?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR REPLACE INTO file_dependencies(from_file, to_file, kind, names) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for dep in dependencies {
                insert.execute(params![
                    dep.from_file,
                    dep.to_file,
                    dep.kind,
                    serde_json::to_string(&dep.names)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Edges leaving `file` (what it imports).
    pub fn get_file_dependencies(&self, file: &str) -> Result<Vec<FileDependency>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT from_file, to_file, kind, names FROM file_dependencies WHERE from_file = ?1 ORDER BY to_file",
        )?;
        let rows = stmt
            .query_map(params![file], row_to_dependency)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Edges arriving at `file` (who imports it).
    pub fn get_dependents(&self, file: &str) -> Result<Vec<FileDependency>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT from_file, to_file, kind, names FROM file_dependencies WHERE to_file = ?1 ORDER BY from_file",
        )?;
        let rows = stmt
            .query_map(params![file], row_to_dependency)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All edges, ordered by source then target.
    pub fn get_all_dependencies(&self) -> Result<Vec<FileDependency>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT from_file, to_file, kind, names FROM file_dependencies ORDER BY from_file, to_file",
        )?;
        let rows = stmt
            .query_map([], row_to_dependency)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Load all edges into a `DependencyCache` with a single read.
    pub fn load_dependency_cache(&self) -> Result<DependencyCache> {
        let deps = self.get_all_dependencies()?;
        Ok(DependencyCache::from_dependencies(&deps))
    }

    // ==================== Symbols ====================

    /// Query symbols ordered by file path, then start line (then name and id,
    /// so the order is total and pages never overlap).
    pub fn query_symbols(
        &self,
        filter: &SymbolFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<SymbolRecord>> {
        let mut sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols");
        let mut values: Vec<Value> = Vec::new();
        let mut clauses: Vec<String> = Vec::new();

        if let Some(name) = &filter.name {
            clauses.push("name = ?".into());
            values.push(Value::from(name.clone()));
        }

        if let Some(pattern) = &filter.name_pattern {
            clauses.push("name LIKE ? ESCAPE '\\'".into());
            values.push(Value::from(glob_to_like(pattern)));
        }

        if !filter.kinds.is_empty() {
            let placeholders = vec!["?"; filter.kinds.len()].join(", ");
            clauses.push(format!("kind IN ({placeholders})"));
            for kind in &filter.kinds {
                values.push(Value::from(kind.as_str().to_string()));
            }
        }

        if let Some(file) = &filter.file {
            if file.ends_with('/') {
                clauses.push("file LIKE ? ESCAPE '\\'".into());
                values.push(Value::from(format!("{}%", escape_like(file))));
            } else {
                clauses.push("file = ?".into());
                values.push(Value::from(file.clone()));
            }
        }

        if filter.exported_only {
            clauses.push("export_kind != 'none'".into());
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(" ORDER BY file ASC, start_line ASC, name ASC, id ASC");

        if limit.is_some() || offset.is_some() {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(Value::from(limit.map(|l| l as i64).unwrap_or(-1)));
            values.push(Value::from(offset.unwrap_or(0) as i64));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), row_to_symbol)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ==================== Metadata ====================

    pub fn load_metadata(&self) -> Result<Option<RepoIndexMetadata>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT version, root, created_at, updated_at, last_commit, stats FROM repo_meta WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((version, root, created_at, updated_at, last_commit, stats)) = row else {
            return Ok(None);
        };
        let stats: IndexStatsSnapshot =
            serde_json::from_str(&stats).context("failed to decode stored index stats")?;
        Ok(Some(RepoIndexMetadata {
            version,
            root,
            created_at,
            updated_at,
            last_commit,
            stats,
        }))
    }

    /// Insert or update the metadata row. `created_at` is kept from the first write.
    pub fn save_metadata(&self, meta: &RepoIndexMetadata) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT INTO repo_meta(id, version, root, created_at, updated_at, last_commit, stats)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                root = excluded.root,
                updated_at = excluded.updated_at,
                last_commit = excluded.last_commit,
                stats = excluded.stats
            "#,
            params![
                meta.version,
                meta.root,
                meta.created_at,
                meta.updated_at,
                meta.last_commit,
                serde_json::to_string(&meta.stats)?
            ],
        )?;
        Ok(())
    }

    /// Count rows for the metadata snapshot. `last_duration_ms` is left at 0.
    pub fn compute_stats(&self) -> Result<IndexStatsSnapshot> {
        let conn = self.conn();
        let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |r| r.get(0)) };

        let mut files_by_language = BTreeMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT language, COUNT(*) FROM files WHERE language IS NOT NULL GROUP BY language",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (language, n) = row?;
                files_by_language.insert(language, n);
            }
        }

        Ok(IndexStatsSnapshot {
            total_files: count("SELECT COUNT(*) FROM files")?,
            indexed_files: count("SELECT COUNT(*) FROM files WHERE language IS NOT NULL")?,
            total_symbols: count("SELECT COUNT(*) FROM symbols")?,
            total_imports: count("SELECT COUNT(*) FROM imports")?,
            total_exports: count("SELECT COUNT(*) FROM exports")?,
            total_dependencies: count("SELECT COUNT(*) FROM file_dependencies")?,
            files_by_language,
            last_duration_ms: 0,
        })
    }

    /// Database size, schema version and recorded parse failures.
    pub fn health(&self) -> Result<IndexHealth> {
        let conn = self.conn();
        let size_bytes = fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        let last_updated = conn
            .query_row("SELECT MAX(indexed_at) FROM files", [], |row| {
                row.get::<_, Option<i64>>(0)
            })?
            .map(|ts| {
                chrono::DateTime::from_timestamp(ts, 0)
                    .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
                    .unwrap_or_else(|| ts.to_string())
            });

        let schema_version: String = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_else(|| "unknown".to_string());

        let parse_failures: i64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE parse_error IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT rel_path FROM files WHERE parse_error IS NOT NULL ORDER BY rel_path LIMIT ?1",
        )?;
        let failed_files = stmt
            .query_map(params![MAX_REPORTED_FAILURES], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(IndexHealth {
            size_bytes,
            last_updated,
            schema_version,
            parse_failures,
            failed_files,
        })
    }
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        rel_path: row.get(1)?,
        language: row.get(2)?,
        size: row.get(3)?,
        hash: row.get(4)?,
        mtime: row.get(5)?,
        line_count: row.get(6)?,
        is_generated: row.get(7)?,
        indexed_at: row.get(8)?,
        parse_error: row.get(9)?,
    })
}

fn row_to_symbol(row: &Row<'_>) -> rusqlite::Result<SymbolRecord> {
    Ok(SymbolRecord {
        id: row.get(0)?,
        file: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        start_col: row.get(6)?,
        end_col: row.get(7)?,
        signature: row.get(8)?,
        doc: row.get(9)?,
        export_kind: row.get(10)?,
        visibility: row.get(11)?,
        parent: row.get(12)?,
    })
}

fn row_to_import(row: &Row<'_>) -> rusqlite::Result<ImportRecord> {
    Ok(ImportRecord {
        file: row.get(0)?,
        target: row.get(1)?,
        names: decode_names(row, 2)?,
        kind: row.get(3)?,
        line: row.get(4)?,
    })
}

fn row_to_dependency(row: &Row<'_>) -> rusqlite::Result<FileDependency> {
    Ok(FileDependency {
        from_file: row.get(0)?,
        to_file: row.get(1)?,
        kind: row.get(2)?,
        names: decode_names(row, 3)?,
    })
}

fn row_to_file_stats(row: &Row<'_>) -> rusqlite::Result<FileStats> {
    Ok(FileStats {
        file: row.get(0)?,
        symbol_count: row.get(1)?,
    })
}

fn decode_names(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Convert a `*`/`?` glob into a SQL LIKE pattern (with `\` as escape).
fn glob_to_like(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mk_file_record(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            rel_path: path.trim_start_matches("/repo/").to_string(),
            language: Some("typescript".into()),
            size: 10,
            hash: "abc".into(),
            mtime: 0,
            line_count: 1,
            is_generated: false,
            indexed_at: now_unix(),
            parse_error: None,
        }
    }

    fn count_rows(store: &IndexStore, table: &str, file: &str) -> i64 {
        store
            .conn()
            .query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE file = ?1"),
                params![file],
                |row| row.get(0),
            )
            .unwrap()
    }

    fn mk_symbol(file: &str, name: &str, line: i64, export_kind: ExportKind) -> SymbolRecord {
        SymbolRecord {
            id: format!("{file}:{line}:{name}"),
            file: file.to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            start_line: line,
            end_line: line,
            start_col: 1,
            end_col: 10,
            signature: None,
            doc: None,
            export_kind,
            visibility: None,
            parent: None,
        }
    }

    fn mk_dep(from: &str, to: &str) -> FileDependency {
        FileDependency {
            from_file: from.into(),
            to_file: to.into(),
            kind: DependencyKind::Import,
            names: vec!["x".into()],
        }
    }

    #[test]
    fn store_roundtrip_save_query_and_remove() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();

        let rec = mk_file_record("/repo/a.ts");
        let sym = mk_symbol("/repo/a.ts", "hello", 1, ExportKind::Named);
        let import = ImportRecord {
            file: rec.path.clone(),
            target: "./b".into(),
            names: vec!["b".into()],
            kind: DependencyKind::Import,
            line: 1,
        };
        let export = ExportRecord {
            file: rec.path.clone(),
            name: "hello".into(),
            alias: None,
            is_default: false,
            is_type_only: false,
            is_reexport: false,
            source: None,
        };
        store
            .save_file_index(&rec, &[sym.clone()], &[import.clone()], &[export.clone()])
            .unwrap();

        assert_eq!(store.get_file(&rec.path).unwrap(), Some(rec.clone()));
        let symbols = store
            .query_symbols(
                &SymbolFilter {
                    name: Some("hello".into()),
                    ..Default::default()
                },
                None,
                None,
            )
            .unwrap();
        assert_eq!(symbols, vec![sym]);
        assert_eq!(store.all_imports().unwrap(), vec![import]);
        assert_eq!(count_rows(&store, "exports", &rec.path), 1);
        assert_eq!(
            store.all_file_stats().unwrap(),
            vec![FileStats {
                file: rec.path.clone(),
                symbol_count: 1,
            }]
        );

        store.remove_file(&rec.path).unwrap();
        assert!(store.get_file(&rec.path).unwrap().is_none());
        assert!(store.all_imports().unwrap().is_empty());
        assert_eq!(count_rows(&store, "exports", &rec.path), 0);
        assert!(store.all_file_stats().unwrap().is_empty());
        assert!(store
            .query_symbols(&SymbolFilter::default(), None, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn save_replaces_previous_rows_for_file() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        let rec = mk_file_record("/repo/a.ts");

        store
            .save_file_index(&rec, &[mk_symbol(&rec.path, "old", 1, ExportKind::None)], &[], &[])
            .unwrap();
        store
            .save_file_index(&rec, &[mk_symbol(&rec.path, "new", 2, ExportKind::None)], &[], &[])
            .unwrap();

        let names: Vec<String> = store
            .query_symbols(&SymbolFilter::default(), None, None)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["new".to_string()]);
        assert_eq!(store.list_paths().unwrap().len(), 1);
    }

    #[test]
    fn symbol_queries_filter_and_order() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        let b = mk_file_record("/repo/src/b.ts");
        let a = mk_file_record("/repo/src/a.ts");
        let mut class = mk_symbol(&b.path, "UserService", 1, ExportKind::Named);
        class.kind = SymbolKind::Class;
        store
            .save_file_index(
                &b,
                &[
                    mk_symbol(&b.path, "getUser", 9, ExportKind::None),
                    class,
                ],
                &[],
                &[],
            )
            .unwrap();
        store
            .save_file_index(&a, &[mk_symbol(&a.path, "getUserName", 3, ExportKind::Named)], &[], &[])
            .unwrap();

        let all: Vec<(String, i64)> = store
            .query_symbols(&SymbolFilter::default(), None, None)
            .unwrap()
            .into_iter()
            .map(|s| (s.name, s.start_line))
            .collect();
        assert_eq!(
            all,
            vec![
                ("getUserName".to_string(), 3),
                ("UserService".to_string(), 1),
                ("getUser".to_string(), 9),
            ]
        );

        let pattern = SymbolFilter {
            name_pattern: Some("get*".into()),
            ..Default::default()
        };
        assert_eq!(store.query_symbols(&pattern, None, None).unwrap().len(), 2);

        let classes = SymbolFilter {
            kinds: vec![SymbolKind::Class, SymbolKind::Interface],
            ..Default::default()
        };
        let found = store.query_symbols(&classes, None, None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "UserService");

        let exported = SymbolFilter {
            exported_only: true,
            file: Some("/repo/src/".into()),
            ..Default::default()
        };
        assert_eq!(store.query_symbols(&exported, None, None).unwrap().len(), 2);

        let page = store
            .query_symbols(&SymbolFilter::default(), Some(1), Some(1))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "UserService");

        let tail = store
            .query_symbols(&SymbolFilter::default(), None, Some(2))
            .unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].name, "getUser");
    }

    #[test]
    fn like_pattern_escapes_literals() {
        assert_eq!(glob_to_like("get_*"), "get\\_%");
        assert_eq!(glob_to_like("a?c"), "a_c");
        assert_eq!(escape_like("/tmp/50%/"), "/tmp/50\\%/");
    }

    #[test]
    fn dependency_edges_replace_and_query() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();

        store
            .replace_all_dependencies(&[mk_dep("/r/old.ts", "/r/x.ts")])
            .unwrap();
        store
            .replace_all_dependencies(&[
                mk_dep("/r/main.ts", "/r/utils.ts"),
                mk_dep("/r/main.ts", "/r/types.ts"),
                mk_dep("/r/utils.ts", "/r/types.ts"),
            ])
            .unwrap();

        assert_eq!(store.get_all_dependencies().unwrap().len(), 3);
        let out: Vec<String> = store
            .get_file_dependencies("/r/main.ts")
            .unwrap()
            .into_iter()
            .map(|d| d.to_file)
            .collect();
        assert_eq!(out, vec!["/r/types.ts", "/r/utils.ts"]);

        let incoming: Vec<String> = store
            .get_dependents("/r/types.ts")
            .unwrap()
            .into_iter()
            .map(|d| d.from_file)
            .collect();
        assert_eq!(incoming, vec!["/r/main.ts", "/r/utils.ts"]);
        assert!(store.get_dependents("/r/x.ts").unwrap().is_empty());
    }

    #[test]
    fn file_dependencies_removed_with_file() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        store
            .replace_all_dependencies(&[mk_dep("/r/a.ts", "/r/b.ts"), mk_dep("/r/b.ts", "/r/c.ts")])
            .unwrap();
        store.remove_file("/r/b.ts").unwrap();
        assert!(store.get_all_dependencies().unwrap().is_empty());
    }

    #[test]
    fn dependency_cache_provides_both_directions() {
        let cache = DependencyCache::from_dependencies(&[
            mk_dep("a", "b"),
            mk_dep("c", "b"),
            mk_dep("b", "d"),
        ]);
        assert_eq!(cache.get_dependents("b"), ["a".to_string(), "c".to_string()]);
        assert_eq!(cache.get_dependencies("b"), ["d".to_string()]);
        assert!(cache.get_dependents("a").is_empty());
        assert_eq!(cache.files(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn metadata_roundtrip_keeps_created_at() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        assert!(store.load_metadata().unwrap().is_none());

        let mut meta = RepoIndexMetadata {
            version: "1.0".into(),
            root: "/repo".into(),
            created_at: 100,
            updated_at: 100,
            last_commit: None,
            stats: IndexStatsSnapshot::default(),
        };
        store.save_metadata(&meta).unwrap();

        meta.created_at = 999;
        meta.updated_at = 200;
        meta.last_commit = Some("abc123".into());
        meta.stats.total_files = 3;
        store.save_metadata(&meta).unwrap();

        let loaded = store.load_metadata().unwrap().unwrap();
        assert_eq!(loaded.created_at, 100);
        assert_eq!(loaded.updated_at, 200);
        assert_eq!(loaded.last_commit.as_deref(), Some("abc123"));
        assert_eq!(loaded.stats.total_files, 3);
    }

    #[test]
    fn compute_stats_counts_languages() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        let ts = mk_file_record("/repo/a.ts");
        let mut py = mk_file_record("/repo/b.py");
        py.language = Some("python".into());
        let mut bin = mk_file_record("/repo/logo.png");
        bin.language = None;
        for rec in [&ts, &py, &bin] {
            store.save_file_index(rec, &[], &[], &[]).unwrap();
        }
        let stats = store.compute_stats().unwrap();
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.indexed_files, 2);
        assert_eq!(stats.files_by_language.get("python"), Some(&1));
        assert_eq!(stats.files_by_language.get("typescript"), Some(&1));
    }

    #[test]
    fn health_reports_parse_failures() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        let mut rec = mk_file_record("/repo/broken.ts");
        rec.parse_error = Some("parser returned no tree".into());
        store.save_file_index(&rec, &[], &[], &[]).unwrap();

        let health = store.health().unwrap();
        assert_eq!(health.parse_failures, 1);
        assert_eq!(health.failed_files, vec!["broken.ts".to_string()]);
        assert_eq!(health.schema_version, SchemaVersion::current().to_string());
        assert!(health.last_updated.is_some());
    }

    // ==================== Schema versioning ====================

    #[test]
    fn new_database_has_schema_version() {
        let dir = tempdir().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db")).unwrap();
        let version: String = store
            .conn()
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, format!("{}.{}", SCHEMA_MAJOR, SCHEMA_MINOR));
    }

    #[test]
    fn try_open_returns_ready_for_current_version() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        drop(IndexStore::open(&db_path).unwrap());

        match IndexStore::try_open(&db_path).unwrap() {
            DbOpenResult::Ready(_) => {}
            DbOpenResult::NeedsRegeneration { reason, .. } => {
                panic!("Expected Ready, got NeedsRegeneration: {}", reason.message())
            }
        }
    }

    #[test]
    fn corrupt_database_needs_regeneration() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        fs::write(&db_path, b"this is definitely not an sqlite database file, just text").unwrap();

        match IndexStore::try_open(&db_path).unwrap() {
            DbOpenResult::Ready(_) => panic!("Expected NeedsRegeneration for corrupt file"),
            DbOpenResult::NeedsRegeneration { reason, .. } => {
                assert!(matches!(reason, RegenerationReason::CorruptDatabase(_)));
            }
        }
    }

    #[test]
    fn database_without_schema_meta_needs_regeneration() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE files (path TEXT PRIMARY KEY)", [])
                .unwrap();
        }
        match IndexStore::try_open(&db_path).unwrap() {
            DbOpenResult::Ready(_) => panic!("Expected NeedsRegeneration"),
            DbOpenResult::NeedsRegeneration { reason, .. } => {
                assert!(matches!(reason, RegenerationReason::MissingSchemaMeta));
            }
        }
    }

    #[test]
    fn major_version_mismatch_triggers_regeneration() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let store = IndexStore::open(&db_path).unwrap();
            store
                .conn()
                .execute(
                    "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
                    params![format!("{}.0", SCHEMA_MAJOR + 1)],
                )
                .unwrap();
        }
        match IndexStore::try_open(&db_path).unwrap() {
            DbOpenResult::Ready(_) => panic!("Expected NeedsRegeneration"),
            DbOpenResult::NeedsRegeneration { reason, .. } => {
                assert!(matches!(
                    reason,
                    RegenerationReason::MajorVersionMismatch { .. }
                ));
            }
        }
    }

    #[test]
    fn schema_version_parsing_and_comparison() {
        let v = SchemaVersion::parse("1.2").unwrap();
        assert_eq!(v, SchemaVersion { major: 1, minor: 2 });
        assert!(SchemaVersion::parse("1").is_none());
        assert!(SchemaVersion::parse("a.b").is_none());
        assert!(v.requires_regeneration(&SchemaVersion { major: 2, minor: 0 }));
        assert!(!v.requires_regeneration(&SchemaVersion { major: 1, minor: 5 }));
    }
}
