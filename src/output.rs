//! Output formatting for command results.
//!
//! Every command renders through the same five formats. Row-shaped results
//! implement `Tabular`; JSON renders the serde form of the whole result.

use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use repo_intel::analysis::{ImpactResult, RankedFile};
use repo_intel::indexer::{DependencyEntry, FileDependencies, IndexSummary};
use repo_intel::store::{IndexHealth, RepoIndexMetadata, SymbolRecord};
use repo_intel::OutputFormat;

/// Something that can be printed as a CSV/TSV row and a text line.
pub trait Tabular: Serialize {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<String>;
    fn text(&self) -> String;
}

/// Write `items` in `format`. Text output prints `empty` when there are none.
pub fn write_rows<T: Tabular, W: Write>(
    out: &mut W,
    format: OutputFormat,
    items: &[T],
    empty: &str,
) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(items)?)?,
        OutputFormat::Jsonl => {
            for item in items {
                writeln!(out, "{}", serde_json::to_string(item)?)?;
            }
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(&mut *out);
            wtr.write_record(T::headers())?;
            for item in items {
                wtr.write_record(item.row())?;
            }
            wtr.flush()?;
        }
        OutputFormat::Tsv => {
            writeln!(out, "{}", T::headers().join("\t"))?;
            for item in items {
                let row: Vec<String> = item.row().iter().map(|c| tsv_escape(c)).collect();
                writeln!(out, "{}", row.join("\t"))?;
            }
        }
        OutputFormat::Text => {
            if items.is_empty() {
                writeln!(out, "{empty}")?;
            }
            for item in items {
                writeln!(out, "{}", item.text())?;
            }
        }
    }
    Ok(())
}

fn tsv_escape(cell: &str) -> String {
    cell.replace(['\t', '\n'], " ")
}

/// Write a single structured value; `text` renders the text format.
fn write_value<T: Serialize, W: Write>(
    out: &mut W,
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&mut W) -> Result<()>,
) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        OutputFormat::Jsonl => writeln!(out, "{}", serde_json::to_string(value)?)?,
        OutputFormat::Csv | OutputFormat::Tsv | OutputFormat::Text => text(out)?,
    }
    Ok(())
}

// ==================== Symbols ====================

/// A symbol with a repository-relative file path.
#[derive(Serialize)]
pub struct SymbolOutput {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub file: String,
    pub start_line: i64,
    pub end_line: i64,
    pub export: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl SymbolOutput {
    pub fn from_record(sym: &SymbolRecord, root: &str) -> Self {
        let file = sym
            .file
            .strip_prefix(root)
            .map(|rel| rel.trim_start_matches('/'))
            .unwrap_or(&sym.file);
        Self {
            id: sym.id.clone(),
            name: sym.name.clone(),
            kind: sym.kind.to_string(),
            file: file.to_string(),
            start_line: sym.start_line,
            end_line: sym.end_line,
            export: sym.export_kind.as_str().to_string(),
            signature: sym.signature.clone(),
            doc: sym.doc.clone(),
        }
    }
}

impl Tabular for SymbolOutput {
    fn headers() -> &'static [&'static str] {
        &["name", "kind", "location", "export", "signature"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.kind.clone(),
            format!("{}:{}", self.file, self.start_line),
            self.export.clone(),
            self.signature.clone().unwrap_or_default(),
        ]
    }

    fn text(&self) -> String {
        let mut line = format!("{:<10} {:<30} {}:{}", self.kind, self.name, self.file, self.start_line);
        if let Some(sig) = &self.signature {
            line.push_str(&format!("\n           {sig}"));
        }
        line
    }
}

// ==================== Dependencies ====================

#[derive(Serialize)]
pub struct DependencyRow<'a> {
    pub direction: &'static str,
    #[serde(flatten)]
    pub entry: &'a DependencyEntry,
}

impl Tabular for DependencyRow<'_> {
    fn headers() -> &'static [&'static str] {
        &["direction", "file", "kind", "names"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.direction.to_string(),
            self.entry.path.clone(),
            self.entry.kind.to_string(),
            self.entry.names.join(","),
        ]
    }

    fn text(&self) -> String {
        let arrow = if self.direction == "outgoing" { "->" } else { "<-" };
        if self.entry.names.is_empty() {
            format!("  {arrow} {} ({})", self.entry.path, self.entry.kind)
        } else {
            format!(
                "  {arrow} {} ({}: {})",
                self.entry.path,
                self.entry.kind,
                self.entry.names.join(", ")
            )
        }
    }
}

pub fn dependency_rows(deps: &FileDependencies) -> Vec<DependencyRow<'_>> {
    deps.outgoing
        .iter()
        .map(|entry| DependencyRow {
            direction: "outgoing",
            entry,
        })
        .chain(deps.incoming.iter().map(|entry| DependencyRow {
            direction: "incoming",
            entry,
        }))
        .collect()
}

pub fn write_dependencies<W: Write>(
    out: &mut W,
    format: OutputFormat,
    deps: &FileDependencies,
) -> Result<()> {
    let rows = dependency_rows(deps);
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(deps)?)?,
        OutputFormat::Text => {
            writeln!(out, "{}", deps.file)?;
            write_rows(out, format, &rows, "  (no dependencies)")?;
        }
        _ => write_rows(out, format, &rows, "")?,
    }
    Ok(())
}

// ==================== Impact ====================

#[derive(Serialize)]
pub struct ImpactRow<'a> {
    pub relation: &'static str,
    pub file: &'a str,
}

impl Tabular for ImpactRow<'_> {
    fn headers() -> &'static [&'static str] {
        &["relation", "file"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.relation.to_string(), self.file.to_string()]
    }

    fn text(&self) -> String {
        format!("  {:<10} {}", self.relation, self.file)
    }
}

pub fn write_impact<W: Write>(out: &mut W, format: OutputFormat, impact: &ImpactResult) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Jsonl => write_value(out, format, impact, |_| Ok(())),
        OutputFormat::Csv | OutputFormat::Tsv => {
            let rows: Vec<ImpactRow> = [
                ("changed", &impact.changed_files),
                ("direct", &impact.direct_dependents),
                ("transitive", &impact.transitive_dependents),
            ]
            .into_iter()
            .flat_map(|(relation, files)| files.iter().map(move |file| ImpactRow { relation, file }))
            .collect();
            write_rows(out, format, &rows, "")
        }
        OutputFormat::Text => {
            writeln!(out, "Changed: {}", impact.changed_files.join(", "))?;
            writeln!(out, "Risk score: {}/100", impact.risk_score)?;
            writeln!(out, "Hotspot score: {}", impact.hotspot_score)?;
            writeln!(out, "Direct dependents ({}):", impact.direct_dependents.len())?;
            for file in &impact.direct_dependents {
                writeln!(out, "  {file}")?;
            }
            writeln!(out, "Transitive dependents ({}):", impact.transitive_dependents.len())?;
            for file in &impact.transitive_dependents {
                writeln!(out, "  {file}")?;
            }
            if !impact.affected_symbols.is_empty() {
                let names: Vec<&str> = impact.affected_symbols.iter().map(|s| s.name.as_str()).collect();
                writeln!(out, "Exported symbols: {}", names.join(", "))?;
            }
            Ok(())
        }
    }
}

// ==================== Hotspots ====================

impl Tabular for RankedFile {
    fn headers() -> &'static [&'static str] {
        &["path", "score", "details"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.path.clone(), self.score.to_string(), self.details.clone()]
    }

    fn text(&self) -> String {
        format!("{:>6}  {}  ({})", self.score, self.path, self.details)
    }
}

// ==================== Index / status ====================

pub fn write_summary<W: Write>(out: &mut W, format: OutputFormat, summary: &IndexSummary) -> Result<()> {
    write_value(out, format, summary, |out| {
        writeln!(
            out,
            "Indexed {} files, skipped {}, removed {} in {}ms",
            summary.indexed, summary.skipped, summary.removed, summary.duration_ms
        )?;
        for (language, count) in &summary.by_language {
            writeln!(out, "  {language}: {count}")?;
        }
        if !summary.errors.is_empty() {
            writeln!(out, "{} files failed:", summary.errors.len())?;
            for err in &summary.errors {
                writeln!(out, "  {}: {}", err.path, err.message)?;
            }
        }
        writeln!(
            out,
            "Index: {} files, {} symbols, {} dependencies",
            summary.stats.total_files, summary.stats.total_symbols, summary.stats.total_dependencies
        )?;
        Ok(())
    })
}

#[derive(Serialize)]
pub struct StatusOutput<'a> {
    pub metadata: Option<&'a RepoIndexMetadata>,
    pub health: &'a IndexHealth,
}

pub fn write_status<W: Write>(out: &mut W, format: OutputFormat, status: &StatusOutput<'_>) -> Result<()> {
    write_value(out, format, status, |out| {
        let Some(meta) = status.metadata else {
            writeln!(out, "Not indexed yet. Run `repo-intel index`.")?;
            return Ok(());
        };
        writeln!(out, "Root: {}", meta.root)?;
        writeln!(out, "Last updated: {}", status.health.last_updated.as_deref().unwrap_or("never"))?;
        writeln!(out, "Last commit: {}", meta.last_commit.as_deref().unwrap_or("(none)"))?;
        writeln!(
            out,
            "Files: {} ({} indexed)",
            meta.stats.total_files, meta.stats.indexed_files
        )?;
        for (language, count) in &meta.stats.files_by_language {
            writeln!(out, "  {language}: {count}")?;
        }
        writeln!(
            out,
            "Symbols: {}  Imports: {}  Exports: {}  Dependencies: {}",
            meta.stats.total_symbols,
            meta.stats.total_imports,
            meta.stats.total_exports,
            meta.stats.total_dependencies
        )?;
        writeln!(
            out,
            "Database: {} bytes, schema {}",
            status.health.size_bytes, status.health.schema_version
        )?;
        if status.health.parse_failures > 0 {
            writeln!(out, "Parse failures: {}", status.health.parse_failures)?;
            for file in &status.health.failed_files {
                writeln!(out, "  {file}")?;
            }
        }
        Ok(())
    })
}
