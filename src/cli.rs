//! Command-line interface schema.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use repo_intel::analysis::{GraphFormat, HotspotMetric};
use repo_intel::indexer::Direction;
use repo_intel::languages::traits::SymbolKind;
use repo_intel::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "repo-intel",
    version,
    about = "Index a repository's symbols and file dependencies, then query impact and hotspots"
)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress and non-essential output. Errors still go to stderr.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format (text, json, jsonl, csv, tsv)
    #[arg(long, short = 'f', global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Repository root (auto-detected from .repo-intel/, .git/, package.json, etc. if not specified)
    #[arg(long, short = 'w', global = true, env = "REPO_INTEL_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Path to the index database (default: <workspace>/.repo-intel/index.db)
    #[arg(long, global = true, env = "REPO_INTEL_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct IndexArgs {
    /// Walk the whole tree instead of asking git what changed
    #[arg(long)]
    pub force: bool,
    /// Delete the index database and build it from scratch
    #[arg(long)]
    pub rebuild: bool,
    /// Do not consult git (full discovery every run, zero churn)
    #[arg(long)]
    pub no_git: bool,
    /// Only extract these languages (typescript, javascript, python, rust)
    #[arg(long = "language", value_delimiter = ',')]
    pub languages: Vec<String>,
    /// Only index paths matching these globs
    #[arg(long)]
    pub include: Vec<String>,
    /// Skip paths matching these globs
    #[arg(long)]
    pub exclude: Vec<String>,
    /// Record files larger than this many bytes without extracting them
    #[arg(long)]
    pub max_file_size: Option<u64>,
    /// Follow symbolic links during discovery
    #[arg(long)]
    pub follow_symlinks: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index (or incrementally update) the repository
    Index(IndexArgs),
    /// Show index metadata and health
    Status,
    /// List symbols from the index
    Symbols {
        /// Exact symbol name
        #[arg(long, conflicts_with = "pattern")]
        name: Option<String>,
        /// Name pattern with * and ? wildcards (case-insensitive)
        #[arg(long)]
        pattern: Option<String>,
        /// Only these kinds (repeatable or comma-separated)
        #[arg(long, value_delimiter = ',', value_parser = parse_symbol_kind)]
        kind: Vec<SymbolKind>,
        /// Only symbols in this file, or under this directory when it ends with /
        #[arg(long)]
        file: Option<String>,
        /// Only exported symbols
        #[arg(long)]
        exported: bool,
        /// Limit the number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Number of results to skip (for pagination)
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Show the files a file imports, or the files importing it
    Deps {
        /// File to inspect (repository-relative or absolute)
        #[arg(long)]
        file: String,
        #[arg(long, value_enum, default_value = "outgoing")]
        direction: Direction,
    },
    /// Estimate which files are affected by changing the given files
    Impact {
        /// Changed files (repository-relative or absolute)
        #[arg(required = true)]
        files: Vec<String>,
        /// How many levels of dependents to follow
        #[arg(long, default_value_t = 3)]
        depth: usize,
        /// Keep test files in the traversal
        #[arg(long)]
        include_tests: bool,
    },
    /// Rank files by dependencies, dependents, symbol count or churn
    Hotspots {
        #[arg(long, value_enum, default_value = "dependents")]
        metric: HotspotMetric,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Do not consult git (churn scores are zero)
        #[arg(long)]
        no_git: bool,
    },
    /// Export the file dependency graph
    Graph {
        #[arg(long, value_enum, default_value = "adjacency")]
        graph_format: GraphFormat,
        /// Only edges whose source is fewer than this many hops from an entry file
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Index, then re-index on file changes until ctrl-c
    Watch {
        #[command(flatten)]
        index: IndexArgs,
        /// Quiet period in milliseconds before a pass starts
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },
}

fn parse_symbol_kind(s: &str) -> Result<SymbolKind, String> {
    SymbolKind::parse(&s.to_ascii_lowercase()).ok_or_else(|| {
        let known: Vec<&str> = SymbolKind::ALL.iter().map(|k| k.as_str()).collect();
        format!("unknown symbol kind `{s}` (expected one of: {})", known.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_schema_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_symbol_filters() {
        let cli = Cli::parse_from([
            "repo-intel", "symbols", "--pattern", "get*", "--kind", "function,class", "--limit", "5",
        ]);
        match cli.command {
            Commands::Symbols { pattern, kind, limit, .. } => {
                assert_eq!(pattern.as_deref(), Some("get*"));
                assert_eq!(kind, vec![SymbolKind::Function, SymbolKind::Class]);
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["repo-intel", "symbols", "--kind", "struct"]).is_err());
    }

    #[test]
    fn index_flags() {
        let cli = Cli::parse_from([
            "repo-intel", "-f", "json", "index", "--force", "--language", "python,rust", "--exclude", "gen/**",
        ]);
        assert!(matches!(cli.format, OutputFormat::Json));
        match cli.command {
            Commands::Index(args) => {
                assert!(args.force);
                assert_eq!(args.languages, vec!["python", "rust"]);
                assert_eq!(args.exclude, vec!["gen/**"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
