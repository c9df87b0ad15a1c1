mod cli;
mod output;

use anyhow::{bail, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cli::{Cli, Commands, IndexArgs};
use output::{StatusOutput, SymbolOutput};
use repo_intel::config::load_config;
use repo_intel::history::{GitCli, HistorySource, NoHistory};
use repo_intel::indexer::{IndexProgress, Indexer};
use repo_intel::store::SymbolFilter;
use repo_intel::workspace::{resolve_db_path, resolve_workspace};
use repo_intel::{watch, ExitCode, IndexError, IndexMode, IndexOptions, OutputFormat};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code.into(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::Error.into()
        }
    }
}

fn init_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

struct Context {
    workspace: PathBuf,
    db: PathBuf,
    format: OutputFormat,
    quiet: bool,
}

impl Context {
    fn history(&self, no_git: bool) -> Box<dyn HistorySource> {
        if no_git {
            Box::new(NoHistory)
        } else {
            Box::new(GitCli::new(&self.workspace))
        }
    }

    /// Open an index that must already exist.
    fn open_existing(&self, history: Box<dyn HistorySource>) -> Result<Indexer> {
        if !self.db.exists() {
            bail!(
                "no index at {}. Run `repo-intel index` first",
                self.db.display()
            );
        }
        Indexer::open_with_db(&self.workspace, &self.db, history)
    }

    /// Open an index that has completed at least one run.
    fn open_indexed(&self, history: Box<dyn HistorySource>) -> Result<Indexer> {
        let indexer = self.open_existing(history)?;
        if indexer.status()?.is_none() {
            bail!(
                "index at {} is empty. Run `repo-intel index` first",
                self.db.display()
            );
        }
        Ok(indexer)
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let workspace = resolve_workspace(cli.workspace.as_deref())?;
    let db = resolve_db_path(cli.db.as_deref(), &workspace);
    debug!("workspace={} db={}", workspace.display(), db.display());
    let ctx = Context {
        workspace,
        db,
        format: cli.format,
        quiet: cli.quiet,
    };
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Index(args) => {
            let options = index_options(&ctx.workspace, &args)?;
            let indexer = open_for_indexing(&ctx, &args)?;
            let summary = if ctx.quiet {
                indexer.index(&options)?
            } else {
                let mut bar = ProgressReporter::new();
                let summary = indexer.index_with_progress(&options, &mut |p| bar.update(p))?;
                bar.finish();
                summary
            };
            output::write_summary(&mut out, ctx.format, &summary)?;
            Ok(ExitCode::Success)
        }
        Commands::Status => {
            let indexer = ctx.open_existing(Box::new(NoHistory))?;
            let metadata = indexer.status()?;
            let health = indexer.health()?;
            let status = StatusOutput {
                metadata: metadata.as_ref(),
                health: &health,
            };
            output::write_status(&mut out, ctx.format, &status)?;
            Ok(ExitCode::found(metadata.is_some()))
        }
        Commands::Symbols {
            name,
            pattern,
            kind,
            file,
            exported,
            limit,
            offset,
        } => {
            let indexer = ctx.open_indexed(Box::new(NoHistory))?;
            let filter = SymbolFilter {
                name,
                name_pattern: pattern,
                kinds: kind,
                file,
                exported_only: exported,
            };
            let symbols = indexer.query_symbols(&filter, limit, offset)?;
            let root = repo_intel::store::normalize_path(indexer.root());
            let rows: Vec<SymbolOutput> = symbols
                .iter()
                .map(|s| SymbolOutput::from_record(s, &root))
                .collect();
            output::write_rows(&mut out, ctx.format, &rows, "No symbols found.")?;
            Ok(ExitCode::found(!rows.is_empty()))
        }
        Commands::Deps { file, direction } => {
            let indexer = ctx.open_indexed(Box::new(NoHistory))?;
            let deps = match indexer.dependencies(&file, direction) {
                Ok(deps) => deps,
                Err(err) => {
                    if let Some(IndexError::FileNotIndexed(_)) = err.downcast_ref::<IndexError>() {
                        eprintln!("{err}");
                        return Ok(ExitCode::NotFound);
                    }
                    return Err(err);
                }
            };
            output::write_dependencies(&mut out, ctx.format, &deps)?;
            Ok(ExitCode::found(
                !deps.outgoing.is_empty() || !deps.incoming.is_empty(),
            ))
        }
        Commands::Impact {
            files,
            depth,
            include_tests,
        } => {
            let indexer = ctx.open_indexed(Box::new(NoHistory))?;
            let impact = indexer.analyze_impact(&files, depth, include_tests)?;
            output::write_impact(&mut out, ctx.format, &impact)?;
            Ok(ExitCode::Success)
        }
        Commands::Hotspots {
            metric,
            limit,
            no_git,
        } => {
            let indexer = ctx.open_indexed(ctx.history(no_git))?;
            let ranked = indexer.hotspots(metric, limit)?;
            output::write_rows(&mut out, ctx.format, &ranked, "No hotspots found.")?;
            Ok(ExitCode::found(!ranked.is_empty()))
        }
        Commands::Graph {
            graph_format,
            max_depth,
        } => {
            let indexer = ctx.open_indexed(Box::new(NoHistory))?;
            let graph = indexer.dependency_graph(graph_format, max_depth)?;
            writeln!(out, "{graph}")?;
            Ok(ExitCode::Success)
        }
        Commands::Watch { index, debounce_ms } => {
            let options = index_options(&ctx.workspace, &index)?;
            let indexer = open_for_indexing(&ctx, &index)?;
            let format = ctx.format;
            watch::run(
                &indexer,
                &options,
                Duration::from_millis(debounce_ms),
                &mut |summary| {
                    if let Err(err) = output::write_summary(&mut out, format, summary) {
                        log::warn!("failed to print summary: {err:#}");
                    }
                },
            )?;
            Ok(ExitCode::Success)
        }
    }
}

/// Defaults, then `.repo-intel/config.toml`, then flags.
fn index_options(workspace: &Path, args: &IndexArgs) -> Result<IndexOptions> {
    let config = load_config(workspace)?;
    let mut options = IndexOptions::from_config(&config);
    if args.force || args.rebuild {
        options.mode = IndexMode::Force;
    }
    if !args.languages.is_empty() {
        options.languages = Some(args.languages.clone());
    }
    if !args.include.is_empty() {
        options.include = args.include.clone();
    }
    if !args.exclude.is_empty() {
        options.exclude = args.exclude.clone();
    }
    if let Some(size) = args.max_file_size {
        options.max_file_size = size;
    }
    if args.follow_symlinks {
        options.follow_symlinks = true;
    }
    Ok(options)
}

fn open_for_indexing(ctx: &Context, args: &IndexArgs) -> Result<Indexer> {
    let history = ctx.history(args.no_git);
    if args.rebuild {
        return Indexer::rebuild_with_db(&ctx.workspace, &ctx.db, history);
    }
    Indexer::open_with_db(&ctx.workspace, &ctx.db, history)
}

/// Renders `IndexProgress` events as a progress bar on stderr.
struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_draw_target(ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }

    fn update(&mut self, progress: IndexProgress<'_>) {
        match progress {
            IndexProgress::Started { total } => self.bar.set_length(total as u64),
            IndexProgress::File { rel_path } => {
                self.bar.inc(1);
                self.bar.set_message(rel_path.to_string());
            }
            IndexProgress::Resolving => {
                self.bar.set_message("resolving dependencies");
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
            IndexProgress::Finished => {}
        }
    }

    fn finish(self) {
        self.bar.finish_and_clear();
    }
}
