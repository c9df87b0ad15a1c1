use crate::discover::{is_in_skipped_dir, relative_path};
use crate::indexer::{IndexOptions, IndexSummary, Indexer};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Quiet period after the last relevant event before a pass starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Index once, then re-index after each burst of file changes until ctrl-c.
pub fn run(
    indexer: &Indexer,
    options: &IndexOptions,
    debounce: Duration,
    on_pass: &mut dyn FnMut(&IndexSummary),
) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst))
        .context("failed to install ctrl-c handler")?;
    run_until(indexer, options, debounce, &stop, on_pass)
}

/// Like `run`, stopping when `stop` is set.
pub fn run_until(
    indexer: &Indexer,
    options: &IndexOptions,
    debounce: Duration,
    stop: &AtomicBool,
    on_pass: &mut dyn FnMut(&IndexSummary),
) -> Result<()> {
    let root = indexer.root().to_path_buf();
    on_pass(&indexer.index(options)?);

    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        // Receiver gone means the loop has exited
        let _ = tx.send(res);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!("Watching {} for changes (ctrl-c to stop)", root.display());

    let mut pending_since: Option<Instant> = None;
    while !stop.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if is_relevant(&root, &event) {
                    pending_since = Some(Instant::now());
                } else {
                    debug!("ignoring event {:?}", event.kind);
                }
            }
            Ok(Err(err)) => warn!("watch error: {err}"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if let Some(since) = pending_since {
            if since.elapsed() >= debounce {
                pending_since = None;
                match indexer.index(options) {
                    Ok(summary) => on_pass(&summary),
                    Err(err) => warn!("indexing pass failed: {err:#}"),
                }
            }
        }
    }
    info!("Stopped watching {}", root.display());
    Ok(())
}

/// Whether an event touches a file the index could care about.
fn is_relevant(root: &Path, event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.iter().any(|path| {
        let rel = relative_path(root, path);
        !rel.starts_with('/') && !is_in_skipped_dir(&rel) && !path.is_dir()
    })
}
