#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use repo_intel::history::HistorySource;

#[derive(Default)]
struct State {
    head: Option<String>,
    changed: Vec<String>,
    untracked: Vec<String>,
    commits: HashMap<String, u64>,
    authors: HashMap<String, u64>,
    fail_diff: bool,
}

/// In-memory history whose answers tests set up front and change between runs.
/// Clones share state, so one handle can be given to the indexer and another
/// kept by the test.
#[derive(Clone, Default)]
pub struct ScriptedHistory {
    state: Arc<Mutex<State>>,
}

impl ScriptedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_head(&self, commit: &str) {
        self.state.lock().head = Some(commit.to_string());
    }

    /// Paths reported by `changed_files_since` on the next runs
    pub fn set_changed(&self, paths: &[&str]) {
        self.state.lock().changed = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn set_untracked(&self, paths: &[&str]) {
        self.state.lock().untracked = paths.iter().map(|p| p.to_string()).collect();
    }

    pub fn set_churn(&self, path: &str, commits: u64, authors: u64) {
        let mut state = self.state.lock();
        state.commits.insert(path.to_string(), commits);
        state.authors.insert(path.to_string(), authors);
    }

    /// Make `changed_files_since` fail, as when the recorded commit is gone
    pub fn fail_diff(&self) {
        self.state.lock().fail_diff = true;
    }
}

impl HistorySource for ScriptedHistory {
    fn head_commit(&self) -> Result<String> {
        match &self.state.lock().head {
            Some(head) => Ok(head.clone()),
            None => bail!("no commits"),
        }
    }

    fn changed_files_since(&self, since_ref: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        if state.fail_diff {
            bail!("unknown revision {since_ref}");
        }
        Ok(state.changed.clone())
    }

    fn untracked_files(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().untracked.clone())
    }

    fn commit_count(&self, path: &str, _since: &str) -> Result<u64> {
        Ok(self.state.lock().commits.get(path).copied().unwrap_or(0))
    }

    fn unique_author_count(&self, path: &str, _since: &str) -> Result<u64> {
        Ok(self.state.lock().authors.get(path).copied().unwrap_or(0))
    }
}
