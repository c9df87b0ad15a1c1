#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use repo_intel::history::{HistorySource, NoHistory};
use repo_intel::{IndexOptions, IndexSummary, Indexer};
use tempfile::TempDir;

use super::cli::CliRunner;

/// Builder for creating test workspaces with fluent API
pub struct TestWorkspaceBuilder {
    files: BTreeMap<PathBuf, String>,
    history: Option<Box<dyn HistorySource>>,
    auto_index: bool,
}

impl Default for TestWorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspaceBuilder {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            history: None,
            auto_index: true,
        }
    }

    /// Add a file with inline content
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.files.insert(path.as_ref().to_path_buf(), content.into());
        self
    }

    /// History the indexer consults (default: none)
    pub fn with_history(mut self, history: impl HistorySource + 'static) -> Self {
        self.history = Some(Box::new(history));
        self
    }

    /// Disable the initial indexing pass
    pub fn without_auto_index(mut self) -> Self {
        self.auto_index = false;
        self
    }

    pub fn build(self) -> Result<TestWorkspace> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path().canonicalize()?;

        for (path, content) in &self.files {
            let full_path = root.join(path);
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full_path, content)?;
        }

        let history = self.history.unwrap_or_else(|| Box::new(NoHistory));
        let indexer = Indexer::open(&root, history)?;
        if self.auto_index {
            indexer.index(&IndexOptions::default())?;
        }

        Ok(TestWorkspace {
            _temp_dir: temp_dir,
            root,
            indexer,
        })
    }
}

/// A test workspace with automatic cleanup
pub struct TestWorkspace {
    _temp_dir: TempDir,
    root: PathBuf,
    indexer: Indexer,
}

impl TestWorkspace {
    pub fn builder() -> TestWorkspaceBuilder {
        TestWorkspaceBuilder::new()
    }

    /// Canonical workspace root
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        Indexer::default_db_path(&self.root)
    }

    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    pub fn cli_bin() -> &'static str {
        env!("CARGO_BIN_EXE_repo-intel")
    }

    /// Run a CLI command against this workspace
    pub fn cli(&self) -> CliRunner<'_> {
        CliRunner::new(self)
    }

    /// Write or overwrite a file (does not re-index)
    pub fn write_file(&self, path: impl AsRef<Path>, content: impl AsRef<str>) -> Result<()> {
        let full_path = self.root.join(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, content.as_ref())?;
        Ok(())
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::remove_file(self.root.join(path))?;
        Ok(())
    }

    /// Run an incremental pass with default options
    pub fn reindex(&self) -> Result<IndexSummary> {
        self.indexer.index(&IndexOptions::default())
    }

    pub fn index_with(&self, options: &IndexOptions) -> Result<IndexSummary> {
        self.indexer.index(options)
    }

    /// Absolute stored form of a workspace-relative path
    pub fn path_str(&self, path: impl AsRef<Path>) -> String {
        self.root.join(path).to_string_lossy().into_owned()
    }
}
