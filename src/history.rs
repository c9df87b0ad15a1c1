//! Version-control history adapter.
//!
//! The indexer only needs a handful of facts from history: the current
//! commit, which paths changed since a recorded commit, untracked paths and
//! per-file churn counts. Every method may fail; callers treat failure as
//! "history unavailable" and fall back (full discovery, zero churn).

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Largest git stdout accepted before the child is killed.
pub const MAX_GIT_OUTPUT: u64 = 16 * 1024 * 1024;

/// Source of history facts. Paths are repository-relative and `/`-separated.
pub trait HistorySource: Send + Sync {
    /// Id of the current HEAD commit.
    fn head_commit(&self) -> Result<String>;

    /// Paths that differ between `since_ref` and the working tree (committed,
    /// staged or unstaged). Deleted paths are included.
    fn changed_files_since(&self, since_ref: &str) -> Result<Vec<String>>;

    /// Paths not tracked by version control and not ignored.
    fn untracked_files(&self) -> Result<Vec<String>>;

    /// Number of commits touching `path` since `since` (a date such as `2024-01-31`).
    fn commit_count(&self, path: &str, since: &str) -> Result<u64>;

    /// Number of distinct author emails on commits touching `path` since `since`.
    fn unique_author_count(&self, path: &str, since: &str) -> Result<u64>;
}

/// History backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Run git in the repository root and return stdout.
    ///
    /// stdout is read through a bounded buffer; past `MAX_GIT_OUTPUT` the
    /// child is killed and an error returned. stderr is discarded.
    fn run(&self, args: &[&str]) -> Result<String> {
        let mut child = Command::new("git")
            .arg("-c")
            .arg("core.quotepath=off")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to run git")?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("git stdout was not captured"))?;
        let mut buf = Vec::new();
        let read = stdout.take(MAX_GIT_OUTPUT + 1).read_to_end(&mut buf);
        if read.is_err() || buf.len() as u64 > MAX_GIT_OUTPUT {
            let _ = child.kill();
            let _ = child.wait();
            read.with_context(|| format!("failed to read output of git {}", args.join(" ")))?;
            bail!(
                "git {} produced more than {} bytes of output",
                args.join(" "),
                MAX_GIT_OUTPUT
            );
        }

        let status = child
            .wait()
            .with_context(|| format!("failed to wait for git {}", args.join(" ")))?;
        if !status.success() {
            bail!("git {} exited with {}", args.join(" "), status);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn lines(&self, args: &[&str]) -> Result<Vec<String>> {
        Ok(self
            .run(args)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl HistorySource for GitCli {
    fn head_commit(&self) -> Result<String> {
        let head = self.run(&["rev-parse", "HEAD"])?.trim().to_string();
        if head.is_empty() {
            bail!("git rev-parse HEAD returned nothing");
        }
        Ok(head)
    }

    fn changed_files_since(&self, since_ref: &str) -> Result<Vec<String>> {
        // `--relative` keeps paths rooted at `self.root` when it is below the toplevel
        let files = self.lines(&[
            "diff",
            "--name-only",
            "--no-renames",
            "--relative",
            since_ref,
            "--",
        ])?;
        debug!("{} paths changed since {since_ref}", files.len());
        Ok(files)
    }

    fn untracked_files(&self) -> Result<Vec<String>> {
        self.lines(&["ls-files", "--others", "--exclude-standard"])
    }

    fn commit_count(&self, path: &str, since: &str) -> Result<u64> {
        let since = format!("--since={since}");
        Ok(self.lines(&["log", &since, "--format=%H", "--", path])?.len() as u64)
    }

    fn unique_author_count(&self, path: &str, since: &str) -> Result<u64> {
        let since = format!("--since={since}");
        let authors: HashSet<String> = self
            .lines(&["log", &since, "--format=%ae", "--", path])?
            .into_iter()
            .collect();
        Ok(authors.len() as u64)
    }
}

/// History that is never available. Used with `--no-git` and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistorySource for NoHistory {
    fn head_commit(&self) -> Result<String> {
        bail!("history disabled")
    }

    fn changed_files_since(&self, _since_ref: &str) -> Result<Vec<String>> {
        bail!("history disabled")
    }

    fn untracked_files(&self) -> Result<Vec<String>> {
        bail!("history disabled")
    }

    fn commit_count(&self, _path: &str, _since: &str) -> Result<u64> {
        bail!("history disabled")
    }

    fn unique_author_count(&self, _path: &str, _since: &str) -> Result<u64> {
        bail!("history disabled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn git(root: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(root)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn no_history_always_fails() {
        let history = NoHistory;
        assert!(history.head_commit().is_err());
        assert!(history.changed_files_since("HEAD").is_err());
        assert!(history.untracked_files().is_err());
        assert!(history.commit_count("a.ts", "2024-01-01").is_err());
        assert!(history.unique_author_count("a.ts", "2024-01-01").is_err());
    }

    #[test]
    fn git_outside_repository_fails() {
        let dir = tempdir().unwrap();
        let history = GitCli::new(dir.path());
        // Either git is missing (spawn error) or it is not a repository
        assert!(history.head_commit().is_err());
    }

    #[test]
    fn git_reports_changes_and_churn() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let root = dir.path();
        git(root, &["init", "-q"]);
        fs::write(root.join("a.ts"), "export const a = 1;\n").unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "first"]);

        let history = GitCli::new(root);
        let first = history.head_commit().unwrap();
        assert_eq!(first.len(), 40);

        fs::write(root.join("a.ts"), "export const a = 2;\n").unwrap();
        fs::write(root.join("b.ts"), "export const b = 1;\n").unwrap();
        assert_eq!(history.changed_files_since(&first).unwrap(), vec!["a.ts"]);
        assert_eq!(history.untracked_files().unwrap(), vec!["b.ts"]);

        git(root, &["add", "."]);
        git(root, &["commit", "-q", "-m", "second"]);
        assert_eq!(history.commit_count("a.ts", "1970-01-02").unwrap(), 2);
        assert_eq!(history.unique_author_count("a.ts", "1970-01-02").unwrap(), 1);
        assert_ne!(history.head_commit().unwrap(), first);
    }

    #[test]
    fn git_paths_are_relative_to_a_nested_root() {
        if !git_available() {
            return;
        }
        let dir = tempdir().unwrap();
        let top = dir.path();
        let pkg = top.join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        git(top, &["init", "-q"]);
        fs::write(top.join("README.md"), "top\n").unwrap();
        fs::write(pkg.join("c.ts"), "export const c = 1;\n").unwrap();
        git(top, &["add", "."]);
        git(top, &["commit", "-q", "-m", "first"]);

        let history = GitCli::new(&pkg);
        let first = history.head_commit().unwrap();
        fs::write(top.join("README.md"), "changed\n").unwrap();
        fs::write(pkg.join("c.ts"), "export const d = 2;\n").unwrap();
        fs::write(pkg.join("e.ts"), "export const e = 3;\n").unwrap();

        assert_eq!(history.changed_files_since(&first).unwrap(), vec!["c.ts"]);
        assert_eq!(history.untracked_files().unwrap(), vec!["e.ts"]);
        assert_eq!(history.commit_count("c.ts", "1970-01-02").unwrap(), 1);
    }
}
