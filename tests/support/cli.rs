#![allow(dead_code)]

use std::process::Command;

use anyhow::Result;

use super::workspace::TestWorkspace;

/// Runner for CLI commands against a test workspace
pub struct CliRunner<'a> {
    workspace: &'a TestWorkspace,
    args: Vec<String>,
    json: bool,
}

impl<'a> CliRunner<'a> {
    pub fn new(workspace: &'a TestWorkspace) -> Self {
        Self {
            workspace,
            args: Vec::new(),
            json: false,
        }
    }

    pub fn index(self) -> Self {
        self.arg("index")
    }

    pub fn status(self) -> Self {
        self.arg("status")
    }

    pub fn symbols(self) -> Self {
        self.arg("symbols")
    }

    pub fn deps(self, file: &str) -> Self {
        self.arg("deps").arg("--file").arg(file)
    }

    pub fn impact(self, files: &[&str]) -> Self {
        files.iter().fold(self.arg("impact"), |runner, f| runner.arg(*f))
    }

    pub fn hotspots(self) -> Self {
        self.arg("hotspots")
    }

    pub fn graph(self) -> Self {
        self.arg("graph")
    }

    pub fn kind(self, kind: &str) -> Self {
        self.arg("--kind").arg(kind)
    }

    pub fn name(self, name: &str) -> Self {
        self.arg("--name").arg(name)
    }

    pub fn limit(self, n: usize) -> Self {
        self.arg("--limit").arg(n.to_string())
    }

    /// Request JSON output
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Execute from the workspace root; git is never consulted unless asked
    pub fn run(self) -> Result<CliOutput> {
        let mut cmd = Command::new(TestWorkspace::cli_bin());
        if self.json {
            cmd.args(["--format", "json"]);
        }
        cmd.args(&self.args)
            .arg("--workspace")
            .arg(self.workspace.root())
            .env_remove("REPO_INTEL_WORKSPACE")
            .env_remove("REPO_INTEL_DB")
            .env_remove("RUST_LOG")
            .current_dir(self.workspace.root());

        let output = cmd.output()?;
        Ok(CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status,
            json_mode: self.json,
        })
    }
}

/// Output from a CLI command
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
    json_mode: bool,
}

impl CliOutput {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn assert_success(&self) -> &Self {
        assert!(
            self.status.success(),
            "Command failed with status {:?}\nstderr: {}\nstdout: {}",
            self.status,
            self.stderr,
            self.stdout
        );
        self
    }

    pub fn assert_code(&self, code: i32) -> &Self {
        assert_eq!(
            self.status.code(),
            Some(code),
            "unexpected exit status\nstderr: {}\nstdout: {}",
            self.stderr,
            self.stdout
        );
        self
    }

    pub fn assert_stdout_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stdout.contains(needle),
            "Expected stdout to contain '{}', got:\n{}",
            needle,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, needle: &str) -> &Self {
        assert!(
            self.stderr.contains(needle),
            "Expected stderr to contain '{}', got:\n{}",
            needle,
            self.stderr
        );
        self
    }

    /// Parse JSON output
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        assert!(self.json_mode, "Command was not run with --format json");
        Ok(serde_json::from_str(&self.stdout)?)
    }

    pub fn json_value(&self) -> Result<serde_json::Value> {
        self.json()
    }
}
