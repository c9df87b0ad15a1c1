//! Per-repository configuration read from `.repo-intel/config.toml`.
//!
//! Every key is optional; absent keys keep the built-in defaults and CLI
//! flags override whatever the file sets.

use crate::indexer::{IndexOptions, INDEX_DIR};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Language tags to extract (`typescript`, `javascript`, `python`, `rust`)
    pub languages: Option<Vec<String>>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Byte limit above which files are recorded without extraction
    pub max_file_size: Option<u64>,
    pub follow_symlinks: Option<bool>,
}

impl RepoConfig {
    /// Overlay the keys this config sets onto `options`.
    pub fn apply(&self, options: &mut IndexOptions) {
        if let Some(languages) = &self.languages {
            options.languages = Some(languages.clone());
        }
        if !self.include.is_empty() {
            options.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            options.exclude = self.exclude.clone();
        }
        if let Some(size) = self.max_file_size {
            options.max_file_size = size;
        }
        if let Some(follow) = self.follow_symlinks {
            options.follow_symlinks = follow;
        }
    }
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(INDEX_DIR).join(CONFIG_FILE)
}

/// Load `<root>/.repo-intel/config.toml`. A missing file yields defaults.
pub fn load_config(root: &Path) -> Result<RepoConfig> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(RepoConfig::default());
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: RepoConfig =
        toml::from_str(&contents).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::DEFAULT_MAX_FILE_SIZE;
    use tempfile::tempdir;

    fn write_config(root: &Path, contents: &str) {
        fs::create_dir_all(root.join(INDEX_DIR)).unwrap();
        fs::write(config_path(root), contents).unwrap();
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempdir().unwrap();
        assert_eq!(load_config(dir.path()).unwrap(), RepoConfig::default());
    }

    #[test]
    fn overlays_only_set_keys() {
        let dir = tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
languages = ["python"]
exclude = ["vendor/**"]
max_file_size = 2048
"#,
        );
        let config = load_config(dir.path()).unwrap();
        let options = IndexOptions::from_config(&config);
        assert_eq!(options.languages, Some(vec!["python".to_string()]));
        assert_eq!(options.exclude, vec!["vendor/**"]);
        assert!(options.include.is_empty());
        assert_eq!(options.max_file_size, 2048);
        assert!(!options.follow_symlinks);

        let defaults = IndexOptions::from_config(&RepoConfig::default());
        assert_eq!(defaults.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(defaults.languages, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), "max_filesize = 10\n");
        let err = load_config(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid config"));
    }
}
