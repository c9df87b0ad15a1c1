//! Extractor registry for language dispatch.
//!
//! The `ExtractorRegistry` maps language tags to extractors and file
//! extensions to language tags, so the indexer never branches on language.

use super::traits::{Extraction, SourceExtractor};
use super::{python, rust, typescript};
use anyhow::{bail, Result};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Registry of source extractors keyed by language tag.
///
/// Use `ExtractorRegistry::new()` to create a registry with all built-in
/// extractors, or `ExtractorRegistry::empty()` to build one by hand in tests.
pub struct ExtractorRegistry {
    /// Language tag -> extractor
    extractors: HashMap<&'static str, Arc<dyn SourceExtractor>>,
    /// File extension (without dot, lowercase) -> language tag
    languages: HashMap<&'static str, &'static str>,
}

impl ExtractorRegistry {
    /// Create a new registry with all built-in extractors.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(typescript::TypeScriptExtractor::typescript());
        registry.register(typescript::TypeScriptExtractor::javascript());
        registry.register(python::PythonExtractor::new());
        registry.register(rust::RustExtractor::new());
        registry
    }

    /// Create an empty registry.
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
            languages: HashMap::new(),
        }
    }

    /// Register an extractor under its language tag and extensions.
    /// A later registration for the same tag or extension replaces the earlier one.
    pub fn register<E: SourceExtractor + 'static>(&mut self, extractor: E) {
        let config = extractor.config();
        for ext in config.extensions {
            self.languages.insert(ext, config.name);
        }
        self.extractors.insert(config.name, Arc::new(extractor));
    }

    /// Detect the language tag of a path from its extension.
    pub fn language_for_path(&self, path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.languages.get(ext.as_str()).copied()
    }

    /// Get the extractor registered for a language tag.
    pub fn get(&self, language: &str) -> Option<&dyn SourceExtractor> {
        self.extractors.get(language).map(|e| e.as_ref())
    }

    /// Extract a file with the extractor registered for `language`.
    ///
    /// # Errors
    /// Returns an error if no extractor is registered for the language,
    /// or if extraction fails.
    pub fn extract(&self, language: &str, path: &Path, source: &str) -> Result<Extraction> {
        match self.get(language) {
            Some(extractor) => extractor.extract(path, source),
            None => bail!("no extractor registered for language: {language}"),
        }
    }

    /// Get the tags of all registered languages, sorted.
    pub fn registered_languages(&self) -> Vec<&'static str> {
        let names: BTreeSet<_> = self.extractors.keys().copied().collect();
        names.into_iter().collect()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::traits::LanguageConfig;
    use std::path::PathBuf;

    struct NullExtractor;

    impl SourceExtractor for NullExtractor {
        fn config(&self) -> LanguageConfig {
            LanguageConfig {
                name: "null",
                extensions: &["null"],
            }
        }

        fn extract(&self, _path: &Path, _source: &str) -> Result<Extraction> {
            bail!("null extractor never produces a tree")
        }
    }

    #[test]
    fn registry_detects_builtin_languages() {
        let registry = ExtractorRegistry::new();
        let cases = [
            ("a.ts", "typescript"),
            ("a.tsx", "typescript"),
            ("a.mts", "typescript"),
            ("a.js", "javascript"),
            ("a.JSX", "javascript"),
            ("a.cjs", "javascript"),
            ("a.py", "python"),
            ("a.pyi", "python"),
            ("a.rs", "rust"),
        ];
        for (file, lang) in cases {
            assert_eq!(
                registry.language_for_path(&PathBuf::from(file)),
                Some(lang),
                "{file}"
            );
        }
    }

    #[test]
    fn registry_rejects_unsupported() {
        let registry = ExtractorRegistry::new();
        assert!(registry.language_for_path(&PathBuf::from("a.go")).is_none());
        assert!(registry.language_for_path(&PathBuf::from("Makefile")).is_none());
        assert!(registry
            .extract("cobol", Path::new("a.cbl"), "")
            .is_err());
    }

    #[test]
    fn registered_languages_returns_all() {
        let registry = ExtractorRegistry::new();
        assert_eq!(
            registry.registered_languages(),
            vec!["javascript", "python", "rust", "typescript"]
        );
    }

    #[test]
    fn custom_extractor_errors_surface() {
        let mut registry = ExtractorRegistry::empty();
        registry.register(NullExtractor);
        assert_eq!(
            registry.language_for_path(Path::new("x.null")),
            Some("null")
        );
        assert!(registry.extract("null", Path::new("x.null"), "").is_err());
    }
}
