//! Core abstractions for source extractors.
//!
//! This module defines the `SourceExtractor` trait and the vocabulary types
//! shared by every language:
//! - a single extraction contract (`Extraction`) for the indexer
//! - a common symbol kind and export model across languages
//! - dispatch by language tag via `ExtractorRegistry`

use crate::store::{ExportRecord, ImportRecord, SymbolRecord};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Everything extracted from a single file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Symbol definitions found in the file
    pub symbols: Vec<SymbolRecord>,
    /// Import statements as written, before resolution
    pub imports: Vec<ImportRecord>,
    /// Names the file makes visible to other modules
    pub exports: Vec<ExportRecord>,
}

/// Configuration for a source extractor.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Language tag stored on file records (e.g. "typescript", "rust")
    pub name: &'static str,
    /// File extensions this extractor handles, without the dot
    pub extensions: &'static [&'static str],
}

/// The capability boundary between the indexer and language support.
///
/// Implementations must be deterministic: identical `(path, source)` yields an
/// identical `Extraction`. An `Err` means no syntax tree could be produced at
/// all; syntax errors inside a file are not errors, the extractor returns what
/// the error-tolerant parser recovered.
pub trait SourceExtractor: Send + Sync {
    /// Get extractor configuration (language tag, extensions).
    fn config(&self) -> LanguageConfig;

    /// Extract symbols, imports and exports from one file.
    ///
    /// `path` is the absolute file path; it becomes the `file` of every record.
    fn extract(&self, path: &Path, source: &str) -> Result<Extraction>;

    /// Check if this extractor handles files with the given extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.config().extensions.contains(&ext)
    }
}

/// Standardized symbol kinds across all languages.
///
/// Language constructs map onto this vocabulary: a Rust `struct` is a class,
/// a `trait` an interface, a Python `UPPER_CASE` binding a constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
    Method,
    Property,
    Enum,
    Module,
    Namespace,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 11] = [
        SymbolKind::Function,
        SymbolKind::Class,
        SymbolKind::Interface,
        SymbolKind::Type,
        SymbolKind::Variable,
        SymbolKind::Constant,
        SymbolKind::Method,
        SymbolKind::Property,
        SymbolKind::Enum,
        SymbolKind::Module,
        SymbolKind::Namespace,
    ];

    /// Convert to storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Enum => "enum",
            SymbolKind::Module => "module",
            SymbolKind::Namespace => "namespace",
        }
    }

    /// Parse from storage string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a symbol is exposed by its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Default,
    Named,
    #[default]
    None,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Default => "default",
            ExportKind::Named => "named",
            ExportKind::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(ExportKind::Default),
            "named" => Some(ExportKind::Named),
            "none" => Some(ExportKind::None),
            _ => None,
        }
    }

    pub fn is_exported(&self) -> bool {
        *self != ExportKind::None
    }
}

/// Flavour of an import, carried onto the resolved file edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// Static import / use / from-import
    Import,
    /// CommonJS `require()` or `import x = require()`
    Require,
    /// Runtime `import()`
    Dynamic,
    /// `import type` / `export type ... from`
    TypeOnly,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Import => "import",
            DependencyKind::Require => "require",
            DependencyKind::Dynamic => "dynamic",
            DependencyKind::TypeOnly => "type_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(DependencyKind::Import),
            "require" => Some(DependencyKind::Require),
            "dynamic" => Some(DependencyKind::Dynamic),
            "type_only" => Some(DependencyKind::TypeOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_roundtrip() {
        for kind in SymbolKind::ALL {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("struct"), None);
    }

    #[test]
    fn dependency_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DependencyKind::TypeOnly).unwrap(),
            "\"type_only\""
        );
        assert_eq!(DependencyKind::parse("type_only"), Some(DependencyKind::TypeOnly));
    }

    #[test]
    fn export_kind_exposure() {
        assert!(ExportKind::Default.is_exported());
        assert!(ExportKind::Named.is_exported());
        assert!(!ExportKind::None.is_exported());
        assert_eq!(ExportKind::parse("named"), Some(ExportKind::Named));
    }
}
