use crate::languages::traits::{
    DependencyKind, ExportKind, Extraction, LanguageConfig, SourceExtractor, SymbolKind,
};
use crate::languages::{make_symbol, preceding_doc, slice};
use crate::store::{normalize_path, ExportRecord, ImportRecord};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

static RUST_LANGUAGE: Lazy<Language> = Lazy::new(|| tree_sitter_rust::LANGUAGE.into());

/// Rust extractor.
///
/// `mod foo;` declarations become relative imports so the resolver can link
/// module files; `use` paths are recorded as package imports and never
/// produce file edges.
#[derive(Clone)]
pub struct RustExtractor;

impl RustExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for RustExtractor {
    fn config(&self) -> LanguageConfig {
        LanguageConfig {
            name: "rust",
            extensions: &["rs"],
        }
    }

    fn extract(&self, path: &Path, source: &str) -> Result<Extraction> {
        let mut parser = Parser::new();
        parser
            .set_language(&RUST_LANGUAGE)
            .context("failed to set Rust language")?;
        let tree = parser
            .parse(source, None)
            .context("failed to parse Rust file")?;

        let mut walker = Walker {
            file: normalize_path(path),
            mod_dir: mod_dir_prefix(path),
            source,
            out: Extraction::default(),
        };
        walker.visit_items(tree.root_node(), None, false);
        walker.out.imports.sort_by_key(|i| i.line);
        Ok(walker.out)
    }
}

/// Directory prefix for child modules declared in `path`: module roots
/// (`mod.rs`, `lib.rs`, `main.rs`) own their directory, any other file owns
/// the directory named after its stem.
fn mod_dir_prefix(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    match stem {
        "mod" | "lib" | "main" | "" => "./".to_string(),
        other => format!("./{other}/"),
    }
}

struct Walker<'a> {
    file: String,
    mod_dir: String,
    source: &'a str,
    out: Extraction,
}

impl Walker<'_> {
    /// Visit the items of a file, inline module, trait or impl body.
    /// `in_impl` marks trait and impl bodies, where functions are methods.
    fn visit_items(&mut self, node: Node, parent: Option<&str>, in_impl: bool) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            let kind = match child.kind() {
                "function_item" | "function_signature_item" if in_impl => SymbolKind::Method,
                "function_item" | "function_signature_item" => SymbolKind::Function,
                "struct_item" | "union_item" => SymbolKind::Class,
                "enum_item" => SymbolKind::Enum,
                "trait_item" => SymbolKind::Interface,
                "type_item" => SymbolKind::Type,
                "const_item" | "static_item" => SymbolKind::Constant,
                "mod_item" => SymbolKind::Module,
                "impl_item" => {
                    self.visit_impl(child, parent);
                    continue;
                }
                "use_declaration" => {
                    self.use_declaration(child);
                    continue;
                }
                _ => continue,
            };
            self.declare(child, kind, parent);
        }
    }

    fn declare(&mut self, node: Node, kind: SymbolKind, parent: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = slice(self.source, &name_node);
        if name.is_empty() {
            return;
        }

        let body = node.child_by_field_name("body");
        if kind == SymbolKind::Module && body.is_none() {
            self.push_import(
                &node,
                format!("{}{name}", self.mod_dir),
                vec![name.clone()],
            );
        }

        let mut sym = make_symbol(&self.file, self.source, &node, &name, kind, parent);
        sym.doc = preceding_doc(
            self.source,
            &node,
            &["line_comment", "block_comment"],
            &["attribute_item"],
            |text| text.starts_with("///") || text.starts_with("/**"),
        );
        sym.visibility = visibility(self.source, &node);
        if sym
            .visibility
            .as_deref()
            .is_some_and(|v| v.starts_with("pub"))
        {
            sym.export_kind = ExportKind::Named;
            if parent.is_none() {
                self.out.exports.push(ExportRecord {
                    file: self.file.clone(),
                    name: name.clone(),
                    alias: None,
                    is_default: false,
                    is_type_only: matches!(kind, SymbolKind::Type | SymbolKind::Interface),
                    is_reexport: false,
                    source: None,
                });
            }
        }
        let id = sym.id.clone();
        self.out.symbols.push(sym);

        match (kind, body) {
            (SymbolKind::Interface, Some(body)) => self.visit_items(body, Some(&id), true),
            (SymbolKind::Module, Some(body)) => self.visit_items(body, Some(&id), false),
            _ => {}
        }
    }

    /// Methods of `impl Type` / `impl Trait for Type` attach to `Type` when it
    /// is declared in the same file.
    fn visit_impl(&mut self, node: Node, parent: Option<&str>) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let owner = node
            .child_by_field_name("type")
            .map(|ty| type_name(self.source, &ty))
            .and_then(|name| {
                self.out
                    .symbols
                    .iter()
                    .find(|s| s.name == name && s.parent.as_deref() == parent)
                    .map(|s| s.id.clone())
            });
        let impl_parent = owner.as_deref().or(parent);
        self.visit_items(body, impl_parent, true);
    }

    fn use_declaration(&mut self, node: Node) {
        let Some(argument) = node.child_by_field_name("argument") else {
            return;
        };
        let (target, names) = use_target(self.source, &argument);
        if target.is_empty() {
            return;
        }
        self.push_import(&node, target, names);
    }

    fn push_import(&mut self, node: &Node, target: String, names: Vec<String>) {
        self.out.imports.push(ImportRecord {
            file: self.file.clone(),
            target,
            names,
            kind: DependencyKind::Import,
            line: node.start_position().row as i64 + 1,
        });
    }
}

/// Split a `use` argument into (module path, imported names).
fn use_target(source: &str, node: &Node) -> (String, Vec<String>) {
    let text = |n: &Node| compact(&slice(source, n));
    match node.kind() {
        "scoped_identifier" => {
            let path = node.child_by_field_name("path").map(|p| text(&p));
            let name = node.child_by_field_name("name").map(|n| text(&n));
            match (path, name) {
                (Some(path), Some(name)) => (path, vec![name]),
                _ => (text(node), Vec::new()),
            }
        }
        "use_as_clause" => {
            let alias = node
                .child_by_field_name("alias")
                .map(|a| text(&a))
                .into_iter()
                .collect();
            let target = node
                .child_by_field_name("path")
                .map(|p| match p.kind() {
                    "scoped_identifier" => p
                        .child_by_field_name("path")
                        .map(|inner| text(&inner))
                        .unwrap_or_else(|| text(&p)),
                    _ => text(&p),
                })
                .unwrap_or_default();
            (target, alias)
        }
        "scoped_use_list" => {
            let target = node
                .child_by_field_name("path")
                .map(|p| text(&p))
                .unwrap_or_default();
            let names = node
                .child_by_field_name("list")
                .map(|list| use_list_names(source, &list))
                .unwrap_or_default();
            (target, names)
        }
        "use_wildcard" => {
            let full = text(node);
            let target = full.trim_end_matches('*').trim_end_matches("::").to_string();
            (target, vec!["*".to_string()])
        }
        _ => {
            let full = text(node);
            (full.clone(), vec![full])
        }
    }
}

fn use_list_names(source: &str, list: &Node) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = list.walk();
    for item in list.named_children(&mut cursor) {
        let name = match item.kind() {
            "scoped_identifier" => item.child_by_field_name("name"),
            "use_as_clause" => item.child_by_field_name("alias"),
            "scoped_use_list" => item.child_by_field_name("path"),
            "use_wildcard" => {
                names.push("*".to_string());
                continue;
            }
            _ => Some(item),
        };
        if let Some(name) = name {
            let text = compact(&slice(source, &name));
            let last = text.rsplit("::").next().unwrap_or_default().to_string();
            if !last.is_empty() {
                names.push(last);
            }
        }
    }
    names
}

/// Name of an impl's self type without generics or path (`a::Foo<T>` -> `Foo`).
fn type_name(source: &str, node: &Node) -> String {
    let base = match node.kind() {
        "generic_type" => node.child_by_field_name("type").unwrap_or(*node),
        _ => *node,
    };
    let text = slice(source, &base);
    text.rsplit("::").next().unwrap_or_default().to_string()
}

fn visibility(source: &str, node: &Node) -> Option<String> {
    let mut cursor = node.walk();
    let modifier = node
        .children(&mut cursor)
        .find(|c| c.kind() == "visibility_modifier")
        .map(|v| compact(&slice(source, &v)));
    modifier
}

fn compact(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join("")
}
