use crate::languages::traits::{
    DependencyKind, ExportKind, Extraction, LanguageConfig, SourceExtractor, SymbolKind,
};
use crate::languages::{make_symbol, preceding_doc, slice, unquote};
use crate::store::{normalize_path, ExportRecord, ImportRecord};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

static TS_LANGUAGE: Lazy<Language> =
    Lazy::new(|| tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
static TSX_LANGUAGE: Lazy<Language> = Lazy::new(|| tree_sitter_typescript::LANGUAGE_TSX.into());

/// TypeScript and JavaScript extractor. One instance per language tag; both
/// share the tree-sitter TypeScript grammars (JSX-capable for `.tsx` and all
/// JavaScript).
#[derive(Clone)]
pub struct TypeScriptExtractor {
    config: LanguageConfig,
}

impl TypeScriptExtractor {
    pub fn typescript() -> Self {
        Self {
            config: LanguageConfig {
                name: "typescript",
                extensions: &["ts", "tsx", "mts", "cts"],
            },
        }
    }

    pub fn javascript() -> Self {
        Self {
            config: LanguageConfig {
                name: "javascript",
                extensions: &["js", "jsx", "mjs", "cjs"],
            },
        }
    }

    fn grammar_for(&self, path: &Path) -> &'static Language {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if self.config.name == "javascript" || ext.eq_ignore_ascii_case("tsx") {
            &TSX_LANGUAGE
        } else {
            &TS_LANGUAGE
        }
    }
}

impl SourceExtractor for TypeScriptExtractor {
    fn config(&self) -> LanguageConfig {
        self.config.clone()
    }

    fn extract(&self, path: &Path, source: &str) -> Result<Extraction> {
        let mut parser = Parser::new();
        parser
            .set_language(self.grammar_for(path))
            .context("failed to set TypeScript language")?;
        let tree = parser
            .parse(source, None)
            .context("failed to parse TypeScript file")?;

        let mut walker = Walker {
            file: normalize_path(path),
            source,
            out: Extraction::default(),
        };
        let root = tree.root_node();
        walker.visit_container(root, None);
        walker.collect_imports(root);
        walker.apply_exports();
        walker.out.imports.sort_by_key(|i| i.line);
        Ok(walker.out)
    }
}

struct Walker<'a> {
    file: String,
    source: &'a str,
    out: Extraction,
}

impl Walker<'_> {
    /// Visit the statements of a program, class, interface or namespace body.
    fn visit_container(&mut self, node: Node, parent: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "export_statement" => self.handle_export(child, parent),
                "expression_statement" | "ambient_declaration" => {
                    self.visit_container(child, parent)
                }
                _ => {
                    self.declare(child, parent, child);
                }
            }
        }
    }

    /// Record the symbol(s) a declaration introduces and descend into its body.
    /// `anchor` is the node comments attach to (the export statement, if any).
    /// Returns indices into `out.symbols` of the declared top-level names.
    fn declare(&mut self, node: Node, parent: Option<&str>, anchor: Node) -> Vec<usize> {
        let kind = match node.kind() {
            "function_declaration"
            | "generator_function_declaration"
            | "function_signature"
            | "function_expression"
            | "function" => SymbolKind::Function,
            "class_declaration" | "abstract_class_declaration" | "class" => SymbolKind::Class,
            "interface_declaration" => SymbolKind::Interface,
            "type_alias_declaration" => SymbolKind::Type,
            "enum_declaration" => SymbolKind::Enum,
            "internal_module" => SymbolKind::Namespace,
            "module" => SymbolKind::Module,
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                SymbolKind::Method
            }
            "public_field_definition" | "property_signature" => SymbolKind::Property,
            "lexical_declaration" | "variable_declaration" => {
                return self.declare_variables(node, parent, anchor);
            }
            _ => return Vec::new(),
        };

        let Some(name_node) = node.child_by_field_name("name") else {
            return Vec::new();
        };
        let name = unquote(&slice(self.source, &name_node));
        if name.is_empty() {
            return Vec::new();
        }

        let mut sym = make_symbol(&self.file, self.source, &node, &name, kind, parent);
        sym.doc = jsdoc(self.source, &anchor);
        sym.visibility = accessibility(self.source, &node);
        let id = sym.id.clone();
        self.out.symbols.push(sym);
        let index = self.out.symbols.len() - 1;

        if matches!(
            kind,
            SymbolKind::Class | SymbolKind::Interface | SymbolKind::Namespace | SymbolKind::Module
        ) {
            if let Some(body) = node.child_by_field_name("body") {
                self.visit_container(body, Some(&id));
            }
        }
        vec![index]
    }

    fn declare_variables(&mut self, node: Node, parent: Option<&str>, anchor: Node) -> Vec<usize> {
        let is_const = node
            .child(0)
            .map(|first| first.kind() == "const")
            .unwrap_or(false);
        let mut declared = Vec::new();
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            // Destructuring patterns declare no single name
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = slice(self.source, &name_node);
            let is_function = declarator
                .child_by_field_name("value")
                .map(|v| {
                    matches!(
                        v.kind(),
                        "arrow_function" | "function_expression" | "function" | "generator_function"
                    )
                })
                .unwrap_or(false);
            let kind = if is_function {
                SymbolKind::Function
            } else if is_const {
                SymbolKind::Constant
            } else {
                SymbolKind::Variable
            };
            let mut sym = make_symbol(&self.file, self.source, &declarator, &name, kind, parent);
            sym.doc = jsdoc(self.source, &anchor);
            self.out.symbols.push(sym);
            declared.push(self.out.symbols.len() - 1);
        }
        declared
    }

    fn handle_export(&mut self, node: Node, parent: Option<&str>) {
        let is_default = has_child_kind(&node, "default");
        let is_type_only = has_child_kind(&node, "type");

        if let Some(source_node) = node.child_by_field_name("source") {
            self.handle_reexport(node, source_node, is_type_only);
            return;
        }

        if let Some(decl) = node.child_by_field_name("declaration") {
            let declared = self.declare(decl, parent, node);
            let decl_is_type = matches!(
                decl.kind(),
                "interface_declaration" | "type_alias_declaration"
            );
            for index in declared {
                if parent.is_some() {
                    // Exported from a namespace; visible through the namespace only
                    self.out.symbols[index].export_kind = ExportKind::Named;
                    continue;
                }
                let name = self.out.symbols[index].name.clone();
                self.out.exports.push(ExportRecord {
                    file: self.file.clone(),
                    name,
                    alias: None,
                    is_default,
                    is_type_only: decl_is_type,
                    is_reexport: false,
                    source: None,
                });
            }
            return;
        }

        if parent.is_some() {
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            // Named class/function expressions still declare a symbol
            let declared = self.declare(value, None, node);
            let name = match declared.first() {
                Some(&index) => self.out.symbols[index].name.clone(),
                None if value.kind() == "identifier" => slice(self.source, &value),
                None => "default".to_string(),
            };
            self.out.exports.push(ExportRecord {
                file: self.file.clone(),
                name,
                alias: None,
                is_default: true,
                is_type_only: false,
                is_reexport: false,
                source: None,
            });
            return;
        }

        if let Some(clause) = find_child(&node, "export_clause") {
            for (name, alias) in export_specifiers(self.source, &clause) {
                let is_default = alias.as_deref() == Some("default");
                self.out.exports.push(ExportRecord {
                    file: self.file.clone(),
                    name,
                    alias,
                    is_default,
                    is_type_only,
                    is_reexport: false,
                    source: None,
                });
            }
        }
    }

    /// `export { a } from './x'`, `export * from './x'`, `export * as ns from './x'`
    fn handle_reexport(&mut self, node: Node, source_node: Node, is_type_only: bool) {
        let target = unquote(&slice(self.source, &source_node));
        let mut names = Vec::new();

        if let Some(clause) = find_child(&node, "export_clause") {
            for (name, alias) in export_specifiers(self.source, &clause) {
                names.push(name.clone());
                self.out.exports.push(ExportRecord {
                    file: self.file.clone(),
                    name,
                    alias,
                    is_default: false,
                    is_type_only,
                    is_reexport: true,
                    source: Some(target.clone()),
                });
            }
        } else {
            let alias = find_child(&node, "namespace_export")
                .and_then(|ns| ns.named_child(0))
                .map(|id| slice(self.source, &id));
            names.push("*".to_string());
            self.out.exports.push(ExportRecord {
                file: self.file.clone(),
                name: "*".to_string(),
                alias,
                is_default: false,
                is_type_only,
                is_reexport: true,
                source: Some(target.clone()),
            });
        }

        self.out.imports.push(ImportRecord {
            file: self.file.clone(),
            target,
            names,
            kind: if is_type_only {
                DependencyKind::TypeOnly
            } else {
                DependencyKind::Import
            },
            line: line_of(&node),
        });
    }

    /// Collect `import` statements, `require()` and `import()` calls anywhere in the file.
    fn collect_imports(&mut self, root: Node) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_statement" => {
                    self.import_statement(node);
                    continue;
                }
                "call_expression" => self.call_expression(node),
                _ => {}
            }
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    fn import_statement(&mut self, node: Node) {
        let Some(source_node) = node.child_by_field_name("source") else {
            // import x = require('y')
            if let Some(clause) = find_child(&node, "import_require_clause") {
                if let Some(target) = clause.child_by_field_name("source") {
                    let names = find_child(&clause, "identifier")
                        .map(|id| vec![slice(self.source, &id)])
                        .unwrap_or_default();
                    self.push_import(&node, &target, names, DependencyKind::Require);
                }
            }
            return;
        };

        let kind = if has_child_kind(&node, "type") {
            DependencyKind::TypeOnly
        } else {
            DependencyKind::Import
        };

        let mut names = Vec::new();
        if let Some(clause) = find_child(&node, "import_clause") {
            let mut cursor = clause.walk();
            for child in clause.named_children(&mut cursor) {
                match child.kind() {
                    "identifier" => names.push(slice(self.source, &child)),
                    "namespace_import" => names.push("*".to_string()),
                    "named_imports" => {
                        let mut spec_cursor = child.walk();
                        for spec in child.named_children(&mut spec_cursor) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            if let Some(name) = spec.child_by_field_name("name") {
                                names.push(slice(self.source, &name));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self.push_import(&node, &source_node, names, kind);
    }

    fn call_expression(&mut self, node: Node) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let kind = match function.kind() {
            "import" => DependencyKind::Dynamic,
            "identifier" if slice(self.source, &function) == "require" => DependencyKind::Require,
            _ => return,
        };
        let Some(target) = node
            .child_by_field_name("arguments")
            .and_then(|args| args.named_child(0))
            .filter(|arg| arg.kind() == "string")
        else {
            return;
        };

        let names = match kind {
            DependencyKind::Require => required_names(self.source, &node),
            _ => Vec::new(),
        };
        self.push_import(&node, &target, names, kind);
    }

    fn push_import(&mut self, node: &Node, target: &Node, names: Vec<String>, kind: DependencyKind) {
        let target = unquote(&slice(self.source, target));
        if target.is_empty() {
            return;
        }
        self.out.imports.push(ImportRecord {
            file: self.file.clone(),
            target,
            names,
            kind,
            line: line_of(node),
        });
    }

    /// Mark top-level symbols named by local export records.
    fn apply_exports(&mut self) {
        for sym in self.out.symbols.iter_mut().filter(|s| s.parent.is_none()) {
            for export in self.out.exports.iter().filter(|e| !e.is_reexport) {
                if export.name != sym.name {
                    continue;
                }
                if export.is_default {
                    sym.export_kind = ExportKind::Default;
                } else if sym.export_kind == ExportKind::None {
                    sym.export_kind = ExportKind::Named;
                }
            }
        }
    }
}

/// Names bound by `const x = require(..)` or `const { a, b } = require(..)`.
fn required_names(source: &str, call: &Node) -> Vec<String> {
    let Some(declarator) = call
        .parent()
        .filter(|p| p.kind() == "variable_declarator")
    else {
        return Vec::new();
    };
    let Some(pattern) = declarator.child_by_field_name("name") else {
        return Vec::new();
    };
    match pattern.kind() {
        "identifier" => vec![slice(source, &pattern)],
        "object_pattern" => {
            let mut names = Vec::new();
            let mut cursor = pattern.walk();
            for child in pattern.named_children(&mut cursor) {
                match child.kind() {
                    "shorthand_property_identifier_pattern" => names.push(slice(source, &child)),
                    "pair_pattern" => {
                        if let Some(key) = child.child_by_field_name("key") {
                            names.push(slice(source, &key));
                        }
                    }
                    _ => {}
                }
            }
            names
        }
        _ => Vec::new(),
    }
}

fn export_specifiers(source: &str, clause: &Node) -> Vec<(String, Option<String>)> {
    let mut specs = Vec::new();
    let mut cursor = clause.walk();
    for spec in clause.named_children(&mut cursor) {
        if spec.kind() != "export_specifier" {
            continue;
        }
        let Some(name) = spec.child_by_field_name("name") else {
            continue;
        };
        let alias = spec
            .child_by_field_name("alias")
            .map(|a| slice(source, &a));
        specs.push((slice(source, &name), alias));
    }
    specs
}

fn jsdoc(source: &str, anchor: &Node) -> Option<String> {
    preceding_doc(source, anchor, &["comment"], &["decorator"], |text| {
        text.starts_with("/**")
    })
}

fn accessibility(source: &str, node: &Node) -> Option<String> {
    find_child(node, "accessibility_modifier").map(|m| slice(source, &m))
}

fn has_child_kind(node: &Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

fn find_child<'t>(node: &Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).find(|c| c.kind() == kind);
    found
}

fn line_of(node: &Node) -> i64 {
    node.start_position().row as i64 + 1
}
