use crate::languages::traits::{
    DependencyKind, ExportKind, Extraction, LanguageConfig, SourceExtractor, SymbolKind,
};
use crate::languages::{make_symbol, slice};
use crate::store::{normalize_path, ExportRecord, ImportRecord};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

static PYTHON_LANGUAGE: Lazy<Language> = Lazy::new(|| tree_sitter_python::LANGUAGE.into());

/// Python extractor.
///
/// Module-level names that do not start with `_` are treated as named
/// exports. Relative imports are rewritten to path form (`from ..a.b import c`
/// becomes target `../a/b`) so the resolver can match them against files.
#[derive(Clone)]
pub struct PythonExtractor;

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for PythonExtractor {
    fn config(&self) -> LanguageConfig {
        LanguageConfig {
            name: "python",
            extensions: &["py", "pyi"],
        }
    }

    fn extract(&self, path: &Path, source: &str) -> Result<Extraction> {
        let mut parser = Parser::new();
        parser
            .set_language(&PYTHON_LANGUAGE)
            .context("failed to set Python language")?;
        let tree = parser
            .parse(source, None)
            .context("failed to parse Python file")?;

        let mut walker = Walker {
            file: normalize_path(path),
            source,
            out: Extraction::default(),
        };
        let root = tree.root_node();
        walker.visit_block(root, None);
        walker.collect_imports(root);
        walker.apply_exports();
        Ok(walker.out)
    }
}

struct Walker<'a> {
    file: String,
    source: &'a str,
    out: Extraction,
}

impl Walker<'_> {
    /// Visit the statements of a module or class body. `class` is the id of
    /// the enclosing class, if any.
    fn visit_block(&mut self, node: Node, class: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "function_definition" | "class_definition" => self.declare(child, class),
                "decorated_definition" => {
                    if let Some(definition) = child.child_by_field_name("definition") {
                        self.declare(definition, class);
                    }
                }
                "expression_statement" => self.assignment(child, class),
                _ => {}
            }
        }
    }

    fn declare(&mut self, node: Node, class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = slice(self.source, &name_node);
        if name.is_empty() {
            return;
        }
        let kind = match (node.kind(), class) {
            ("class_definition", _) => SymbolKind::Class,
            (_, Some(_)) => SymbolKind::Method,
            _ => SymbolKind::Function,
        };

        let body = node.child_by_field_name("body");
        let mut sym = make_symbol(&self.file, self.source, &node, &name, kind, class);
        sym.doc = body.and_then(|b| docstring(self.source, &b));
        let id = sym.id.clone();
        self.out.symbols.push(sym);

        // Function bodies hold locals only; class bodies hold members
        if kind == SymbolKind::Class {
            if let Some(body) = body {
                self.visit_block(body, Some(&id));
            }
        }
    }

    /// `NAME = value` at module level (constant or variable) or in a class body (property).
    fn assignment(&mut self, statement: Node, class: Option<&str>) {
        let Some(assignment) = statement
            .named_child(0)
            .filter(|n| n.kind() == "assignment")
        else {
            return;
        };
        let Some(left) = assignment
            .child_by_field_name("left")
            .filter(|n| n.kind() == "identifier")
        else {
            return;
        };
        let name = slice(self.source, &left);
        let kind = match class {
            Some(_) => SymbolKind::Property,
            None if is_constant_name(&name) => SymbolKind::Constant,
            None => SymbolKind::Variable,
        };
        let sym = make_symbol(&self.file, self.source, &assignment, &name, kind, class);
        self.out.symbols.push(sym);
    }

    /// Collect import statements anywhere in the file (including inside functions).
    fn collect_imports(&mut self, root: Node) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "import_statement" => self.import_statement(node),
                "import_from_statement" => self.import_from_statement(node),
                _ => {
                    let mut cursor = node.walk();
                    let children: Vec<Node> = node.children(&mut cursor).collect();
                    stack.extend(children.into_iter().rev());
                }
            }
        }
    }

    /// `import a.b` / `import a.b as c`
    fn import_statement(&mut self, node: Node) {
        let mut cursor = node.walk();
        let modules: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for module in modules {
            let (target, local) = match module.kind() {
                "aliased_import" => {
                    let Some(name) = module.child_by_field_name("name") else {
                        continue;
                    };
                    let target = slice(self.source, &name);
                    let local = module
                        .child_by_field_name("alias")
                        .map(|a| slice(self.source, &a))
                        .unwrap_or_else(|| target.clone());
                    (target, local)
                }
                _ => {
                    let target = slice(self.source, &module);
                    let local = target.split('.').next().unwrap_or_default().to_string();
                    (target, local)
                }
            };
            if target.is_empty() {
                continue;
            }
            self.push_import(&node, target, vec![local]);
        }
    }

    /// `from x import a, b as c` / `from . import a` / `from ..pkg import *`
    fn import_from_statement(&mut self, node: Node) {
        let Some(module) = node.child_by_field_name("module_name") else {
            return;
        };

        let mut names = Vec::new();
        {
            let mut cursor = node.walk();
            for name in node.children_by_field_name("name", &mut cursor) {
                let original = match name.kind() {
                    "aliased_import" => name
                        .child_by_field_name("name")
                        .map(|n| slice(self.source, &n)),
                    _ => Some(slice(self.source, &name)),
                };
                if let Some(original) = original.filter(|n| !n.is_empty()) {
                    names.push(original);
                }
            }
        }
        let mut cursor = node.walk();
        if node
            .children(&mut cursor)
            .any(|c| c.kind() == "wildcard_import")
        {
            names.push("*".to_string());
        }

        let module_text = slice(self.source, &module);
        if module.kind() != "relative_import" {
            self.push_import(&node, module_text, names);
            return;
        }

        let (prefix, rest) = relative_module_path(&module_text);
        if !rest.is_empty() {
            self.push_import(&node, format!("{prefix}{rest}"), names);
            return;
        }
        // `from . import a, b` imports sibling modules
        for name in names {
            let target = if name == "*" {
                prefix.clone()
            } else {
                format!("{prefix}{name}")
            };
            self.push_import(&node, target, vec![name]);
        }
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

    fn apply_exports(&mut self) {
        for sym in self.out.symbols.iter_mut() {
            if sym.parent.is_some() || sym.name.starts_with('_') {
                continue;
            }
            sym.export_kind = ExportKind::Named;
            self.out.exports.push(ExportRecord {
                file: self.file.clone(),
                name: sym.name.clone(),
                alias: None,
                is_default: false,
                is_type_only: false,
                is_reexport: false,
                source: None,
            });
        }
    }
}

/// Split `..pkg.mod` into (`../`, `pkg/mod`).
fn relative_module_path(module: &str) -> (String, String) {
    let dots = module.chars().take_while(|c| *c == '.').count();
    let rest = module[dots..].replace('.', "/");
    let prefix = if dots <= 1 {
        "./".to_string()
    } else {
        "../".repeat(dots - 1)
    };
    (prefix, rest)
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic()) && !name.chars().any(|c| c.is_lowercase())
}

/// First statement of a body when it is a bare string literal.
fn docstring(source: &str, body: &Node) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let literal = first.named_child(0).filter(|n| n.kind() == "string")?;
    let raw = slice(source, &literal);
    let unprefixed = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find(|q| unprefixed.starts_with(**q) && unprefixed.ends_with(**q) && unprefixed.len() >= 2 * q.len())
        .map(|q| &unprefixed[q.len()..unprefixed.len() - q.len()])
        .unwrap_or(unprefixed);
    let doc = inner
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    (!doc.is_empty()).then_some(doc)
}
