pub mod python;
pub mod registry;
pub mod rust;
pub mod traits;
pub mod typescript;

use crate::store::SymbolRecord;
use traits::{ExportKind, SymbolKind};
use tree_sitter::Node;

// ============================================================================
// Shared extractor utilities
// ============================================================================

/// Longest signature kept on a symbol, in characters.
const MAX_SIGNATURE_CHARS: usize = 200;

/// Extract the text content of a tree-sitter node from source code.
pub fn slice(source: &str, node: &Node) -> String {
    let bytes = node.byte_range();
    source.get(bytes).unwrap_or_default().trim().to_string()
}

/// Strip one layer of string quotes (`'`, `"` or `` ` ``) from a literal.
pub fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// Stable symbol id: first 16 hex chars of blake3(`file:start_line:name`).
pub fn symbol_id(file: &str, start_line: i64, name: &str) -> String {
    let hash = blake3::hash(format!("{file}:{start_line}:{name}").as_bytes());
    hash.to_hex()[..16].to_string()
}

/// Build a symbol record for `node` with 1-based positions and a signature.
/// Doc, export kind and visibility are left for the caller to fill in.
pub fn make_symbol(
    file: &str,
    source: &str,
    node: &Node,
    name: &str,
    kind: SymbolKind,
    parent: Option<&str>,
) -> SymbolRecord {
    let start = node.start_position();
    let end = node.end_position();
    let start_line = start.row as i64 + 1;
    SymbolRecord {
        id: symbol_id(file, start_line, name),
        file: file.to_string(),
        name: name.to_string(),
        kind,
        start_line,
        end_line: end.row as i64 + 1,
        start_col: start.column as i64 + 1,
        end_col: end.column as i64 + 1,
        signature: signature(source, node),
        doc: None,
        export_kind: ExportKind::None,
        visibility: None,
        parent: parent.map(str::to_string),
    }
}

/// Declaration header: everything before the `body` field, or the first line.
/// Whitespace runs are collapsed.
fn signature(source: &str, node: &Node) -> Option<String> {
    let head = match node.child_by_field_name("body") {
        Some(body) => source.get(node.start_byte()..body.start_byte())?,
        None => source
            .get(node.byte_range())?
            .lines()
            .next()
            .unwrap_or_default(),
    };
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = collapsed
        .trim_end_matches(|c| c == '{' || c == ':')
        .trim_end()
        .to_string();
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(MAX_SIGNATURE_CHARS).collect())
}

/// Collect the comment block directly above `node`.
///
/// Walks previous siblings while they are comments of `comment_kinds`
/// (stepping over `skip_kinds`, e.g. attributes) and keeps those accepted by
/// `is_doc`. Returns the comment text with markers stripped, top to bottom.
pub fn preceding_doc(
    source: &str,
    node: &Node,
    comment_kinds: &[&str],
    skip_kinds: &[&str],
    is_doc: impl Fn(&str) -> bool,
) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();
    let mut expected_row = node.start_position().row;
    while let Some(sibling) = current {
        let kind = sibling.kind();
        if skip_kinds.contains(&kind) {
            expected_row = sibling.start_position().row;
            current = sibling.prev_sibling();
            continue;
        }
        if !comment_kinds.contains(&kind) {
            break;
        }
        // A blank line separates the comment from the declaration
        if sibling.end_position().row + 1 < expected_row {
            break;
        }
        let text = slice(source, &sibling);
        if !is_doc(&text) {
            break;
        }
        lines.push(strip_comment_markers(&text));
        expected_row = sibling.start_position().row;
        current = sibling.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    let doc = lines.join("\n").trim().to_string();
    (!doc.is_empty()).then_some(doc)
}

fn strip_comment_markers(text: &str) -> String {
    let text = text
        .trim()
        .trim_start_matches("/**")
        .trim_start_matches("///")
        .trim_start_matches("//!")
        .trim_end_matches("*/");
    text.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
