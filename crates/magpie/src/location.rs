//
// location.rs
//
// Normalization of protocol location results
//

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use url::Url;

/// A fully assembled navigation result: workspace-relative file (when the
/// location lies under the root), 1-based line and column, rendered context.
/// (file, line, column) is the identity used for deduplication.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Location {
    pub symbol: String,
    pub file: String,
    pub line: u64,
    pub column: u64,
    pub context: Vec<String>,
}

/// One decoded (file, line, column) triple, before context is attached.
/// Paths are percent-decoded and absolute; line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLocation {
    pub path: PathBuf,
    pub line: u64,
    pub column: u64,
}

/// A named, kinded workspace-symbol hit with its kind still numeric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol {
    pub name: String,
    pub kind: u64,
    pub path: PathBuf,
    pub line: u64,
}

/// A workspace-symbol result as reported to the user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SymbolMatch {
    pub name: String,
    pub kind: String,
    pub file: String,
    pub line: u64,
}

/// Decode a definition/reference result. Servers answer with a single
/// Location, an array of Locations, or an array of LocationLinks; all three
/// shapes normalize to the same triples. Malformed entries are dropped.
pub fn parse_locations(result: &Value) -> Vec<RawLocation> {
    let items: Vec<&Value> = match result {
        Value::Array(values) => values.iter().collect(),
        Value::Object(_) => vec![result],
        _ => Vec::new(),
    };

    let mut locations = Vec::new();
    for item in items {
        let (uri, range) = if let Some(uri) = item.get("uri") {
            (uri, item.get("range"))
        } else if let Some(uri) = item.get("targetUri") {
            (uri, item.get("targetRange"))
        } else {
            continue;
        };
        let Some(uri) = uri.as_str() else { continue };
        let Some(path) = uri_to_path(uri) else {
            log::warn!("Dropping location with unusable URI: {}", uri);
            continue;
        };
        let Some(start) = range.and_then(|range| range.get("start")) else {
            continue;
        };
        let Some(line) = start.get("line").and_then(Value::as_u64) else {
            continue;
        };
        let Some(column) = start.get("character").and_then(Value::as_u64) else {
            continue;
        };
        locations.push(RawLocation {
            path,
            line: line + 1,
            column: column + 1,
        });
    }
    locations
}

/// Decode a workspace/symbol result into named, kinded locations.
pub fn parse_workspace_symbols(result: &Value) -> Vec<RawSymbol> {
    let Some(items) = result.as_array() else {
        return Vec::new();
    };

    let mut symbols = Vec::new();
    for item in items {
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            continue;
        };
        let kind = item.get("kind").and_then(Value::as_u64).unwrap_or(0);
        let Some(location) = item.get("location") else {
            continue;
        };
        let Some(uri) = location.get("uri").and_then(Value::as_str) else {
            continue;
        };
        let Some(path) = uri_to_path(uri) else {
            log::warn!("Dropping symbol with unusable URI: {}", uri);
            continue;
        };
        let Some(line) = location
            .get("range")
            .and_then(|range| range.get("start"))
            .and_then(|start| start.get("line"))
            .and_then(Value::as_u64)
        else {
            continue;
        };
        symbols.push(RawSymbol {
            name: name.to_string(),
            kind,
            path,
            line: line + 1,
        });
    }
    symbols
}

/// Decode a file:// URI into a filesystem path, undoing percent-encoding.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    url.to_file_path().ok()
}

/// Express `path` relative to `root` when it lies beneath it; paths outside
/// the workspace stay absolute.
pub fn relativize(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Human-readable name for a numeric SymbolKind; unknown codes render as
/// the generic "symbol".
pub fn symbol_kind_name(kind: u64) -> &'static str {
    match kind {
        1 => "file",
        2 => "module",
        3 => "namespace",
        4 => "package",
        5 => "class",
        6 => "method",
        7 => "property",
        8 => "field",
        9 => "constructor",
        10 => "enum",
        11 => "interface",
        12 => "function",
        13 => "variable",
        14 => "constant",
        15 => "string",
        16 => "number",
        17 => "boolean",
        18 => "array",
        19 => "object",
        20 => "key",
        21 => "null",
        22 => "enum member",
        23 => "struct",
        24 => "event",
        25 => "operator",
        26 => "type parameter",
        _ => "symbol",
    }
}
