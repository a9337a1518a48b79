//
// navigator.rs
//
// Workspace-wide query aggregation over the server pool
//

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::context;
use crate::location::{self, Location, RawLocation, SymbolMatch};
use crate::server_connection::ServerConnection;
use crate::server_pool::ServerPool;
use crate::symbol_locator::SymbolPattern;
use crate::workspace_index::WorkspaceIndex;

/// Identity of a result entry: (file, line, column).
type LocationKey = (String, u64, u64);

/// What every public operation returns: a list of results or one error
/// message. Never both, never partial.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Results { results: Vec<T> },
    Error { error: String },
}

impl<T> ApiResponse<T> {
    fn error(message: impl Into<String>) -> Self {
        ApiResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ApiResponse::Error { .. })
    }

    pub fn results(&self) -> Option<&[T]> {
        match self {
            ApiResponse::Results { results } => Some(results),
            ApiResponse::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ApiResponse::Results { .. } => None,
            ApiResponse::Error { error } => Some(error),
        }
    }
}

/// Rendered context for one (file, line) position.
#[derive(Debug, Serialize)]
pub struct FileContext {
    pub file: String,
    pub line: u64,
    pub context: Vec<String>,
}

/// The engine's front door: one immutable workspace index plus the pool of
/// per-extension server connections.
pub struct Navigator {
    index: WorkspaceIndex,
    pool: ServerPool,
}

impl Navigator {
    /// Index the workspace. Servers start lazily, on first use.
    pub fn new(workspace_root: &Path) -> Result<Self> {
        let index = WorkspaceIndex::build(workspace_root)?;
        let pool = ServerPool::new(index.root());
        Ok(Self { index, pool })
    }

    pub fn index(&self) -> &WorkspaceIndex {
        &self.index
    }

    /// Where a symbol is defined, across every indexed file.
    pub async fn find_definition(&self, symbol: &str) -> ApiResponse<Location> {
        log::info!("Looking for the definition of '{}' across the workspace", symbol);
        let pattern = match SymbolPattern::new(symbol) {
            Ok(pattern) => pattern,
            Err(err) => return ApiResponse::error(format!("{:#}", err)),
        };

        let results = self.collect_definitions(&pattern).await;
        if results.is_empty() {
            return ApiResponse::error(format!("No definition found for '{}'", symbol));
        }
        ApiResponse::Results {
            results: results.into_values().collect(),
        }
    }

    /// Every usage site of a symbol, excluding its definition sites.
    ///
    /// Two passes, in a fixed order: the definition pass runs first and only
    /// feeds the exclusion set; the reference pass then queries with
    /// declarations included and subtracts that set. Set subtraction is the
    /// sole declaration/usage discriminator.
    pub async fn find_references(&self, symbol: &str) -> ApiResponse<Location> {
        log::info!("Looking for references to '{}' across the workspace", symbol);
        let pattern = match SymbolPattern::new(symbol) {
            Ok(pattern) => pattern,
            Err(err) => return ApiResponse::error(format!("{:#}", err)),
        };

        let definition_keys: HashSet<LocationKey> =
            self.collect_definitions(&pattern).await.into_keys().collect();

        let mut results: IndexMap<LocationKey, Location> = IndexMap::new();
        for (extension, files) in self.index.groups() {
            let connection = match self.pool.connection_for_extension(extension).await {
                Ok(connection) => connection,
                Err(err) => {
                    log::warn!("Skipping .{} files: {:#}", extension, err);
                    continue;
                }
            };
            for file in files {
                let response = match self.query_references(&connection, file, &pattern).await {
                    Ok(response) => response,
                    Err(err) => {
                        log::error!("Error processing {}: {:#}", file.display(), err);
                        continue;
                    }
                };
                let Some(response) = response else { continue };
                for raw in location::parse_locations(&response) {
                    self.push_location(&mut results, &definition_keys, pattern.symbol(), raw);
                }
            }
        }

        if results.is_empty() {
            return ApiResponse::error(format!("No references found for '{}'", symbol));
        }
        ApiResponse::Results {
            results: results.into_values().collect(),
        }
    }

    /// Workspace-symbol search: one query per extension group that has
    /// indexed files, fanned out through the pool.
    pub async fn find_symbol(&self, query: &str) -> ApiResponse<SymbolMatch> {
        log::info!("Looking for symbol '{}' across the workspace", query);

        let mut results = Vec::new();
        for (extension, _files) in self.index.groups() {
            let connection = match self.pool.connection_for_extension(extension).await {
                Ok(connection) => connection,
                Err(err) => {
                    log::warn!("Skipping .{} files: {:#}", extension, err);
                    continue;
                }
            };
            let response = match connection.workspace_symbols(query).await {
                Ok(response) => response,
                Err(err) => {
                    log::error!("Symbol query failed for .{} files: {:#}", extension, err);
                    continue;
                }
            };
            let Some(response) = response else { continue };
            for raw in location::parse_workspace_symbols(&response) {
                results.push(SymbolMatch {
                    name: raw.name,
                    kind: location::symbol_kind_name(raw.kind).to_string(),
                    file: self.workspace_path(&raw.path),
                    line: raw.line,
                });
            }
        }

        if results.is_empty() {
            return ApiResponse::error(format!("No symbols found for '{}'", query));
        }
        ApiResponse::Results { results }
    }

    /// Context around a line, straight from the extractor; no server is
    /// involved. Relative paths resolve against the workspace root.
    pub fn get_context(&self, file: &Path, line: u64) -> ApiResponse<FileContext> {
        let path = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.index.root().join(file)
        };
        log::info!("Getting context at {}:{}", path.display(), line);
        let context = context::extract_context(&path, line);
        ApiResponse::Results {
            results: vec![FileContext {
                file: path.display().to_string(),
                line,
                context,
            }],
        }
    }

    /// Tear down every language server. Runs on success and error paths.
    pub async fn shutdown(&self) {
        log::info!("Shutting down language servers");
        self.pool.shutdown_all().await;
    }

    /// Definition scan over the whole index, deduplicated in insertion
    /// order. Shared by find_definition (the result) and find_references
    /// (the exclusion set).
    async fn collect_definitions(&self, pattern: &SymbolPattern) -> IndexMap<LocationKey, Location> {
        let no_exclusions = HashSet::new();
        let mut results: IndexMap<LocationKey, Location> = IndexMap::new();

        for (extension, files) in self.index.groups() {
            let connection = match self.pool.connection_for_extension(extension).await {
                Ok(connection) => connection,
                Err(err) => {
                    log::warn!("Skipping .{} files: {:#}", extension, err);
                    continue;
                }
            };
            for file in files {
                let response = match self.query_definition(&connection, file, pattern).await {
                    Ok(response) => response,
                    Err(err) => {
                        log::error!("Error processing {}: {:#}", file.display(), err);
                        continue;
                    }
                };
                let Some(response) = response else { continue };
                for raw in location::parse_locations(&response) {
                    self.push_location(&mut results, &no_exclusions, pattern.symbol(), raw);
                }
            }
        }
        results
    }

    /// Open `file`, find the symbol's position in it, and issue one
    /// definition query. Ok(None) when the file does not mention the symbol
    /// or the server had no answer.
    async fn query_definition(
        &self,
        connection: &ServerConnection,
        file: &Path,
        pattern: &SymbolPattern,
    ) -> Result<Option<Value>> {
        connection.open_document(file).await?;
        let Some(position) = self.locate(file, pattern).await? else {
            return Ok(None);
        };
        connection
            .find_definition(file, position.line, position.character)
            .await
    }

    /// As query_definition, but for references, with declarations included
    /// in the raw response (they are subtracted later by key).
    async fn query_references(
        &self,
        connection: &ServerConnection,
        file: &Path,
        pattern: &SymbolPattern,
    ) -> Result<Option<Value>> {
        connection.open_document(file).await?;
        let Some(position) = self.locate(file, pattern).await? else {
            return Ok(None);
        };
        connection
            .find_references(file, position.line, position.character, true)
            .await
    }

    async fn locate(
        &self,
        file: &Path,
        pattern: &SymbolPattern,
    ) -> Result<Option<crate::symbol_locator::SymbolPosition>> {
        let text = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("failed to read {}", file.display()))?;
        Ok(pattern.find_position(&text))
    }

    /// Insert a normalized location unless its key is excluded or already
    /// present. Context is only rendered for entries that survive.
    fn push_location(
        &self,
        results: &mut IndexMap<LocationKey, Location>,
        exclude: &HashSet<LocationKey>,
        symbol: &str,
        raw: RawLocation,
    ) {
        let file = self.workspace_path(&raw.path);
        let key = (file.clone(), raw.line, raw.column);
        if exclude.contains(&key) || results.contains_key(&key) {
            return;
        }
        let context = context::extract_context(&raw.path, raw.line);
        results.insert(
            key,
            Location {
                symbol: symbol.to_string(),
                file,
                line: raw.line,
                column: raw.column,
                context,
            },
        );
    }

    /// Workspace-relative display path for an absolute location path.
    fn workspace_path(&self, path: &Path) -> String {
        location::relativize(path, self.index.root())
            .display()
            .to_string()
    }
}
