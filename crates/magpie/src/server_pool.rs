//
// server_pool.rs
//
// Registry of live server connections, one per file extension
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::Mutex;

use crate::languages;
use crate::server_connection::ServerConnection;

/// Owns every live connection. This is the only place connections are
/// created or replaced; dead ones are swapped out on the next lookup.
pub struct ServerPool {
    workspace_root: PathBuf,
    connections: Mutex<HashMap<String, Arc<ServerConnection>>>,
}

impl ServerPool {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            workspace_root: workspace_root.to_path_buf(),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// The live connection serving `path`'s extension, starting one first
    /// if needed. Unsupported extensions and failed startups are errors the
    /// caller is expected to log and skip.
    pub async fn connection_for(&self, path: &Path) -> Result<Arc<ServerConnection>> {
        let extension = languages::file_extension(path)
            .ok_or_else(|| anyhow!("{} has no file extension", path.display()))?;
        self.connection_for_extension(&extension).await
    }

    pub async fn connection_for_extension(&self, extension: &str) -> Result<Arc<ServerConnection>> {
        let mut connections = self.connections.lock().await;

        if let Some(existing) = connections.get(extension) {
            if existing.is_alive().await {
                return Ok(Arc::clone(existing));
            }
            log::warn!(
                "Connection for .{} files is dead; starting a replacement",
                extension
            );
        }

        let command = languages::server_command(extension).ok_or_else(|| {
            anyhow!("no language server is available for .{} files", extension)
        })?;

        let connection = Arc::new(ServerConnection::new(
            extension,
            &self.workspace_root,
            command,
        ));
        connection.start().await.with_context(|| {
            format!("could not start a language server for .{} files", extension)
        })?;

        connections.insert(extension.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    /// Tear down every registered connection. Called on every exit path.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = {
            let mut connections = self.connections.lock().await;
            connections.drain().collect()
        };
        for (extension, connection) in drained {
            log::debug!("Shutting down the .{} language server", extension);
            connection.shutdown().await;
        }
    }
}
