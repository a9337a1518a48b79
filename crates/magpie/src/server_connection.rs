//
// server_connection.rs
//
// One language server process: lifecycle, handshake, request correlation
//

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use url::Url;

use crate::languages::{self, ServerCommand};
use crate::rpc::{self, RpcMessage};

/// Bounded wait for the response to any single request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period between the exit notification and a forced kill.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unstarted,
    Starting,
    Initializing,
    Ready,
    ShuttingDown,
    Terminated,
}

/// In-flight requests: id → completion channel, resolved by the reader task.
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcMessage>>>>;

/// Responses that arrived with no request waiting on their id. They are
/// kept, not discarded; a later request with that id claims them.
type ParkedMap = Arc<Mutex<HashMap<u64, RpcMessage>>>;

/// Client side of one language server, identified by its file extension.
///
/// A connection is started exactly once. Any I/O failure moves it straight
/// to Terminated, and a Terminated connection is never revived — the pool
/// builds a replacement instead.
#[derive(Debug)]
pub struct ServerConnection {
    extension: String,
    workspace_root: PathBuf,
    command: ServerCommand,
    request_timeout: Duration,
    state: Arc<RwLock<ConnectionState>>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    next_request_id: AtomicU64,
    pending: PendingMap,
    parked: ParkedMap,
    capabilities: RwLock<Option<Value>>,
    open_documents: Mutex<HashSet<Url>>,
}

impl ServerConnection {
    pub fn new(extension: &str, workspace_root: &Path, command: ServerCommand) -> Self {
        Self {
            extension: extension.to_string(),
            workspace_root: workspace_root.to_path_buf(),
            command,
            request_timeout: REQUEST_TIMEOUT,
            state: Arc::new(RwLock::new(ConnectionState::Unstarted)),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            next_request_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            parked: Arc::new(Mutex::new(HashMap::new())),
            capabilities: RwLock::new(None),
            open_documents: Mutex::new(HashSet::new()),
        }
    }

    /// Shrink the per-request wait (for tests against scripted servers).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// The capability set the server reported during the handshake.
    pub async fn capabilities(&self) -> Option<Value> {
        self.capabilities.read().await.clone()
    }

    /// Launch the server process and complete the initialize handshake.
    /// On any failure the process is reaped and the connection is dead.
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != ConnectionState::Unstarted {
                bail!(
                    "connection for .{} files was already started",
                    self.extension
                );
            }
            *state = ConnectionState::Starting;
        }

        match self.launch_and_initialize().await {
            Ok(()) => {
                self.set_state(ConnectionState::Ready).await;
                log::info!("Language server for .{} files is ready", self.extension);
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectionState::Terminated).await;
                self.kill().await;
                Err(err)
            }
        }
    }

    async fn launch_and_initialize(&self) -> Result<()> {
        let mut command = Command::new(&self.command.program);
        command.args(&self.command.args);
        if self.command.append_workspace_root {
            command.arg(&self.workspace_root);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::info!(
            "Starting language server for .{} files: {} {}",
            self.extension,
            self.command.program,
            self.command.args.join(" ")
        );

        let mut child = command.spawn().with_context(|| {
            format!(
                "failed to launch {} for .{} files",
                self.command.program, self.extension
            )
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("server stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("server stderr was not piped"))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("server stdin was not piped"))?;

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);

        // Both readers run until the process closes its streams.
        tokio::spawn(drain_stderr(self.extension.clone(), stderr));
        tokio::spawn(read_responses(
            self.extension.clone(),
            stdout,
            Arc::clone(&self.pending),
            Arc::clone(&self.parked),
            Arc::clone(&self.state),
        ));

        self.set_state(ConnectionState::Initializing).await;
        self.initialize().await
    }

    /// The initialize/initialized handshake. The advertised client
    /// capabilities cover exactly what the engine consumes: definitions,
    /// references, document synchronization, and workspace symbols.
    async fn initialize(&self) -> Result<()> {
        let root_uri = file_uri(&self.workspace_root)?;
        let params = json!({
            "processId": std::process::id(),
            "rootPath": self.workspace_root.display().to_string(),
            "rootUri": root_uri.as_str(),
            "capabilities": {
                "textDocument": {
                    "definition": {"dynamicRegistration": true},
                    "references": {"dynamicRegistration": true},
                    "synchronization": {"dynamicRegistration": true}
                },
                "workspace": {
                    "symbol": {"dynamicRegistration": true}
                }
            }
        });

        let result = self
            .request("initialize", params)
            .await
            .with_context(|| format!("initialize failed for the .{} server", self.extension))?
            .ok_or_else(|| {
                anyhow!(
                    "the .{} server sent no valid initialize response within {:?}",
                    self.extension,
                    self.request_timeout
                )
            })?;

        let capabilities = result.get("capabilities").cloned().ok_or_else(|| {
            anyhow!(
                "the .{} server's initialize response carried no capabilities",
                self.extension
            )
        })?;
        *self.capabilities.write().await = Some(capabilities);

        self.notify("initialized", json!({})).await?;
        Ok(())
    }

    /// Ready with a live process underneath.
    pub async fn is_alive(&self) -> bool {
        if *self.state.read().await != ConnectionState::Ready {
            return false;
        }
        let mut child = self.child.lock().await;
        match child.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Announce a document to the server, at most once per connection.
    pub async fn open_document(&self, path: &Path) -> Result<()> {
        let uri = file_uri(path)?;

        // The lock is held across the notification so a racing caller
        // cannot announce the same document twice.
        let mut open = self.open_documents.lock().await;
        if open.contains(&uri) {
            return Ok(());
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let params = json!({
            "textDocument": {
                "uri": uri.as_str(),
                "languageId": languages::language_id(&self.extension),
                "version": 1,
                "text": text
            }
        });
        self.notify("textDocument/didOpen", params).await?;
        open.insert(uri);
        log::debug!("Opened document {}", path.display());
        Ok(())
    }

    /// Whether a document was announced on this connection.
    pub async fn has_open_document(&self, path: &Path) -> bool {
        match Url::from_file_path(path) {
            Ok(uri) => self.open_documents.lock().await.contains(&uri),
            Err(_) => false,
        }
    }

    /// Definition lookup at a 0-based position. None covers "no answer":
    /// an empty result, a server-side error, or a timeout alike.
    pub async fn find_definition(
        &self,
        path: &Path,
        line: u32,
        character: u32,
    ) -> Result<Option<Value>> {
        let uri = file_uri(path)?;
        let params = json!({
            "textDocument": {"uri": uri.as_str()},
            "position": {"line": line, "character": character}
        });
        self.request("textDocument/definition", params).await
    }

    /// Reference lookup at a 0-based position.
    pub async fn find_references(
        &self,
        path: &Path,
        line: u32,
        character: u32,
        include_declaration: bool,
    ) -> Result<Option<Value>> {
        let uri = file_uri(path)?;
        let params = json!({
            "textDocument": {"uri": uri.as_str()},
            "position": {"line": line, "character": character},
            "context": {"includeDeclaration": include_declaration}
        });
        self.request("textDocument/references", params).await
    }

    /// Free-text workspace-symbol lookup.
    pub async fn workspace_symbols(&self, query: &str) -> Result<Option<Value>> {
        self.request("workspace/symbol", json!({"query": query}))
            .await
    }

    /// Politely stop the server, then kill it if the grace period runs out.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                ConnectionState::Unstarted => {
                    *state = ConnectionState::Terminated;
                    return;
                }
                ConnectionState::ShuttingDown | ConnectionState::Terminated => return,
                _ => *state = ConnectionState::ShuttingDown,
            }
        }

        if let Err(err) = self.request("shutdown", Value::Null).await {
            log::debug!(
                "Shutdown request to the .{} server failed: {:#}",
                self.extension,
                err
            );
        }
        if let Err(err) = self.notify("exit", Value::Null).await {
            log::debug!(
                "Exit notification to the .{} server failed: {:#}",
                self.extension,
                err
            );
        }

        let mut child_guard = self.child.lock().await;
        if let Some(child) = child_guard.as_mut() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    log::info!(
                        "Language server for .{} files exited with {}",
                        self.extension,
                        status
                    );
                }
                Ok(Err(err)) => {
                    log::warn!("Failed to reap the .{} server: {}", self.extension, err);
                }
                Err(_) => {
                    log::warn!(
                        "Language server for .{} files ignored the exit notification; killing it",
                        self.extension
                    );
                    if let Err(err) = child.kill().await {
                        log::warn!("Failed to kill the .{} server: {}", self.extension, err);
                    }
                }
            }
        }
        *child_guard = None;
        drop(child_guard);

        *self.stdin.lock().await = None;
        self.open_documents.lock().await.clear();
        self.set_state(ConnectionState::Terminated).await;
        log::info!("Language server for .{} files shut down", self.extension);
    }

    /// Send a request and wait for the response with the matching id.
    ///
    /// Ok(None) means the server had nothing to say: an empty or null
    /// result, a reported error, or no response inside the timeout — the
    /// caller cannot tell these apart, which is the contract. Err means the
    /// connection itself failed.
    async fn request(&self, method: &str, params: Value) -> Result<Option<Value>> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = RpcMessage::request(id, method, params);

        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            // The response may already be parked if the server answered
            // before this request registered; claim it instead of waiting.
            if let Some(parked) = self.parked.lock().await.remove(&id) {
                return Ok(Self::response_result(method, parked));
            }
            pending.insert(id, sender);
        }

        if let Err(err) = self.send(&message).await {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match tokio::time::timeout(self.request_timeout, receiver).await {
            Ok(Ok(response)) => Ok(Self::response_result(method, response)),
            Ok(Err(_)) => Err(anyhow!(
                "connection to the .{} server closed while waiting for {}",
                self.extension,
                method
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                log::warn!(
                    "Timed out waiting for the {} response from the .{} server",
                    method,
                    self.extension
                );
                Ok(None)
            }
        }
    }

    /// Collapse a response envelope into its payload. Server-reported
    /// errors and null results both come back as None.
    fn response_result(method: &str, response: RpcMessage) -> Option<Value> {
        if let Some(error) = response.error {
            log::warn!(
                "{} request failed: {} (code {})",
                method,
                error.message,
                error.code
            );
            return None;
        }
        match response.result {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.send(&RpcMessage::notification(method, params)).await
    }

    /// Write one framed message. A failed write is an unrecoverable death
    /// of the connection: the pipe is gone and the state flips to
    /// Terminated immediately.
    async fn send(&self, message: &RpcMessage) -> Result<()> {
        let framed = rpc::encode(message)?;

        let mut guard = self.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            bail!("no .{} server process is running", self.extension);
        };
        if let Err(err) = write_frame(stdin, &framed).await {
            *guard = None;
            drop(guard);
            self.set_state(ConnectionState::Terminated).await;
            bail!("pipe to the .{} server is broken: {}", self.extension, err);
        }
        Ok(())
    }

    async fn set_state(&self, next: ConnectionState) {
        *self.state.write().await = next;
    }

    async fn kill(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        *self.stdin.lock().await = None;
    }
}

async fn write_frame(stdin: &mut ChildStdin, framed: &[u8]) -> std::io::Result<()> {
    stdin.write_all(framed).await?;
    stdin.flush().await
}

fn file_uri(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|_| anyhow!("cannot express {} as a file:// URI", path.display()))
}

/// Re-log everything the server prints on stderr; early startup failures
/// tend to surface only here.
async fn drain_stderr(extension: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            log::debug!(".{} server stderr: {}", extension, line);
        }
    }
}

/// Parse framed messages off the server's stdout for the connection's
/// lifetime. Responses resolve their pending entry (or get parked);
/// server-initiated traffic is logged and dropped.
async fn read_responses(
    extension: String,
    stdout: ChildStdout,
    pending: PendingMap,
    parked: ParkedMap,
    state: Arc<RwLock<ConnectionState>>,
) {
    let mut reader = BufReader::new(stdout);
    loop {
        match rpc::read_message(&mut reader).await {
            Ok(Some(message)) => {
                if message.is_response() {
                    let Some(id) = message.id else { continue };
                    // The pending lock is held across the park decision so a
                    // response can never fall between a request's parked
                    // check and its pending registration.
                    let mut pending_guard = pending.lock().await;
                    match pending_guard.remove(&id) {
                        Some(sender) => {
                            drop(pending_guard);
                            let _ = sender.send(message);
                        }
                        None => {
                            parked.lock().await.insert(id, message);
                        }
                    }
                } else if let Some(method) = message.method.as_deref() {
                    log::trace!("Ignoring {} message from the .{} server", method, extension);
                }
            }
            Ok(None) => {
                log::info!(
                    "Language server for .{} files closed its output stream",
                    extension
                );
                break;
            }
            Err(err) => {
                if *state.read().await != ConnectionState::ShuttingDown {
                    log::warn!("Failed to read from the .{} server: {:#}", extension, err);
                }
                break;
            }
        }
    }

    // Dropping the pending senders wakes every in-flight request; a
    // deliberate shutdown keeps its own state transition.
    pending.lock().await.clear();
    let mut state = state.write().await;
    if *state != ConnectionState::ShuttingDown {
        *state = ConnectionState::Terminated;
    }
}
