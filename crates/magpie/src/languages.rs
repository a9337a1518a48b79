//
// languages.rs
//
// Per-extension language server commands and identifiers
//

use std::path::Path;

/// Extensions with a configured language server, in stable order.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "c", "cpp", "cs", "go", "h", "hpp", "java", "js", "php", "py", "rs", "ts",
];

/// Launch recipe for one language server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    /// Executable name, resolved through PATH (or an absolute path).
    pub program: String,
    /// Fixed arguments passed before any workspace argument.
    pub args: Vec<String>,
    /// Whether the workspace root is appended as a final argument.
    pub append_workspace_root: bool,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            append_workspace_root: false,
        }
    }
}

/// The command line launched for one extension's language server.
///
/// jdtls takes the workspace directory as a positional argument; every other
/// server discovers the workspace from the initialize request alone.
pub fn server_command(extension: &str) -> Option<ServerCommand> {
    let (program, args): (&str, &[&str]) = match extension {
        "py" => ("pylsp", &[]),
        "c" | "h" | "cpp" | "hpp" => ("clangd", &[]),
        "java" => ("jdtls", &[]),
        "js" | "ts" => ("typescript-language-server", &["--stdio"]),
        "go" => ("gopls", &[]),
        "rs" => ("rust-analyzer", &[]),
        "cs" => ("omnisharp", &["-lsp"]),
        "php" => ("phpactor", &["language-server"]),
        _ => return None,
    };
    let mut command = ServerCommand::new(program, args);
    command.append_workspace_root = extension == "java";
    Some(command)
}

pub fn is_supported(extension: &str) -> bool {
    server_command(extension).is_some()
}

/// Synthetic languageId sent in didOpen: the extension itself.
pub fn language_id(extension: &str) -> &str {
    extension
}

/// Normalized (lowercase) extension of a path, if it has one.
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
