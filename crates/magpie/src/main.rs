//
// main.rs
//

mod context;
mod languages;
mod location;
mod navigator;
mod rpc;
mod server_connection;
mod server_pool;
mod symbol_locator;
mod workspace_index;

use std::env;
use std::path::{Path, PathBuf};

use navigator::{ApiResponse, Navigator};
use serde::Serialize;

fn print_usage() {
    println!(
        "magpie {}, workspace-wide code navigation through language servers.",
        env!("CARGO_PKG_VERSION")
    );
    print!(
        r#"
Usage: magpie [OPTIONS] <COMMAND>

Commands:

definition <symbol>          Find where a symbol is defined
references <symbol>          Find every reference to a symbol
symbol <name>                Search workspace symbols by name
context <file> <line>        Show the context around a line

Options:

--workspace <dir>            Workspace root (defaults to the current directory)
--version                    Print the version
--help                       Print this help message

Output is a single JSON document: {{"results": [...]}} or {{"error": "..."}}.

"#
    );
}

enum CliCommand {
    Definition(String),
    References(String),
    Symbol(String),
    Context(PathBuf, u64),
}

fn parse_command(positional: &[String]) -> Option<CliCommand> {
    match positional {
        [command, symbol] if command == "definition" => {
            Some(CliCommand::Definition(symbol.clone()))
        }
        [command, symbol] if command == "references" => {
            Some(CliCommand::References(symbol.clone()))
        }
        [command, name] if command == "symbol" => Some(CliCommand::Symbol(name.clone())),
        [command, file, line] if command == "context" => line
            .parse::<u64>()
            .ok()
            .map(|line| CliCommand::Context(PathBuf::from(file), line)),
        _ => None,
    }
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> (String, bool) {
    let json = serde_json::to_string_pretty(response)
        .unwrap_or_else(|err| format!("{{\"error\": \"failed to render output: {}\"}}", err));
    (json, response.is_error())
}

fn print_error(message: &str) {
    let payload = serde_json::json!({ "error": message });
    let json = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    println!("{}", json);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut argv = env::args();
    argv.next(); // skip executable name

    let mut workspace: Option<PathBuf> = None;
    let mut positional: Vec<String> = Vec::new();

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--workspace" => {
                let Some(dir) = argv.next() else {
                    return Err(anyhow::anyhow!("--workspace requires a directory"));
                };
                workspace = Some(PathBuf::from(dir));
            }
            "--version" => {
                println!("magpie {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_usage();
                return Ok(());
            }
            other if other.starts_with("--") => {
                return Err(anyhow::anyhow!("Unknown option: '{other}'"));
            }
            _ => positional.push(arg),
        }
    }

    if positional.is_empty() {
        print_usage();
        return Ok(());
    }
    let Some(command) = parse_command(&positional) else {
        print_usage();
        std::process::exit(2);
    };

    env_logger::init();

    let workspace = workspace.unwrap_or_else(|| PathBuf::from("."));
    let navigator = match Navigator::new(&workspace) {
        Ok(navigator) => navigator,
        Err(err) => {
            print_error(&format!("{:#}", err));
            std::process::exit(1);
        }
    };

    let (json, is_error) = match command {
        CliCommand::Definition(symbol) => render(&navigator.find_definition(&symbol).await),
        CliCommand::References(symbol) => render(&navigator.find_references(&symbol).await),
        CliCommand::Symbol(name) => render(&navigator.find_symbol(&name).await),
        CliCommand::Context(file, line) => render(&navigator.get_context(Path::new(&file), line)),
    };

    // Servers come down on every path before anything is printed as final.
    navigator.shutdown().await;

    println!("{}", json);
    if is_error {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn commands_parse_with_their_arguments() {
        assert!(matches!(
            parse_command(&strings(&["definition", "compute"])),
            Some(CliCommand::Definition(symbol)) if symbol == "compute"
        ));
        assert!(matches!(
            parse_command(&strings(&["references", "compute"])),
            Some(CliCommand::References(_))
        ));
        assert!(matches!(
            parse_command(&strings(&["symbol", "Parser"])),
            Some(CliCommand::Symbol(_))
        ));
        assert!(matches!(
            parse_command(&strings(&["context", "src/a.py", "12"])),
            Some(CliCommand::Context(file, 12)) if file == PathBuf::from("src/a.py")
        ));
    }

    #[test]
    fn malformed_commands_are_rejected() {
        assert!(parse_command(&strings(&["definition"])).is_none());
        assert!(parse_command(&strings(&["context", "a.py", "twelve"])).is_none());
        assert!(parse_command(&strings(&["frobnicate", "x"])).is_none());
        assert!(parse_command(&[]).is_none());
    }
}
