//! Deterministic fixture workspace generator for integration tests.
//!
//! Generates synthetic multi-language workspaces with controlled
//! characteristics: file count, functions per file, and cross-file call
//! sites. All output is deterministic — no randomness — so assertions on
//! exact lines hold across runs.

#![allow(dead_code)]

use std::fmt::Write;
use std::path::Path;

use tempfile::TempDir;

/// Configuration for generating a fixture workspace.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub file_count: usize,
    pub functions_per_file: usize,
    pub calls_per_file: usize,
}

impl FixtureConfig {
    /// Small workspace: 5 files, 3 functions each.
    pub fn small() -> Self {
        Self {
            file_count: 5,
            functions_per_file: 3,
            calls_per_file: 2,
        }
    }

    /// Medium workspace: 20 files, 5 functions each.
    pub fn medium() -> Self {
        Self {
            file_count: 20,
            functions_per_file: 5,
            calls_per_file: 3,
        }
    }
}

/// Generate the content of a single Python file deterministically.
///
/// `file_{i}` defines `func_{i}_{j}` for each function index and calls
/// into `file_{i-1}`'s functions, so every workspace has both declaration
/// and usage sites for most symbols.
pub fn generate_python_file(index: usize, config: &FixtureConfig) -> String {
    let mut content = String::new();
    writeln!(content, "# module {}", index).unwrap();
    writeln!(content).unwrap();

    for func in 0..config.functions_per_file {
        writeln!(content, "def func_{}_{}(x, y={}):", index, func, func + 1).unwrap();
        writeln!(content, "    result = x + y * {}", func + 1).unwrap();
        writeln!(content, "    if result < 0:").unwrap();
        writeln!(content, "        return None").unwrap();
        writeln!(content, "    return result").unwrap();
        writeln!(content).unwrap();
    }

    if index > 0 {
        for call in 0..config.calls_per_file.min(config.functions_per_file) {
            writeln!(content, "value_{} = func_{}_{}({})", call, index - 1, call, call).unwrap();
        }
    }

    content
}

/// Write fixture files into an existing directory.
pub fn write_fixture_workspace(dir: &Path, config: &FixtureConfig) {
    for index in 0..config.file_count {
        let content = generate_python_file(index, config);
        let filename = format!("file_{}.py", index);
        std::fs::write(dir.join(&filename), &content)
            .unwrap_or_else(|e| panic!("Failed to write fixture file {}: {}", filename, e));
    }
}

/// Create a temporary fixture workspace from the given configuration.
///
/// Calling this twice with the same config produces byte-identical files.
pub fn create_fixture_workspace(config: &FixtureConfig) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory for fixture workspace");
    write_fixture_workspace(dir.path(), config);
    dir
}
