//
// workspace_index.rs
//
// One-shot index of workspace files grouped by language extension
//

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

use crate::languages;

/// Directory names never descended into: version-control metadata and
/// build caches.
const EXCLUDED_DIRS: &[&str] = &[".git", ".hg", ".svn", "__pycache__", "node_modules", "target"];

/// Immutable map from file extension to every matching file under the
/// workspace root. Built once at startup; queries iterate it in a fixed
/// order so repeated runs over an unmodified tree produce identical results.
#[derive(Debug)]
pub struct WorkspaceIndex {
    root: PathBuf,
    files: BTreeMap<String, Vec<PathBuf>>,
}

impl WorkspaceIndex {
    /// Walk the root once and group every supported file by extension.
    ///
    /// An unreadable or missing root is fatal. Errors deeper in the walk
    /// (permission-denied subtrees, dangling links) are logged and skipped.
    pub fn build(root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("workspace root {} is not readable", root.display()))?;
        if !root.is_dir() {
            bail!("workspace root {} is not a directory", root.display());
        }
        std::fs::read_dir(&root)
            .with_context(|| format!("workspace root {} is not readable", root.display()))?;

        let mut files: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for ext in languages::SUPPORTED_EXTENSIONS {
            files.insert((*ext).to_string(), Vec::new());
        }

        log::info!("Indexing workspace files under {}", root.display());

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable workspace entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(ext) = languages::file_extension(entry.path()) {
                if let Some(group) = files.get_mut(&ext) {
                    group.push(entry.path().to_path_buf());
                }
            }
        }

        let total: usize = files.values().map(Vec::len).sum();
        log::info!("Indexed {} code files in the workspace", total);

        Ok(Self { root, files })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indexed files for one extension, in walk order.
    pub fn files_for(&self, extension: &str) -> &[PathBuf] {
        self.files
            .get(extension)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Extension groups with at least one file, in deterministic order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[PathBuf])> + '_ {
        self.files
            .iter()
            .filter(|(_, group)| !group.is_empty())
            .map(|(ext, group)| (ext.as_str(), group.as_slice()))
    }

    pub fn total_files(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_files() == 0
    }
}

fn is_excluded(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_DIRS.contains(&name))
            .unwrap_or(false)
}
