//! Finding definition documents on disk

use std::fs;
use std::path::{Path, PathBuf};

use verdict_syntax::DefinitionStyle;

use crate::settings::{DEFAULT_SETTINGS_FILE, Settings};

/// TOML files that are never test definitions.
const IGNORED_TOML: [&str; 2] = ["Cargo.toml", DEFAULT_SETTINGS_FILE];

/// Classify a single file, or `None` if it is not a definition document.
pub fn definition_style(path: &Path, settings: &Settings) -> Option<DefinitionStyle> {
    let name = path.file_name()?.to_str()?;
    if settings.discovery.signature_files.iter().any(|file| file == name) {
        return Some(DefinitionStyle::Signature);
    }
    if name.ends_with(".toml") && !IGNORED_TOML.contains(&name) {
        return Some(DefinitionStyle::Table);
    }
    None
}

/// Recursively collect definition documents under `root`, sorted by path.
///
/// Hidden directories, `target` and `node_modules` are skipped. A file path is returned as-is when it is a
/// definition document.
pub fn find_definition_files(root: &Path, settings: &Settings) -> Vec<(PathBuf, DefinitionStyle)> {
    let mut files = Vec::new();
    if root.is_file() {
        if let Some(style) = definition_style(root, settings) {
            files.push((root.to_path_buf(), style));
        }
    } else if root.is_dir() {
        walk(root, settings, &mut files);
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

fn walk(dir: &Path, settings: &Settings, files: &mut Vec<(PathBuf, DefinitionStyle)>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !name.starts_with('.') && name != "target" && name != "node_modules" {
                walk(&path, settings, files);
            }
        } else if let Some(style) = definition_style(&path, settings) {
            files.push((path, style));
        }
    }
}
