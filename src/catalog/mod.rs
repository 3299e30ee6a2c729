//! Test catalog
//!
//! The catalog is an ordered list of definition files, each owning a tree of groups and cases built from parser
//! output. Reparsing a file replaces its whole subtree in one assignment and stamps it with a fresh
//! [`Generation`]; results computed against an older stamp are rejected by [`Catalog::apply_result`].
//!
//! ## Notes
//!
//! - The engine never iterates the live tree while running. It takes a [`Catalog::snapshot`] of owned
//!   [`QueuedCase`]s up front, so a reparse during a batch cannot hand it a half-built subtree.
//! - Files that could not be read or parsed keep no children and are skipped by snapshots; their
//!   [`FileState::Failed`] message is what callers show instead.

pub mod generation;
pub mod node;
pub mod selection;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use verdict_syntax::{DefinitionStyle, DocumentConfig, TestRecord};

pub use generation::{Generation, next_generation};
pub use node::{CaseNode, CatalogNode, FileNode, FileState, GroupNode, NodeRef, build_children};
pub use selection::{NodeId, Selection};

use crate::outcome::CaseRunState;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Identity of one case: its defining file plus its name, unique within that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseId {
    pub file: PathBuf,
    pub name: String,
}

impl CaseId {
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.file.display(), self.name)
    }
}

/// An owned copy of everything the engine needs to run one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCase {
    pub id: CaseId,
    /// Names of the enclosing groups, outermost first.
    pub groups: Vec<String>,
    pub generation: Generation,
    pub style: DefinitionStyle,
    pub record: TestRecord,
    /// The file's `[config]`, or `None` when it had errors and must not be used.
    pub config: Option<DocumentConfig>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    files: Vec<FileNode>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file to be parsed later. Returns false if it is already known.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, style: DefinitionStyle) -> bool {
        let path = path.into();
        if self.position(&path).is_some() {
            return false;
        }
        self.files.push(FileNode::unresolved(path, style));
        true
    }

    pub fn remove_file(&mut self, path: &Path) -> bool {
        let before = self.files.len();
        self.files.retain(|file| file.path != path);
        self.files.len() != before
    }

    pub fn files(&self) -> &[FileNode] {
        &self.files
    }

    pub fn file(&self, path: &Path) -> Option<&FileNode> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn case(&self, id: &CaseId) -> Option<&CaseNode> {
        self.file(&id.file)?.case(&id.name)
    }

    /// Parse `text` as the new contents of `path` and swap in the resulting subtree.
    ///
    /// Files not yet in the catalog are added, with their style guessed from the file name.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn build_or_update(&mut self, path: &Path, text: &str) -> Generation {
        let style = self
            .file(path)
            .map_or_else(|| DefinitionStyle::from_path(path), |file| file.style);
        let parsed = verdict_syntax::parse(text, style);
        let generation = next_generation();

        let mut node = FileNode::unresolved(path, style);
        node.generation = generation;
        if parsed.unreadable {
            let reason = parsed
                .diagnostics
                .iter()
                .find(|d| d.is_error())
                .map_or_else(|| "document could not be parsed".to_string(), |d| d.message.clone());
            node.state = FileState::Failed(reason);
        } else {
            node.state = FileState::Ready;
            node.children = build_children(parsed.items);
        }
        node.config = parsed.config;
        node.diagnostics = parsed.diagnostics;

        tracing::debug!(
            %generation,
            children = node.children.len(),
            diagnostics = node.diagnostics.len(),
            "rebuilt file subtree"
        );
        self.replace(node);
        generation
    }

    /// Re-read `path` from disk and rebuild its subtree.
    ///
    /// A read failure leaves the file in the catalog with a failed state and no children.
    pub fn update_from_disk(&mut self, path: &Path) -> Result<Generation, CatalogError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(self.build_or_update(path, &text)),
            Err(source) => {
                let style = self
                    .file(path)
                    .map_or_else(|| DefinitionStyle::from_path(path), |file| file.style);
                let mut node = FileNode::unresolved(path, style);
                node.generation = next_generation();
                node.state = FileState::Failed(source.to_string());
                self.replace(node);
                Err(CatalogError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Parse every file still in the unresolved state.
    pub fn resolve_pending(&mut self) -> Vec<CatalogError> {
        let pending: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|file| file.state == FileState::Unresolved)
            .map(|file| file.path.clone())
            .collect();
        pending
            .iter()
            .filter_map(|path| self.update_from_disk(path).err())
            .collect()
    }

    /// Selected cases of every ready file, in catalog order.
    pub fn snapshot(&self, selection: &Selection) -> Vec<QueuedCase> {
        let mut queue = Vec::new();
        for file in self.files.iter().filter(|file| file.is_ready()) {
            let config = file.config_usable().then(|| file.config.clone());
            for (groups, case) in file.cases() {
                if !selection.selects(&file.path, &groups, case.name()) {
                    continue;
                }
                queue.push(QueuedCase {
                    id: CaseId::new(&file.path, case.name()),
                    groups,
                    generation: file.generation,
                    style: file.style,
                    record: case.record.clone(),
                    config: config.clone(),
                });
            }
        }
        queue
    }

    /// Store a case result, unless it was computed against a superseded parse of its file.
    pub fn apply_result(&mut self, id: &CaseId, generation: Generation, state: CaseRunState) -> bool {
        let Some(file) = self.files.iter_mut().find(|file| file.path == id.file) else {
            return false;
        };
        if file.generation != generation {
            tracing::debug!(case = %id, %generation, current = %file.generation, "discarding stale result");
            return false;
        }
        match file.case_mut(&id.name) {
            Some(case) => {
                case.state = state;
                true
            }
            None => false,
        }
    }

    /// Reset the given cases to the unknown state.
    pub fn reset_states(&mut self, ids: &[CaseId]) {
        for id in ids {
            if let Some(case) = self
                .files
                .iter_mut()
                .find(|file| file.path == id.file)
                .and_then(|file| file.case_mut(&id.name))
            {
                case.state = CaseRunState::default();
            }
        }
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|file| file.path == path)
    }

    fn replace(&mut self, node: FileNode) {
        match self.position(&node.path) {
            Some(index) => self.files[index] = node,
            None => self.files.push(node),
        }
    }
}
