//! Catalog tree nodes
//!
//! A file owns an ordered list of children; groups nest children for display only; a case wraps exactly one
//! [`TestRecord`] plus its run state. Only files and groups have children.

use std::path::PathBuf;

use verdict_syntax::table::{CONFIG_KEYS, CONFIG_SECTION};
use verdict_syntax::{DefinitionStyle, Diagnostic, DiagnosticKind, DocumentConfig, Heading, Item, SourceRange, TestRecord};

use super::generation::Generation;
use crate::outcome::CaseRunState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    /// Registered but not parsed yet.
    Unresolved,
    Ready,
    /// Could not be read or parsed at all. The file has no children.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FileNode {
    pub path: PathBuf,
    pub style: DefinitionStyle,
    pub generation: Generation,
    pub state: FileState,
    pub config: DocumentConfig,
    pub diagnostics: Vec<Diagnostic>,
    pub children: Vec<CatalogNode>,
}

impl FileNode {
    pub fn unresolved(path: impl Into<PathBuf>, style: DefinitionStyle) -> Self {
        Self {
            path: path.into(),
            style,
            generation: Generation::NONE,
            state: FileState::Unresolved,
            config: DocumentConfig::default(),
            diagnostics: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == FileState::Ready
    }

    /// False when the `[config]` table had errors; cases then fall back to settings defaults.
    pub fn config_usable(&self) -> bool {
        !self.diagnostics.iter().filter(|d| d.is_error()).any(|d| match &d.kind {
            DiagnosticKind::MissingConfigKey(_) => true,
            DiagnosticKind::MissingSection(section) => section == CONFIG_SECTION,
            DiagnosticKind::InvalidValue { key, .. } => key == CONFIG_SECTION || CONFIG_KEYS.contains(&key.as_str()),
            _ => false,
        })
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }

    /// Depth-first walk over every case, with the names of the groups enclosing it.
    pub fn cases(&self) -> Vec<(Vec<String>, &CaseNode)> {
        let mut out = Vec::new();
        collect_cases(&self.children, &mut Vec::new(), &mut out);
        out
    }

    pub fn case(&self, name: &str) -> Option<&CaseNode> {
        find_case(&self.children, name)
    }

    pub fn case_mut(&mut self, name: &str) -> Option<&mut CaseNode> {
        find_case_mut(&mut self.children, name)
    }

    pub fn node_ref(&self) -> NodeRef<'_> {
        NodeRef::File(self)
    }
}

#[derive(Debug, Clone)]
pub struct GroupNode {
    pub name: String,
    pub depth: usize,
    pub range: SourceRange,
    pub children: Vec<CatalogNode>,
}

#[derive(Debug, Clone)]
pub struct CaseNode {
    pub record: TestRecord,
    pub state: CaseRunState,
}

impl CaseNode {
    pub fn new(record: TestRecord) -> Self {
        Self {
            record,
            state: CaseRunState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }
}

#[derive(Debug, Clone)]
pub enum CatalogNode {
    Group(GroupNode),
    Case(CaseNode),
}

impl CatalogNode {
    pub fn node_ref(&self) -> NodeRef<'_> {
        match self {
            CatalogNode::Group(group) => NodeRef::Group(group),
            CatalogNode::Case(case) => NodeRef::Case(case),
        }
    }
}

/// Borrowed view over any node of the tree.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    File(&'a FileNode),
    Group(&'a GroupNode),
    Case(&'a CaseNode),
}

impl<'a> NodeRef<'a> {
    pub fn name(&self) -> String {
        match self {
            NodeRef::File(file) => file.path.display().to_string(),
            NodeRef::Group(group) => group.name.clone(),
            NodeRef::Case(case) => case.record.name.clone(),
        }
    }

    /// Children of a file or group; `None` for a case.
    pub fn children(&self) -> Option<&'a [CatalogNode]> {
        match self {
            NodeRef::File(file) => Some(&file.children),
            NodeRef::Group(group) => Some(&group.children),
            NodeRef::Case(_) => None,
        }
    }
}

struct OpenGroup {
    heading: Heading,
    children: Vec<CatalogNode>,
}

/// Nest parsed items into a tree.
///
/// A heading closes every open group at the same or a deeper level before opening its own, and whatever is still
/// open at the end is closed the same way.
pub fn build_children(items: Vec<Item>) -> Vec<CatalogNode> {
    let mut root = Vec::new();
    let mut open: Vec<OpenGroup> = Vec::new();

    for item in items {
        match item {
            Item::Heading(heading) => {
                while open.last().is_some_and(|top| top.heading.depth >= heading.depth) {
                    close_group(&mut open, &mut root);
                }
                open.push(OpenGroup {
                    heading,
                    children: Vec::new(),
                });
            }
            Item::Test(record) => {
                let case = CatalogNode::Case(CaseNode::new(record));
                match open.last_mut() {
                    Some(group) => group.children.push(case),
                    None => root.push(case),
                }
            }
        }
    }
    while !open.is_empty() {
        close_group(&mut open, &mut root);
    }
    root
}

fn close_group(open: &mut Vec<OpenGroup>, root: &mut Vec<CatalogNode>) {
    let Some(group) = open.pop() else {
        return;
    };
    let node = CatalogNode::Group(GroupNode {
        name: group.heading.name,
        depth: group.heading.depth,
        range: group.heading.range,
        children: group.children,
    });
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

fn collect_cases<'a>(nodes: &'a [CatalogNode], path: &mut Vec<String>, out: &mut Vec<(Vec<String>, &'a CaseNode)>) {
    for node in nodes {
        match node {
            CatalogNode::Case(case) => out.push((path.clone(), case)),
            CatalogNode::Group(group) => {
                path.push(group.name.clone());
                collect_cases(&group.children, path, out);
                path.pop();
            }
        }
    }
}

fn find_case<'a>(nodes: &'a [CatalogNode], name: &str) -> Option<&'a CaseNode> {
    nodes.iter().find_map(|node| match node {
        CatalogNode::Case(case) if case.record.name == name => Some(case),
        CatalogNode::Case(_) => None,
        CatalogNode::Group(group) => find_case(&group.children, name),
    })
}

fn find_case_mut<'a>(nodes: &'a mut [CatalogNode], name: &str) -> Option<&'a mut CaseNode> {
    nodes.iter_mut().find_map(|node| match node {
        CatalogNode::Case(case) if case.record.name == name => Some(case),
        CatalogNode::Case(_) => None,
        CatalogNode::Group(group) => find_case_mut(&mut group.children, name),
    })
}
