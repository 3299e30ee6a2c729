//! Choosing which cases a batch runs

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Addresses a file, a group inside it, or a single case.
///
/// Written as `file` or `file::Group/Sub/case`. A node id selects everything whose path starts with it, so a file
/// or group id covers its whole subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub file: PathBuf,
    pub path: Vec<String>,
}

impl NodeId {
    pub fn file(file: impl AsRef<Path>) -> Self {
        Self {
            file: normalize(file.as_ref()),
            path: Vec::new(),
        }
    }

    pub fn child(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    /// True if the case `name` under `groups` in `file` lies inside this node.
    pub fn covers(&self, file: &Path, groups: &[String], name: &str) -> bool {
        if self.file != normalize(file) {
            return false;
        }
        let full = groups.iter().map(String::as_str).chain(std::iter::once(name));
        self.path.len() <= groups.len() + 1 && self.path.iter().map(String::as_str).zip(full).all(|(a, b)| a == b)
    }
}

impl FromStr for NodeId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (file, path) = match s.split_once("::") {
            Some((file, path)) => (file, path),
            None => (s, ""),
        };
        Ok(Self {
            file: normalize(Path::new(file)),
            path: path.split('/').filter(|seg| !seg.is_empty()).map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if !self.path.is_empty() {
            write!(f, "::{}", self.path.join("/"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Explicit set to run; `None` means every case in the catalog.
    pub include: Option<Vec<NodeId>>,
    pub exclude: Vec<NodeId>,
    /// Keep only cases whose name contains this keyword.
    pub filter: Option<String>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_include(mut self, ids: Vec<NodeId>) -> Self {
        self.include = Some(ids);
        self
    }

    pub fn with_exclude(mut self, ids: Vec<NodeId>) -> Self {
        self.exclude = ids;
        self
    }

    pub fn with_filter(mut self, keyword: impl Into<String>) -> Self {
        self.filter = Some(keyword.into());
        self
    }

    pub fn selects(&self, file: &Path, groups: &[String], name: &str) -> bool {
        let included = match &self.include {
            Some(include) => include.iter().any(|id| id.covers(file, groups, name)),
            None => true,
        };
        if !included {
            return false;
        }
        if self.exclude.iter().any(|id| id.covers(file, groups, name)) {
            return false;
        }
        self.filter.as_deref().is_none_or(|keyword| name.contains(keyword))
    }
}

/// Drop `.` components so `./tests.toml` and `tests.toml` address the same file.
pub fn normalize(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}
