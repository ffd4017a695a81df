//! Slug bookkeeping and output path resolution.
//!
//! Phase 1 fills a [`SlugMap`]; phase 2 reads it through
//! [`resolve_output_path`], which is a pure function of its inputs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::contract::SyncCandidate;

/// `node_token -> slug`, write-once per key for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlugMap {
    slugs: HashMap<String, String>,
}

impl SlugMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `slug` for `node_token`. Returns `false`, leaving the first
    /// value in place, when the token already has a slug.
    pub fn insert(&mut self, node_token: impl Into<String>, slug: impl Into<String>) -> bool {
        let node_token = node_token.into();
        if let Some(existing) = self.slugs.get(&node_token) {
            warn!(node_token = %node_token, existing = %existing, "Slug already recorded, keeping the first");
            return false;
        }
        self.slugs.insert(node_token, slug.into());
        true
    }

    pub fn get(&self, node_token: &str) -> Option<&str> {
        self.slugs.get(node_token).map(String::as_str)
    }

    pub fn contains(&self, node_token: &str) -> bool {
        self.slugs.contains_key(node_token)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

/// Where a document lands, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    pub path: PathBuf,
    /// `true` for `<name>/index.md` of a node with children.
    pub is_index: bool,
}

impl OutputPath {
    /// Directory the document is written into, relative to the output root.
    pub fn parent_dir(&self) -> &Path {
        let parent = self.path.parent().unwrap_or(Path::new(""));
        if self.is_index {
            parent.parent().unwrap_or(Path::new(""))
        } else {
            parent
        }
    }
}

/// Resolves each ancestor through `slugs` (falling back to its raw token) and
/// names the document after `own_slug` or its node token.
pub fn resolve_output_path(
    candidate: &SyncCandidate,
    own_slug: Option<&str>,
    slugs: &SlugMap,
) -> OutputPath {
    let mut path: PathBuf = candidate
        .parent_path
        .iter()
        .map(|token| slugs.get(token).unwrap_or(token.as_str()))
        .collect();
    let name = own_slug.unwrap_or(candidate.node_token());

    if candidate.has_child() {
        path.push(name);
        path.push("index.md");
        OutputPath {
            path,
            is_index: true,
        }
    } else {
        path.push(format!("{name}.md"));
        OutputPath {
            path,
            is_index: false,
        }
    }
}
