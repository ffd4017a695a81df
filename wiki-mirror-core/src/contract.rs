//! # contract: data model and the remote wiki interface
//!
//! Plain data types handed from stage to stage, plus the [`WikiApi`] trait the
//! pipeline talks to. The real implementation lives in [`crate::client`];
//! tests use the `mockall`-generated `MockWikiApi`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::transport::TransportError;

/// One entry of the remote document tree, as returned by the children listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiNode {
    pub node_token: String,
    pub obj_token: String,
    #[serde(default)]
    pub obj_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub has_child: bool,
    /// Seconds since epoch, sent by the remote as a string.
    #[serde(default, rename = "obj_edit_time")]
    pub edit_timestamp: Option<String>,
}

/// One page of a children listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChildrenPage {
    #[serde(default)]
    pub items: Vec<WikiNode>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub page_token: Option<String>,
}

/// A discovered node annotated with its place in the hierarchy.
///
/// `parent_path` lists ancestor node tokens strictly below the traversal root
/// and never contains `node.node_token`. `position` is 1-based and dense
/// within a sibling group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCandidate {
    pub node: WikiNode,
    pub depth: usize,
    pub parent_path: Vec<String>,
    pub position: usize,
}

impl SyncCandidate {
    pub fn node_token(&self) -> &str {
        &self.node.node_token
    }

    pub fn has_child(&self) -> bool {
        self.node.has_child
    }
}

/// Result of fetching and cleaning one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub raw_content: String,
    pub slug: Option<String>,
    pub cleaned_content: String,
}

/// Remote wiki operations used by the pipeline.
///
/// Implementors own their bearer token; `authenticate` must succeed before the
/// read operations are called.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WikiApi: Send + Sync {
    /// Exchange the app credentials for a bearer token held in memory.
    async fn authenticate(&self) -> Result<(), TransportError>;

    /// List one page of children of `node_token`.
    async fn list_children(
        &self,
        node_token: &str,
        page_token: Option<String>,
    ) -> Result<ChildrenPage, TransportError>;

    /// Fetch the markdown export of a document.
    async fn fetch_content(&self, obj_token: &str) -> Result<String, TransportError>;
}
