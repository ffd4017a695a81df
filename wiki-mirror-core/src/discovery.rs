//! Depth-first discovery of the remote tree as a lazy stream of [`SyncCandidate`]s.
//!
//! A node is yielded before its subtree, and its children are only listed when
//! the stream is polled past it. Listing failures end the stream with an error.

use std::collections::VecDeque;

use futures::stream::{self, Stream, TryStreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contract::{SyncCandidate, WikiApi, WikiNode};
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to list children of {node_token}: {source}")]
pub struct DiscoveryError {
    pub node_token: String,
    #[source]
    pub source: TransportError,
}

struct Frame {
    parent_path: Vec<String>,
    depth: usize,
    pending: VecDeque<(usize, WikiNode)>,
}

struct Expansion {
    node_token: String,
    children_parent_path: Vec<String>,
    children_depth: usize,
}

struct Walk<'a, A: ?Sized> {
    api: &'a A,
    stack: Vec<Frame>,
    expand: Option<Expansion>,
}

/// Lists every child of `node_token`, following page tokens until exhausted.
pub async fn list_all_children<A>(api: &A, node_token: &str) -> Result<Vec<WikiNode>, DiscoveryError>
where
    A: WikiApi + ?Sized,
{
    let mut children = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let page = api
            .list_children(node_token, page_token.take())
            .await
            .map_err(|source| DiscoveryError {
                node_token: node_token.to_string(),
                source,
            })?;
        children.extend(page.items);
        match (page.has_more, page.page_token) {
            (true, Some(next)) if !next.is_empty() => page_token = Some(next),
            (true, _) => {
                warn!(node_token, "Listing reported more pages but no page token, stopping");
                break;
            }
            (false, _) => break,
        }
    }
    Ok(children)
}

/// Walks the tree below `root_node_token`. The root itself is not yielded.
pub fn traverse<'a, A>(
    api: &'a A,
    root_node_token: &str,
) -> impl Stream<Item = Result<SyncCandidate, DiscoveryError>> + 'a
where
    A: WikiApi + ?Sized,
{
    let walk = Walk {
        api,
        stack: Vec::new(),
        expand: Some(Expansion {
            node_token: root_node_token.to_string(),
            children_parent_path: Vec::new(),
            children_depth: 0,
        }),
    };

    stream::try_unfold(walk, |mut walk| async move {
        loop {
            if let Some(expansion) = walk.expand.take() {
                let children = list_all_children(walk.api, &expansion.node_token).await?;
                debug!(
                    node_token = %expansion.node_token,
                    depth = expansion.children_depth,
                    children = children.len(),
                    "Expanded node"
                );
                // Nodes that reappear in their own ancestry are dropped before numbering.
                let pending = children
                    .into_iter()
                    .filter(|node| {
                        let cyclic = expansion.children_parent_path.contains(&node.node_token);
                        if cyclic {
                            warn!(node_token = %node.node_token, "Node appears in its own ancestry, skipping");
                        }
                        !cyclic
                    })
                    .enumerate()
                    .map(|(index, node)| (index + 1, node))
                    .collect();
                walk.stack.push(Frame {
                    parent_path: expansion.children_parent_path,
                    depth: expansion.children_depth,
                    pending,
                });
                continue;
            }

            let Some(frame) = walk.stack.last_mut() else {
                return Ok::<_, DiscoveryError>(None);
            };
            let Some((position, node)) = frame.pending.pop_front() else {
                walk.stack.pop();
                continue;
            };

            if node.has_child {
                let mut children_parent_path = frame.parent_path.clone();
                children_parent_path.push(node.node_token.clone());
                walk.expand = Some(Expansion {
                    node_token: node.node_token.clone(),
                    children_parent_path,
                    children_depth: frame.depth + 1,
                });
            }

            let candidate = SyncCandidate {
                depth: frame.depth,
                parent_path: frame.parent_path.clone(),
                position,
                node,
            };
            return Ok(Some((candidate, walk)));
        }
    })
}

/// Drains [`traverse`] into a vector, stopping at the first error.
pub async fn collect_candidates<A>(
    api: &A,
    root_node_token: &str,
) -> Result<Vec<SyncCandidate>, DiscoveryError>
where
    A: WikiApi + ?Sized,
{
    let candidates: Vec<SyncCandidate> = traverse(api, root_node_token).try_collect().await?;
    info!(root_node_token, count = candidates.len(), "Discovery complete");
    Ok(candidates)
}
