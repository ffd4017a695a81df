//! High-level pipeline: discover → filter → collect (phase 1) → write (phase 2).
//!
//! This module drives one synchronisation run of the remote wiki tree into the
//! local output directory. It:
//!   - Authenticates once, then walks the tree below the configured root
//!   - Keeps only stale documents according to the [`FreshnessPolicy`]
//!   - Fetches and normalizes every stale document, learning slugs into a [`SlugMap`]
//!   - Optionally fetches the slugs of fresh ancestors, so paths never fall back to raw tokens
//!   - Resolves output paths against the completed map and writes each document,
//!     deleting stale siblings that claim the same slug
//!   - Syncs the configured standalone pages
//!
//! # Major Types
//! - [`SyncReport`]: tallies of what was discovered, written, skipped and failed
//! - [`SyncError`]: failures that abort the run (authentication, discovery)
//!
//! # Error Handling
//! Authentication and discovery failures end the run. A document that fails to
//! fetch, is empty, or cannot be written is logged, counted and skipped; its
//! local file is left as it was.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Phases: [`collect_documents`], [`resolve_ancestor_slugs`], [`write_documents`]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{StandalonePage, SyncConfig};
use crate::contract::{NormalizedDocument, SyncCandidate, WikiApi, WikiNode};
use crate::discovery::{collect_candidates, DiscoveryError};
use crate::freshness::FreshnessPolicy;
use crate::normalize::{fetch_document, ContentError};
use crate::output::{write_document, FrontMatter, OutputError, WriteOutcome, WriteStatus};
use crate::slug::{resolve_output_path, OutputPath, SlugMap};
use crate::transport::TransportError;

/// Failures that abort the whole run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Authentication(#[source] TransportError),

    #[error("tree discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub discovered: usize,
    pub stale: usize,
    pub fresh: usize,
    pub written: usize,
    pub unchanged: usize,
    pub empty: usize,
    pub failed: usize,
    pub removed_duplicates: usize,
    /// The run was disabled and touched nothing.
    pub skipped: bool,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.written + self.unchanged
    }

    fn record_write(&mut self, result: Result<WriteOutcome, OutputError>) {
        match result {
            Ok(outcome) => {
                match outcome.status {
                    WriteStatus::Written => self.written += 1,
                    WriteStatus::Unchanged => self.unchanged += 1,
                }
                self.removed_duplicates += outcome.removed.len();
            }
            Err(e) => {
                error!(error = %e, "[SYNC][ERROR] Failed to write document");
                self.failed += 1;
            }
        }
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "Sync skipped: disabled by configuration, output left untouched.");
        }
        write!(
            f,
            "Discovered {} documents ({} stale, {} fresh). Processed {} ({} written, {} unchanged), \
             skipped {} empty, failed {}, removed {} stale duplicates.",
            self.discovered,
            self.stale,
            self.fresh,
            self.processed(),
            self.written,
            self.unchanged,
            self.empty,
            self.failed,
            self.removed_duplicates,
        )
    }
}

/// A stale candidate together with its normalized content.
#[derive(Debug, Clone)]
pub struct CollectedDocument {
    pub candidate: SyncCandidate,
    pub document: NormalizedDocument,
}

pub async fn synchronise<A>(config: &SyncConfig, api: &A) -> Result<SyncReport, SyncError>
where
    A: WikiApi + ?Sized,
{
    if config.disabled {
        info!("[SYNC] Synchronisation disabled, leaving output untouched");
        return Ok(SyncReport::skipped());
    }

    info!(
        root_node_token = %config.root_node_token,
        output_dir = %config.output_dir.display(),
        freshness_days = config.freshness_days,
        "[SYNC] Starting synchronisation"
    );
    api.authenticate().await.map_err(|e| {
        error!(error = %e, "[SYNC][ERROR] Authentication failed");
        SyncError::Authentication(e)
    })?;

    let candidates = collect_candidates(api, &config.root_node_token)
        .await
        .map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] Tree discovery failed");
            e
        })?;

    let policy = FreshnessPolicy::new(config.freshness_days);
    let known: HashMap<String, WikiNode> = candidates
        .iter()
        .map(|c| (c.node.node_token.clone(), c.node.clone()))
        .collect();
    let (stale, fresh): (Vec<SyncCandidate>, Vec<SyncCandidate>) =
        candidates.into_iter().partition(|c| policy.is_stale(&c.node));

    let mut report = SyncReport {
        discovered: stale.len() + fresh.len(),
        stale: stale.len(),
        fresh: fresh.len(),
        ..SyncReport::default()
    };
    info!(
        discovered = report.discovered,
        stale = report.stale,
        fresh = report.fresh,
        full_sync = policy.is_full_sync(),
        "[SYNC] Change detection complete"
    );

    let (documents, mut slugs) = collect_documents(api, &stale, &mut report).await;
    if config.resolve_ancestor_slugs {
        resolve_ancestor_slugs(api, &stale, &known, &mut slugs).await;
    }
    write_documents(&config.output_dir, &documents, &slugs, &mut report);

    for page in &config.standalone_pages {
        sync_standalone_page(api, &config.output_dir, page, &mut report).await;
    }

    info!(report = %report, "[SYNC] Synchronisation finished");
    Ok(report)
}

/// Phase 1: fetch and normalize every stale candidate, learning slugs.
pub async fn collect_documents<A>(
    api: &A,
    stale: &[SyncCandidate],
    report: &mut SyncReport,
) -> (Vec<CollectedDocument>, SlugMap)
where
    A: WikiApi + ?Sized,
{
    let mut slugs = SlugMap::new();
    let mut documents = Vec::with_capacity(stale.len());

    for candidate in stale {
        let node = &candidate.node;
        debug!(node_token = %node.node_token, title = %node.title, "[SYNC] Fetching document");
        match fetch_document(api, &node.obj_token).await {
            Ok(document) => {
                if let Some(slug) = &document.slug {
                    slugs.insert(node.node_token.clone(), slug.clone());
                }
                documents.push(CollectedDocument {
                    candidate: candidate.clone(),
                    document,
                });
            }
            Err(ContentError::Empty) => {
                warn!(node_token = %node.node_token, title = %node.title, "[SYNC] Document is empty, skipping");
                report.empty += 1;
            }
            Err(e) => {
                error!(node_token = %node.node_token, title = %node.title, error = %e, "[SYNC][ERROR] Failed to fetch document");
                report.failed += 1;
            }
        }
    }

    info!(
        collected = documents.len(),
        slugs = slugs.len(),
        "[SYNC] Phase 1 complete"
    );
    (documents, slugs)
}

/// Learns the slugs of ancestors that were not fetched in phase 1 (typically
/// because they are fresh). Their content is not written. A failed lookup
/// leaves the raw token in descendant paths.
pub async fn resolve_ancestor_slugs<A>(
    api: &A,
    stale: &[SyncCandidate],
    known: &HashMap<String, WikiNode>,
    slugs: &mut SlugMap,
) where
    A: WikiApi + ?Sized,
{
    let fetched: HashSet<&str> = stale.iter().map(SyncCandidate::node_token).collect();
    let mut missing: Vec<&str> = Vec::new();
    for token in stale.iter().flat_map(|c| c.parent_path.iter()) {
        let token = token.as_str();
        if !fetched.contains(token) && !slugs.contains(token) && !missing.contains(&token) {
            missing.push(token);
        }
    }

    for token in missing {
        let Some(node) = known.get(token) else {
            warn!(node_token = %token, "[SYNC] Ancestor was not discovered, keeping raw token");
            continue;
        };
        match fetch_document(api, &node.obj_token).await {
            Ok(NormalizedDocument { slug: Some(slug), .. }) => {
                debug!(node_token = %token, slug = %slug, "[SYNC] Resolved ancestor slug");
                slugs.insert(token, slug);
            }
            Ok(_) | Err(ContentError::Empty) => {
                debug!(node_token = %token, "[SYNC] Ancestor has no slug");
            }
            Err(e) => {
                warn!(node_token = %token, error = %e, "[SYNC] Could not fetch ancestor, keeping raw token");
            }
        }
    }
}

/// Phase 2: resolve paths against the completed [`SlugMap`] and write.
pub fn write_documents(
    root: &Path,
    documents: &[CollectedDocument],
    slugs: &SlugMap,
    report: &mut SyncReport,
) {
    for collected in documents {
        let candidate = &collected.candidate;
        let slug = collected.document.slug.as_deref();
        let output = resolve_output_path(candidate, slug, slugs);
        let front_matter = FrontMatter::new(
            candidate.node.title.clone(),
            slug,
            output.is_index,
            candidate.position,
        );
        debug!(
            node_token = %candidate.node.node_token,
            path = %output.path.display(),
            "[SYNC] Resolved output path"
        );
        report.record_write(write_document(
            root,
            &output,
            slug,
            &front_matter,
            &collected.document.cleaned_content,
        ));
    }
    info!(
        written = report.written,
        unchanged = report.unchanged,
        "[SYNC] Phase 2 complete"
    );
}

async fn sync_standalone_page<A>(api: &A, root: &Path, page: &StandalonePage, report: &mut SyncReport)
where
    A: WikiApi + ?Sized,
{
    info!(obj_token = %page.obj_token, output = %page.output.display(), "[SYNC] Syncing standalone page");
    let document = match fetch_document(api, &page.obj_token).await {
        Ok(document) => document,
        Err(ContentError::Empty) => {
            warn!(obj_token = %page.obj_token, "[SYNC] Standalone page is empty, skipping");
            report.empty += 1;
            return;
        }
        Err(e) => {
            error!(obj_token = %page.obj_token, error = %e, "[SYNC][ERROR] Failed to fetch standalone page");
            report.failed += 1;
            return;
        }
    };

    let slug = document.slug.as_deref();
    let output = OutputPath {
        path: page.output.clone(),
        is_index: false,
    };
    let front_matter = FrontMatter::new(page.title.clone(), slug, false, 0);
    report.record_write(write_document(
        root,
        &output,
        slug,
        &front_matter,
        &document.cleaned_content,
    ));
}
