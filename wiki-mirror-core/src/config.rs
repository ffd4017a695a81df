//! Run configuration, passed explicitly into [`crate::synchronise::synchronise`].
//!
//! Nothing here reads the environment: the CLI crate assembles a [`SyncConfig`]
//! from YAML and secrets, and tests build one by hand.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";
pub const DEFAULT_FRESHNESS_DAYS: u32 = 3;

/// App credentials exchanged once per run for a bearer token.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

/// Transport tuning. Every field has a default so YAML may omit the section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub base_url: String,
    /// Minimum delay between two consecutive remote calls.
    pub min_interval_ms: u64,
    pub timeout_ms: u64,
    /// Extra attempts after the first one; 0 disables retry.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            min_interval_ms: 300,
            timeout_ms: 30_000,
            max_retries: 0,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 10_000,
        }
    }
}

/// A document synced outside the tree to a fixed location (e.g. an "about" page).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandalonePage {
    pub obj_token: String,
    pub title: String,
    /// Target file, relative to the output directory.
    pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub output_dir: PathBuf,
    pub space_id: String,
    pub root_node_token: String,
    /// Freshness window in days; 0 means full sync.
    pub freshness_days: u32,
    /// Short-circuits the whole pipeline, leaving the output untouched.
    pub disabled: bool,
    /// Fetch slugs of fresh ancestors so descendants never fall back to raw tokens.
    pub resolve_ancestor_slugs: bool,
    pub transport: TransportConfig,
    pub standalone_pages: Vec<StandalonePage>,
}

impl SyncConfig {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        space_id: impl Into<String>,
        root_node_token: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            space_id: space_id.into(),
            root_node_token: root_node_token.into(),
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            disabled: false,
            resolve_ancestor_slugs: true,
            transport: TransportConfig::default(),
            standalone_pages: Vec::new(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            output_dir = %self.output_dir.display(),
            space_id = %self.space_id,
            root_node_token = %self.root_node_token,
            freshness_days = self.freshness_days,
            disabled = self.disabled,
            standalone_pages = self.standalone_pages.len(),
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
