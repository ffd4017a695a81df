//! Stale/fresh classification of remote documents by edit time.

use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::contract::WikiNode;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A document is stale (needs fetching) when it was edited within the last
/// `threshold_days`. A zero window marks everything stale, and so does a
/// missing or unreadable timestamp. Edits dated in the future are stale too.
pub fn is_stale(edit_timestamp: Option<&str>, threshold_days: u32, now: DateTime<Utc>) -> bool {
    if threshold_days == 0 {
        return true;
    }
    let Some(edited_at) = edit_timestamp.and_then(parse_timestamp) else {
        return true;
    };
    let elapsed_days = (now - edited_at).num_seconds() as f64 / SECONDS_PER_DAY;
    elapsed_days <= f64::from(threshold_days)
}

/// Seconds since epoch, as the remote sends it (a decimal string).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let seconds: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

/// The freshness window pinned to one instant, so every candidate of a run is
/// judged against the same clock reading.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    threshold_days: u32,
    now: DateTime<Utc>,
}

impl FreshnessPolicy {
    pub fn new(threshold_days: u32) -> Self {
        Self::at(threshold_days, Utc::now())
    }

    pub fn at(threshold_days: u32, now: DateTime<Utc>) -> Self {
        Self { threshold_days, now }
    }

    pub fn is_full_sync(&self) -> bool {
        self.threshold_days == 0
    }

    pub fn is_stale(&self, node: &WikiNode) -> bool {
        let stale = is_stale(node.edit_timestamp.as_deref(), self.threshold_days, self.now);
        if !stale {
            debug!(node_token = %node.node_token, title = %node.title, "Fresh, skipping");
        }
        stale
    }
}
