#![doc = "wiki-mirror-core: incremental wiki to markdown synchronisation pipeline."]

//! This crate holds every pipeline stage of wiki-mirror: the rate-limited
//! transport and remote client, tree discovery, change detection, content
//! normalization, slug resolution and output reconciliation. CLI concerns
//! (argument parsing, environment, exit codes) live in the `wiki-mirror` crate.
//!
//! # Usage
//! Build a [`config::SyncConfig`], a [`client::WikiClient`] (or any
//! [`contract::WikiApi`]) and call [`synchronise::synchronise`].

pub mod client;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod freshness;
pub mod normalize;
pub mod output;
pub mod slug;
pub mod synchronise;
pub mod transport;
