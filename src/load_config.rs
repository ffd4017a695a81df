/// `load_config` module: loads the static YAML config and injects secrets and
/// overrides from the environment, producing the core [`SyncConfig`].
///
/// This module is the only place where untrusted YAML and environment values are
/// parsed and mapped to the strongly-typed configuration of `wiki-mirror-core`.
///
/// # Responsibilities
/// - Parse the YAML file (output directory, tree root, freshness window, transport tuning, standalone pages)
/// - Read `FEISHU_APP_ID` / `FEISHU_APP_SECRET` from the environment; secrets never live in YAML
/// - Apply `SKIP_FEISHU_SYNC` and `FEISHU_INCREMENTAL_DAYS`
/// - Name the offending file or key in every error
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use wiki_mirror_core::config::{
    Credentials, StandalonePage, SyncConfig, TransportConfig, DEFAULT_FRESHNESS_DAYS,
};

pub const APP_ID_VAR: &str = "FEISHU_APP_ID";
pub const APP_SECRET_VAR: &str = "FEISHU_APP_SECRET";
pub const SKIP_VAR: &str = "SKIP_FEISHU_SYNC";
pub const DAYS_VAR: &str = "FEISHU_INCREMENTAL_DAYS";

/// Fully resolved CLI configuration. Credentials are absent only when the run
/// is disabled.
#[derive(Debug)]
pub struct CliConfig {
    pub sync: SyncConfig,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    output_dir: PathBuf,
    space_id: String,
    root_node_token: String,
    #[serde(default = "default_freshness_days")]
    freshness_days: u32,
    #[serde(default)]
    disabled: bool,
    #[serde(default = "default_true")]
    resolve_ancestor_slugs: bool,
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    standalone_pages: Vec<StandalonePage>,
}

fn default_freshness_days() -> u32 {
    DEFAULT_FRESHNESS_DAYS
}

fn default_true() -> bool {
    true
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: RawConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML {:?}: {e}", path_ref)
    })?;

    let mut sync = SyncConfig {
        output_dir: raw.output_dir,
        space_id: raw.space_id,
        root_node_token: raw.root_node_token,
        freshness_days: raw.freshness_days,
        disabled: raw.disabled,
        resolve_ancestor_slugs: raw.resolve_ancestor_slugs,
        transport: raw.transport,
        standalone_pages: raw.standalone_pages,
    };

    if skip_requested()? {
        info!(var = SKIP_VAR, "Synchronisation disabled by environment");
        sync.disabled = true;
    }
    if let Some(days) = env_u32(DAYS_VAR)? {
        info!(var = DAYS_VAR, days, "Freshness window overridden by environment");
        sync.freshness_days = days;
    }

    let credentials = if sync.disabled {
        None
    } else {
        Some(Credentials {
            app_id: required_env(APP_ID_VAR)?,
            app_secret: required_env(APP_SECRET_VAR)?,
        })
    };

    info!(config_path = ?path_ref, "Configuration loaded");
    Ok(CliConfig { sync, credentials })
}

/// `--full` forces a zero window; `--days` wins over everything.
pub fn apply_overrides(config: &mut SyncConfig, full: bool, days: Option<u32>) {
    if full {
        config.freshness_days = 0;
    }
    if let Some(days) = days {
        if full && days != 0 {
            warn!(days, "Both --full and --days given, using --days");
        }
        config.freshness_days = days;
    }
}

fn skip_requested() -> Result<bool> {
    match env::var(SKIP_VAR) {
        Ok(value) => Ok(matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )),
        Err(env::VarError::NotPresent) => Ok(false),
        Err(e) => Err(anyhow!("{SKIP_VAR} is not valid unicode: {e}")),
    }
}

fn env_u32(name: &str) -> Result<Option<u32>> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<u32>()
            .map(Some)
            .with_context(|| format!("{name} must be a non-negative integer, got {value:?}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow!("{name} is not valid unicode: {e}")),
    }
}

fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            error!(var = name, "Required environment variable is missing");
            Err(anyhow!("{name} must be set (in the environment or .env)"))
        }
    }
}
