//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use api_trace::{CookieConfig, TraceConfig};

use crate::cli::TraceArgs;

/// Env var naming a config file.
pub const CONFIG_ENV: &str = "API_TRACE_CONFIG";

/// Config file picked up from the working directory.
pub const LOCAL_CONFIG: &str = "api-trace.toml";

/// Resolve the config file path, if any.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_config_path_in(explicit, std::env::var(CONFIG_ENV).ok(), Path::new("."))
}

fn resolve_config_path_in(
    explicit: Option<&Path>,
    env_path: Option<String>,
    cwd: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(env_path) = env_path.filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(env_path));
    }

    let local = cwd.join(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }

    None
}

/// Load the effective configuration: file (or defaults) plus CLI overrides.
pub fn load_config(args: &TraceArgs) -> Result<TraceConfig> {
    let mut config = match resolve_config_path(args.config.as_deref()) {
        Some(path) => {
            tracing::info!("Config: {}", path.display());
            TraceConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => TraceConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut TraceConfig, args: &TraceArgs) {
    if let Some(output) = &args.output {
        config.output = output.clone();
    }
    if let Some(settle_ms) = args.settle_ms {
        config.settle_ms = settle_ms;
    }
    if args.only_api {
        config.only_api = true;
    }
}

/// Read the session credential from the configured env var.
pub fn credential(cookie: &CookieConfig) -> Option<String> {
    std::env::var(&cookie.env_var)
        .ok()
        .filter(|value| !value.is_empty())
}
