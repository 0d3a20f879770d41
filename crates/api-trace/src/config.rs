//! Trace configuration: classifier lists, timings and session cookie.
//!
//! Every field has a default matching the Notion tracer, so an empty TOML
//! file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{SessionCookie, TraceError, TraceResult};

/// Default output file, overwritten on every run.
pub const DEFAULT_OUTPUT: &str = "notion_api_trace.txt";

/// Settings for one tracing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// URL substring identifying the API under investigation.
    pub api_prefix: String,
    /// Observed but never logged.
    pub silenced: Vec<String>,
    /// Aborted before reaching the network.
    pub blacklisted: Vec<String>,
    /// URLs containing one of these are truncated for display, like `data:` URLs.
    pub long_url_patterns: Vec<String>,
    /// Character budget for truncated URLs.
    pub max_url_len: usize,
    pub output: PathBuf,
    /// Hold after network quiescence to catch late requests.
    pub settle_ms: u64,
    /// How long the network must stay quiet to count as idle.
    pub idle_window_ms: u64,
    /// In-flight requests tolerated while idle.
    pub idle_connections: usize,
    pub navigation_timeout_ms: u64,
    /// Print console summaries for API traffic only.
    pub only_api: bool,
    pub cookie: CookieConfig,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/v3/".to_string(),
            silenced: to_strings(&[
                "/api/v3/ping",
                "/appcache.html",
                "/loading-spinner.svg",
                "/api/v3/getUserAnalyticsSettings",
            ]),
            blacklisted: to_strings(&[
                "amplitude.com/",
                "fullstory.com/",
                "intercom.io/",
                "segment.io/",
                "segment.com/",
                "loggly.com/",
            ]),
            long_url_patterns: Vec::new(),
            max_url_len: 72,
            output: PathBuf::from(DEFAULT_OUTPUT),
            settle_ms: 5_000,
            idle_window_ms: 500,
            idle_connections: 2,
            navigation_timeout_ms: 30_000,
            only_api: false,
            cookie: CookieConfig::default(),
        }
    }
}

impl TraceConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml(content: &str) -> TraceResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> TraceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraceError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Where the session credential comes from and which cookie carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub domain: String,
    pub name: String,
    /// Environment variable holding the cookie value.
    pub env_var: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            domain: "www.notion.so".to_string(),
            name: "token_v2".to_string(),
            env_var: "NOTION_TOKEN".to_string(),
        }
    }
}

impl CookieConfig {
    /// Build the session cookie for a credential value.
    pub fn with_value(&self, value: &str) -> SessionCookie {
        SessionCookie {
            domain: self.domain.clone(),
            name: self.name.clone(),
            value: value.to_string(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
