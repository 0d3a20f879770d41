//! URL classification by substring containment.

use crate::config::TraceConfig;

/// How a URL's traffic is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    /// Third-party tracking: the request is aborted.
    Blacklisted,
    /// Low-value endpoint: observed, never logged.
    Silenced,
    /// Target API traffic: logged with request and response bodies.
    Api,
    /// Everything else: logged as a one-line summary.
    Ordinary,
}

/// Classifies URLs against the configured substring lists.
#[derive(Debug, Clone)]
pub struct Classifier {
    api_prefix: String,
    silenced: Vec<String>,
    blacklisted: Vec<String>,
}

impl Classifier {
    pub fn new(api_prefix: &str, silenced: &[String], blacklisted: &[String]) -> Self {
        Self {
            api_prefix: api_prefix.to_string(),
            silenced: silenced.to_vec(),
            blacklisted: blacklisted.to_vec(),
        }
    }

    pub fn from_config(config: &TraceConfig) -> Self {
        Self::new(&config.api_prefix, &config.silenced, &config.blacklisted)
    }

    /// Classify a full (untruncated) URL.
    ///
    /// Blacklist wins over silencing, which wins over the API match.
    pub fn classify(&self, url: &str) -> UrlClass {
        if contains_any(url, &self.blacklisted) {
            UrlClass::Blacklisted
        } else if contains_any(url, &self.silenced) {
            UrlClass::Silenced
        } else if self.is_api(url) {
            UrlClass::Api
        } else {
            UrlClass::Ordinary
        }
    }

    pub fn is_api(&self, url: &str) -> bool {
        !self.api_prefix.is_empty() && url.contains(&self.api_prefix)
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        contains_any(url, &self.blacklisted)
    }
}

fn contains_any(url: &str, patterns: &[String]) -> bool {
    patterns
        .iter()
        .any(|p| !p.is_empty() && url.contains(p.as_str()))
}
