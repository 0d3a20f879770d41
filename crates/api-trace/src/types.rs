//! Core data types shared by the tracer and browser backends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier a browser backend assigns to one network request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cookie attached to the browser session before navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
}

/// A request paused by interception, waiting for a [`RequestDecision`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptedRequest {
    /// Handle for [`crate::BrowserPage::resolve`].
    pub id: RequestId,
    /// Id that later events for the same request carry. Every redirect hop
    /// of one request shares it.
    pub network_id: RequestId,
    pub method: String,
    pub url: String,
}

/// What to do with an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestDecision {
    /// Let the request reach the network.
    Continue,
    /// Fail the request before it leaves the browser.
    Abort,
}

/// A response whose body has finished loading.
///
/// Carries the originating request's method and body so handlers never need
/// to correlate events themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedResponse {
    pub id: RequestId,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub request_body: Option<String>,
    /// The request had a body the backend did not deliver inline; fetch it
    /// with [`crate::BrowserPage::request_body`].
    #[serde(default)]
    pub request_body_omitted: bool,
}

/// A request that never produced a usable response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRequest {
    pub id: RequestId,
    pub url: String,
    pub reason: String,
}

/// Network activity delivered by a [`crate::BrowserPage`] subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkEvent {
    Request(InterceptedRequest),
    Response(ObservedResponse),
    /// A 3xx hop. The request continues under the same id and has no body.
    Redirect(ObservedResponse),
    RequestFailed(FailedRequest),
}

/// Errors that can occur while tracing a page.
#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Network did not go idle within {0}ms")]
    NavigationTimeout(u64),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for TraceError {
    fn from(e: toml::de::Error) -> Self {
        TraceError::Config(e.to_string())
    }
}

/// Convenience result type.
pub type TraceResult<T> = Result<T, TraceError>;
