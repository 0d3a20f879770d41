//! Browser automation capability.
//!
//! Defines the `Browser` and `BrowserPage` traits the tracer drives. The
//! Chromium implementation lives in the CLI crate; tests use scripted fakes.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::{
    NetworkEvent, RequestDecision, RequestId, SessionCookie, TraceError, TraceResult,
};

/// A browser engine that can open pages.
#[async_trait]
pub trait Browser: Send {
    /// Open a new page (tab).
    async fn new_page(&mut self) -> TraceResult<Box<dyn BrowserPage>>;
    /// Shut the browser down. Pending page operations fail afterwards.
    async fn close(&mut self) -> TraceResult<()>;
}

/// A single page whose network traffic can be observed and intercepted.
///
/// All methods take `&self` so navigation, request resolution and body reads
/// can be in flight at the same time.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Add a cookie to the page's browser context.
    async fn set_cookie(&self, cookie: &SessionCookie) -> TraceResult<()>;

    /// Enable request interception and return the page's network events.
    ///
    /// Every [`NetworkEvent::Request`] must be answered with [`Self::resolve`]
    /// or the request stalls.
    async fn subscribe(&self) -> TraceResult<BoxStream<'static, NetworkEvent>>;

    /// Continue or abort an intercepted request.
    async fn resolve(&self, id: &RequestId, decision: RequestDecision) -> TraceResult<()>;

    /// Read a finished response's body as text.
    async fn response_body(&self, id: &RequestId) -> TraceResult<String>;

    /// Fetch a request body that was too large to arrive with the request.
    async fn request_body(&self, id: &RequestId) -> TraceResult<String> {
        Err(TraceError::Browser(format!("no request body for {id}")))
    }

    /// Navigate and wait for the load event.
    async fn navigate(&self, url: &str) -> TraceResult<()>;
}
