//! Chromium-based browser using chromiumoxide.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use api_trace::{
    Browser, BrowserPage, FailedRequest, InterceptedRequest, NetworkEvent, ObservedResponse,
    RequestDecision, RequestId, SessionCookie, TraceError, TraceResult,
};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, CookieParam, ErrorReason, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, GetRequestPostDataParams,
    GetResponseBodyParams, SetCookiesParams,
};
use chromiumoxide::page::Page;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;

/// Env var pointing at a Chromium/Chrome binary.
pub const CHROMIUM_PATH_ENV: &str = "API_TRACE_CHROMIUM_PATH";

/// Find the Chromium binary path.
///
/// Returns `None` when nothing is found; chromiumoxide then falls back to its
/// own detection.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("{CHROMIUM_PATH_ENV} points at missing file {p}");
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

fn cdp_err(e: impl std::fmt::Display) -> TraceError {
    TraceError::Browser(e.to_string())
}

/// A headless Chromium instance.
pub struct ChromiumBrowser {
    browser: CdpBrowser,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launch headless Chromium.
    pub async fn launch() -> TraceResult<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if let Some(path) = find_chromium() {
            tracing::debug!(path = %path.display(), "using chromium");
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| TraceError::Browser(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| TraceError::Browser(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("cdp handler: {e}");
                }
            }
        });

        Ok(Self { browser, handler })
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&mut self) -> TraceResult<Box<dyn BrowserPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| TraceError::Browser(format!("failed to create new page: {e}")))?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&mut self) -> TraceResult<()> {
        self.browser.close().await.map_err(cdp_err)?;
        let _ = self.browser.wait().await;
        self.handler.abort();
        Ok(())
    }
}

/// A single Chromium tab.
pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn set_cookie(&self, cookie: &SessionCookie) -> TraceResult<()> {
        let param = CookieParam::builder()
            .name(cookie.name.as_str())
            .value(cookie.value.as_str())
            .domain(cookie.domain.as_str())
            .build()
            .map_err(TraceError::Browser)?;
        self.page
            .execute(SetCookiesParams::new(vec![param]))
            .await
            .map_err(cdp_err)?;
        Ok(())
    }

    async fn subscribe(&self) -> TraceResult<BoxStream<'static, NetworkEvent>> {
        // Listeners go first so nothing between enabling and listening is lost.
        let paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(cdp_err)?;
        let sent = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(cdp_err)?;
        let received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(cdp_err)?;
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(cdp_err)?;
        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(cdp_err)?;

        self.page
            .execute(network::EnableParams::default())
            .await
            .map_err(cdp_err)?;
        let intercept_all = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        self.page
            .execute(fetch::EnableParams::builder().pattern(intercept_all).build())
            .await
            .map_err(cdp_err)?;

        let raw = stream::select_all(vec![
            paused.map(RawEvent::Paused).boxed(),
            sent.map(RawEvent::Sent).boxed(),
            received.map(RawEvent::Received).boxed(),
            finished.map(RawEvent::Finished).boxed(),
            failed.map(RawEvent::Failed).boxed(),
        ]);

        Ok(raw
            .scan(Correlator::default(), |correlator, event| {
                futures::future::ready(Some(correlator.on_event(event)))
            })
            .filter_map(futures::future::ready)
            .boxed())
    }

    async fn resolve(&self, id: &RequestId, decision: RequestDecision) -> TraceResult<()> {
        let request_id = fetch::RequestId::new(id.as_str());
        match decision {
            RequestDecision::Continue => {
                self.page
                    .execute(ContinueRequestParams::new(request_id))
                    .await
                    .map_err(cdp_err)?;
            }
            RequestDecision::Abort => {
                self.page
                    .execute(FailRequestParams::new(request_id, ErrorReason::BlockedByClient))
                    .await
                    .map_err(cdp_err)?;
            }
        }
        Ok(())
    }

    async fn response_body(&self, id: &RequestId) -> TraceResult<String> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(network::RequestId::new(id.as_str())))
            .await
            .map_err(cdp_err)?;
        decode_body(&response.result.body, response.result.base64_encoded)
    }

    async fn request_body(&self, id: &RequestId) -> TraceResult<String> {
        let response = self
            .page
            .execute(GetRequestPostDataParams::new(network::RequestId::new(id.as_str())))
            .await
            .map_err(cdp_err)?;
        Ok(response.result.post_data)
    }

    async fn navigate(&self, url: &str) -> TraceResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| TraceError::Navigation(e.to_string()))?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }
}

fn decode_base64(data: &str) -> TraceResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| TraceError::Browser(format!("invalid base64 body: {e}")))
}

fn decode_body(body: &str, base64_encoded: bool) -> TraceResult<String> {
    if !base64_encoded {
        return Ok(body.to_string());
    }
    Ok(String::from_utf8_lossy(&decode_base64(body)?).into_owned())
}

/// The request body carried inline with the request, if any.
///
/// Chromium splits bodies into base64 entries and leaves them out entirely
/// when they are large; `has_post_data` still reports those.
fn inline_post_data(request: &network::Request) -> Option<String> {
    let entries = request.post_data_entries.as_ref()?;
    let mut bytes = Vec::new();
    for entry in entries.iter().filter_map(|e| e.bytes.as_ref()) {
        match decode_base64(AsRef::<str>::as_ref(entry)) {
            Ok(part) => bytes.extend(part),
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "undecodable post data");
                return None;
            }
        }
    }
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn status_code(status: i64) -> u16 {
    u16::try_from(status).unwrap_or(0)
}

enum RawEvent {
    Paused(Arc<EventRequestPaused>),
    Sent(Arc<EventRequestWillBeSent>),
    Received(Arc<EventResponseReceived>),
    Finished(Arc<EventLoadingFinished>),
    Failed(Arc<EventLoadingFailed>),
}

struct PendingRequest {
    method: String,
    url: String,
    post_data: Option<String>,
    post_data_omitted: bool,
    status: Option<u16>,
}

impl PendingRequest {
    fn new(request: &network::Request) -> Self {
        let post_data = inline_post_data(request);
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            post_data_omitted: post_data.is_none() && request.has_post_data == Some(true),
            post_data,
            status: None,
        }
    }

    fn into_observed(self, id: String, url: String, status: u16) -> ObservedResponse {
        ObservedResponse {
            id: RequestId::new(id),
            method: self.method,
            url,
            status,
            request_body: self.post_data,
            request_body_omitted: self.post_data_omitted,
        }
    }
}

/// Joins Fetch and Network events into [`NetworkEvent`]s keyed by network id.
///
/// Emits one `Request` per paused hop, one `Redirect` per 3xx hop and a
/// single `Response` or `RequestFailed` when the request ends.
#[derive(Default)]
struct Correlator {
    requests: HashMap<String, PendingRequest>,
}

impl Correlator {
    fn on_event(&mut self, event: RawEvent) -> Option<NetworkEvent> {
        match event {
            RawEvent::Paused(ev) => {
                let network_id = ev
                    .network_id
                    .as_ref()
                    .map(|id| id.inner().clone())
                    .unwrap_or_else(|| ev.request_id.inner().clone());
                self.requests
                    .entry(network_id.clone())
                    .or_insert_with(|| PendingRequest::new(&ev.request));
                Some(NetworkEvent::Request(InterceptedRequest {
                    id: RequestId::new(ev.request_id.inner().clone()),
                    network_id: RequestId::new(network_id),
                    method: ev.request.method.clone(),
                    url: ev.request.url.clone(),
                }))
            }
            RawEvent::Sent(ev) => {
                // Redirect hops reuse the id; the latest hop wins.
                let id = ev.request_id.inner().clone();
                let previous = self.requests.insert(id.clone(), PendingRequest::new(&ev.request));
                let redirect = ev.redirect_response.as_ref()?;
                let hop = previous.unwrap_or_else(|| PendingRequest::new(&ev.request));
                Some(NetworkEvent::Redirect(hop.into_observed(
                    id,
                    redirect.url.clone(),
                    status_code(redirect.status),
                )))
            }
            RawEvent::Received(ev) => {
                if let Some(pending) = self.requests.get_mut(ev.request_id.inner()) {
                    pending.status = Some(status_code(ev.response.status));
                }
                None
            }
            RawEvent::Finished(ev) => {
                let id = ev.request_id.inner().clone();
                let pending = self.requests.remove(&id)?;
                let url = pending.url.clone();
                let status = pending.status.unwrap_or(0);
                Some(NetworkEvent::Response(pending.into_observed(id, url, status)))
            }
            RawEvent::Failed(ev) => {
                let id = ev.request_id.inner().clone();
                let pending = self.requests.remove(&id)?;
                Some(NetworkEvent::RequestFailed(FailedRequest {
                    id: RequestId::new(id),
                    url: pending.url,
                    reason: ev.error_text.clone(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_trace::Quiescence;
    use serde_json::{json, Value};
    use std::time::Duration;

    const PAGE: &str = "https://www.notion.so/Test-4c6a";

    fn request_json(method: &str, url: &str, post: Option<&str>) -> Value {
        let mut request = json!({
            "url": url,
            "method": method,
            "headers": {},
            "initialPriority": "High",
            "referrerPolicy": "strict-origin-when-cross-origin",
        });
        if let Some(body) = post {
            let half = body.len() / 2;
            let engine = base64::engine::general_purpose::STANDARD;
            request["hasPostData"] = json!(true);
            request["postDataEntries"] = json!([
                { "bytes": engine.encode(&body[..half]) },
                { "bytes": engine.encode(&body[half..]) },
            ]);
        }
        request
    }

    fn response_json(url: &str, status: i64) -> Value {
        json!({
            "url": url,
            "status": status,
            "statusText": "",
            "headers": {},
            "mimeType": "application/json",
            "charset": "utf-8",
            "connectionReused": false,
            "connectionId": 1.0,
            "encodedDataLength": 0.0,
            "securityState": "secure",
        })
    }

    fn paused(fetch_id: &str, network_id: &str, method: &str, url: &str) -> RawEvent {
        let ev = json!({
            "requestId": fetch_id,
            "request": request_json(method, url, None),
            "frameId": "F1",
            "resourceType": "XHR",
            "networkId": network_id,
        });
        RawEvent::Paused(Arc::new(serde_json::from_value(ev).unwrap()))
    }

    fn sent(id: &str, request: Value, redirect: Option<(&str, i64)>) -> RawEvent {
        let mut ev = json!({
            "requestId": id,
            "loaderId": "L1",
            "documentURL": PAGE,
            "request": request,
            "timestamp": 1.0,
            "wallTime": 1.0,
            "initiator": { "type": "other" },
            "redirectHasExtraInfo": false,
        });
        if let Some((url, status)) = redirect {
            ev["redirectResponse"] = response_json(url, status);
        }
        RawEvent::Sent(Arc::new(serde_json::from_value(ev).unwrap()))
    }

    fn received(id: &str, url: &str, status: i64) -> RawEvent {
        let ev = json!({
            "requestId": id,
            "loaderId": "L1",
            "timestamp": 2.0,
            "type": "XHR",
            "response": response_json(url, status),
            "hasExtraInfo": false,
        });
        RawEvent::Received(Arc::new(serde_json::from_value(ev).unwrap()))
    }

    fn finished(id: &str) -> RawEvent {
        let ev = json!({ "requestId": id, "timestamp": 3.0, "encodedDataLength": 10.0 });
        RawEvent::Finished(Arc::new(serde_json::from_value(ev).unwrap()))
    }

    fn failed(id: &str, error: &str) -> RawEvent {
        let ev = json!({
            "requestId": id,
            "timestamp": 3.0,
            "type": "Script",
            "errorText": error,
        });
        RawEvent::Failed(Arc::new(serde_json::from_value(ev).unwrap()))
    }

    fn feed(events: Vec<RawEvent>) -> Vec<NetworkEvent> {
        let mut correlator = Correlator::default();
        events
            .into_iter()
            .filter_map(|event| correlator.on_event(event))
            .collect()
    }

    #[test]
    fn test_correlates_post_exchange() {
        let url = "https://www.notion.so/api/v3/loadPageChunk";
        let body = r#"{"pageId":"4c6a","limit":50}"#;
        let events = feed(vec![
            sent("N1", request_json("POST", url, Some(body)), None),
            paused("F1", "N1", "POST", url),
            received("N1", url, 200),
            finished("N1"),
        ]);

        assert_eq!(events.len(), 2);
        match &events[0] {
            NetworkEvent::Request(req) => {
                assert_eq!(req.id.as_str(), "F1");
                assert_eq!(req.network_id.as_str(), "N1");
                assert_eq!(req.method, "POST");
            }
            other => panic!("expected request, got {other:?}"),
        }
        match &events[1] {
            NetworkEvent::Response(resp) => {
                assert_eq!(resp.id.as_str(), "N1");
                assert_eq!(resp.url, url);
                assert_eq!(resp.status, 200);
                assert_eq!(resp.request_body.as_deref(), Some(body));
                assert!(!resp.request_body_omitted);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_large_post_body_is_marked_omitted() {
        let url = "https://www.notion.so/api/v3/submitTransaction";
        let mut request = request_json("POST", url, None);
        request["hasPostData"] = json!(true);
        let events = feed(vec![
            sent("N1", request, None),
            received("N1", url, 200),
            finished("N1"),
        ]);

        match &events[0] {
            NetworkEvent::Response(resp) => {
                assert_eq!(resp.request_body, None);
                assert!(resp.request_body_omitted);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_redirect_chain_counts_as_one_request() {
        let events = feed(vec![
            sent("N1", request_json("GET", "https://notion.so/a", None), None),
            paused("F1", "N1", "GET", "https://notion.so/a"),
            sent(
                "N1",
                request_json("GET", "https://www.notion.so/a", None),
                Some(("https://notion.so/a", 301)),
            ),
            paused("F2", "N1", "GET", "https://www.notion.so/a"),
            sent(
                "N1",
                request_json("GET", "https://www.notion.so/login", None),
                Some(("https://www.notion.so/a", 302)),
            ),
            paused("F3", "N1", "GET", "https://www.notion.so/login"),
            received("N1", "https://www.notion.so/login", 200),
            finished("N1"),
        ]);

        let redirects: Vec<(String, u16)> = events
            .iter()
            .filter_map(|e| match e {
                NetworkEvent::Redirect(r) => Some((r.url.clone(), r.status)),
                _ => None,
            })
            .collect();
        assert_eq!(
            redirects,
            vec![
                ("https://notion.so/a".to_string(), 301),
                ("https://www.notion.so/a".to_string(), 302),
            ]
        );
        match events.last() {
            Some(NetworkEvent::Response(resp)) => {
                assert_eq!(resp.url, "https://www.notion.so/login");
                assert_eq!(resp.status, 200);
            }
            other => panic!("expected final response, got {other:?}"),
        }

        let mut quiet = Quiescence::new(2, Duration::from_millis(500));
        for event in &events {
            match event {
                NetworkEvent::Request(req) => quiet.request_started(&req.network_id),
                NetworkEvent::Response(resp) => quiet.request_finished(&resp.id),
                _ => {}
            }
        }
        assert_eq!(quiet.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaused_response_does_not_finish_other_requests() {
        let events = feed(vec![
            sent("N1", request_json("GET", "https://www.notion.so/app.js", None), None),
            paused("F1", "N1", "GET", "https://www.notion.so/app.js"),
            sent("N2", request_json("GET", "data:image/png;base64,AAAA", None), None),
            received("N2", "data:image/png;base64,AAAA", 200),
            finished("N2"),
        ]);

        let mut quiet = Quiescence::new(0, Duration::from_millis(500));
        for event in &events {
            match event {
                NetworkEvent::Request(req) => quiet.request_started(&req.network_id),
                NetworkEvent::Response(resp) => quiet.request_finished(&resp.id),
                _ => {}
            }
        }
        assert!(matches!(&events[1], NetworkEvent::Response(r) if r.id.as_str() == "N2"));
        assert_eq!(quiet.in_flight(), 1);
    }

    #[test]
    fn test_failed_request_after_abort() {
        let url = "https://api.amplitude.com/2/httpapi";
        let events = feed(vec![
            paused("F1", "N1", "POST", url),
            failed("N1", "net::ERR_BLOCKED_BY_CLIENT"),
        ]);

        match &events[1] {
            NetworkEvent::RequestFailed(f) => {
                assert_eq!(f.id.as_str(), "N1");
                assert_eq!(f.url, url);
                assert_eq!(f.reason, "net::ERR_BLOCKED_BY_CLIENT");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_events_for_unknown_ids_are_ignored() {
        let events = feed(vec![
            received("N9", PAGE, 200),
            finished("N9"),
            failed("N9", "net::ERR_FAILED"),
        ]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_decode_plain_body() {
        assert_eq!(decode_body("{\"a\":1}", false).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_decode_base64_body() {
        assert_eq!(decode_body("eyJhIjoxfQ==", true).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_decode_invalid_base64() {
        assert!(decode_body("not base64!!", true).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_trace_data_url() {
        let mut browser = ChromiumBrowser::launch()
            .await
            .expect("failed to launch browser");
        let page = browser.new_page().await.expect("failed to create page");
        let mut events = page.subscribe().await.expect("subscribe failed");

        {
            let nav = page.navigate("data:text/html,<h1>Hello</h1>");
            tokio::pin!(nav);
            loop {
                tokio::select! {
                    result = &mut nav => {
                        result.expect("navigation failed");
                        break;
                    }
                    Some(event) = events.next() => {
                        if let NetworkEvent::Request(req) = event {
                            page.resolve(&req.id, RequestDecision::Continue)
                                .await
                                .expect("resolve failed");
                        }
                    }
                }
            }
        }

        drop(page);
        browser.close().await.expect("close failed");
    }
}
