//! Run driver: opens a page, observes its traffic until the network settles,
//! and hands back the accumulated trace log.

use std::io::Write;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::time::{sleep_until, Instant};

use crate::browser::{Browser, BrowserPage};
use crate::config::TraceConfig;
use crate::quiescence::{deadline_after, Quiescence};
use crate::recorder::ResponseRecorder;
use crate::trace_log::TraceLog;
use crate::types::{
    NetworkEvent, ObservedResponse, RequestDecision, TraceError, TraceResult,
};

type BodyRead<'a> = BoxFuture<'a, (ObservedResponse, TraceResult<String>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Navigating,
    AwaitingIdle,
    Settling(Instant),
}

/// Drives one tracing run against a [`Browser`].
pub struct Tracer {
    config: TraceConfig,
    recorder: ResponseRecorder,
}

impl Tracer {
    pub fn new(config: TraceConfig) -> Self {
        let recorder = ResponseRecorder::new(&config);
        Self { config, recorder }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Trace `url` and return the log. Human-readable progress goes to
    /// `console`.
    ///
    /// The browser is closed before returning, also when navigation fails.
    pub async fn run<W: Write>(
        &self,
        browser: &mut dyn Browser,
        url: &str,
        credential: Option<&str>,
        console: &mut W,
    ) -> TraceResult<TraceLog> {
        let mut log = TraceLog::new();

        let traced = match browser.new_page().await {
            Ok(page) => {
                self.trace_page(page.as_ref(), url, credential, &mut log, console)
                    .await
            }
            Err(e) => Err(e),
        };

        let closed = browser.close().await;
        traced?;
        closed?;

        tracing::info!(
            records = log.len(),
            api_records = log.api_count(),
            "trace complete"
        );
        Ok(log)
    }

    async fn trace_page<W: Write>(
        &self,
        page: &dyn BrowserPage,
        url: &str,
        credential: Option<&str>,
        log: &mut TraceLog,
        console: &mut W,
    ) -> TraceResult<()> {
        self.attach_credential(page, credential, console).await?;

        let mut events = page.subscribe().await?;
        let mut events_open = true;
        let mut pending: FuturesUnordered<BodyRead<'_>> = FuturesUnordered::new();
        let mut quiet = Quiescence::new(self.config.idle_connections, self.config.idle_window());
        let deadline = deadline_after(Instant::now(), self.config.navigation_timeout());
        let mut phase = Phase::Navigating;

        tracing::info!(url, "navigating");
        let navigation = page.navigate(url);
        tokio::pin!(navigation);

        loop {
            let wake = match phase {
                Phase::Navigating => deadline,
                Phase::AwaitingIdle => quiet.idle_at().map_or(deadline, |at| at.min(deadline)),
                Phase::Settling(until) => until,
            };

            tokio::select! {
                result = &mut navigation, if phase == Phase::Navigating => {
                    result.map_err(|e| match e {
                        TraceError::Navigation(_) => e,
                        other => TraceError::Navigation(other.to_string()),
                    })?;
                    tracing::debug!(in_flight = quiet.in_flight(), "page loaded");
                    quiet.reset_window();
                    phase = Phase::AwaitingIdle;
                }
                event = events.next(), if events_open => match event {
                    Some(event) => {
                        self.handle_event(page, event, &mut quiet, &mut pending, console)
                            .await?;
                    }
                    None => {
                        tracing::debug!("network event stream ended");
                        events_open = false;
                    }
                },
                Some((response, body)) = pending.next(), if !pending.is_empty() => {
                    if let Some(line) = self.recorder.record(&response, body, log) {
                        writeln!(console, "{line}")?;
                    }
                }
                _ = sleep_until(wake) => match phase {
                    Phase::Navigating => {
                        return Err(TraceError::NavigationTimeout(self.config.navigation_timeout_ms));
                    }
                    Phase::AwaitingIdle => {
                        let now = Instant::now();
                        if quiet.is_idle(now) {
                            tracing::debug!(settle_ms = self.config.settle_ms, "network idle");
                            phase = Phase::Settling(deadline_after(now, self.config.settle()));
                        } else if now >= deadline {
                            return Err(TraceError::NavigationTimeout(self.config.navigation_timeout_ms));
                        }
                    }
                    Phase::Settling(_) => break,
                },
            }
        }

        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "dropping unfinished body reads");
        }
        Ok(())
    }

    async fn attach_credential<W: Write>(
        &self,
        page: &dyn BrowserPage,
        credential: Option<&str>,
        console: &mut W,
    ) -> TraceResult<()> {
        let env_var = &self.config.cookie.env_var;
        match credential.filter(|value| !value.is_empty()) {
            Some(value) => {
                writeln!(console, "{env_var} set, can access private pages")?;
                page.set_cookie(&self.config.cookie.with_value(value)).await?;
            }
            None => {
                writeln!(console, "only public pages, {env_var} env var not set")?;
            }
        }
        Ok(())
    }

    async fn handle_event<'a, W: Write>(
        &self,
        page: &'a dyn BrowserPage,
        event: NetworkEvent,
        quiet: &mut Quiescence,
        pending: &mut FuturesUnordered<BodyRead<'a>>,
        console: &mut W,
    ) -> TraceResult<()> {
        match event {
            NetworkEvent::Request(request) => {
                quiet.request_started(&request.network_id);
                let decision = if self.recorder.classifier().is_blacklisted(&request.url) {
                    tracing::debug!(url = %request.url, "aborting blacklisted request");
                    RequestDecision::Abort
                } else {
                    RequestDecision::Continue
                };
                if let Err(e) = page.resolve(&request.id, decision).await {
                    tracing::warn!(url = %request.url, error = %e, "failed to resolve intercepted request");
                }
            }
            NetworkEvent::Response(response) => {
                quiet.request_finished(&response.id);
                if self.recorder.wants(&response) {
                    pending.push(read_bodies(page, response).boxed());
                }
            }
            NetworkEvent::Redirect(response) => {
                if let Some(line) = self.recorder.redirect(&response) {
                    writeln!(console, "{line}")?;
                }
            }
            NetworkEvent::RequestFailed(failed) => {
                quiet.request_finished(&failed.id);
                if !self.recorder.classifier().is_blacklisted(&failed.url) {
                    tracing::debug!(url = %failed.url, reason = %failed.reason, "request failed");
                    writeln!(console, "request failed url: {}", failed.url)?;
                }
            }
        }
        Ok(())
    }
}

async fn read_bodies(
    page: &dyn BrowserPage,
    mut response: ObservedResponse,
) -> (ObservedResponse, TraceResult<String>) {
    let body = page.response_body(&response.id).await;
    if response.request_body.is_none() && response.request_body_omitted {
        match page.request_body(&response.id).await {
            Ok(request_body) => response.request_body = Some(request_body),
            Err(e) => {
                tracing::debug!(url = %response.url, error = %e, "request body unavailable");
            }
        }
    }
    (response, body)
}
