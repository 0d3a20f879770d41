//! Network quiescence: "no more than N requests in flight for a while".

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

use crate::types::RequestId;

/// Roughly thirty years; stands in for deadlines too large for `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + duration`, clamped instead of overflowing.
pub(crate) fn deadline_after(start: Instant, duration: Duration) -> Instant {
    start
        .checked_add(duration)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Tracks in-flight requests and when the network last became quiet.
///
/// Requests are keyed by their network id, so redirect hops count once and
/// completions of requests never seen starting (cache hits, `data:` URLs)
/// change nothing.
#[derive(Debug, Clone)]
pub struct Quiescence {
    in_flight: HashSet<RequestId>,
    max_in_flight: usize,
    window: Duration,
    quiet_since: Option<Instant>,
}

impl Quiescence {
    pub fn new(max_in_flight: usize, window: Duration) -> Self {
        Self {
            in_flight: HashSet::new(),
            max_in_flight,
            window,
            quiet_since: Some(Instant::now()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn request_started(&mut self, id: &RequestId) {
        self.in_flight.insert(id.clone());
        if self.in_flight.len() > self.max_in_flight {
            self.quiet_since = None;
        }
    }

    pub fn request_finished(&mut self, id: &RequestId) {
        if !self.in_flight.remove(id) {
            return;
        }
        if self.in_flight.len() <= self.max_in_flight && self.quiet_since.is_none() {
            self.quiet_since = Some(Instant::now());
        }
    }

    /// Restart the quiet window, e.g. once navigation has returned.
    pub fn reset_window(&mut self) {
        if self.quiet_since.is_some() {
            self.quiet_since = Some(Instant::now());
        }
    }

    /// When the network will count as idle if nothing else starts.
    pub fn idle_at(&self) -> Option<Instant> {
        self.quiet_since.map(|since| deadline_after(since, self.window))
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.idle_at().is_some_and(|at| now >= at)
    }
}
