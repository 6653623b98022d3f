use std::time::Duration;

use tokio::time::Instant;

/// How long the actor sleeps when nothing is pending.
const IDLE_SLEEP: Duration = Duration::from_secs(86400);

/// Pure debouncer: trailing-edge timing only, no knowledge of renders.
///
/// Uses `tokio::time::Instant` so the session can be tested on a paused
/// clock.
pub(super) struct Debouncer {
    quiet: Duration,
    enabled: bool,
    /// At most one trigger is ever outstanding.
    pending: bool,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(quiet: Duration, enabled: bool) -> Self {
        Self {
            quiet,
            enabled,
            pending: false,
            last_event: None,
        }
    }

    /// Record an input change; restarts the quiet interval. No-op while
    /// disabled.
    pub(super) fn notify(&mut self) {
        if !self.enabled {
            return;
        }
        self.pending = true;
        self.last_event = Some(Instant::now());
    }

    /// Disabling drops a pending trigger.
    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
    }

    pub(super) const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(super) const fn is_pending(&self) -> bool {
        self.pending
    }

    pub(super) fn clear(&mut self) {
        self.pending = false;
        self.last_event = None;
    }

    pub(super) fn is_ready(&self) -> bool {
        match self.last_event {
            Some(last_event) => self.pending && last_event.elapsed() >= self.quiet,
            None => false,
        }
    }

    /// Consume the pending trigger if the quiet interval has elapsed.
    pub(super) fn take_if_ready(&mut self) -> bool {
        if !self.is_ready() {
            return false;
        }
        self.clear();
        true
    }

    /// Precise sleep duration until the pending trigger could fire.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return IDLE_SLEEP;
        };
        self.quiet
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}
