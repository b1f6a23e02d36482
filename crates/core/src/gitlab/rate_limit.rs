//! Fixed-interval request gate owned by a [`GitLabClient`](super::GitLabClient).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::errors::GitLabError;

/// Default spacing between outbound requests (~10 requests/second).
pub const DEFAULT_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest accepted period; tokio intervals reject zero.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1);

enum TickerState {
    /// Not used yet; the interval is created on first acquire so the limiter
    /// can be built outside a runtime.
    Idle,
    Running(Interval),
    Stopped,
}

/// Ticking rate limiter: each request waits for the next tick.
///
/// The ticker lives until [`stop`](Self::stop) is called or the limiter is
/// dropped. Sequential reuse across many calls is safe; concurrent callers
/// queue on the internal lock and are released one tick apart.
pub struct RateLimiter {
    period: Duration,
    state: Mutex<TickerState>,
    /// Set before `state` becomes `Stopped`, so [`is_stopped`](Self::is_stopped)
    /// can answer without taking the async lock.
    stopped: AtomicBool,
}

impl RateLimiter {
    /// `period` is raised to [`MIN_REQUEST_INTERVAL`] if shorter.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_REQUEST_INTERVAL),
            state: Mutex::new(TickerState::Idle),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Wait for the next tick, or fail as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancelSignal) -> Result<(), GitLabError> {
        if cancel.is_triggered() {
            return Err(GitLabError::Cancelled);
        }

        let mut state = tokio::select! {
            guard = self.state.lock() => guard,
            _ = cancel.triggered() => return Err(GitLabError::Cancelled),
        };

        if matches!(*state, TickerState::Idle) {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(period_ms = self.period.as_millis() as u64, "started rate limiter");
            *state = TickerState::Running(ticker);
        }

        let ticker = match &mut *state {
            TickerState::Running(ticker) => ticker,
            _ => return Err(GitLabError::ClientClosed),
        };

        tokio::select! {
            _ = ticker.tick() => Ok(()),
            _ = cancel.triggered() => Err(GitLabError::Cancelled),
        }
    }

    /// Stop the ticker. Every later [`acquire`](Self::acquire) fails with
    /// [`GitLabError::ClientClosed`].
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        *state = TickerState::Stopped;
        debug!("stopped rate limiter");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
