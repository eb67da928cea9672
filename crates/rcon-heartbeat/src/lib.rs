//! Keep-alive scheduler for the RCON client.
//!
//! Squad servers drop RCON connections that stay silent for too long, so
//! an authenticated connection sends an empty keep-alive command every
//! `interval`. The server's echo is recognised and discarded by the
//! correlator; this crate only decides *when* to send.
//!
//! # Lifecycle
//!
//! A [`Heartbeat`] starts paused. The supervisor resumes it once the
//! connection is authenticated and pauses it again on disconnect, so no
//! keep-alive is ever written to a socket that isn't ready.
//!
//! An interval of zero disables the heartbeat entirely:
//! [`Heartbeat::wait_for_beat`] then pends forever.
//!
//! # Integration
//!
//! The heartbeat is one branch of the supervisor's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => { /* execute */ }
//!         _ = heartbeat.wait_for_beat() => {
//!             send_keep_alive().await;
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the keep-alive scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Time between keep-alives. `Duration::ZERO` disables them.
    pub interval: Duration,
}

impl HeartbeatConfig {
    /// The interval used when none is configured: two minutes.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

    /// A config with the given interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// A config that never beats.
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Beat info (returned to caller each beat)
// ---------------------------------------------------------------------------

/// Information about a beat, returned by [`Heartbeat::wait_for_beat`].
#[derive(Debug, Clone, Copy)]
pub struct BeatInfo {
    /// Beat number since the heartbeat was created (starts at 1).
    pub beat: u64,
    /// How far past its scheduled time this beat fired.
    pub late_by: Duration,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval keep-alive scheduler. One per client.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Option<Duration>,
    beat_count: u64,
    /// When the next beat is due. `None` while paused or disabled.
    next_beat: Option<Instant>,
    paused: bool,
}

impl Heartbeat {
    /// Creates a paused heartbeat.
    pub fn new(config: HeartbeatConfig) -> Self {
        let interval = (!config.interval.is_zero()).then_some(config.interval);
        match interval {
            Some(interval) => debug!(?interval, "heartbeat created"),
            None => debug!("heartbeat disabled"),
        }
        Self {
            interval,
            beat_count: 0,
            next_beat: None,
            paused: true,
        }
    }

    /// Waits until the next keep-alive is due.
    ///
    /// While paused or disabled this future pends forever; inside
    /// `tokio::select!` the other branches keep running. Cancel safe: the
    /// schedule only advances once the beat has fired.
    pub async fn wait_for_beat(&mut self) -> BeatInfo {
        let (next, interval) = match (self.next_beat, self.interval) {
            (Some(next), Some(interval)) if !self.paused => (next, interval),
            _ => return std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.beat_count += 1;
        let late_by = now.saturating_duration_since(next);
        if late_by > interval / 10 {
            warn!(
                beat = self.beat_count,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "keep-alive fired late"
            );
        }

        // Schedule from now, not from the missed deadline.
        self.next_beat = Some(now + interval);
        trace!(beat = self.beat_count, "heartbeat");

        BeatInfo {
            beat: self.beat_count,
            late_by,
        }
    }

    /// Stops beating until [`resume`](Self::resume) is called. Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.next_beat = None;
            debug!(beat = self.beat_count, "heartbeat paused");
        }
    }

    /// Starts beating again; the first beat is one full interval from now.
    /// Idempotent.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_beat = self.interval.map(|interval| Instant::now() + interval);
            debug!(beat = self.beat_count, "heartbeat resumed");
        }
    }

    /// Whether the heartbeat is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether keep-alives are enabled at all.
    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Beats fired so far.
    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    /// The configured interval, or `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}
