//! Lock-free server counters.
//!
//! Connection tasks update these with relaxed atomics while a level may be
//! locked, so nothing here allocates or blocks. The dashboard reads them at
//! its own pace.

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

use bricklayer_engine::sync::EditOutcome;
use serde::Serialize;

pub struct Metrics {
    // Monotonic counters
    edits_applied: AtomicU64,
    edits_unchanged: AtomicU64,
    edits_rejected: AtomicU64,
    edit_ns_sum: AtomicU64,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    chat_messages: AtomicU64,
    disconnects: AtomicU64,

    // Latency histogram buckets (authority edit duration)
    hist_under_1us: AtomicU64,
    hist_1_10us: AtomicU64,
    hist_10_100us: AtomicU64,
    hist_100us_1ms: AtomicU64,
    hist_over_1ms: AtomicU64,

    // Gauges
    players_connected: AtomicU64,

    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            edits_applied: AtomicU64::new(0),
            edits_unchanged: AtomicU64::new(0),
            edits_rejected: AtomicU64::new(0),
            edit_ns_sum: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            chat_messages: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            hist_under_1us: AtomicU64::new(0),
            hist_1_10us: AtomicU64::new(0),
            hist_10_100us: AtomicU64::new(0),
            hist_100us_1ms: AtomicU64::new(0),
            hist_over_1ms: AtomicU64::new(0),
            players_connected: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Called once per client edit the authority accepted for processing.
    pub fn record_edit(&self, outcome: &EditOutcome, duration: Duration) {
        match outcome {
            EditOutcome::Applied(_) => self.edits_applied.fetch_add(1, Relaxed),
            EditOutcome::Unchanged => self.edits_unchanged.fetch_add(1, Relaxed),
            EditOutcome::Rejected => self.edits_rejected.fetch_add(1, Relaxed),
        };
        self.edit_ns_sum.fetch_add(duration.as_nanos() as u64, Relaxed);

        let us = duration.as_micros() as u64;
        match us {
            0 => {
                self.hist_under_1us.fetch_add(1, Relaxed);
            }
            1..=9 => {
                self.hist_1_10us.fetch_add(1, Relaxed);
            }
            10..=99 => {
                self.hist_10_100us.fetch_add(1, Relaxed);
            }
            100..=999 => {
                self.hist_100us_1ms.fetch_add(1, Relaxed);
            }
            _ => {
                self.hist_over_1ms.fetch_add(1, Relaxed);
            }
        }
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Relaxed);
    }

    /// A message addressed to a session whose writer has already gone.
    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Relaxed);
    }

    pub fn chat(&self) {
        self.chat_messages.fetch_add(1, Relaxed);
    }

    /// A peer was sent `Disconnect` for misbehaving.
    pub fn disconnected(&self) {
        self.disconnects.fetch_add(1, Relaxed);
    }

    pub fn player_joined(&self) {
        self.players_connected.fetch_add(1, Relaxed);
    }

    pub fn player_left(&self) {
        self.players_connected.fetch_sub(1, Relaxed);
    }

    /// Read all counters into a serializable snapshot.
    pub fn snapshot(&self, levels_open: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            edits_applied: self.edits_applied.load(Relaxed),
            edits_unchanged: self.edits_unchanged.load(Relaxed),
            edits_rejected: self.edits_rejected.load(Relaxed),
            edit_ns_sum: self.edit_ns_sum.load(Relaxed),
            messages_sent: self.messages_sent.load(Relaxed),
            messages_dropped: self.messages_dropped.load(Relaxed),
            chat_messages: self.chat_messages.load(Relaxed),
            disconnects: self.disconnects.load(Relaxed),
            levels_open,
            players: self.players_connected.load(Relaxed),
            hist: [
                self.hist_under_1us.load(Relaxed),
                self.hist_1_10us.load(Relaxed),
                self.hist_10_100us.load(Relaxed),
                self.hist_100us_1ms.load(Relaxed),
                self.hist_over_1ms.load(Relaxed),
            ],
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of all metrics at a point in time.
/// Rates are left to the client, which diffs consecutive snapshots.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub edits_applied: u64,
    pub edits_unchanged: u64,
    pub edits_rejected: u64,
    pub edit_ns_sum: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub chat_messages: u64,
    pub disconnects: u64,
    pub levels_open: u64,
    pub players: u64,
    /// `[<1μs, 1-10μs, 10-100μs, 100μs-1ms, >1ms]`
    pub hist: [u64; 5],
}
