//! Feedback scheduler: delayed acknowledgement of durably received content.

use std::time::{Duration, Instant};

/// Fixed delay between durable receipt and the acknowledgement envelope.
pub const FEEDBACK_DELAY: Duration = Duration::from_millis(1000);

/// A scheduled acknowledgement. Consumed exactly once when due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFeedback {
    pub peer_node_id: String,
    pub success: bool,
    pub due: Instant,
}

/// Queue of pending acknowledgements. Never reads the clock: the host
/// passes `now` in and drives draining off `next_due`.
#[derive(Debug, Default)]
pub struct FeedbackQueue {
    pending: Vec<PendingFeedback>,
}

impl FeedbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an acknowledgement for `peer_node_id` due after the fixed
    /// delay. A second schedule for the same peer queues alongside the
    /// first; there is no cancellation.
    pub fn schedule(&mut self, peer_node_id: impl Into<String>, success: bool, now: Instant) {
        self.pending.push(PendingFeedback {
            peer_node_id: peer_node_id.into(),
            success,
            due: now + FEEDBACK_DELAY,
        });
    }

    /// Earliest due instant, for the host timer.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    /// Remove and return every entry due at `now`, in scheduling order.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingFeedback> {
        let mut due = Vec::new();
        self.pending.retain(|p| {
            if p.due <= now {
                due.push(p.clone());
                false
            } else {
                true
            }
        });
        due
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
