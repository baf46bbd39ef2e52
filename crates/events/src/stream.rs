//! A single subscriber's view of a job's progress events.

use std::sync::Arc;
use std::time::Duration;

use genflow_core::types::JobId;
use tokio::sync::mpsc;

use crate::bus::{JobEvent, ProgressBus};

/// How long [`ProgressStream::next`] waits before emitting a keepalive
/// marker. Distinguishes "still waiting" from "connection dead" for
/// long-poll consumers.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// One item yielded by a [`ProgressStream`].
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// A published progress event.
    Event(JobEvent),
    /// No event arrived within the idle window; the stream is alive.
    Keepalive,
}

impl StreamItem {
    /// Render as a Server-Sent-Events frame.
    pub fn sse_encode(&self) -> String {
        match self {
            StreamItem::Event(event) => {
                // JobEvent has no non-serializable fields; encoding
                // cannot fail.
                let json = serde_json::to_string(event).unwrap_or_default();
                format!("data: {json}\n\n")
            }
            StreamItem::Keepalive => ": keepalive\n\n".to_string(),
        }
    }
}

/// Lazy, unbounded sequence of events for one job, ending after the
/// first terminal-status event.
///
/// The subscription is removed from the bus when the stream finishes
/// or is dropped, so teardown never leaks a registration.
pub struct ProgressStream {
    bus: Arc<ProgressBus>,
    job_id: JobId,
    subscription_id: u64,
    rx: mpsc::Receiver<JobEvent>,
    finished: bool,
}

impl ProgressStream {
    pub(crate) fn new(
        bus: Arc<ProgressBus>,
        job_id: JobId,
        subscription_id: u64,
        rx: mpsc::Receiver<JobEvent>,
    ) -> Self {
        Self {
            bus,
            job_id,
            subscription_id,
            rx,
            finished: false,
        }
    }

    /// The job this stream is bound to.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the next item.
    ///
    /// Yields [`StreamItem::Keepalive`] every [`KEEPALIVE_INTERVAL`] of
    /// idleness. Returns `None` once a terminal event has already been
    /// yielded, or when the bus dropped this subscriber (buffer
    /// exhaustion).
    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.finished {
            return None;
        }

        match tokio::time::timeout(KEEPALIVE_INTERVAL, self.rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.finish();
                }
                Some(StreamItem::Event(event))
            }
            // Sender side gone: the bus evicted us as a dead subscriber.
            Ok(None) => {
                self.finish();
                None
            }
            Err(_elapsed) => Some(StreamItem::Keepalive),
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.bus.unsubscribe(self.job_id, self.subscription_id);
        }
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.finish();
    }
}
