use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Emit a progress event only when the percentage for a part has
/// advanced by at least this many points since the last emission.
const EMIT_STEP_PERCENT: f64 = 5.0;

/// Buffered events per subscriber. A subscriber that falls this far
/// behind loses intermediate events, never the upload.
const SUBSCRIBER_BUFFER: usize = 64;

/// Per-part progress for one upload session. Ephemeral; the percentage
/// is non-decreasing for a given part.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    #[serde(rename = "partNumber")]
    pub part_number: i32,
    pub percentage: f64,
}

/// What a subscriber receives: part progress until the session reaches
/// its terminal success, then exactly one `Complete`.
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Part(ProgressEvent),
    Complete,
}

struct Subscriber {
    tx: mpsc::Sender<ProgressUpdate>,
    /// Last emitted percentage per part, for throttling.
    last_sent: DashMap<i32, f64>,
}

/// Maps an upload-session id to at most one live subscriber and
/// delivers throttled progress events to it.
///
/// Keyed by generated session id, never by raw filename, so concurrent
/// uploads of identically named files cannot collide. Delivery to one
/// subscriber is serialized through its channel; delivery failure
/// detaches the subscriber and never fails the upload.
#[derive(Clone, Default)]
pub struct ProgressBroadcaster {
    subscribers: Arc<DashMap<String, Subscriber>>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for a session. Replaces and detaches any
    /// previous subscriber for the same id: the old receiver observes
    /// its channel closing.
    pub fn register(&self, session_id: &str) -> mpsc::Receiver<ProgressUpdate> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.insert(
            session_id.to_string(),
            Subscriber {
                tx,
                last_sent: DashMap::new(),
            },
        );
        rx
    }

    pub fn unregister(&self, session_id: &str) {
        self.subscribers.remove(session_id);
    }

    pub fn is_registered(&self, session_id: &str) -> bool {
        self.subscribers.contains_key(session_id)
    }

    /// Report transfer progress for one part. Emits to the current
    /// subscriber only when the part's percentage advanced by at least
    /// five points since its last emission.
    pub fn on_progress(
        &self,
        session_id: &str,
        part_number: i32,
        bytes_transferred: u64,
        part_total_bytes: u64,
    ) {
        if part_total_bytes == 0 {
            return;
        }
        let percentage = bytes_transferred as f64 * 100.0 / part_total_bytes as f64;

        let mut detach = false;
        if let Some(subscriber) = self.subscribers.get(session_id) {
            let mut last = subscriber.last_sent.entry(part_number).or_insert(0.0);
            if percentage - *last >= EMIT_STEP_PERCENT {
                let event = ProgressEvent {
                    part_number,
                    percentage,
                };
                match subscriber.tx.try_send(ProgressUpdate::Part(event)) {
                    Ok(()) => *last = percentage,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Slow subscriber: skip this event, keep the
                        // throttle state so the next advance retries.
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => detach = true,
                }
            }
        }

        if detach {
            tracing::debug!(session_id, "progress subscriber went away, detaching");
            self.subscribers.remove(session_id);
        }
    }

    /// Terminal success: emit one final complete signal and unregister
    /// the subscriber.
    pub fn complete(&self, session_id: &str) {
        if let Some((_, subscriber)) = self.subscribers.remove(session_id) {
            let _ = subscriber.tx.try_send(ProgressUpdate::Complete);
        }
    }
}

/// Adapter handed to the object store for one part upload: forwards
/// cumulative transfer counts into the broadcaster.
pub struct PartProgress {
    broadcaster: ProgressBroadcaster,
    session_id: String,
    part_number: i32,
    part_total_bytes: u64,
}

impl PartProgress {
    pub fn new(
        broadcaster: ProgressBroadcaster,
        session_id: &str,
        part_number: i32,
        part_total_bytes: u64,
    ) -> Self {
        Self {
            broadcaster,
            session_id: session_id.to_string(),
            part_number,
            part_total_bytes,
        }
    }
}

impl crate::services::storage::TransferObserver for PartProgress {
    fn transferred(&self, bytes: u64) {
        self.broadcaster.on_progress(
            &self.session_id,
            self.part_number,
            bytes,
            self.part_total_bytes,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<ProgressUpdate>) -> Vec<ProgressUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    #[tokio::test]
    async fn test_emissions_are_throttled_to_five_point_steps() {
        let broadcaster = ProgressBroadcaster::new();
        let mut rx = broadcaster.register("session-1");

        // 1% increments on a 100-byte part: only every fifth advances
        for transferred in 1..=100u64 {
            broadcaster.on_progress("session-1", 1, transferred, 100);
        }

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 20);

        let mut previous = 0.0;
        for update in updates {
            match update {
                ProgressUpdate::Part(event) => {
                    assert!(event.percentage - previous >= EMIT_STEP_PERCENT);
                    previous = event.percentage;
                }
                ProgressUpdate::Complete => panic!("no completion was signalled"),
            }
        }
        assert_eq!(previous, 100.0);
    }

    #[tokio::test]
    async fn test_percentage_non_decreasing_per_part() {
        let broadcaster = ProgressBroadcaster::new();
        let mut rx = broadcaster.register("session-1");

        for transferred in [10u64, 30, 30, 55, 80, 100] {
            broadcaster.on_progress("session-1", 2, transferred, 100);
        }

        let mut previous = -1.0;
        for update in drain(&mut rx) {
            if let ProgressUpdate::Part(event) = update {
                assert_eq!(event.part_number, 2);
                assert!(event.percentage >= previous);
                previous = event.percentage;
            }
        }
    }

    #[tokio::test]
    async fn test_throttle_state_is_per_part() {
        let broadcaster = ProgressBroadcaster::new();
        let mut rx = broadcaster.register("session-1");

        broadcaster.on_progress("session-1", 1, 50, 100);
        // Part 2 starts fresh; 50% is well past its own threshold
        broadcaster.on_progress("session-1", 2, 50, 100);

        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 2);
    }

    #[tokio::test]
    async fn test_reregister_detaches_previous_subscriber() {
        let broadcaster = ProgressBroadcaster::new();
        let mut first = broadcaster.register("session-1");
        let mut second = broadcaster.register("session-1");

        broadcaster.on_progress("session-1", 1, 100, 100);

        // Old handle sees only a closed channel, new one gets the event
        assert!(matches!(
            first.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(
            second.try_recv(),
            Ok(ProgressUpdate::Part(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_emits_final_event_and_unregisters() {
        let broadcaster = ProgressBroadcaster::new();
        let mut rx = broadcaster.register("session-1");

        broadcaster.on_progress("session-1", 1, 100, 100);
        broadcaster.complete("session-1");

        assert!(matches!(rx.recv().await, Some(ProgressUpdate::Part(_))));
        assert!(matches!(rx.recv().await, Some(ProgressUpdate::Complete)));
        assert!(rx.recv().await.is_none());
        assert!(!broadcaster.is_registered("session-1"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_detaches_without_error() {
        let broadcaster = ProgressBroadcaster::new();
        let rx = broadcaster.register("session-1");
        drop(rx);

        broadcaster.on_progress("session-1", 1, 100, 100);
        assert!(!broadcaster.is_registered("session-1"));
    }

    #[tokio::test]
    async fn test_progress_for_unknown_session_is_ignored() {
        let broadcaster = ProgressBroadcaster::new();
        // Nothing registered: must not panic or allocate a subscriber
        broadcaster.on_progress("ghost", 1, 10, 100);
        assert!(!broadcaster.is_registered("ghost"));
    }
}
