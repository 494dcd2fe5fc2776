//! Heartbeat reporting
//!
//! Fire-and-forget notifications of lifecycle transitions (play, pause,
//! forward, backward, fullscreen). Records are queued on a channel and
//! delivered by a background task, so `notify` never waits on the sink.

use crate::types::{HeartbeatKind, SessionId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Heartbeat with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// Unique record ID
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    /// Sequence number within the session
    pub sequence: u64,
    pub kind: HeartbeatKind,
    /// Playback position in seconds
    pub position: f64,
}

/// Telemetry collaborator receiving heartbeats
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn send(&self, record: &HeartbeatRecord) -> Result<()>;
}

/// Sink that only logs heartbeats
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHeartbeatSink;

#[async_trait]
impl HeartbeatSink for LogHeartbeatSink {
    async fn send(&self, record: &HeartbeatRecord) -> Result<()> {
        info!(
            session_id = %record.session_id,
            sequence = record.sequence,
            kind = %record.kind,
            position = record.position,
            "Heartbeat"
        );
        Ok(())
    }
}

/// Sink posting each heartbeat as JSON to a beacon endpoint
#[cfg(feature = "http")]
pub struct BeaconHeartbeatSink {
    url: url::Url,
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl BeaconHeartbeatSink {
    pub fn new(url: url::Url) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl HeartbeatSink for BeaconHeartbeatSink {
    async fn send(&self, record: &HeartbeatRecord) -> Result<()> {
        let response = self.client.post(self.url.clone()).json(record).send().await?;
        if !response.status().is_success() {
            return Err(crate::Error::Heartbeat(format!(
                "beacon returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Queues heartbeats for background delivery
pub struct HeartbeatReporter {
    session_id: SessionId,
    sequence: u64,
    tx: Option<mpsc::UnboundedSender<HeartbeatRecord>>,
    worker: JoinHandle<()>,
}

impl HeartbeatReporter {
    /// Create a reporter and spawn its delivery task. Must be called from
    /// within a tokio runtime.
    pub fn new(session_id: SessionId, sink: Arc<dyn HeartbeatSink>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<HeartbeatRecord>();

        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = sink.send(&record).await {
                    warn!(
                        sequence = record.sequence,
                        kind = %record.kind,
                        code = e.error_code(),
                        error = %e,
                        "Heartbeat delivery failed"
                    );
                }
            }
            debug!("Heartbeat worker stopped");
        });

        Self {
            session_id,
            sequence: 0,
            tx: Some(tx),
            worker,
        }
    }

    /// Queue a heartbeat. Never blocks; dropped silently after `close`.
    pub fn notify(&mut self, kind: HeartbeatKind, position: f64) {
        let Some(tx) = &self.tx else {
            return;
        };

        self.sequence += 1;
        let record = HeartbeatRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            timestamp: Utc::now(),
            sequence: self.sequence,
            kind,
            position,
        };
        debug!(kind = %kind, position, "Heartbeat queued");
        let _ = tx.send(record);
    }

    /// Number of heartbeats queued so far
    pub fn sent(&self) -> u64 {
        self.sequence
    }

    /// Stop accepting heartbeats; queued records are still delivered
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Close and wait for the delivery task to drain
    pub async fn flush(mut self) {
        self.close();
        let _ = self.worker.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<HeartbeatRecord>>,
    }

    #[async_trait]
    impl HeartbeatSink for RecordingSink {
        async fn send(&self, record: &HeartbeatRecord) -> Result<()> {
            self.records.lock().await.push(record.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl HeartbeatSink for FailingSink {
        async fn send(&self, _record: &HeartbeatRecord) -> Result<()> {
            Err(crate::Error::Heartbeat("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_records_delivered_in_sequence() {
        let sink = Arc::new(RecordingSink::default());
        let session_id = SessionId::new();
        let mut reporter = HeartbeatReporter::new(session_id, sink.clone());

        reporter.notify(HeartbeatKind::Play, 0.0);
        reporter.notify(HeartbeatKind::Pause, 4.5);
        reporter.notify(HeartbeatKind::Fullscreen, 4.5);
        assert_eq!(reporter.sent(), 3);
        reporter.flush().await;

        let records = sink.records.lock().await;
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![HeartbeatKind::Play, HeartbeatKind::Pause, HeartbeatKind::Fullscreen]);
        assert_eq!(records[1].sequence, 2);
        assert_eq!(records[1].position, 4.5);
        assert!(records.iter().all(|r| r.session_id == session_id));
    }

    #[tokio::test]
    async fn test_notify_after_close_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let mut reporter = HeartbeatReporter::new(SessionId::new(), sink.clone());

        reporter.close();
        reporter.notify(HeartbeatKind::Play, 0.0);
        assert_eq!(reporter.sent(), 0);
        reporter.flush().await;

        assert!(sink.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_fatal() {
        let mut reporter = HeartbeatReporter::new(SessionId::new(), Arc::new(FailingSink));
        reporter.notify(HeartbeatKind::Forward, 10.0);
        reporter.notify(HeartbeatKind::Backward, 0.0);
        reporter.flush().await;
    }

    #[test]
    fn test_record_json() {
        let record = HeartbeatRecord {
            id: Uuid::new_v4(),
            session_id: SessionId::new(),
            timestamp: Utc::now(),
            sequence: 7,
            kind: HeartbeatKind::Backward,
            position: 12.0,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["kind"], "BACKWARD");
        assert_eq!(value["sequence"], 7);
    }
}
