//! Marker interception scheduling
//!
//! When a marker is reached the session waits a short delay (so the current
//! frame renders), then pauses and fetches the marker's question. Both the
//! delay and the fetch are suspend points. Every scheduled delay captures the
//! current epoch; a seek or teardown bumps the epoch, and a delay that
//! completes under a stale epoch is dropped instead of pausing playback.
//!
//! The controller never touches session state itself. Completions are sent
//! back to the session loop as [`InterceptionEvent`]s and applied there.

use crate::question::{QuestionPayload, QuestionService};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Completion of an interception suspend point
#[derive(Debug)]
pub enum InterceptionEvent {
    /// The delay for a reached marker elapsed
    Due {
        identifier: String,
        time: f64,
        epoch: u64,
    },
    /// The question fetch for a marker finished
    Fetched {
        identifier: String,
        time: f64,
        result: Result<QuestionPayload>,
    },
}

struct PendingInterception {
    identifier: String,
    epoch: u64,
    timer: JoinHandle<()>,
}

/// Schedules interception delays and question fetches
pub struct MarkerInterceptionController {
    delay: Duration,
    epoch: u64,
    pending: Vec<PendingInterception>,
    fetches: Vec<JoinHandle<()>>,
    questions: Arc<dyn QuestionService>,
    events: mpsc::UnboundedSender<InterceptionEvent>,
}

impl MarkerInterceptionController {
    pub fn new(
        delay: Duration,
        questions: Arc<dyn QuestionService>,
        events: mpsc::UnboundedSender<InterceptionEvent>,
    ) -> Self {
        Self {
            delay,
            epoch: 0,
            pending: Vec::new(),
            fetches: Vec::new(),
            questions,
            events,
        }
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of interceptions waiting on their delay
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of question fetches still running
    pub fn in_flight(&self) -> usize {
        self.fetches.iter().filter(|h| !h.is_finished()).count()
    }

    /// Start the delay for a reached marker under the current epoch
    pub fn schedule(&mut self, identifier: String, time: f64) {
        let epoch = self.epoch;
        let delay = self.delay;
        let events = self.events.clone();
        let id = identifier.clone();

        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(InterceptionEvent::Due {
                identifier: id,
                time,
                epoch,
            });
        });

        trace!(identifier = %identifier, epoch, "Interception scheduled");
        self.pending.push(PendingInterception {
            identifier,
            epoch,
            timer,
        });
    }

    /// Claim a completed delay. Returns true only if it was scheduled under
    /// the current epoch and has not been cancelled.
    pub fn accept(&mut self, identifier: &str, epoch: u64) -> bool {
        let Some(index) = self
            .pending
            .iter()
            .position(|p| p.identifier == identifier && p.epoch == epoch)
        else {
            return false;
        };
        self.pending.swap_remove(index);
        epoch == self.epoch
    }

    /// Bump the epoch and cancel every waiting delay. Returns the
    /// identifiers of the cancelled interceptions.
    pub fn invalidate(&mut self) -> Vec<String> {
        self.epoch += 1;
        let cancelled: Vec<String> = self
            .pending
            .drain(..)
            .map(|p| {
                p.timer.abort();
                p.identifier
            })
            .collect();
        if !cancelled.is_empty() {
            debug!(epoch = self.epoch, count = cancelled.len(), "Pending interceptions cancelled");
        }
        cancelled
    }

    /// Issue the single question fetch for a marker
    pub fn fetch(&mut self, identifier: String, time: f64) {
        self.fetches.retain(|h| !h.is_finished());

        let questions = self.questions.clone();
        let events = self.events.clone();
        self.fetches.push(tokio::spawn(async move {
            let result = questions.fetch_question(&identifier).await;
            let _ = events.send(InterceptionEvent::Fetched {
                identifier,
                time,
                result,
            });
        }));
    }

    /// Cancel everything; used at teardown
    pub fn shutdown(&mut self) {
        self.invalidate();
        for fetch in self.fetches.drain(..) {
            fetch.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::StaticQuestionService;
    use serde_json::json;

    fn controller(
        delay_ms: u64,
    ) -> (MarkerInterceptionController, mpsc::UnboundedReceiver<InterceptionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let questions = StaticQuestionService::new().with_question("q1", json!({"id": "q1"}));
        (
            MarkerInterceptionController::new(Duration::from_millis(delay_ms), Arc::new(questions), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_then_due() {
        let (mut controller, mut rx) = controller(1000);
        controller.schedule("q1".into(), 10.0);
        assert_eq!(controller.pending(), 1);

        let start = tokio::time::Instant::now();
        let event = rx.recv().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));

        match event {
            InterceptionEvent::Due { identifier, time, epoch } => {
                assert_eq!(identifier, "q1");
                assert_eq!(time, 10.0);
                assert!(controller.accept(&identifier, epoch));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(controller.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_cancels_pending() {
        let (mut controller, mut rx) = controller(1000);
        controller.schedule("q1".into(), 10.0);
        let stale_epoch = controller.epoch();

        let cancelled = controller.invalidate();
        assert_eq!(cancelled, vec!["q1".to_string()]);
        assert_eq!(controller.epoch(), stale_epoch + 1);
        assert!(!controller.accept("q1", stale_epoch));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fetch_reports_result() {
        let (mut controller, mut rx) = controller(0);
        controller.fetch("q1".into(), 10.0);
        controller.fetch("missing".into(), 20.0);

        let mut ok = 0;
        let mut failed = 0;
        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                InterceptionEvent::Fetched { result: Ok(payload), .. } => {
                    assert_eq!(payload["id"], "q1");
                    ok += 1;
                }
                InterceptionEvent::Fetched { result: Err(_), identifier, .. } => {
                    assert_eq!(identifier, "missing");
                    failed += 1;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!((ok, failed), (1, 1));
    }
}
