//! Watch-time accounting
//!
//! Tracks:
//! - Time spent genuinely playing (play -> pause, play -> ended)
//! - Total distance covered by seeks
//! - A metadata log of player actions for post-session analytics

use crate::types::{EngineEventKind, EngineSnapshot};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;

/// One entry of the action log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub kind: EngineEventKind,
    /// Playback position when the action happened
    pub at_time: f64,
}

/// Aggregate of player actions, append-only except `total_duration`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchMetadata {
    pub total_duration: f64,
    pub playback_speed_samples: Vec<f64>,
    pub volume_samples: Vec<f64>,
    pub action_log: Vec<ActionRecord>,
}

/// Accumulates watch time, seek distance and the action log
#[derive(Debug, Default)]
pub struct TimeAccountant {
    /// Milliseconds spent playing
    total_spent_time_ms: u64,
    /// Sum of |resolved - anchor| over all seeks
    total_seeked_length_seconds: f64,
    /// Start of the current play interval
    play_started_at: Option<Instant>,
    /// When the media started loading
    session_started_at: Option<Instant>,
    /// A play interval has been opened at least once
    played: bool,
    metadata: WatchMetadata,
}

impl TimeAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a classified engine transition
    pub fn on_state_transition(&mut self, kind: EngineEventKind, snapshot: &EngineSnapshot, at: Instant) {
        match kind {
            EngineEventKind::LoadStart => {
                self.session_started_at.get_or_insert(at);
            }
            EngineEventKind::Play => {
                self.open_interval(at);
                self.record_action(kind, snapshot);
            }
            EngineEventKind::Playing => {
                // Autoplay without a `play` event: the first interval runs from loadstart
                let start = match self.session_started_at {
                    Some(loaded) if !self.played => loaded,
                    _ => at,
                };
                self.open_interval(start);
            }
            EngineEventKind::Pause | EngineEventKind::Ended => {
                self.close_interval(at);
                self.record_action(kind, snapshot);
            }
            EngineEventKind::Seeked => {
                self.record_action(kind, snapshot);
            }
            _ => {}
        }
    }

    /// Add the distance of a completed seek; returns the new total
    pub fn record_seek(&mut self, anchor: f64, resolved: f64) -> f64 {
        let distance = (resolved - anchor).abs();
        if distance.is_finite() {
            self.total_seeked_length_seconds += distance;
        }
        trace!(anchor, resolved, distance, "Seek recorded");
        self.total_seeked_length_seconds
    }

    /// Open a play interval unless one is already open
    pub fn open_interval(&mut self, at: Instant) {
        self.played = true;
        self.play_started_at.get_or_insert(at);
    }

    /// Close an open play interval, e.g. at teardown
    pub fn close_interval(&mut self, at: Instant) {
        if let Some(started) = self.play_started_at.take() {
            let elapsed = at.saturating_duration_since(started);
            self.total_spent_time_ms += elapsed.as_millis() as u64;
        }
    }

    fn record_action(&mut self, kind: EngineEventKind, snapshot: &EngineSnapshot) {
        self.metadata.total_duration = snapshot.duration;
        self.metadata.playback_speed_samples.push(snapshot.playback_rate);
        self.metadata.volume_samples.push(snapshot.volume);
        self.metadata.action_log.push(ActionRecord {
            kind,
            at_time: snapshot.current_time,
        });
    }

    pub fn total_spent_time_ms(&self) -> u64 {
        self.total_spent_time_ms
    }

    pub fn total_seeked_length_seconds(&self) -> f64 {
        self.total_seeked_length_seconds
    }

    /// Whether a play interval is currently open
    pub fn is_playing(&self) -> bool {
        self.play_started_at.is_some()
    }

    pub fn session_started_at(&self) -> Option<Instant> {
        self.session_started_at
    }

    pub fn metadata(&self) -> &WatchMetadata {
        &self.metadata
    }
}
