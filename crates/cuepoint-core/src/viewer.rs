//! Viewer state - the session-scoped context shared with the host
//!
//! Read at session start (marker configuration, recorded interceptions) and
//! written back at each seek completion, at the end of media and at teardown.

use crate::accountant::{TimeAccountant, WatchMetadata};
use crate::markers::MarkerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome recorded for a marker's interception
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptionRecord {
    pub score: f64,
    /// The viewer never saw the question (seeked past it)
    pub skipped: bool,
}

impl InterceptionRecord {
    pub fn answered(score: f64) -> Self {
        Self { score, skipped: false }
    }

    pub fn skipped() -> Self {
        Self { score: 0.0, skipped: true }
    }
}

/// Session-level state aggregated for the learning session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerState {
    /// Marker configuration for this content
    pub markers: Vec<MarkerConfig>,
    /// Recorded interceptions keyed by marker identifier
    pub interception_responses: BTreeMap<String, InterceptionRecord>,
    /// Milliseconds spent playing
    pub visited_length: u64,
    /// Playback position at the end of media
    #[serde(rename = "currentlength", alias = "currentLength")]
    pub current_length: f64,
    /// Media duration at the end of media
    pub total_length: f64,
    pub total_seeked_length_seconds: f64,
    pub meta_data: WatchMetadata,
}

impl ViewerState {
    pub fn with_markers(markers: Vec<MarkerConfig>) -> Self {
        Self {
            markers,
            ..Default::default()
        }
    }

    /// Whether an interception outcome exists for the marker
    pub fn has_interception(&self, identifier: &str) -> bool {
        self.interception_responses.contains_key(identifier)
    }

    /// Record an outcome unless one is already present
    pub fn record_if_absent(&mut self, identifier: &str, record: InterceptionRecord) {
        self.interception_responses
            .entry(identifier.to_string())
            .or_insert(record);
    }

    /// Copy the accountant's totals and metadata
    pub fn sync_from(&mut self, accountant: &TimeAccountant) {
        self.visited_length = accountant.total_spent_time_ms();
        self.total_seeked_length_seconds = accountant.total_seeked_length_seconds();
        self.meta_data = accountant.metadata().clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_if_absent_keeps_first() {
        let mut viewer = ViewerState::default();
        viewer.record_if_absent("q1", InterceptionRecord::answered(1.0));
        viewer.record_if_absent("q1", InterceptionRecord::skipped());

        assert!(viewer.has_interception("q1"));
        assert_eq!(viewer.interception_responses["q1"], InterceptionRecord::answered(1.0));
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = r#"{
            "markers": [{"time": 10, "duration": 5, "identifier": "q1", "text": "Quiz"}],
            "interceptionResponses": {"q0": {"score": 2, "skipped": false}}
        }"#;
        let viewer: ViewerState = serde_json::from_str(json).unwrap();
        assert_eq!(viewer.markers.len(), 1);
        assert!(viewer.has_interception("q0"));
        assert_eq!(viewer.visited_length, 0);

        let value = serde_json::to_value(&viewer).unwrap();
        assert!(value.get("totalSeekedLengthSeconds").is_some());
        assert!(value.get("currentlength").is_some());
        assert!(value["metaData"].get("actionLog").is_some());
    }
}
