//! Marker registry
//!
//! Holds the author-defined question markers of a session, ordered by time,
//! together with their trigger/skip status. Status flags only ever move from
//! false to true; markers are never reordered or inserted after load.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Marker as configured by the content author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    /// Start of the marker window in seconds
    pub time: f64,
    /// Length of the marker window in seconds
    pub duration: f64,
    /// Question set identifier
    pub identifier: String,
    /// Label shown on the progress bar
    #[serde(default)]
    pub text: String,
}

/// Marker with its runtime status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub time: f64,
    pub duration: f64,
    pub identifier: String,
    pub text: String,
    /// Interception fired (at most once)
    pub triggered: bool,
    /// Viewer jumped past the marker, or its pending interception was cancelled
    pub skipped: bool,
}

impl Marker {
    fn from_config(config: &MarkerConfig) -> Self {
        Self {
            time: config.time,
            duration: config.duration,
            identifier: config.identifier.clone(),
            text: config.text.clone(),
            triggered: false,
            skipped: false,
        }
    }

    /// End of the marker window (exclusive)
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    /// Whether `time` falls inside `[time, time + duration)`
    pub fn contains(&self, time: f64) -> bool {
        time >= self.time && time < self.end()
    }

    /// Untriggered and not skipped
    pub fn is_armed(&self) -> bool {
        !self.triggered && !self.skipped
    }
}

/// Ordered set of session markers
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    markers: Vec<Marker>,
    loaded: bool,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a marker list in one step
    pub fn from_configs(configs: &[MarkerConfig]) -> Result<Self> {
        let mut registry = Self::new();
        registry.load(configs)?;
        Ok(registry)
    }

    /// Load the session's markers. Fails on duplicate identifiers or
    /// malformed entries; may only be called once.
    pub fn load(&mut self, configs: &[MarkerConfig]) -> Result<()> {
        if self.loaded {
            return Err(Error::InvalidConfig("markers already loaded".into()));
        }

        let mut seen = HashSet::with_capacity(configs.len());
        for config in configs {
            validate_marker(config)?;
            if !seen.insert(config.identifier.as_str()) {
                return Err(Error::DuplicateMarker {
                    identifier: config.identifier.clone(),
                });
            }
        }

        let mut markers: Vec<Marker> = configs.iter().map(Marker::from_config).collect();
        markers.sort_by(|a, b| a.time.total_cmp(&b.time));

        debug!(count = markers.len(), "Markers loaded");
        self.markers = markers;
        self.loaded = true;
        Ok(())
    }

    /// Markers whose window contains `time`, in time order
    pub fn markers_in_range(&self, time: f64) -> Vec<&Marker> {
        self.markers.iter().filter(|m| m.contains(time)).collect()
    }

    /// Mark every armed marker starting before `time` as skipped.
    /// Returns the identifiers that were newly skipped.
    pub fn mark_skipped(&mut self, time: f64) -> Vec<String> {
        self.markers
            .iter_mut()
            .filter(|m| m.time < time && m.is_armed())
            .map(|m| {
                m.skipped = true;
                m.identifier.clone()
            })
            .collect()
    }

    /// Flip `triggered` for an armed marker. Returns false if the marker is
    /// unknown, already triggered, or skipped.
    pub fn mark_triggered(&mut self, identifier: &str) -> bool {
        match self.markers.iter_mut().find(|m| m.identifier == identifier) {
            Some(marker) if marker.is_armed() => {
                marker.triggered = true;
                true
            }
            _ => false,
        }
    }

    /// Flag a triggered marker whose interception never reached the viewer
    pub fn mark_cancelled(&mut self, identifier: &str) -> bool {
        match self.markers.iter_mut().find(|m| m.identifier == identifier) {
            Some(marker) if marker.triggered && !marker.skipped => {
                marker.skipped = true;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.identifier == identifier)
    }

    pub fn is_skipped(&self, identifier: &str) -> bool {
        self.get(identifier).is_some_and(|m| m.skipped)
    }

    /// All markers in time order
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

fn validate_marker(config: &MarkerConfig) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidMarker {
        identifier: config.identifier.clone(),
        reason: reason.to_string(),
    };

    if config.identifier.trim().is_empty() {
        return Err(invalid("empty identifier"));
    }
    if !config.time.is_finite() || config.time < 0.0 {
        return Err(invalid("time must be a non-negative number"));
    }
    if !config.duration.is_finite() || config.duration <= 0.0 {
        return Err(invalid("duration must be positive"));
    }
    Ok(())
}
