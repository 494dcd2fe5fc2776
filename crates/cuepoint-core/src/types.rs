//! Core types for Cuepoint

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state owned by the state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Nothing has played yet
    #[default]
    Idle,
    /// Media is playing
    Playing,
    /// Playback paused by the viewer, the engine or an interception
    Paused,
    /// End of media reached
    Ended,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// Primitive events emitted by the media engine
///
/// `Ended` is normally synthesized from `TimeUpdate` at end of media, but an
/// engine that reports it natively is handled the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineEventKind {
    LoadStart,
    Play,
    Pause,
    Playing,
    DurationChange,
    Error,
    Progress,
    Seeking,
    Seeked,
    VolumeChange,
    RateChange,
    TimeUpdate,
    FullscreenChange,
    Ended,
}

impl EngineEventKind {
    /// Wire name of the event, as the engine reports it
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEventKind::LoadStart => "loadstart",
            EngineEventKind::Play => "play",
            EngineEventKind::Pause => "pause",
            EngineEventKind::Playing => "playing",
            EngineEventKind::DurationChange => "durationchange",
            EngineEventKind::Error => "error",
            EngineEventKind::Progress => "progress",
            EngineEventKind::Seeking => "seeking",
            EngineEventKind::Seeked => "seeked",
            EngineEventKind::VolumeChange => "volumechange",
            EngineEventKind::RateChange => "ratechange",
            EngineEventKind::TimeUpdate => "timeupdate",
            EngineEventKind::FullscreenChange => "fullscreenchange",
            EngineEventKind::Ended => "ended",
        }
    }
}

impl std::fmt::Display for EngineEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineEventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
            .map_err(|_| Error::Engine(format!("unknown engine event: {s}")))
    }
}

/// Read-only view of the engine at the moment an event is classified
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Playback position in seconds
    pub current_time: f64,
    /// Media duration in seconds (0 until known)
    pub duration: f64,
    /// Playback rate multiplier
    pub playback_rate: f64,
    /// Volume (0.0 - 1.0)
    pub volume: f64,
    /// Whether the engine is fullscreen
    pub is_fullscreen: bool,
}

impl EngineSnapshot {
    pub fn at(current_time: f64, duration: f64) -> Self {
        Self {
            current_time,
            duration,
            ..Default::default()
        }
    }
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: 0.0,
            playback_rate: 1.0,
            volume: 1.0,
            is_fullscreen: false,
        }
    }
}

/// Heartbeat kinds reported to the telemetry collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatKind {
    Play,
    Pause,
    Forward,
    Backward,
    Fullscreen,
}

impl std::fmt::Display for HeartbeatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeartbeatKind::Play => write!(f, "PLAY"),
            HeartbeatKind::Pause => write!(f, "PAUSE"),
            HeartbeatKind::Forward => write!(f, "FORWARD"),
            HeartbeatKind::Backward => write!(f, "BACKWARD"),
            HeartbeatKind::Fullscreen => write!(f, "FULLSCREEN"),
        }
    }
}

/// Sidebar menu events raised by the host shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MenuEvent {
    /// Menu opened over the player; playback pauses
    OpenMenu,
    /// Menu closed; playback resumes
    CloseMenu,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Forward/backward jump size in seconds
    pub skip_seconds: f64,
    /// Delay between reaching a marker and pausing for it (milliseconds)
    pub interception_delay_ms: u64,
    /// Idle period after which controls are hidden (milliseconds)
    pub idle_hide_after_ms: u64,
    /// Attempt to start playback when the session starts
    pub autoplay: bool,
    /// Tolerance of the end-of-media check (0 = exact equality)
    pub end_of_media_epsilon: f64,
    /// Playback rates offered to the viewer
    pub playback_rates: Vec<f64>,
    /// Request timeout for the HTTP question service (milliseconds)
    pub question_timeout_ms: u64,
}

impl SessionConfig {
    pub fn interception_delay(&self) -> Duration {
        Duration::from_millis(self.interception_delay_ms)
    }

    pub fn idle_hide_after(&self) -> Duration {
        Duration::from_millis(self.idle_hide_after_ms)
    }

    pub fn question_timeout(&self) -> Duration {
        Duration::from_millis(self.question_timeout_ms)
    }

    /// Check the configuration before a session is built from it
    pub fn validate(&self) -> Result<()> {
        if !self.skip_seconds.is_finite() || self.skip_seconds <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "skip_seconds must be positive, got {}",
                self.skip_seconds
            )));
        }
        if self.idle_hide_after_ms == 0 {
            return Err(Error::InvalidConfig("idle_hide_after_ms must be non-zero".into()));
        }
        if !self.end_of_media_epsilon.is_finite() || self.end_of_media_epsilon < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "end_of_media_epsilon must be >= 0, got {}",
                self.end_of_media_epsilon
            )));
        }
        if let Some(rate) = self.playback_rates.iter().find(|r| !r.is_finite() || **r <= 0.0) {
            return Err(Error::InvalidConfig(format!("invalid playback rate {rate}")));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            skip_seconds: 10.0,
            interception_delay_ms: 1000,
            idle_hide_after_ms: 5000,
            autoplay: true,
            end_of_media_epsilon: 0.0,
            playback_rates: vec![0.5, 1.0, 1.5],
            question_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EngineEventKind::TimeUpdate.to_string(), "timeupdate");
        assert_eq!("fullscreenchange".parse::<EngineEventKind>().unwrap(), EngineEventKind::FullscreenChange);
        assert_eq!("LoadStart".parse::<EngineEventKind>().unwrap(), EngineEventKind::LoadStart);
        assert!("scrub".parse::<EngineEventKind>().is_err());
    }

    #[test]
    fn test_heartbeat_kind_serialization() {
        let json = serde_json::to_string(&HeartbeatKind::Fullscreen).unwrap();
        assert_eq!(json, "\"FULLSCREEN\"");
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.skip_seconds, 10.0);
        assert_eq!(config.interception_delay(), Duration::from_secs(1));
        assert_eq!(config.idle_hide_after(), Duration::from_secs(5));
        assert!(config.autoplay);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = SessionConfig {
            skip_seconds: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            playback_rates: vec![1.0, -2.0],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_json() {
        let config: SessionConfig = serde_json::from_str(r#"{"skip_seconds": 5.0}"#).unwrap();
        assert_eq!(config.skip_seconds, 5.0);
        assert_eq!(config.interception_delay_ms, 1000);
    }
}
