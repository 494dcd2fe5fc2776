//! Media engine boundary
//!
//! The decoding/rendering engine is an external collaborator. The session only
//! reads its time accessors and issues commands; events are delivered to the
//! session separately as [`EngineEventKind`](crate::EngineEventKind) values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Accessors and commands of the underlying media engine
pub trait MediaEngine: Send + Sync {
    /// Playback position in seconds
    fn current_time(&self) -> f64;
    /// Media duration in seconds
    fn duration(&self) -> f64;
    fn playback_rate(&self) -> f64;
    fn volume(&self) -> f64;
    fn is_fullscreen(&self) -> bool;

    /// Request playback. A rejected request (e.g. blocked autoplay) returns
    /// [`Error::AutoplayBlocked`].
    fn play(&self) -> Result<()>;
    fn pause(&self);
    /// Move the playback position
    fn seek(&self, seconds: f64);
    /// Enable or disable the engine's interactive controls
    fn set_controls(&self, enabled: bool);
    /// Release the engine; no command may follow
    fn dispose(&self);
}

/// Shared handle to the session's engine
pub type EngineHandle = Arc<dyn MediaEngine>;

/// Commands recorded by [`SimulatedEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    Play,
    Pause,
    Seek { to: f64 },
    Controls { enabled: bool },
    Dispose,
}

#[derive(Debug)]
struct SimulatedState {
    current_time: f64,
    duration: f64,
    playback_rate: f64,
    volume: f64,
    fullscreen: bool,
    paused: bool,
    controls: bool,
    disposed: bool,
    block_play: bool,
    commands: Vec<EngineCommand>,
}

/// In-memory engine for headless replay and tests
///
/// Position and media properties are set by the driver; commands only update
/// the simulated flags and are logged.
#[derive(Debug)]
pub struct SimulatedEngine {
    state: Mutex<SimulatedState>,
}

impl SimulatedEngine {
    pub fn new(duration: f64) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                current_time: 0.0,
                duration,
                playback_rate: 1.0,
                volume: 1.0,
                fullscreen: false,
                paused: true,
                controls: true,
                disposed: false,
                block_play: false,
                commands: Vec::new(),
            }),
        }
    }

    /// Create a shared handle
    pub fn shared(duration: f64) -> Arc<Self> {
        Arc::new(Self::new(duration))
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_current_time(&self, seconds: f64) {
        self.lock().current_time = seconds;
    }

    pub fn set_duration(&self, seconds: f64) {
        self.lock().duration = seconds;
    }

    pub fn set_playback_rate(&self, rate: f64) {
        self.lock().playback_rate = rate;
    }

    pub fn set_volume(&self, volume: f64) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.lock().fullscreen = fullscreen;
    }

    /// Make subsequent `play()` calls fail as if autoplay were blocked
    pub fn block_play(&self, blocked: bool) {
        self.lock().block_play = blocked;
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn controls_enabled(&self) -> bool {
        self.lock().controls
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// All commands received so far, in order
    pub fn commands(&self) -> Vec<EngineCommand> {
        self.lock().commands.clone()
    }
}

impl MediaEngine for SimulatedEngine {
    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn duration(&self) -> f64 {
        self.lock().duration
    }

    fn playback_rate(&self) -> f64 {
        self.lock().playback_rate
    }

    fn volume(&self) -> f64 {
        self.lock().volume
    }

    fn is_fullscreen(&self) -> bool {
        self.lock().fullscreen
    }

    fn play(&self) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(EngineCommand::Play);
        if state.disposed {
            return Err(Error::Engine("play after dispose".into()));
        }
        if state.block_play {
            debug!("Simulated engine rejected play");
            return Err(Error::AutoplayBlocked);
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.lock();
        state.commands.push(EngineCommand::Pause);
        state.paused = true;
    }

    fn seek(&self, seconds: f64) {
        let mut state = self.lock();
        state.commands.push(EngineCommand::Seek { to: seconds });
        state.current_time = seconds;
    }

    fn set_controls(&self, enabled: bool) {
        let mut state = self.lock();
        state.commands.push(EngineCommand::Controls { enabled });
        state.controls = enabled;
    }

    fn dispose(&self) {
        let mut state = self.lock();
        state.commands.push(EngineCommand::Dispose);
        state.disposed = true;
        state.paused = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_commands_are_logged() {
        let engine = SimulatedEngine::new(60.0);
        engine.play().unwrap();
        engine.seek(12.5);
        engine.set_controls(false);
        engine.pause();

        assert_eq!(
            engine.commands(),
            vec![
                EngineCommand::Play,
                EngineCommand::Seek { to: 12.5 },
                EngineCommand::Controls { enabled: false },
                EngineCommand::Pause,
            ]
        );
        assert_eq!(engine.current_time(), 12.5);
        assert!(engine.is_paused());
        assert!(!engine.controls_enabled());
    }

    #[test]
    fn test_blocked_play() {
        let engine = SimulatedEngine::new(60.0);
        engine.block_play(true);

        let err = engine.play().unwrap_err();
        assert!(matches!(err, Error::AutoplayBlocked));
        assert!(engine.is_paused());
    }

    #[test]
    fn test_play_after_dispose_fails() {
        let engine = SimulatedEngine::new(60.0);
        engine.dispose();
        assert!(engine.is_disposed());
        assert!(engine.play().is_err());
    }
}
