//! Playback clock - stateless adapter over the engine's time accessors

use crate::engine::EngineHandle;
use crate::types::EngineSnapshot;

/// Reads time, duration and media properties from the engine
#[derive(Clone)]
pub struct PlaybackClock {
    engine: EngineHandle,
}

impl PlaybackClock {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    /// Capture the engine's current time and media properties
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            current_time: self.engine.current_time(),
            duration: self.engine.duration(),
            playback_rate: self.engine.playback_rate(),
            volume: self.engine.volume(),
            is_fullscreen: self.engine.is_fullscreen(),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn duration(&self) -> f64 {
        self.engine.duration()
    }

    /// The engine behind this clock, for issuing commands
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;

    #[test]
    fn test_snapshot_reads_engine() {
        let engine = SimulatedEngine::shared(120.0);
        engine.set_current_time(42.0);
        engine.set_playback_rate(1.5);
        engine.set_fullscreen(true);

        let clock = PlaybackClock::new(engine.clone());
        let snapshot = clock.snapshot();

        assert_eq!(snapshot.current_time, 42.0);
        assert_eq!(snapshot.duration, 120.0);
        assert_eq!(snapshot.playback_rate, 1.5);
        assert!(snapshot.is_fullscreen);
    }
}
