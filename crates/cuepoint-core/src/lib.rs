//! Cuepoint Core - Interactive Playback Engine
//!
//! This crate turns a continuously playing media stream into an interactive
//! learning session:
//! - Play/pause/seek/ended state machine over a generic media engine
//! - Question markers that pause playback and fetch an external question
//! - Watch-time, seek-distance and action-log accounting
//! - Heartbeat telemetry of lifecycle transitions
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           Cuepoint Core                           │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │   engine events ──► ┌──────────────────┐ ◄── viewer commands      │
//! │                     │   Session Loop   │                          │
//! │                     │ (single consumer)│                          │
//! │                     └────────┬─────────┘                          │
//! │                              │                                    │
//! │                     ┌────────┴─────────┐                          │
//! │                     │  Playback State  │                          │
//! │                     │     Machine      │                          │
//! │                     └────────┬─────────┘                          │
//! │                              │                                    │
//! │  ┌────────────┐ ┌──────────┐ │ ┌──────────────┐ ┌───────────┐     │
//! │  │    Time    │ │  Marker  │ │ │ Interception │ │ Heartbeat │     │
//! │  │ Accountant │ │ Registry │ │ │  Controller  │ │ Reporter  │     │
//! │  └────────────┘ └──────────┘ │ └──────────────┘ └───────────┘     │
//! │                              │                                    │
//! │                     ┌────────┴─────────┐                          │
//! │                     │  Playback Clock  │ ──► Media Engine         │
//! │                     └──────────────────┘                          │
//! │                                                                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod accountant;
pub mod clock;
pub mod engine;
pub mod error;
pub mod heartbeat;
pub mod interception;
pub mod markers;
pub mod question;
pub mod session;
pub mod state_machine;
pub mod types;
pub mod viewer;

pub use accountant::{ActionRecord, TimeAccountant, WatchMetadata};
pub use clock::PlaybackClock;
pub use engine::{EngineCommand, EngineHandle, MediaEngine, SimulatedEngine};
pub use error::{Error, Result};
pub use heartbeat::{HeartbeatRecord, HeartbeatReporter, HeartbeatSink, LogHeartbeatSink};
pub use interception::{InterceptionEvent, MarkerInterceptionController};
pub use markers::{Marker, MarkerConfig, MarkerRegistry};
pub use question::{QuestionPayload, QuestionService, StaticQuestionService};
pub use session::{Collaborators, Command, HostEvent, HostEvents, InteractiveSession, QuestionSetData, SessionHandle};
pub use state_machine::{ControlsView, PlaybackStateMachine, SeekSession, SessionSnapshot};
pub use types::*;
pub use viewer::{InterceptionRecord, ViewerState};

#[cfg(feature = "http")]
pub use heartbeat::BeaconHeartbeatSink;
#[cfg(feature = "http")]
pub use question::HttpQuestionService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup
pub fn init() {
    tracing::info!(version = VERSION, "Cuepoint Core initialized");
}
