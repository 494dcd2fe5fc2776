//! Interactive session - single-consumer event loop
//!
//! Coordinates:
//! - Engine events delivered by the host
//! - Viewer commands (play, pause, skip, resume after a question)
//! - Interception delays and question fetches completing
//! - The idle timer hiding controls
//!
//! All session state is owned by one tokio task and mutated one input at a
//! time. Hosts talk to it through a cloneable [`SessionHandle`].

use crate::{
    clock::PlaybackClock,
    engine::EngineHandle,
    heartbeat::HeartbeatSink,
    interception::InterceptionEvent,
    question::{QuestionPayload, QuestionService},
    state_machine::{PlaybackStateMachine, SessionSnapshot},
    types::*,
    viewer::{InterceptionRecord, ViewerState},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument};

/// External collaborators of a session
#[derive(Clone)]
pub struct Collaborators {
    pub engine: EngineHandle,
    pub questions: Arc<dyn QuestionService>,
    pub heartbeat: Arc<dyn HeartbeatSink>,
}

/// Question payload delivered to the host on interception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSetData {
    pub response: QuestionPayload,
    /// Marker time in seconds
    pub time: f64,
    pub identifier: String,
}

/// Output events for the host application
pub enum HostEvent {
    /// Engine ready; emitted once at session start
    PlayerInstance(EngineHandle),
    /// A marker's question was fetched; playback stays paused until the
    /// host calls [`SessionHandle::resume`]
    QuestionSetData(QuestionSetData),
    /// Every classified engine event, including a synthesized `ended`
    PlayerEvent(EngineEventKind),
    /// Fullscreen toggled; the host re-parents its controls
    Fullscreen { active: bool },
}

impl std::fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostEvent::PlayerInstance(_) => f.write_str("PlayerInstance(..)"),
            HostEvent::QuestionSetData(data) => f.debug_tuple("QuestionSetData").field(data).finish(),
            HostEvent::PlayerEvent(kind) => f.debug_tuple("PlayerEvent").field(kind).finish(),
            HostEvent::Fullscreen { active } => {
                f.debug_struct("Fullscreen").field("active", active).finish()
            }
        }
    }
}

/// Receiver of a session's host events
pub type HostEvents = mpsc::UnboundedReceiver<HostEvent>;

/// Viewer commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Play,
    Pause,
    Forward,
    Backward,
    /// Resume after a question: play and re-enable controls
    Resume,
    Menu(MenuEvent),
    PointerActivity,
}

enum SessionInput {
    Engine {
        kind: EngineEventKind,
        snapshot: EngineSnapshot,
        at: Instant,
    },
    Command(Command),
    RecordInterception {
        identifier: String,
        record: InterceptionRecord,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Dispose(oneshot::Sender<ViewerState>),
}

/// Builder for running sessions
pub struct InteractiveSession;

impl InteractiveSession {
    /// Validate the configuration, load markers and start the session loop.
    /// Must be called within a tokio runtime.
    #[instrument(skip_all)]
    pub fn spawn(
        config: SessionConfig,
        collaborators: Collaborators,
        viewer: ViewerState,
    ) -> Result<(SessionHandle, HostEvents)> {
        let session_id = SessionId::new();
        let idle_period = config.idle_hide_after();
        let clock = PlaybackClock::new(collaborators.engine.clone());

        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let (interception_tx, interception_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let mut machine = PlaybackStateMachine::new(
            session_id,
            config,
            collaborators,
            viewer,
            host_tx,
            interception_tx,
        )?;
        machine.start();
        let state_rx = machine.subscribe_state();

        tokio::spawn(run(machine, input_rx, interception_rx, idle_period));
        info!(session_id = %session_id, "Session started");

        Ok((
            SessionHandle {
                id: session_id,
                clock,
                inputs: input_tx,
                state_rx,
            },
            host_rx,
        ))
    }
}

async fn run(
    mut machine: PlaybackStateMachine,
    mut inputs: mpsc::UnboundedReceiver<SessionInput>,
    mut interceptions: mpsc::UnboundedReceiver<InterceptionEvent>,
    idle_period: std::time::Duration,
) {
    let mut idle = tokio::time::interval_at(Instant::now() + idle_period, idle_period);
    idle.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            input = inputs.recv() => match input {
                Some(SessionInput::Dispose(reply)) => {
                    let _ = reply.send(machine.dispose(Instant::now()));
                    break;
                }
                Some(input) => apply(&mut machine, input),
                None => {
                    debug!("All session handles dropped");
                    machine.dispose(Instant::now());
                    break;
                }
            },
            Some(event) = interceptions.recv() => machine.handle_interception(event),
            _ = idle.tick() => machine.idle_tick(),
        }
    }
}

fn apply(machine: &mut PlaybackStateMachine, input: SessionInput) {
    match input {
        SessionInput::Engine { kind, snapshot, at } => machine.handle_engine_event(kind, snapshot, at),
        SessionInput::Command(command) => match command {
            Command::Play => machine.play(),
            Command::Pause => machine.pause(),
            Command::Forward => machine.forward(),
            Command::Backward => machine.backward(),
            Command::Resume => machine.resume(),
            Command::Menu(event) => machine.menu(event),
            Command::PointerActivity => machine.pointer_activity(),
        },
        SessionInput::RecordInterception { identifier, record } => {
            machine.record_interception(&identifier, record)
        }
        SessionInput::Snapshot(reply) => {
            let _ = reply.send(machine.snapshot());
        }
        SessionInput::Dispose(reply) => {
            let _ = reply.send(machine.dispose(Instant::now()));
        }
    }
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    clock: PlaybackClock,
    inputs: mpsc::UnboundedSender<SessionInput>,
    state_rx: watch::Receiver<PlaybackState>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        self.inputs.send(input).map_err(|_| Error::SessionClosed)
    }

    /// Deliver an engine event; the engine is sampled now
    pub fn engine_event(&self, kind: EngineEventKind) -> Result<()> {
        self.engine_event_with(kind, self.clock.snapshot())
    }

    /// Deliver an engine event with a snapshot taken by the caller
    pub fn engine_event_with(&self, kind: EngineEventKind, snapshot: EngineSnapshot) -> Result<()> {
        self.send(SessionInput::Engine {
            kind,
            snapshot,
            at: Instant::now(),
        })
    }

    pub fn command(&self, command: Command) -> Result<()> {
        self.send(SessionInput::Command(command))
    }

    pub fn play(&self) -> Result<()> {
        self.command(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.command(Command::Pause)
    }

    pub fn forward(&self) -> Result<()> {
        self.command(Command::Forward)
    }

    pub fn backward(&self) -> Result<()> {
        self.command(Command::Backward)
    }

    /// Resume playback after handling a question
    pub fn resume(&self) -> Result<()> {
        self.command(Command::Resume)
    }

    pub fn menu(&self, event: MenuEvent) -> Result<()> {
        self.command(Command::Menu(event))
    }

    /// Mouse move / touch on the player; shows hidden controls
    pub fn pointer_activity(&self) -> Result<()> {
        self.command(Command::PointerActivity)
    }

    /// Store the outcome of a question in the viewer state
    pub fn record_interception(&self, identifier: impl Into<String>, record: InterceptionRecord) -> Result<()> {
        self.send(SessionInput::RecordInterception {
            identifier: identifier.into(),
            record,
        })
    }

    /// Snapshot taken after every previously sent input was applied
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionInput::Snapshot(tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Last published playback state
    pub fn state(&self) -> PlaybackState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_rx.clone()
    }

    /// Tear the session down and return the final viewer state
    pub async fn dispose(&self) -> Result<ViewerState> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionInput::Dispose(tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;
    use crate::heartbeat::LogHeartbeatSink;
    use crate::question::StaticQuestionService;

    fn collaborators(engine: Arc<SimulatedEngine>) -> Collaborators {
        Collaborators {
            engine,
            questions: Arc::new(StaticQuestionService::new()),
            heartbeat: Arc::new(LogHeartbeatSink),
        }
    }

    #[tokio::test]
    async fn test_spawn_announces_engine() {
        let engine = SimulatedEngine::shared(60.0);
        let (session, mut host) =
            InteractiveSession::spawn(SessionConfig::default(), collaborators(engine.clone()), ViewerState::default())
                .unwrap();

        assert!(matches!(host.recv().await, Some(HostEvent::PlayerInstance(_))));
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(!snapshot.autoplay_blocked);
        assert!(!engine.is_paused());
    }

    #[tokio::test]
    async fn test_invalid_markers_fail_spawn() {
        let engine = SimulatedEngine::shared(60.0);
        let viewer = ViewerState::with_markers(vec![
            crate::MarkerConfig {
                time: 1.0,
                duration: 2.0,
                identifier: "dup".into(),
                text: String::new(),
            },
            crate::MarkerConfig {
                time: 5.0,
                duration: 2.0,
                identifier: "dup".into(),
                text: String::new(),
            },
        ]);

        let err = InteractiveSession::spawn(SessionConfig::default(), collaborators(engine), viewer).unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_commands_after_dispose_fail() {
        let engine = SimulatedEngine::shared(60.0);
        let (session, _host) =
            InteractiveSession::spawn(SessionConfig::default(), collaborators(engine.clone()), ViewerState::default())
                .unwrap();

        session.dispose().await.unwrap();
        assert!(engine.is_disposed());

        // Give the loop a moment to drop its receiver
        tokio::task::yield_now().await;
        assert!(matches!(session.play(), Err(Error::SessionClosed)));
        assert!(matches!(session.snapshot().await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn test_dropping_handles_disposes() {
        let engine = SimulatedEngine::shared(60.0);
        let (session, mut host) =
            InteractiveSession::spawn(SessionConfig::default(), collaborators(engine.clone()), ViewerState::default())
                .unwrap();
        drop(session);

        // Host channel closes once the loop exits
        while host.recv().await.is_some() {}
        assert!(engine.is_disposed());
    }
}
