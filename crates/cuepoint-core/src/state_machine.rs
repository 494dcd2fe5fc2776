//! Playback state machine
//!
//! Sole consumer of classified engine events. Owns the playback state and
//! drives the accountant, the marker registry, the interception controller
//! and the heartbeat reporter. All methods run on the session loop, one
//! input at a time.

use crate::{
    accountant::TimeAccountant,
    clock::PlaybackClock,
    heartbeat::HeartbeatReporter,
    interception::{InterceptionEvent, MarkerInterceptionController},
    markers::{Marker, MarkerRegistry},
    session::{Collaborators, HostEvent, QuestionSetData},
    types::*,
    viewer::{InterceptionRecord, ViewerState},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// In-progress seek
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeekSession {
    /// Last stable position before the seek began
    pub anchor_time: Option<f64>,
}

impl SeekSession {
    pub fn is_open(&self) -> bool {
        self.anchor_time.is_some()
    }

    /// Open the session unless one is already open
    fn open(&mut self, anchor: f64) -> bool {
        if self.is_open() {
            return false;
        }
        self.anchor_time = Some(anchor);
        true
    }

    fn close(&mut self) -> Option<f64> {
        self.anchor_time.take()
    }
}

/// Control visibility derived from state and time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlsView {
    pub show_play: bool,
    pub show_pause: bool,
    pub show_forward: bool,
    pub show_backward: bool,
    /// Interactive controls enabled (disabled during an interception)
    pub enabled: bool,
    /// Controls not hidden by the idle timer
    pub visible: bool,
}

impl ControlsView {
    pub fn derive(
        state: PlaybackState,
        snapshot: &EngineSnapshot,
        skip_seconds: f64,
        enabled: bool,
        visible: bool,
    ) -> Self {
        let playing = state == PlaybackState::Playing;
        Self {
            show_play: !playing,
            show_pause: playing,
            show_forward: snapshot.current_time + skip_seconds <= snapshot.duration,
            show_backward: snapshot.current_time - skip_seconds >= 0.0,
            enabled,
            visible,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: PlaybackState,
    pub controls: ControlsView,
    pub autoplay_blocked: bool,
    pub seeking: bool,
    pub position: f64,
    pub markers: Vec<Marker>,
    pub pending_interceptions: usize,
    pub total_spent_time_ms: u64,
    pub total_seeked_length_seconds: f64,
    pub viewer: ViewerState,
}

/// Central playback state machine
pub struct PlaybackStateMachine {
    session_id: SessionId,
    config: SessionConfig,
    clock: PlaybackClock,
    state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
    seek: SeekSession,
    /// Position at the latest timeupdate
    last_time: f64,
    /// Position at the timeupdate before that
    previous_time: f64,
    last_snapshot: EngineSnapshot,
    autoplay_blocked: bool,
    controls_enabled: bool,
    controls_visible: bool,
    disposed: bool,
    registry: MarkerRegistry,
    accountant: TimeAccountant,
    interception: MarkerInterceptionController,
    heartbeat: HeartbeatReporter,
    viewer: ViewerState,
    host: mpsc::UnboundedSender<HostEvent>,
}

impl PlaybackStateMachine {
    /// Build the state machine. Loads the markers of `viewer` and fails on
    /// a malformed marker list. Must be called within a tokio runtime.
    pub fn new(
        session_id: SessionId,
        config: SessionConfig,
        collaborators: Collaborators,
        viewer: ViewerState,
        host: mpsc::UnboundedSender<HostEvent>,
        interceptions: mpsc::UnboundedSender<InterceptionEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = MarkerRegistry::new();
        registry.load(&viewer.markers)?;
        let recorded: Vec<String> = registry
            .markers()
            .iter()
            .filter(|m| viewer.has_interception(&m.identifier))
            .map(|m| m.identifier.clone())
            .collect();
        for identifier in &recorded {
            registry.mark_triggered(identifier);
        }

        let (state_tx, _) = watch::channel(PlaybackState::Idle);
        let clock = PlaybackClock::new(collaborators.engine);
        let last_snapshot = clock.snapshot();

        info!(
            session_id = %session_id,
            markers = registry.len(),
            already_recorded = recorded.len(),
            "Playback session created"
        );

        Ok(Self {
            session_id,
            interception: MarkerInterceptionController::new(
                config.interception_delay(),
                collaborators.questions,
                interceptions,
            ),
            heartbeat: HeartbeatReporter::new(session_id, collaborators.heartbeat),
            config,
            clock,
            state: PlaybackState::Idle,
            state_tx,
            seek: SeekSession::default(),
            last_time: 0.0,
            previous_time: 0.0,
            last_snapshot,
            autoplay_blocked: false,
            controls_enabled: true,
            controls_visible: true,
            disposed: false,
            registry,
            accountant: TimeAccountant::new(),
            viewer,
            host,
        })
    }

    /// Announce the engine to the host and attempt autoplay if configured
    pub fn start(&mut self) {
        self.emit(HostEvent::PlayerInstance(self.clock.engine().clone()));
        if self.config.autoplay {
            self.play();
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn autoplay_blocked(&self) -> bool {
        self.autoplay_blocked
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn accountant(&self) -> &TimeAccountant {
        &self.accountant
    }

    pub fn viewer(&self) -> &ViewerState {
        &self.viewer
    }

    pub fn seek_session(&self) -> SeekSession {
        self.seek
    }

    pub fn controls(&self) -> ControlsView {
        ControlsView::derive(
            self.state,
            &self.last_snapshot,
            self.config.skip_seconds,
            self.controls_enabled,
            self.controls_visible,
        )
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            state: self.state,
            controls: self.controls(),
            autoplay_blocked: self.autoplay_blocked,
            seeking: self.seek.is_open(),
            position: self.last_snapshot.current_time,
            markers: self.registry.markers().to_vec(),
            pending_interceptions: self.interception.pending(),
            total_spent_time_ms: self.accountant.total_spent_time_ms(),
            total_seeked_length_seconds: self.accountant.total_seeked_length_seconds(),
            viewer: self.viewer.clone(),
        }
    }

    // ---------------------------------------------------------------------
    // Engine events
    // ---------------------------------------------------------------------

    /// Classify one engine event and apply its side effects
    pub fn handle_engine_event(&mut self, kind: EngineEventKind, snapshot: EngineSnapshot, at: Instant) {
        if self.disposed {
            trace!(event = %kind, "Engine event after dispose ignored");
            return;
        }
        self.last_snapshot = snapshot;

        let mut reached_end = false;
        match kind {
            EngineEventKind::LoadStart => {
                self.accountant.on_state_transition(kind, &snapshot, at);
            }
            EngineEventKind::Play => {
                self.autoplay_blocked = false;
                self.enter_playing(snapshot.current_time, at);
                self.accountant.on_state_transition(kind, &snapshot, at);
            }
            EngineEventKind::Pause => {
                // Engines report `pause` around the end of media; `Ended` stays
                self.enter_paused(snapshot.current_time, at);
                self.accountant.on_state_transition(kind, &snapshot, at);
            }
            EngineEventKind::Playing => {
                if matches!(self.state, PlaybackState::Idle | PlaybackState::Paused) {
                    self.accountant.on_state_transition(kind, &snapshot, at);
                    self.set_state(PlaybackState::Playing);
                }
            }
            EngineEventKind::TimeUpdate => {
                reached_end = self.on_time_update(&snapshot);
            }
            EngineEventKind::Seeking => self.on_seeking(&snapshot),
            EngineEventKind::Seeked => self.on_seeked(&snapshot, at),
            EngineEventKind::FullscreenChange => {
                self.heartbeat.notify(HeartbeatKind::Fullscreen, snapshot.current_time);
                self.emit(HostEvent::Fullscreen {
                    active: snapshot.is_fullscreen,
                });
            }
            EngineEventKind::Ended => {
                self.on_ended(&snapshot, at);
            }
            EngineEventKind::RateChange => {
                if !self.config.playback_rates.contains(&snapshot.playback_rate) {
                    debug!(rate = snapshot.playback_rate, "Playback rate outside configured rates");
                }
            }
            EngineEventKind::Error => {
                warn!(position = snapshot.current_time, "Engine reported an error");
            }
            EngineEventKind::DurationChange
            | EngineEventKind::Progress
            | EngineEventKind::VolumeChange => {}
        }
        self.emit(HostEvent::PlayerEvent(kind));

        if reached_end && self.on_ended(&snapshot, at) {
            self.emit(HostEvent::PlayerEvent(EngineEventKind::Ended));
        }
    }

    /// Returns true when the update lands exactly on the end of media
    fn on_time_update(&mut self, snapshot: &EngineSnapshot) -> bool {
        let time = snapshot.current_time;
        self.previous_time = self.last_time;
        self.last_time = time;

        if !self.seek.is_open() && self.state != PlaybackState::Ended {
            let reached: Vec<(String, f64)> = self
                .registry
                .markers_in_range(time)
                .into_iter()
                .filter(|m| m.is_armed())
                .map(|m| (m.identifier.clone(), m.time))
                .collect();

            for (identifier, marker_time) in reached {
                if self.registry.mark_triggered(&identifier) {
                    info!(identifier = %identifier, marker_time, position = time, "Marker reached");
                    self.interception.schedule(identifier, marker_time);
                }
            }
        }

        snapshot.duration > 0.0
            && (time - snapshot.duration).abs() <= self.config.end_of_media_epsilon
            && self.state != PlaybackState::Ended
    }

    /// Last stable position before a jump to `current`. If the engine already
    /// reported the jump target in a timeupdate, the update before it is used.
    fn stable_anchor(&self, current: f64) -> f64 {
        if current == self.last_time {
            self.previous_time
        } else {
            self.last_time
        }
    }

    fn on_seeking(&mut self, snapshot: &EngineSnapshot) {
        let anchor = self.stable_anchor(snapshot.current_time);
        if self.seek.open(anchor) {
            debug!(anchor, target = snapshot.current_time, "Seek started");
        }

        for identifier in self.interception.invalidate() {
            if self.registry.mark_cancelled(&identifier) {
                info!(identifier = %identifier, "Interception cancelled by seek");
                self.viewer.record_if_absent(&identifier, InterceptionRecord::skipped());
            }
        }
    }

    fn on_seeked(&mut self, snapshot: &EngineSnapshot, at: Instant) {
        let resolved = snapshot.current_time;
        let anchor = self
            .seek
            .close()
            .unwrap_or_else(|| self.stable_anchor(resolved));

        self.accountant.on_state_transition(EngineEventKind::Seeked, snapshot, at);
        let total = self.accountant.record_seek(anchor, resolved);

        for identifier in self.registry.mark_skipped(resolved) {
            info!(identifier = %identifier, position = resolved, "Marker skipped by seek");
            self.viewer.record_if_absent(&identifier, InterceptionRecord::skipped());
        }

        self.last_time = resolved;
        self.previous_time = resolved;
        self.viewer.sync_from(&self.accountant);
        debug!(anchor, resolved, total_seeked = total, "Seek completed");
    }

    /// Returns true if this call performed the transition to `Ended`
    fn on_ended(&mut self, snapshot: &EngineSnapshot, at: Instant) -> bool {
        if self.state == PlaybackState::Ended {
            return false;
        }
        self.set_state(PlaybackState::Ended);
        self.accountant.on_state_transition(EngineEventKind::Ended, snapshot, at);

        self.viewer.sync_from(&self.accountant);
        self.viewer.current_length = snapshot.current_time;
        self.viewer.total_length = snapshot.duration;

        info!(
            visited_ms = self.viewer.visited_length,
            total_length = snapshot.duration,
            total_seeked = self.viewer.total_seeked_length_seconds,
            "Playback ended"
        );
        true
    }

    // ---------------------------------------------------------------------
    // Interception
    // ---------------------------------------------------------------------

    /// Apply a completed interception delay or question fetch
    pub fn handle_interception(&mut self, event: InterceptionEvent) {
        if self.disposed {
            debug!("Interception completion after dispose ignored");
            return;
        }

        match event {
            InterceptionEvent::Due { identifier, time, epoch } => {
                if !self.interception.accept(&identifier, epoch) || self.registry.is_skipped(&identifier) {
                    debug!(identifier = %identifier, epoch, "Stale interception dropped");
                    return;
                }

                info!(identifier = %identifier, marker_time = time, "Intercepting playback");
                self.pause();
                self.set_controls_enabled(false);
                self.interception.fetch(identifier, time);
            }
            InterceptionEvent::Fetched { identifier, time, result } => match result {
                Ok(response) => {
                    info!(identifier = %identifier, "Question set ready");
                    self.emit(HostEvent::QuestionSetData(QuestionSetData {
                        response,
                        time,
                        identifier,
                    }));
                }
                Err(e) => {
                    warn!(
                        identifier = %identifier,
                        code = e.error_code(),
                        error = %e,
                        "Question fetch failed, resuming playback"
                    );
                    self.play();
                    self.set_controls_enabled(true);
                }
            },
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    pub fn play(&mut self) {
        match self.clock.engine().play() {
            Ok(()) => self.enter_playing(self.clock.current_time(), Instant::now()),
            Err(e) => self.on_play_rejected(e),
        }
    }

    pub fn pause(&mut self) {
        self.clock.engine().pause();
        self.enter_paused(self.clock.current_time(), Instant::now());
    }

    pub fn forward(&mut self) {
        let snapshot = self.clock.snapshot();
        let mut target = snapshot.current_time + self.config.skip_seconds;
        if snapshot.duration > 0.0 {
            target = target.min(snapshot.duration);
        }
        self.jump(target, HeartbeatKind::Forward);
    }

    pub fn backward(&mut self) {
        let target = (self.clock.current_time() - self.config.skip_seconds).max(0.0);
        self.jump(target, HeartbeatKind::Backward);
    }

    fn jump(&mut self, target: f64, kind: HeartbeatKind) {
        self.clock.engine().seek(target);
        self.last_snapshot = self.clock.snapshot();
        self.heartbeat.notify(kind, target);
        debug!(kind = %kind, target, "Skip requested");
    }

    /// Host finished with a question: play and re-enable controls
    pub fn resume(&mut self) {
        self.play();
        self.set_controls_enabled(true);
    }

    pub fn menu(&mut self, event: MenuEvent) {
        match event {
            MenuEvent::OpenMenu => self.pause(),
            MenuEvent::CloseMenu => self.play(),
        }
    }

    /// Store the host's outcome for a marker's question
    pub fn record_interception(&mut self, identifier: &str, record: InterceptionRecord) {
        self.viewer
            .interception_responses
            .insert(identifier.to_string(), record);
    }

    pub fn pointer_activity(&mut self) {
        self.controls_visible = true;
    }

    /// Idle timer tick: hide controls unless paused or autoplay was blocked
    pub fn idle_tick(&mut self) {
        if !self.autoplay_blocked && self.state != PlaybackState::Paused {
            self.controls_visible = false;
        }
    }

    /// Tear the session down. Returns the final viewer state.
    pub fn dispose(&mut self, at: Instant) -> ViewerState {
        if !self.disposed {
            self.disposed = true;
            self.interception.shutdown();
            self.accountant.close_interval(at);
            self.viewer.sync_from(&self.accountant);
            self.heartbeat.close();
            self.clock.engine().dispose();
            info!(session_id = %self.session_id, "Session disposed");
        }
        self.viewer.clone()
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn set_state(&mut self, new_state: PlaybackState) -> bool {
        if self.state == new_state {
            return false;
        }
        info!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
        self.state_tx.send_replace(new_state);
        true
    }

    /// Opens the watch interval; an engine echo of the same transition is a no-op
    fn enter_playing(&mut self, position: f64, at: Instant) {
        self.accountant.open_interval(at);
        if self.set_state(PlaybackState::Playing) {
            self.heartbeat.notify(HeartbeatKind::Play, position);
        }
    }

    /// `Ended` is left only by an explicit play
    fn enter_paused(&mut self, position: f64, at: Instant) {
        self.accountant.close_interval(at);
        if self.state == PlaybackState::Ended {
            return;
        }
        if self.set_state(PlaybackState::Paused) {
            self.heartbeat.notify(HeartbeatKind::Pause, position);
        }
    }

    fn on_play_rejected(&mut self, error: Error) {
        match error {
            Error::AutoplayBlocked => {
                warn!("Playback blocked by the engine, waiting for the viewer");
                self.autoplay_blocked = true;
            }
            other => warn!(code = other.error_code(), error = %other, "Play command failed"),
        }
    }

    fn set_controls_enabled(&mut self, enabled: bool) {
        self.controls_enabled = enabled;
        self.clock.engine().set_controls(enabled);
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.host.send(event);
    }
}
