//! CLI command implementations

use crate::output::{self, OutputFormat};
use anyhow::Context;
use cuepoint_core::{
    BeaconHeartbeatSink, Collaborators, Command, EngineEventKind, HeartbeatSink, HostEvent, HostEvents,
    HttpQuestionService, InteractiveSession, InterceptionRecord, LogHeartbeatSink, MarkerConfig, MarkerRegistry,
    PlaybackState, QuestionService, SessionConfig, SessionHandle, SessionId, SimulatedEngine,
    StaticQuestionService, ViewerState,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// One step of a replay trace. Fields apply in order: wait, engine
/// position and fullscreen, event, command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceStep {
    #[serde(default)]
    pub wait_ms: Option<u64>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub fullscreen: Option<bool>,
    #[serde(default)]
    pub event: Option<EngineEventKind>,
    #[serde(default)]
    pub command: Option<Command>,
}

/// Trace file: a bare step list, or steps with the session's markers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TraceFile {
    Steps(Vec<TraceStep>),
    Session {
        #[serde(default)]
        viewer: Option<ViewerState>,
        #[serde(default)]
        markers: Vec<MarkerConfig>,
        steps: Vec<TraceStep>,
    },
}

impl TraceFile {
    fn into_parts(self) -> (ViewerState, Vec<TraceStep>) {
        match self {
            TraceFile::Steps(steps) => (ViewerState::default(), steps),
            TraceFile::Session { viewer, markers, steps } => {
                let viewer = viewer.unwrap_or_else(|| ViewerState::with_markers(markers));
                (viewer, steps)
            }
        }
    }
}

/// Marker file: a bare marker list or a stored viewer state
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MarkerFile {
    Markers(Vec<MarkerConfig>),
    Viewer(ViewerState),
}

pub struct ReplayOptions {
    pub trace: PathBuf,
    pub config: Option<PathBuf>,
    pub questions: Option<PathBuf>,
    pub question_url: Option<Url>,
    pub beacon_url: Option<Url>,
    pub duration: f64,
    pub block_autoplay: bool,
    pub score: f64,
}

/// Outcome of a replayed session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub session_id: SessionId,
    pub final_state: PlaybackState,
    pub steps: usize,
    pub questions_answered: Vec<String>,
    pub viewer: ViewerState,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Replay a trace against a simulated engine
pub async fn replay(options: ReplayOptions, format: &str) -> anyhow::Result<()> {
    let config: SessionConfig = match &options.config {
        Some(path) => read_json(path)?,
        None => SessionConfig::default(),
    };
    let (viewer, steps) = read_json::<TraceFile>(&options.trace)?.into_parts();

    let questions: Arc<dyn QuestionService> = match (&options.questions, &options.question_url) {
        (Some(path), _) => Arc::new(StaticQuestionService::from_json(read_json(path)?)?),
        (None, Some(url)) => Arc::new(HttpQuestionService::new(url.clone(), config.question_timeout())?),
        (None, None) => Arc::new(StaticQuestionService::new()),
    };
    let heartbeat: Arc<dyn HeartbeatSink> = match &options.beacon_url {
        Some(url) => Arc::new(BeaconHeartbeatSink::new(url.clone())),
        None => Arc::new(LogHeartbeatSink),
    };

    let engine = SimulatedEngine::shared(options.duration);
    engine.block_play(options.block_autoplay);

    let delay = config.interception_delay();
    let collaborators = Collaborators {
        engine: engine.clone(),
        questions,
        heartbeat,
    };
    let (session, host) = InteractiveSession::spawn(config, collaborators, viewer)?;
    info!(session_id = %session.id(), steps = steps.len(), "Replaying trace");

    let answers = tokio::spawn(answer_questions(session.clone(), host, options.score));

    for (index, step) in steps.iter().enumerate() {
        if let Some(ms) = step.wait_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if let Some(time) = step.time {
            engine.set_current_time(time);
        }
        if let Some(active) = step.fullscreen {
            engine.set_fullscreen(active);
        }
        if let Some(kind) = step.event {
            session.engine_event(kind)?;
        }
        if let Some(command) = step.command {
            if command == Command::Play {
                engine.block_play(false);
            }
            session.command(command)?;
        }
        debug!(step = index, "Trace step applied");
    }

    // Let a marker reached by the last step finish intercepting
    if session.snapshot().await?.pending_interceptions > 0 {
        tokio::time::sleep(delay + Duration::from_millis(100)).await;
    }

    let final_state = session.snapshot().await?.state;
    let viewer = session.dispose().await?;
    let questions_answered = answers.await?;

    let report = ReplayReport {
        session_id: session.id(),
        final_state,
        steps: steps.len(),
        questions_answered,
        viewer,
    };
    print_replay(&report, format)
}

/// Auto-answer every question and resume, until the session closes
async fn answer_questions(session: SessionHandle, mut host: HostEvents, score: f64) -> Vec<String> {
    let mut answered = Vec::new();
    while let Some(event) = host.recv().await {
        match event {
            HostEvent::QuestionSetData(data) => {
                info!(identifier = %data.identifier, marker_time = data.time, "Question received");
                let resumed = session
                    .record_interception(data.identifier.clone(), InterceptionRecord::answered(score))
                    .and_then(|_| session.resume());
                if let Err(e) = resumed {
                    warn!(error = %e, "Could not resume after question");
                }
                answered.push(data.identifier);
            }
            HostEvent::Fullscreen { active } => debug!(active, "Fullscreen changed"),
            HostEvent::PlayerEvent(kind) => debug!(event = %kind, "Player event"),
            HostEvent::PlayerInstance(_) => debug!("Player ready"),
        }
    }
    answered
}

fn print_replay(report: &ReplayReport, format: &str) -> anyhow::Result<()> {
    if OutputFormat::from(format) == OutputFormat::Json {
        println!("{}", output::to_json(report)?);
        return Ok(());
    }

    let viewer = &report.viewer;
    println!("Session {}", report.session_id);
    println!("  Steps replayed:   {}", report.steps);
    println!("  Final state:      {}", report.final_state);
    println!("  Watch time:       {:.1}s", viewer.visited_length as f64 / 1000.0);
    println!("  Seek distance:    {:.1}s", viewer.total_seeked_length_seconds);
    if viewer.total_length > 0.0 {
        println!(
            "  Ended at:         {} / {}",
            output::timestamp(viewer.current_length),
            output::timestamp(viewer.total_length)
        );
    }

    println!("\nInterceptions:");
    if viewer.interception_responses.is_empty() {
        println!("  (none)");
    }
    for (identifier, record) in &viewer.interception_responses {
        let outcome = if record.skipped { "skipped".to_string() } else { format!("score {}", record.score) };
        println!("  {identifier}: {outcome}");
    }

    println!("\nActions:");
    for action in &viewer.meta_data.action_log {
        println!("  {:>8} {}", output::timestamp(action.at_time), action.kind);
    }
    Ok(())
}

/// Load a marker list through the registry and report it
pub fn check_markers(path: &Path, format: &str) -> anyhow::Result<()> {
    let markers = match read_json::<MarkerFile>(path)? {
        MarkerFile::Markers(markers) => markers,
        MarkerFile::Viewer(viewer) => viewer.markers,
    };

    let registry = match MarkerRegistry::from_configs(&markers) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Invalid marker list ({}): {}", e.error_code(), e);
            return Err(e.into());
        }
    };

    if OutputFormat::from(format) == OutputFormat::Json {
        println!("{}", output::to_json(&registry.markers())?);
        return Ok(());
    }

    println!("{} markers OK", registry.len());
    for marker in registry.markers() {
        println!(
            "  {} - {}  {}  {}",
            output::timestamp(marker.time),
            output::timestamp(marker.end()),
            marker.identifier,
            marker.text
        );
    }
    Ok(())
}
