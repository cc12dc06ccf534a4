use crate::recording::{Recording, RecordingBuffer};
use motion_config::{AppConfig, GyroConfig, MountingProfile, RecordPolicy};
use motion_imu::{
    codec, LiveQueueSource, MotionSource, RecordedSequenceSource, SourceKind, TemporalFilter,
};
use motion_pose::{Pose, PoseComposer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

/// Ticks between debug heartbeats (10 s at the default tick).
const HEARTBEAT_TICKS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("No motion source selected")]
    NoSource,
    #[error("Recorded sequence has no frames")]
    EmptySequence,
    #[error("Cannot {op} while {state:?}")]
    InvalidTransition {
        op: &'static str,
        state: PlaybackState,
    },
    #[error("Recording requires live polling to be running")]
    NotLive,
    #[error("A recording is already in progress")]
    AlreadyRecording,
    #[error("No recording in progress")]
    NotRecording,
    #[error("Playback task is no longer running")]
    TaskStopped,
    #[error("Playback task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Commands sent to the tick task.
enum TickCommand {
    Stop,
    StartRecording,
    StopRecording(oneshot::Sender<Recording>),
    SetFilter(bool),
}

/// Why the tick task returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickExit {
    Stopped,
    Exhausted,
}

/// Mutable playback state. Owned by the tick task while running, by the controller otherwise.
struct Session {
    source: MotionSource,
    filter: TemporalFilter,
    buffer: RecordingBuffer,
    recording: bool,
}

impl Session {
    fn new(source: MotionSource, filter_enabled: bool) -> Self {
        Self {
            source,
            filter: TemporalFilter::new(filter_enabled),
            buffer: RecordingBuffer::new(),
            recording: false,
        }
    }
}

#[derive(Debug, Clone)]
struct TickSettings {
    period: Duration,
    gyro: GyroConfig,
    live_mounting: MountingProfile,
    recorded_mounting: MountingProfile,
    record_policy: RecordPolicy,
}

impl TickSettings {
    fn from_config(config: &AppConfig) -> Self {
        Self {
            period: Duration::from_millis(config.playback.tick_ms.max(1)),
            gyro: config.gyro,
            live_mounting: config.pose.live_mounting,
            recorded_mounting: config.pose.recorded_mounting,
            record_policy: config.playback.record_policy,
        }
    }
}

struct TickContext {
    composer: Arc<PoseComposer>,
    pose_tx: Arc<watch::Sender<Pose>>,
    settings: TickSettings,
}

struct TickTask {
    command_tx: mpsc::UnboundedSender<TickCommand>,
    handle: JoinHandle<(Session, TickExit)>,
}

/// Drives a motion source on a fixed tick and publishes the resulting pose.
///
/// One tick task runs at a time. It owns the source, filter and recording
/// buffer while running and hands them back when stopped, so a stale tick can
/// never touch a replaced source. Consumers read the latest pose through
/// [`subscribe`](Self::subscribe) or [`pose`](Self::pose).
pub struct PlaybackController {
    settings: TickSettings,
    composer: Arc<PoseComposer>,
    pose_tx: Arc<watch::Sender<Pose>>,
    state: PlaybackState,
    source_kind: Option<SourceKind>,
    filter_enabled: bool,
    recording: bool,
    session: Option<Session>,
    task: Option<TickTask>,
}

impl PlaybackController {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_composer(config, PoseComposer::new(&config.pose))
    }

    /// Use a composer prepared elsewhere, e.g. with the asset's measured centre.
    pub fn with_composer(config: &AppConfig, composer: PoseComposer) -> Self {
        let (pose_tx, _) = watch::channel(composer.base_pose());
        Self {
            settings: TickSettings::from_config(config),
            composer: Arc::new(composer),
            pose_tx: Arc::new(pose_tx),
            state: PlaybackState::Idle,
            source_kind: None,
            filter_enabled: config.playback.filter_enabled,
            recording: false,
            session: None,
            task: None,
        }
    }

    pub fn composer(&self) -> &PoseComposer {
        &self.composer
    }

    /// Watch the published pose.
    pub fn subscribe(&self) -> watch::Receiver<Pose> {
        self.pose_tx.subscribe()
    }

    /// The most recently published pose (non-blocking).
    pub fn pose(&self) -> Pose {
        self.pose_tx.borrow().clone()
    }

    /// Current state. A recorded sequence that ran out reports `Paused`
    /// even before the controller has joined its task.
    pub fn state(&self) -> PlaybackState {
        if self.state == PlaybackState::Running && self.task_finished() {
            PlaybackState::Paused
        } else {
            self.state
        }
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source_kind
    }

    pub fn is_recording(&self) -> bool {
        self.recording && self.state() == PlaybackState::Running
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }

    /// Cursor of a recorded source, when it is not being played.
    pub fn cursor(&self) -> Option<usize> {
        match &self.session.as_ref()?.source {
            MotionSource::Recorded(seq) => Some(seq.cursor()),
            MotionSource::Live(_) => None,
        }
    }

    /// Samples held in the recording buffer, when it is not being played.
    pub fn buffered_samples(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.buffer.len())
    }

    /// Replace the active source. Any running playback is stopped first and
    /// the controller returns to `Idle` showing the base pose.
    pub async fn set_source(&mut self, source: impl Into<MotionSource>) -> Result<(), ControllerError> {
        let stopped = self.halt().await;

        let source = source.into();
        let kind = source.kind();
        self.session = Some(Session::new(source, self.filter_enabled));
        self.source_kind = Some(kind);
        self.recording = false;
        self.state = PlaybackState::Idle;
        self.pose_tx.send_replace(self.composer.base_pose());
        tracing::info!(?kind, "Motion source selected");

        stopped
    }

    /// Make a live queue the active source.
    pub async fn use_live(&mut self, source: LiveQueueSource) -> Result<(), ControllerError> {
        self.set_source(source).await
    }

    /// Make a recorded sequence the active source.
    pub async fn use_recorded(&mut self, source: RecordedSequenceSource) -> Result<(), ControllerError> {
        self.set_source(source).await
    }

    /// Begin or resume ticking.
    ///
    /// A recorded source resumes from its cursor, or from the first frame if
    /// it had already run out.
    pub async fn start(&mut self) -> Result<(), ControllerError> {
        self.settle().await?;
        if self.state == PlaybackState::Running {
            return Err(ControllerError::InvalidTransition {
                op: "start",
                state: self.state,
            });
        }

        let Some(session) = self.session.as_mut() else {
            return Err(ControllerError::NoSource);
        };
        match &mut session.source {
            MotionSource::Recorded(seq) if seq.is_empty() => {
                return Err(ControllerError::EmptySequence);
            }
            MotionSource::Recorded(seq) => {
                if seq.is_exhausted() {
                    seq.reset();
                }
            }
            MotionSource::Live(_) => session.filter.clear(),
        }
        session.recording = false;
        session.filter.set_enabled(self.filter_enabled);

        let Some(session) = self.session.take() else {
            return Err(ControllerError::NoSource);
        };
        tracing::info!(kind = ?session.source.kind(), "Playback started");
        self.spawn(session);
        self.recording = false;
        self.state = PlaybackState::Running;
        Ok(())
    }

    /// Stop ticking, keeping the cursor. Returns once no further tick can run.
    ///
    /// An active recording stops capturing; its samples stay available to
    /// [`record_stop`](Self::record_stop).
    pub async fn pause(&mut self) -> Result<(), ControllerError> {
        self.settle().await?;
        match self.state {
            PlaybackState::Paused => return Ok(()),
            PlaybackState::Idle => {
                return Err(ControllerError::InvalidTransition {
                    op: "pause",
                    state: self.state,
                })
            }
            PlaybackState::Running => {}
        }

        self.halt().await?;
        self.mark_paused();
        tracing::info!(cursor = ?self.cursor(), "Playback paused");
        Ok(())
    }

    /// Stop ticking, rewind, clear filter history and recording, and show the base pose.
    /// Valid from any state.
    pub async fn reset(&mut self) -> Result<(), ControllerError> {
        let stopped = self.halt().await;

        if let Some(session) = self.session.as_mut() {
            session.source.reset();
            session.filter.clear();
            session.buffer.clear();
            session.recording = false;
        }
        self.recording = false;
        self.state = PlaybackState::Idle;
        self.pose_tx.send_replace(self.composer.base_pose());
        tracing::info!("Playback reset");

        stopped
    }

    /// Start capturing live samples. Only valid while live polling runs.
    /// Rejection leaves state and buffer untouched.
    pub async fn record_start(&mut self) -> Result<(), ControllerError> {
        self.settle().await?;
        if self.state != PlaybackState::Running || self.source_kind != Some(SourceKind::Live) {
            return Err(ControllerError::NotLive);
        }
        if self.recording {
            return Err(ControllerError::AlreadyRecording);
        }

        let task = self.task.as_ref().ok_or(ControllerError::TaskStopped)?;
        task.command_tx
            .send(TickCommand::StartRecording)
            .map_err(|_| ControllerError::TaskStopped)?;
        self.recording = true;
        Ok(())
    }

    /// Stop capturing and hand back everything recorded.
    ///
    /// After a pause interrupted a recording, the retained samples are returned here.
    pub async fn record_stop(&mut self) -> Result<Recording, ControllerError> {
        self.settle().await?;

        if self.recording && self.state == PlaybackState::Running {
            let task = self.task.as_ref().ok_or(ControllerError::TaskStopped)?;
            let (reply_tx, reply_rx) = oneshot::channel();
            task.command_tx
                .send(TickCommand::StopRecording(reply_tx))
                .map_err(|_| ControllerError::TaskStopped)?;
            self.recording = false;

            let recording = reply_rx.await.map_err(|_| ControllerError::TaskStopped)?;
            tracing::info!(samples = recording.len(), "Recording stopped");
            return Ok(recording);
        }

        if self.state == PlaybackState::Paused {
            if let Some(session) = self.session.as_mut() {
                if !session.buffer.is_empty() {
                    let recording = session.buffer.take();
                    tracing::info!(samples = recording.len(), "Recording collected after pause");
                    return Ok(recording);
                }
            }
        }

        Err(ControllerError::NotRecording)
    }

    /// Toggle the temporal filter. History keeps accumulating either way.
    pub fn set_filter_enabled(&mut self, enabled: bool) {
        self.filter_enabled = enabled;
        if let Some(task) = self.task.as_ref() {
            let _ = task.command_tx.send(TickCommand::SetFilter(enabled));
        } else if let Some(session) = self.session.as_mut() {
            session.filter.set_enabled(enabled);
        }
        tracing::debug!(enabled, "Temporal filter toggled");
    }

    /// Wait until a running recorded sequence plays its last frame.
    ///
    /// Cancel-safe: dropping the future leaves playback running.
    pub async fn wait_for_end(&mut self) -> Result<(), ControllerError> {
        match (self.state, self.source_kind) {
            (PlaybackState::Running, Some(SourceKind::Recorded)) => {}
            (state, _) => {
                return Err(ControllerError::InvalidTransition {
                    op: "wait for end",
                    state,
                })
            }
        }

        if self.join_task().await? == Some(TickExit::Exhausted) {
            self.mark_paused();
        }
        Ok(())
    }

    fn spawn(&mut self, session: Session) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let ctx = TickContext {
            composer: Arc::clone(&self.composer),
            pose_tx: Arc::clone(&self.pose_tx),
            settings: self.settings.clone(),
        };
        let handle = tokio::spawn(tick_loop(session, ctx, command_rx));
        self.task = Some(TickTask { command_tx, handle });
    }

    fn task_finished(&self) -> bool {
        self.task.as_ref().is_some_and(|t| t.handle.is_finished())
    }

    /// Join a task that ended on its own (end of sequence) and fold its result back in.
    async fn settle(&mut self) -> Result<(), ControllerError> {
        if self.task_finished() {
            self.join_task().await?;
            self.mark_paused();
        }
        Ok(())
    }

    /// Ask the task to stop and reclaim its session.
    async fn halt(&mut self) -> Result<(), ControllerError> {
        if let Some(task) = self.task.as_ref() {
            let _ = task.command_tx.send(TickCommand::Stop);
        }
        self.join_task().await.map(|_| ())
    }

    /// Await the task in place; the handle is only dropped once it has resolved.
    async fn join_task(&mut self) -> Result<Option<TickExit>, ControllerError> {
        let Some(task) = self.task.as_mut() else {
            return Ok(None);
        };
        let joined = (&mut task.handle).await;
        self.task = None;

        match joined {
            Ok((session, exit)) => {
                self.session = Some(session);
                Ok(Some(exit))
            }
            Err(e) => {
                tracing::error!(?e, "Playback task failed, source dropped");
                self.session = None;
                self.source_kind = None;
                self.recording = false;
                self.state = PlaybackState::Idle;
                Err(e.into())
            }
        }
    }

    fn mark_paused(&mut self) {
        self.state = PlaybackState::Paused;
        self.recording = false;
        if let Some(session) = self.session.as_mut() {
            session.recording = false;
        }
    }
}

/// Background task: one tick per period until stopped or out of frames.
async fn tick_loop(
    mut session: Session,
    ctx: TickContext,
    mut command_rx: mpsc::UnboundedReceiver<TickCommand>,
) -> (Session, TickExit) {
    let mut interval = tokio::time::interval(ctx.settings.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick_count: u64 = 0;

    let exit = loop {
        tokio::select! {
            biased;
            cmd = command_rx.recv() => match cmd {
                Some(TickCommand::Stop) | None => break TickExit::Stopped,
                Some(TickCommand::StartRecording) => {
                    session.buffer.clear();
                    session.recording = true;
                    tracing::info!("Recording started");
                }
                Some(TickCommand::StopRecording(reply)) => {
                    session.recording = false;
                    let _ = reply.send(session.buffer.take());
                }
                Some(TickCommand::SetFilter(enabled)) => session.filter.set_enabled(enabled),
            },
            _ = interval.tick() => {
                let advanced = match &mut session.source {
                    MotionSource::Recorded(seq) => recorded_tick(seq, &ctx),
                    MotionSource::Live(live) => {
                        let buffer = session.recording.then_some(&mut session.buffer);
                        live_tick(live, &mut session.filter, buffer, &ctx).await;
                        true
                    }
                };
                if !advanced {
                    break TickExit::Exhausted;
                }

                tick_count += 1;
                if tick_count % HEARTBEAT_TICKS == 0 {
                    tracing::debug!(tick_count, "Playback ticks processed");
                }
            }
        }
    };

    (session, exit)
}

/// Publish the next recorded frame. Returns false once the sequence has run out.
fn recorded_tick(seq: &mut RecordedSequenceSource, ctx: &TickContext) -> bool {
    let Some(frame) = seq.poll_next() else {
        tracing::info!(frames = seq.len(), "Recorded sequence finished");
        return false;
    };
    let sample = frame.decode(ctx.settings.gyro.recorded);
    ctx.pose_tx
        .send_replace(ctx.composer.compose(&sample, ctx.settings.recorded_mounting));
    true
}

/// Drain the live queue, publish a pose for the newest sample and record per policy.
async fn live_tick(
    live: &mut LiveQueueSource,
    filter: &mut TemporalFilter,
    buffer: Option<&mut RecordingBuffer>,
    ctx: &TickContext,
) {
    // Only an every-drained recording needs the backlog; otherwise keep just the newest.
    let polled = match buffer {
        Some(buffer) if ctx.settings.record_policy == RecordPolicy::EveryDrained => {
            let mut latest = None;
            let drained = live
                .drain_with(|sample| {
                    latest = Some(sample.clone());
                    buffer.push(sample);
                })
                .await;
            drained.map(|_| latest)
        }
        Some(buffer) => live.poll_next().await.map(|latest| {
            if let Some(sample) = &latest {
                buffer.push(sample.clone());
            }
            latest
        }),
        None => live.poll_next().await,
    };
    let latest = match polled {
        Ok(Some(latest)) => latest,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(%e, "Live queue poll failed");
            return;
        }
    };

    let smoothed = filter.push(latest);
    let sample = codec::decode_live_sample(&smoothed, ctx.settings.gyro.live);
    ctx.pose_tx
        .send_replace(ctx.composer.compose(&sample, ctx.settings.live_mounting));
}
