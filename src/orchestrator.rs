//! One read at a time, from request to teardown.
//!
//! ```text
//! idle ──▶ requesting ──▶ loading ──▶ playing ──▶ idle   (ended / failed)
//!   ▲           │             │           │
//!   └───────────┴─────────────┴───────────┘  stop or a newer request
//! ```
//!
//! Every accepted request gets a generation number. The request's driver task
//! checks its generation under the `active` lock before touching shared state,
//! so responses and audio events of a superseded read are dropped. Teardown
//! of the previous read is synchronous and finishes inside
//! [`ReadAloudOrchestrator::submit_read_request`], before the new request's
//! synthesis call can be issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::error::{ErrorKind, PlaybackError, ReadError};
use crate::playback::{AudioBackend, PlaybackSession, SessionEvent};
use crate::scheduler::{HighlightScheduler, HighlightSurface, SchedulePlan};
use crate::segment::Segment;
use crate::synthesis::{SpeechSynthesizer, SynthesisRequest};
use crate::timing::TimingModel;
use crate::{ReadRequest, ReadingMode, SegmentId};

/// Notifications for the UI layer. Dropping the receiver unsubscribes.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// The request was accepted and speech is being fetched.
    ReadRequested { segment_id: SegmentId },
    /// Audio started playing.
    ReadStarted { segment_id: SegmentId },
    WordHighlighted { segment_id: SegmentId, index: usize },
    ReadEnded { segment_id: SegmentId },
    ReadFailed {
        segment_id: SegmentId,
        kind: ErrorKind,
        message: String,
        hint: Option<String>,
    },
    /// Stopped by the user or replaced by a newer request.
    ReadCancelled { segment_id: SegmentId },
}

impl ReaderEvent {
    pub fn segment_id(&self) -> &SegmentId {
        match self {
            ReaderEvent::ReadRequested { segment_id }
            | ReaderEvent::ReadStarted { segment_id }
            | ReaderEvent::WordHighlighted { segment_id, .. }
            | ReaderEvent::ReadEnded { segment_id }
            | ReaderEvent::ReadFailed { segment_id, .. }
            | ReaderEvent::ReadCancelled { segment_id } => segment_id,
        }
    }
}

/// Where the active read is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Idle,
    Requesting,
    Loading,
    Playing,
}

/// Values applied to the next read started through [`ReadAloudOrchestrator::read_segment`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSettings {
    pub voice_id: Option<String>,
    pub mode: ReadingMode,
    pub speed_multiplier: f64,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            voice_id: None,
            mode: ReadingMode::Normal,
            speed_multiplier: 1.0,
        }
    }
}

struct ActiveRead {
    generation: u64,
    segment_id: SegmentId,
    state: ReadState,
    session: Option<PlaybackSession>,
    scheduler: Option<HighlightScheduler>,
    driver: Option<JoinHandle<()>>,
}

impl ActiveRead {
    /// Hard stop: highlight first, then audio, then the driver.
    fn teardown(mut self, abort_driver: bool) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(session) = self.session.take() {
            session.stop();
        }
        if let Some(driver) = self.driver.take() {
            if abort_driver {
                driver.abort();
            }
        }
    }
}

struct Shared {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    backend: Arc<dyn AudioBackend>,
    surface: Arc<dyn HighlightSurface>,
    timing: TimingModel,
    settings: Mutex<ReaderSettings>,
    active: Mutex<Option<ActiveRead>>,
    generation: AtomicU64,
    events: broadcast::Sender<ReaderEvent>,
}

impl Shared {
    fn emit(&self, event: ReaderEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|read| read.generation == generation)
    }

    /// Tear down whatever read is active. Returns its segment, if there was one.
    fn stop_active(&self) -> Option<SegmentId> {
        let read = self.active.lock().take()?;
        Some(self.cancel(read))
    }

    fn cancel(&self, read: ActiveRead) -> SegmentId {
        let segment_id = read.segment_id.clone();
        log::info!("Stopping read of {segment_id}");
        read.teardown(true);
        self.emit(ReaderEvent::ReadCancelled {
            segment_id: segment_id.clone(),
        });
        segment_id
    }

    async fn drive(self: Arc<Self>, generation: u64, request: ReadRequest) {
        if let Err(e) = self.run(generation, &request).await {
            self.fail(generation, &request.segment_id, e);
        }
    }

    async fn run(&self, generation: u64, request: &ReadRequest) -> Result<(), ReadError> {
        let speech = self
            .synthesizer
            .synthesize(&SynthesisRequest::from(request))
            .await?;

        if !self.is_current(generation) {
            log::debug!("Dropping speech for superseded read of {}", request.segment_id);
            return Ok(());
        }
        if let Some(message) = speech.error {
            return Err(ReadError::Synthesis(message));
        }
        if speech.audio.is_empty() {
            return Err(ReadError::EmptyAudio);
        }

        let rate = self
            .timing
            .config()
            .effective_playback_rate(speech.playback_rate);
        let (session, mut audio_events) =
            PlaybackSession::start(self.backend.as_ref(), speech.audio, rate)?;

        {
            let mut active = self.active.lock();
            match active.as_mut().filter(|read| read.generation == generation) {
                Some(read) => {
                    read.session = Some(session.clone());
                    read.state = ReadState::Loading;
                }
                None => {
                    session.stop();
                    return Ok(());
                }
            }
        }

        while let Some(event) = audio_events.recv().await {
            match session.observe(event) {
                Some(SessionEvent::Playing) => self.on_playing(generation, request, &session),
                Some(SessionEvent::Ended) => {
                    self.finish(generation);
                    return Ok(());
                }
                Some(SessionEvent::Failed(e)) => return Err(e.into()),
                None => {}
            }
        }

        // stop() releases the player, which closes the channel
        if session.status().is_terminal() {
            return Ok(());
        }
        Err(PlaybackError::Failed("audio backend stopped reporting".to_string()).into())
    }

    fn on_playing(&self, generation: u64, request: &ReadRequest, session: &PlaybackSession) {
        let mut active = self.active.lock();
        let Some(read) = active.as_mut().filter(|read| read.generation == generation) else {
            return;
        };

        let plan = SchedulePlan::new(
            request.mode,
            request.speed_multiplier,
            session.duration_ms(),
            session.playback_rate(),
            session.reports_position(),
            self.timing.config().position_sampling,
        );
        log::info!(
            "Reading {} ({} words) with {:?} timing at rate {}",
            request.segment_id,
            request.words.len(),
            plan.strategy,
            plan.playback_rate
        );

        let events = self.events.clone();
        let segment_id = request.segment_id.clone();
        let mut scheduler = HighlightScheduler::new(
            request.words.clone().into(),
            self.surface.clone(),
            self.timing.clone(),
            plan,
        )
        .with_listener(Arc::new(move |index| {
            let _ = events.send(ReaderEvent::WordHighlighted {
                segment_id: segment_id.clone(),
                index,
            });
        }));
        scheduler.start(Arc::new(session.clone()));

        read.scheduler = Some(scheduler);
        read.state = ReadState::Playing;
        self.emit(ReaderEvent::ReadStarted {
            segment_id: request.segment_id.clone(),
        });
    }

    fn finish(&self, generation: u64) {
        let mut active = self.active.lock();
        if !active.as_ref().is_some_and(|read| read.generation == generation) {
            return;
        }
        let Some(read) = active.take() else {
            return;
        };
        drop(active);

        let segment_id = read.segment_id.clone();
        read.teardown(false);
        log::info!("Finished reading {segment_id}");
        self.emit(ReaderEvent::ReadEnded { segment_id });
    }

    fn fail(&self, generation: u64, segment_id: &SegmentId, error: ReadError) {
        let read = {
            let mut active = self.active.lock();
            if !active.as_ref().is_some_and(|read| read.generation == generation) {
                log::debug!("Ignoring failure of superseded read of {segment_id}: {error}");
                return;
            }
            active.take()
        };
        if let Some(read) = read {
            read.teardown(false);
        }
        self.report_failure(segment_id, error);
    }

    fn report_failure(&self, segment_id: &SegmentId, error: ReadError) {
        log::error!("Read of {segment_id} failed: {error}");
        let hint = match &error {
            ReadError::Playback(e) => e.hint().map(str::to_string),
            _ => None,
        };
        self.emit(ReaderEvent::ReadFailed {
            segment_id: segment_id.clone(),
            kind: error.kind(),
            message: error.to_string(),
            hint,
        });
    }
}

/// Entry point for the UI layer.
///
/// Must be used from within a tokio runtime: each accepted request spawns one
/// driver task.
pub struct ReadAloudOrchestrator {
    shared: Arc<Shared>,
}

impl ReadAloudOrchestrator {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        backend: Arc<dyn AudioBackend>,
        surface: Arc<dyn HighlightSurface>,
        config: EngineConfig,
    ) -> Result<Self, ReadError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            shared: Arc::new(Shared {
                synthesizer,
                backend,
                surface,
                timing: TimingModel::new(config),
                settings: Mutex::new(ReaderSettings::default()),
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
                events,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReaderEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &EngineConfig {
        self.shared.timing.config()
    }

    /// Start reading `request`, replacing any read in progress.
    ///
    /// The previous read is fully torn down before this returns. An invalid
    /// request fails immediately with a validation error and makes no call
    /// to the speech service.
    pub fn submit_read_request(&self, request: ReadRequest) {
        // one lock for teardown and install, so concurrent submits cannot
        // replace a read without cancelling it
        let mut active = self.shared.active.lock();
        if let Some(previous) = active.take() {
            let previous = self.shared.cancel(previous);
            log::info!("Read of {previous} superseded by {}", request.segment_id);
        }

        if let Err(e) = request.validate() {
            drop(active);
            self.shared.report_failure(&request.segment_id, e);
            return;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let segment_id = request.segment_id.clone();
        log::info!(
            "Read {generation}: {segment_id}, {} words, mode={}, voice={}",
            request.words.len(),
            request.mode,
            request.voice_id
        );

        self.shared.emit(ReaderEvent::ReadRequested {
            segment_id: segment_id.clone(),
        });

        // the driver checks its generation under this lock, so it cannot
        // observe a missing read
        let driver = tokio::spawn(self.shared.clone().drive(generation, request));
        *active = Some(ActiveRead {
            generation,
            segment_id,
            state: ReadState::Requesting,
            session: None,
            scheduler: None,
            driver: Some(driver),
        });
    }

    /// Read a segment with the current settings.
    pub fn read_segment(&self, segment: &Segment) {
        let settings = self.settings();
        let request = segment.read_request(
            settings.voice_id.unwrap_or_default(),
            settings.mode,
            settings.speed_multiplier,
        );
        self.submit_read_request(request);
    }

    /// Stop the current read, if any. Returns whether something was stopped.
    pub fn stop_current_read(&self) -> bool {
        self.shared.stop_active().is_some()
    }

    pub fn state(&self) -> ReadState {
        self.shared
            .active
            .lock()
            .as_ref()
            .map_or(ReadState::Idle, |read| read.state)
    }

    pub fn active_segment(&self) -> Option<SegmentId> {
        self.shared
            .active
            .lock()
            .as_ref()
            .map(|read| read.segment_id.clone())
    }

    /// True while a highlight tick or frame is scheduled.
    pub fn has_pending_highlight(&self) -> bool {
        self.shared
            .active
            .lock()
            .as_ref()
            .and_then(|read| read.scheduler.as_ref())
            .is_some_and(HighlightScheduler::has_pending_work)
    }

    pub fn settings(&self) -> ReaderSettings {
        self.shared.settings.lock().clone()
    }

    pub fn set_voice(&self, voice_id: impl Into<String>) {
        self.shared.settings.lock().voice_id = Some(voice_id.into());
    }

    /// Takes effect from the next read; the current one keeps its mode.
    pub fn set_mode(&self, mode: ReadingMode) {
        log::debug!("Reading mode set to {mode}");
        self.shared.settings.lock().mode = mode;
    }

    /// Takes effect from the next read; non-positive values are ignored.
    pub fn set_speed(&self, speed_multiplier: f64) {
        if speed_multiplier.is_finite() && speed_multiplier > 0.0 {
            self.shared.settings.lock().speed_multiplier = speed_multiplier;
        } else {
            log::warn!("Ignoring invalid speed multiplier {speed_multiplier}");
        }
    }
}

impl Drop for ReadAloudOrchestrator {
    fn drop(&mut self) {
        if let Some(read) = self.shared.active.lock().take() {
            read.teardown(true);
        }
    }
}
