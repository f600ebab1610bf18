//! Word highlighting driven by timers or by the playback position.
//!
//! A [`HighlightScheduler`] owns the highlight for one read. It runs exactly
//! one tokio task which either
//!
//! - **timer-driven**: waits the mode's initial delay, then highlights one
//!   word per tick and sleeps for that word's [`TimingModel`] duration; it
//!   halts as soon as playback is no longer `playing`, or
//! - **position-driven**: samples the playback position every frame and
//!   highlights `index_for_position(position)`, re-reading the duration when
//!   the index has not moved for longer than the stall threshold.
//!
//! At most one word is highlighted at any time: the previous word is always
//! cleared before the next one is applied, under the same lock that
//! [`HighlightScheduler::stop`] takes. Once `stop` returns nothing can
//! highlight again.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::playback::{PlaybackSession, PlaybackStatus};
use crate::timing::{index_for_position, TimingModel, TimingStrategy};
use crate::{ReadingMode, WordUnit};

/// The UI region that shows which word is being read.
///
/// Only the active scheduler may call into the surface.
pub trait HighlightSurface: Send + Sync {
    fn apply(&self, word: &WordUnit, mode: ReadingMode);
    fn clear(&self, word: &WordUnit);
}

/// What the scheduler needs to know about playback.
pub trait PlaybackClock: Send + Sync {
    fn status(&self) -> PlaybackStatus;
    fn position_ms(&self) -> Option<f64>;
    fn duration_ms(&self) -> Option<f64>;
}

impl PlaybackClock for PlaybackSession {
    fn status(&self) -> PlaybackStatus {
        PlaybackSession::status(self)
    }

    fn position_ms(&self) -> Option<f64> {
        self.current_position_ms()
    }

    fn duration_ms(&self) -> Option<f64> {
        PlaybackSession::duration_ms(self)
    }
}

/// Called with the index of every newly highlighted word.
pub type HighlightListener = Arc<dyn Fn(usize) + Send + Sync>;

/// Scheduler progress. `current_index == words.len()` means complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighlightCursor {
    pub current_index: usize,
    /// The word currently carrying the highlight.
    pub highlighted: Option<usize>,
}

/// Everything fixed for one read before the first tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulePlan {
    pub strategy: TimingStrategy,
    pub mode: ReadingMode,
    pub speed_multiplier: f64,
    pub media_duration_ms: Option<f64>,
    pub playback_rate: f32,
}

impl SchedulePlan {
    pub fn new(
        mode: ReadingMode,
        speed_multiplier: f64,
        media_duration_ms: Option<f64>,
        playback_rate: f32,
        position_available: bool,
        position_sampling_enabled: bool,
    ) -> Self {
        Self {
            strategy: TimingStrategy::select(
                media_duration_ms,
                position_available,
                position_sampling_enabled,
            ),
            mode,
            speed_multiplier,
            media_duration_ms,
            playback_rate,
        }
    }

    /// Audio length in wall-clock time, once the playback rate is applied.
    pub fn wall_duration_ms(&self) -> Option<f64> {
        let rate = self.playback_rate as f64;
        self.media_duration_ms
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| if rate > 0.0 { d / rate } else { d })
    }
}

#[derive(Debug, Default)]
struct CursorState {
    cursor: HighlightCursor,
    stopped: bool,
}

/// Moves the highlight through one segment's words while its audio plays.
pub struct HighlightScheduler {
    words: Arc<[WordUnit]>,
    surface: Arc<dyn HighlightSurface>,
    timing: TimingModel,
    plan: SchedulePlan,
    listener: Option<HighlightListener>,
    state: Arc<Mutex<CursorState>>,
    task: Option<JoinHandle<()>>,
}

impl HighlightScheduler {
    pub fn new(
        words: Arc<[WordUnit]>,
        surface: Arc<dyn HighlightSurface>,
        timing: TimingModel,
        plan: SchedulePlan,
    ) -> Self {
        Self {
            words,
            surface,
            timing,
            plan,
            listener: None,
            state: Arc::new(Mutex::new(CursorState::default())),
            task: None,
        }
    }

    pub fn with_listener(mut self, listener: HighlightListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn plan(&self) -> &SchedulePlan {
        &self.plan
    }

    pub fn cursor(&self) -> HighlightCursor {
        self.state.lock().cursor
    }

    /// True while a tick or frame is still scheduled.
    pub fn has_pending_work(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn the driving task. Must be called from within a tokio runtime.
    ///
    /// Starting twice, or after [`HighlightScheduler::stop`], does nothing.
    pub fn start(&mut self, clock: Arc<dyn PlaybackClock>) {
        if self.task.is_some() || self.state.lock().stopped {
            return;
        }

        log::debug!(
            "Starting {:?} highlighting: {} words, mode={}, speed={}",
            self.plan.strategy,
            self.words.len(),
            self.plan.mode,
            self.plan.speed_multiplier
        );

        let run = Run {
            words: self.words.clone(),
            surface: self.surface.clone(),
            timing: self.timing.clone(),
            plan: self.plan,
            listener: self.listener.clone(),
            state: self.state.clone(),
            clock,
        };
        self.task = Some(tokio::spawn(async move {
            match run.plan.strategy {
                TimingStrategy::PositionSampled => run.drive_by_position().await,
                TimingStrategy::TimedBudget | TimingStrategy::TimedLexical => {
                    run.drive_by_timer().await
                }
            }
        }));
    }

    /// Cancel any scheduled work and clear the highlight, unconditionally.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let mut state = self.state.lock();
        state.stopped = true;
        if let Some(index) = state.cursor.highlighted.take() {
            if let Some(word) = self.words.get(index) {
                self.surface.clear(word);
            }
        }
    }
}

impl Drop for HighlightScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Run {
    words: Arc<[WordUnit]>,
    surface: Arc<dyn HighlightSurface>,
    timing: TimingModel,
    plan: SchedulePlan,
    listener: Option<HighlightListener>,
    state: Arc<Mutex<CursorState>>,
    clock: Arc<dyn PlaybackClock>,
}

impl Run {
    /// Move the highlight to `index`; an index past the last word clears it
    /// and marks the cursor complete. Returns false once the scheduler is stopped.
    fn move_to(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            return false;
        }

        if let Some(previous) = state.cursor.highlighted.take() {
            if let Some(word) = self.words.get(previous) {
                self.surface.clear(word);
            }
        }

        let index = index.min(self.words.len());
        state.cursor.current_index = index;
        if let Some(word) = self.words.get(index) {
            self.surface.apply(word, self.plan.mode);
            state.cursor.highlighted = Some(index);
            log::debug!(
                "Highlighted word {}/{}: {:?} ({})",
                index + 1,
                self.words.len(),
                word.text,
                word.category
            );
            if let Some(listener) = &self.listener {
                listener(index);
            }
        }
        true
    }

    fn mark_complete(&self) {
        let mut state = self.state.lock();
        if !state.stopped {
            state.cursor.current_index = self.words.len();
        }
    }

    async fn drive_by_timer(self) {
        let total = self.words.len();
        let budget = match self.plan.strategy {
            TimingStrategy::TimedBudget => self.plan.wall_duration_ms(),
            _ => None,
        };

        let initial = self.timing.initial_delay_ms(self.plan.mode);
        tokio::time::sleep(Duration::from_millis(initial)).await;

        for (index, word) in self.words.iter().enumerate() {
            if self.clock.status() != PlaybackStatus::Playing {
                log::debug!("Highlighting halted at word {index}: playback no longer playing");
                return;
            }
            if !self.move_to(index) {
                return;
            }

            let delay = self.timing.duration_ms(
                word,
                self.plan.mode,
                total,
                budget,
                self.plan.speed_multiplier,
            );
            log::debug!("Next word in {delay:.0}ms");
            tokio::time::sleep(Duration::from_secs_f64(delay / 1000.0)).await;
        }

        // the last word keeps its highlight until the read is torn down
        self.mark_complete();
        log::debug!("Timed highlighting complete");
    }

    async fn drive_by_position(self) {
        let total = self.words.len();
        let frame = Duration::from_millis(self.timing.config().frame_interval_ms.max(1));
        let stall = Duration::from_millis(self.timing.config().stall_threshold_ms);
        let Some(mut duration) = self.plan.media_duration_ms else {
            log::warn!("Position-driven highlighting started without a duration");
            return;
        };

        let mut shown: Option<usize> = None;
        let mut last_change = Instant::now();

        loop {
            tokio::time::sleep(frame).await;

            match self.clock.status() {
                PlaybackStatus::Playing => {}
                PlaybackStatus::Loading | PlaybackStatus::Paused => {
                    last_change = Instant::now();
                    continue;
                }
                PlaybackStatus::Ended | PlaybackStatus::Errored => return,
            }

            let Some(position) = self.clock.position_ms() else {
                continue;
            };
            let target = index_for_position(position, duration, total);

            if shown != Some(target) {
                if !self.move_to(target) {
                    return;
                }
                if target >= total {
                    log::debug!("Position-driven highlighting complete at {position:.0}ms");
                    return;
                }
                shown = Some(target);
                last_change = Instant::now();
            } else if last_change.elapsed() > stall {
                // a stalled position is not completion; refresh the slot width
                if let Some(d) = self.clock.duration_ms().filter(|d| *d > 0.0) {
                    duration = d;
                }
                log::debug!(
                    "No word change for {}ms at {position:.0}ms, resampling (duration={duration:.0}ms)",
                    stall.as_millis()
                );
                last_change = Instant::now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::words_from_text;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Apply(usize, Duration),
        Clear(usize),
    }

    /// Records every call and fails the test if two words are ever lit at once.
    struct RecordingSurface {
        origin: Instant,
        ops: Mutex<Vec<Op>>,
        lit: Mutex<Vec<usize>>,
    }

    impl RecordingSurface {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                ops: Mutex::new(Vec::new()),
                lit: Mutex::new(Vec::new()),
            })
        }

        fn applied(&self) -> Vec<(usize, Duration)> {
            self.ops
                .lock()
                .iter()
                .filter_map(|op| match op {
                    Op::Apply(i, at) => Some((*i, *at)),
                    Op::Clear(_) => None,
                })
                .collect()
        }

        fn lit(&self) -> Vec<usize> {
            self.lit.lock().clone()
        }
    }

    impl HighlightSurface for RecordingSurface {
        fn apply(&self, word: &WordUnit, _mode: ReadingMode) {
            let mut lit = self.lit.lock();
            assert!(lit.is_empty(), "word {} lit while {:?} still lit", word.index, lit);
            lit.push(word.index);
            self.ops
                .lock()
                .push(Op::Apply(word.index, self.origin.elapsed()));
        }

        fn clear(&self, word: &WordUnit) {
            self.lit.lock().retain(|i| *i != word.index);
            self.ops.lock().push(Op::Clear(word.index));
        }
    }

    struct FakeClock {
        origin: Instant,
        status: Mutex<PlaybackStatus>,
        frozen_at: Mutex<Option<f64>>,
        duration_ms: Option<f64>,
        duration_reads: AtomicUsize,
    }

    impl FakeClock {
        fn playing(duration_ms: Option<f64>) -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                status: Mutex::new(PlaybackStatus::Playing),
                frozen_at: Mutex::new(None),
                duration_ms,
                duration_reads: AtomicUsize::new(0),
            })
        }

        fn set_status(&self, status: PlaybackStatus) {
            *self.status.lock() = status;
        }

        fn freeze(&self, position: Option<f64>) {
            *self.frozen_at.lock() = position;
        }
    }

    impl PlaybackClock for FakeClock {
        fn status(&self) -> PlaybackStatus {
            *self.status.lock()
        }

        fn position_ms(&self) -> Option<f64> {
            let frozen = *self.frozen_at.lock();
            Some(frozen.unwrap_or_else(|| self.origin.elapsed().as_secs_f64() * 1000.0))
        }

        fn duration_ms(&self) -> Option<f64> {
            self.duration_reads.fetch_add(1, Ordering::SeqCst);
            self.duration_ms
        }
    }

    fn scheduler(
        text: &str,
        surface: Arc<RecordingSurface>,
        plan: SchedulePlan,
    ) -> HighlightScheduler {
        HighlightScheduler::new(
            words_from_text(text).into(),
            surface,
            TimingModel::new(EngineConfig::default()),
            plan,
        )
    }

    fn position_plan(duration_ms: f64) -> SchedulePlan {
        SchedulePlan::new(ReadingMode::Normal, 1.0, Some(duration_ms), 1.0, true, true)
    }

    async fn settle(scheduler: &HighlightScheduler) {
        while scheduler.has_pending_work() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn plan_selects_strategy_from_what_playback_reports() {
        assert_eq!(position_plan(3000.0).strategy, TimingStrategy::PositionSampled);
        let plan = SchedulePlan::new(ReadingMode::Learning, 1.0, Some(3000.0), 0.6, false, true);
        assert_eq!(plan.strategy, TimingStrategy::TimedBudget);
        assert!((plan.wall_duration_ms().expect("duration") - 5000.0).abs() < 1e-3);
        let plan = SchedulePlan::new(ReadingMode::Learning, 1.0, None, 0.6, true, true);
        assert_eq!(plan.strategy, TimingStrategy::TimedLexical);
    }

    #[tokio::test(start_paused = true)]
    async fn position_mode_follows_quarter_slots() {
        let surface = RecordingSurface::new();
        let clock = FakeClock::playing(Some(3000.0));
        let mut scheduler = scheduler("one two three", surface.clone(), position_plan(3000.0));
        scheduler.start(clock);
        settle(&scheduler).await;

        let applied = surface.applied();
        let indices: Vec<usize> = applied.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        // first frame at or after each slot boundary
        assert!(applied[0].1 < Duration::from_millis(750));
        assert!(applied[1].1 >= Duration::from_millis(750));
        assert!(applied[1].1 < Duration::from_millis(770));
        assert!(applied[2].1 >= Duration::from_millis(1500));
        assert!(applied[2].1 < Duration::from_millis(1520));

        // the trailing slot clears the last word and completes the cursor
        assert!(surface.lit().is_empty());
        assert_eq!(
            scheduler.cursor(),
            HighlightCursor {
                current_index: 3,
                highlighted: None
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn position_mode_follows_backwards_seeks() {
        let surface = RecordingSurface::new();
        let clock = FakeClock::playing(Some(4000.0));
        clock.freeze(Some(2000.0));
        let mut scheduler = scheduler("a b c d", surface.clone(), position_plan(4000.0));
        scheduler.start(clock.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(surface.lit(), vec![2]);

        clock.freeze(Some(100.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(surface.lit(), vec![0]);
        assert_eq!(scheduler.cursor().current_index, 0);

        scheduler.stop();
        assert!(surface.lit().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_position_resamples_instead_of_completing() {
        let surface = RecordingSurface::new();
        let clock = FakeClock::playing(Some(3000.0));
        clock.freeze(Some(100.0));
        let mut scheduler = scheduler("one two three", surface.clone(), position_plan(3000.0));
        scheduler.start(clock.clone());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(clock.duration_reads.load(Ordering::SeqCst) >= 2);
        assert!(scheduler.has_pending_work());
        assert_eq!(surface.lit(), vec![0]);

        scheduler.stop();
        assert!(!scheduler.has_pending_work());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_mode_uses_initial_delay_then_word_durations() {
        let surface = RecordingSurface::new();
        let clock = FakeClock::playing(None);
        let plan = SchedulePlan::new(ReadingMode::Normal, 1.0, None, 1.0, true, true);
        let mut scheduler = scheduler("pond lamp frog", surface.clone(), plan);
        scheduler.start(clock);
        settle(&scheduler).await;

        let applied = surface.applied();
        let indices: Vec<usize> = applied.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        // 500ms initial delay, then 360ms per four-letter regular word
        let near = |at: Duration, ms: u64| {
            let expected = Duration::from_millis(ms);
            let diff = if at > expected { at - expected } else { expected - at };
            diff <= Duration::from_millis(2)
        };
        assert!(near(applied[0].1, 500), "{:?}", applied[0].1);
        assert!(near(applied[1].1, 860), "{:?}", applied[1].1);
        assert!(near(applied[2].1, 1220), "{:?}", applied[2].1);

        // last word stays lit until the hard stop
        assert_eq!(surface.lit(), vec![2]);
        assert_eq!(scheduler.cursor().current_index, 3);
        scheduler.stop();
        assert!(surface.lit().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_mode_halts_when_playback_stops() {
        let surface = RecordingSurface::new();
        let clock = FakeClock::playing(None);
        let plan = SchedulePlan::new(ReadingMode::Learning, 1.0, None, 1.0, true, true);
        let mut scheduler = scheduler("pond lamp frog", surface.clone(), plan);
        scheduler.start(clock.clone());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(surface.lit(), vec![0]);
        clock.set_status(PlaybackStatus::Paused);

        settle(&scheduler).await;
        assert_eq!(surface.applied().len(), 1);
        assert!(!scheduler.has_pending_work());
    }

    #[tokio::test(start_paused = true)]
    async fn hard_stop_cancels_pending_tick_and_clears() {
        let surface = RecordingSurface::new();
        let clock = FakeClock::playing(None);
        let plan = SchedulePlan::new(ReadingMode::Normal, 1.0, None, 1.0, true, true);
        let mut scheduler = scheduler("pond lamp frog", surface.clone(), plan);
        scheduler.start(clock.clone());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(surface.lit(), vec![0]);
        assert!(scheduler.has_pending_work());

        scheduler.stop();
        assert!(surface.lit().is_empty());
        assert!(!scheduler.has_pending_work());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(surface.applied().len(), 1);

        // a stopped scheduler cannot be restarted
        scheduler.start(clock);
        assert!(!scheduler.has_pending_work());
    }

    #[tokio::test(start_paused = true)]
    async fn listener_sees_every_highlight_in_order() {
        let surface = RecordingSurface::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut scheduler = scheduler("one two three", surface, position_plan(3000.0))
            .with_listener(Arc::new(move |i| sink.lock().push(i)));
        scheduler.start(FakeClock::playing(Some(3000.0)));
        settle(&scheduler).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }
}
