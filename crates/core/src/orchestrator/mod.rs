//! The polling state machine that sequences idle, countdown and applause
//! videos over the two playback slots.

use std::{collections::HashSet, fmt, path::PathBuf};

use crate::{
    config::ShowConfig,
    engine::PlaybackEngine,
    gpio::{DebouncedEdge, IoPins, TriggerArm},
    playlist::{Category, PlaylistSelector, Step},
    slot::{PlaybackSlot, PlaybackStatus, Release, SlotId, SlotSettings},
    timeline::TickClock,
    AssignError, ShowloopError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Pick the next video of the category and load it into a free slot.
    Select(Category),
    /// Swap a queued video for the countdown after the trigger fired.
    PrepareCountdown,
    /// Wait until the other slot is about to fade out.
    Start(SlotId),
    Play(SlotId),
    Error,
    Exit,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(category) => write!(f, "select-{category}"),
            Self::PrepareCountdown => f.write_str("prepare-countdown"),
            Self::Start(slot) => write!(f, "start-slot-{slot}"),
            Self::Play(slot) => write!(f, "play-slot-{slot}"),
            Self::Error => f.write_str("error"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Operator pressed the exit button.
    Clean,
    /// No idle video could be played at all.
    IdleFailure,
    /// A handler ran in a state it is not defined for.
    StateFault,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::IdleFailure | RunOutcome::StateFault => 1,
        }
    }
}

/// Owns both slots and drives them from a fixed-period tick.
pub struct Orchestrator<E: PlaybackEngine> {
    config: ShowConfig,
    engine: E,
    slots: [PlaybackSlot<E::Handle>; 2],
    selector: PlaylistSelector,
    pins: IoPins,
    state: OrchestratorState,
    reported_state: Option<OrchestratorState>,
    maintenance: SlotId,
    trigger: DebouncedEdge,
    exit_button: DebouncedEdge,
    trigger_arm: TriggerArm,
    failed_idle: HashSet<PathBuf>,
    last_warning: Option<String>,
    last_error: Option<String>,
    outcome: RunOutcome,
}

impl<E: PlaybackEngine> Orchestrator<E> {
    pub fn new(config: ShowConfig, engine: E, pins: IoPins) -> Self {
        let selector = PlaylistSelector::from_config(&config.playlists);
        let slots = [
            PlaybackSlot::new(SlotId::First, config.screen),
            PlaybackSlot::new(SlotId::Second, config.screen),
        ];
        Self {
            config,
            engine,
            slots,
            selector,
            pins,
            state: OrchestratorState::Select(Category::Idle),
            reported_state: None,
            maintenance: SlotId::First,
            trigger: DebouncedEdge::new(),
            exit_button: DebouncedEdge::new(),
            trigger_arm: TriggerArm::Armed,
            failed_idle: HashSet::new(),
            last_warning: None,
            last_error: None,
            outcome: RunOutcome::Clean,
        }
    }

    /// Replaces the selector built from the configuration.
    pub fn with_selector(mut self, selector: PlaylistSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn slot(&self, id: SlotId) -> &PlaybackSlot<E::Handle> {
        &self.slots[id.index()]
    }

    pub fn selector(&self) -> &PlaylistSelector {
        &self.selector
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn trigger_armed(&self) -> bool {
        self.trigger_arm.is_armed()
    }

    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    /// Runs the poll loop until the exit state is reached, then tears both
    /// slots down.
    pub fn run(&mut self, clock: &mut TickClock) -> RunOutcome {
        tracing::info!(period = ?clock.period(), "poll loop started");
        while self.state != OrchestratorState::Exit {
            clock.wait();
            self.tick();
        }
        self.shutdown();
        self.outcome
    }

    /// One iteration of the poll loop.
    pub fn tick(&mut self) {
        self.maintain_next_slot();
        self.poll_inputs();

        match self.state {
            OrchestratorState::Error => self.state = OrchestratorState::Exit,
            OrchestratorState::PrepareCountdown => self.prepare_countdown(),
            OrchestratorState::Select(_) => self.select_video(),
            OrchestratorState::Start(id) => self.wait_for_handover(id),
            OrchestratorState::Play(id) => self.play(id),
            OrchestratorState::Exit => {}
        }

        if self.reported_state != Some(self.state) {
            tracing::info!(state = %self.state, "state changed");
            self.reported_state = Some(self.state);
        }
    }

    /// Releases both players and drops the signal output.
    pub fn shutdown(&mut self) {
        for id in SlotId::ALL {
            match self.slots[id.index()].release() {
                Ok(Release::Released) => tracing::info!(slot = %id, "player released"),
                Ok(Release::AlreadyEmpty) => tracing::debug!(slot = %id, "slot already empty"),
                Err(err) => tracing::warn!(slot = %id, %err, "releasing player failed"),
            }
        }
        if let Err(err) = self.pins.signal.set(false) {
            tracing::warn!(%err, "switching signal output off failed");
        }
        tracing::info!(exit_code = self.outcome.exit_code(), "playback stopped");
    }

    fn maintain_next_slot(&mut self) {
        let id = self.maintenance;
        self.maintenance = id.other();
        let tick = self.config.tick_period;

        let status = self.slots[id.index()].refresh_status().clone();
        if status.is_finished() {
            tracing::info!(slot = %id, %status, "unloading player");
            self.teardown(id);
        }

        let slot = &mut self.slots[id.index()];
        if slot.overran(tick) {
            tracing::debug!(slot = %id, "player ran past its shortened end");
            slot.force_stop();
        }
        slot.apply_fade(&mut *self.pins.signal);
    }

    fn teardown(&mut self, id: SlotId) {
        let slot = &mut self.slots[id.index()];
        let carried_signal = slot.has_signal();
        if let Err(err) = slot.release() {
            self.warn(format!("releasing player in slot {id} failed: {err}"));
        }
        if carried_signal {
            if let Err(err) = self.pins.signal.set(false) {
                self.warn(format!("switching signal output off failed: {err}"));
            }
            self.trigger_arm = TriggerArm::Rearming(TriggerArm::GRACE_TICKS);
            tracing::info!(slot = %id, "countdown finished, trigger re-arming");
        }
    }

    fn poll_inputs(&mut self) {
        match self.trigger_arm {
            TriggerArm::Armed => match self.pins.trigger.is_active() {
                Ok(level) => {
                    if self.trigger.sample(level) {
                        tracing::info!("trigger pressed");
                        self.trigger_arm = TriggerArm::Disarmed;
                        if !matches!(self.state, OrchestratorState::Error | OrchestratorState::Exit) {
                            self.state = OrchestratorState::PrepareCountdown;
                        }
                    }
                }
                Err(err) => self.warn(format!("reading trigger input failed: {err}")),
            },
            arm => self.trigger_arm = arm.tick(),
        }

        match self.pins.exit.is_active() {
            Ok(level) => {
                if self.exit_button.sample(level) {
                    tracing::info!("exit button pressed");
                    self.state = OrchestratorState::Exit;
                }
            }
            Err(err) => self.warn(format!("reading exit input failed: {err}")),
        }
    }

    fn any_fading(&self) -> bool {
        self.slots.iter().any(|slot| slot.is_fading())
    }

    fn find_slot(&self, wanted: PlaybackStatus) -> Option<SlotId> {
        SlotId::ALL
            .into_iter()
            .find(|id| *self.slots[id.index()].status() == wanted)
    }

    fn free_slot(&self) -> Option<SlotId> {
        SlotId::ALL
            .into_iter()
            .find(|id| self.slots[id.index()].status().is_free())
    }

    fn settings_for(&self, category: Category) -> SlotSettings {
        SlotSettings {
            category,
            fade: self.config.fade_for(category),
            signal: (category == Category::Countdown).then_some(self.config.signal),
        }
    }

    fn prepare_countdown(&mut self) {
        if self.any_fading() {
            return;
        }
        let paused = self.find_slot(PlaybackStatus::Paused);
        let playing = self.find_slot(PlaybackStatus::Playing);
        match (paused, playing) {
            (Some(paused), Some(playing)) => self.swap_in_countdown(paused, playing),
            _ if self.slots.iter().any(|slot| slot.status().is_empty()) => {
                self.state = OrchestratorState::Select(Category::Countdown);
            }
            // Neither pairing nor an empty slot yet: try again next tick.
            _ => {}
        }
    }

    /// Loads the countdown into the queued (paused) player and makes the
    /// running one yield within the countdown fade-out.
    fn swap_in_countdown(&mut self, paused: SlotId, playing: SlotId) {
        let queued = self.slots[paused.index()].category();
        let video = self.selector.peek_next(Category::Countdown, Step::Forward);
        let settings = self.settings_for(Category::Countdown);

        match self.slots[paused.index()].replace_video(video.as_deref(), settings) {
            Ok(()) => {
                // The queued video was never shown; offer it again later.
                if let Some(category) = queued {
                    self.selector.rollback(category);
                }
                let fade_out = self.config.countdown_fade.fade_out;
                let tick = self.config.tick_period;
                let current = &mut self.slots[playing.index()];
                current.cancel_fade_in();
                current.set_fade_out(fade_out);
                current.truncate_duration_to_now(fade_out, tick);
                tracing::info!(
                    queued = %paused,
                    yielding = %playing,
                    duration = current.duration(),
                    "countdown prepared"
                );
                self.state = OrchestratorState::Start(paused);
            }
            Err(err) => {
                if err.is_selection() {
                    self.warn(format!("no countdown video available: {err}"));
                } else {
                    self.fail(format!("countdown video could not be prepared: {err}"));
                }
                self.trigger_arm = TriggerArm::Rearming(TriggerArm::GRACE_TICKS);
                self.state = if self.slots[paused.index()].status().is_finished() {
                    // The queued video was overwritten by the failed load.
                    if let Some(category) = queued {
                        self.selector.rollback(category);
                    }
                    OrchestratorState::Select(Category::Idle)
                } else {
                    OrchestratorState::Start(paused)
                };
            }
        }
    }

    fn select_video(&mut self) {
        let OrchestratorState::Select(category) = self.state else {
            let err = ShowloopError::InvalidState {
                operation: "select video",
                state: self.state.to_string(),
            };
            self.fail(err.to_string());
            self.outcome = RunOutcome::StateFault;
            self.state = OrchestratorState::Error;
            return;
        };
        if self.any_fading() {
            return;
        }
        if category != Category::Countdown {
            if let Some(stranded) = self.stranded_slot() {
                tracing::info!(slot = %stranded, "starting queued video that lost its handover");
                self.state = OrchestratorState::Play(stranded);
                return;
            }
        }

        let video = self.selector.peek_next(category, Step::Forward);
        let Some(target) = self.free_slot() else {
            // Keep the playlist order for the next attempt.
            self.selector.rollback(category);
            if let Some(video) = &video {
                self.warn(format!("no free playback slot for `{}`", video.display()));
            }
            return;
        };
        if self.slots[target.index()].status().is_finished() {
            self.teardown(target);
        }

        let settings = self.settings_for(category);
        let outcome = self.slots[target.index()].assign(&mut self.engine, video.as_deref(), settings);
        match outcome {
            Ok(()) => {
                if category == Category::Idle {
                    self.failed_idle.clear();
                }
                if category == Category::Countdown {
                    self.clear_way_for_countdown(target.other());
                }
                self.state = OrchestratorState::Start(target);
            }
            Err(AssignError::NoIdentifier) => {
                self.warn(format!("no {category} video available, the playlist is empty"));
                if category == Category::Countdown {
                    self.trigger_arm = TriggerArm::Rearming(TriggerArm::GRACE_TICKS);
                    self.state = OrchestratorState::Select(Category::Idle);
                }
            }
            Err(err) => self.assignment_failed(category, video, err),
        }
    }

    /// A queued video with nothing playing beside it: the trigger preempted
    /// its handover and nothing else will start it.
    fn stranded_slot(&self) -> Option<SlotId> {
        let paused = self.find_slot(PlaybackStatus::Paused)?;
        self.find_slot(PlaybackStatus::Playing).is_none().then_some(paused)
    }

    /// A sibling that is playing fades out now; one that was queued but
    /// never started is dropped and its video offered again later.
    fn clear_way_for_countdown(&mut self, sibling: SlotId) {
        let slot = &mut self.slots[sibling.index()];
        if *slot.status() == PlaybackStatus::Paused {
            if let Some(category) = slot.category() {
                self.selector.rollback(category);
            }
            self.teardown(sibling);
            return;
        }
        let fade_out = slot.fade().fade_out;
        slot.truncate_duration_to_now(fade_out, self.config.tick_period);
    }

    fn assignment_failed(&mut self, category: Category, video: Option<PathBuf>, err: AssignError) {
        self.fail(format!("{category} video could not be started: {err}"));
        match category {
            Category::Idle => {
                if let Some(video) = video {
                    self.failed_idle.insert(video);
                }
                let distinct = self
                    .selector
                    .cursor(Category::Idle)
                    .videos()
                    .iter()
                    .collect::<HashSet<_>>()
                    .len();
                if self.failed_idle.len() >= distinct {
                    self.fail(format!("none of the {distinct} idle videos can be played, giving up"));
                    self.outcome = RunOutcome::IdleFailure;
                    self.state = OrchestratorState::Error;
                }
            }
            Category::Countdown => {
                self.trigger_arm = TriggerArm::Rearming(TriggerArm::GRACE_TICKS);
                self.state = OrchestratorState::Select(Category::Idle);
            }
            Category::Applause => self.state = OrchestratorState::Select(Category::Idle),
        }
    }

    fn wait_for_handover(&mut self, id: SlotId) {
        let other = &self.slots[id.other().index()];
        let lead = other.fade().fade_out + 3.0 * self.config.tick_period;
        if other.status().is_empty() || other.remaining() <= lead {
            self.state = OrchestratorState::Play(id);
        }
    }

    fn play(&mut self, id: SlotId) {
        if let Err(err) = self.slots[id.index()].start_playback() {
            self.warn(format!("starting playback in slot {id} failed: {err}"));
        }
        self.state = if self.slots[id.index()].has_signal() {
            OrchestratorState::Select(Category::Applause)
        } else {
            OrchestratorState::Select(Category::Idle)
        };
    }

    fn warn(&mut self, message: String) {
        if self.last_warning.as_deref() != Some(message.as_str()) {
            tracing::warn!("{message}");
        }
        self.last_warning = Some(message);
    }

    fn fail(&mut self, message: String) {
        if self.last_error.as_deref() != Some(message.as_str()) {
            tracing::error!("{message}");
        }
        self.last_error = Some(message);
    }
}

impl<E: PlaybackEngine> fmt::Debug for Orchestrator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("slots", &[self.slots[0].status(), self.slots[1].status()])
            .field("trigger_arm", &self.trigger_arm)
            .field("outcome", &self.outcome)
            .finish()
    }
}
