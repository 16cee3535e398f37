use std::{
    fmt,
    fs::{self, File},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{
    config::{FadeProfile, Geometry, SignalTiming},
    engine::{EngineStatus, PlaybackEngine, PlaybackHandle},
    gpio::DigitalOutput,
    render::RenderParams,
    AssignError, Category, EngineError,
};

/// Identity of one of the two playback slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotId {
    First,
    Second,
}

impl SlotId {
    pub const ALL: [SlotId; 2] = [SlotId::First, SlotId::Second];

    pub fn index(self) -> usize {
        match self {
            SlotId::First => 0,
            SlotId::Second => 1,
        }
    }

    pub fn other(self) -> SlotId {
        match self {
            SlotId::First => SlotId::Second,
            SlotId::Second => SlotId::First,
        }
    }

    /// Render layer of the slot; the first slot is drawn on top.
    pub fn layer(self) -> u32 {
        match self {
            SlotId::First => 52,
            SlotId::Second => 51,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackStatus {
    /// No player attached.
    Empty,
    Playing,
    Paused,
    Stopped,
    Faulted(String),
}

impl PlaybackStatus {
    /// A new video may be assigned to the slot.
    pub fn is_free(&self) -> bool {
        matches!(self, Self::Empty | Self::Stopped | Self::Faulted(_))
    }

    /// The player is done and must be torn down.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Stopped | Self::Faulted(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<EngineStatus> for PlaybackStatus {
    fn from(status: EngineStatus) -> Self {
        match status {
            EngineStatus::Playing => Self::Playing,
            EngineStatus::Paused => Self::Paused,
            EngineStatus::Stopped => Self::Stopped,
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Playing => f.write_str("playing"),
            Self::Paused => f.write_str("paused"),
            Self::Stopped => f.write_str("stopped"),
            Self::Faulted(reason) => write!(f, "faulted ({reason})"),
        }
    }
}

/// What a slot should do with the video it is given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotSettings {
    pub category: Category,
    pub fade: FadeProfile,
    /// Present for the countdown: drives the secondary output.
    pub signal: Option<SignalTiming>,
}

/// Outcome of [`PlaybackSlot::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released,
    AlreadyEmpty,
}

/// Checks that `path` can be handed to a player.
pub fn validate_video_path(path: &Path) -> Result<(), AssignError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            return Err(AssignError::PermissionDenied(path.to_path_buf()))
        }
        Err(_) => return Err(AssignError::NotFound(path.to_path_buf())),
    };
    if metadata.is_dir() {
        return Err(AssignError::IsDirectory(path.to_path_buf()));
    }
    match File::open(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            Err(AssignError::PermissionDenied(path.to_path_buf()))
        }
        Err(_) => Err(AssignError::NotFound(path.to_path_buf())),
    }
}

/// Alpha a player should show at `position`, and whether it is mid-fade.
///
/// `None` leaves the current alpha alone: empty and paused slots are not
/// touched, so a queued video stays invisible until it is started.
pub fn fade_target(
    fade: &FadeProfile,
    status: &PlaybackStatus,
    position: f64,
    duration: f64,
) -> Option<(f64, bool)> {
    let start = f64::from(fade.alpha_start);
    let play = f64::from(fade.alpha_play);
    let end = f64::from(fade.alpha_end);

    if status.is_empty() {
        return None;
    }
    if *status == PlaybackStatus::Stopped || position >= duration {
        return Some((end, false));
    }
    if *status != PlaybackStatus::Playing {
        return None;
    }

    if position > duration - fade.fade_out {
        let t = 1.0 - (duration - position) / fade.fade_out;
        Some((play - t * (play - end), true))
    } else if position < fade.fade_in {
        let t = if fade.fade_in == 0.0 {
            1.0
        } else {
            position / fade.fade_in
        };
        Some((start + t * (play - start), true))
    } else {
        Some((play, false))
    }
}

/// One of the two rendering endpoints, holding at most one player at a time.
#[derive(Debug)]
pub struct PlaybackSlot<H> {
    id: SlotId,
    render: RenderParams,
    fade: FadeProfile,
    signal: Option<SignalTiming>,
    category: Option<Category>,
    video: Option<PathBuf>,
    last_alpha: u8,
    duration: f64,
    position: f64,
    status: PlaybackStatus,
    fading: bool,
    handle: Option<H>,
}

impl<H: PlaybackHandle> PlaybackSlot<H> {
    pub fn new(id: SlotId, geometry: Geometry) -> Self {
        let render = RenderParams::new(id.layer(), geometry);
        Self {
            id,
            render,
            fade: FadeProfile::default(),
            signal: None,
            category: None,
            video: None,
            last_alpha: render.initial_alpha,
            duration: 0.0,
            position: 0.0,
            status: PlaybackStatus::Empty,
            fading: false,
            handle: None,
        }
    }

    pub fn status(&self) -> &PlaybackStatus {
        &self.status
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Seconds left until the (possibly truncated) end of the video.
    pub fn remaining(&self) -> f64 {
        self.duration - self.position
    }

    /// Last alpha handed to the player.
    pub fn alpha(&self) -> u8 {
        self.last_alpha
    }

    pub fn is_fading(&self) -> bool {
        self.fading
    }

    pub fn fade(&self) -> &FadeProfile {
        &self.fade
    }

    /// The slot plays the priority sequence and owns the signal output.
    pub fn has_signal(&self) -> bool {
        self.signal.is_some()
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    pub fn video(&self) -> Option<&Path> {
        self.video.as_deref()
    }

    pub fn handle(&self) -> Option<&H> {
        self.handle.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }

    /// Ends any fade-in immediately.
    pub fn cancel_fade_in(&mut self) {
        self.fade.fade_in = 0.0;
    }

    pub fn set_fade_out(&mut self, seconds: f64) {
        self.fade.fade_out = seconds;
    }

    /// Opens `video` in a fresh player. The player starts paused and
    /// invisible; [`PlaybackSlot::start_playback`] brings it on screen.
    pub fn assign<E>(
        &mut self,
        engine: &mut E,
        video: Option<&Path>,
        settings: SlotSettings,
    ) -> Result<(), AssignError>
    where
        E: PlaybackEngine<Handle = H>,
    {
        if self.handle.is_some() {
            return Err(AssignError::AlreadyOccupied(self.id));
        }
        let path = video.ok_or(AssignError::NoIdentifier)?;
        validate_video_path(path)?;

        let handle = engine
            .open(path, &self.render)
            .map_err(|source| AssignError::EngineInitFailed {
                path: path.to_path_buf(),
                source,
            })?;
        self.handle = Some(handle);
        self.configure(path, settings);
        self.last_alpha = self.render.initial_alpha;
        tracing::info!(slot = %self.id, category = %settings.category, video = %path.display(), "player initialised");
        self.time_video(path)
    }

    /// Swaps the video of the current player without recreating it.
    pub fn replace_video(&mut self, video: Option<&Path>, settings: SlotSettings) -> Result<(), AssignError> {
        let path = video.ok_or(AssignError::NoIdentifier)?;
        validate_video_path(path)?;
        let handle = self.handle.as_mut().ok_or(AssignError::Vacant(self.id))?;
        handle
            .load(path)
            .map_err(|source| AssignError::EngineInitFailed {
                path: path.to_path_buf(),
                source,
            })?;
        self.configure(path, settings);
        tracing::info!(slot = %self.id, category = %settings.category, video = %path.display(), "video replaced");
        self.time_video(path)
    }

    fn configure(&mut self, path: &Path, settings: SlotSettings) {
        self.fade = settings.fade;
        self.signal = settings.signal;
        self.category = Some(settings.category);
        self.video = Some(path.to_path_buf());
        self.position = 0.0;
        self.status = PlaybackStatus::Paused;
    }

    fn time_video(&mut self, path: &Path) -> Result<(), AssignError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(AssignError::Vacant(self.id));
        };
        match handle.duration() {
            Ok(duration) => {
                self.duration = duration;
                Ok(())
            }
            Err(source) => {
                self.duration = -1.0;
                self.status = PlaybackStatus::Faulted(source.to_string());
                Err(AssignError::DurationUnavailable {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Polls the player. A player that cannot be reached is marked faulted;
    /// a faulted slot stays faulted until it is released.
    pub fn refresh_status(&mut self) -> &PlaybackStatus {
        let Some(handle) = self.handle.as_mut() else {
            self.status = PlaybackStatus::Empty;
            return &self.status;
        };
        if matches!(self.status, PlaybackStatus::Faulted(_)) {
            return &self.status;
        }

        match handle.position() {
            Ok(position) => self.position = position,
            Err(err) => {
                self.position = -1.0;
                self.status = PlaybackStatus::Faulted(err.to_string());
                return &self.status;
            }
        }
        self.status = match handle.status() {
            Ok(status) => status.into(),
            Err(err) => PlaybackStatus::Faulted(err.to_string()),
        };
        &self.status
    }

    /// Applies the alpha and volume for the current position and drives the
    /// signal output when this slot carries it.
    pub fn apply_fade(&mut self, output: &mut dyn DigitalOutput) {
        if self.handle.is_none() {
            self.fading = false;
            return;
        }
        let Some((alpha, fading)) = fade_target(&self.fade, &self.status, self.position, self.duration)
        else {
            return;
        };
        self.fading = fading;
        self.apply_alpha(alpha);

        if self.status == PlaybackStatus::Playing {
            self.sync_signal(output);
        }
    }

    fn apply_alpha(&mut self, alpha: f64) {
        let alpha = alpha.clamp(0.0, 255.0).round() as u8;
        if alpha == self.last_alpha {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            if let Err(err) = handle.set_alpha(alpha) {
                tracing::debug!(slot = %self.id, %err, "setting alpha failed");
            }
            if let Err(err) = handle.set_volume(f64::from(alpha) / 255.0) {
                tracing::debug!(slot = %self.id, %err, "setting volume failed");
            }
        }
        tracing::trace!(slot = %self.id, alpha, position = self.position, "alpha");
        self.last_alpha = alpha;
    }

    fn sync_signal(&mut self, output: &mut dyn DigitalOutput) {
        let Some(signal) = self.signal else {
            return;
        };
        let remaining = self.remaining();
        let wanted = if remaining - signal.off_offset <= 0.0 {
            false
        } else if remaining - signal.on_offset <= 0.0 {
            true
        } else {
            return;
        };
        if output.is_on() == wanted {
            return;
        }
        match output.set(wanted) {
            Ok(()) if wanted => tracing::info!(slot = %self.id, "signal output switched on"),
            Ok(()) => tracing::info!(slot = %self.id, "signal output switched off"),
            Err(err) => tracing::warn!(slot = %self.id, %err, "driving signal output failed"),
        }
    }

    /// Pulls the end of the video forward so the fade-out starts now.
    pub fn truncate_duration_to_now(&mut self, fade_out: f64, tick_period: f64) {
        if !matches!(self.status, PlaybackStatus::Playing | PlaybackStatus::Paused) {
            return;
        }
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match handle.position() {
            Ok(position) => {
                self.position = position;
                self.duration = position + fade_out + tick_period;
                tracing::debug!(slot = %self.id, position, duration = self.duration, "duration truncated");
            }
            Err(err) => tracing::debug!(slot = %self.id, %err, "could not truncate duration"),
        }
    }

    /// The player kept running past its truncated end.
    pub fn overran(&self, tick_period: f64) -> bool {
        self.status == PlaybackStatus::Playing && self.position > self.duration + 2.0 * tick_period
    }

    /// Ends playback; teardown follows on the next maintenance pass.
    pub fn force_stop(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        self.status = match handle.stop() {
            Ok(()) => PlaybackStatus::Stopped,
            Err(err) => PlaybackStatus::Faulted(err.to_string()),
        };
        tracing::debug!(slot = %self.id, status = %self.status, "player stopped");
    }

    /// Rewinds, shows the start alpha and starts playing.
    pub fn start_playback(&mut self) -> Result<(), EngineError> {
        if self.handle.is_none() || self.status.is_finished() {
            return Ok(());
        }
        let alpha_start = f64::from(self.fade.alpha_start);
        let outcome = match self.handle.as_mut() {
            Some(handle) => handle.seek(0.0),
            None => Ok(()),
        };
        let outcome = outcome.and_then(|()| {
            self.apply_alpha(alpha_start);
            match self.handle.as_mut() {
                Some(handle) => handle.play(),
                None => Ok(()),
            }
        });
        match outcome {
            Ok(()) => {
                self.position = 0.0;
                self.status = PlaybackStatus::Playing;
                tracing::info!(slot = %self.id, video = ?self.video, "playback started");
                Ok(())
            }
            Err(err) => {
                self.status = PlaybackStatus::Faulted(err.to_string());
                Err(err)
            }
        }
    }

    /// Tears the player down, even mid-playback, and resets the slot.
    pub fn release(&mut self) -> Result<Release, EngineError> {
        let handle = self.handle.take();
        self.status = PlaybackStatus::Empty;
        self.duration = 0.0;
        self.position = 0.0;
        self.fading = false;
        self.signal = None;
        self.category = None;
        self.video = None;
        self.last_alpha = self.render.initial_alpha;

        match handle {
            None => Ok(Release::AlreadyEmpty),
            Some(mut handle) => {
                tracing::debug!(slot = %self.id, "player released");
                handle.quit().map(|()| Release::Released)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        engine::{SimClock, SimulatedEngine, SimulatedHandle},
        gpio::MemoryPin,
    };

    const TICK: f64 = 0.02;

    struct Rig {
        dir: TempDir,
        engine: SimulatedEngine,
        slot: PlaybackSlot<SimulatedHandle>,
        output: MemoryPin,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                engine: SimulatedEngine::new(SimClock::manual(), 10.0),
                slot: PlaybackSlot::new(SlotId::First, Geometry::default()),
                output: MemoryPin::new(),
            }
        }

        fn video(&self, name: &str, duration: f64) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, b"video").unwrap();
            self.engine.set_duration(&path, duration);
            path
        }

        fn assign(&mut self, path: &Path, settings: SlotSettings) -> Result<(), AssignError> {
            self.slot.assign(&mut self.engine, Some(path), settings)
        }

        fn step(&mut self, seconds: f64) {
            self.engine.clock().advance(seconds);
            self.slot.refresh_status();
            let mut output = self.output.clone();
            self.slot.apply_fade(&mut output);
        }
    }

    fn idle() -> SlotSettings {
        SlotSettings {
            category: Category::Idle,
            fade: FadeProfile::default(),
            signal: None,
        }
    }

    fn countdown() -> SlotSettings {
        SlotSettings {
            category: Category::Countdown,
            fade: FadeProfile::default(),
            signal: Some(SignalTiming::default()),
        }
    }

    #[test]
    fn assign_opens_a_paused_invisible_player() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 12.0);

        rig.assign(&path, idle()).unwrap();

        assert_eq!(*rig.slot.status(), PlaybackStatus::Paused);
        assert_relative_eq!(rig.slot.duration(), 12.0);
        assert_eq!(rig.slot.alpha(), 0);
        assert_eq!(rig.slot.category(), Some(Category::Idle));
        assert_eq!(rig.slot.video(), Some(path.as_path()));
    }

    #[test]
    fn occupied_slot_rejects_second_assignment() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 12.0);
        rig.assign(&path, idle()).unwrap();

        let err = rig.assign(&path, idle()).unwrap_err();
        assert!(matches!(err, AssignError::AlreadyOccupied(SlotId::First)));
    }

    #[test]
    fn file_errors_leave_the_slot_empty() {
        let mut rig = Rig::new();
        let missing = rig.dir.path().join("missing.mp4");
        let folder = rig.dir.path().join("folder");
        fs::create_dir(&folder).unwrap();

        assert!(matches!(rig.assign(&missing, idle()), Err(AssignError::NotFound(_))));
        assert!(matches!(rig.assign(&folder, idle()), Err(AssignError::IsDirectory(_))));
        assert!(matches!(
            rig.slot.assign(&mut rig.engine, None, idle()),
            Err(AssignError::NoIdentifier)
        ));
        assert_eq!(*rig.slot.status(), PlaybackStatus::Empty);
        assert!(rig.slot.handle().is_none());
        assert!(rig.engine.opened().is_empty());
    }

    #[test]
    fn engine_failures_are_reported_distinctly() {
        let mut rig = Rig::new();
        let broken = rig.video("broken.mp4", 5.0);
        rig.engine.fail_open(&broken);
        let err = rig.assign(&broken, countdown()).unwrap_err();
        assert!(matches!(err, AssignError::EngineInitFailed { .. }));
        assert!(!rig.slot.has_signal());

        let untimed = rig.video("untimed.mp4", 5.0);
        rig.engine.untimed(&untimed);
        let err = rig.assign(&untimed, idle()).unwrap_err();
        assert!(matches!(err, AssignError::DurationUnavailable { .. }));
        assert_relative_eq!(rig.slot.duration(), -1.0);
        assert!(rig.slot.status().is_finished());
    }

    #[test]
    fn fade_is_bounded_and_monotonic_per_phase() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 4.0);
        let settings = SlotSettings {
            fade: FadeProfile {
                fade_in: 1.0,
                fade_out: 1.0,
                alpha_start: 10,
                alpha_play: 240,
                alpha_end: 0,
            },
            ..idle()
        };
        rig.assign(&path, settings).unwrap();
        rig.slot.start_playback().unwrap();

        let mut samples = Vec::new();
        while rig.slot.position() < 4.0 {
            rig.step(TICK);
            samples.push((rig.slot.position(), rig.slot.alpha()));
        }

        let fade_in: Vec<u8> = samples.iter().filter(|(p, _)| *p < 1.0).map(|(_, a)| *a).collect();
        let steady: Vec<u8> = samples
            .iter()
            .filter(|(p, _)| (1.0..=3.0).contains(p))
            .map(|(_, a)| *a)
            .collect();
        let fade_out: Vec<u8> = samples.iter().filter(|(p, _)| *p > 3.0).map(|(_, a)| *a).collect();

        assert!(fade_in.windows(2).all(|w| w[0] <= w[1]));
        assert!(steady.iter().all(|a| *a == 240));
        assert!(fade_out.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(*fade_out.last().unwrap(), 0);
        assert_eq!(*rig.slot.status(), PlaybackStatus::Stopped);
        assert!(!rig.slot.is_fading());
    }

    #[test]
    fn zero_fade_in_jumps_to_play_alpha() {
        let fade = FadeProfile {
            fade_in: 0.0,
            ..FadeProfile::default()
        };
        let (alpha, _) = fade_target(&fade, &PlaybackStatus::Playing, 0.0, 10.0).unwrap();
        assert_relative_eq!(alpha, 255.0);
    }

    #[test]
    fn paused_and_empty_slots_keep_their_alpha() {
        let fade = FadeProfile::default();
        assert!(fade_target(&fade, &PlaybackStatus::Paused, 5.0, 10.0).is_none());
        assert!(fade_target(&fade, &PlaybackStatus::Empty, 5.0, 10.0).is_none());
        let (alpha, fading) = fade_target(&fade, &PlaybackStatus::Stopped, 5.0, 10.0).unwrap();
        assert_relative_eq!(alpha, 0.0);
        assert!(!fading);

        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 10.0);
        rig.assign(&path, idle()).unwrap();
        rig.step(1.0);
        assert_eq!(rig.slot.alpha(), 0);
        assert_eq!(rig.slot.handle().unwrap().alpha(), 0);
    }

    #[test]
    fn volume_follows_alpha() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 10.0);
        rig.assign(&path, idle()).unwrap();
        rig.slot.start_playback().unwrap();
        rig.step(0.25);

        let handle = rig.slot.handle().unwrap();
        assert_eq!(handle.alpha(), rig.slot.alpha());
        assert_relative_eq!(handle.volume(), f64::from(rig.slot.alpha()) / 255.0);
        assert!(rig.slot.is_fading());
    }

    #[test]
    fn truncation_starts_the_fade_out_immediately() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 10.0);
        rig.assign(&path, idle()).unwrap();
        rig.slot.start_playback().unwrap();
        rig.step(9.6);

        let countdown_fade_out = 0.4;
        rig.slot.cancel_fade_in();
        rig.slot.set_fade_out(countdown_fade_out);
        rig.slot.truncate_duration_to_now(countdown_fade_out, TICK);

        assert_relative_eq!(rig.slot.fade().fade_in, 0.0);
        assert_relative_eq!(rig.slot.duration(), 9.6 + countdown_fade_out + TICK, epsilon = 1e-9);

        let mut elapsed = 0.0;
        while elapsed < countdown_fade_out + TICK - 1e-9 {
            rig.step(TICK);
            elapsed += TICK;
        }
        assert_eq!(rig.slot.alpha(), FadeProfile::default().alpha_end);
    }

    #[test]
    fn truncation_ignores_idle_slots() {
        let mut rig = Rig::new();
        rig.slot.truncate_duration_to_now(0.5, TICK);
        assert_relative_eq!(rig.slot.duration(), 0.0);
    }

    #[test]
    fn signal_pulses_once_before_the_end() {
        let mut rig = Rig::new();
        let path = rig.video("countdown.mp4", 5.0);
        rig.assign(&path, countdown()).unwrap();
        rig.slot.start_playback().unwrap();

        let mut on_at = None;
        let mut off_at = None;
        while rig.slot.position() < 5.0 {
            rig.step(TICK);
            let position = rig.slot.position();
            if rig.output.level() && on_at.is_none() {
                on_at = Some(position);
            }
            if on_at.is_some() && !rig.output.level() && off_at.is_none() {
                off_at = Some(position);
            }
        }

        assert_eq!(rig.output.writes(), 2);
        assert!((on_at.unwrap() - 3.0).abs() <= TICK + 1e-9);
        assert!((off_at.unwrap() - 4.0).abs() <= TICK + 1e-9);
    }

    #[test]
    fn idle_slots_never_touch_the_signal() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 3.0);
        rig.assign(&path, idle()).unwrap();
        rig.slot.start_playback().unwrap();
        while rig.slot.position() < 3.0 {
            rig.step(TICK);
        }
        assert_eq!(rig.output.writes(), 0);
    }

    #[test]
    fn release_is_idempotent_and_resets_the_slot() {
        let mut rig = Rig::new();
        let path = rig.video("countdown.mp4", 8.0);
        rig.assign(&path, countdown()).unwrap();
        rig.slot.start_playback().unwrap();
        rig.step(1.0);

        assert_eq!(rig.slot.release().unwrap(), Release::Released);
        assert_eq!(rig.engine.open_handles(), 0);
        assert_eq!(*rig.slot.status(), PlaybackStatus::Empty);
        assert!(rig.slot.duration() <= 0.0);
        assert!(!rig.slot.is_fading());
        assert!(!rig.slot.has_signal());

        assert_eq!(rig.slot.release().unwrap(), Release::AlreadyEmpty);
    }

    #[test]
    fn replace_requires_a_player() {
        let mut rig = Rig::new();
        let path = rig.video("countdown.mp4", 6.0);
        let err = rig.slot.replace_video(Some(&path), countdown()).unwrap_err();
        assert!(matches!(err, AssignError::Vacant(SlotId::First)));
    }

    #[test]
    fn replace_loads_into_the_same_player() {
        let mut rig = Rig::new();
        let idle_video = rig.video("idle.mp4", 10.0);
        let countdown_video = rig.video("countdown.mp4", 6.0);
        rig.assign(&idle_video, idle()).unwrap();

        rig.slot.replace_video(Some(&countdown_video), countdown()).unwrap();

        assert_eq!(rig.engine.open_handles(), 1);
        assert_relative_eq!(rig.slot.duration(), 6.0);
        assert_eq!(rig.slot.category(), Some(Category::Countdown));
        assert!(rig.slot.has_signal());
        assert_eq!(rig.slot.handle().unwrap().path(), countdown_video.as_path());
    }

    #[test]
    fn unreachable_player_is_faulted() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 10.0);
        rig.assign(&path, idle()).unwrap();
        rig.slot.handle_mut().unwrap().quit().unwrap();

        let status = rig.slot.refresh_status().clone();
        assert!(matches!(status, PlaybackStatus::Faulted(_)));
        assert!(status.is_free());
    }

    #[test]
    fn faulted_slot_is_not_revived_by_polling() {
        let mut rig = Rig::new();
        let idle_video = rig.video("idle.mp4", 10.0);
        let untimed = rig.video("untimed.mp4", 6.0);
        rig.engine.untimed(&untimed);
        rig.assign(&idle_video, idle()).unwrap();

        assert!(rig.slot.replace_video(Some(&untimed), countdown()).is_err());
        rig.step(TICK);

        assert!(matches!(rig.slot.status(), PlaybackStatus::Faulted(_)));
        assert!(rig.slot.status().is_finished());
    }

    #[test]
    fn overrun_is_detected_and_stopped() {
        let mut rig = Rig::new();
        let path = rig.video("a.mp4", 10.0);
        rig.assign(&path, idle()).unwrap();
        rig.slot.start_playback().unwrap();
        rig.step(2.0);
        rig.slot.truncate_duration_to_now(0.1, TICK);
        rig.step(0.2);

        assert!(rig.slot.overran(TICK));
        rig.slot.force_stop();
        assert_eq!(*rig.slot.status(), PlaybackStatus::Stopped);
    }
}
