//! In-process engine that plays "videos" against a clock instead of a screen.
//!
//! Positions advance with the [`SimClock`], so tests can step time manually
//! and the application can run a dry rehearsal on the wall clock.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    rc::Rc,
    time::Instant,
};

use crate::{render::RenderParams, EngineError};

use super::{EngineStatus, PlaybackEngine, PlaybackHandle};

/// Time source shared by the simulated engine and all of its handles.
#[derive(Debug, Clone)]
pub enum SimClock {
    Manual(Rc<Cell<f64>>),
    Wall(Instant),
}

impl SimClock {
    pub fn manual() -> Self {
        Self::Manual(Rc::new(Cell::new(0.0)))
    }

    pub fn wall() -> Self {
        Self::Wall(Instant::now())
    }

    /// Seconds since the clock was created.
    pub fn now(&self) -> f64 {
        match self {
            Self::Manual(time) => time.get(),
            Self::Wall(origin) => origin.elapsed().as_secs_f64(),
        }
    }

    /// Moves a manual clock forward. Wall clocks ignore this.
    pub fn advance(&self, seconds: f64) {
        if let Self::Manual(time) = self {
            time.set(time.get() + seconds.max(0.0));
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    durations: HashMap<PathBuf, f64>,
    failing: HashSet<PathBuf>,
    untimed: HashSet<PathBuf>,
    opened: Vec<PathBuf>,
    open_handles: usize,
}

/// Engine whose players are plain structs driven by a [`SimClock`].
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    clock: SimClock,
    default_duration: f64,
    ledger: Rc<RefCell<Ledger>>,
}

impl SimulatedEngine {
    pub fn new(clock: SimClock, default_duration: f64) -> Self {
        Self {
            clock,
            default_duration,
            ledger: Rc::new(RefCell::new(Ledger::default())),
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn set_duration(&self, path: impl Into<PathBuf>, seconds: f64) {
        self.ledger.borrow_mut().durations.insert(path.into(), seconds);
    }

    /// Makes [`PlaybackEngine::open`] fail for `path`.
    pub fn fail_open(&self, path: impl Into<PathBuf>) {
        self.ledger.borrow_mut().failing.insert(path.into());
    }

    /// Makes duration queries fail for `path`.
    pub fn untimed(&self, path: impl Into<PathBuf>) {
        self.ledger.borrow_mut().untimed.insert(path.into());
    }

    /// Every path opened or loaded so far, in order.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.ledger.borrow().opened.clone()
    }

    /// Number of players not yet quit.
    pub fn open_handles(&self) -> usize {
        self.ledger.borrow().open_handles
    }
}

impl PlaybackEngine for SimulatedEngine {
    type Handle = SimulatedHandle;

    fn open(&mut self, path: &Path, params: &RenderParams) -> Result<SimulatedHandle, EngineError> {
        let mut ledger = self.ledger.borrow_mut();
        if ledger.failing.contains(path) {
            return Err(EngineError::Unavailable(format!(
                "simulated failure opening {}",
                path.display()
            )));
        }
        ledger.opened.push(path.to_path_buf());
        ledger.open_handles += 1;
        drop(ledger);

        tracing::trace!(video = %path.display(), layer = params.layer, "simulated player opened");
        let mut handle = SimulatedHandle {
            clock: self.clock.clone(),
            ledger: self.ledger.clone(),
            default_duration: self.default_duration,
            path: PathBuf::new(),
            duration: 0.0,
            offset: 0.0,
            started_at: None,
            stopped: false,
            closed: false,
            alpha: params.initial_alpha,
            volume: 0.0,
        };
        handle.reset_to(path);
        Ok(handle)
    }
}

/// A simulated player.
#[derive(Debug)]
pub struct SimulatedHandle {
    clock: SimClock,
    ledger: Rc<RefCell<Ledger>>,
    default_duration: f64,
    path: PathBuf,
    duration: f64,
    offset: f64,
    started_at: Option<f64>,
    stopped: bool,
    closed: bool,
    alpha: u8,
    volume: f64,
}

impl SimulatedHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn alpha(&self) -> u8 {
        self.alpha
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    fn reset_to(&mut self, path: &Path) {
        self.duration = self
            .ledger
            .borrow()
            .durations
            .get(path)
            .copied()
            .unwrap_or(self.default_duration);
        self.path = path.to_path_buf();
        self.offset = 0.0;
        self.started_at = None;
        self.stopped = false;
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn current_position(&self) -> f64 {
        let position = match self.started_at {
            Some(started) => self.offset + (self.clock.now() - started),
            None => self.offset,
        };
        position.min(self.duration)
    }
}

impl PlaybackHandle for SimulatedHandle {
    fn play(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.offset = self.current_position();
        self.started_at = None;
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.offset = seconds.clamp(0.0, self.duration);
        if self.started_at.is_some() {
            self.started_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn set_alpha(&mut self, alpha: u8) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.alpha = alpha;
        Ok(())
    }

    fn set_volume(&mut self, level: f64) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.volume = level.clamp(0.0, 1.0);
        Ok(())
    }

    fn duration(&mut self) -> Result<f64, EngineError> {
        self.ensure_open()?;
        if self.ledger.borrow().untimed.contains(&self.path) {
            return Err(EngineError::Unavailable("duration unknown".into()));
        }
        Ok(self.duration)
    }

    fn position(&mut self) -> Result<f64, EngineError> {
        self.ensure_open()?;
        Ok(self.current_position())
    }

    fn status(&mut self) -> Result<EngineStatus, EngineError> {
        self.ensure_open()?;
        let status = if self.stopped || self.current_position() >= self.duration {
            EngineStatus::Stopped
        } else if self.started_at.is_some() {
            EngineStatus::Playing
        } else {
            EngineStatus::Paused
        };
        Ok(status)
    }

    fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.ledger.borrow_mut().opened.push(path.to_path_buf());
        self.reset_to(path);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.offset = self.current_position();
        self.started_at = None;
        self.stopped = true;
        Ok(())
    }

    fn quit(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.closed = true;
        let mut ledger = self.ledger.borrow_mut();
        ledger.open_handles = ledger.open_handles.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::config::Geometry;

    fn params() -> RenderParams {
        RenderParams::new(52, Geometry::default())
    }

    #[test]
    fn plays_against_manual_clock() {
        let mut engine = SimulatedEngine::new(SimClock::manual(), 10.0);
        let mut handle = engine.open(Path::new("a.mp4"), &params()).unwrap();

        assert_eq!(handle.status().unwrap(), EngineStatus::Paused);
        engine.clock().advance(1.0);
        assert_relative_eq!(handle.position().unwrap(), 0.0);

        handle.play().unwrap();
        engine.clock().advance(2.5);
        assert_eq!(handle.status().unwrap(), EngineStatus::Playing);
        assert_relative_eq!(handle.position().unwrap(), 2.5);

        handle.seek(9.0).unwrap();
        engine.clock().advance(1.5);
        assert_relative_eq!(handle.position().unwrap(), 10.0);
        assert_eq!(handle.status().unwrap(), EngineStatus::Stopped);
    }

    #[test]
    fn honours_injected_failures() {
        let mut engine = SimulatedEngine::new(SimClock::manual(), 10.0);
        engine.fail_open("broken.mp4");
        engine.untimed("untimed.mp4");
        engine.set_duration("short.mp4", 3.0);

        assert!(engine.open(Path::new("broken.mp4"), &params()).is_err());
        let mut untimed = engine.open(Path::new("untimed.mp4"), &params()).unwrap();
        assert!(untimed.duration().is_err());
        let mut short = engine.open(Path::new("short.mp4"), &params()).unwrap();
        assert_relative_eq!(short.duration().unwrap(), 3.0);
        assert_eq!(engine.opened().len(), 2);
    }

    #[test]
    fn closed_handles_refuse_commands() {
        let mut engine = SimulatedEngine::new(SimClock::manual(), 10.0);
        let mut handle = engine.open(Path::new("a.mp4"), &params()).unwrap();
        assert_eq!(engine.open_handles(), 1);

        handle.quit().unwrap();
        assert_eq!(engine.open_handles(), 0);
        assert!(matches!(handle.position(), Err(EngineError::Closed)));
        assert!(matches!(handle.quit(), Err(EngineError::Closed)));
    }

    #[test]
    fn load_replaces_video_in_place() {
        let mut engine = SimulatedEngine::new(SimClock::manual(), 10.0);
        engine.set_duration("b.mp4", 4.0);
        let mut handle = engine.open(Path::new("a.mp4"), &params()).unwrap();
        handle.play().unwrap();
        engine.clock().advance(3.0);

        handle.load(Path::new("b.mp4")).unwrap();
        assert_eq!(handle.path(), Path::new("b.mp4"));
        assert_eq!(handle.status().unwrap(), EngineStatus::Paused);
        assert_relative_eq!(handle.position().unwrap(), 0.0);
        assert_relative_eq!(handle.duration().unwrap(), 4.0);
    }
}
