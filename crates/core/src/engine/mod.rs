//! Boundary to the external player that decodes and renders video files.
//!
//! The orchestrator only sequences calls against these traits. Every call is
//! expected to return within a short, bounded time; an engine that cannot
//! answer reports an [`EngineError`] instead of blocking the poll loop.

use std::path::Path;

use crate::{render::RenderParams, EngineError};

#[cfg(unix)]
pub mod mpv;
pub mod sim;

#[cfg(unix)]
pub use mpv::{MpvEngine, MpvHandle};
pub use sim::{SimClock, SimulatedEngine, SimulatedHandle};

/// Playback state as reported by a live player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Playing,
    Paused,
    Stopped,
}

/// Factory for player handles.
pub trait PlaybackEngine {
    type Handle: PlaybackHandle;

    /// Opens `path` in a new player. The player starts paused, invisible and
    /// muted.
    fn open(&mut self, path: &Path, params: &RenderParams) -> Result<Self::Handle, EngineError>;
}

/// One running player bound to one video file.
pub trait PlaybackHandle {
    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    /// Absolute seek in seconds.
    fn seek(&mut self, seconds: f64) -> Result<(), EngineError>;
    fn set_alpha(&mut self, alpha: u8) -> Result<(), EngineError>;
    /// Linear level in `0.0..=1.0`.
    fn set_volume(&mut self, level: f64) -> Result<(), EngineError>;
    fn duration(&mut self) -> Result<f64, EngineError>;
    fn position(&mut self) -> Result<f64, EngineError>;
    fn status(&mut self) -> Result<EngineStatus, EngineError>;
    /// Replaces the loaded file in place; the player is left paused.
    fn load(&mut self, path: &Path) -> Result<(), EngineError>;
    /// Ends playback; the handle reports `Stopped` afterwards.
    fn stop(&mut self) -> Result<(), EngineError>;
    /// Tears the player down. Further calls fail with [`EngineError::Closed`].
    fn quit(&mut self) -> Result<(), EngineError>;
}
