//! Core library of the showloop installation player.
//!
//! Two playback slots are driven by a fixed-tick state machine that loops
//! idle videos, swaps in a countdown when the trigger button is pressed and
//! follows it with applause. Each module owns one concern: configuration,
//! playlists, the player boundary, the GPIO pins, a single playback slot and
//! the orchestrator tying them together.

pub mod config;
pub mod engine;
pub mod error;
pub mod gpio;
pub mod orchestrator;
pub mod playlist;
pub mod render;
pub mod slot;
pub mod timeline;

pub use config::{FadeProfile, Geometry, GpioConfig, PlaylistConfig, PlaylistsConfig, ShowConfig, SignalTiming};
pub use engine::{EngineStatus, PlaybackEngine, PlaybackHandle, SimClock, SimulatedEngine};
pub use error::{AssignError, EngineError, Result, ShowloopError};
pub use gpio::{DebouncedEdge, DigitalInput, DigitalOutput, FilePin, IoPins, MemoryPin, TriggerArm};
pub use orchestrator::{Orchestrator, OrchestratorState, RunOutcome};
pub use playlist::{Category, PlaylistCursor, PlaylistSelector, SelectionMode, Step};
pub use render::RenderParams;
pub use slot::{PlaybackSlot, PlaybackStatus, SlotId};
pub use timeline::TickClock;

#[cfg(unix)]
pub use engine::MpvEngine;
