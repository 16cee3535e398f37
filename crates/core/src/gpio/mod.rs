//! Digital inputs (trigger and exit buttons) and the signal output.

use std::{
    cell::Cell,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::Result;

/// A pin sampled once per tick. `true` means "active" (button pressed),
/// independent of the electrical polarity.
pub trait DigitalInput {
    fn is_active(&mut self) -> Result<bool>;
}

/// The secondary signal output. Setting the current level again is a no-op.
pub trait DigitalOutput {
    fn set(&mut self, on: bool) -> Result<()>;
    fn is_on(&self) -> bool;
}

/// Turns a raw level into single, debounced rising edges.
///
/// A level counts once it has been sampled unchanged on the two ticks
/// following the change; the edge fires exactly once while it is held.
#[derive(Debug, Clone, Default)]
pub struct DebouncedEdge {
    last: Option<bool>,
    stable_ticks: u32,
}

impl DebouncedEdge {
    pub const STABLE_TICKS: u32 = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw sample, returns `true` on a confirmed activation.
    pub fn sample(&mut self, level: bool) -> bool {
        if self.last == Some(level) {
            self.stable_ticks = self.stable_ticks.saturating_add(1);
        } else {
            self.stable_ticks = 0;
        }
        self.last = Some(level);
        level && self.stable_ticks == Self::STABLE_TICKS
    }
}

/// Whether the trigger input is currently honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerArm {
    Armed,
    /// A countdown is in flight.
    Disarmed,
    /// Counting down the grace ticks after the countdown was torn down.
    Rearming(u32),
}

impl TriggerArm {
    pub const GRACE_TICKS: u32 = 10;

    pub fn is_armed(self) -> bool {
        self == TriggerArm::Armed
    }

    /// Advances the grace counter by one tick.
    pub fn tick(self) -> Self {
        match self {
            TriggerArm::Rearming(0) | TriggerArm::Rearming(1) => TriggerArm::Armed,
            TriggerArm::Rearming(left) => TriggerArm::Rearming(left - 1),
            other => other,
        }
    }
}

/// Pin backed by a value file holding `0` or `1`, such as a sysfs GPIO.
#[derive(Debug, Clone)]
pub struct FilePin {
    value_path: PathBuf,
    active_low: bool,
    level: bool,
}

impl FilePin {
    pub fn new(value_path: impl Into<PathBuf>, active_low: bool) -> Self {
        Self {
            value_path: value_path.into(),
            active_low,
            level: false,
        }
    }

    /// Exports `pin` under the sysfs root when needed and sets its direction.
    pub fn sysfs(root: &Path, pin: u32, output: bool, active_low: bool) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{pin}"));
        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string())?;
        }
        let direction = if output { "out" } else { "in" };
        fs::write(pin_dir.join("direction"), direction)?;
        if output {
            // Start from a known inactive level.
            fs::write(pin_dir.join("value"), if active_low { "1" } else { "0" })?;
        }
        tracing::debug!(pin, direction, "gpio pin configured");
        Ok(Self::new(pin_dir.join("value"), active_low))
    }

    pub fn value_path(&self) -> &Path {
        &self.value_path
    }
}

impl DigitalInput for FilePin {
    fn is_active(&mut self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path)?;
        let high = raw.trim() == "1";
        Ok(high != self.active_low)
    }
}

impl DigitalOutput for FilePin {
    fn set(&mut self, on: bool) -> Result<()> {
        if on == self.level {
            return Ok(());
        }
        let high = on != self.active_low;
        fs::write(&self.value_path, if high { "1" } else { "0" })?;
        self.level = on;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.level
    }
}

/// Pin whose level lives in memory. Clones share the level.
#[derive(Debug, Clone, Default)]
pub struct MemoryPin {
    level: Rc<Cell<bool>>,
    writes: Rc<Cell<u32>>,
}

impl MemoryPin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the level seen by [`DigitalInput::is_active`].
    pub fn press(&self, active: bool) {
        self.level.set(active);
    }

    pub fn level(&self) -> bool {
        self.level.get()
    }

    /// Number of level changes made through [`DigitalOutput::set`].
    pub fn writes(&self) -> u32 {
        self.writes.get()
    }
}

impl DigitalInput for MemoryPin {
    fn is_active(&mut self) -> Result<bool> {
        Ok(self.level.get())
    }
}

impl DigitalOutput for MemoryPin {
    fn set(&mut self, on: bool) -> Result<()> {
        if self.level.get() != on {
            self.level.set(on);
            self.writes.set(self.writes.get() + 1);
        }
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.level.get()
    }
}

/// The three pins the installation is wired to.
pub struct IoPins {
    pub trigger: Box<dyn DigitalInput>,
    pub exit: Box<dyn DigitalInput>,
    pub signal: Box<dyn DigitalOutput>,
}

impl IoPins {
    pub fn new(
        trigger: impl DigitalInput + 'static,
        exit: impl DigitalInput + 'static,
        signal: impl DigitalOutput + 'static,
    ) -> Self {
        Self {
            trigger: Box::new(trigger),
            exit: Box::new(exit),
            signal: Box::new(signal),
        }
    }
}

impl std::fmt::Debug for IoPins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoPins")
            .field("signal_on", &self.signal.is_on())
            .finish()
    }
}
