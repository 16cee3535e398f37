use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{playlist::SelectionMode, Category, Result, ShowloopError};

/// Top-level configuration structure for the installation player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShowConfig {
    /// Period of the poll loop in seconds.
    pub tick_period: f64,
    pub playlists: PlaylistsConfig,
    /// Fade profile shared by idle and applause videos.
    pub idle_fade: FadeProfile,
    pub countdown_fade: FadeProfile,
    pub signal: SignalTiming,
    pub screen: Geometry,
    pub gpio: GpioConfig,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            tick_period: 0.02,
            playlists: PlaylistsConfig::default(),
            idle_fade: FadeProfile::default(),
            countdown_fade: FadeProfile::default(),
            signal: SignalTiming::default(),
            screen: Geometry::default(),
            gpio: GpioConfig::default(),
        }
    }
}

impl ShowConfig {
    /// Reads a JSON configuration file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Per-user configuration file, `$HOME/.config/showloop.json`.
    pub fn user_config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("showloop.json"))
    }

    /// Fade profile applied to videos of the given category.
    pub fn fade_for(&self, category: Category) -> FadeProfile {
        match category {
            Category::Idle | Category::Applause => self.idle_fade,
            Category::Countdown => self.countdown_fade,
        }
    }

    /// Overrides every fade window, the way a single `fadetime` setting does.
    pub fn set_all_fade_times(&mut self, seconds: f64) {
        for profile in [&mut self.idle_fade, &mut self.countdown_fade] {
            profile.fade_in = seconds;
            profile.fade_out = seconds;
        }
    }

    /// Rejects values the state machine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_period.is_nan() || self.tick_period <= 0.0 {
            return Err(invalid(format!(
                "tick_period must be positive, got {}",
                self.tick_period
            )));
        }
        for (name, profile) in [("idle_fade", &self.idle_fade), ("countdown_fade", &self.countdown_fade)] {
            if profile.fade_in < 0.0 || profile.fade_out < 0.0 {
                return Err(invalid(format!("{name} fade windows must not be negative")));
            }
        }
        if self.signal.off_offset >= self.signal.on_offset {
            return Err(invalid(format!(
                "signal off_offset ({}) must be smaller than on_offset ({})",
                self.signal.off_offset, self.signal.on_offset
            )));
        }
        for category in Category::ALL {
            let playlist = self.playlists.get(category);
            if !playlist.videos.is_empty() && playlist.start_index >= playlist.videos.len() {
                return Err(invalid(format!(
                    "{category} start_index {} is out of range for {} videos",
                    playlist.start_index,
                    playlist.videos.len()
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> ShowloopError {
    ShowloopError::InvalidConfig(message)
}

/// Video lists for the three categories.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaylistsConfig {
    pub idle: PlaylistConfig,
    pub countdown: PlaylistConfig,
    /// Falls back to the idle videos when left empty.
    pub applause: PlaylistConfig,
}

impl PlaylistsConfig {
    pub fn get(&self, category: Category) -> &PlaylistConfig {
        match category {
            Category::Idle => &self.idle,
            Category::Countdown => &self.countdown,
            Category::Applause => &self.applause,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut PlaylistConfig {
        match category {
            Category::Idle => &mut self.idle,
            Category::Countdown => &mut self.countdown,
            Category::Applause => &mut self.applause,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaylistConfig {
    pub videos: Vec<PathBuf>,
    pub mode: SelectionMode,
    pub start_index: usize,
}

/// Opacity ramp of a single video. Alpha values use the 0..=255 range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FadeProfile {
    pub fade_in: f64,
    pub fade_out: f64,
    pub alpha_start: u8,
    pub alpha_play: u8,
    pub alpha_end: u8,
}

impl Default for FadeProfile {
    fn default() -> Self {
        Self {
            fade_in: 0.5,
            fade_out: 0.5,
            alpha_start: 0,
            alpha_play: 255,
            alpha_end: 0,
        }
    }
}

/// When the secondary output pulses, in seconds before the countdown ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalTiming {
    pub on_offset: f64,
    pub off_offset: f64,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            on_offset: 2.0,
            off_offset: 1.0,
        }
    }
}

/// Screen rectangle the videos are rendered into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
        }
    }
}

/// Pin assignment for the button inputs and the signal output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GpioConfig {
    pub sysfs_root: PathBuf,
    pub trigger_pin: u32,
    pub exit_pin: u32,
    pub signal_pin: u32,
    /// Buttons pull the pin to ground when pressed.
    pub active_low_inputs: bool,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            trigger_pin: 17,
            exit_pin: 23,
            signal_pin: 7,
            active_low_inputs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config: ShowConfig = serde_json::from_str(
            r#"{
                "tick_period": 0.04,
                "playlists": { "idle": { "videos": ["a.mp4", "b.mp4"], "mode": "random" } },
                "countdown_fade": { "fade_out": 1.5 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.tick_period, 0.04);
        assert_eq!(config.playlists.idle.videos.len(), 2);
        assert_eq!(config.playlists.idle.mode, SelectionMode::Random);
        assert_eq!(config.playlists.countdown.mode, SelectionMode::Sequential);
        assert_eq!(config.countdown_fade.fade_out, 1.5);
        assert_eq!(config.countdown_fade.fade_in, 0.5);
        assert_eq!(config.countdown_fade.alpha_play, 255);
        assert_eq!(config.gpio.trigger_pin, 17);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("showloop.json");
        std::fs::write(&path, r#"{ "signal": { "on_offset": 3.0, "off_offset": 0.5 } }"#).unwrap();

        let config = ShowConfig::load(&path).unwrap();
        assert_eq!(config.signal.on_offset, 3.0);
        assert_eq!(config.signal.off_offset, 0.5);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ tick_period = 1 }").unwrap();

        let err = ShowConfig::load(&path).unwrap_err();
        assert!(matches!(err, ShowloopError::Config(_)));
    }

    #[test]
    fn rejects_inverted_signal_window() {
        let mut config = ShowConfig::default();
        config.signal.off_offset = 2.5;
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("off_offset"));
    }

    #[test]
    fn rejects_non_positive_tick() {
        let mut config = ShowConfig::default();
        config.tick_period = 0.0;
        assert!(config.validate().is_err());
        config.tick_period = f64::NAN;
        assert!(config.validate().is_err());
        config.tick_period = -0.02;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_start_index_out_of_range() {
        let mut config = ShowConfig::default();
        config.playlists.idle.videos = vec![PathBuf::from("a.mp4")];
        config.playlists.idle.start_index = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn global_fade_time_overrides_both_profiles() {
        let mut config = ShowConfig::default();
        config.set_all_fade_times(1.25);
        assert_eq!(config.fade_for(Category::Idle).fade_in, 1.25);
        assert_eq!(config.fade_for(Category::Applause).fade_out, 1.25);
        assert_eq!(config.fade_for(Category::Countdown).fade_out, 1.25);
    }
}
