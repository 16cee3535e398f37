use std::{fmt, path::PathBuf};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::PlaylistsConfig;

/// The three kinds of video the installation knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Idle,
    Countdown,
    Applause,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Idle, Category::Countdown, Category::Applause];

    fn index(self) -> usize {
        match self {
            Category::Idle => 0,
            Category::Countdown => 1,
            Category::Applause => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Idle => "idle",
            Category::Countdown => "countdown",
            Category::Applause => "applause",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the next video of a category is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Walk the list in order and wrap around.
    #[default]
    Sequential,
    /// Uniform draw on every selection.
    Random,
}

/// Direction the sequential cursor moves after a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Forward,
    Backward,
}

impl Step {
    fn offset(self) -> isize {
        match self {
            Step::Forward => 1,
            Step::Backward => -1,
        }
    }
}

/// Ordered video list plus the position of the next sequential pick.
#[derive(Debug, Clone)]
pub struct PlaylistCursor {
    videos: Vec<PathBuf>,
    index: usize,
    mode: SelectionMode,
}

impl PlaylistCursor {
    pub fn new(videos: Vec<PathBuf>, mode: SelectionMode, start_index: usize) -> Self {
        let index = if videos.is_empty() {
            0
        } else {
            start_index % videos.len()
        };
        Self { videos, index, mode }
    }

    pub fn videos(&self) -> &[PathBuf] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    fn shift(&mut self, step: Step) {
        let len = self.videos.len() as isize;
        if len == 0 {
            return;
        }
        self.index = (self.index as isize + step.offset()).rem_euclid(len) as usize;
    }
}

/// Hands out the next video per category.
///
/// Sequential categories keep a cursor that wraps in both directions, random
/// categories draw uniformly and keep no state between picks.
#[derive(Debug)]
pub struct PlaylistSelector {
    cursors: [PlaylistCursor; 3],
    rng: StdRng,
}

impl PlaylistSelector {
    pub fn new(idle: PlaylistCursor, countdown: PlaylistCursor, applause: PlaylistCursor) -> Self {
        Self {
            cursors: [idle, countdown, applause],
            rng: StdRng::from_os_rng(),
        }
    }

    /// Builds the selector from configuration. An empty applause list reuses
    /// the idle videos with a cursor of its own.
    pub fn from_config(playlists: &PlaylistsConfig) -> Self {
        let cursor = |category: Category| {
            let config = playlists.get(category);
            PlaylistCursor::new(config.videos.clone(), config.mode, config.start_index)
        };

        let mut applause = cursor(Category::Applause);
        if applause.is_empty() {
            let idle = &playlists.idle;
            applause = PlaylistCursor::new(
                idle.videos.clone(),
                playlists.applause.mode,
                playlists.applause.start_index,
            );
        }

        Self::new(cursor(Category::Idle), cursor(Category::Countdown), applause)
    }

    /// Replaces the random source, mainly so tests can be reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn cursor(&self, category: Category) -> &PlaylistCursor {
        &self.cursors[category.index()]
    }

    /// Returns the next video of `category`, moving the sequential cursor by
    /// `step`. `None` means the category has no videos at all.
    pub fn peek_next(&mut self, category: Category, step: Step) -> Option<PathBuf> {
        let cursor = &mut self.cursors[category.index()];
        if cursor.is_empty() {
            return None;
        }

        match cursor.mode {
            SelectionMode::Random => {
                let index = self.rng.random_range(0..cursor.len());
                Some(cursor.videos[index].clone())
            }
            SelectionMode::Sequential => {
                let video = cursor.videos[cursor.index].clone();
                cursor.shift(step);
                Some(video)
            }
        }
    }

    /// Undoes the last forward pick so the same video comes up again.
    pub fn rollback(&mut self, category: Category) {
        let cursor = &mut self.cursors[category.index()];
        if cursor.mode == SelectionMode::Sequential {
            cursor.shift(Step::Backward);
        }
    }
}
