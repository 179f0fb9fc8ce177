// core/state.rs

// Episode state machine: Resetting while a new episode (or a resume) is being set up,
// Active once the agent stands at its spawn pose. The terminal flag is raised by a
// collision during a step and cleared only by the next episode start.

// Dependencies
use log::info;

/// Episode phases
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Episode in progress
    Active,
    /// Choosing spawn/goal and relocating the agent
    Resetting,
}

/// Episode state: mode, terminal flag and episode counter
#[derive(Clone, Debug)]
pub struct EpisodeState {
    mode: Mode,
    finished: bool,
    episode: u64,
}

impl EpisodeState {
    /// State before the first episode
    pub fn new() -> Self {
        EpisodeState {
            mode: Mode::Resetting,
            finished: false,
            episode: 0,
        }
    }

    /// Enters Resetting
    pub fn begin_reset(&mut self) {
        self.mode = Mode::Resetting;
    }

    /// Enters Active for a fresh episode and clears the terminal flag
    pub fn activate(&mut self) {
        self.mode = Mode::Active;
        self.finished = false;
        self.episode += 1;
    }

    /// Raises the terminal flag
    pub fn finish(&mut self) {
        if !self.finished {
            info!("Episode {} finished", self.episode);
        }
        self.finished = true;
    }

    /// Whether the training loop should reset
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Episodes started so far
    pub fn episode(&self) -> u64 {
        self.episode
    }
}

impl Default for EpisodeState {
    fn default() -> Self {
        EpisodeState::new()
    }
}
