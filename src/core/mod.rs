// core/mod.rs

// Declares and exposes the agent-side building blocks: pose tracking, observation
// decoding, episode state and trajectory persistence. None of these talk to the
// simulator on their own except the pose tracker's one-time seeding query.

pub mod localization;
pub mod memory;
pub mod perception;
pub mod state;

// Re-export key types for a unified API
pub use localization::{Pose, PoseTracker};
pub use memory::{TrajectoryFile, TrajectoryRecord, TrajectorySink};
pub use perception::{Observation, ViewMode};
pub use state::{EpisodeState, Mode};
