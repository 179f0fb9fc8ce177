//! UcvNav - simulator connection and episode control for navigation agents
//!
//! This library drives a camera agent inside an external UnrealCV simulator
//! binary. It owns the simulator process and its control connection, tracks the
//! agent pose through an episode, computes a shaped navigation reward and turns
//! raw sensor replies into normalized observations for a training loop.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod core;
pub mod env;
pub mod metrics;
pub mod navigation;
pub mod sim_interface;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

// Re-export commonly used items for easier access
pub use crate::core::{EpisodeState, Observation, Pose, PoseTracker, ViewMode};
pub use env::{StepInfo, StepOutcome, UcvEnv};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use navigation::{Action, RewardOutcome, SimAgent, SpawnStrategy};
pub use sim_interface::{CancelToken, CommandGateway, SimSession, Transport};

/// Main configuration structure for UcvNav
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UcvConfig {
    /// Simulator binary, connection and restart settings
    pub simulator: SimulatorConfig,
    /// Map bounds and spawn selection
    pub map: MapConfig,
    /// Commanded motion per action
    pub motion: MotionConfig,
    /// Reward shaping constants
    pub reward: RewardConfig,
    /// Observation requested by the episode adapter
    pub observation: ObservationConfig,
    /// Trajectory export
    pub trajectory: TrajectoryConfig,
    /// Seed for heading and spawn sampling; entropy-seeded when absent
    pub seed: Option<u64>,
}

/// Simulator process and connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Directory holding the simulator binary, one entry per worker slot
    pub binary_dirs: Vec<PathBuf>,
    /// File name of the simulator binary inside its directory
    pub binary_name: String,
    /// Host the simulator listens on
    pub host: String,
    /// Name of the init file written beside the binary
    pub init_file_name: String,
    /// Observation width declared in the init file
    pub observation_width: u32,
    /// Observation height declared in the init file
    pub observation_height: u32,
    /// Range the initial port is drawn from
    pub port_range: (u16, u16),
    /// How long the one-off launch that creates the init file runs
    pub init_launch_ms: u64,
    /// Delay between writing the init file and launching
    pub pre_launch_ms: u64,
    /// Delay between launching and connecting
    pub launch_settle_ms: u64,
    /// Delay between connecting and checking the connection
    pub connect_settle_ms: u64,
    /// I/O timeout for connect and request round trips; `None` blocks forever
    pub request_timeout_ms: Option<u64>,
    /// Ceiling on consecutive restarts for one request; `None` retries forever
    pub max_restarts: Option<u32>,
}

/// Map bounds and spawn selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Minimum x coordinate (cm)
    pub x_min: i32,
    /// Maximum x coordinate (cm)
    pub x_max: i32,
    /// Minimum y coordinate (cm)
    pub y_min: i32,
    /// Maximum y coordinate (cm)
    pub y_max: i32,
    /// Altitude of random start and goal locations (cm)
    pub spawn_altitude: f64,
    /// Draw start and goal uniformly inside the bounds instead of from the catalog
    pub random_spawn: bool,
    /// Location catalog, resolved beside the simulator binary when relative
    pub locations_file: PathBuf,
    /// Length of the forward collision probe (cm)
    pub probe_step: f64,
    /// Ceiling on collision-probed spawn candidates; `None` searches forever
    pub max_spawn_attempts: Option<u32>,
    /// Pause after a rejected spawn candidate
    pub spawn_retry_delay_ms: u64,
}

/// Commanded motion per action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Forward distance per step (cm)
    pub speed: f64,
    /// Yaw change of a turning step (degrees)
    pub turn_angle: f64,
}

/// Reward shaping constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward returned when the agent ends a step inside the goal radius
    pub goal_reward: f64,
    /// Scale of the goal-direction shaping term
    pub goal_direction_reward: f64,
    /// Penalty added on collision (negative)
    pub crash_reward: f64,
    /// Distance to the goal that counts as reached (cm)
    pub goal_radius: f64,
    /// Also end the episode when the goal is reached
    pub terminate_on_goal: bool,
}

/// Observation requested by the episode adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Color or depth sensor
    pub view_mode: ViewMode,
    /// Average color channels into one plane
    pub grayscale: bool,
}

/// Trajectory export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Hand finished trajectories to the trajectory file on reset
    pub save: bool,
    /// Directory for `trajectory_<worker>.yaml`
    pub directory: PathBuf,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            binary_dirs: Vec::new(),
            binary_name: "outdoor_lite".to_string(),
            host: "localhost".to_string(),
            init_file_name: "unrealcv.ini".to_string(),
            observation_width: 84,
            observation_height: 84,
            port_range: (2000, 7000),
            init_launch_ms: 5000,
            pre_launch_ms: 2000,
            launch_settle_ms: 5000,
            connect_settle_ms: 2000,
            request_timeout_ms: Some(30_000),
            max_restarts: None,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            x_min: -4000,
            x_max: 4000,
            y_min: -4000,
            y_max: 4000,
            spawn_altitude: 150.0,
            random_spawn: true,
            locations_file: PathBuf::from("locations.yaml"),
            probe_step: 50.0,
            max_spawn_attempts: Some(1000),
            spawn_retry_delay_ms: 1000,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            speed: 20.0,
            turn_angle: 20.0,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        RewardConfig {
            goal_reward: 1.0,
            goal_direction_reward: 1.0,
            crash_reward: -10.0,
            goal_radius: 200.0,
            terminate_on_goal: false,
        }
    }
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        TrajectoryConfig {
            save: false,
            directory: PathBuf::from("."),
        }
    }
}

impl UcvConfig {
    /// Load a configuration from a YAML file; missing keys take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, UcvError> {
        let file = File::open(path.as_ref())?;
        let config: UcvConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject settings the simulator loop cannot run with
    pub fn validate(&self) -> Result<(), UcvError> {
        if self.map.x_min > self.map.x_max || self.map.y_min > self.map.y_max {
            return Err(UcvError::Config(format!(
                "inverted map bounds x=({}, {}) y=({}, {})",
                self.map.x_min, self.map.x_max, self.map.y_min, self.map.y_max
            )));
        }
        if !(self.motion.speed > 0.0) {
            return Err(UcvError::Config(format!(
                "speed must be positive, got {}",
                self.motion.speed
            )));
        }
        if !(self.reward.goal_radius >= 0.0) {
            return Err(UcvError::Config("goal radius must not be negative".to_string()));
        }
        let (low, high) = self.simulator.port_range;
        if low >= high {
            return Err(UcvError::Config(format!("empty port range {}..{}", low, high)));
        }
        Ok(())
    }

    /// Binary directory assigned to a worker slot
    pub fn binary_dir(&self, worker: usize) -> Result<&Path, UcvError> {
        self.simulator
            .binary_dirs
            .get(worker)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                UcvError::Config(format!(
                    "no simulator directory configured for worker slot {} ({} configured)",
                    worker,
                    self.simulator.binary_dirs.len()
                ))
            })
    }
}

/// UcvNav error types
#[derive(Debug, thiserror::Error)]
pub enum UcvError {
    /// The init file cannot be written, even after a launch meant to create it
    #[error("simulator unavailable: {0}")]
    SessionUnavailable(String),
    /// Replies stayed empty through the configured number of restarts
    #[error("connection lost after {attempts} restart attempts")]
    ConnectionLost {
        /// Restarts tried before giving up
        attempts: u32,
    },
    /// Re-issuing the last pose after a restart was rejected
    #[error("resume after restart rejected: {0}")]
    ResumeRejected(String),
    /// No collision-free start location within the attempt ceiling
    #[error("no collision-free spawn location after {0} attempts")]
    SpawnSearchExhausted(u32),
    /// Connect or round trip exceeded the I/O timeout
    #[error("simulator timed out: {0}")]
    Timeout(String),
    /// The simulator answered a command with something other than `ok`
    #[error("command `{command}` rejected with reply `{reply}`")]
    CommandRejected {
        /// Command sent
        command: String,
        /// Reply received
        reply: String,
    },
    /// A numeric reply did not parse
    #[error("malformed reply to `{command}`: `{reply}`")]
    MalformedReply {
        /// Command sent
        command: String,
        /// Reply received
        reply: String,
    },
    /// Image or array payload cannot be decoded
    #[error("decode error: {0}")]
    Decode(String),
    /// Location catalog missing, too short or indexed out of range
    #[error("location catalog error: {0}")]
    Catalog(String),
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
    /// Unknown action name or index
    #[error("invalid action: {0}")]
    InvalidAction(String),
    /// The worker was cancelled from outside
    #[error("worker cancelled")]
    Cancelled,
    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// YAML error
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "map:\n  random_spawn: false\nmotion:\n  speed: 35.0\n";
        let config: UcvConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(!config.map.random_spawn);
        assert_eq!(config.map.x_min, -4000);
        assert_eq!(config.motion.speed, 35.0);
        assert_eq!(config.motion.turn_angle, 20.0);
        assert_eq!(config.reward.crash_reward, -10.0);
        assert_eq!(config.simulator.init_file_name, "unrealcv.ini");
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case("map:\n  x_min: 10\n  x_max: -10\n")]
    #[case("motion:\n  speed: 0.0\n")]
    #[case("simulator:\n  port_range: [5000, 5000]\n")]
    fn invalid_settings_are_rejected(#[case] yaml: &str) {
        let config: UcvConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(UcvError::Config(_))));
    }

    #[test]
    fn sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/ucv_nav.yaml");
        let config = UcvConfig::load(path).unwrap();

        assert_eq!(config.simulator.binary_dirs.len(), 2);
        assert_eq!(config.simulator.max_restarts, Some(20));
        assert_eq!(config.observation.view_mode, ViewMode::Lit);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn binary_dir_requires_a_slot() {
        let mut config = UcvConfig::default();
        config.simulator.binary_dirs = vec![PathBuf::from("/opt/sim/a")];

        assert_eq!(config.binary_dir(0).unwrap(), Path::new("/opt/sim/a"));
        assert!(matches!(config.binary_dir(1), Err(UcvError::Config(_))));
    }
}
