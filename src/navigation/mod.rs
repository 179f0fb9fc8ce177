//! Navigation system for UcvNav
//!
//! This module holds the simulated agent of one worker: episode control (spawn,
//! goal, reset), discrete motion with collision detection, the shaped reward and
//! the goal-direction signal.

pub mod controller;
pub mod episode;
pub mod planner;
pub mod reward;

pub use controller::{ACTION_SPACE, Action};
pub use planner::{CatalogLocation, CatalogSpawn, LocationCatalog, RandomSpawn, Spawn, SpawnContext, SpawnStrategy};
pub use reward::RewardOutcome;

use crate::core::memory::{TrajectoryFile, TrajectorySink};
use crate::core::perception::{self, Observation, ViewMode};
use crate::core::{EpisodeState, Pose, PoseTracker};
use crate::metrics::{MetricsSnapshot, WorkerMetrics};
use crate::sim_interface::{CancelToken, CommandGateway, SimSession, Transport};
use crate::{MotionConfig, RewardConfig, UcvConfig, UcvError};
use log::info;
use nalgebra::Vector3;

/// Agent of one worker: one simulator session, one trajectory, one goal
pub struct SimAgent {
    name: String,
    gateway: CommandGateway,
    tracker: PoseTracker,
    state: EpisodeState,
    spawn: Box<dyn SpawnStrategy>,
    goal: Vector3<f64>,
    motion: MotionConfig,
    reward: RewardConfig,
    rng: fastrand::Rng,
    sink: Option<Box<dyn TrajectorySink>>,
    metrics: WorkerMetrics,
    last_outcome: Option<RewardOutcome>,
}

impl SimAgent {
    /// Launches the simulator of worker slot `worker` and starts the first episode
    pub fn new(config: &UcvConfig, worker: usize) -> Result<Self, UcvError> {
        config.validate()?;
        let name = format!("worker_{}", worker);
        let cancel = CancelToken::new();

        // Catalog problems are fatal, so load it before any process is launched
        let spawn = planner::from_config(config, config.binary_dir(worker)?, cancel.clone())?;
        let session = SimSession::from_config(config, worker, &name)?;

        let mut worker_config = config.clone();
        worker_config.seed = config.seed.map(|seed| seed.wrapping_add(worker as u64));
        let mut agent = SimAgent::with_transport(&name, Box::new(session), spawn, &worker_config, cancel)?;
        if config.trajectory.save {
            agent.set_trajectory_sink(Box::new(TrajectoryFile::for_worker(
                &config.trajectory.directory,
                &name,
            )));
        }
        Ok(agent)
    }

    /// Builds an agent on any transport, connects and starts the first episode
    pub fn with_transport(
        name: &str,
        transport: Box<dyn Transport + Send>,
        spawn: Box<dyn SpawnStrategy>,
        config: &UcvConfig,
        cancel: CancelToken,
    ) -> Result<Self, UcvError> {
        let mut gateway = CommandGateway::new(name, transport, config.simulator.max_restarts, cancel);
        gateway.connect()?;

        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let mut agent = SimAgent {
            name: name.to_string(),
            gateway,
            tracker: PoseTracker::new(),
            state: EpisodeState::new(),
            spawn,
            goal: Vector3::zeros(),
            motion: config.motion.clone(),
            reward: config.reward.clone(),
            rng,
            sink: None,
            metrics: WorkerMetrics::default(),
            last_outcome: None,
        };
        agent.new_episode(false)?;
        Ok(agent)
    }

    /// Where finished trajectories go when an episode is reset with saving
    pub fn set_trajectory_sink(&mut self, sink: Box<dyn TrajectorySink>) {
        self.sink = Some(sink);
    }

    /// Worker name used in log lines
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Goal of the current episode
    pub fn goal(&self) -> &Vector3<f64> {
        &self.goal
    }

    /// Poses of the current episode
    pub fn trajectory(&self) -> &[Pose] {
        self.tracker.poses()
    }

    /// Current pose; queries the simulator only when nothing is tracked yet
    pub fn current_pose(&mut self) -> Result<Pose, UcvError> {
        self.tracker.current_pose(&mut self.gateway)
    }

    /// Whether the last step ended the episode
    pub fn is_episode_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Episode state
    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    /// Reward breakdown of the last step
    pub fn last_outcome(&self) -> Option<&RewardOutcome> {
        self.last_outcome.as_ref()
    }

    /// Fetches and decodes a sensor frame
    pub fn observe(&mut self, view_mode: ViewMode, grayscale: bool) -> Result<Observation, UcvError> {
        let resume_from = self.tracker.last().cloned();
        let reply = self.gateway.send(view_mode.command(), resume_from.as_ref())?;
        perception::decode(view_mode, &reply, grayscale)
    }

    /// sin of the bearing error between heading and goal; 0 when the goal is dead ahead or behind
    pub fn goal_direction(&mut self) -> Result<f64, UcvError> {
        let pose = self.current_pose()?;
        Ok(reward::goal_direction_signal(&pose, &self.goal))
    }

    /// Counters for an external aggregator
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.gateway.restarts())
    }

    /// Token that aborts this worker's retry loops from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.gateway.cancel_token()
    }

    /// Disconnects and terminates the simulator
    pub fn shut_down(&mut self) {
        info!("[{}] shutting down after {} episodes", self.name, self.state.episode());
        self.gateway.shut_down();
    }
}
