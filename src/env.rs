//! Episode adapter for training loops
//!
//! Wraps a [`SimAgent`] behind the reset/step interface of a discrete-action
//! environment: actions are indices into [`ACTION_SPACE`], observations come from
//! the configured sensor.

use crate::core::Observation;
use crate::navigation::{ACTION_SPACE, Action, SimAgent};
use crate::{ObservationConfig, UcvConfig, UcvError};
use serde::Serialize;

/// Side information of a step
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StepInfo {
    /// sin of the heading error toward the goal after the step
    pub goal_direction: f64,
    /// Step was blocked
    pub collision: bool,
    /// Step ended inside the goal radius
    pub goal_reached: bool,
}

/// Result of [`UcvEnv::step`]
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Observation after the step
    pub observation: Observation,
    /// Reward of the step
    pub reward: f64,
    /// Episode is over
    pub terminal: bool,
    /// Side information
    pub info: StepInfo,
}

/// Discrete-action environment over one simulator
pub struct UcvEnv {
    agent: SimAgent,
    observation: ObservationConfig,
    save_trajectories: bool,
    width: usize,
    height: usize,
}

impl UcvEnv {
    /// Launches worker slot `worker`
    pub fn new(config: &UcvConfig, worker: usize) -> Result<Self, UcvError> {
        let agent = SimAgent::new(config, worker)?;
        Ok(UcvEnv::from_agent(agent, config))
    }

    /// Environment over an existing agent
    pub fn from_agent(agent: SimAgent, config: &UcvConfig) -> Self {
        UcvEnv {
            agent,
            observation: config.observation.clone(),
            save_trajectories: config.trajectory.save,
            width: config.simulator.observation_width as usize,
            height: config.simulator.observation_height as usize,
        }
    }

    /// Number of discrete actions
    pub fn action_count(&self) -> usize {
        ACTION_SPACE.len()
    }

    /// Shape of the observations [`UcvEnv::reset`] and [`UcvEnv::step`] return
    pub fn observation_shape(&self) -> Vec<usize> {
        use crate::core::ViewMode;
        match (self.observation.view_mode, self.observation.grayscale) {
            (ViewMode::Depth, _) => vec![4, 16],
            (ViewMode::Lit, true) => vec![self.height, self.width],
            (ViewMode::Lit, false) => vec![self.height, self.width, 3],
        }
    }

    /// Starts a new episode and returns its first observation
    pub fn reset(&mut self) -> Result<Observation, UcvError> {
        self.agent.new_episode(self.save_trajectories)?;
        self.observe()
    }

    /// Performs the action at `index` of the action space
    pub fn step(&mut self, index: usize) -> Result<StepOutcome, UcvError> {
        let reward = self.agent.act(Action::from_index(index)?)?;
        let (collision, goal_reached) = self
            .agent
            .last_outcome()
            .map(|outcome| (outcome.collision, outcome.goal_reached))
            .unwrap_or_default();
        let info = StepInfo {
            goal_direction: self.agent.goal_direction()?,
            collision,
            goal_reached,
        };
        Ok(StepOutcome {
            observation: self.observe()?,
            reward,
            terminal: self.agent.is_episode_finished(),
            info,
        })
    }

    /// Shuts the simulator down
    pub fn close(&mut self) {
        self.agent.shut_down();
    }

    /// Underlying agent
    pub fn agent(&self) -> &SimAgent {
        &self.agent
    }

    /// Underlying agent, mutable
    pub fn agent_mut(&mut self) -> &mut SimAgent {
        &mut self.agent
    }

    fn observe(&mut self) -> Result<Observation, UcvError> {
        self.agent
            .observe(self.observation.view_mode, self.observation.grayscale)
    }
}
