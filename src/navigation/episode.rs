// src/navigation/episode.rs
// Episode lifecycle of the agent: optionally hand the finished trajectory to the sink,
// choose a heading, a start and a goal, then teleport the agent onto the start.

use super::SimAgent;
use super::planner::{Spawn, SpawnContext};
use crate::UcvError;
use crate::core::Pose;
use crate::core::memory::TrajectoryRecord;
use crate::sim_interface::protocol;
use log::{info, warn};
use nalgebra::Vector3;

impl SimAgent {
    /// Starts a new episode at a freshly planned start and goal
    pub fn new_episode(&mut self, save_trajectory: bool) -> Result<(), UcvError> {
        if save_trajectory {
            self.save_trajectory()?;
        }
        self.state.begin_reset();

        let heading = self.rng.u32(0..360) as f64;
        let resume_from = self.tracker.last().cloned();
        let spawn = {
            let mut ctx = SpawnContext {
                gateway: &mut self.gateway,
                resume_from: resume_from.as_ref(),
                rng: &mut self.rng,
            };
            self.spawn.plan(heading, &mut ctx)?
        };
        self.place_agent(spawn, heading)
    }

    /// Starts a new episode between two catalog entries
    pub fn new_episode_between(&mut self, start: usize, goal: usize, save_trajectory: bool) -> Result<(), UcvError> {
        let spawn = self.spawn.plan_between(start, goal)?;
        if save_trajectory {
            self.save_trajectory()?;
        }
        self.state.begin_reset();

        let heading = self.rng.u32(0..360) as f64;
        self.place_agent(spawn, heading)
    }

    /// Hands the current trajectory and goal to the sink
    pub fn save_trajectory(&mut self) -> Result<(), UcvError> {
        match self.sink.as_mut() {
            Some(sink) => sink.save(&TrajectoryRecord::new(self.tracker.poses(), &self.goal)),
            None => {
                warn!("[{}] no trajectory sink configured, trajectory dropped", self.name);
                Ok(())
            }
        }
    }

    fn place_agent(&mut self, spawn: Spawn, heading: f64) -> Result<(), UcvError> {
        let pose = Pose::new(spawn.start, Vector3::new(0.0, heading, 0.0));
        self.goal = spawn.goal;
        self.tracker.reset(pose.clone());
        self.last_outcome = None;

        self.gateway
            .send(&protocol::set_location(&pose.location), Some(&pose))?;
        self.gateway
            .send(&protocol::set_rotation(&pose.rotation), Some(&pose))?;

        self.state.activate();
        self.metrics.record_episode();
        info!(
            "[{}] episode {}: start ({:.0}, {:.0}) heading {:.0}, goal ({:.0}, {:.0})",
            self.name,
            self.state.episode(),
            pose.location.x,
            pose.location.y,
            heading,
            self.goal.x,
            self.goal.y
        );
        Ok(())
    }
}
