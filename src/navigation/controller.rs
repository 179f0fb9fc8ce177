// src/navigation/controller.rs
// Discrete motion of the agent. Every action advances the agent; turning actions also
// change its yaw. The rotation is applied before the move, and the displacement follows
// the heading the agent had before the step.

// Imports dependencies and shared types.
// - protocol: command formatting and reply parsing.
// - reward: shaped reward of the finished step.
use super::SimAgent;
use super::reward::{self, RewardOutcome};
use crate::UcvError;
use crate::core::Pose;
use crate::sim_interface::protocol::{self, GET_LOCATION};
use log::{debug, info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete actions understood by the agent
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Advance and turn counter-clockwise
    Left,
    /// Advance and turn clockwise
    Right,
    /// Advance
    Forward,
    /// Back up; not part of the policy action space
    Backward,
}

/// Actions a policy picks from, by index
pub const ACTION_SPACE: [Action; 3] = [Action::Left, Action::Right, Action::Forward];

impl Action {
    /// Lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Action::Left => "left",
            Action::Right => "right",
            Action::Forward => "forward",
            Action::Backward => "backward",
        }
    }

    /// Action at `index` of [`ACTION_SPACE`]
    pub fn from_index(index: usize) -> Result<Self, UcvError> {
        ACTION_SPACE.get(index).copied().ok_or_else(|| {
            UcvError::InvalidAction(format!(
                "index {} outside action space of {}",
                index,
                ACTION_SPACE.len()
            ))
        })
    }

    /// Body-frame displacement and rotation deltas for this action
    pub fn command(self, speed: f64, turn_angle: f64) -> (Vector3<f64>, Vector3<f64>) {
        let forward = Vector3::new(speed, 0.0, 0.0);
        match self {
            Action::Left => (forward, Vector3::new(0.0, -turn_angle, 0.0)),
            Action::Right => (forward, Vector3::new(0.0, turn_angle, 0.0)),
            Action::Forward => (forward, Vector3::zeros()),
            Action::Backward => (-forward, Vector3::zeros()),
        }
    }
}

impl FromStr for Action {
    type Err = UcvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Action::Left),
            "right" => Ok(Action::Right),
            "forward" => Ok(Action::Forward),
            "backward" => Ok(Action::Backward),
            other => Err(UcvError::InvalidAction(format!("unknown action `{}`", other))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl SimAgent {
    /// Performs one action and returns its reward
    pub fn act(&mut self, action: Action) -> Result<f64, UcvError> {
        let (loc_cmd, rot_cmd) = action.command(self.motion.speed, self.motion.turn_angle);
        self.move_by(loc_cmd, rot_cmd)
    }

    /// [`SimAgent::act`] by action name
    pub fn act_named(&mut self, name: &str) -> Result<f64, UcvError> {
        self.act(name.parse()?)
    }

    /// Moves by body-frame `loc_cmd` (only x is used) and rotates by `rot_cmd`.
    ///
    /// The new pose is appended to the trajectory; after a collision it holds the
    /// location the simulator reports rather than the commanded target.
    pub fn move_by(&mut self, loc_cmd: Vector3<f64>, rot_cmd: Vector3<f64>) -> Result<f64, UcvError> {
        let pose = self.current_pose()?;
        let new_rotation = (pose.rotation + rot_cmd).map(|angle| angle.rem_euclid(360.0));
        let yaw = pose.yaw().to_radians();
        let displacement = Vector3::new(loc_cmd.x * yaw.cos(), loc_cmd.x * yaw.sin(), 0.0);
        let mut new_location = pose.location + displacement;
        let mut collision = false;
        // Pose the simulator holds once each request has succeeded
        let mut resume_from = pose.clone();

        if rot_cmd != Vector3::zeros() {
            let command = protocol::set_rotation(&new_rotation);
            let reply = self.gateway.send_text(&command, Some(&resume_from))?;
            if !protocol::is_ok(&reply) {
                return Err(UcvError::CommandRejected { command, reply });
            }
            resume_from.rotation = new_rotation;
        }
        if loc_cmd != Vector3::zeros() {
            self.gateway
                .send(&protocol::move_to(&new_location), Some(&resume_from))?;
            let reached = protocol::parse_vector3(
                GET_LOCATION,
                &self.gateway.send_text(GET_LOCATION, Some(&resume_from))?,
            )?;
            if protocol::round2_vec(&reached) != protocol::round2_vec(&new_location) {
                debug!(
                    "[{}] blocked at ({:.2}, {:.2}) short of ({:.2}, {:.2})",
                    self.name, reached.x, reached.y, new_location.x, new_location.y
                );
                collision = true;
                new_location = reached;
            }
        }

        self.tracker.append(Pose::new(new_location, new_rotation));
        let outcome = reward::shaped_reward(
            &self.reward,
            self.motion.speed,
            &new_location,
            &pose.location,
            &self.goal,
            &displacement,
            collision,
        );
        if outcome.goal_reached {
            info!("[{}] goal reached at ({:.2}, {:.2})", self.name, new_location.x, new_location.y);
        }
        if outcome.terminal {
            if outcome.collision {
                warn!("[{}] collision, episode over", self.name);
            }
            self.state.finish();
        }
        self.metrics.record_step(&outcome);
        self.last_outcome = Some(outcome);
        Ok(outcome.reward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("left", Action::Left)]
    #[case("right", Action::Right)]
    #[case("forward", Action::Forward)]
    #[case("backward", Action::Backward)]
    fn names_parse(#[case] name: &str, #[case] action: Action) {
        assert_eq!(name.parse::<Action>().unwrap(), action);
        assert_eq!(action.to_string(), name);
    }

    #[test]
    fn unknown_names_and_indices_are_rejected() {
        assert!(matches!("up".parse::<Action>(), Err(UcvError::InvalidAction(_))));
        assert!(matches!(Action::from_index(3), Err(UcvError::InvalidAction(_))));
        assert_eq!(Action::from_index(2).unwrap(), Action::Forward);
    }

    #[rstest]
    #[case(Action::Left, 20.0, -20.0)]
    #[case(Action::Right, 20.0, 20.0)]
    #[case(Action::Forward, 20.0, 0.0)]
    #[case(Action::Backward, -20.0, 0.0)]
    fn commands(#[case] action: Action, #[case] forward: f64, #[case] yaw: f64) {
        let (loc_cmd, rot_cmd) = action.command(20.0, 20.0);
        assert_eq!(loc_cmd, Vector3::new(forward, 0.0, 0.0));
        assert_eq!(rot_cmd, Vector3::new(0.0, yaw, 0.0));
    }
}
