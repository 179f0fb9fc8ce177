// src/navigation/reward.rs
// Shaped navigation reward and the goal-direction signal.
//
// Reaching the goal pays the goal reward and nothing else. Otherwise the reward is the
// progress of the step along the direction to the goal, scaled, plus the crash penalty
// when the step was blocked.

use crate::RewardConfig;
use crate::core::Pose;
use nalgebra::Vector3;
use serde::Serialize;

/// Reward of one step with the facts it was computed from
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RewardOutcome {
    /// Scalar reward
    pub reward: f64,
    /// Step ended inside the goal radius
    pub goal_reached: bool,
    /// Step was blocked
    pub collision: bool,
    /// Step ends the episode
    pub terminal: bool,
}

/// Reward of a step from `previous` to `location` with commanded `displacement`
pub fn shaped_reward(
    config: &RewardConfig,
    speed: f64,
    location: &Vector3<f64>,
    previous: &Vector3<f64>,
    goal: &Vector3<f64>,
    displacement: &Vector3<f64>,
    collision: bool,
) -> RewardOutcome {
    if (location - goal).norm() < config.goal_radius {
        return RewardOutcome {
            reward: config.goal_reward,
            goal_reached: true,
            collision,
            terminal: config.terminate_on_goal,
        };
    }

    let mut reward = goal_direction_term(displacement, speed, previous, goal) * config.goal_direction_reward;
    if collision {
        reward += config.crash_reward;
    }
    RewardOutcome {
        reward,
        goal_reached: false,
        collision,
        terminal: collision,
    }
}

/// Dot product of the normalized displacement and the unit vector from `previous` to `goal`
pub fn goal_direction_term(displacement: &Vector3<f64>, speed: f64, previous: &Vector3<f64>, goal: &Vector3<f64>) -> f64 {
    match (goal - previous).try_normalize(0.0) {
        Some(direction) => (displacement / speed).dot(&direction),
        None => 0.0,
    }
}

/// sin(bearing to goal − yaw), bearing in degrees normalized to [0, 360)
pub fn goal_direction_signal(pose: &Pose, goal: &Vector3<f64>) -> f64 {
    let to_goal = goal - pose.location;
    let mut bearing = to_goal.y.atan2(to_goal.x).to_degrees();
    if bearing < 0.0 {
        bearing += 360.0;
    }
    (bearing - pose.yaw()).to_radians().sin()
}
