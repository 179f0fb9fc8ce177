// core/localization.rs

// Tracks the agent pose through an episode. The trajectory is the source of truth for
// the current pose: every entry is the literal result of a motion or query request,
// and after a collision it holds what the simulator reported, not the commanded target.

// Dependencies
use crate::UcvError;
use crate::sim_interface::CommandGateway;
use crate::sim_interface::protocol::{self, GET_LOCATION, GET_ROTATION};
use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Pose: location (cm) and pitch/yaw/roll rotation (degrees)
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Pose {
    /// x, y, z in centimeters
    pub location: Vector3<f64>,
    /// Pitch, yaw, roll in degrees
    pub rotation: Vector3<f64>,
}

impl Pose {
    /// Pose from location and rotation
    pub fn new(location: Vector3<f64>, rotation: Vector3<f64>) -> Self {
        Pose { location, rotation }
    }

    /// Heading in degrees
    pub fn yaw(&self) -> f64 {
        self.rotation.y
    }
}

/// Ordered, append-only poses of the current episode; index 0 is the spawn pose
#[derive(Clone, Debug, Default)]
pub struct PoseTracker {
    trajectory: Vec<Pose>,
}

impl PoseTracker {
    /// Empty tracker
    pub fn new() -> Self {
        PoseTracker::default()
    }

    /// Last pose of the trajectory.
    /// An empty trajectory is seeded by querying the simulator once.
    pub fn current_pose(&mut self, gateway: &mut CommandGateway) -> Result<Pose, UcvError> {
        if let Some(pose) = self.trajectory.last() {
            return Ok(pose.clone());
        }

        let rotation = protocol::parse_vector3(GET_ROTATION, &gateway.send_text(GET_ROTATION, None)?)?;
        let location = protocol::parse_vector3(GET_LOCATION, &gateway.send_text(GET_LOCATION, None)?)?;
        let pose = Pose::new(location, rotation);
        info!(
            "Seeded trajectory from simulator: x={} y={} z={} heading={}",
            location.x, location.y, location.z, rotation.y
        );
        self.trajectory.push(pose.clone());
        Ok(pose)
    }

    /// Adds a pose; earlier entries are never touched
    pub fn append(&mut self, pose: Pose) {
        self.trajectory.push(pose);
    }

    /// Starts a new trajectory holding only the spawn pose
    pub fn reset(&mut self, spawn: Pose) {
        self.trajectory = vec![spawn];
    }

    /// Most recent pose, if any
    pub fn last(&self) -> Option<&Pose> {
        self.trajectory.last()
    }

    /// Pose before the most recent one
    pub fn previous(&self) -> Option<&Pose> {
        self.trajectory.len().checked_sub(2).map(|i| &self.trajectory[i])
    }

    /// All poses in visiting order
    pub fn poses(&self) -> &[Pose] {
        &self.trajectory
    }

    /// Number of poses
    pub fn len(&self) -> usize {
        self.trajectory.len()
    }

    /// Whether no pose has been recorded
    pub fn is_empty(&self) -> bool {
        self.trajectory.is_empty()
    }
}
