// core/memory.rs

// Trajectory persistence: a finished episode is handed over as the ordered list of
// {location, rotation} pairs plus the goal's (x, y). The file sink appends each record
// as a one-element YAML list, so the file as a whole stays one list of episodes.

// Dependencies
use super::localization::Pose;
use crate::UcvError;
use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// One exported episode
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrajectoryRecord {
    /// Poses in visiting order
    pub traj: Vec<Pose>,
    /// Goal x and y
    pub goal: [f64; 2],
}

impl TrajectoryRecord {
    /// Record for a trajectory and its goal
    pub fn new(poses: &[Pose], goal: &Vector3<f64>) -> Self {
        TrajectoryRecord {
            traj: poses.to_vec(),
            goal: [goal.x, goal.y],
        }
    }
}

/// Receives finished trajectories
pub trait TrajectorySink: Send {
    /// Persist one record
    fn save(&mut self, record: &TrajectoryRecord) -> Result<(), UcvError>;
}

/// Appends records to `trajectory_<worker>.yaml`
pub struct TrajectoryFile {
    path: PathBuf,
}

impl TrajectoryFile {
    /// Sink writing to an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TrajectoryFile { path: path.into() }
    }

    /// Sink for a worker inside `dir`
    pub fn for_worker(dir: &Path, worker_name: &str) -> Self {
        TrajectoryFile::new(dir.join(format!("trajectory_{}.yaml", worker_name)))
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads back every record in a trajectory file
    pub fn load(path: &Path) -> Result<Vec<TrajectoryRecord>, UcvError> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

impl TrajectorySink for TrajectoryFile {
    fn save(&mut self, record: &TrajectoryRecord) -> Result<(), UcvError> {
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        serde_yaml::to_writer(file, std::slice::from_ref(record))?;
        info!(
            "Saved trajectory of {} poses to {}",
            record.traj.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn appended_records_read_back_as_one_list() {
        let path = std::env::temp_dir().join(format!("ucv_nav_traj_{}.yaml", std::process::id()));
        let _ = fs::remove_file(&path);
        let mut sink = TrajectoryFile::new(&path);

        let poses = vec![
            Pose::new(Vector3::new(0.0, 0.0, 150.0), Vector3::new(0.0, 90.0, 0.0)),
            Pose::new(Vector3::new(0.0, 20.0, 150.0), Vector3::new(0.0, 90.0, 0.0)),
        ];
        let first = TrajectoryRecord::new(&poses, &Vector3::new(300.0, -40.0, 150.0));
        let second = TrajectoryRecord::new(&poses[..1], &Vector3::new(1.0, 2.0, 3.0));
        sink.save(&first).unwrap();
        sink.save(&second).unwrap();

        let records = TrajectoryFile::load(&path).unwrap();
        assert_eq!(records, vec![first, second]);
        assert_eq!(records[0].goal, [300.0, -40.0]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn worker_file_name() {
        let sink = TrajectoryFile::for_worker(Path::new("/tmp/runs"), "worker_3");
        assert_eq!(sink.path(), Path::new("/tmp/runs/trajectory_worker_3.yaml"));
    }
}
