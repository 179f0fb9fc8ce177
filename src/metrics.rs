// src/metrics.rs
//
// Per-worker counters. A worker only updates its own counters; an external aggregator
// pulls snapshots from every worker and merges them.

use crate::navigation::RewardOutcome;
use serde::Serialize;
use std::iter::Sum;
use std::ops::Add;

/// Counters of one worker
#[derive(Debug, Clone, Default)]
pub struct WorkerMetrics {
    steps: u64,
    episodes: u64,
    collisions: u64,
    goals_reached: u64,
}

impl WorkerMetrics {
    /// Counts a finished step
    pub fn record_step(&mut self, outcome: &RewardOutcome) {
        self.steps += 1;
        if outcome.collision {
            self.collisions += 1;
        }
        if outcome.goal_reached {
            self.goals_reached += 1;
        }
    }

    /// Counts a started episode
    pub fn record_episode(&mut self) {
        self.episodes += 1;
    }

    /// Copy of the counters plus the gateway's restart count
    pub fn snapshot(&self, restarts: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            steps: self.steps,
            episodes: self.episodes,
            collisions: self.collisions,
            goals_reached: self.goals_reached,
            restarts,
        }
    }
}

/// Point-in-time counters, summable across workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Actions performed
    pub steps: u64,
    /// Episodes started
    pub episodes: u64,
    /// Blocked steps
    pub collisions: u64,
    /// Steps ending inside the goal radius
    pub goals_reached: u64,
    /// Simulator restarts
    pub restarts: u64,
}

impl MetricsSnapshot {
    /// Adds another worker's counters
    pub fn merge(&mut self, other: &MetricsSnapshot) {
        self.steps += other.steps;
        self.episodes += other.episodes;
        self.collisions += other.collisions;
        self.goals_reached += other.goals_reached;
        self.restarts += other.restarts;
    }
}

impl Add for MetricsSnapshot {
    type Output = MetricsSnapshot;

    fn add(mut self, other: MetricsSnapshot) -> MetricsSnapshot {
        self.merge(&other);
        self
    }
}

impl Sum for MetricsSnapshot {
    fn sum<I: Iterator<Item = MetricsSnapshot>>(iter: I) -> Self {
        iter.fold(MetricsSnapshot::default(), Add::add)
    }
}
