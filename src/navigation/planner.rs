// src/navigation/planner.rs
// Chooses start and goal locations for a new episode. Random spawning draws integer
// map cells and probes each candidate start by stepping forward; the catalog mode
// picks two distinct entries of a predetermined location list.

// Imports dependencies and shared types.
// - CommandGateway: probe commands during the start search.
// - serde_yaml: catalog file format.
use crate::core::Pose;
use crate::sim_interface::protocol::{self, GET_LOCATION};
use crate::sim_interface::{CancelToken, CommandGateway};
use crate::{MapConfig, UcvConfig, UcvError};
use log::{debug, info};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Start and goal of an episode
#[derive(Clone, Debug, PartialEq)]
pub struct Spawn {
    /// Start location (cm)
    pub start: Vector3<f64>,
    /// Goal location (cm)
    pub goal: Vector3<f64>,
}

/// What a strategy may use while planning
pub struct SpawnContext<'a> {
    /// Gateway for collision probes
    pub gateway: &'a mut CommandGateway,
    /// Pose to restore if the simulator restarts mid-probe
    pub resume_from: Option<&'a Pose>,
    /// Worker random source
    pub rng: &'a mut fastrand::Rng,
}

/// Source of episode start and goal locations
pub trait SpawnStrategy: Send {
    /// Chooses a start and goal for an agent that will face `heading` degrees
    fn plan(&mut self, heading: f64, ctx: &mut SpawnContext<'_>) -> Result<Spawn, UcvError>;

    /// Start and goal taken from explicit catalog indices
    fn plan_between(&mut self, start: usize, goal: usize) -> Result<Spawn, UcvError> {
        Err(UcvError::Catalog(format!(
            "explicit locations {} and {} need a location catalog",
            start, goal
        )))
    }
}

/// Uniform integer cells inside the map bounds, start validated by a forward probe
pub struct RandomSpawn {
    map: MapConfig,
    cancel: CancelToken,
}

impl RandomSpawn {
    /// Strategy over the configured map
    pub fn new(map: MapConfig, cancel: CancelToken) -> Self {
        RandomSpawn { map, cancel }
    }

    fn random_cell(&self, rng: &mut fastrand::Rng) -> (i32, i32) {
        (
            rng.i32(self.map.x_min..=self.map.x_max),
            rng.i32(self.map.y_min..=self.map.y_max),
        )
    }

    /// Repeats until a candidate lets the agent move `probe_step` forward undisturbed
    fn find_start(&self, heading: f64, ctx: &mut SpawnContext<'_>) -> Result<Vector3<f64>, UcvError> {
        let altitude = self.map.spawn_altitude;
        let mut attempts = 0u32;
        loop {
            self.cancel.check()?;
            if let Some(max) = self.map.max_spawn_attempts {
                if attempts >= max {
                    return Err(UcvError::SpawnSearchExhausted(attempts));
                }
            }
            attempts += 1;

            let (x, y) = self.random_cell(ctx.rng);
            ctx.gateway
                .send(&protocol::probe_pose(x, y, altitude, heading), ctx.resume_from)?;
            let step_ahead = Vector3::new(
                x as f64 + self.map.probe_step * heading.to_radians().cos(),
                y as f64 + self.map.probe_step * heading.to_radians().sin(),
                altitude,
            );
            ctx.gateway
                .send(&protocol::probe_move_to(&step_ahead), ctx.resume_from)?;
            let reached = protocol::parse_vector3(
                GET_LOCATION,
                &ctx.gateway.send_text(GET_LOCATION, ctx.resume_from)?,
            )?;

            if protocol::round2_vec(&reached) == protocol::round2_vec(&step_ahead) {
                debug!("spawn candidate ({}, {}) accepted after {} attempts", x, y, attempts);
                return Ok(Vector3::new(x as f64, y as f64, altitude));
            }
            debug!("spawn candidate ({}, {}) blocked, retrying", x, y);
            thread::sleep(Duration::from_millis(self.map.spawn_retry_delay_ms));
        }
    }
}

impl SpawnStrategy for RandomSpawn {
    fn plan(&mut self, heading: f64, ctx: &mut SpawnContext<'_>) -> Result<Spawn, UcvError> {
        let (goal_x, goal_y) = self.random_cell(ctx.rng);
        let goal = Vector3::new(goal_x as f64, goal_y as f64, self.map.spawn_altitude);
        let start = self.find_start(heading, ctx)?;
        Ok(Spawn { start, goal })
    }
}

/// One catalog entry
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct CatalogLocation {
    /// x (cm)
    pub x: f64,
    /// y (cm)
    pub y: f64,
    /// z (cm)
    pub z: f64,
}

impl CatalogLocation {
    /// As a location vector
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Predetermined locations, loaded from a YAML list of `{x, y, z}`
#[derive(Clone, Debug, Default)]
pub struct LocationCatalog {
    locations: Vec<CatalogLocation>,
}

impl LocationCatalog {
    /// Reads the catalog file
    pub fn load(path: &Path) -> Result<Self, UcvError> {
        let file = File::open(path)
            .map_err(|e| UcvError::Catalog(format!("cannot open {}: {}", path.display(), e)))?;
        let locations: Vec<CatalogLocation> = serde_yaml::from_reader(file)
            .map_err(|e| UcvError::Catalog(format!("cannot parse {}: {}", path.display(), e)))?;
        info!("Loaded {} locations from {}", locations.len(), path.display());
        Ok(LocationCatalog { locations })
    }

    /// Catalog from in-memory entries
    pub fn from_locations(locations: Vec<CatalogLocation>) -> Self {
        LocationCatalog { locations }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Entry at `idx`
    pub fn get(&self, idx: usize) -> Result<Vector3<f64>, UcvError> {
        self.locations
            .get(idx)
            .map(|location| location.to_vector())
            .ok_or_else(|| {
                UcvError::Catalog(format!(
                    "location index {} out of range ({} entries)",
                    idx,
                    self.locations.len()
                ))
            })
    }
}

/// Two distinct catalog entries per episode
pub struct CatalogSpawn {
    catalog: LocationCatalog,
}

impl CatalogSpawn {
    /// Needs at least two locations
    pub fn new(catalog: LocationCatalog) -> Result<Self, UcvError> {
        if catalog.len() < 2 {
            return Err(UcvError::Catalog(format!(
                "need at least 2 locations, catalog has {}",
                catalog.len()
            )));
        }
        Ok(CatalogSpawn { catalog })
    }

    /// Underlying catalog
    pub fn catalog(&self) -> &LocationCatalog {
        &self.catalog
    }
}

impl SpawnStrategy for CatalogSpawn {
    fn plan(&mut self, _heading: f64, ctx: &mut SpawnContext<'_>) -> Result<Spawn, UcvError> {
        let len = self.catalog.len();
        let start = ctx.rng.usize(0..len);
        // Skip over the start index so the pair is distinct and uniform
        let mut goal = ctx.rng.usize(0..len - 1);
        if goal >= start {
            goal += 1;
        }
        self.plan_between(start, goal)
    }

    fn plan_between(&mut self, start: usize, goal: usize) -> Result<Spawn, UcvError> {
        Ok(Spawn {
            start: self.catalog.get(start)?,
            goal: self.catalog.get(goal)?,
        })
    }
}

/// Strategy selected by `map.random_spawn`; a relative catalog path is resolved in `binary_dir`
pub fn from_config(
    config: &UcvConfig,
    binary_dir: &Path,
    cancel: CancelToken,
) -> Result<Box<dyn SpawnStrategy>, UcvError> {
    if config.map.random_spawn {
        return Ok(Box::new(RandomSpawn::new(config.map.clone(), cancel)));
    }
    let path = binary_dir.join(&config.map.locations_file);
    Ok(Box::new(CatalogSpawn::new(LocationCatalog::load(&path)?)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_interface::MockTransport;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use rstest::rstest;

    fn catalog(n: usize) -> LocationCatalog {
        LocationCatalog::from_locations(
            (0..n)
                .map(|i| CatalogLocation {
                    x: i as f64 * 100.0,
                    y: 0.0,
                    z: 150.0,
                })
                .collect(),
        )
    }

    fn map() -> MapConfig {
        MapConfig {
            x_min: 10,
            x_max: 10,
            y_min: -20,
            y_max: -20,
            spawn_retry_delay_ms: 0,
            ..MapConfig::default()
        }
    }

    #[test]
    fn catalog_needs_two_locations() {
        assert!(matches!(CatalogSpawn::new(catalog(1)), Err(UcvError::Catalog(_))));
        assert!(CatalogSpawn::new(catalog(2)).is_ok());
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    fn catalog_pairs_are_distinct_and_cover_every_entry(#[case] n: usize) {
        let mut mock = MockTransport::new();
        mock.expect_request().never();
        let mut gateway = CommandGateway::new("worker_0", Box::new(mock), None, CancelToken::new());
        let mut rng = fastrand::Rng::with_seed(7);
        let mut strategy = CatalogSpawn::new(catalog(n)).unwrap();
        let mut seen = vec![false; n];

        for _ in 0..500 {
            let mut ctx = SpawnContext {
                gateway: &mut gateway,
                resume_from: None,
                rng: &mut rng,
            };
            let spawn = strategy.plan(0.0, &mut ctx).unwrap();
            assert_ne!(spawn.start, spawn.goal);
            seen[(spawn.start.x / 100.0) as usize] = true;
            seen[(spawn.goal.x / 100.0) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn explicit_indices_are_range_checked() {
        let mut strategy = CatalogSpawn::new(catalog(3)).unwrap();
        let spawn = strategy.plan_between(2, 0).unwrap();
        assert_eq!(spawn.start, Vector3::new(200.0, 0.0, 150.0));
        assert_eq!(spawn.goal, Vector3::new(0.0, 0.0, 150.0));
        assert!(matches!(strategy.plan_between(0, 3), Err(UcvError::Catalog(_))));
    }

    #[test]
    fn random_spawn_rejects_explicit_indices() {
        let mut strategy = RandomSpawn::new(map(), CancelToken::new());
        assert!(matches!(strategy.plan_between(0, 1), Err(UcvError::Catalog(_))));
    }

    #[test]
    fn blocked_probe_is_retried() {
        let mut seq = Sequence::new();
        let mut mock = MockTransport::new();
        for reached in ["10.00 -20.00 150.00", "60.00 -20.00 150.00"] {
            mock.expect_request()
                .with(eq("vset /camera/0/pose 10 -20 150 0 0 0"))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(Some(b"ok".to_vec())));
            mock.expect_request()
                .with(eq("vset /camera/0/moveto 60 -20 150"))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(Some(b"ok".to_vec())));
            mock.expect_request()
                .with(eq(GET_LOCATION))
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(Some(reached.as_bytes().to_vec())));
        }
        let mut gateway = CommandGateway::new("worker_0", Box::new(mock), None, CancelToken::new());
        let mut rng = fastrand::Rng::with_seed(1);
        let mut strategy = RandomSpawn::new(map(), CancelToken::new());
        let mut ctx = SpawnContext {
            gateway: &mut gateway,
            resume_from: None,
            rng: &mut rng,
        };

        let spawn = strategy.plan(0.0, &mut ctx).unwrap();
        assert_eq!(spawn.start, Vector3::new(10.0, -20.0, 150.0));
        assert_eq!(spawn.goal, Vector3::new(10.0, -20.0, 150.0));
    }

    #[test]
    fn search_gives_up_at_the_attempt_ceiling() {
        let mut mock = MockTransport::new();
        mock.expect_request()
            .with(eq(GET_LOCATION))
            .times(3)
            .returning(|_| Ok(Some(b"10.00 -20.00 150.00".to_vec())));
        mock.expect_request().times(6).returning(|_| Ok(Some(b"ok".to_vec())));
        let mut gateway = CommandGateway::new("worker_0", Box::new(mock), None, CancelToken::new());
        let mut rng = fastrand::Rng::with_seed(1);
        let mut strategy = RandomSpawn::new(
            MapConfig {
                max_spawn_attempts: Some(3),
                ..map()
            },
            CancelToken::new(),
        );
        let mut ctx = SpawnContext {
            gateway: &mut gateway,
            resume_from: None,
            rng: &mut rng,
        };

        assert!(matches!(
            strategy.plan(90.0, &mut ctx),
            Err(UcvError::SpawnSearchExhausted(3))
        ));
    }

    #[test]
    fn cancelled_search_stops() {
        let mut mock = MockTransport::new();
        mock.expect_request().never();
        let mut gateway = CommandGateway::new("worker_0", Box::new(mock), None, CancelToken::new());
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut rng = fastrand::Rng::with_seed(1);
        let mut strategy = RandomSpawn::new(map(), cancel);
        let mut ctx = SpawnContext {
            gateway: &mut gateway,
            resume_from: None,
            rng: &mut rng,
        };

        assert!(matches!(strategy.plan(0.0, &mut ctx), Err(UcvError::Cancelled)));
    }

    #[test]
    fn catalog_file_loads() {
        let path = std::env::temp_dir().join(format!("ucv_nav_locations_{}.yaml", std::process::id()));
        std::fs::write(&path, "- {x: 1.0, y: 2.0, z: 150.0}\n- {x: -3.5, y: 4.0, z: 150.0}\n").unwrap();

        let catalog = LocationCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(1).unwrap(), Vector3::new(-3.5, 4.0, 150.0));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(LocationCatalog::load(&path), Err(UcvError::Catalog(_))));
    }
}
