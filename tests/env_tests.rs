// tests/env_tests.rs
// Reset/step adapter over the in-process simulator.

mod common;

use common::{FakeSim, FixedSpawn, test_config};
use nalgebra::Vector3;
use rstest::rstest;
use ucv_nav::{CancelToken, Observation, SimAgent, UcvConfig, UcvEnv, UcvError, ViewMode};

fn env(config: &UcvConfig) -> (FakeSim, UcvEnv) {
    let sim = FakeSim::new();
    let agent = SimAgent::with_transport(
        "worker_0",
        Box::new(sim.clone()),
        FixedSpawn::new(Vector3::new(0.0, 0.0, 150.0), Vector3::new(0.0, 3000.0, 150.0)),
        config,
        CancelToken::new(),
    )
    .unwrap();
    (sim, UcvEnv::from_agent(agent, config))
}

#[rstest]
#[case(ViewMode::Lit, false, vec![8, 8, 3])]
#[case(ViewMode::Lit, true, vec![8, 8])]
#[case(ViewMode::Depth, false, vec![4, 16])]
fn observations_match_declared_shape(#[case] view_mode: ViewMode, #[case] grayscale: bool, #[case] shape: Vec<usize>) {
    let mut config = test_config();
    config.observation.view_mode = view_mode;
    config.observation.grayscale = grayscale;
    let (_sim, mut env) = env(&config);

    assert_eq!(env.observation_shape(), shape);
    assert_eq!(env.reset().unwrap().shape(), shape);
    assert_eq!(env.step(2).unwrap().observation.shape(), shape);
}

#[test]
fn step_reports_reward_and_side_information() {
    let (sim, mut env) = env(&test_config());
    assert_eq!(env.action_count(), 3);

    let outcome = env.step(2).unwrap();
    assert!(!outcome.terminal);
    assert!(!outcome.info.collision);
    assert!(!outcome.info.goal_reached);
    assert!((-1.0..=1.0).contains(&outcome.reward));
    assert!((-1.0..=1.0).contains(&outcome.info.goal_direction));
    assert!(matches!(outcome.observation, Observation::Color { .. }));

    sim.with(|s| s.block_moves = 1);
    let outcome = env.step(0).unwrap();
    assert!(outcome.terminal);
    assert!(outcome.info.collision);
    assert!(outcome.reward < -8.0);

    env.reset().unwrap();
    assert!(!env.agent().is_episode_finished());
    assert_eq!(env.agent().metrics().episodes, 2);
}

#[test]
fn unknown_action_index_is_rejected() {
    let (_sim, mut env) = env(&test_config());
    assert!(matches!(env.step(3), Err(UcvError::InvalidAction(_))));
    assert_eq!(env.agent().trajectory().len(), 1);
}

#[test]
fn close_stops_the_simulator() {
    let (sim, mut env) = env(&test_config());
    env.close();
    assert_eq!(sim.with(|s| s.stops), 1);
}
