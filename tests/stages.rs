mod common;

use clipsim::{EnvConfig, Environment, Policy, RandomPolicy};
use common::FakeGame;

fn growing_game() -> FakeGame {
    FakeGame::new(vec![vec![
        ("Paperclips", 1000.0),
        ("Memory", 1.0),
        ("Algorithmic Trading Activated", 0.05),
        ("Strategic Modeling Activated", 0.04),
        ("Quantum Computing Activated", 0.03),
        ("Photonic Chip Activated", 0.03),
    ]])
}

#[test]
fn stages_never_go_backwards() {
    let mut env = Environment::new(growing_game(), EnvConfig::default(), Vec::new()).unwrap();
    let mut policy = RandomPolicy::new(Some(4));
    let mut observation = env.reset().unwrap();
    let mut mask = env.action_mask().unwrap();
    let mut stages = vec![env.stage()];

    for _ in 0..400 {
        let result = env.step(policy.act(true, &observation, &mask).unwrap().0).unwrap();
        assert_eq!(result.observation.len(), env.observation_space().len());
        assert_eq!(result.info.available_actions.len(), env.action_space().len());
        stages.push(result.info.stage);
        observation = result.observation;
        mask = result.info.available_actions;
    }

    assert!(stages.windows(2).all(|w| w[0] <= w[1]), "{stages:?}");
    assert_eq!(*stages.last().unwrap(), 5);
    assert_eq!(env.backend().pacing, Some(0.5));
}

#[test]
fn final_stage_caps_progress() {
    let config = EnvConfig {
        final_stage: Some(1),
        ..Default::default()
    };
    let mut env = Environment::new(growing_game(), config, Vec::new()).unwrap();
    env.reset().unwrap();
    for _ in 0..300 {
        env.step(0).unwrap();
    }
    assert_eq!(env.stage(), 1);
}

#[test]
fn stage_change_is_reported_once() {
    let mut env = Environment::new(growing_game(), EnvConfig::default(), Vec::new()).unwrap();
    env.reset().unwrap();
    let mut changes = 0;
    let mut last = env.stage();
    for _ in 0..50 {
        let result = env.step(0).unwrap();
        if result.info.stage_changed {
            changes += 1;
            assert!(result.info.stage > last);
        } else {
            assert_eq!(result.info.stage, last);
        }
        last = result.info.stage;
    }
    assert!(changes >= 1);
}
