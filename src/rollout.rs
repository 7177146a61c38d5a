use serde::Serialize;

use crate::backend::GameBackend;
use crate::env::Environment;
use crate::error::Result;
use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RolloutStats {
    pub avg_reward: f64,
    pub avg_final_stage: f64,
    pub avg_steps: f64,
    pub episodes: usize,
}

/// Play `episodes` episodes of at most `max_steps` steps each, sampling
/// actions stochastically from `policy`.
pub fn run_rollout<B: GameBackend, P: Policy + ?Sized>(
    env: &mut Environment<B>,
    policy: &mut P,
    episodes: usize,
    max_steps: u64,
) -> Result<RolloutStats> {
    let mut total_reward = 0.0f64;
    let mut total_stage = 0u64;
    let mut total_steps = 0u64;

    let rollout_episodes = episodes.max(1);

    for _ in 0..rollout_episodes {
        let mut observation = env.reset()?;
        let mut mask = env.action_mask()?;
        let mut ep_reward = 0.0f64;
        let mut ep_steps = 0u64;

        while ep_steps < max_steps {
            let (action, _) = policy.act(true, &observation, &mask)?;
            let result = env.step(action)?;
            ep_reward += result.reward as f64;
            ep_steps += 1;
            observation = result.observation;
            mask = result.info.available_actions;
            if result.done {
                break;
            }
        }

        total_reward += ep_reward;
        total_stage += env.stage() as u64;
        total_steps += ep_steps;
    }

    let denom = rollout_episodes as f64;
    Ok(RolloutStats {
        avg_reward: total_reward / denom,
        avg_final_stage: total_stage as f64 / denom,
        avg_steps: total_steps as f64 / denom,
        episodes: rollout_episodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::EmulatedBackend;
    use crate::env::EnvConfig;
    use crate::policy::RandomPolicy;

    #[test]
    fn rollout_averages_over_episodes() {
        let backend = EmulatedBackend::new(Some(9)).unwrap();
        let config = EnvConfig {
            episode_length: Some(20),
            seed: Some(9),
            ..Default::default()
        };
        let mut env = Environment::new(backend, config, Vec::new()).unwrap();
        let mut policy = RandomPolicy::new(Some(9));
        let stats = run_rollout(&mut env, &mut policy, 2, 100).unwrap();
        assert_eq!(stats.episodes, 2);
        assert_eq!(stats.avg_steps, 20.0);
        assert!(stats.avg_final_stage >= 0.0);
        assert!(stats.avg_reward.is_finite());
    }

    #[test]
    fn max_steps_caps_open_ended_episodes() {
        let backend = EmulatedBackend::new(Some(9)).unwrap();
        let mut env = Environment::new(backend, EnvConfig::default(), Vec::new()).unwrap();
        let mut policy = RandomPolicy::new(Some(1));
        let stats = run_rollout(&mut env, &mut policy, 0, 7).unwrap();
        assert_eq!(stats.episodes, 1);
        assert_eq!(stats.avg_steps, 7.0);
    }
}
