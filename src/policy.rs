use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{EnvError, Result};

/// Anything that picks actions from an encoded observation. Trained networks
/// live outside this crate and plug in here.
pub trait Policy {
    /// Pick an action index among the `true` entries of `mask`, plus the
    /// policy's value estimate for `observation`.
    fn act(&mut self, stochastic: bool, observation: &[f32], mask: &[bool]) -> Result<(usize, f32)>;

    /// Per-action probabilities. Diagnostics only.
    fn action_probabilities(&mut self, observation: &[f32], mask: &[bool]) -> Result<Vec<f32>>;
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn act(&mut self, stochastic: bool, observation: &[f32], mask: &[bool]) -> Result<(usize, f32)> {
        (**self).act(stochastic, observation, mask)
    }

    fn action_probabilities(&mut self, observation: &[f32], mask: &[bool]) -> Result<Vec<f32>> {
        (**self).action_probabilities(observation, mask)
    }
}

/// Indices allowed by `mask`. A mask with nothing legal allows everything.
fn legal(mask: &[bool]) -> Result<Vec<usize>> {
    if mask.is_empty() {
        return Err(EnvError::Config("empty action mask".into()));
    }
    let allowed: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
    if allowed.is_empty() {
        Ok((0..mask.len()).collect())
    } else {
        Ok(allowed)
    }
}

// =============================================================================
// Random Policy
// =============================================================================

/// Uniform over legal actions. Used for baselines and for building snapshot
/// pools.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    rng: SmallRng,
}

impl RandomPolicy {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Policy for RandomPolicy {
    fn act(&mut self, stochastic: bool, _observation: &[f32], mask: &[bool]) -> Result<(usize, f32)> {
        let allowed = legal(mask)?;
        let index = if stochastic {
            allowed[self.rng.random_range(0..allowed.len())]
        } else {
            allowed[0]
        };
        Ok((index, 0.0))
    }

    fn action_probabilities(&mut self, _observation: &[f32], mask: &[bool]) -> Result<Vec<f32>> {
        let allowed = legal(mask)?;
        let p = 1.0 / allowed.len() as f32;
        let mut probs = vec![0.0; mask.len()];
        for i in allowed {
            probs[i] = p;
        }
        Ok(probs)
    }
}
