use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::GameBackend;
use crate::bootstrap::{BootstrapAdvancer, BootstrapReport};
use crate::error::{EnvError, Result};
use crate::policy::Policy;
use crate::reward::{RewardBreakdown, RewardCalculator, RewardConfig};
use crate::spaces::{ActionSpace, Observation, ObservationSpace};
use crate::stages::{StageManager, StageTable};

// =============================================================================
// Environment Constants
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Stage every episode starts in. Stages below it are reached by the
    /// resetter policies.
    pub initial_stage: usize,
    /// Stop evaluating advancement here. Defaults to the last stage.
    pub final_stage: Option<usize>,
    pub episode_length: Option<u64>,
    /// Divides every stage's pacing interval.
    pub action_rate_speedup: f64,
    /// Game seconds allowed to get past stage `i` during bootstrap, counted
    /// from the last restart.
    pub bootstrap_budgets_s: Vec<f64>,
    /// JSON array of saved states; each reset starts from one of them.
    pub snapshot_pool: Option<PathBuf>,
    pub seed: Option<u64>,
    pub reward: RewardConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            initial_stage: 0,
            final_stage: None,
            episode_length: None,
            action_rate_speedup: 1.0,
            bootstrap_budgets_s: vec![600.0, 3600.0, 7200.0, 10800.0, 14400.0],
            snapshot_pool: None,
            seed: None,
            reward: RewardConfig::default(),
        }
    }
}

impl EnvConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: EnvConfig = serde_json::from_str(&text)
            .map_err(|e| EnvError::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn validate(&self, table: &StageTable) -> Result<()> {
        let last = table.last_stage();
        if self.initial_stage > last {
            return Err(EnvError::Config(format!(
                "initial stage {} is past the last defined stage {last}",
                self.initial_stage
            )));
        }
        if let Some(f) = self.final_stage {
            if f < self.initial_stage {
                return Err(EnvError::Config(format!(
                    "final stage {f} is before initial stage {}",
                    self.initial_stage
                )));
            }
        }
        if !(self.action_rate_speedup.is_finite() && self.action_rate_speedup > 0.0) {
            return Err(EnvError::Config(format!(
                "action rate speedup must be positive, got {}",
                self.action_rate_speedup
            )));
        }
        if self.bootstrap_budgets_s.windows(2).any(|w| w[1] < w[0]) {
            return Err(EnvError::Config("bootstrap budgets must not decrease".into()));
        }
        if self.bootstrap_budgets_s.len() < self.initial_stage {
            return Err(EnvError::Config(format!(
                "{} bootstrap budgets for initial stage {}",
                self.bootstrap_budgets_s.len(),
                self.initial_stage
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Snapshot Pool
// =============================================================================

/// Saved game states to start episodes from.
#[derive(Debug, Clone)]
pub struct SnapshotPool {
    states: Vec<String>,
}

impl SnapshotPool {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let states: Vec<String> = serde_json::from_str(&text)?;
        if states.is_empty() {
            return Err(EnvError::Config(format!(
                "snapshot pool {} is empty",
                path.display()
            )));
        }
        Ok(Self { states })
    }

    /// Add `state` to the pool file at `path`, creating it if needed. Returns
    /// the new pool size.
    pub fn append_to_file(path: &Path, state: &str) -> Result<usize> {
        let mut states: Vec<String> = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            Vec::new()
        };
        states.push(state.to_string());
        fs::write(path, serde_json::to_string_pretty(&states)?)?;
        Ok(states.len())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn choose(&self, rng: &mut SmallRng) -> &str {
        &self.states[rng.random_range(0..self.states.len())]
    }
}

// =============================================================================
// Step Output
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    /// Stage after this step's advancement check.
    pub stage: usize,
    /// Legal-action mask over the action space of `stage`.
    pub available_actions: Vec<bool>,
    pub action: &'static str,
    pub action_taken: bool,
    pub stage_changed: bool,
    pub reward_breakdown: RewardBreakdown,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub observation: Vec<f32>,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

// =============================================================================
// Environment Core
// =============================================================================

/// Backend, stage machine and reward state shared by normal stepping and the
/// bootstrap phase.
pub struct Core<B: GameBackend> {
    backend: B,
    stages: StageManager,
    reward: RewardCalculator,
    prev: Observation,
    steps: u64,
    episode_length: Option<u64>,
}

impl<B: GameBackend> Core<B> {
    pub fn new(
        backend: B,
        stages: StageManager,
        reward: RewardCalculator,
        episode_length: Option<u64>,
    ) -> Self {
        Self {
            backend,
            stages,
            reward,
            prev: Observation::new(),
            steps: 0,
            episode_length,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn stages(&self) -> &StageManager {
        &self.stages
    }

    pub fn stage(&self) -> usize {
        self.stages.current()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Fresh game at stage 0.
    pub fn restart(&mut self) -> Result<()> {
        self.backend.reset()?;
        self.stages.reset();
        self.backend.set_pacing_interval(self.stages.pacing_interval());
        self.prev = Observation::new();
        self.steps = 0;
        Ok(())
    }

    /// Replace the game with a saved state and advance the stage machine to
    /// wherever that state is.
    pub fn load_state(&mut self, state: &str) -> Result<()> {
        self.backend.load_state(state)?;
        self.stages.update(&mut self.backend)?;
        Ok(())
    }

    /// Encoded observation under the current stage's space. Becomes the
    /// baseline for the next reward.
    pub fn observe(&mut self) -> Result<Vec<f32>> {
        let space = self.stages.observation_space();
        let obs = self.backend.observe(&space.keys())?;
        let vector = space.to_vector(&obs)?;
        self.prev = obs;
        Ok(vector)
    }

    pub fn action_mask(&mut self) -> Result<Vec<bool>> {
        self.backend
            .available_actions(self.stages.action_space().names())
    }

    pub fn step(&mut self, action: usize) -> Result<StepResult> {
        let stage = self.stages.current();
        let name = self.stages.action_space().name(action)?;
        let interval = self.stages.pacing_interval();

        let taken = self.backend.act(name)?;
        // resolve purchases before looking
        let half = interval / 2.0;
        self.backend.advance_time(half)?;

        let stage_changed = self.stages.update(&mut self.backend)?;
        let space = self.stages.observation_space();
        let obs = self.backend.observe(&space.keys())?;
        let observation = space.to_vector(&obs)?;
        let breakdown = self.reward.breakdown(stage, &self.prev, &obs);
        self.prev = obs;

        self.backend.advance_time(interval - half)?;
        self.steps += 1;
        let done = self.episode_length.is_some_and(|n| self.steps >= n);
        let available_actions = self.action_mask()?;

        debug!(
            step = self.steps,
            action = name,
            taken,
            reward = breakdown.total(),
            "step"
        );
        Ok(StepResult {
            observation,
            reward: breakdown.total() as f32,
            done,
            info: StepInfo {
                stage: self.stages.current(),
                available_actions,
                action: name,
                action_taken: taken,
                stage_changed,
                reward_breakdown: breakdown,
            },
        })
    }
}

// =============================================================================
// Environment
// =============================================================================

pub struct Environment<B: GameBackend> {
    core: Core<B>,
    config: EnvConfig,
    resetters: Vec<Box<dyn Policy>>,
    pool: Option<SnapshotPool>,
    rng: SmallRng,
    last_bootstrap: Option<BootstrapReport>,
}

impl<B: GameBackend> Environment<B> {
    /// `resetters` must hold one policy per stage below `initial_stage`. The
    /// backend is not touched until the first `reset`.
    pub fn new(backend: B, config: EnvConfig, resetters: Vec<Box<dyn Policy>>) -> Result<Self> {
        if resetters.len() != config.initial_stage {
            return Err(EnvError::ResetterCount {
                expected: config.initial_stage,
                supplied: resetters.len(),
            });
        }
        let table = StageTable::standard()?;
        config.validate(&table)?;
        let stages = StageManager::new(table, config.final_stage, config.action_rate_speedup)?;
        let pool = config
            .snapshot_pool
            .as_deref()
            .map(SnapshotPool::load)
            .transpose()?;
        let rng = match config.seed {
            Some(s) => SmallRng::seed_from_u64(s),
            None => SmallRng::from_os_rng(),
        };
        let core = Core::new(
            backend,
            stages,
            RewardCalculator::new(config.reward.clone()),
            config.episode_length,
        );
        Ok(Self {
            core,
            config,
            resetters,
            pool,
            rng,
            last_bootstrap: None,
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        self.core.backend()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        self.core.backend_mut()
    }

    pub fn stage(&self) -> usize {
        self.core.stage()
    }

    pub fn observation_space(&self) -> &ObservationSpace {
        self.core.stages().observation_space()
    }

    pub fn action_space(&self) -> &ActionSpace {
        self.core.stages().action_space()
    }

    pub fn action_mask(&mut self) -> Result<Vec<bool>> {
        self.core.action_mask()
    }

    pub fn last_bootstrap(&self) -> Option<&BootstrapReport> {
        self.last_bootstrap.as_ref()
    }

    pub fn reset(&mut self) -> Result<Vec<f32>> {
        self.core.restart()?;
        if let Some(pool) = &self.pool {
            let state = pool.choose(&mut self.rng);
            self.core.load_state(state)?;
            debug!(stage = self.core.stage(), "started from pooled snapshot");
        }

        let target = self.config.initial_stage;
        self.last_bootstrap = None;
        if self.core.stage() < target {
            let mut advancer = BootstrapAdvancer::new(
                target,
                &mut self.resetters,
                &self.config.bootstrap_budgets_s,
            )?;
            let report = advancer.run(&mut self.core)?;
            info!(
                stage = target,
                restarts = report.restarts,
                steps = report.steps,
                "bootstrapped episode"
            );
            self.last_bootstrap = Some(report);
        }

        let observation = self.core.observe()?;
        self.core.steps = 0;
        Ok(observation)
    }

    pub fn step(&mut self, action: usize) -> Result<StepResult> {
        self.core.step(action)
    }
}
