use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::GameBackend;
use crate::env::Core;
use crate::error::{EnvError, Result};
use crate::policy::Policy;

/// How a bootstrap run went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Times the game was thrown away after a stage ran over budget.
    pub restarts: u64,
    /// Steps taken across all attempts.
    pub steps: u64,
}

/// Drives a fresh game up to `target` using one resetter policy per stage
/// below it.
pub struct BootstrapAdvancer<'a, P: Policy> {
    target: usize,
    policies: &'a mut [P],
    budgets: &'a [f64],
}

impl<'a, P: Policy> BootstrapAdvancer<'a, P> {
    /// Checks the policy count and budgets. Never touches a backend.
    pub fn new(target: usize, policies: &'a mut [P], budgets: &'a [f64]) -> Result<Self> {
        if policies.len() != target {
            return Err(EnvError::ResetterCount {
                expected: target,
                supplied: policies.len(),
            });
        }
        if budgets.len() < target {
            return Err(EnvError::Config(format!(
                "{} bootstrap budgets for target stage {target}",
                budgets.len()
            )));
        }
        Ok(Self {
            target,
            policies,
            budgets,
        })
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Step until the target stage is reached. A stage that is still not
    /// passed once its budget of game time has elapsed restarts the whole
    /// climb from a fresh game, as often as it takes. Budgets count from the
    /// start of the run, not from the start of the game, so a game loaded
    /// from a snapshot keeps its full budget.
    pub fn run<B: GameBackend>(&mut self, core: &mut Core<B>) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();
        let mut started = core.backend().elapsed_seconds();
        let mut observation = core.observe()?;
        let mut mask = core.action_mask()?;

        while core.stage() < self.target {
            let stage = core.stage();
            let (action, _) = self.policies[stage].act(true, &observation, &mask)?;
            let result = core.step(action)?;
            report.steps += 1;

            if result.info.stage_changed {
                // new stage, new vector layout
                observation = core.observe()?;
                debug!(stage = core.stage(), steps = report.steps, "bootstrap advanced");
            } else {
                observation = result.observation;
            }
            mask = result.info.available_actions;

            let stage = core.stage();
            if stage >= self.target {
                break;
            }
            let elapsed = core.backend().elapsed_seconds() - started;
            let budget = self.budgets[stage];
            if elapsed > budget {
                report.restarts += 1;
                warn!(
                    restarts = report.restarts,
                    stage,
                    elapsed_s = elapsed,
                    budget_s = budget,
                    "timed out reaching the next stage, restarting from a fresh game"
                );
                core.restart()?;
                started = core.backend().elapsed_seconds();
                observation = core.observe()?;
                mask = core.action_mask()?;
            }
        }
        Ok(report)
    }
}
