use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use rhai::Dynamic;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::GameBackend;
use crate::catalog::{self, PROJECTS};
use crate::error::{EnvError, Result};
use crate::scheduler::{
    seconds_to_ticks, IntervalLoop, LoopRunner, VirtualClock, VirtualClockScheduler,
};
use crate::script::{dynamic_to_f64, CompiledScript, RngCursor, ScriptEngine};
use crate::spaces::Observation;

// =============================================================================
// Game Sources
// =============================================================================

/// Script files in load order. Later files call functions and read globals
/// from earlier ones.
pub const SOURCE_FILES: [&str; 4] = ["combat.rhai", "globals.rhai", "projects.rhai", "main.rhai"];

pub const BUNDLED_SOURCES: [(&str, &str); 4] = [
    ("combat.rhai", include_str!("../game/combat.rhai")),
    ("globals.rhai", include_str!("../game/globals.rhai")),
    ("projects.rhai", include_str!("../game/projects.rhai")),
    ("main.rhai", include_str!("../game/main.rhai")),
];

/// `(routine, period in ticks)` for the game's background loops.
pub const INTERVAL_LOOPS: [(&str, u64); 4] = [
    ("interval_loop_1", 100),
    ("interval_loop_2", 250),
    ("interval_loop_3", 1),
    ("interval_loop_4", 10),
];

const RESET_SETTLE_SECONDS: f64 = 0.5;
const STATE_VERSION: u32 = 1;

// =============================================================================
// Binding Tables
// =============================================================================

const FIELD_EXPRESSIONS: &[(&str, &str)] = &[
    ("Paperclips", "game.clips"),
    ("Available Funds", "game.funds"),
    ("Unsold Inventory", "game.unsold_clips"),
    ("Price per Clip", "game.margin"),
    // the page shows demand as a percentage
    ("Public Demand", "game.demand * 10.0"),
    ("Marketing Level", "game.marketing_lvl"),
    ("Marketing Cost", "game.ad_cost"),
    ("Manufacturing Clips per Second", "game.clip_rate"),
    ("Wire Inches", "game.wire"),
    ("Wire Cost", "game.wire_cost"),
    ("Autoclipper Cost", "game.clipper_cost"),
    ("Number of Autoclippers", "game.clipmaker_level"),
    ("Processors", "game.processors"),
    ("Memory", "game.memory"),
    ("Trust", "game.trust"),
    ("Next Trust", "game.next_trust"),
    ("Operations", "game.operations"),
    ("Creativity", "game.creativity"),
    ("Investment Bankroll", "game.bankroll"),
    ("Stocks", "game.sec_total"),
    ("Riskiness", "game.riskiness"),
    ("Investment Engine Level", "game.invest_level"),
    ("Investment Engine Upgrade Cost", "game.invest_upgrade_cost"),
    ("Yomi", "game.yomi"),
    ("Tournament Cost", "game.tourney_cost"),
    ("Number of Photonic Chips", "game.n_chips"),
    ("Photonic Chip 0 Level", "game.q_chip_levels[0]"),
    ("Latest QOps", "game.q_ops"),
    ("MegaClipper Cost", "game.megaclipper_cost"),
    ("Number of MegaClippers", "game.megaclipper_level"),
];

struct ActionSpec {
    name: &'static str,
    precondition: &'static str,
    operation: &'static str,
    /// Routine to run after a delay in ticks, once the action succeeds.
    deferred: Option<(&'static str, u64)>,
}

const fn action(
    name: &'static str,
    precondition: &'static str,
    operation: &'static str,
) -> ActionSpec {
    ActionSpec {
        name,
        precondition,
        operation,
        deferred: None,
    }
}

const ACTIONS: &[ActionSpec] = &[
    action("Do Nothing", "true", "()"),
    action("Make Paperclip", "game.wire >= 1.0", "game.clip_click(1.0)"),
    action("Lower Price", "game.margin > 0.01", "game.lower_price()"),
    action("Raise Price", "true", "game.raise_price()"),
    action("Expand Marketing", "game.funds >= game.ad_cost", "game.buy_ads()"),
    action("Buy Wire", "game.funds >= game.wire_cost", "game.buy_wire()"),
    action("Buy Autoclipper", "game.funds >= game.clipper_cost", "game.make_clipper()"),
    action(
        "Add Processor",
        "game.trust > game.processors + game.memory",
        "game.add_processor()",
    ),
    action(
        "Add Memory",
        "game.trust > game.processors + game.memory",
        "game.add_memory()",
    ),
    action("Set Investment Low", r#"game.has_project("21")"#, "game.set_riskiness(7.0)"),
    action("Set Investment Medium", r#"game.has_project("21")"#, "game.set_riskiness(5.0)"),
    action("Set Investment High", r#"game.has_project("21")"#, "game.set_riskiness(1.0)"),
    action(
        "Deposit",
        r#"game.has_project("21") && game.funds > 0.0"#,
        "game.invest_deposit()",
    ),
    action(
        "Withdraw",
        r#"game.has_project("21") && game.bankroll > 0.0"#,
        "game.invest_withdraw()",
    ),
    action(
        "Upgrade Investment Engine",
        r#"game.has_project("21") && game.yomi >= game.invest_upgrade_cost"#,
        "game.upgrade_invest_engine()",
    ),
    ActionSpec {
        name: "Run New Tournament",
        precondition: r#"game.has_project("20") && !game.tourney_in_prog && game.operations >= game.tourney_cost"#,
        operation: "game.new_tourney()",
        deferred: Some(("finish_tourney", 500)),
    },
    action(
        "Quantum Compute",
        r#"game.has_project("50") && game.n_chips > 0.0"#,
        "game.q_comp()",
    ),
    action(
        "Buy MegaClipper",
        r#"game.has_project("22") && game.funds >= game.megaclipper_cost"#,
        "game.make_megaclipper()",
    ),
];

/// Script expression that reads `key`, or `None` for keys the game script
/// does not expose.
pub fn field_expression(key: &str) -> Option<String> {
    if let Some((_, expr)) = FIELD_EXPRESSIONS.iter().find(|(k, _)| *k == key) {
        return Some((*expr).to_string());
    }
    PROJECTS.iter().find_map(|p| {
        if p.activated == key {
            Some(format!(r#"game.projects["{}"].flag"#, p.id))
        } else if p.available == key {
            Some(format!(r#"game.project_available("{}")"#, p.id))
        } else {
            None
        }
    })
}

struct ActionBinding {
    precondition: String,
    operation: String,
    deferred: Option<(&'static str, u64)>,
}

fn action_binding(name: &str) -> Option<ActionBinding> {
    if let Some(spec) = ACTIONS.iter().find(|a| a.name == name) {
        return Some(ActionBinding {
            precondition: spec.precondition.to_string(),
            operation: spec.operation.to_string(),
            deferred: spec.deferred,
        });
    }
    catalog::project_by_action(name).map(|p| ActionBinding {
        precondition: format!(r#"game.project_available("{}")"#, p.id),
        operation: format!(r#"game.activate_project("{}")"#, p.id),
        deferred: None,
    })
}

struct CompiledAction {
    /// `if <pre> { <op>; true } else { false }`
    attempt: CompiledScript,
    check: CompiledScript,
    precondition: String,
    deferred: Option<(&'static str, u64)>,
}

// =============================================================================
// Loop Runner
// =============================================================================

struct ScriptRunner<'a> {
    script: &'a mut ScriptEngine,
    loops: &'a HashMap<String, CompiledScript>,
    deferred: &'a HashMap<String, CompiledScript>,
}

impl LoopRunner for ScriptRunner<'_> {
    fn run_loop(&mut self, routine: &str, iterations: u64) -> Result<()> {
        let batch = self
            .loops
            .get(routine)
            .ok_or_else(|| EnvError::script(routine, "no compiled batch for loop"))?;
        let _ = self
            .script
            .run_compiled(batch, &[("n", Dynamic::from(iterations as i64))])?;
        Ok(())
    }

    fn run_deferred(&mut self, routine: &str) -> Result<()> {
        let call = self
            .deferred
            .get(routine)
            .ok_or_else(|| EnvError::script(routine, "no compiled deferred routine"))?;
        let _ = self.script.run_compiled(call, &[])?;
        Ok(())
    }
}

// =============================================================================
// Emulated Backend
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StateEnvelope {
    version: u32,
    clock: VirtualClock,
    heap: String,
    #[serde(default)]
    rng: Option<RngCursor>,
}

/// Headless backend running the game's own script logic against a virtual
/// clock. Deterministic when seeded.
pub struct EmulatedBackend {
    script: ScriptEngine,
    scheduler: VirtualClockScheduler,
    fields: HashMap<&'static str, String>,
    actions: HashMap<&'static str, CompiledAction>,
    loop_batches: HashMap<String, CompiledScript>,
    deferred_calls: HashMap<String, CompiledScript>,
    observe_cache: HashMap<Vec<&'static str>, CompiledScript>,
    availability_cache: HashMap<Vec<&'static str>, CompiledScript>,
}

impl EmulatedBackend {
    pub fn new(seed: Option<u64>) -> Result<Self> {
        Self::with_sources(&BUNDLED_SOURCES, seed)
    }

    /// Load the four game scripts from `dir` instead of the bundled copy.
    pub fn from_dir(dir: &Path, seed: Option<u64>) -> Result<Self> {
        let mut texts = Vec::with_capacity(SOURCE_FILES.len());
        for file in SOURCE_FILES {
            texts.push((file, std::fs::read_to_string(dir.join(file))?));
        }
        let sources: Vec<(&str, &str)> = texts.iter().map(|(n, t)| (*n, t.as_str())).collect();
        Self::with_sources(&sources, seed)
    }

    /// Load `sources` in order, then compile and check every field and action
    /// binding against the loaded script so a mismatch fails here.
    pub fn with_sources(sources: &[(&str, &str)], seed: Option<u64>) -> Result<Self> {
        let mut script = ScriptEngine::new(seed);
        for (name, text) in sources {
            script.load(name, text)?;
        }

        let mut loops = Vec::with_capacity(INTERVAL_LOOPS.len());
        let mut loop_batches = HashMap::new();
        for (routine, period) in INTERVAL_LOOPS {
            loops.push(IntervalLoop::new(routine, period)?);
            let batch = script.compile(&format!("for i in 0..n {{ game.{routine}(); }}"))?;
            loop_batches.insert(routine.to_string(), batch);
        }

        let mut fields = HashMap::new();
        for spec in catalog::FIELDS {
            fields.insert(spec.key, Self::checked_field(&mut script, spec.key)?);
        }
        for p in PROJECTS {
            fields.insert(p.activated, Self::checked_field(&mut script, p.activated)?);
            fields.insert(p.available, Self::checked_field(&mut script, p.available)?);
        }

        let mut actions = HashMap::new();
        let mut deferred_calls = HashMap::new();
        for name in catalog::all_actions() {
            let binding =
                action_binding(name).ok_or_else(|| EnvError::UnknownAction(name.to_string()))?;
            let check = script.compile(&binding.precondition)?;
            if script.run_compiled(&check, &[])?.as_bool().is_err() {
                return Err(EnvError::script(
                    &binding.precondition,
                    format!("precondition of `{name}` is not a boolean"),
                ));
            }
            let attempt = script.compile(&format!(
                "if {} {{ {}; true }} else {{ false }}",
                binding.precondition, binding.operation
            ))?;
            if let Some((routine, _)) = binding.deferred {
                let call = script.compile(&format!("game.{routine}()"))?;
                deferred_calls.insert(routine.to_string(), call);
            }
            actions.insert(
                name,
                CompiledAction {
                    attempt,
                    check,
                    precondition: binding.precondition,
                    deferred: binding.deferred,
                },
            );
        }

        Ok(Self {
            script,
            scheduler: VirtualClockScheduler::new(loops),
            fields,
            actions,
            loop_batches,
            deferred_calls,
            observe_cache: HashMap::new(),
            availability_cache: HashMap::new(),
        })
    }

    fn checked_field(script: &mut ScriptEngine, key: &'static str) -> Result<String> {
        let expr = field_expression(key).ok_or_else(|| EnvError::UnknownField(key.to_string()))?;
        let value = script.evaluate_expression(&expr)?;
        if dynamic_to_f64(&value).is_none() {
            return Err(EnvError::script(
                &expr,
                format!("field `{key}` is not numeric ({})", value.type_name()),
            ));
        }
        Ok(expr)
    }

    pub fn reseed(&mut self, seed: Option<u64>) {
        self.script.reseed(seed);
    }

    pub fn scheduler(&self) -> &VirtualClockScheduler {
        &self.scheduler
    }

    /// Evaluate an arbitrary script expression as a number. For exploration
    /// and debugging only.
    pub fn peek(&mut self, expr: &str) -> Result<f64> {
        let value = self.script.evaluate_expression(expr)?;
        dynamic_to_f64(&value).ok_or_else(|| EnvError::script(expr, "not numeric"))
    }

    /// Build `[e1, e2, ...]` for `keys` once and reuse it for later calls
    /// with the same list.
    fn batch<'a>(
        script: &ScriptEngine,
        cache: &'a mut HashMap<Vec<&'static str>, CompiledScript>,
        keys: &[&'static str],
        expr_of: impl Fn(&'static str) -> Result<String>,
    ) -> Result<&'a CompiledScript> {
        match cache.entry(keys.to_vec()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let exprs = keys.iter().map(|&k| expr_of(k)).collect::<Result<Vec<_>>>()?;
                let compiled = script.compile(&format!("[{}]", exprs.join(", ")))?;
                Ok(e.insert(compiled))
            }
        }
    }

    fn run_batch(&mut self, keys: &[&'static str], availability: bool) -> Result<Vec<Dynamic>> {
        let compiled = if availability {
            let actions = &self.actions;
            Self::batch(&self.script, &mut self.availability_cache, keys, |k| {
                actions
                    .get(k)
                    .map(|a| a.precondition.clone())
                    .ok_or_else(|| EnvError::UnknownAction(k.to_string()))
            })?
        } else {
            let fields = &self.fields;
            Self::batch(&self.script, &mut self.observe_cache, keys, |k| {
                fields
                    .get(k)
                    .cloned()
                    .ok_or_else(|| EnvError::UnknownField(k.to_string()))
            })?
        };
        let values = self.script.run_compiled(compiled, &[])?;
        values
            .into_array()
            .map_err(|t| EnvError::script("batch", format!("expected an array, got {t}")))
    }

    fn run_for(&mut self, ticks: u64) -> Result<()> {
        let mut runner = ScriptRunner {
            script: &mut self.script,
            loops: &self.loop_batches,
            deferred: &self.deferred_calls,
        };
        self.scheduler.advance(ticks, &mut runner)
    }
}

impl GameBackend for EmulatedBackend {
    fn reset(&mut self) -> Result<()> {
        self.script.reload()?;
        self.scheduler.reset();
        self.advance_time(RESET_SETTLE_SECONDS)
    }

    fn observe(&mut self, fields: &[&'static str]) -> Result<Observation> {
        let values = self.run_batch(fields, false)?;
        let mut obs = Observation::with_capacity(fields.len());
        for (&key, value) in fields.iter().zip(&values) {
            let v = dynamic_to_f64(value).ok_or_else(|| {
                EnvError::script(key, format!("not numeric ({})", value.type_name()))
            })?;
            obs.set(key, v);
        }
        Ok(obs)
    }

    fn act(&mut self, action: &str) -> Result<bool> {
        let compiled = self
            .actions
            .get(action)
            .ok_or_else(|| EnvError::UnknownAction(action.to_string()))?;
        if let (Some((routine, _)), Some(pending)) = (compiled.deferred, self.scheduler.pending()) {
            // only an attempt that would succeed counts as a second start
            let available = self.script.run_compiled(&compiled.check, &[])?.as_bool().unwrap_or(false);
            if !available {
                debug!(action, "action unavailable");
                return Ok(false);
            }
            return Err(EnvError::DeferredEventPending {
                pending: pending.routine.clone(),
                requested: routine.to_string(),
            });
        }
        let taken = self
            .script
            .run_compiled(&compiled.attempt, &[])?
            .as_bool()
            .map_err(|t| EnvError::script(action, format!("attempt returned {t}")))?;
        if !taken {
            debug!(action, "action unavailable");
            return Ok(false);
        }
        if let Some((routine, delay)) = compiled.deferred {
            self.scheduler.schedule(routine, delay)?;
        }
        Ok(true)
    }

    fn advance_time(&mut self, seconds: f64) -> Result<()> {
        let ticks = seconds_to_ticks(seconds)?;
        self.run_for(ticks)
    }

    fn save_state(&mut self) -> Result<String> {
        let envelope = StateEnvelope {
            version: STATE_VERSION,
            clock: self.scheduler.clock().clone(),
            heap: self.script.snapshot()?,
            rng: self.script.rng_cursor(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    fn load_state(&mut self, state: &str) -> Result<()> {
        let envelope: StateEnvelope = serde_json::from_str(state)
            .map_err(|e| EnvError::Snapshot(format!("not a saved emulator state: {e}")))?;
        if envelope.version != STATE_VERSION {
            return Err(EnvError::Snapshot(format!(
                "state version {} (expected {STATE_VERSION})",
                envelope.version
            )));
        }
        self.scheduler.restore(envelope.clock)?;
        self.script.restore(&envelope.heap)?;
        if let Some(cursor) = envelope.rng {
            self.script.restore_rng(cursor)?;
        }
        Ok(())
    }

    fn available_actions(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>> {
        self.run_batch(candidates, true)?
            .iter()
            .map(|v| {
                v.as_bool()
                    .map_err(|t| EnvError::script("availability", format!("got {t}")))
            })
            .collect()
    }

    fn elapsed_seconds(&self) -> f64 {
        self.scheduler.elapsed_seconds()
    }
}
