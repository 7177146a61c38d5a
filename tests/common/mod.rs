#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use clipsim::{EnvError, GameBackend, Observation, Result};
use serde_json::json;

/// A backend whose fields grow linearly with simulated time. The growth
/// table can differ per attempt (one attempt per `reset`), which lets tests
/// script a game that only progresses after a restart. States are
/// `{"elapsed": .., "values": {..}}` JSON.
pub struct FakeGame {
    values: HashMap<String, f64>,
    elapsed: f64,
    resets: usize,
    growth_by_attempt: Vec<Vec<(&'static str, f64)>>,
    pub calls: Rc<Cell<u32>>,
    pub pacing: Option<f64>,
}

impl FakeGame {
    pub fn new(growth_by_attempt: Vec<Vec<(&'static str, f64)>>) -> Self {
        Self {
            values: HashMap::new(),
            elapsed: 0.0,
            resets: 0,
            growth_by_attempt,
            calls: Rc::new(Cell::new(0)),
            pacing: None,
        }
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    fn touch(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl GameBackend for FakeGame {
    fn reset(&mut self) -> Result<()> {
        self.touch();
        self.resets += 1;
        self.values.clear();
        self.elapsed = 0.0;
        Ok(())
    }

    fn observe(&mut self, fields: &[&'static str]) -> Result<Observation> {
        self.touch();
        let mut obs = Observation::with_capacity(fields.len());
        for &f in fields {
            obs.set(f, self.values.get(f).copied().unwrap_or(0.0));
        }
        Ok(obs)
    }

    fn act(&mut self, _action: &str) -> Result<bool> {
        self.touch();
        Ok(true)
    }

    fn advance_time(&mut self, seconds: f64) -> Result<()> {
        self.touch();
        self.elapsed += seconds;
        let attempt = self.resets.saturating_sub(1).min(self.growth_by_attempt.len().saturating_sub(1));
        if let Some(growth) = self.growth_by_attempt.get(attempt) {
            for &(field, rate) in growth {
                *self.values.entry(field.to_string()).or_default() += rate * seconds;
            }
        }
        Ok(())
    }

    fn save_state(&mut self) -> Result<String> {
        self.touch();
        Ok(fake_state(self.elapsed, &self.values))
    }

    fn load_state(&mut self, state: &str) -> Result<()> {
        self.touch();
        let mut state: serde_json::Value = serde_json::from_str(state)?;
        self.elapsed = state["elapsed"]
            .as_f64()
            .ok_or_else(|| EnvError::Snapshot("missing elapsed".into()))?;
        self.values = serde_json::from_value(state["values"].take())?;
        Ok(())
    }

    fn available_actions(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>> {
        self.touch();
        Ok(vec![true; candidates.len()])
    }

    fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }

    fn set_pacing_interval(&mut self, seconds: f64) {
        self.pacing = Some(seconds);
    }
}

pub fn fake_state(elapsed: f64, values: &HashMap<String, f64>) -> String {
    json!({ "elapsed": elapsed, "values": values }).to_string()
}
