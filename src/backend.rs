use crate::error::Result;
use crate::spaces::Observation;

/// The uniform contract both the live browser session and the embedded
/// emulator satisfy. Environment logic depends only on this trait.
pub trait GameBackend {
    /// Return to a fresh game, dropping any cached elements or loop counters.
    fn reset(&mut self) -> Result<()>;

    /// Read `fields` in order. Must not change game state and must reflect the
    /// latest `act`/`advance_time`.
    fn observe(&mut self, fields: &[&'static str]) -> Result<Observation>;

    /// Attempt one discrete action. `Ok(false)` means the action is currently
    /// unavailable, which is expected and common.
    fn act(&mut self, action: &str) -> Result<bool>;

    /// Let simulated time pass. Backends driven by the wall clock ignore this.
    fn advance_time(&mut self, seconds: f64) -> Result<()>;

    fn save_state(&mut self) -> Result<String>;

    fn load_state(&mut self, state: &str) -> Result<()>;

    /// Which of `candidates` are legal right now, without mutating state.
    fn available_actions(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>>;

    /// Game time elapsed since the last `reset`, in seconds.
    fn elapsed_seconds(&self) -> f64;

    /// Target interval between consecutive actions. Only wall-clock backends
    /// act on it.
    fn set_pacing_interval(&mut self, _seconds: f64) {}
}

impl<B: GameBackend + ?Sized> GameBackend for Box<B> {
    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn observe(&mut self, fields: &[&'static str]) -> Result<Observation> {
        (**self).observe(fields)
    }

    fn act(&mut self, action: &str) -> Result<bool> {
        (**self).act(action)
    }

    fn advance_time(&mut self, seconds: f64) -> Result<()> {
        (**self).advance_time(seconds)
    }

    fn save_state(&mut self) -> Result<String> {
        (**self).save_state()
    }

    fn load_state(&mut self, state: &str) -> Result<()> {
        (**self).load_state(state)
    }

    fn available_actions(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>> {
        (**self).available_actions(candidates)
    }

    fn elapsed_seconds(&self) -> f64 {
        (**self).elapsed_seconds()
    }

    fn set_pacing_interval(&mut self, seconds: f64) {
        (**self).set_pacing_interval(seconds)
    }
}
