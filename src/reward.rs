use serde::{Deserialize, Serialize};

use crate::spaces::Observation;

// =============================================================================
// Reward Tuning Knobs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Scale applied to the raw cash+assets delta, indexed by the stage in
    /// effect when the action was taken. Stages past the end reuse the last
    /// entry.
    pub stage_multipliers: Vec<f64>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            stage_multipliers: vec![1.0, 1.0, 1.0, 0.1, 0.1, 0.01],
        }
    }
}

impl RewardConfig {
    pub fn multiplier(&self, stage: usize) -> f64 {
        self.stage_multipliers
            .get(stage)
            .or(self.stage_multipliers.last())
            .copied()
            .unwrap_or(1.0)
    }
}

// =============================================================================
// Wire Per Spool
// =============================================================================

pub const BASE_WIRE_PER_SPOOL: f64 = 1000.0;

/// Each extrusion upgrade multiplies the inches delivered per spool. The game
/// script applies the same factors when the project is bought.
pub const WIRE_TIERS: &[(&str, f64)] = &[
    ("Improved Wire Extrusion Activated", 1.5),
    ("Optimized Wire Extrusion Activated", 1.75),
    ("Microlattice Shapecasting Activated", 2.0),
    ("Spectral Froth Annealment Activated", 2.0),
];

pub fn wire_per_spool(obs: &Observation) -> f64 {
    WIRE_TIERS
        .iter()
        .filter(|(flag, _)| obs.get(flag).is_some_and(|v| v >= 1.0))
        .fold(BASE_WIRE_PER_SPOOL, |acc, (_, factor)| acc * factor)
}

// =============================================================================
// Reward
// =============================================================================

/// Unscaled per-term contributions of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub cash: f64,
    pub wire: f64,
    pub autoclippers: f64,
    pub marketing: f64,
    pub megaclippers: f64,
    pub investments: f64,
    pub multiplier: f64,
}

impl RewardBreakdown {
    pub fn raw(&self) -> f64 {
        self.cash + self.wire + self.autoclippers + self.marketing + self.megaclippers + self.investments
    }

    pub fn total(&self) -> f64 {
        self.raw() * self.multiplier
    }
}

/// Durable assets valued at the previous observation's price field. A `None`
/// price means the item is worth one unit of cash per unit.
const ASSETS: &[(&str, Option<&str>)] = &[
    ("Number of Autoclippers", Some("Autoclipper Cost")),
    ("Marketing Level", Some("Marketing Cost")),
    ("Number of MegaClippers", Some("MegaClipper Cost")),
    ("Investment Bankroll", None),
    ("Stocks", None),
];

#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    pub fn compute(&self, stage: usize, prev: &Observation, cur: &Observation) -> f64 {
        self.breakdown(stage, prev, cur).total()
    }

    pub fn breakdown(&self, stage: usize, prev: &Observation, cur: &Observation) -> RewardBreakdown {
        let mut b = RewardBreakdown {
            multiplier: self.config.multiplier(stage),
            cash: delta(prev, cur, "Available Funds").unwrap_or(0.0),
            ..Default::default()
        };

        if let (Some(dwire), Some(cost)) = (delta(prev, cur, "Wire Inches"), prev.get("Wire Cost")) {
            b.wire = dwire * cost / wire_per_spool(prev);
        }

        for &(count, price) in ASSETS {
            let Some(d) = delta(prev, cur, count) else {
                continue;
            };
            let value = match price {
                Some(p) => match prev.get(p) {
                    Some(unit) => d * unit,
                    None => continue,
                },
                None => d,
            };
            match count {
                "Number of Autoclippers" => b.autoclippers += value,
                "Marketing Level" => b.marketing += value,
                "Number of MegaClippers" => b.megaclippers += value,
                _ => b.investments += value,
            }
        }
        b
    }
}

fn delta(prev: &Observation, cur: &Observation, key: &str) -> Option<f64> {
    Some(cur.get(key)? - prev.get(key)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage0(funds: f64, wire: f64, clippers: f64) -> Observation {
        Observation::from_pairs(&[
            ("Available Funds", funds),
            ("Wire Inches", wire),
            ("Wire Cost", 20.0),
            ("Number of Autoclippers", clippers),
            ("Autoclipper Cost", 6.1),
            ("Price per Clip", 0.25),
        ])
    }

    #[test]
    fn funds_delta_is_the_whole_reward() {
        let calc = RewardCalculator::default();
        let prev = stage0(10.0, 500.0, 1.0);
        let cur = stage0(17.5, 500.0, 1.0);
        assert!((calc.compute(0, &prev, &cur) - 7.5).abs() < 1e-12);
    }

    #[test]
    fn buying_wire_is_roughly_neutral() {
        let calc = RewardCalculator::default();
        let prev = stage0(30.0, 0.0, 0.0);
        let cur = stage0(10.0, 1000.0, 0.0);
        let b = calc.breakdown(0, &prev, &cur);
        assert!((b.cash + 20.0).abs() < 1e-12);
        assert!((b.wire - 20.0).abs() < 1e-12);
        assert!(b.total().abs() < 1e-12);
    }

    #[test]
    fn assets_use_previous_prices() {
        let calc = RewardCalculator::default();
        let prev = stage0(10.0, 0.0, 1.0);
        let mut cur = stage0(3.9, 0.0, 2.0);
        // buying raises the price; the delta must still use the old one
        cur.set("Autoclipper Cost", 7.2);
        let b = calc.breakdown(0, &prev, &cur);
        assert!((b.autoclippers - 6.1).abs() < 1e-12);
        assert!(b.total().abs() < 1e-9);
    }

    #[test]
    fn missing_fields_contribute_nothing() {
        let calc = RewardCalculator::default();
        let prev = Observation::from_pairs(&[("Available Funds", 1.0)]);
        let cur = Observation::from_pairs(&[("Available Funds", 2.0), ("Stocks", 50.0)]);
        let b = calc.breakdown(0, &prev, &cur);
        assert_eq!(b.investments, 0.0);
        assert_eq!(b.total(), 1.0);
    }

    #[test]
    fn stage_multiplier_applies_and_saturates() {
        let calc = RewardCalculator::default();
        let prev = Observation::from_pairs(&[("Available Funds", 0.0)]);
        let cur = Observation::from_pairs(&[("Available Funds", 100.0)]);
        assert!((calc.compute(3, &prev, &cur) - 10.0).abs() < 1e-9);
        assert!((calc.compute(5, &prev, &cur) - 1.0).abs() < 1e-9);
        assert!((calc.compute(9, &prev, &cur) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn wire_tiers_compound() {
        let mut obs = Observation::new();
        assert_eq!(wire_per_spool(&obs), 1000.0);
        obs.set("Improved Wire Extrusion Activated", 1.0);
        obs.set("Optimized Wire Extrusion Activated", 1.0);
        assert!((wire_per_spool(&obs) - 2625.0).abs() < 1e-9);
        obs.set("Microlattice Shapecasting Activated", 1.0);
        obs.set("Spectral Froth Annealment Activated", 1.0);
        assert!((wire_per_spool(&obs) - 10500.0).abs() < 1e-9);
    }
}
