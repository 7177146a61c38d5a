use tracing::info;

use crate::backend::GameBackend;
use crate::catalog;
use crate::error::{EnvError, Result};
use crate::spaces::{ActionSpace, Observation, ObservationSpace};

/// Bumped whenever a stage's field or action list changes. Policies trained
/// against one version cannot be reused with another.
pub const STAGE_TABLE_VERSION: u32 = 3;

// =============================================================================
// Advancement Predicates
// =============================================================================

/// When the game has unlocked enough to move past a stage. The game never
/// revokes an unlock, so every predicate stays true once it is true.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advancement {
    AtLeast {
        field: &'static str,
        threshold: f64,
    },
    AllSet(&'static [&'static str]),
    Final,
}

impl Advancement {
    pub fn fields(&self) -> Vec<&'static str> {
        match *self {
            Advancement::AtLeast { field, .. } => vec![field],
            Advancement::AllSet(flags) => flags.to_vec(),
            Advancement::Final => Vec::new(),
        }
    }

    pub fn is_satisfied(&self, obs: &Observation) -> bool {
        match *self {
            Advancement::AtLeast { field, threshold } => {
                obs.get(field).is_some_and(|v| v >= threshold)
            }
            Advancement::AllSet(flags) => flags
                .iter()
                .all(|f| obs.get(f).is_some_and(|v| v >= 1.0)),
            Advancement::Final => false,
        }
    }
}

// =============================================================================
// Stage Table
// =============================================================================

#[derive(Debug, Clone)]
pub struct StageDefinition {
    pub stage: usize,
    pub observation: ObservationSpace,
    pub actions: ActionSpace,
    /// Seconds between actions.
    pub pacing_interval: f64,
    pub advancement: Advancement,
}

struct StageAdditions {
    observations: &'static [&'static str],
    actions: &'static [&'static str],
    pacing_interval: f64,
    advancement: Advancement,
}

const STAGE_ADDITIONS: &[StageAdditions] = &[
    // 0: selling clips by hand
    StageAdditions {
        observations: &[
            "Unsold Inventory",
            "Price per Clip",
            "Public Demand",
            "Available Funds",
            "Autoclipper Cost",
            "Number of Autoclippers",
            "Wire Inches",
            "Wire Cost",
        ],
        actions: &[
            "Make Paperclip",
            "Lower Price",
            "Raise Price",
            "Buy Autoclipper",
            "Buy Wire",
        ],
        pacing_interval: 0.2,
        advancement: Advancement::AtLeast {
            field: "Paperclips",
            threshold: 2000.0,
        },
    },
    // 1: computation, marketing and the first projects
    StageAdditions {
        observations: &[
            "Paperclips",
            "Marketing Level",
            "Marketing Cost",
            "Processors",
            "Memory",
            "Trust",
            "Next Trust",
            "Operations",
            "Creativity",
            "Improved AutoClippers Activated",
            "Creativity Activated",
            "Even Better AutoClippers Activated",
            "Optimized AutoClippers Activated",
            "Limerick Activated",
            "Improved Wire Extrusion Activated",
            "Optimized Wire Extrusion Activated",
            "New Slogan Activated",
            "Catchy Jingle Activated",
            "Lexical Processing Activated",
            "Combinatory Harmonics Activated",
            "The Hadwiger Problem Activated",
            "The Toth Sausage Conjecture Activated",
            "Donkey Space Activated",
            "RevTracker Activated",
        ],
        actions: &[
            "Expand Marketing",
            "Add Processor",
            "Add Memory",
            "Activate Improved AutoClippers",
            "Activate Creativity",
            "Activate Even Better AutoClippers",
            "Activate Optimized AutoClippers",
            "Activate Limerick",
            "Activate Improved Wire Extrusion",
            "Activate Optimized Wire Extrusion",
            "Activate New Slogan",
            "Activate Catchy Jingle",
            "Activate Lexical Processing",
            "Activate Combinatory Harmonics",
            "Activate The Hadwiger Problem",
            "Activate The Toth Sausage Conjecture",
            "Activate Donkey Space",
            "Activate RevTracker",
        ],
        pacing_interval: 0.2,
        advancement: Advancement::AtLeast {
            field: "Memory",
            threshold: 6.0,
        },
    },
    // 2: late production upgrades
    StageAdditions {
        observations: &[
            "Manufacturing Clips per Second",
            "Microlattice Shapecasting Activated",
            "Spectral Froth Annealment Activated",
            "Hadwiger Clip Diagrams Activated",
            "WireBuyer Activated",
            "Hypno Harmonics Activated",
            "Algorithmic Trading Activated",
        ],
        actions: &[
            "Activate Microlattice Shapecasting",
            "Activate Spectral Froth Annealment",
            "Activate Hadwiger Clip Diagrams",
            "Activate WireBuyer",
            "Activate Hypno Harmonics",
            "Activate Algorithmic Trading",
        ],
        pacing_interval: 0.2,
        advancement: Advancement::AllSet(&["Algorithmic Trading Activated"]),
    },
    // 3: investments
    StageAdditions {
        observations: &[
            "Investment Bankroll",
            "Stocks",
            "Riskiness",
            "Investment Engine Level",
            "Investment Engine Upgrade Cost",
            "Yomi",
            "Strategic Modeling Activated",
        ],
        actions: &[
            "Do Nothing",
            "Set Investment Low",
            "Set Investment Medium",
            "Set Investment High",
            "Deposit",
            "Withdraw",
            "Upgrade Investment Engine",
            "Activate Strategic Modeling",
        ],
        pacing_interval: 0.5,
        advancement: Advancement::AllSet(&["Strategic Modeling Activated"]),
    },
    // 4: tournaments
    StageAdditions {
        observations: &[
            "Tournament Cost",
            "Quantum Computing Activated",
            "Photonic Chip Activated",
            "MegaClippers Activated",
        ],
        actions: &[
            "Run New Tournament",
            "Activate Quantum Computing",
            "Activate Photonic Chip",
            "Activate MegaClippers",
        ],
        pacing_interval: 0.5,
        advancement: Advancement::AllSet(&[
            "Quantum Computing Activated",
            "Photonic Chip Activated",
        ]),
    },
    // 5: quantum compute and megaclippers
    StageAdditions {
        observations: &[
            "Number of Photonic Chips",
            "Photonic Chip 0 Level",
            "Latest QOps",
            "MegaClipper Cost",
            "Number of MegaClippers",
        ],
        actions: &["Quantum Compute", "Buy MegaClipper"],
        pacing_interval: 0.5,
        advancement: Advancement::Final,
    },
];

#[derive(Debug, Clone)]
pub struct StageTable {
    version: u32,
    stages: Vec<StageDefinition>,
}

impl StageTable {
    /// The full six-stage table, each stage extending the previous one's
    /// vocabulary.
    pub fn standard() -> Result<Self> {
        let mut observations: Vec<&'static str> = Vec::new();
        let mut actions: Vec<&'static str> = Vec::new();
        let mut stages = Vec::with_capacity(STAGE_ADDITIONS.len());
        for (stage, add) in STAGE_ADDITIONS.iter().enumerate() {
            for &key in add.observations {
                if !observations.contains(&key) {
                    observations.push(key);
                }
            }
            for &name in add.actions {
                if !actions.contains(&name) {
                    actions.push(name);
                }
            }
            stages.push(StageDefinition {
                stage,
                observation: ObservationSpace::new(&observations)?,
                actions: ActionSpace::new(&actions)?,
                pacing_interval: add.pacing_interval,
                advancement: add.advancement,
            });
        }
        Self::from_definitions(STAGE_TABLE_VERSION, stages)
    }

    pub fn from_definitions(version: u32, stages: Vec<StageDefinition>) -> Result<Self> {
        if stages.is_empty() {
            return Err(EnvError::Config("stage table is empty".into()));
        }
        for (i, def) in stages.iter().enumerate() {
            if def.stage != i {
                return Err(EnvError::Config(format!(
                    "stage numbers must run 0..N in order, found {} at position {i}",
                    def.stage
                )));
            }
            if !(def.pacing_interval.is_finite() && def.pacing_interval > 0.0) {
                return Err(EnvError::Config(format!(
                    "stage {i} has pacing interval {}",
                    def.pacing_interval
                )));
            }
            for field in def.advancement.fields() {
                if catalog::field_spec(field).is_none() {
                    return Err(EnvError::UnknownField(field.to_string()));
                }
            }
        }
        Ok(Self { version, stages })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn last_stage(&self) -> usize {
        self.stages.len() - 1
    }

    pub fn get(&self, stage: usize) -> Option<&StageDefinition> {
        self.stages.get(stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDefinition> {
        self.stages.iter()
    }
}

// =============================================================================
// Stage Manager
// =============================================================================

#[derive(Debug, Clone)]
pub struct StageManager {
    table: StageTable,
    current: usize,
    final_stage: usize,
    speedup: f64,
}

impl StageManager {
    pub fn new(table: StageTable, final_stage: Option<usize>, speedup: f64) -> Result<Self> {
        let final_stage = final_stage.unwrap_or(table.last_stage());
        if final_stage > table.last_stage() {
            return Err(EnvError::Config(format!(
                "final stage {final_stage} is past the last defined stage {}",
                table.last_stage()
            )));
        }
        if !(speedup.is_finite() && speedup > 0.0) {
            return Err(EnvError::Config(format!("action rate speedup {speedup}")));
        }
        Ok(Self {
            table,
            current: 0,
            final_stage,
            speedup,
        })
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn final_stage(&self) -> usize {
        self.final_stage
    }

    pub fn table(&self) -> &StageTable {
        &self.table
    }

    pub fn definition(&self) -> &StageDefinition {
        &self.table.stages[self.current]
    }

    pub fn observation_space(&self) -> &ObservationSpace {
        &self.definition().observation
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.definition().actions
    }

    pub fn pacing_interval(&self) -> f64 {
        self.definition().pacing_interval / self.speedup
    }

    /// Evaluate the current stage's predicate against a targeted observation
    /// and advance while it holds. Returns whether the stage changed; the new
    /// pacing interval is pushed to the backend before returning.
    pub fn update<B: GameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<bool> {
        let start = self.current;
        while self.current < self.final_stage {
            let advancement = self.definition().advancement;
            let fields = advancement.fields();
            if fields.is_empty() {
                break;
            }
            let obs = backend.observe(&fields)?;
            if !advancement.is_satisfied(&obs) {
                break;
            }
            self.current += 1;
            info!(from = self.current - 1, to = self.current, "advanced stage");
        }
        let changed = self.current != start;
        if changed {
            backend.set_pacing_interval(self.pacing_interval());
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Values {
        values: HashMap<&'static str, f64>,
        observed: Vec<Vec<&'static str>>,
        pacing: Option<f64>,
    }

    impl GameBackend for Values {
        fn reset(&mut self) -> Result<()> {
            self.values.clear();
            Ok(())
        }
        fn observe(&mut self, fields: &[&'static str]) -> Result<Observation> {
            self.observed.push(fields.to_vec());
            let mut obs = Observation::new();
            for &f in fields {
                obs.set(f, self.values.get(f).copied().unwrap_or(0.0));
            }
            Ok(obs)
        }
        fn act(&mut self, _action: &str) -> Result<bool> {
            Ok(true)
        }
        fn advance_time(&mut self, _seconds: f64) -> Result<()> {
            Ok(())
        }
        fn save_state(&mut self) -> Result<String> {
            Err(EnvError::Unsupported("save_state"))
        }
        fn load_state(&mut self, _state: &str) -> Result<()> {
            Err(EnvError::Unsupported("load_state"))
        }
        fn available_actions(&mut self, candidates: &[&'static str]) -> Result<Vec<bool>> {
            Ok(vec![true; candidates.len()])
        }
        fn elapsed_seconds(&self) -> f64 {
            0.0
        }
        fn set_pacing_interval(&mut self, seconds: f64) {
            self.pacing = Some(seconds);
        }
    }

    fn manager(final_stage: Option<usize>) -> StageManager {
        StageManager::new(StageTable::standard().unwrap(), final_stage, 1.0).unwrap()
    }

    #[test]
    fn standard_table_is_cumulative() {
        let table = StageTable::standard().unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.version(), STAGE_TABLE_VERSION);
        for pair in table.stages.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let b_keys = b.observation.keys();
            assert!(a.observation.keys().iter().all(|k| b_keys.contains(k)));
            assert!(a.actions.names().iter().all(|n| b.actions.names().contains(n)));
            assert!(b.observation.len() > a.observation.len());
        }
        assert_eq!(table.get(0).unwrap().observation.len(), 8);
        assert_eq!(table.get(0).unwrap().actions.len(), 5);
    }

    #[test]
    fn advances_on_clip_threshold() {
        let mut stages = manager(None);
        let mut backend = Values::default();
        backend.values.insert("Paperclips", 1999.0);
        assert!(!stages.update(&mut backend).unwrap());
        assert_eq!(stages.current(), 0);
        assert_eq!(backend.observed, vec![vec!["Paperclips"]]);

        backend.values.insert("Paperclips", 2000.0);
        assert!(stages.update(&mut backend).unwrap());
        assert_eq!(stages.current(), 1);
        assert_eq!(backend.pacing, Some(0.2));
        assert!(stages.observation_space().keys().contains(&"Trust"));
    }

    #[test]
    fn cascades_through_satisfied_predicates() {
        let mut stages = manager(None);
        let mut backend = Values::default();
        backend.values.insert("Paperclips", 5.0e4);
        backend.values.insert("Memory", 10.0);
        backend.values.insert("Algorithmic Trading Activated", 1.0);
        assert!(stages.update(&mut backend).unwrap());
        assert_eq!(stages.current(), 3);
        assert_eq!(backend.pacing, Some(0.5));
    }

    #[test]
    fn never_passes_final_stage() {
        let mut stages = manager(Some(1));
        let mut backend = Values::default();
        backend.values.insert("Paperclips", 5.0e4);
        backend.values.insert("Memory", 10.0);
        assert!(stages.update(&mut backend).unwrap());
        assert_eq!(stages.current(), 1);
        backend.observed.clear();
        assert!(!stages.update(&mut backend).unwrap());
        assert!(backend.observed.is_empty(), "predicates past the final stage are not evaluated");
    }

    #[test]
    fn all_set_requires_every_flag() {
        let adv = Advancement::AllSet(&["Quantum Computing Activated", "Photonic Chip Activated"]);
        let partial = Observation::from_pairs(&[
            ("Quantum Computing Activated", 1.0),
            ("Photonic Chip Activated", 0.0),
        ]);
        assert!(!adv.is_satisfied(&partial));
        let full = Observation::from_pairs(&[
            ("Quantum Computing Activated", 1.0),
            ("Photonic Chip Activated", 1.0),
        ]);
        assert!(adv.is_satisfied(&full));
        assert!(!Advancement::Final.is_satisfied(&full));
    }

    #[test]
    fn speedup_divides_pacing() {
        let stages = StageManager::new(StageTable::standard().unwrap(), None, 2.0).unwrap();
        assert!((stages.pacing_interval() - 0.1).abs() < 1e-12);
        assert!(StageManager::new(StageTable::standard().unwrap(), None, 0.0).is_err());
        assert!(StageManager::new(StageTable::standard().unwrap(), Some(6), 1.0).is_err());
    }
}
