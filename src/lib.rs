pub mod backend;
pub mod bootstrap;
pub mod catalog;
pub mod emulator;
pub mod env;
pub mod error;
pub mod live;
pub mod policy;
pub mod reward;
pub mod rollout;
pub mod scheduler;
pub mod script;
pub mod spaces;
pub mod stages;

pub use backend::GameBackend;
pub use bootstrap::{BootstrapAdvancer, BootstrapReport};
pub use emulator::EmulatedBackend;
pub use env::{Core, EnvConfig, Environment, SnapshotPool, StepInfo, StepResult};
pub use error::{DriverError, EnvError, Result};
pub use live::{BrowserDriver, LiveBackend, Pacer, parse_display_number};
pub use policy::{Policy, RandomPolicy};
pub use reward::{RewardBreakdown, RewardCalculator, RewardConfig};
pub use rollout::{RolloutStats, run_rollout};
pub use scheduler::{VirtualClock, VirtualClockScheduler};
pub use script::{RngCursor, ScriptEngine};
pub use spaces::{ActionSpace, Observation, ObservationSpace};
pub use stages::{StageDefinition, StageManager, StageTable};
