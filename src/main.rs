// =============================================================================
// clipsim: staged paperclip-game environment, emulated backend CLI
// =============================================================================
// Build & Run:
//   cargo build --release
//   cargo run --release -- rollout --episodes 10 --steps 2000
//   cargo run --release -- explore --seconds 120 --interval 10
//   cargo run --release -- save-state --steps 5000 --out pool.json

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use clipsim::{
    EmulatedBackend, EnvConfig, Environment, GameBackend, Policy, RandomPolicy, SnapshotPool,
    run_rollout,
};

fn emulator(game_dir: Option<&Path>, seed: Option<u64>) -> Result<EmulatedBackend> {
    let backend = match game_dir {
        Some(dir) => EmulatedBackend::from_dir(dir, seed)
            .with_context(|| format!("Failed to load game scripts from {}", dir.display()))?,
        None => EmulatedBackend::new(seed).context("Failed to load bundled game scripts")?,
    };
    Ok(backend)
}

fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<EnvConfig> {
    let mut config = match path {
        Some(p) => EnvConfig::from_json_file(p)
            .with_context(|| format!("Failed to read config: {}", p.display()))?,
        None => EnvConfig::default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(config)
}

/// No trained policies ship with the CLI, so stages below the initial one are
/// climbed with random play.
fn random_resetters(config: &EnvConfig) -> Vec<Box<dyn Policy>> {
    (0..config.initial_stage)
        .map(|i| {
            Box::new(RandomPolicy::new(config.seed.map(|s| s + 1 + i as u64))) as Box<dyn Policy>
        })
        .collect()
}

fn environment(
    config_path: Option<&Path>,
    game_dir: Option<&Path>,
    seed: Option<u64>,
) -> Result<Environment<EmulatedBackend>> {
    let config = load_config(config_path, seed)?;
    if config.initial_stage > 0 {
        eprintln!(
            "Climbing to stage {} with random resetter policies; this can take many restarts.",
            config.initial_stage
        );
    }
    let backend = emulator(game_dir, config.seed)?;
    let resetters = random_resetters(&config);
    Environment::new(backend, config, resetters).context("Failed to build environment")
}

// =============================================================================
// Rollout (random-policy baseline)
// =============================================================================

fn rollout(args: &RolloutArgs) -> Result<()> {
    eprintln!("Running random policy baseline...");

    let mut env = environment(args.config.as_deref(), args.game_dir.as_deref(), args.seed)?;
    let mut policy = RandomPolicy::new(args.seed);
    let mut rewards = Vec::new();

    for ep in 0..args.episodes.max(1) {
        let stats = run_rollout(&mut env, &mut policy, 1, args.steps)?;
        eprintln!(
            "Random ep {}: reward={:.2}, steps={}, stage={}, game_time={:.1}s",
            ep + 1,
            stats.avg_reward,
            stats.avg_steps,
            stats.avg_final_stage,
            env.backend().elapsed_seconds(),
        );
        if let Some(report) = env.last_bootstrap() {
            eprintln!(
                "  bootstrap: restarts={}, steps={}",
                report.restarts, report.steps
            );
        }
        rewards.push(stats.avg_reward);
    }

    let mean = rewards.iter().sum::<f64>() / rewards.len() as f64;
    let max = rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    eprintln!("\nBaseline: mean={mean:.2}, max={max:.2}");
    Ok(())
}

// =============================================================================
// Explore
// =============================================================================

const WATCHED: &[&str] = &[
    "Paperclips",
    "Available Funds",
    "Unsold Inventory",
    "Public Demand",
    "Wire Inches",
    "Number of Autoclippers",
    "Operations",
    "Trust",
];

fn explore(args: &ExploreArgs) -> Result<()> {
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("  GAME EXPLORER (embedded script, virtual clock)");
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("Watch fields change as game time passes.");
    eprintln!("═══════════════════════════════════════════════════════════");

    let mut backend = emulator(args.game_dir.as_deref(), args.seed)?;
    backend.reset()?;

    let interval = args.interval.max(0.01);
    let mut elapsed = 0.0;
    while elapsed < args.seconds {
        for _ in 0..args.clicks {
            backend.act("Make Paperclip")?;
        }
        backend.advance_time(interval)?;
        elapsed += interval;
        let obs = backend.observe(WATCHED)?;
        println!("t={:>8.2}s  {obs}", backend.elapsed_seconds());
    }

    let loops = backend.scheduler().loops();
    eprintln!("\nLoop iterations:");
    for l in loops {
        eprintln!(
            "  {:<16} period={:>4} ticks  executed={}",
            l.routine,
            l.period,
            backend.scheduler().executed(&l.routine).unwrap_or(0)
        );
    }
    Ok(())
}

// =============================================================================
// Save State
// =============================================================================

fn save_state(args: &SaveStateArgs) -> Result<()> {
    let mut env = environment(args.config.as_deref(), args.game_dir.as_deref(), args.seed)?;
    let mut policy = RandomPolicy::new(args.seed);

    let mut observation = env.reset()?;
    let mut mask = env.action_mask()?;
    for _ in 0..args.steps {
        let (action, _) = policy.act(true, &observation, &mask)?;
        let result = env.step(action)?;
        observation = result.observation;
        mask = result.info.available_actions;
    }

    let state = env.backend_mut().save_state()?;
    let size = SnapshotPool::append_to_file(&args.out, &state)
        .with_context(|| format!("Failed to write snapshot pool: {}", args.out.display()))?;
    eprintln!(
        "Saved stage {} state after {} steps ({:.1}s game time) to {} ({size} states)",
        env.stage(),
        args.steps,
        env.backend().elapsed_seconds(),
        args.out.display(),
    );
    Ok(())
}

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "clipsim", about = "Staged paperclip-game environment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run random policy baseline
    Rollout(RolloutArgs),
    /// Advance the clock and watch fields change
    Explore(ExploreArgs),
    /// Play randomly, then append the game state to a snapshot pool
    SaveState(SaveStateArgs),
}

#[derive(Parser)]
struct RolloutArgs {
    #[arg(long, default_value = "10")]
    episodes: usize,
    #[arg(long, default_value = "1000")]
    steps: u64,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    game_dir: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser)]
struct ExploreArgs {
    #[arg(long, default_value = "60")]
    seconds: f64,
    #[arg(long, default_value = "5")]
    interval: f64,
    /// Paperclips made by hand before each interval
    #[arg(long, default_value = "10")]
    clicks: u32,
    #[arg(long)]
    game_dir: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser)]
struct SaveStateArgs {
    #[arg(long, default_value = "1000")]
    steps: u64,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    game_dir: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Rollout(args) => rollout(args),
        Commands::Explore(args) => explore(args),
        Commands::SaveState(args) => save_state(args),
    }
}
