use std::collections::HashMap;

use clipsim::Result;
use clipsim::scheduler::{IntervalLoop, LoopRunner, VirtualClockScheduler};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Default)]
struct Tally {
    runs: HashMap<String, u64>,
}

impl LoopRunner for Tally {
    fn run_loop(&mut self, routine: &str, iterations: u64) -> Result<()> {
        *self.runs.entry(routine.to_string()).or_default() += iterations;
        Ok(())
    }

    fn run_deferred(&mut self, _routine: &str) -> Result<()> {
        Ok(())
    }
}

const PERIODS: [(&str, u64); 5] = [("p1", 1), ("p3", 3), ("p10", 10), ("p100", 100), ("p250", 250)];

fn scheduler() -> VirtualClockScheduler {
    VirtualClockScheduler::new(
        PERIODS
            .iter()
            .map(|&(name, p)| IntervalLoop::new(name, p).unwrap())
            .collect(),
    )
}

#[test]
fn any_two_way_split_matches_one_advance() {
    for total in [0u64, 1, 9, 10, 99, 250, 251, 1234] {
        for first in 0..=total {
            let mut sched = scheduler();
            let mut tally = Tally::default();
            sched.advance(first, &mut tally).unwrap();
            sched.advance(total - first, &mut tally).unwrap();
            for &(name, p) in &PERIODS {
                assert_eq!(sched.executed(name), Some(total / p), "{name} {first}+{}", total - first);
                assert_eq!(tally.runs.get(name).copied().unwrap_or(0), total / p);
            }
        }
    }
}

#[test]
fn random_advances_never_overrun_or_lag() {
    let mut rng = SmallRng::seed_from_u64(17);
    let mut sched = scheduler();
    let mut tally = Tally::default();
    for _ in 0..2000 {
        let ticks = if rng.random_bool(0.05) {
            rng.random_range(0..5000)
        } else {
            rng.random_range(0..30)
        };
        sched.advance(ticks, &mut tally).unwrap();
        let now = sched.now();
        for &(name, p) in &PERIODS {
            let done = sched.executed(name).unwrap();
            assert!(done * p <= now, "{name} ran ahead");
            assert!(now - done * p < p, "{name} fell behind");
        }
    }
}

#[test]
fn deferred_event_fires_once_however_the_clock_moves() {
    struct Fired(Vec<String>);
    impl LoopRunner for Fired {
        fn run_loop(&mut self, _routine: &str, _iterations: u64) -> Result<()> {
            Ok(())
        }
        fn run_deferred(&mut self, routine: &str) -> Result<()> {
            self.0.push(routine.to_string());
            Ok(())
        }
    }

    for step in [1u64, 7, 20, 499, 500, 10_000] {
        let mut sched = scheduler();
        let mut fired = Fired(Vec::new());
        sched.advance(50, &mut fired).unwrap();
        sched.schedule("finish_tourney", 500).unwrap();
        let mut moved = 0;
        while moved < 1200 {
            sched.advance(step, &mut fired).unwrap();
            moved += step;
            if sched.now() < 550 {
                assert!(fired.0.is_empty());
            }
        }
        assert_eq!(fired.0, vec!["finish_tourney".to_string()], "step {step}");
        assert!(sched.pending().is_none());
    }
}
