//! Randomized rotation over three kinds of entity lock: player then monster,
//! monster then drop table, drop table then player. Any mixture of worker
//! threads eventually closes a Player -> Monster -> DropTable -> Player cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use lockgraph::{LockOrderTracker, TrackedLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub threads: usize,
    pub duration: Duration,
    pub players: usize,
    pub monsters: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            threads: 16,
            duration: Duration::from_secs(5),
            players: 1000,
            monsters: 1000,
        }
    }
}

struct World {
    players: Vec<TrackedLock<u64>>,
    monsters: Vec<TrackedLock<u64>>,
    drop_table: TrackedLock<u64>,
}

impl World {
    fn new(tracker: &Arc<LockOrderTracker>, config: &RotationConfig) -> Self {
        Self {
            players: (0..config.players)
                .map(|_| TrackedLock::with_tracker("Player", 0, Arc::clone(tracker)))
                .collect(),
            monsters: (0..config.monsters)
                .map(|_| TrackedLock::with_tracker("Monster", 0, Arc::clone(tracker)))
                .collect(),
            drop_table: TrackedLock::with_tracker("DropTable", 0, Arc::clone(tracker)),
        }
    }

    fn step(&self, rng: &mut StdRng) {
        let player = &self.players[rng.gen_range(0..self.players.len())];
        let monster = &self.monsters[rng.gen_range(0..self.monsters.len())];
        let (first, second) = match rng.gen_range(0..3) {
            0 => (player, monster),
            1 => (monster, &self.drop_table),
            _ => (&self.drop_table, player),
        };
        let mut g1 = first.lock();
        let mut g2 = second.lock();
        for guard in [&mut g1, &mut g2] {
            if let Some(value) = guard.get_mut() {
                *value += 1;
            }
        }
    }
}

pub fn run(tracker: &Arc<LockOrderTracker>, config: &RotationConfig) -> Result<(), String> {
    if config.threads == 0 || config.players == 0 || config.monsters == 0 {
        return Err("threads, players and monsters must all be non-zero".to_owned());
    }

    let world = Arc::new(World::new(tracker, config));
    let running = Arc::new(AtomicBool::new(true));
    let steps = Arc::new(AtomicU64::new(0));

    let workers = (0..config.threads)
        .map(|index| {
            let world = Arc::clone(&world);
            let running = Arc::clone(&running);
            let steps = Arc::clone(&steps);
            thread::Builder::new()
                .name(format!("rotation-worker-{index}"))
                .spawn(move || {
                    let mut rng = StdRng::from_entropy();
                    while running.load(Ordering::Relaxed) {
                        world.step(&mut rng);
                        steps.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(Duration::from_millis(1));
                    }
                })
                .map_err(|e| format!("failed to spawn worker {index}: {e}"))
        })
        .collect::<Result<Vec<_>, String>>();

    let workers = match workers {
        Ok(workers) => workers,
        Err(err) => {
            running.store(false, Ordering::Relaxed);
            return Err(err);
        }
    };

    thread::sleep(config.duration);
    running.store(false, Ordering::Relaxed);

    for worker in workers {
        worker
            .join()
            .map_err(|_| "rotation worker panicked".to_owned())?;
    }

    tracing::info!(
        steps = steps.load(Ordering::Relaxed),
        cycles_detected = tracker.stats().cycles_detected,
        "entity rotation finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockgraph::{CycleCheck, TrackerConfig};

    #[test]
    fn short_rotation_surfaces_the_three_way_cycle() {
        let tracker = Arc::new(LockOrderTracker::new(TrackerConfig {
            cycle_check: CycleCheck::NewEdges,
            report_cycles: false,
        }));
        // One player and one monster make every rotation hit the same three
        // locks, so all three orderings show up quickly.
        let config = RotationConfig {
            threads: 2,
            duration: Duration::from_millis(300),
            players: 1,
            monsters: 1,
        };
        run(&tracker, &config).expect("scenario should run");

        let stats = tracker.stats();
        assert_eq!(stats.held_units, 0);
        assert_eq!(stats.tracked_locks, 3);
        assert_eq!(stats.dependencies, 3);
        let report = tracker.find_cycle().expect("rotation closes a cycle");
        let mut names = report.lock_names();
        names.sort_unstable();
        assert_eq!(names, vec!["DropTable", "Monster", "Player"]);
    }

    #[test]
    fn zero_threads_is_rejected() {
        let tracker = Arc::new(LockOrderTracker::default());
        let config = RotationConfig {
            threads: 0,
            ..RotationConfig::default()
        };
        assert!(run(&tracker, &config).is_err());
    }
}
