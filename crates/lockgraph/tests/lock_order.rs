use std::sync::{Arc, Mutex, OnceLock};
use std::thread;

use lockgraph::{CycleCheck, LockOrderTracker, TrackedLock, TrackerConfig, UnitId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn tracker(cycle_check: CycleCheck) -> Arc<LockOrderTracker> {
    Arc::new(LockOrderTracker::new(TrackerConfig {
        cycle_check,
        report_cycles: false,
    }))
}

fn test_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
    GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn consistent_order_across_threads_never_reports() {
    let tracker = tracker(CycleCheck::FullGraph);
    let locks: Arc<Vec<TrackedLock<u64>>> = Arc::new(
        (0..8)
            .map(|i| TrackedLock::with_tracker(format!("ordered-{i}"), 0, Arc::clone(&tracker)))
            .collect(),
    );

    let workers: Vec<_> = (0..4u64)
        .map(|seed| {
            let locks = Arc::clone(&locks);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                for _ in 0..200 {
                    // Any subset, always taken in index order, induces a DAG.
                    let picked: Vec<usize> =
                        (0..locks.len()).filter(|_| rng.gen_bool(0.4)).collect();
                    let mut guards = Vec::with_capacity(picked.len());
                    for i in picked {
                        let mut guard = locks[i].lock();
                        if let Some(value) = guard.get_mut() {
                            *value += 1;
                        }
                        guards.push(guard);
                    }
                    while let Some(guard) = guards.pop() {
                        drop(guard);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker should not panic");
    }

    let stats = tracker.stats();
    assert_eq!(stats.cycles_detected, 0);
    assert_eq!(stats.held_units, 0);
    assert!(tracker.find_cycle().is_none());
    assert!(stats.dependencies <= 28);
}

#[test]
fn inversion_on_two_threads_reports_two_cycle() {
    let tracker = tracker(CycleCheck::FullGraph);
    let x = Arc::new(TrackedLock::with_tracker("X", (), Arc::clone(&tracker)));
    let y = Arc::new(TrackedLock::with_tracker("Y", (), Arc::clone(&tracker)));

    {
        let (x, y) = (Arc::clone(&x), Arc::clone(&y));
        thread::spawn(move || {
            let _gx = x.lock();
            let _gy = y.lock();
        })
        .join()
        .expect("first unit should not panic");
    }
    assert_eq!(tracker.stats().cycles_detected, 0);
    {
        let (x, y) = (Arc::clone(&x), Arc::clone(&y));
        thread::spawn(move || {
            let _gy = y.lock();
            let _gx = x.lock();
        })
        .join()
        .expect("second unit should not panic");
    }

    let stats = tracker.stats();
    assert_eq!(stats.dependencies, 2);
    assert_eq!(stats.cycles_detected, 1);
    let report = tracker.find_cycle().expect("cycle must exist");
    assert!(report.path().is_rotation_of(&[x.id(), y.id(), x.id()]));
    let text = report.to_string();
    assert!(text.contains("X ("));
    assert!(text.contains(") -> Y ("));
    assert!(text.contains(") -> X ("));
}

#[test]
fn pairwise_rotation_across_threads_reports_three_cycle() {
    let tracker = tracker(CycleCheck::NewEdges);
    let player = Arc::new(TrackedLock::with_tracker("Player", (), Arc::clone(&tracker)));
    let monster = Arc::new(TrackedLock::with_tracker("Monster", (), Arc::clone(&tracker)));
    let drop_table = Arc::new(TrackedLock::with_tracker("DropTable", (), Arc::clone(&tracker)));

    let orders = [
        (Arc::clone(&player), Arc::clone(&monster)),
        (Arc::clone(&monster), Arc::clone(&drop_table)),
        (Arc::clone(&drop_table), Arc::clone(&player)),
    ];
    for (first, second) in orders {
        thread::spawn(move || {
            let _a = first.lock();
            let _b = second.lock();
        })
        .join()
        .expect("unit should not panic");
    }

    assert_eq!(tracker.stats().cycles_detected, 1);
    let report = tracker.find_cycle().expect("cycle must exist");
    assert!(
        report
            .path()
            .is_rotation_of(&[player.id(), monster.id(), drop_table.id()])
    );
    let mut names = report.lock_names();
    names.sort_unstable();
    assert_eq!(names, vec!["DropTable", "Monster", "Player"]);
}

#[test]
fn nested_duplicate_acquires_once() {
    let tracker = tracker(CycleCheck::FullGraph);
    let lock = TrackedLock::with_tracker("TestStruct::mutex_1", 0u32, Arc::clone(&tracker));
    {
        let mut outer = lock.lock();
        let inner = lock.lock();
        assert!(outer.is_acquired());
        assert!(!inner.is_acquired());
        *outer.get_mut().expect("outer guard holds the data") += 1;
        drop(inner);
        *outer.get_mut().expect("outer guard still holds the data") += 1;
    }
    // Both guards are gone and the mutex is free again.
    let guard = lock.lock();
    assert!(guard.is_acquired());
    assert_eq!(guard.get().copied(), Some(2));
    drop(guard);

    let stats = tracker.stats();
    assert_eq!(stats.duplicate_rejections, 1);
    assert_eq!(stats.dependencies, 0);
    assert_eq!(stats.held_units, 0);
}

#[test]
fn static_order_sequence_records_expected_edges() {
    let tracker = tracker(CycleCheck::FullGraph);
    let t1 = TrackedLock::with_tracker("TestStruct::mutex_1", (), Arc::clone(&tracker));
    let t1_1 = TrackedLock::with_tracker("TestStruct::mutex_1", (), Arc::clone(&tracker));
    let t2 = TrackedLock::with_tracker("TestStruct::mutex_2", (), Arc::clone(&tracker));

    {
        let _g1 = t1.lock();
        let _g2 = t1_1.lock();
        let _g3 = t2.lock();
    }
    {
        let _g1 = t1.lock();
        let _g2 = t2.lock();
    }
    {
        let _g1 = t1.lock();
        let _g2 = t1_1.lock();
    }
    {
        let _g1 = t1_1.lock();
        let _g2 = t1_1.lock();
    }

    let stats = tracker.stats();
    assert_eq!(stats.dependencies, 3);
    assert_eq!(stats.cycles_detected, 0);
    assert_eq!(stats.duplicate_rejections, 1);
    assert!(tracker.held_by(UnitId::current()).is_empty());
}

#[test]
fn global_tracker_is_shared_by_default_locks() {
    let _guard = test_guard();
    let global = LockOrderTracker::global();
    assert!(Arc::ptr_eq(&global, &LockOrderTracker::global()));

    let a = TrackedLock::new("global-a", ());
    let b = TrackedLock::new("global-b", ());
    assert!(Arc::ptr_eq(a.tracker(), &global));
    {
        let _ga = a.lock();
        let _gb = b.lock();
        assert!(global.has_lock(a.id(), UnitId::current()));
    }
    assert!(
        global
            .edges()
            .iter()
            .any(|edge| edge.from == a.id() && edge.to == b.id())
    );
}
