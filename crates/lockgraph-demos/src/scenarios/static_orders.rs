//! Nested guards over two locks of one kind and one of another, ending with a
//! nested re-acquisition of the same lock on one thread.

use std::sync::Arc;

use lockgraph::{LockOrderTracker, TrackedLock};

struct Primary {
    mutex: TrackedLock<()>,
}

struct Secondary {
    mutex: TrackedLock<()>,
}

pub fn run(tracker: &Arc<LockOrderTracker>) {
    let t1 = Primary {
        mutex: TrackedLock::with_tracker("TestStruct::mutex_1", (), Arc::clone(tracker)),
    };
    let t1_1 = Primary {
        mutex: TrackedLock::with_tracker("TestStruct::mutex_1", (), Arc::clone(tracker)),
    };
    let t2 = Secondary {
        mutex: TrackedLock::with_tracker("TestStruct::mutex_2", (), Arc::clone(tracker)),
    };

    {
        let _g1 = t1.mutex.lock();
        let _g2 = t1_1.mutex.lock();
        let _g3 = t2.mutex.lock();
    }

    {
        let _g1 = t1.mutex.lock();
        let _g2 = t2.mutex.lock();
    }

    {
        let _g1 = t1.mutex.lock();
        let _g2 = t1_1.mutex.lock();
    }

    {
        let _g1 = t1_1.mutex.lock();
        let _g2 = t1_1.mutex.lock();
    }
}
