//! One unit that keeps pulsing and one that registers and then goes quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use lockgraph_watchdog::{HeartbeatWatchdog, WatchdogConfig};

pub const DEMO_INTERVAL: Duration = Duration::from_millis(200);

/// Runs both units for `duration` and returns how many stall warnings the
/// watchdog emitted.
pub fn run(config: WatchdogConfig, duration: Duration) -> Result<u64, String> {
    let interval = config.default_interval;
    let watchdog = Arc::new(HeartbeatWatchdog::new(config));
    watchdog.start().map_err(|e| e.to_string())?;

    let running = Arc::new(AtomicBool::new(true));

    let pulsing = {
        let watchdog = Arc::clone(&watchdog);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("heartbeat-pulsing".to_owned())
            .spawn(move || {
                let _registration = watchdog.register_current();
                while running.load(Ordering::Relaxed) {
                    watchdog.pulse_current(interval);
                    thread::sleep(interval / 2);
                }
            })
            .map_err(|e| format!("failed to spawn pulsing unit: {e}"))?
    };

    let silent = {
        let watchdog = Arc::clone(&watchdog);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("heartbeat-silent".to_owned())
            .spawn(move || {
                let registration = watchdog.register_current();
                tracing::info!(unit = %registration.unit(), "silent unit registered, never pulsing");
                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| format!("failed to spawn silent unit: {e}"))?
    };

    thread::sleep(duration);
    running.store(false, Ordering::Relaxed);
    for handle in [pulsing, silent] {
        handle
            .join()
            .map_err(|_| "heartbeat unit panicked".to_owned())?;
    }

    let stalls = watchdog.stalls_reported();
    watchdog.stop();
    Ok(stalls)
}
