//! Heartbeat watchdog.
//!
//! Long-running units register themselves and periodically call
//! [`HeartbeatWatchdog::pulse`] with the window in which they expect to check
//! in again. A background thread wakes every check interval and logs every
//! unit whose deadline has passed by more than
//! [`WatchdogConfig::stall_threshold`]. It never touches the stalled unit.
//!
//! The watchdog shares nothing with the lock-order tracker; the two never
//! block on each other.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

pub use lockgraph_types::UnitId;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(60_000);
pub const DEFAULT_STALL_MULTIPLIER: u32 = 2;
/// Shortest check interval the loop will sleep for.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(1);
pub const ENV_WATCHDOG_INTERVAL_MS: &str = "LOCKGRAPH_WATCHDOG_INTERVAL_MS";
pub const ENV_WATCHDOG_STALL_MULTIPLIER: &str = "LOCKGRAPH_WATCHDOG_STALL_MULTIPLIER";

#[derive(Debug)]
pub enum WatchdogError {
    Spawn(std::io::Error),
    InvalidConfig {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl fmt::Display for WatchdogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to spawn watchdog thread: {err}"),
            Self::InvalidConfig {
                key,
                value,
                expected,
            } => write!(f, "invalid {key}={value:?}, expected {expected}"),
        }
    }
}

impl Error for WatchdogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            Self::InvalidConfig { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    /// Check interval the loop starts with and returns to on `stop`. Also the
    /// base of the stall threshold.
    pub default_interval: Duration,
    pub stall_multiplier: u32,
    pub thread_name: String,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_CHECK_INTERVAL,
            stall_multiplier: DEFAULT_STALL_MULTIPLIER,
            thread_name: "lockgraph-watchdog".to_owned(),
        }
    }
}

impl WatchdogConfig {
    pub fn from_env() -> Result<Self, WatchdogError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WatchdogError> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_WATCHDOG_INTERVAL_MS) {
            let ms = parse_positive(ENV_WATCHDOG_INTERVAL_MS, &value)?;
            config.default_interval = Duration::from_millis(ms);
        }
        if let Some(value) = lookup(ENV_WATCHDOG_STALL_MULTIPLIER) {
            let multiplier = parse_positive(ENV_WATCHDOG_STALL_MULTIPLIER, &value)?;
            config.stall_multiplier =
                u32::try_from(multiplier).map_err(|_| WatchdogError::InvalidConfig {
                    key: ENV_WATCHDOG_STALL_MULTIPLIER,
                    value: value.clone(),
                    expected: "a positive 32-bit integer",
                })?;
        }
        Ok(config)
    }

    /// How far past its deadline a unit may fall before it is reported.
    pub fn stall_threshold(&self) -> Duration {
        self.default_interval.saturating_mul(self.stall_multiplier)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, WatchdogError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(WatchdogError::InvalidConfig {
            key,
            value: value.to_owned(),
            expected: "a positive integer",
        }),
    }
}

/// A unit found past its deadline by more than the stall threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallReport {
    pub unit: UnitId,
    /// Time elapsed since the unit's deadline.
    pub overdue: Duration,
}

struct Shared {
    config: WatchdogConfig,
    /// unit -> "reported good through" deadline
    registry: Mutex<HashMap<UnitId, Instant>>,
    check_interval_ms: AtomicU64,
    stop: Mutex<bool>,
    wake: Condvar,
    sweeps: AtomicU64,
    stalls_reported: AtomicU64,
}

impl Shared {
    fn default_interval_ms(&self) -> u64 {
        interval_ms(self.config.default_interval)
    }

    fn sweep(&self, now: Instant) -> Vec<StallReport> {
        let snapshot: Vec<(UnitId, Instant)> = self
            .registry
            .lock()
            .iter()
            .map(|(&unit, &deadline)| (unit, deadline))
            .collect();

        let threshold = self.config.stall_threshold();
        let mut stalls: Vec<StallReport> = snapshot
            .into_iter()
            .filter_map(|(unit, deadline)| {
                let overdue = now.checked_duration_since(deadline)?;
                (overdue > threshold).then_some(StallReport { unit, overdue })
            })
            .collect();
        stalls.sort_by_key(|stall| stall.unit);
        stalls
    }

    fn run(&self) {
        tracing::debug!(
            interval_ms = self.check_interval_ms.load(Ordering::Relaxed),
            "watchdog loop started"
        );
        loop {
            let stalls = self.sweep(Instant::now());
            for stall in &stalls {
                tracing::warn!(
                    target: "lockgraph::watchdog",
                    unit = %stall.unit,
                    overdue_ms = stall.overdue.as_millis() as u64,
                    "suspected stall: unit {} missed its heartbeat",
                    stall.unit
                );
            }
            self.stalls_reported
                .fetch_add(stalls.len() as u64, Ordering::Relaxed);
            self.sweeps.fetch_add(1, Ordering::Relaxed);

            // Read once per iteration: a new interval applies from the next sleep.
            let interval = Duration::from_millis(self.check_interval_ms.load(Ordering::Relaxed));
            let mut stopped = self.stop.lock();
            if !*stopped {
                self.wake
                    .wait_while_for(&mut stopped, |stopped| !*stopped, interval);
            }
            if *stopped {
                break;
            }
        }
        tracing::debug!("watchdog loop stopped");
    }
}

fn interval_ms(interval: Duration) -> u64 {
    u64::try_from(interval.max(MIN_CHECK_INTERVAL).as_millis()).unwrap_or(u64::MAX)
}

/// `now + window`, or the latest representable instant short of it.
fn saturating_deadline(now: Instant, window: Duration) -> Instant {
    let mut window = window;
    loop {
        if let Some(deadline) = now.checked_add(window) {
            return deadline;
        }
        window /= 2;
    }
}

pub struct HeartbeatWatchdog {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for HeartbeatWatchdog {
    fn default() -> Self {
        Self::new(WatchdogConfig::default())
    }
}

impl fmt::Debug for HeartbeatWatchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatWatchdog")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .field("units", &self.shared.registry.lock().len())
            .finish()
    }
}

impl HeartbeatWatchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        let shared = Shared {
            check_interval_ms: AtomicU64::new(0),
            config,
            registry: Mutex::new(HashMap::new()),
            stop: Mutex::new(false),
            wake: Condvar::new(),
            sweeps: AtomicU64::new(0),
            stalls_reported: AtomicU64::new(0),
        };
        shared
            .check_interval_ms
            .store(shared.default_interval_ms(), Ordering::Relaxed);
        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.shared.config
    }

    /// Spawns the background loop unless it is already running.
    pub fn start(&self) -> Result<(), WatchdogError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        *self.shared.stop.lock() = false;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(self.shared.config.thread_name.clone())
            .spawn(move || shared.run())
            .map_err(WatchdogError::Spawn)?;
        *worker = Some(handle);
        Ok(())
    }

    /// Signals the loop, waits for it to exit, forgets every registered unit
    /// and restores the default check interval. No-op if not running.
    pub fn stop(&self) {
        // Held until the reset below so a concurrent `start` cannot spawn a
        // loop that this call then signals or clears under.
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };
        {
            let mut stopped = self.shared.stop.lock();
            *stopped = true;
            self.shared.wake.notify_all();
        }
        if handle.join().is_err() {
            tracing::warn!("watchdog thread panicked");
        }
        self.shared.registry.lock().clear();
        self.shared
            .check_interval_ms
            .store(self.shared.default_interval_ms(), Ordering::Relaxed);
        drop(worker);
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Takes effect from the loop's next iteration; a sleep already in
    /// progress is not shortened. Intervals below [`MIN_CHECK_INTERVAL`] are
    /// raised to it.
    pub fn set_check_interval(&self, interval: Duration) {
        self.shared
            .check_interval_ms
            .store(interval_ms(interval), Ordering::Relaxed);
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.shared.check_interval_ms.load(Ordering::Relaxed))
    }

    /// Starts watching `unit` with a deadline of now.
    pub fn register_unit(&self, unit: UnitId) {
        self.shared.registry.lock().insert(unit, Instant::now());
    }

    pub fn deregister_unit(&self, unit: UnitId) {
        self.shared.registry.lock().remove(&unit);
    }

    /// `unit` is alive and expects to pulse again within `expected`. A
    /// window past the end of the clock saturates instead of failing.
    pub fn pulse(&self, unit: UnitId, expected: Duration) {
        let deadline = saturating_deadline(Instant::now(), expected);
        self.shared.registry.lock().insert(unit, deadline);
    }

    pub fn register_current(&self) -> UnitRegistration {
        let unit = UnitId::current();
        self.register_unit(unit);
        UnitRegistration {
            shared: Arc::clone(&self.shared),
            unit,
        }
    }

    pub fn pulse_current(&self, expected: Duration) {
        self.pulse(UnitId::current(), expected);
    }

    pub fn deadline(&self, unit: UnitId) -> Option<Instant> {
        self.shared.registry.lock().get(&unit).copied()
    }

    pub fn registered_units(&self) -> Vec<UnitId> {
        let mut units: Vec<UnitId> = self.shared.registry.lock().keys().copied().collect();
        units.sort_unstable();
        units
    }

    /// The check the background loop runs each iteration, evaluated at `now`.
    pub fn sweep(&self, now: Instant) -> Vec<StallReport> {
        self.shared.sweep(now)
    }

    /// Loop iterations completed since construction.
    pub fn sweeps(&self) -> u64 {
        self.shared.sweeps.load(Ordering::Relaxed)
    }

    /// Stall warnings emitted since construction.
    pub fn stalls_reported(&self) -> u64 {
        self.shared.stalls_reported.load(Ordering::Relaxed)
    }
}

impl Drop for HeartbeatWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Deregisters its unit when dropped.
pub struct UnitRegistration {
    shared: Arc<Shared>,
    unit: UnitId,
}

impl UnitRegistration {
    pub fn unit(&self) -> UnitId {
        self.unit
    }
}

impl Drop for UnitRegistration {
    fn drop(&mut self) {
        self.shared.registry.lock().remove(&self.unit);
    }
}
