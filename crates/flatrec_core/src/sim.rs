//! Deterministic platform doubles.
//!
//! Each double is cheaply cloneable and shares its state between clones,
//! so a test keeps one copy for inspection while the engine owns another.

use crate::platform::{Clock, PowerControl, Scheduler, Telemetry, Watchdog};
use crate::Platform;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A clock that only moves when told to.
///
/// [`Clock::delay`] advances the clock instead of blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
    unix_origin: u64,
}

impl ManualClock {
    /// Creates a clock at monotonic time 0 whose wall clock starts at `unix_origin`.
    #[must_use]
    pub fn new(unix_origin: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(0)),
            unix_origin,
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sets the monotonic time.
    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }

    fn unix_seconds(&self) -> u64 {
        self.unix_origin + self.now_millis() / 1000
    }

    fn delay(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// A scheduler that advances a [`ManualClock`] on every yield.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    step: Duration,
    yields: Arc<AtomicU32>,
}

impl ManualScheduler {
    /// Creates a scheduler that moves `clock` forward by `step` per yield.
    #[must_use]
    pub fn new(clock: ManualClock, step: Duration) -> Self {
        Self {
            clock,
            step,
            yields: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Number of yields so far.
    #[must_use]
    pub fn yields(&self) -> u32 {
        self.yields.load(Ordering::SeqCst)
    }
}

impl Scheduler for ManualScheduler {
    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
        self.clock.advance(self.step);
    }
}

/// Records every power line transition with its timestamp.
#[derive(Debug, Clone)]
pub struct RecordingPower {
    clock: ManualClock,
    events: Arc<Mutex<Vec<(u64, bool)>>>,
}

impl RecordingPower {
    /// Creates a recorder stamping transitions with `clock`.
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every `(millis, on)` transition so far.
    #[must_use]
    pub fn events(&self) -> Vec<(u64, bool)> {
        self.events.lock().clone()
    }

    /// Number of complete off/on cycles.
    #[must_use]
    pub fn cycles(&self) -> usize {
        self.events.lock().iter().filter(|(_, on)| *on).count()
    }
}

impl PowerControl for RecordingPower {
    fn set_power(&self, on: bool) {
        self.events.lock().push((self.clock.now_millis(), on));
    }
}

/// A warning captured by [`RecordingTelemetry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Reporting subsystem.
    pub source: String,
    /// Payload.
    pub message: String,
    /// Severity flag.
    pub critical: bool,
    /// Whether the publisher was asked to store it.
    pub persist: bool,
}

#[derive(Debug, Default)]
struct TelemetryState {
    warnings: Vec<Warning>,
    last_publish: Option<u64>,
}

/// Captures warnings and lets tests fake a recent publish.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    state: Arc<Mutex<TelemetryState>>,
}

impl RecordingTelemetry {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every warning published so far.
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        self.state.lock().warnings.clone()
    }

    /// Pretends a network publish happened at `millis`.
    pub fn set_last_publish(&self, millis: u64) {
        self.state.lock().last_publish = Some(millis);
    }
}

impl Telemetry for RecordingTelemetry {
    fn publish_warning(&self, source: &str, message: &str, critical: bool, persist: bool) {
        self.state.lock().warnings.push(Warning {
            source: source.to_string(),
            message: message.to_string(),
            critical,
            persist,
        });
    }

    fn last_publish_millis(&self) -> Option<u64> {
        self.state.lock().last_publish
    }
}

/// Counts watchdog pats.
#[derive(Debug, Clone, Default)]
pub struct CountingWatchdog {
    pats: Arc<AtomicU32>,
}

impl CountingWatchdog {
    /// Creates a watchdog with no pats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pats so far.
    #[must_use]
    pub fn pats(&self) -> u32 {
        self.pats.load(Ordering::SeqCst)
    }
}

impl Watchdog for CountingWatchdog {
    fn pat(&self) {
        self.pats.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handles to a full set of doubles sharing one [`ManualClock`].
#[derive(Debug, Clone)]
pub struct SimPlatform {
    /// The shared clock.
    pub clock: ManualClock,
    /// The scheduler; each yield advances the clock by 10 ms.
    pub scheduler: ManualScheduler,
    /// The power line recorder.
    pub power: RecordingPower,
    /// The telemetry recorder.
    pub telemetry: RecordingTelemetry,
    /// The watchdog counter.
    pub watchdog: CountingWatchdog,
}

impl SimPlatform {
    /// Creates doubles whose wall clock starts at `unix_origin`.
    #[must_use]
    pub fn new(unix_origin: u64) -> Self {
        let clock = ManualClock::new(unix_origin);
        Self {
            scheduler: ManualScheduler::new(clock.clone(), Duration::from_millis(10)),
            power: RecordingPower::new(clock.clone()),
            telemetry: RecordingTelemetry::new(),
            watchdog: CountingWatchdog::new(),
            clock,
        }
    }

    /// Builds a [`Platform`] backed by clones of these doubles.
    #[must_use]
    pub fn platform(&self) -> Platform {
        Platform {
            clock: Arc::new(self.clock.clone()),
            watchdog: Box::new(self.watchdog.clone()),
            scheduler: Box::new(self.scheduler.clone()),
            power: Box::new(self.power.clone()),
            telemetry: Box::new(self.telemetry.clone()),
        }
    }
}
