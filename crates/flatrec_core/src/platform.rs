//! Host collaborators the engine depends on.
//!
//! The engine never reads the time, sleeps, or touches hardware lines
//! directly. Everything goes through the traits here, bundled in a
//! [`Platform`]. [`Platform::host`] wires the implementations suitable for
//! a desktop process; [`crate::sim`] provides deterministic doubles.

use flatrec_storage::{DateTime, TimeSource};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin. Never decreases.
    fn now_millis(&self) -> u64;

    /// Seconds since the Unix epoch.
    fn unix_seconds(&self) -> u64;

    /// Blocks for `duration`.
    fn delay(&self, duration: Duration);

    /// Current wall-clock time as calendar components.
    fn date_time(&self) -> DateTime {
        DateTime::from_unix(self.unix_seconds())
    }
}

/// Hardware watchdog.
pub trait Watchdog: Send {
    /// Resets the watchdog countdown.
    fn pat(&self);
}

/// Cooperative scheduler of the host application.
pub trait Scheduler: Send {
    /// Lets other subsystems run for a moment.
    fn yield_now(&self);
}

/// Power line feeding the storage device.
pub trait PowerControl: Send {
    /// Drives the line high (`true`) or low (`false`).
    fn set_power(&self, on: bool);
}

/// Out-of-band warning channel.
pub trait Telemetry: Send {
    /// Publishes a warning, blocking until it is handed off.
    ///
    /// `persist` asks the publisher to also store the warning locally;
    /// storage fault reports always pass `false`.
    fn publish_warning(&self, source: &str, message: &str, critical: bool, persist: bool);

    /// Monotonic time of the last network publish, if any.
    fn last_publish_millis(&self) -> Option<u64>;
}

/// The set of collaborators handed to a [`crate::FlatStore`].
pub struct Platform {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Watchdog patted before every sync.
    pub watchdog: Box<dyn Watchdog>,
    /// Scheduler serviced while waiting out the publish cooldown.
    pub scheduler: Box<dyn Scheduler>,
    /// Storage power line used for recovery.
    pub power: Box<dyn PowerControl>,
    /// Fault report sink.
    pub telemetry: Box<dyn Telemetry>,
}

impl Platform {
    /// Collaborators for a host process: system time, no watchdog, no
    /// power line, and telemetry routed to the log.
    #[must_use]
    pub fn host() -> Self {
        Self {
            clock: Arc::new(SystemClock::new()),
            watchdog: Box::new(NoWatchdog),
            scheduler: Box::new(ThreadYield),
            power: Box::new(NoPowerLine),
            telemetry: Box::new(LogTelemetry),
        }
    }

    /// Returns a time source for stamping files on the volume.
    #[must_use]
    pub fn time_source(&self) -> Box<dyn TimeSource> {
        Box::new(ClockTime(Arc::clone(&self.clock)))
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("now_millis", &self.clock.now_millis())
            .finish_non_exhaustive()
    }
}

/// Adapts a [`Clock`] to the volume's [`TimeSource`].
struct ClockTime(Arc<dyn Clock>);

impl TimeSource for ClockTime {
    fn now(&self) -> DateTime {
        self.0.date_time()
    }
}

/// Wall-clock time from the operating system.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose monotonic origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn unix_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }

    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A watchdog that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn pat(&self) {}
}

/// Yields the current OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadYield;

impl Scheduler for ThreadYield {
    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

/// A missing power line; switching is logged only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPowerLine;

impl PowerControl for NoPowerLine {
    fn set_power(&self, on: bool) {
        tracing::debug!(on, "storage power line not wired");
    }
}

/// Routes warnings to the `tracing` log. Never persists anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn publish_warning(&self, source: &str, message: &str, critical: bool, _persist: bool) {
        if critical {
            tracing::error!(source, "{message}");
        } else {
            tracing::warn!(source, "{message}");
        }
    }

    fn last_publish_millis(&self) -> Option<u64> {
        None
    }
}
