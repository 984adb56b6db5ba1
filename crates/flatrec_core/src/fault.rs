//! Storage fault detection and recovery.
//!
//! Any failing I/O primitive marks the device unhealthy. From then on the
//! engine refuses work until a recovery attempt succeeds. Attempts are
//! throttled: at most one per cooldown window, except that the first
//! attempt after a healthy period runs immediately.
//!
//! A recovery attempt power-cycles the device (off, delay, on, delay),
//! re-runs device initialization, and treats a non-zero free space answer
//! as healthy. Every attempt is reported to telemetry with `persist` off,
//! so a report can never itself touch the faulty device.

use crate::platform::Platform;
use flatrec_storage::{DeviceStatus, Volume};
use std::time::Duration;
use tracing::{info, warn};

/// Where the monitor is in its fault/recovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// The device is initialized and accepting I/O.
    Healthy,
    /// A fault was seen (or the device was never initialized) and no attempt has run yet.
    FaultDetected,
    /// The last recovery attempt failed; the next one waits for the cooldown.
    RecoveryCooldown,
    /// A recovery attempt is in progress.
    Recovering,
}

/// Diagnostic payload sent to telemetry after each recovery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultReport {
    /// File that was open when the fault occurred, or `"none"`.
    pub file: String,
    /// Device error codes captured before the power cycle.
    pub status: DeviceStatus,
    /// Whether the device came back.
    pub recovered: bool,
}

impl FaultReport {
    /// Telemetry source tag for storage reports.
    pub const SOURCE: &'static str = "storage";

    /// Renders the report as the flat key/value payload telemetry expects.
    #[must_use]
    pub fn payload(&self) -> String {
        format!(
            "\"DESC\":\"SD ERROR\",\"FILE\":\"{}\",\"ERROR_CODE\":0X{:02X},\"ERROR_DATA\":0X{:02X},\"RECOVERED\":\"{}\"",
            self.file,
            self.status.error_code,
            self.status.error_data,
            if self.recovered { "TRUE" } else { "FALSE" }
        )
    }
}

/// Tracks device health and runs throttled recovery.
#[derive(Debug)]
pub struct FaultMonitor {
    state: HealthState,
    last_attempt: Option<u64>,
    cooldown: Duration,
    power_cycle_delay: Duration,
    attempts: u32,
}

impl FaultMonitor {
    /// Creates a monitor for a device that has not been initialized yet.
    #[must_use]
    pub fn new(cooldown: Duration, power_cycle_delay: Duration) -> Self {
        Self {
            state: HealthState::FaultDetected,
            last_attempt: None,
            cooldown,
            power_cycle_delay,
            attempts: 0,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Returns true if the engine may perform I/O.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }

    /// Returns the number of recovery attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Monotonic time of the last unsuccessful attempt's start, if one is pending.
    #[must_use]
    pub fn last_attempt(&self) -> Option<u64> {
        self.last_attempt
    }

    /// Marks the device healthy after a successful initialization.
    pub fn mark_healthy(&mut self) {
        self.state = HealthState::Healthy;
        self.last_attempt = None;
    }

    /// Returns true if a recovery attempt may run at `now_millis`.
    #[must_use]
    pub fn recovery_due(&self, now_millis: u64) -> bool {
        self.last_attempt.map_or(true, |at| {
            now_millis.saturating_sub(at) > self.cooldown.as_millis() as u64
        })
    }

    /// Records an I/O fault and attempts recovery if one is due.
    pub fn on_fault(&mut self, volume: &mut dyn Volume, platform: &Platform, file: &str) {
        warn!(file, "storage fault detected");
        self.state = HealthState::FaultDetected;
        if self.recovery_due(platform.clock.now_millis()) {
            self.recover(volume, platform, file);
        } else {
            self.state = HealthState::RecoveryCooldown;
        }
    }

    /// Decides whether an engine call may proceed.
    ///
    /// Healthy devices pass. Unhealthy devices get exactly one recovery
    /// attempt if the cooldown allows it; otherwise the call is refused
    /// without any I/O.
    pub fn admit(&mut self, volume: &mut dyn Volume, platform: &Platform, file: &str) -> bool {
        if self.is_healthy() {
            return true;
        }
        if self.recovery_due(platform.clock.now_millis()) {
            return self.recover(volume, platform, file);
        }
        false
    }

    /// Runs one recovery attempt and reports it. Returns true if the device came back.
    pub fn recover(&mut self, volume: &mut dyn Volume, platform: &Platform, file: &str) -> bool {
        self.state = HealthState::Recovering;
        self.attempts += 1;
        self.last_attempt = Some(platform.clock.now_millis());

        let status = volume.status();
        warn!(
            file,
            error_code = status.error_code,
            error_data = status.error_data,
            "attempting storage recovery through power cycle"
        );
        platform.power.set_power(false);
        platform.clock.delay(self.power_cycle_delay);
        platform.power.set_power(true);
        platform.clock.delay(self.power_cycle_delay);

        let recovered = match volume.init() {
            Ok(()) => volume.free_space().map_or(false, |free| free > 0),
            Err(err) => {
                warn!(error = %err, "storage init failed");
                false
            }
        };

        if recovered {
            info!("recovered from storage fault");
            self.mark_healthy();
        } else {
            warn!("storage recovery failed");
            self.state = HealthState::RecoveryCooldown;
        }

        let report = FaultReport {
            file: file.to_string(),
            status,
            recovered,
        };
        platform
            .telemetry
            .publish_warning(FaultReport::SOURCE, &report.payload(), false, false);

        recovered
    }
}
