//! Engine configuration.

use crate::error::{CoreError, CoreResult};
use std::ops::Range;
use std::time::Duration;

/// Configuration for a [`crate::FlatStore`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of the shared scratch buffer in bytes.
    ///
    /// Bounds the largest entry that can be read whole and the largest
    /// tail that can be shifted by replace/insert/delete.
    pub scratch_capacity: usize,

    /// Whether every write is followed by a sync.
    pub auto_sync: bool,

    /// Byte sequence terminating each entry.
    pub entry_delimiter: Vec<u8>,

    /// Field separator within an entry. Informational; the engine never splits on it.
    pub field_delimiter: u8,

    /// Minimum quiet time after a network publish before a sync may run.
    pub publish_cooldown: Duration,

    /// Minimum interval between storage recovery attempts.
    pub recovery_cooldown: Duration,

    /// Delay after each edge of the power-cycle sequence.
    pub power_cycle_delay: Duration,

    /// Timestamps accepted as archive folder names.
    pub archive_stamp_range: Range<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scratch_capacity: 2048,
            auto_sync: true,
            entry_delimiter: b"\r\n".to_vec(),
            field_delimiter: b',',
            publish_cooldown: Duration::from_secs(1),
            recovery_cooldown: Duration::from_secs(60 * 60),
            power_cycle_delay: Duration::from_millis(500),
            archive_stamp_range: 1_300_000_000..2_220_000_000, // 2011 to 2040
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scratch buffer size.
    #[must_use]
    pub const fn scratch_capacity(mut self, bytes: usize) -> Self {
        self.scratch_capacity = bytes;
        self
    }

    /// Sets whether writes sync automatically.
    #[must_use]
    pub const fn auto_sync(mut self, value: bool) -> Self {
        self.auto_sync = value;
        self
    }

    /// Sets the entry delimiter.
    #[must_use]
    pub fn entry_delimiter(mut self, delimiter: &[u8]) -> Self {
        self.entry_delimiter = delimiter.to_vec();
        self
    }

    /// Sets the field delimiter.
    #[must_use]
    pub const fn field_delimiter(mut self, delimiter: u8) -> Self {
        self.field_delimiter = delimiter;
        self
    }

    /// Sets the post-publish cooldown.
    #[must_use]
    pub const fn publish_cooldown(mut self, cooldown: Duration) -> Self {
        self.publish_cooldown = cooldown;
        self
    }

    /// Sets the recovery cooldown.
    #[must_use]
    pub const fn recovery_cooldown(mut self, cooldown: Duration) -> Self {
        self.recovery_cooldown = cooldown;
        self
    }

    /// Sets the power-cycle delay.
    #[must_use]
    pub const fn power_cycle_delay(mut self, delay: Duration) -> Self {
        self.power_cycle_delay = delay;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the delimiter is empty or
    /// the scratch buffer cannot hold more than one delimiter.
    pub fn validate(&self) -> CoreResult<()> {
        if self.entry_delimiter.is_empty() {
            return Err(CoreError::invalid_argument("entry delimiter is empty"));
        }
        if self.scratch_capacity <= self.entry_delimiter.len() {
            return Err(CoreError::invalid_argument(format!(
                "scratch capacity {} must exceed delimiter length {}",
                self.scratch_capacity,
                self.entry_delimiter.len()
            )));
        }
        if self.archive_stamp_range.is_empty() {
            return Err(CoreError::invalid_argument("archive stamp range is empty"));
        }
        Ok(())
    }
}
