use serde::{Deserialize, Serialize};

use crate::types::{Result, SombraError};

/// Largest supported block fan-out.
pub const MAX_BLOCK_FAN_OUT: usize = 4096;

/// Configuration for a [`super::PageTranslationTable`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PttOptions {
    /// Page slots per block. Power of two.
    pub block_fan_out: usize,
    /// Overflow chunks allocated for the whole table.
    pub overflow_pool_capacity: usize,
    /// Live versions on one page that trigger a warning on publish; 0 disables.
    pub warn_versions_per_page: usize,
}

impl Default for PttOptions {
    fn default() -> Self {
        Self {
            block_fan_out: 32,
            overflow_pool_capacity: 1024,
            warn_versions_per_page: 256,
        }
    }
}

impl PttOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of page slots per block.
    pub fn block_fan_out(mut self, fan_out: usize) -> Self {
        self.block_fan_out = fan_out;
        self
    }

    /// Sets the overflow pool capacity in chunks.
    pub fn overflow_pool_capacity(mut self, chunks: usize) -> Self {
        self.overflow_pool_capacity = chunks;
        self
    }

    /// Sets the hot page warning threshold.
    pub fn warn_versions_per_page(mut self, versions: usize) -> Self {
        self.warn_versions_per_page = versions;
        self
    }

    /// Checks that the options describe a usable table.
    pub fn validate(&self) -> Result<()> {
        if !self.block_fan_out.is_power_of_two() || self.block_fan_out > MAX_BLOCK_FAN_OUT {
            return Err(SombraError::Invalid(
                "block_fan_out must be a power of two no larger than 4096",
            ));
        }
        if self.overflow_pool_capacity == 0 {
            return Err(SombraError::Invalid("overflow_pool_capacity must be at least 1"));
        }
        if self.overflow_pool_capacity >= u32::MAX as usize {
            return Err(SombraError::Invalid("overflow_pool_capacity is too large"));
        }
        Ok(())
    }
}
