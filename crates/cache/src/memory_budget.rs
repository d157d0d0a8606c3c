//! Memory budget for the thumbnail memory tier
//!
//! The budget is a fraction of currently available RAM, clamped to a fixed
//! range so small machines still cache a screenful of thumbnails and large
//! machines do not hoard memory. The application root detects it once and
//! hands it to the thumbnail service.

use sysinfo::System;

const MB: u64 = 1024 * 1024;

/// Lower bound for the thumbnail memory tier
pub const MIN_THUMBNAIL_BUDGET_BYTES: u64 = 16 * MB;

/// Upper bound for the thumbnail memory tier
pub const MAX_THUMBNAIL_BUDGET_BYTES: u64 = 512 * MB;

/// Assumed available memory when the platform reports none
const FALLBACK_AVAILABLE_BYTES: u64 = 1024 * MB;

/// Snapshot of system memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemMemory {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl SystemMemory {
    /// Read memory figures from the operating system
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let total_bytes = system.total_memory();
        let available_bytes = match system.available_memory() {
            0 => total_bytes,
            available => available,
        };

        Self { total_bytes, available_bytes }
    }
}

/// Byte budgets derived from system memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryBudget {
    memory: SystemMemory,
    thumbnail_fraction: f64,
    thumbnail_override: Option<u64>,
}

impl MemoryBudget {
    pub fn new(memory: SystemMemory, thumbnail_fraction: f64) -> Self {
        Self {
            memory,
            thumbnail_fraction: thumbnail_fraction.clamp(0.0, 1.0),
            thumbnail_override: None,
        }
    }

    /// Detect system memory and use the given fraction for thumbnails
    pub fn detect(thumbnail_fraction: f64) -> Self {
        Self::new(SystemMemory::detect(), thumbnail_fraction)
    }

    /// Budget derived from configuration: a fixed size wins over the fraction
    pub fn from_config(config: &crate::CacheConfig) -> Self {
        let budget = Self::detect(config.thumbnail_memory_fraction);
        match config.thumbnail_cache_bytes() {
            Some(bytes) => budget.with_thumbnail_override(bytes),
            None => budget,
        }
    }

    /// Use a fixed thumbnail budget regardless of system memory
    pub fn with_thumbnail_override(mut self, bytes: u64) -> Self {
        self.thumbnail_override = Some(bytes);
        self
    }

    pub fn system_memory(&self) -> SystemMemory {
        self.memory
    }

    /// Byte budget for the thumbnail memory tier
    pub fn thumbnail_budget(&self) -> u64 {
        if let Some(bytes) = self.thumbnail_override {
            return bytes;
        }

        let available = match self.memory.available_bytes {
            0 => FALLBACK_AVAILABLE_BYTES,
            available => available,
        };
        let proposed = (available as f64 * self.thumbnail_fraction) as u64;
        proposed.clamp(MIN_THUMBNAIL_BUDGET_BYTES, MAX_THUMBNAIL_BUDGET_BYTES)
    }
}
