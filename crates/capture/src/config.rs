//! Capture session configuration
//!
//! Can be built in code or loaded from a TOML file:
//!
//! ```toml
//! # Maximum distinct branches per session (default: 33554432 = 2^25)
//! branch_capacity = 33554432
//! # Maximum loaded images per session (default: 1024)
//! image_capacity = 1024
//! # Entries buffered before each compressor drain (default: 16384)
//! buffer_entries = 16384
//! # zstd level, 0 selects zstd's default (default: 0)
//! compression_level = 0
//! ```

use brtrace_core::MAX_BRANCHES;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Capture session configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Maximum number of distinct branches (default: 2^25).
    ///
    /// Exceeding it aborts the session.
    pub branch_capacity: u64,

    /// Maximum number of loaded images (default: 1024).
    pub image_capacity: usize,

    /// Entries held in memory between compressor drains (default: 16384).
    pub buffer_entries: usize,

    /// zstd compression level (default: 0, zstd's own default).
    pub compression_level: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            branch_capacity: 1 << 25,
            image_capacity: 1024,
            buffer_entries: 16384,
            compression_level: 0,
        }
    }
}

impl CaptureConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set branch capacity (builder pattern).
    pub fn with_branch_capacity(mut self, capacity: u64) -> Self {
        self.branch_capacity = capacity;
        self
    }

    /// Set image capacity (builder pattern).
    pub fn with_image_capacity(mut self, capacity: usize) -> Self {
        self.image_capacity = capacity;
        self
    }

    /// Set entry buffer length (builder pattern).
    pub fn with_buffer_entries(mut self, entries: usize) -> Self {
        self.buffer_entries = entries;
        self
    }

    /// Set compression level (builder pattern).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.branch_capacity == 0 {
            return Err(ConfigError::ZeroBranchCapacity);
        }
        if self.branch_capacity > MAX_BRANCHES {
            return Err(ConfigError::BranchCapacityTooLarge {
                requested: self.branch_capacity,
                max: MAX_BRANCHES,
            });
        }
        if self.image_capacity == 0 {
            return Err(ConfigError::ZeroImageCapacity);
        }
        if self.buffer_entries == 0 {
            return Err(ConfigError::ZeroBufferEntries);
        }
        let levels = zstd::compression_level_range();
        if !levels.contains(&self.compression_level) {
            return Err(ConfigError::InvalidCompressionLevel {
                level: self.compression_level,
                min: *levels.start(),
                max: *levels.end(),
            });
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (tiny buffers and tables).
    pub fn for_testing() -> Self {
        CaptureConfig {
            branch_capacity: 1024,
            image_capacity: 16,
            buffer_entries: 64,
            compression_level: 1,
        }
    }

    /// Read and parse config from a TOML file.
    ///
    /// Missing keys take their default values. The result is validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: CaptureConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Capture configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Branch capacity is zero.
    #[error("Branch capacity must be at least 1")]
    ZeroBranchCapacity,

    /// Branch capacity exceeds what an entry can address.
    #[error("Branch capacity {requested} exceeds the entry encoding limit of {max}")]
    BranchCapacityTooLarge {
        /// Requested capacity
        requested: u64,
        /// Encoding limit
        max: u64,
    },

    /// Image capacity is zero.
    #[error("Image capacity must be at least 1")]
    ZeroImageCapacity,

    /// Entry buffer length is zero.
    #[error("Entry buffer must hold at least 1 entry")]
    ZeroBufferEntries,

    /// Compression level outside zstd's range.
    #[error("Compression level {level} outside supported range {min}..={max}")]
    InvalidCompressionLevel {
        /// Requested level
        level: i32,
        /// Lowest supported level
        min: i32,
        /// Highest supported level
        max: i32,
    },

    /// Config file could not be read.
    #[error("Failed to read config file '{path}': {reason}")]
    Read {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Config file could not be parsed.
    #[error("Failed to parse config file '{path}': {reason}")]
    Parse {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },
}
