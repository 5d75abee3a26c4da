//! Engine configuration
//!
//! Everything the update engine needs to know about the device it runs on:
//! the pre-shared key, the currently running firmware version, and the
//! policy bounds applied to incoming manifests. Passed to the controller at
//! construction; persisted via [`ConfigPort`](crate::app::ports::ConfigPort).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;
use crate::fota::bitmap;

/// Maximum PSK length (64 hex characters for a 256-bit key).
pub const PSK_CAPACITY: usize = 64;

/// Maximum firmware version string length.
pub const VERSION_CAPACITY: usize = 32;

/// Largest firmware image accepted by default (4 MiB).
pub const DEFAULT_MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024;

/// Default chunk size bounds in bytes.
pub const DEFAULT_MIN_CHUNK_SIZE: u16 = 512;
pub const DEFAULT_MAX_CHUNK_SIZE: u16 = 4096;

/// Upper bound on `total_chunks`; equal to the reception bitmap capacity.
pub const MAX_TOTAL_CHUNKS: u16 = bitmap::CAPACITY;

/// Manifest acceptance bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLimits {
    /// Largest accepted image size in bytes
    pub max_firmware_size: u32,
    /// Smallest accepted chunk size in bytes
    pub min_chunk_size: u16,
    /// Largest accepted chunk size in bytes
    pub max_chunk_size: u16,
    /// Largest accepted chunk count (never above [`MAX_TOTAL_CHUNKS`])
    pub max_total_chunks: u16,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_firmware_size: DEFAULT_MAX_FIRMWARE_SIZE,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_total_chunks: MAX_TOTAL_CHUNKS,
        }
    }
}

impl PolicyLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_firmware_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_firmware_size must be > 0",
            ));
        }
        if self.min_chunk_size == 0 || self.min_chunk_size > self.max_chunk_size {
            return Err(ConfigError::ValidationFailed(
                "chunk size bounds must satisfy 0 < min <= max",
            ));
        }
        if self.max_total_chunks == 0 || self.max_total_chunks > MAX_TOTAL_CHUNKS {
            return Err(ConfigError::ValidationFailed(
                "max_total_chunks must be 1..=bitmap capacity",
            ));
        }
        Ok(())
    }
}

/// Update engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Security ---
    /// Pre-shared key used for every envelope and chunk MAC
    pub psk: heapless::String<PSK_CAPACITY>,

    // --- Identity ---
    /// Version string of the firmware currently running
    pub current_version: heapless::String<VERSION_CAPACITY>,

    // --- Policy ---
    pub limits: PolicyLimits,
    /// Assemble and validate as soon as the last chunk is stored
    pub auto_assemble: bool,

    // --- Timing ---
    /// Cloud polling interval while idle (milliseconds)
    pub poll_interval_ms: u32,
    /// Cloud polling interval while chunks are outstanding (milliseconds)
    pub fast_poll_interval_ms: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut current_version = heapless::String::new();
        let _ = current_version.push_str("1.0.0");
        Self {
            psk: heapless::String::new(),
            current_version,
            limits: PolicyLimits::default(),
            auto_assemble: true,
            poll_interval_ms: 30_000,    // 2/min
            fast_poll_interval_ms: 1000, // 1 Hz
        }
    }
}

impl EngineConfig {
    /// Build a config with default policy from a PSK and running version.
    pub fn new(psk: &str, current_version: &str) -> Result<Self, ConfigError> {
        let cfg = Self {
            psk: heapless::String::try_from(psk)
                .map_err(|_| ConfigError::ValidationFailed("psk longer than 64 characters"))?,
            current_version: heapless::String::try_from(current_version)
                .map_err(|_| ConfigError::ValidationFailed("current_version too long"))?,
            ..Self::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn with_limits(mut self, limits: PolicyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_auto_assemble(mut self, auto_assemble: bool) -> Self {
        self.auto_assemble = auto_assemble;
        self
    }

    pub fn psk_bytes(&self) -> &[u8] {
        self.psk.as_bytes()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.psk.is_empty() {
            return Err(ConfigError::ValidationFailed("psk must not be empty"));
        }
        if self.current_version.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "current_version must not be empty",
            ));
        }
        if self.fast_poll_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "poll intervals must be > 0",
            ));
        }
        self.limits.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_bitmap_capacity() {
        let l = PolicyLimits::default();
        assert_eq!(l.max_total_chunks, bitmap::CAPACITY);
        assert_eq!(l.max_firmware_size, 4 * 1024 * 1024);
        assert_eq!((l.min_chunk_size, l.max_chunk_size), (512, 4096));
        assert!(l.validate().is_ok());
    }

    #[test]
    fn default_config_needs_a_psk() {
        let c = EngineConfig::default();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn new_accepts_valid_inputs() {
        let c = EngineConfig::new("secret", "1.0.0").unwrap();
        assert_eq!(c.psk_bytes(), b"secret");
        assert_eq!(c.current_version.as_str(), "1.0.0");
        assert!(c.auto_assemble);
    }

    #[test]
    fn new_rejects_oversized_psk() {
        let psk = "k".repeat(PSK_CAPACITY + 1);
        assert!(EngineConfig::new(&psk, "1.0.0").is_err());
    }

    #[test]
    fn limits_above_bitmap_capacity_rejected() {
        let limits = PolicyLimits {
            max_total_chunks: MAX_TOTAL_CHUNKS + 1,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn inverted_chunk_bounds_rejected() {
        let limits = PolicyLimits {
            min_chunk_size: 4096,
            max_chunk_size: 512,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn fast_poll_is_faster() {
        let c = EngineConfig::default();
        assert!(c.fast_poll_interval_ms < c.poll_interval_ms);
    }

    #[test]
    fn serde_roundtrip() {
        let c = EngineConfig::new("k3y", "2.1.0").unwrap();
        let json = serde_json::to_string(&c).unwrap();
        let c2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = EngineConfig::new("k3y", "2.1.0")
            .unwrap()
            .with_auto_assemble(false);
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: EngineConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c, c2);
    }
}
