//! Join configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinConfig {
    /// Memory budget for the right-side window, in frames. Must be at least 1.
    pub memory_frames: usize,

    /// Frame size in bytes (capacity of every input, pooled, spilled and output frame).
    pub frame_size: usize,

    /// Partition this join instance runs for; used in run-file names and logs.
    pub partition: u64,

    /// Directory for run files.
    pub spill_dir: String,

    /// Compression for run-file frames: "none", "zstd" or "lz4".
    pub spill_codec: String,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            memory_frames: 32,
            frame_size: 32 * 1024, // 32 KiB
            partition: 0,
            spill_dir: "/tmp/spilljoin-spill".to_string(),
            spill_codec: "none".to_string(),
        }
    }
}

impl JoinConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `SPILLJOIN_MEMORY_FRAMES`: window budget in frames
    /// - `SPILLJOIN_FRAME_SIZE`: frame size in bytes
    /// - `SPILLJOIN_PARTITION`: partition id
    /// - `SPILLJOIN_SPILL_DIR`: run-file directory
    /// - `SPILLJOIN_SPILL_CODEC`: run-file compression
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("SPILLJOIN_MEMORY_FRAMES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.memory_frames = v;
            }
        }

        if let Ok(s) = std::env::var("SPILLJOIN_FRAME_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.frame_size = v;
            }
        }

        if let Ok(s) = std::env::var("SPILLJOIN_PARTITION") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.partition = v;
            }
        }

        if let Ok(s) = std::env::var("SPILLJOIN_SPILL_DIR") {
            cfg.spill_dir = s;
        }

        if let Ok(s) = std::env::var("SPILLJOIN_SPILL_CODEC") {
            cfg.spill_codec = s;
        }

        cfg
    }

    /// Reject budgets the join cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.memory_frames < 1 {
            return Err(Error::Config(format!(
                "merge join does not have enough memory (needs > 0 frames, got {})",
                self.memory_frames
            )));
        }
        if self.frame_size == 0 {
            return Err(Error::Config("frame_size must be > 0".into()));
        }
        Ok(())
    }

    /// Hard cap of the right-side window in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.memory_frames.saturating_mul(self.frame_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = JoinConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.memory_bytes(), 32 * 32 * 1024);
    }

    #[test]
    fn zero_frames_is_a_config_error() {
        let cfg = JoinConfig {
            memory_frames: 0,
            ..JoinConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn serde_roundtrip_keeps_fields() {
        let cfg = JoinConfig {
            memory_frames: 2,
            spill_codec: "lz4".into(),
            ..JoinConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: JoinConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
