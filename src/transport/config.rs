//! Process-level transport configuration (spec §6, "Process-level
//! configuration consumed at init") plus the listen address this crate
//! needs to actually open the acceptor's socket (SPEC_FULL.md's
//! AMBIENT STACK section).

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ceiling on `in_capsule_data_size`, mirroring the original's
/// `SPDK_NVMF_MAX_CAPSULE_DATA`-style clamp (SPEC_FULL.md "In-capsule data
/// cap derived from MTU-ish constant"). Chosen generously above common NVMe
/// block sizes while still bounding the per-slot RECV footprint.
pub const MAX_IN_CAPSULE_DATA_SIZE: u32 = 8192;

/// Backlog passed to `rdma_listen` (spec §4.F).
pub const ACCEPTOR_BACKLOG: i32 = 10;

/// Configuration loaded once at `transport_init` and held for the life of
/// the process. Nothing here is re-read per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Target-side ceiling on queue depth, further clamped per-connection
    /// against the local NIC and the peer's advertised depths (spec §4.F).
    pub max_queue_depth: u16,

    /// Target-side ceiling on concurrent RDMA Read/Write depth.
    pub max_rw_depth: u16,

    /// Largest single-command payload this transport will bounce through
    /// RDMA Read/Write.
    pub max_io_size: u32,

    /// Size of the in-capsule data region carried alongside each command
    /// capsule.
    pub in_capsule_data_size: u32,

    /// IPv4 address the acceptor's `rdma_cm_id` binds to.
    pub listen_addr: Ipv4Addr,

    /// Service port the acceptor listens on.
    pub listen_port: u16,
}

/// Failure to load or validate a [`TransportConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("in_capsule_data_size {0} exceeds the {1}-byte maximum")]
    InCapsuleDataSizeTooLarge(u32, u32),

    #[error("max_queue_depth must be positive")]
    ZeroQueueDepth,

    #[error("max_rw_depth must be positive")]
    ZeroRwDepth,

    #[error("failed to parse transport configuration")]
    Toml(#[from] toml::de::Error),
}

impl TransportConfig {
    /// Parse and validate a configuration from a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate the values that `transport_init` will otherwise discover are
    /// broken only much later, at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.in_capsule_data_size > MAX_IN_CAPSULE_DATA_SIZE {
            return Err(ConfigError::InCapsuleDataSizeTooLarge(
                self.in_capsule_data_size,
                MAX_IN_CAPSULE_DATA_SIZE,
            ));
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.max_rw_depth == 0 {
            return Err(ConfigError::ZeroRwDepth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> String {
        "max_queue_depth = 128\n\
         max_rw_depth = 32\n\
         max_io_size = 131072\n\
         in_capsule_data_size = 4096\n\
         listen_addr = \"0.0.0.0\"\n\
         listen_port = 4420\n"
            .to_owned()
    }

    #[test]
    fn parses_well_formed_config() {
        let cfg = TransportConfig::from_toml(&sample_toml()).unwrap();
        assert_eq!(cfg.max_queue_depth, 128);
        assert_eq!(cfg.listen_port, 4420);
    }

    #[test]
    fn rejects_oversized_in_capsule_data() {
        let mut text = sample_toml();
        text = text.replace("in_capsule_data_size = 4096", "in_capsule_data_size = 65536");
        assert!(matches!(
            TransportConfig::from_toml(&text),
            Err(ConfigError::InCapsuleDataSizeTooLarge(65536, MAX_IN_CAPSULE_DATA_SIZE))
        ));
    }

    #[test]
    fn rejects_zero_queue_depth() {
        let mut text = sample_toml();
        text = text.replace("max_queue_depth = 128", "max_queue_depth = 0");
        assert!(matches!(
            TransportConfig::from_toml(&text),
            Err(ConfigError::ZeroQueueDepth)
        ));
    }
}
