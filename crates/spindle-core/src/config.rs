//! Scheduler configuration.
//!
//! Every field has a default, so a config file only needs the fields it
//! changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::SpindleError;
use crate::wire::DEFAULT_MAX_FRAME_SIZE;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/spindle-scheduler.sock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Unix socket the scheduler listens on.
    pub socket_path: PathBuf,

    /// Largest frame accepted or sent, in bytes.
    pub max_frame_size: usize,

    /// Per-connection outbound message buffer.
    pub outbound_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_capacity: 32,
        }
    }
}

impl SchedulerConfig {
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, SpindleError> {
        let config: Self = serde_json::from_str(s).map_err(|e| SpindleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SpindleError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| SpindleError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&s)
    }

    pub fn validate(&self) -> Result<(), SpindleError> {
        if self.outbound_capacity == 0 {
            return Err(SpindleError::Config("outbound_capacity must be > 0".into()));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(SpindleError::Config(format!(
                "max_frame_size must be in 1..={}",
                u32::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_reasonable() {
        let c = SchedulerConfig::default();
        assert_eq!(c.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(c.outbound_capacity, 32);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = SchedulerConfig::from_json_str(r#"{ "socket_path": "/tmp/x.sock" }"#).unwrap();
        assert_eq!(c.socket_path, PathBuf::from("/tmp/x.sock"));
        assert_eq!(c.outbound_capacity, 32);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = SchedulerConfig::from_json_str(r#"{ "outbound_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, SpindleError::Config(_)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            SchedulerConfig::from_json_str("{"),
            Err(SpindleError::Config(_))
        ));
    }
}
