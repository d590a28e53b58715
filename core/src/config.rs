//! Host configuration, loaded from TOML (§6 "Environment / CLI" — the core
//! itself takes no environment variables, but the example host binary does).

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_control_port() -> u16 {
    5004
}

fn default_sample_rate_hz() -> u32 {
    44_100
}

fn default_tick_batch() -> usize {
    16
}

fn default_send_batch() -> usize {
    8
}

fn default_resync_period_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub local_name: String,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_tick_batch")]
    pub tick_batch: usize,
    #[serde(default = "default_send_batch")]
    pub send_batch: usize,
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_optional_fields_absent() {
        let cfg = Config::from_toml_str("local_name = \"studio\"").unwrap();
        assert_eq!(cfg.control_port, 5004);
        assert_eq!(cfg.sample_rate_hz, 44_100);
        assert_eq!(cfg.tick_batch, 16);
        assert_eq!(cfg.send_batch, 8);
        assert_eq!(cfg.resync_period_secs, 10);
    }

    #[test]
    fn loads_overridden_fields() {
        let cfg = Config::from_toml_str(
            "local_name = \"studio\"\ncontrol_port = 6004\nsample_rate_hz = 48000",
        )
        .unwrap();
        assert_eq!(cfg.control_port, 6004);
        assert_eq!(cfg.sample_rate_hz, 48_000);
    }

    #[test]
    fn load_from_file_round_trip() {
        let mut file = tempfile_touch();
        writeln!(file.1, "local_name = \"studio\"").unwrap();
        let cfg = Config::load_from_file(file.0.to_str().unwrap()).unwrap();
        assert_eq!(cfg.local_name, "studio");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load_from_file("/nonexistent/path/to/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    fn tempfile_touch() -> (std::path::PathBuf, std::fs::File) {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rtp_midi_core_test_{:p}.toml", &dir));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
