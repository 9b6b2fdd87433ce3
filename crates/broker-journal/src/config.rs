// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Journal directory and timed-buffer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::rotation::RotationPolicy;

/// Default coalescing buffer size: flush once this many bytes are queued.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default flush timeout: flush this long after the first queued write if
/// the buffer never fills.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// How long `stop` waits for the write executor to drain before logging an
/// overrun and returning anyway.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default journal file extension.
pub const DEFAULT_EXTENSION: &str = "journal";

/// Errors loading a [`JournalConfig`] from a TOML file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// On-disk representation of a [`JournalConfig`], deserialized from TOML.
/// `Duration` has no native TOML representation, so the file format spells
/// out millisecond/second fields explicitly rather than relying on a serde
/// shim for `Duration` itself.
#[derive(Debug, Deserialize)]
struct JournalConfigFile {
    directory: PathBuf,
    #[serde(default = "default_buffer_size")]
    buffer_size: usize,
    #[serde(default = "default_flush_timeout_ms")]
    flush_timeout_ms: u64,
    #[serde(default = "default_stop_timeout_secs")]
    stop_timeout_secs: u64,
    #[serde(default)]
    log_rates: bool,
    #[serde(default = "default_extension")]
    extension: String,
    #[serde(default)]
    rotation: Option<RotationPolicy>,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_flush_timeout_ms() -> u64 {
    DEFAULT_FLUSH_TIMEOUT.as_millis() as u64
}

fn default_stop_timeout_secs() -> u64 {
    DEFAULT_STOP_TIMEOUT.as_secs()
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

/// Configuration for a [`crate::factory::BufferedSequentialFileFactory`].
#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub(crate) directory: PathBuf,
    pub(crate) buffer_size: usize,
    pub(crate) flush_timeout: Duration,
    pub(crate) stop_timeout: Duration,
    pub(crate) log_rates: bool,
    pub(crate) extension: String,
    pub(crate) rotation: Option<RotationPolicy>,
}

impl JournalConfig {
    /// A config rooted at `directory` with the teacher-style defaults.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            log_rates: false,
            extension: DEFAULT_EXTENSION.to_string(),
            rotation: None,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: JournalConfigFile = toml::from_str(&content)?;
        Ok(Self {
            directory: file.directory,
            buffer_size: file.buffer_size,
            flush_timeout: Duration::from_millis(file.flush_timeout_ms),
            stop_timeout: Duration::from_secs(file.stop_timeout_secs),
            log_rates: file.log_rates,
            extension: file.extension,
            rotation: file.rotation,
        })
    }

    /// Flush once this many bytes are queued for a file.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Flush this long after the first queued write if the buffer never
    /// fills.
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// How long `stop` waits for the write executor to drain.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Whether to log periodic write-rate diagnostics.
    pub fn log_rates(mut self, enabled: bool) -> Self {
        self.log_rates = enabled;
        self
    }

    /// File extension for journal files, without the leading dot.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The rotation policy a caller builds a writer on top of. Consumed as a
    /// plain value; the factory itself has no rotation logic.
    pub fn rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = Some(policy);
        self
    }

    /// The journal directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The configured journal file extension.
    pub fn file_extension(&self) -> &str {
        &self.extension
    }

    /// The configured rotation policy, if any.
    pub fn rotation_policy(&self) -> Option<&RotationPolicy> {
        self.rotation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = JournalConfig::new("/tmp/journal")
            .buffer_size(4096)
            .flush_timeout(Duration::from_millis(5))
            .stop_timeout(Duration::from_secs(1))
            .log_rates(true)
            .extension("wal");

        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.flush_timeout, Duration::from_millis(5));
        assert_eq!(config.stop_timeout, Duration::from_secs(1));
        assert!(config.log_rates);
        assert_eq!(config.file_extension(), "wal");
        assert!(config.rotation_policy().is_none());
    }

    #[test]
    fn from_file_parses_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("journal.toml");
        std::fs::write(&config_path, format!("directory = \"{}\"\n", dir.path().display())).unwrap();

        let config = JournalConfig::from_file(&config_path).unwrap();
        assert_eq!(config.directory(), dir.path());
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.file_extension(), DEFAULT_EXTENSION);
        assert!(config.rotation_policy().is_none());
    }

    #[test]
    fn from_file_parses_rotation_policy() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("journal.toml");
        std::fs::write(
            &config_path,
            format!(
                "directory = \"{}\"\nextension = \"wal\"\n\n[rotation]\nmax_files = 5\n\n[rotation.trigger]\ntype = \"Size\"\nvalue = 1048576\n\n[rotation.pattern]\ntype = \"Sequential\"\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let config = JournalConfig::from_file(&config_path).unwrap();
        assert_eq!(config.file_extension(), "wal");
        let rotation = config.rotation_policy().expect("rotation policy");
        assert_eq!(rotation.max_files, 5);
        assert!(matches!(rotation.trigger, crate::rotation::RotationTrigger::Size(1_048_576)));
    }

    #[test]
    fn from_file_missing_file_is_io_error() {
        let err = JournalConfig::from_file("/nonexistent/journal.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
