//! Covenant runtime configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use covenant_core::{Error, Result};
use covenant_stream::{AnyOf, Chunk, IdleTimeout, LengthCap, ParagraphBoundary, ParagraphShatter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CovenantConfig {
    /// Daemon start/stop timing.
    pub scope: ScopeConfig,
    /// Window policy for windowed routes.
    pub window: WindowConfig,
    /// Shatter policy for oversized units.
    pub shatter: ShatterConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Max time one daemon may take to start. 0 disables the limit.
    pub start_timeout_ms: u64,
    /// Grace period per daemon at shutdown before its stop token fires.
    /// 0 waits indefinitely.
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Emit once the buffer holds this many characters. 0 disables the cap.
    pub max_chars: usize,
    /// Emit at a paragraph break.
    pub paragraph_boundary: bool,
    /// Emit a buffer that has been quiet this long. 0 disables the timer.
    pub idle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShatterConfig {
    /// Largest piece a unit is split into, in characters.
    pub max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { start_timeout_ms: 10_000, shutdown_timeout_ms: 5_000 }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { max_chars: 2_000, paragraph_boundary: true, idle_ms: 500 }
    }
}

impl Default for ShatterConfig {
    fn default() -> Self {
        Self { max_chars: 2_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".into() }
    }
}

// ============================================================
// Loading
// ============================================================

impl CovenantConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Strict variant of [`load`](Self::load): a missing or malformed file is
    /// an error.
    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl ScopeConfig {
    pub fn start_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.start_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        non_zero_ms(self.shutdown_timeout_ms)
    }
}

impl WindowConfig {
    /// Composite policy built from the enabled triggers.
    pub fn policy<C: Chunk + 'static>(&self) -> AnyOf<C> {
        let mut policy = AnyOf::new();
        if self.paragraph_boundary {
            policy = policy.or(ParagraphBoundary);
        }
        if self.max_chars > 0 {
            policy = policy.or(LengthCap::new(self.max_chars));
        }
        if let Some(idle) = non_zero_ms(self.idle_ms) {
            policy = policy.or(IdleTimeout::new(idle));
        }
        policy
    }
}

impl ShatterConfig {
    pub fn policy(&self) -> ParagraphShatter {
        ParagraphShatter::new(self.max_chars)
    }
}

fn non_zero_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
