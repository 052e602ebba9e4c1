//! # Pipeline Configuration
//!
//! Loaded once at startup, from TOML or built in code.
//!
//! ```toml
//! sampler_period_ms = 1000
//! start_paused = false
//! shutdown_timeout_ms = 500
//!
//! [clock]
//! mode = "periodic"
//! interval_ms = 37
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Reference clock period (≈27 Hz).
pub const DEFAULT_CLOCK_INTERVAL_MS: u64 = 37;

/// Reference statistics refresh period.
pub const DEFAULT_SAMPLER_PERIOD_MS: u64 = 1000;

/// Join bound used when a running scheduler is dropped.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 500;

/// How the pipeline clock produces ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ClockMode {
    /// A timer thread ticks at a fixed interval.
    Periodic {
        /// Tick interval in milliseconds.
        interval_ms: u64,
    },
    /// No timer thread; ticks are driven through `PipelineClock::tick`.
    Manual,
}

impl Default for ClockMode {
    fn default() -> Self {
        Self::Periodic {
            interval_ms: DEFAULT_CLOCK_INTERVAL_MS,
        }
    }
}

/// Configuration for the frame pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Clock source for the rate gates.
    pub clock: ClockMode,
    /// Sampler wake period in milliseconds.
    pub sampler_period_ms: u64,
    /// Set the pause flag before the first tick of every run.
    pub start_paused: bool,
    /// Join bound used when a running scheduler is dropped (ms).
    pub shutdown_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl PipelineConfig {
    /// Reference timings: 37 ms clock, 1 s sampler.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            clock: ClockMode::Periodic {
                interval_ms: DEFAULT_CLOCK_INTERVAL_MS,
            },
            sampler_period_ms: DEFAULT_SAMPLER_PERIOD_MS,
            start_paused: false,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }

    /// Manual clock; the caller drives every tick.
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            clock: ClockMode::Manual,
            ..Self::reference()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] on malformed TOML or an
    /// invalid value.
    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PipelineError::InvalidConfig(format!("malformed TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the file cannot be read
    /// or does not parse.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks that every period is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> PipelineResult<()> {
        if let ClockMode::Periodic { interval_ms: 0 } = self.clock {
            return Err(PipelineError::InvalidConfig(
                "clock.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sampler_period_ms == 0 {
            return Err(PipelineError::InvalidConfig(
                "sampler_period_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Clock interval, or `None` for a manual clock.
    #[must_use]
    pub fn clock_interval(&self) -> Option<Duration> {
        match self.clock {
            ClockMode::Periodic { interval_ms } => Some(Duration::from_millis(interval_ms)),
            ClockMode::Manual => None,
        }
    }

    /// Sampler wake period.
    #[must_use]
    pub fn sampler_period(&self) -> Duration {
        Duration::from_millis(self.sampler_period_ms)
    }

    /// Join bound used on drop.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
