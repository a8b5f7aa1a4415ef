/*
 * User swap settings (slippage tolerance, transaction deadline)
 */

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};
use crate::models::{MegadromeError, Result};

pub const DEFAULT_DEADLINE_MINUTES: u64 = 30;
pub const SECONDS_PER_MINUTE: u64 = 60;

/// Quick-select slippage values offered in the settings panel, in percent.
#[must_use]
pub fn slippage_options() -> [Decimal; 3] {
    [Decimal::new(1, 1), Decimal::new(5, 1), Decimal::new(10, 1)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettings {
    /// Tolerated deviation from the quote, in percent (0.5 = 0.5%).
    pub slippage_percent: Decimal,
    pub deadline_minutes: u64,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            slippage_percent: Decimal::new(5, 1),
            deadline_minutes: DEFAULT_DEADLINE_MINUTES,
        }
    }
}

impl SwapSettings {
    pub fn new(slippage_percent: Decimal, deadline_minutes: u64) -> Result<Self> {
        let settings = Self {
            slippage_percent,
            deadline_minutes,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slippage_percent < Decimal::ZERO || self.slippage_percent >= Decimal::ONE_HUNDRED {
            return Err(MegadromeError::ConfigError(format!(
                "Slippage must be in [0, 100), got {}",
                self.slippage_percent
            )));
        }
        if self.deadline_minutes == 0 {
            return Err(MegadromeError::ConfigError(
                "Deadline must be at least one minute".to_string(),
            ));
        }
        Ok(())
    }

    /// Unix timestamp after which the router rejects the swap.
    #[must_use]
    pub fn deadline_from(&self, now_unix: u64) -> u64 {
        now_unix.saturating_add(self.deadline_minutes.saturating_mul(SECONDS_PER_MINUTE))
    }
}

/// Process-wide settings, optionally persisted as JSON. Consumers take a copy
/// with [`SettingsStore::current`] at the moment they need it.
#[derive(Debug, Default)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<SwapSettings>,
}

impl SettingsStore {
    #[must_use]
    pub fn in_memory(settings: SwapSettings) -> Self {
        Self {
            path: None,
            current: RwLock::new(settings),
        }
    }

    /// Loads settings from `path`, falling back to defaults when the file is
    /// missing or invalid.
    #[must_use]
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let settings = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<SwapSettings>(&raw) {
                Ok(s) if s.validate().is_ok() => s,
                Ok(s) => {
                    warn!("Ignoring invalid settings in {}: {:?}", path.display(), s);
                    SwapSettings::default()
                }
                Err(e) => {
                    warn!("Ignoring unreadable settings in {}: {}", path.display(), e);
                    SwapSettings::default()
                }
            },
            Err(_) => SwapSettings::default(),
        };
        info!("Swap settings: {:?}", settings);

        Self {
            path: Some(path),
            current: RwLock::new(settings),
        }
    }

    #[must_use]
    pub fn current(&self) -> SwapSettings {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_slippage(&self, slippage_percent: Decimal) -> Result<()> {
        let next = SwapSettings {
            slippage_percent,
            ..self.current()
        };
        self.replace(next)
    }

    pub fn set_deadline(&self, deadline_minutes: u64) -> Result<()> {
        let next = SwapSettings {
            deadline_minutes,
            ..self.current()
        };
        self.replace(next)
    }

    fn replace(&self, next: SwapSettings) -> Result<()> {
        next.validate()?;
        if let Some(path) = &self.path {
            std::fs::write(path, serde_json::to_vec_pretty(&next)?)?;
        }
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        Ok(())
    }
}
