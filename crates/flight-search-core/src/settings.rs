// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Quiet period a query must survive before a lookup is issued.
    pub debounce_ms: u64,
    pub retry_delay_ms: u64,
    /// Lookups retried after a failure before the list is left stale.
    pub retry_limit: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            retry_delay_ms: 500,
            retry_limit: 3,
        }
    }
}

impl SearchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// What a toggle does when its route already has a durable write in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Contention {
    /// Fail fast with `FavoriteError::Busy`.
    #[default]
    Reject,
    /// Wait for the earlier write and then run.
    Queue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoriteSettings {
    pub store_timeout_ms: u64,
    pub contention: Contention,
}

impl Default for FavoriteSettings {
    fn default() -> Self {
        Self {
            store_timeout_ms: 5000,
            contention: Contention::Reject,
        }
    }
}

impl FavoriteSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// CSV dataset replacing the bundled airports.
    pub airports_csv: Option<PathBuf>,
    /// Defaults to `favorites.json` in the config root.
    pub favorites_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub favorites: FavoriteSettings,
    pub data: DataSettings,
}

impl Settings {
    pub fn default_path() -> PathBuf {
        crate::get_config_root().join("settings.json")
    }

    /// Loads settings, returning defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!(
                "[Settings] No settings file, using defaults — path={}",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn favorites_path(&self) -> PathBuf {
        self.data
            .favorites_file
            .clone()
            .unwrap_or_else(|| crate::get_config_root().join("favorites.json"))
    }
}
