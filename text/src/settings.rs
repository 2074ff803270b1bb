//! Tuning knobs for relexing and scratch buffers.
//!
//! Settings are read from a TOML file. [`Settings::load_with_overrides`]
//! picks the file: CLI override > discovered path > the embedded
//! `settings.toml` defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub relex: RelexSettings,
    pub pool: PoolSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelexSettings {
    /// Tokens between checkpoints.
    pub checkpoint_interval: usize,
    /// Minimum characters between checkpoints.
    pub min_checkpoint_distance: usize,
    /// Characters after which a checkpoint is placed regardless of token count.
    pub max_checkpoint_distance: usize,
    /// Characters per tokenizer load.
    pub chunk_size: usize,
}

impl Default for RelexSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval: 16,
            min_checkpoint_distance: 32,
            max_checkpoint_distance: 1024,
            chunk_size: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    pub max_retained: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_retained: 4 }
    }
}

impl Settings {
    /// Read and deserialize a TOML settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        Ok(settings.validate())
    }

    /// Load with priority: CLI override > discovered path > embedded defaults.
    pub fn load_with_overrides(
        cli_override: Option<&Path>,
        discovered_path: Option<&Path>,
    ) -> Result<Self> {
        if let Some(path) = cli_override {
            return Self::load(path);
        }
        if let Some(path) = discovered_path {
            return Self::load(path);
        }
        Self::load_embedded()
    }

    fn load_embedded() -> Result<Self> {
        let source = include_str!("../settings.toml");
        let settings: Settings =
            toml::from_str(source).context("Failed to parse embedded settings.toml")?;
        Ok(settings.validate())
    }

    /// Clamp values that cannot work together.
    pub fn validate(mut self) -> Self {
        let relex = &mut self.relex;
        if relex.chunk_size == 0 {
            tracing::warn!("relex.chunk_size must be positive, using 1");
            relex.chunk_size = 1;
        }
        if relex.checkpoint_interval == 0 {
            tracing::warn!("relex.checkpoint_interval must be positive, using 1");
            relex.checkpoint_interval = 1;
        }
        if relex.max_checkpoint_distance == 0 {
            tracing::warn!("relex.max_checkpoint_distance must be positive, using 1");
            relex.max_checkpoint_distance = 1;
        }
        if relex.min_checkpoint_distance > relex.max_checkpoint_distance {
            tracing::warn!(
                min = relex.min_checkpoint_distance,
                max = relex.max_checkpoint_distance,
                "relex.min_checkpoint_distance exceeds the maximum, clamping"
            );
            relex.min_checkpoint_distance = relex.max_checkpoint_distance;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_empty_settings() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("settings.toml");
        std::fs::write(&path, "").unwrap();

        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn embedded_defaults_match_code_defaults() {
        let settings = Settings::load_with_overrides(None, None).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("settings.toml");
        std::fs::write(&path, "[relex]\ncheckpoint_interval = 4\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.relex.checkpoint_interval, 4);
        assert_eq!(settings.relex.chunk_size, 4096);
        assert_eq!(settings.pool.max_retained, 4);
    }

    #[test]
    fn errors_on_unknown_keys() {
        let tmp_dir = tempdir().unwrap();
        let path = tmp_dir.path().join("settings.toml");
        std::fs::write(&path, "[relex]\nspeed = 11\n").unwrap();

        let result = Settings::load(&path);
        assert!(result.unwrap_err().to_string().contains("Failed to parse"));
    }

    #[test]
    fn errors_on_nonexistent_file() {
        let tmp_dir = tempdir().unwrap();
        let result = Settings::load(&tmp_dir.path().join("missing.toml"));
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
    }

    #[test]
    fn cli_override_takes_priority() {
        let tmp_dir = tempdir().unwrap();
        let cli_path = tmp_dir.path().join("cli.toml");
        let discovered_path = tmp_dir.path().join("discovered.toml");
        std::fs::write(&cli_path, "[pool]\nmax_retained = 1\n").unwrap();
        std::fs::write(&discovered_path, "[pool]\nmax_retained = 9\n").unwrap();

        let settings =
            Settings::load_with_overrides(Some(&cli_path), Some(&discovered_path)).unwrap();
        assert_eq!(settings.pool.max_retained, 1);
    }

    #[test]
    fn validate_clamps_inconsistent_values() {
        let settings = Settings {
            relex: RelexSettings {
                checkpoint_interval: 0,
                min_checkpoint_distance: 500,
                max_checkpoint_distance: 100,
                chunk_size: 0,
            },
            ..Settings::default()
        }
        .validate();

        assert_eq!(settings.relex.checkpoint_interval, 1);
        assert_eq!(settings.relex.min_checkpoint_distance, 100);
        assert_eq!(settings.relex.chunk_size, 1);
    }
}
