//! Engine configuration

use crate::error::EngineError;
use cardprop_model::DateFormat;
use cardprop_registry::NameLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When computed values are refreshed after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeMode {
    /// Run a recompute pass before the mutation returns
    #[default]
    Eager,
    /// Leave entries stale until a pass runs (queue or explicit call)
    Deferred,
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recompute policy
    pub recompute: RecomputeMode,
    /// How all-numeric dates in imported text are read
    pub date_format: DateFormat,
    /// Name and value length limits
    pub limits: NameLimits,
    /// Cards processed by the background worker between yields
    pub recompute_yield_every: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With recompute mode
    #[inline]
    #[must_use]
    pub fn with_recompute(mut self, mode: RecomputeMode) -> Self {
        self.recompute = mode;
        self
    }

    /// With date format
    #[inline]
    #[must_use]
    pub fn with_date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    /// With name limits
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: NameLimits) -> Self {
        self.limits = limits;
        self
    }

    /// With worker yield interval
    #[inline]
    #[must_use]
    pub fn with_yield_every(mut self, cards: usize) -> Self {
        self.recompute_yield_every = cards.max(1);
        self
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recompute: RecomputeMode::Eager,
            date_format: DateFormat::MonthFirst,
            limits: NameLimits::default(),
            recompute_yield_every: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            recompute = "deferred"

            [limits]
            tree_name = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.recompute, RecomputeMode::Deferred);
        assert_eq!(config.limits.tree_name, 100);
        assert_eq!(config.limits.property_name, 40);
        assert_eq!(config.date_format, DateFormat::MonthFirst);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "date_format = \"day_first\"\nrecompute_yield_every = 8").unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.date_format, DateFormat::DayFirst);
        assert_eq!(config.recompute_yield_every, 8);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("recompute = \"sometimes\""),
            Err(EngineError::Config(_))
        ));
    }
}
