//! Run configuration.
//!
//! [`CurationConfig::default`] carries production defaults; `from_env` layers
//! `IMAGERY_*` variables over them. Binaries may also deserialize a JSON file
//! (every field is optional thanks to `#[serde(default)]`).

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;
use crate::pool::filters::FilterRules;

/// How the query string participates in image identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPolicy {
    /// Drop the whole query string.
    #[default]
    Strip,
    /// Drop tracking parameters, keep the rest in sorted order.
    Sort,
}

/// How ranking calls are grouped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurationMode {
    /// One call covering the hero and every section.
    #[default]
    Combined,
    /// One hero call plus one call per section.
    PerSection,
}

/// Whether dimensions that could not be measured may pass the dimension gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferredDimensionPolicy {
    Accept,
    Reject,
}

/// Gate settings for one slot type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPolicy {
    pub min_width: u32,
    pub inferred: InferredDimensionPolicy,
}

/// Configuration for one article run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub query_policy: QueryPolicy,
    pub filter_rules: FilterRules,

    pub mode: CurationMode,
    /// Images shown to the hero call.
    pub hero_snapshot_cap: usize,
    /// Images shown per section.
    pub section_snapshot_cap: usize,
    pub max_hero_candidates: usize,
    pub max_section_candidates: usize,
    /// Concurrent section calls in `PerSection` mode.
    pub curation_concurrency: usize,

    pub hero: SlotPolicy,
    pub section: SlotPolicy,
    /// Concurrent section resolutions.
    pub resolve_concurrency: usize,

    pub upload_batch_size: usize,
    /// Folder hint passed to the storage backend.
    pub upload_folder: Option<String>,
}

impl Default for CurationConfig {
    fn default() -> Self {
        CurationConfig {
            query_policy: QueryPolicy::Strip,
            filter_rules: FilterRules::default(),
            mode: CurationMode::Combined,
            hero_snapshot_cap: 40,
            section_snapshot_cap: 15,
            max_hero_candidates: 5,
            max_section_candidates: 3,
            curation_concurrency: 3,
            hero: SlotPolicy {
                min_width: 1280,
                inferred: InferredDimensionPolicy::Reject,
            },
            section: SlotPolicy {
                min_width: 640,
                inferred: InferredDimensionPolicy::Accept,
            },
            resolve_concurrency: 4,
            upload_batch_size: 3,
            upload_folder: None,
        }
    }
}

impl CurationConfig {
    /// Defaults overridden by `IMAGERY_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning rather than failing the run.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse::<u32>("IMAGERY_HERO_MIN_WIDTH") {
            config.hero.min_width = v;
        }
        if let Some(v) = env_parse::<u32>("IMAGERY_SECTION_MIN_WIDTH") {
            config.section.min_width = v;
        }
        if let Some(v) = env_parse::<usize>("IMAGERY_RESOLVE_CONCURRENCY") {
            config.resolve_concurrency = v;
        }
        if let Some(v) = env_parse::<usize>("IMAGERY_UPLOAD_BATCH_SIZE") {
            config.upload_batch_size = v;
        }
        if let Some(v) = env_parse::<usize>("IMAGERY_MAX_HERO_CANDIDATES") {
            config.max_hero_candidates = v;
        }
        if let Some(v) = env_parse::<usize>("IMAGERY_MAX_SECTION_CANDIDATES") {
            config.max_section_candidates = v;
        }
        match std::env::var("IMAGERY_CURATION_MODE").ok().as_deref() {
            Some("combined") => config.mode = CurationMode::Combined,
            Some("per_section") => config.mode = CurationMode::PerSection,
            Some(other) => tracing::warn!(value = %other, "ignoring unknown IMAGERY_CURATION_MODE"),
            None => {}
        }
        match std::env::var("IMAGERY_QUERY_POLICY").ok().as_deref() {
            Some("strip") => config.query_policy = QueryPolicy::Strip,
            Some("sort") => config.query_policy = QueryPolicy::Sort,
            Some(other) => tracing::warn!(value = %other, "ignoring unknown IMAGERY_QUERY_POLICY"),
            None => {}
        }
        if let Ok(folder) = std::env::var("IMAGERY_UPLOAD_FOLDER") {
            if !folder.trim().is_empty() {
                config.upload_folder = Some(folder.trim().to_string());
            }
        }

        config
    }

    /// Load a JSON config file over defaults.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or empty the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("hero_snapshot_cap", self.hero_snapshot_cap),
            ("section_snapshot_cap", self.section_snapshot_cap),
            ("max_hero_candidates", self.max_hero_candidates),
            ("max_section_candidates", self.max_section_candidates),
            ("curation_concurrency", self.curation_concurrency),
            ("resolve_concurrency", self.resolve_concurrency),
            ("upload_batch_size", self.upload_batch_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.hero.min_width < self.section.min_width {
            return Err(ConfigError::Invalid {
                field: "hero.min_width",
                reason: format!(
                    "hero floor {} must not be below section floor {}",
                    self.hero.min_width, self.section.min_width
                ),
            });
        }
        Ok(())
    }

    pub fn slot_policy(&self, hero: bool) -> SlotPolicy {
        if hero {
            self.hero
        } else {
            self.section
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CurationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.hero.min_width > config.section.min_width);
        assert_eq!(config.hero.inferred, InferredDimensionPolicy::Reject);
        assert_eq!(config.section.inferred, InferredDimensionPolicy::Accept);
    }

    #[test]
    fn test_slot_policy_per_slot_type() {
        let config = CurationConfig::default();
        assert_eq!(config.slot_policy(true).min_width, 1280);
        assert_eq!(config.slot_policy(true).inferred, InferredDimensionPolicy::Reject);
        assert_eq!(config.slot_policy(false).min_width, 640);
        assert_eq!(config.slot_policy(false).inferred, InferredDimensionPolicy::Accept);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = CurationConfig {
            upload_batch_size: 0,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "upload_batch_size"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_hero_floor_below_section() {
        let mut config = CurationConfig::default();
        config.hero.min_width = 320;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: CurationConfig =
            serde_json::from_str(r#"{"mode":"per_section","upload_batch_size":5}"#).unwrap();
        assert_eq!(config.mode, CurationMode::PerSection);
        assert_eq!(config.upload_batch_size, 5);
        assert_eq!(config.hero.min_width, 1280);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imagery.json");
        std::fs::write(&path, r#"{"query_policy":"sort","resolve_concurrency":2}"#).unwrap();

        let config = CurationConfig::from_json_file(&path).unwrap();
        assert_eq!(config.query_policy, QueryPolicy::Sort);
        assert_eq!(config.resolve_concurrency, 2);

        let missing = CurationConfig::from_json_file(&dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Read(_))));
    }
}
