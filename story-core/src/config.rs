//! Run configuration.
//!
//! Values resolve, highest priority first, from environment variables
//! (`STORY_*`), a TOML file, and compiled defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {message}")]
    Toml { path: String, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Settings for one story run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    /// Model name passed to the generator.
    pub model: String,

    /// Author whose style the story imitates.
    pub persona: String,

    /// Seed text for a new run.
    pub premise: String,

    /// Iterations in a run.
    pub total_iterations: usize,

    /// Rejected attempts allowed per iteration.
    pub max_retries: usize,

    /// A candidate scoring above this against a recent chapter is a duplicate.
    pub novelty_threshold: f64,

    /// Reference point for the logged summary drift. Informational only.
    pub summary_drift_threshold: f64,

    /// Recent chapters each candidate is compared against.
    pub novelty_window: usize,

    /// Pause after a rejected candidate.
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,

    /// Longest chapter kept, in characters.
    pub max_chapter_chars: usize,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            persona: "Stephen King".to_string(),
            premise: "a beautiful girl...".to_string(),
            total_iterations: 333,
            max_retries: 5,
            novelty_threshold: 0.8,
            summary_drift_threshold: 0.6,
            novelty_window: 3,
            retry_delay: Duration::from_secs(1),
            max_chapter_chars: 1000,
        }
    }
}

impl StoryConfig {
    /// Default settings for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    pub fn with_premise(mut self, premise: impl Into<String>) -> Self {
        self.premise = premise.into();
        self
    }

    pub fn with_total_iterations(mut self, total: usize) -> Self {
        self.total_iterations = total;
        self
    }

    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_novelty_threshold(mut self, threshold: f64) -> Self {
        self.novelty_threshold = threshold;
        self
    }

    pub fn with_summary_drift_threshold(mut self, threshold: f64) -> Self {
        self.summary_drift_threshold = threshold;
        self
    }

    pub fn with_novelty_window(mut self, window: usize) -> Self {
        self.novelty_window = window;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_max_chapter_chars(mut self, chars: usize) -> Self {
        self.max_chapter_chars = chars;
        self
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Self::parse(toml_str, "<string>")
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Toml {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `STORY_MODEL`, `STORY_PERSONA`, `STORY_PREMISE`
    /// and `STORY_ITERATIONS`. Unparseable numbers are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("STORY_MODEL") {
            self.model = model;
        }
        if let Some(persona) = lookup("STORY_PERSONA") {
            self.persona = persona;
        }
        if let Some(premise) = lookup("STORY_PREMISE") {
            self.premise = premise;
        }
        if let Some(total) = lookup("STORY_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.total_iterations = total;
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                message: "must not be empty".to_string(),
            });
        }
        if self.total_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "total_iterations",
                message: "must be greater than 0".to_string(),
            });
        }
        for (field, value) in [
            ("novelty_threshold", self.novelty_threshold),
            ("summary_drift_threshold", self.summary_drift_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("must be between 0.0 and 1.0, got {value}"),
                });
            }
        }
        if self.max_chapter_chars < 4 {
            return Err(ConfigError::Invalid {
                field: "max_chapter_chars",
                message: "must be at least 4".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoryConfig::default();
        assert_eq!(config.model, "llama3");
        assert_eq!(config.persona, "Stephen King");
        assert_eq!(config.total_iterations, 333);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.novelty_threshold, 0.8);
        assert_eq!(config.summary_drift_threshold, 0.6);
        assert_eq!(config.novelty_window, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = StoryConfig::new("mistral")
            .with_persona("Shirley Jackson")
            .with_total_iterations(10)
            .with_retry_delay(Duration::ZERO);
        assert_eq!(config.model, "mistral");
        assert_eq!(config.persona, "Shirley Jackson");
        assert_eq!(config.total_iterations, 10);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = StoryConfig::from_toml_str(
            r#"
            model = "mistral"
            total_iterations = 12
            retry_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "mistral");
        assert_eq!(config.total_iterations, 12);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.persona, "Stephen King");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = StoryConfig::new("phi3").with_novelty_threshold(0.7);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("retry_delay_ms = 1000"));
        assert_eq!(StoryConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        let err = StoryConfig::from_toml_str("model = ").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let err = StoryConfig::from_toml_str("novelty_threshold = 1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "novelty_threshold", .. }));

        let err = StoryConfig::new("m").with_total_iterations(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "total_iterations", .. }));

        let err = StoryConfig::new("  ").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "model", .. }));
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = StoryConfig::from_toml_file(dir.path().join("story.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("story.toml");
        std::fs::write(&path, "persona = \"Edgar Allan Poe\"\n").unwrap();
        assert_eq!(StoryConfig::from_toml_file(&path).unwrap().persona, "Edgar Allan Poe");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("STORY_MODEL", "gemma"),
            ("STORY_ITERATIONS", "not a number"),
            ("STORY_PREMISE", "The lighthouse went dark."),
        ]
        .into_iter()
        .collect();

        let mut config = StoryConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.model, "gemma");
        assert_eq!(config.total_iterations, 333);
        assert_eq!(config.premise, "The lighthouse went dark.");
    }
}
