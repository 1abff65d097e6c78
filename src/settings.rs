//! Service settings document.
//!
//! The document is read once at startup and never mutated afterwards. A missing
//! file is created with the defaults below; an unreadable or out-of-range file
//! falls back to the defaults and is reported as a configuration failure by
//! `/status`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Recommendation settings that shape prompts and filter model output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecommendationSettings {
    /// Maximum number of recommendations returned to the caller
    #[serde(alias = "max_recommendations")]
    pub max_count: usize,
    /// Minimum score a recommendation must reach to be returned
    pub min_score: f64,
    /// Maximum number of activities offered to the model in one prompt
    pub max_prompt_activities: usize,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            max_count: 5,
            min_score: 0.3,
            max_prompt_activities: 30,
        }
    }
}

/// Model invocation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    pub name: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: "qwen2.5:3b-instruct".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

/// Process-lifetime service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub assistant_name: String,
    pub language: String,
    pub model: ModelSettings,
    pub recommendation_settings: RecommendationSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            assistant_name: "SmartCampus Assistant".to_string(),
            language: "es".to_string(),
            model: ModelSettings::default(),
            recommendation_settings: RecommendationSettings::default(),
        }
    }
}

impl ServiceConfig {
    /// Checks value ranges that serde cannot express
    pub fn validate(&self) -> AppResult<()> {
        if self.model.name.trim().is_empty() {
            return Err(AppError::Configuration("model.name must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.model.temperature) {
            return Err(AppError::Configuration(format!(
                "model.temperature must be within [0, 1], got {}",
                self.model.temperature
            )));
        }
        if self.model.max_tokens == 0 {
            return Err(AppError::Configuration("model.max_tokens must be positive".into()));
        }

        let rec = &self.recommendation_settings;
        if rec.max_count == 0 {
            return Err(AppError::Configuration(
                "recommendation_settings.max_count must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&rec.min_score) {
            return Err(AppError::Configuration(format!(
                "recommendation_settings.min_score must be within [0, 1], got {}",
                rec.min_score
            )));
        }
        if rec.max_prompt_activities == 0 {
            return Err(AppError::Configuration(
                "recommendation_settings.max_prompt_activities must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Where the active settings came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOrigin {
    /// Read from an existing document
    File,
    /// Document was missing and has been written with defaults
    Created,
    /// Document could not be used; defaults are active
    Fallback,
}

impl SettingsOrigin {
    pub fn is_healthy(self) -> bool {
        !matches!(self, SettingsOrigin::Fallback)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub config: ServiceConfig,
    pub origin: SettingsOrigin,
}

/// Loads the settings document, creating it with defaults when absent.
///
/// Never fails: problems are logged and reported through [`SettingsOrigin`].
pub fn load_or_create(path: impl AsRef<Path>) -> LoadedSettings {
    let path = path.as_ref();

    if !path.exists() {
        tracing::warn!(path = %path.display(), "Settings document not found, creating defaults");
        let config = ServiceConfig::default();
        let origin = match write_document(path, &config) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Default settings document created");
                SettingsOrigin::Created
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write default settings");
                SettingsOrigin::Fallback
            }
        };
        return LoadedSettings { config, origin };
    }

    match read_document(path) {
        Ok(config) => {
            tracing::info!(
                path = %path.display(),
                model = %config.model.name,
                max_count = config.recommendation_settings.max_count,
                min_score = config.recommendation_settings.min_score,
                "Settings loaded"
            );
            LoadedSettings {
                config,
                origin: SettingsOrigin::File,
            }
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Invalid settings document, using defaults");
            LoadedSettings {
                config: ServiceConfig::default(),
                origin: SettingsOrigin::Fallback,
            }
        }
    }
}

fn read_document(path: &Path) -> AppResult<ServiceConfig> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
    let config: ServiceConfig = serde_json::from_str(&raw)
        .map_err(|e| AppError::Configuration(format!("cannot decode {}: {}", path.display(), e)))?;
    config.validate()?;
    Ok(config)
}

fn write_document(path: &Path, config: &ServiceConfig) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| AppError::Configuration(e.to_string()))?;
    }
    let body =
        serde_json::to_string_pretty(config).map_err(|e| AppError::Internal(e.to_string()))?;
    fs::write(path, body).map_err(|e| AppError::Configuration(e.to_string()))
}
