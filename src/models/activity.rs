use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A campus activity offered as a recommendation candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub categoria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lugar: Option<String>,
    #[serde(
        default,
        alias = "nivelSostenibilidad",
        skip_serializing_if = "Option::is_none"
    )]
    pub nivel_sostenibilidad: Option<i32>,
}

impl Activity {
    pub fn title(&self) -> &str {
        self.titulo.as_deref().unwrap_or_default()
    }
}

/// Stated interest of the user in a category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preference {
    pub categoria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nivel_interes: Option<u8>,
}

/// Lowest and highest accepted interest level
pub const INTEREST_LEVELS: std::ops::RangeInclusive<u8> = 1..=5;

/// A past participation, used only as context for the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParticipationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actividad_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categoria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha: Option<String>,
}

/// Body of `POST /recomendar`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRequest {
    pub usuario_id: i64,
    pub actividades: Vec<Activity>,
    #[serde(default)]
    pub preferencias: Vec<Preference>,
    #[serde(default)]
    pub historial_participacion: Vec<ParticipationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hobbies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intereses: Option<String>,
}

impl RecommendationRequest {
    /// Checks the request invariants before anything is sent to the model
    pub fn validate(&self) -> AppResult<()> {
        if self.actividades.is_empty() {
            return Err(AppError::InvalidInput(
                "actividades must contain at least one activity".to_string(),
            ));
        }

        let mut seen_ids = HashSet::new();
        for activity in &self.actividades {
            if !seen_ids.insert(activity.id) {
                return Err(AppError::InvalidInput(format!(
                    "duplicate activity id {}",
                    activity.id
                )));
            }
            if activity.categoria.trim().is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "activity {} has an empty categoria",
                    activity.id
                )));
            }
        }

        let mut seen_categories = HashSet::new();
        for preference in &self.preferencias {
            let category = preference.categoria.trim().to_lowercase();
            if category.is_empty() {
                return Err(AppError::InvalidInput(
                    "preference categoria must not be empty".to_string(),
                ));
            }
            if !seen_categories.insert(category) {
                return Err(AppError::InvalidInput(format!(
                    "duplicate preference for categoria '{}'",
                    preference.categoria
                )));
            }
            if let Some(level) = preference.nivel_interes {
                if !INTEREST_LEVELS.contains(&level) {
                    return Err(AppError::InvalidInput(format!(
                        "nivel_interes for '{}' must be between {} and {}, got {}",
                        preference.categoria,
                        INTEREST_LEVELS.start(),
                        INTEREST_LEVELS.end(),
                        level
                    )));
                }
            }
        }

        Ok(())
    }

    /// Activities actually offered to the model, in request order
    pub fn prompt_activities(&self, limit: usize) -> &[Activity] {
        &self.actividades[..self.actividades.len().min(limit)]
    }
}
