use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Activity;

/// A validated recommendation returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub actividad_id: i64,
    pub titulo: String,
    pub categoria: String,
    pub razon: String,
    pub puntuacion: f64,
    pub actividad: Activity,
}

/// Body returned by `POST /recomendar`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResponse {
    pub recomendaciones: Vec<Recommendation>,
    /// Raw model output the recommendations were extracted from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Online,
    Offline,
}

impl From<bool> for Availability {
    fn from(online: bool) -> Self {
        if online {
            Availability::Online
        } else {
            Availability::Offline
        }
    }
}

/// Body returned by `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Overall: settings loaded and model server reachable
    pub status: Availability,
    /// Model server reachable
    pub nlp: Availability,
    /// Configured model installed on the server
    pub model: Availability,
    pub model_name: String,
    pub checked_at: DateTime<Utc>,
}
