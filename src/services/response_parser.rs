//! Extraction of recommendations from free-form model output.
//!
//! Decoding is tolerant (prose, code fences and the legacy marker format are
//! accepted) while validation is strict: every returned entry references a
//! known activity, carries a score in [0, 1] at or above the threshold, and the
//! list never exceeds the configured maximum. The model's order is kept.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{Activity, Recommendation},
    settings::ServiceConfig,
};

/// Marker that precedes each entry in the line-oriented answer format
static MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)GENERAR_RECOMENDACION_JSON\s*:\s*").expect("marker pattern is valid")
});

/// Keys that only appear in recommendation entries, never in the activity list
const RECOMMENDATION_KEYS: [&str; 6] = [
    "actividad_id",
    "activity_id",
    "razon",
    "reason",
    "puntuacion",
    "score",
];

/// One entry as written by the model, before validation.
///
/// Spanish and English spellings are separate fields: models often copy the
/// activity object (with its `id`) and add `actividad_id` next to it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    actividad_id: Option<Value>,
    activity_id: Option<Value>,
    id: Option<Value>,
    razon: Option<Value>,
    reason: Option<Value>,
    puntuacion: Option<Value>,
    score: Option<Value>,
}

impl RawEntry {
    fn id(&self) -> Option<&Value> {
        self.actividad_id
            .as_ref()
            .or(self.activity_id.as_ref())
            .or(self.id.as_ref())
    }

    fn reason(&self) -> &str {
        self.razon
            .as_ref()
            .or(self.reason.as_ref())
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn score(&self) -> Option<&Value> {
        self.puntuacion.as_ref().or(self.score.as_ref())
    }
}

pub struct ResponseParser<'a> {
    activities: HashMap<i64, &'a Activity>,
    max_count: usize,
    min_score: f64,
}

impl<'a> ResponseParser<'a> {
    /// `candidates` are the activities that were offered to the model
    pub fn new(candidates: &'a [Activity], settings: &ServiceConfig) -> Self {
        Self {
            activities: candidates.iter().map(|a| (a.id, a)).collect(),
            max_count: settings.recommendation_settings.max_count,
            min_score: settings.recommendation_settings.min_score,
        }
    }

    pub fn parse(&self, raw: &str) -> AppResult<Vec<Recommendation>> {
        let entries = extract_entries(raw).ok_or_else(|| {
            AppError::Parse("no recommendation list found in model output".to_string())
        })?;

        let mut seen = HashSet::new();
        let mut recommendations = Vec::new();

        for entry in entries {
            let Some(recommendation) = self.validate_entry(entry, &mut seen) else {
                continue;
            };
            if recommendation.puntuacion < self.min_score {
                tracing::debug!(
                    actividad_id = recommendation.actividad_id,
                    puntuacion = recommendation.puntuacion,
                    min_score = self.min_score,
                    "Recommendation below threshold dropped"
                );
                continue;
            }
            recommendations.push(recommendation);
            if recommendations.len() == self.max_count {
                break;
            }
        }

        Ok(recommendations)
    }

    fn validate_entry(&self, entry: Value, seen: &mut HashSet<i64>) -> Option<Recommendation> {
        let raw: RawEntry = match serde_json::from_value(entry) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed recommendation entry dropped");
                return None;
            }
        };

        let Some(raw_id) = raw.id() else {
            tracing::warn!("Entry without activity id dropped");
            return None;
        };
        let Some(id) = coerce_id(raw_id) else {
            tracing::warn!(actividad_id = %raw_id, "Non-numeric activity id dropped");
            return None;
        };
        let Some(activity) = self.activities.get(&id) else {
            tracing::warn!(actividad_id = id, "Unknown activity id dropped");
            return None;
        };
        if !seen.insert(id) {
            tracing::warn!(actividad_id = id, "Duplicate activity id dropped");
            return None;
        }

        let score = raw
            .score()
            .and_then(coerce_number)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        Some(Recommendation {
            actividad_id: id,
            titulo: activity.title().to_string(),
            categoria: activity.categoria.clone(),
            razon: raw.reason().trim().to_string(),
            puntuacion: score,
            actividad: (*activity).clone(),
        })
    }
}

/// Locates the list of candidate entries, or `None` when the output holds none
fn extract_entries(raw: &str) -> Option<Vec<Value>> {
    let marked = marker_entries(raw);
    if !marked.is_empty() {
        return Some(marked);
    }
    embedded_list(raw)
}

fn marker_entries(raw: &str) -> Vec<Value> {
    MARKER_REGEX
        .find_iter(raw)
        .filter_map(|m| first_value(&raw[m.end()..]))
        .filter(Value::is_object)
        .collect()
}

/// First JSON array of recommendation objects (or `{"recomendaciones": [...]}`
/// wrapper) in the text. Arrays of objects without any recommendation key, such
/// as an echoed activity list, are skipped.
fn embedded_list(raw: &str) -> Option<Vec<Value>> {
    raw.char_indices()
        .filter(|(_, c)| *c == '[' || *c == '{')
        .find_map(|(i, _)| match first_value(&raw[i..])? {
            Value::Array(items) if is_recommendation_list(&items) => Some(items),
            Value::Object(mut map) => match map.remove("recomendaciones") {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            },
            _ => None,
        })
}

fn is_recommendation_list(items: &[Value]) -> bool {
    let objects: Option<Vec<_>> = items.iter().map(Value::as_object).collect();
    match objects {
        Some(objects) => {
            objects.is_empty()
                || objects
                    .iter()
                    .any(|o| RECOMMENDATION_KEYS.iter().any(|k| o.contains_key(*k)))
        }
        None => false,
    }
}

/// Decodes one JSON value at the start of `text`, ignoring whatever follows it
fn first_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn coerce_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(id: i64, categoria: &str) -> Activity {
        Activity {
            id,
            categoria: categoria.to_string(),
            titulo: Some(format!("Actividad {}", id)),
            descripcion: None,
            fecha: None,
            lugar: None,
            nivel_sostenibilidad: None,
        }
    }

    fn activities() -> Vec<Activity> {
        vec![
            activity(1, "ambiental"),
            activity(2, "deportiva"),
            activity(3, "cultural"),
        ]
    }

    fn settings(max_count: usize, min_score: f64) -> ServiceConfig {
        let mut settings = ServiceConfig::default();
        settings.recommendation_settings.max_count = max_count;
        settings.recommendation_settings.min_score = min_score;
        settings
    }

    fn ids(recs: &[Recommendation]) -> Vec<i64> {
        recs.iter().map(|r| r.actividad_id).collect()
    }

    #[test]
    fn test_plain_json_array() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let recs = ResponseParser::new(&acts, &cfg)
            .parse(r#"[{"actividad_id": 2, "razon": "Te gusta el deporte", "puntuacion": 0.9}]"#)
            .unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].actividad_id, 2);
        assert_eq!(recs[0].titulo, "Actividad 2");
        assert_eq!(recs[0].categoria, "deportiva");
        assert_eq!(recs[0].razon, "Te gusta el deporte");
        assert_eq!(recs[0].puntuacion, 0.9);
        assert_eq!(recs[0].actividad, acts[1]);
    }

    #[test]
    fn test_array_inside_prose_and_code_fence() {
        let acts = activities();
        let cfg = settings(5, 0.0);
        let raw = "Claro, aquí tienes:\n```json\n[\n  {\"actividad_id\": 3, \"razon\": \"r\", \"puntuacion\": 0.5}\n]\n```\n¡Disfruta!";
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![3]);
    }

    #[test]
    fn test_marker_format() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let raw = "**Actividad:** Actividad 1\n---\nGENERAR_RECOMENDACION_JSON: {\"actividad_id\": 1, \"razon\": \"a\", \"puntuacion\": 0.8}\n\
                   **Actividad:** Actividad 3\n---\ngenerar_recomendacion_json: {\"actividad_id\": 3, \"razon\": \"c\", \"puntuacion\": 0.6} gracias";
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![1, 3]);
    }

    #[test]
    fn test_wrapped_object() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let raw = r#"{"recomendaciones": [{"id": "1", "reason": "x", "score": "0.7"}]}"#;
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![1]);
        assert_eq!(recs[0].puntuacion, 0.7);
    }

    #[test]
    fn test_unknown_and_duplicate_ids_dropped() {
        let acts = activities();
        let cfg = settings(5, 0.0);
        let raw = r#"[
            {"actividad_id": 99, "razon": "inventada", "puntuacion": 0.99},
            {"actividad_id": 2, "razon": "ok", "puntuacion": 0.8},
            {"actividad_id": 2, "razon": "repetida", "puntuacion": 0.7},
            {"actividad_id": "abc", "razon": "mal", "puntuacion": 0.7},
            {"razon": "sin id"}
        ]"#;
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![2]);
        assert_eq!(recs[0].razon, "ok");
    }

    #[test]
    fn test_scores_clamped_and_thresholded() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let raw = r#"[
            {"actividad_id": 1, "razon": "a", "puntuacion": 1.7},
            {"actividad_id": 2, "razon": "b", "puntuacion": 0.1},
            {"actividad_id": 3, "razon": "c"}
        ]"#;
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![1]);
        assert_eq!(recs[0].puntuacion, 1.0);
    }

    #[test]
    fn test_order_preserved_and_truncated() {
        let acts = activities();
        let cfg = settings(2, 0.0);
        let raw = r#"[
            {"actividad_id": 3, "razon": "c", "puntuacion": 0.4},
            {"actividad_id": 1, "razon": "a", "puntuacion": 0.9},
            {"actividad_id": 2, "razon": "b", "puntuacion": 0.95}
        ]"#;
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![3, 1]);
    }

    #[test]
    fn test_empty_list_is_valid() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let recs = ResponseParser::new(&acts, &cfg)
            .parse("No encontré nada adecuado: []")
            .unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn test_prose_without_list_is_parse_error() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let err = ResponseParser::new(&acts, &cfg)
            .parse("Te recomiendo la reforestación porque te gusta la naturaleza.")
            .unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_numeric_citations_are_not_a_list() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let err = ResponseParser::new(&acts, &cfg)
            .parse("Según la fuente [1], la actividad es buena.")
            .unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_echoed_activity_list_is_skipped() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let raw = "Actividades consideradas: [{\"id\": 1, \"categoria\": \"ambiental\"}]\n\
                   Recomendaciones:\n[{\"actividad_id\": 1, \"razon\": \"r\", \"puntuacion\": 0.9}]";
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![1]);
        assert_eq!(recs[0].razon, "r");
    }

    #[test]
    fn test_only_echoed_activity_list_is_parse_error() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let err = ResponseParser::new(&acts, &cfg)
            .parse(r#"[{"id": 1, "categoria": "ambiental"}, {"id": 2, "categoria": "deportiva"}]"#)
            .unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn test_entry_with_both_spanish_and_english_keys() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let raw = r#"[
            {"actividad_id": 1, "id": 1, "razon": "r", "puntuacion": 0.9},
            {"actividad_id": 2, "id": 3, "categoria": "deportiva", "razon": "b", "reason": "x", "score": 0.1, "puntuacion": 0.8}
        ]"#;
        let recs = ResponseParser::new(&acts, &cfg).parse(raw).unwrap();
        assert_eq!(ids(&recs), vec![1, 2]);
        assert_eq!(recs[1].razon, "b");
        assert_eq!(recs[1].puntuacion, 0.8);
    }

    #[test]
    fn test_non_string_reason_is_kept_as_empty() {
        let acts = activities();
        let cfg = settings(5, 0.3);
        let recs = ResponseParser::new(&acts, &cfg)
            .parse(r#"[{"activity_id": 3, "reason": 5, "score": 0.6}]"#)
            .unwrap();
        assert_eq!(ids(&recs), vec![3]);
        assert_eq!(recs[0].razon, "");
    }

    #[test]
    fn test_coerce_id_accepts_integral_float() {
        assert_eq!(coerce_id(&serde_json::json!(2.0)), Some(2));
        assert_eq!(coerce_id(&serde_json::json!(2.5)), None);
        assert_eq!(coerce_id(&serde_json::json!(" 7 ")), Some(7));
    }
}
