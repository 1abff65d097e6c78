use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::RecommendationRequest,
    services::prompt_template::{render, PromptTemplate},
    settings::ServiceConfig,
};

const MAX_KEYWORDS: usize = 20;
const MIN_KEYWORD_LEN: usize = 3;

/// Builds the model prompt for a recommendation request.
///
/// The output depends only on the template, the settings and the request, so
/// identical inputs always produce byte-identical prompts.
pub struct PromptBuilder<'a> {
    template: &'a PromptTemplate,
    settings: &'a ServiceConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(template: &'a PromptTemplate, settings: &'a ServiceConfig) -> Self {
        Self { template, settings }
    }

    pub fn build(&self, request: &RecommendationRequest) -> AppResult<String> {
        request.validate()?;

        let rec = &self.settings.recommendation_settings;
        let vars = [
            ("assistant_name", self.settings.assistant_name.clone()),
            ("language", self.settings.language.clone()),
            ("usuario_id", request.usuario_id.to_string()),
            ("max_recomendaciones", rec.max_count.to_string()),
            ("puntuacion_minima", format!("{:.2}", rec.min_score)),
        ];

        let activities = request.prompt_activities(rec.max_prompt_activities);
        if activities.len() < request.actividades.len() {
            tracing::debug!(
                offered = activities.len(),
                received = request.actividades.len(),
                "Activity list truncated for prompt"
            );
        }

        let preferences = if request.preferencias.is_empty() {
            "Ninguna preferencia registrada".to_string()
        } else {
            to_json(&request.preferencias)?
        };
        let history = if request.historial_participacion.is_empty() {
            "Sin historial previo".to_string()
        } else {
            to_json(&request.historial_participacion)?
        };
        let keywords = keywords(request.hobbies.as_deref(), request.intereses.as_deref());
        let keywords = if keywords.is_empty() {
            "ninguna".to_string()
        } else {
            keywords.join(", ")
        };

        let mut sections = vec![render(&self.template.persona, &vars)];

        sections.push(format!(
            "## DATOS DEL USUARIO\n\
             Usuario: {}\n\
             Preferencias: {}\n\
             Hobbies: {}\n\
             Intereses: {}\n\
             Palabras clave para buscar coincidencias: {}\n\
             Historial de participación: {}",
            request.usuario_id,
            preferences,
            or_unspecified(request.hobbies.as_deref()),
            or_unspecified(request.intereses.as_deref()),
            keywords,
            history,
        ));

        if let Some(query) = request.user_query.as_deref().map(str::trim) {
            if !query.is_empty() {
                sections.push(format!("## CONSULTA DEL USUARIO\n{}", query));
            }
        }

        sections.push(format!(
            "## ACTIVIDADES DISPONIBLES\n{}",
            to_json(&activities)?
        ));

        sections.push(render(&self.template.output_format, &vars));

        sections.push(format!(
            "## REGLAS\n\
             - Usa solo valores de \"id\" que aparezcan en ACTIVIDADES DISPONIBLES.\n\
             - Devuelve como máximo {} recomendaciones.\n\
             - Omite las actividades con puntuación menor que {:.2}.\n\
             - Cada \"puntuacion\" debe estar entre 0 y 1.\n\
             - Responde con un único arreglo JSON.",
            rec.max_count, rec.min_score,
        ));

        if let Some(footer) = &self.template.footer {
            sections.push(render(footer, &vars));
        }

        Ok(sections.join("\n\n"))
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Internal(format!("failed to serialize prompt data: {}", e)))
}

fn or_unspecified(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => "No especificados",
    }
}

/// Lowercased keywords from free-text hobbies and interests, in first-seen order
fn keywords(hobbies: Option<&str>, interests: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let tokens = [hobbies, interests]
        .into_iter()
        .flatten()
        .flat_map(|text| text.split(|c: char| c == ',' || c.is_whitespace()));

    for token in tokens {
        let token = token.trim().to_lowercase();
        if token.chars().count() < MIN_KEYWORD_LEN || out.contains(&token) {
            continue;
        }
        out.push(token);
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}
