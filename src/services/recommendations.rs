use crate::{
    error::{AppError, AppResult},
    models::{RecommendationRequest, RecommendationResponse},
    services::{
        prompt_builder::PromptBuilder,
        prompt_template::PromptTemplate,
        providers::{GenerationRequest, LanguageModel},
        response_parser::ResponseParser,
    },
    settings::ServiceConfig,
};

/// Generates personalized activity recommendations
///
/// Stages: validate → build prompt → ensure model ready → generate → parse.
/// The first failing stage aborts the request; partial results are never
/// returned.
pub async fn recommend(
    model: &dyn LanguageModel,
    settings: &ServiceConfig,
    template: &PromptTemplate,
    request: &RecommendationRequest,
) -> AppResult<RecommendationResponse> {
    request.validate()?;

    let prompt = PromptBuilder::new(template, settings).build(request)?;
    tracing::debug!(prompt_chars = prompt.len(), "Prompt built");

    model.ensure_ready().await?;

    let generation = GenerationRequest {
        prompt,
        model: settings.model.name.clone(),
        temperature: settings.model.temperature,
        max_tokens: settings.model.max_tokens,
    };
    let raw = model.generate(&generation).await?;

    let candidates =
        request.prompt_activities(settings.recommendation_settings.max_prompt_activities);
    let recomendaciones = ResponseParser::new(candidates, settings)
        .parse(&raw)
        .map_err(|e| {
            if let AppError::Parse(_) = e {
                tracing::error!(
                    usuario_id = request.usuario_id,
                    raw_output = %raw,
                    "Model output could not be parsed"
                );
            }
            e
        })?;

    tracing::info!(
        usuario_id = request.usuario_id,
        provider = model.name(),
        candidates = candidates.len(),
        returned = recomendaciones.len(),
        "Recommendations generated"
    );

    Ok(RecommendationResponse {
        recomendaciones,
        response_text: Some(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, Preference};
    use crate::services::providers::MockLanguageModel;
    use mockall::predicate::always;
    use tokio_test::{assert_err, assert_ok};

    fn request() -> RecommendationRequest {
        RecommendationRequest {
            usuario_id: 1,
            actividades: vec![Activity {
                id: 1,
                categoria: "ambiental".to_string(),
                titulo: Some("Limpieza de playa".to_string()),
                descripcion: None,
                fecha: Some("2025-12-01".to_string()),
                lugar: Some("Costa".to_string()),
                nivel_sostenibilidad: Some(5),
            }],
            preferencias: vec![Preference {
                categoria: "ambiental".to_string(),
                nivel_interes: Some(5),
            }],
            historial_participacion: vec![],
            user_query: None,
            hobbies: None,
            intereses: None,
        }
    }

    fn template() -> PromptTemplate {
        PromptTemplate::builtin().unwrap()
    }

    fn model_replying(reply: &'static str) -> MockLanguageModel {
        let mut model = MockLanguageModel::new();
        model.expect_ensure_ready().times(1).returning(|| Ok(()));
        model
            .expect_generate()
            .with(always())
            .times(1)
            .returning(move |_| Ok(reply.to_string()));
        model.expect_name().return_const("mock");
        model
    }

    #[tokio::test]
    async fn test_single_matching_activity_returned() {
        let model =
            model_replying(r#"[{"actividad_id": 1, "razon": "Te encanta el ambiente", "puntuacion": 0.92}]"#);
        let settings = ServiceConfig::default();

        let response = assert_ok!(recommend(&model, &settings, &template(), &request()).await);

        assert_eq!(response.recomendaciones.len(), 1);
        let rec = &response.recomendaciones[0];
        assert_eq!(rec.actividad_id, 1);
        assert_eq!(rec.categoria, "ambiental");
        assert!(rec.puntuacion > 0.0);
        assert!(rec.puntuacion >= settings.recommendation_settings.min_score);
    }

    #[tokio::test]
    async fn test_generation_uses_configured_model_parameters() {
        let mut settings = ServiceConfig::default();
        settings.model.name = "llama3.1:8b".to_string();
        settings.model.temperature = 0.0;
        settings.model.max_tokens = 256;

        let mut model = MockLanguageModel::new();
        model.expect_ensure_ready().returning(|| Ok(()));
        model
            .expect_generate()
            .withf(|req| {
                req.model == "llama3.1:8b"
                    && req.temperature == 0.0
                    && req.max_tokens == 256
                    && req.prompt.contains("Limpieza de playa")
            })
            .times(1)
            .returning(|_| Ok("[]".to_string()));
        model.expect_name().return_const("mock");

        let response = assert_ok!(recommend(&model, &settings, &template(), &request()).await);
        assert!(response.recomendaciones.is_empty());
        assert_eq!(response.response_text.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_empty_activities_never_reach_model() {
        let mut model = MockLanguageModel::new();
        model.expect_ensure_ready().never();
        model.expect_generate().never();

        let mut req = request();
        req.actividades.clear();

        let err = assert_err!(
            recommend(&model, &ServiceConfig::default(), &template(), &req).await
        );
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unavailable_model_short_circuits() {
        let mut model = MockLanguageModel::new();
        model
            .expect_ensure_ready()
            .returning(|| Err(AppError::ModelUnavailable("ollama not found".to_string())));
        model.expect_generate().never();

        let err = assert_err!(
            recommend(&model, &ServiceConfig::default(), &template(), &request()).await
        );
        assert!(matches!(err, AppError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_prose_reply_is_parse_error() {
        let model = model_replying("Te recomiendo ir a la limpieza de playa, ¡te encantará!");

        let err = assert_err!(
            recommend(&model, &ServiceConfig::default(), &template(), &request()).await
        );
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_propagated() {
        let mut model = MockLanguageModel::new();
        model.expect_ensure_ready().returning(|| Ok(()));
        model
            .expect_generate()
            .returning(|_| Err(AppError::ModelTimeout("120s".to_string())));

        let err = assert_err!(
            recommend(&model, &ServiceConfig::default(), &template(), &request()).await
        );
        assert!(matches!(err, AppError::ModelTimeout(_)));
    }
}
