//! Embedding endpoint: encoder plus validation, no clustering.

use std::time::Instant;

use actix_web::{HttpRequest, HttpResponse, post, web};
use tracing::{info, instrument};

use clustering_core::models::{EmbeddingRequest, EmbeddingResponse};

use crate::auth;
use crate::config::ServiceConfig;
use crate::encoder;
use crate::errors::ApiError;
use crate::pipeline::validate;

/// Compute embeddings for a list of texts.
#[utoipa::path(
    post,
    path = "/embeddings",
    request_body = EmbeddingRequest,
    responses(
        (status = 200, description = "Embeddings computed", body = EmbeddingResponse),
        (status = 400, description = "Empty text list or unknown model"),
        (status = 401, description = "Missing or invalid API token"),
        (status = 503, description = "Encoder unavailable")
    ),
    tag = "embedding"
)]
#[post("/embeddings")]
#[instrument(skip(req, config, body), fields(count = body.texts.len()))]
pub async fn compute_embeddings(
    req: HttpRequest,
    config: web::Data<ServiceConfig>,
    body: web::Json<EmbeddingRequest>,
) -> Result<HttpResponse, ApiError> {
    auth::verify_token(&req, &config.auth)?;

    if body.texts.is_empty() {
        return Err(ApiError::BadInputFormat(
            "texts must not be empty".to_string(),
        ));
    }
    if let Some(requested) = body.model_name.as_deref() {
        if requested != config.model.embedding_model_name {
            return Err(ApiError::BadInputFormat(format!(
                "only the configured model '{}' is available",
                config.model.embedding_model_name
            )));
        }
    }

    let start = Instant::now();
    let enc = encoder::get_or_load(&config.model).await?;
    let embeddings = enc
        .embed(
            body.texts.clone(),
            config.model.batch_size,
            config.model.task_prefix.as_deref(),
            body.normalize,
        )
        .await?;

    validate::validate_embeddings(&embeddings, config.model.expected_embedding_dimensions)?;

    let processing_time = start.elapsed().as_secs_f64();
    info!(
        count = embeddings.len(),
        processing_time, "computed embeddings"
    );

    let dimensions = embeddings.first().map(|row| row.len()).unwrap_or(0);
    Ok(HttpResponse::Ok().json(EmbeddingResponse {
        embeddings,
        model_name: config.model.embedding_model_name.clone(),
        dimensions,
        processing_time,
    }))
}
