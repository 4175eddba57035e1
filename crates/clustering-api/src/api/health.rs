//! Health and service description endpoints.

use actix_web::{HttpResponse, Responder, get, web};

use crate::config::ServiceConfig;
use crate::encoder::{self, EncoderState};

/// Service health. Reports 503 only when the encoder definitively failed to
/// load; a not-yet-loaded encoder is healthy because it loads lazily.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value),
        (status = 503, description = "Encoder failed to load", body = serde_json::Value)
    ),
    tag = "health"
)]
#[get("/health")]
pub async fn health(config: web::Data<ServiceConfig>) -> impl Responder {
    let state = encoder::load_state();
    let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;

    if state == EncoderState::Failed {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "status": "unhealthy",
            "embedding_model": config.model.embedding_model_name,
            "clustering_available": true,
            "optimization_available": true,
            "error": "embedding model failed to load",
            "timestamp": timestamp,
        }));
    }

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "embedding_model": config.model.embedding_model_name,
        "clustering_available": true,
        "optimization_available": true,
        "encoder_loaded": state == EncoderState::Loaded,
        "timestamp": timestamp,
    }))
}

/// Service descriptor with the endpoint list.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service descriptor", body = serde_json::Value)
    ),
    tag = "health"
)]
#[get("/")]
pub async fn service_descriptor(config: web::Data<ServiceConfig>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "clustering-api",
        "version": env!("CARGO_PKG_VERSION"),
        "features": ["embeddings", "clustering", "parameter_optimization"],
        "models": {
            "embedding": config.model.embedding_model_name,
            "clustering": "dimensionality reduction + HDBSCAN with grid search optimization",
        },
        "endpoints": {
            "health": "GET /health",
            "embeddings": "POST /embeddings",
            "ai_worker_clustering": "POST /ai-worker/clustering",
            "clustering_auto": "POST /clustering/auto",
        },
    }))
}
