//! Clustering endpoints.
//!
//! `/ai-worker/clustering` accepts only items that already carry embeddings;
//! `/clustering/auto` additionally accepts plain text and routes it through
//! the encoder.

use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::Deserialize;
use tracing::instrument;
use utoipa::IntoParams;

use clustering_core::models::{ClusteringRequest, ClusteringResponse};

use crate::auth;
use crate::config::ServiceConfig;
use crate::errors::ApiError;
use crate::pipeline::{self, PipelineOptions};

#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClusteringQuery {
    /// Include the input embeddings in the response.
    #[serde(default)]
    pub return_embeddings: bool,
    /// Include the reduced projection in the response.
    #[serde(default)]
    pub return_reduced_embeddings: bool,
}

/// Cluster items emitted by the AI worker (embeddings required).
#[utoipa::path(
    post,
    path = "/ai-worker/clustering",
    request_body = ClusteringRequest,
    params(ClusteringQuery),
    responses(
        (status = 200, description = "Clustering result", body = ClusteringResponse),
        (status = 400, description = "Bad input format or invalid embeddings"),
        (status = 401, description = "Missing or invalid API token")
    ),
    tag = "clustering"
)]
#[post("/ai-worker/clustering")]
#[instrument(skip(req, config, query, body), fields(items = body.items.len()))]
pub async fn ai_worker_clustering(
    req: HttpRequest,
    config: web::Data<ServiceConfig>,
    query: web::Query<ClusteringQuery>,
    body: web::Json<ClusteringRequest>,
) -> Result<HttpResponse, ApiError> {
    auth::verify_token(&req, &config.auth)?;
    let response = run_request(&config, *query, body.into_inner(), false).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Cluster items of any supported shape, encoding texts when needed.
#[utoipa::path(
    post,
    path = "/clustering/auto",
    request_body = ClusteringRequest,
    params(ClusteringQuery),
    responses(
        (status = 200, description = "Clustering result", body = ClusteringResponse),
        (status = 400, description = "Bad input format or invalid embeddings"),
        (status = 401, description = "Missing or invalid API token"),
        (status = 503, description = "Encoder unavailable")
    ),
    tag = "clustering"
)]
#[post("/clustering/auto")]
#[instrument(skip(req, config, query, body), fields(items = body.items.len()))]
pub async fn clustering_auto(
    req: HttpRequest,
    config: web::Data<ServiceConfig>,
    query: web::Query<ClusteringQuery>,
    body: web::Json<ClusteringRequest>,
) -> Result<HttpResponse, ApiError> {
    auth::verify_token(&req, &config.auth)?;
    let response = run_request(&config, *query, body.into_inner(), true).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn run_request(
    config: &ServiceConfig,
    query: ClusteringQuery,
    body: ClusteringRequest,
    allow_plain_text: bool,
) -> Result<ClusteringResponse, ApiError> {
    let options = PipelineOptions {
        allow_plain_text,
        content_analysis: body.content_analysis,
        return_embeddings: query.return_embeddings,
        return_reduced_embeddings: query.return_reduced_embeddings,
    };

    pipeline::run(
        &config.model,
        &body.items,
        body.config,
        body.optimization,
        options,
    )
    .await
    .map_err(ApiError::from)
}
