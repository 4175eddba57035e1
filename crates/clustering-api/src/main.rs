//! Text clustering service entry point.
//!
//! Stateless HTTP service for the news pipeline: normalizes heterogeneous
//! text items, encodes them when they arrive without embeddings, clusters
//! with dimensionality reduction + HDBSCAN, and optionally grid-searches
//! hyperparameters against a DBCV validity score.

mod api;
mod auth;
mod config;
mod encoder;
mod errors;
mod observability;
mod pipeline;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Compress, web};
use anyhow::Result;
use dotenvy::dotenv;
use tracing::info;
use utoipa::OpenApi;
use utoipa_actix_web::AppExt;
use utoipa_swagger_ui::SwaggerUi;

use config::ServiceConfig;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Clustering API",
        description = "Text clustering service: embeddings, dimensionality reduction + HDBSCAN, and DBCV-scored parameter optimization",
        version = "1.0.0"
    ),
    tags(
        (name = "health", description = "Health check and service description"),
        (name = "embedding", description = "Text embedding generation"),
        (name = "clustering", description = "Text clustering and parameter optimization")
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = ServiceConfig::from_env()?;
    let prometheus = observability::init_observability("clustering_api", &config.log_format)?;

    info!(
        hostname = %config.server.hostname,
        port = config.server.port,
        embedding_model = %config.model.embedding_model_name,
        expected_dimensions = config.model.expected_embedding_dimensions,
        auth_enabled = config.auth.api_token.is_some(),
        "Starting clustering-api server"
    );

    let hostname = config.server.hostname.clone();
    let port = config.server.port;
    let cors_origins = config.server.cors_allowed_origins.clone();
    let app_config = web::Data::new(config);

    let server = HttpServer::new(move || {
        // Configure CORS
        let cors = if cors_origins.contains(&"*".to_string()) {
            Cors::permissive()
        } else {
            let mut cors = Cors::default()
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![
                    actix_web::http::header::CONTENT_TYPE,
                    actix_web::http::header::AUTHORIZATION,
                ])
                .supports_credentials()
                .max_age(3600);
            for origin in &cors_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(prometheus.clone())
            .wrap(cors)
            .wrap(Compress::default())
            .app_data(app_config.clone())
            .into_utoipa_app()
            .openapi(ApiDoc::openapi())
            .service(api::health::health)
            .service(api::health::service_descriptor)
            .service(api::embeddings::compute_embeddings)
            .service(api::clustering::ai_worker_clustering)
            .service(api::clustering::clustering_auto)
            .openapi_service(|api| SwaggerUi::new("/swagger-ui/{_:.*}").url("/api/openapi.json", api))
            .into_app()
    });

    info!(
        hostname = %hostname,
        port = port,
        "Server running at http://{}:{}",
        hostname,
        port
    );

    server.bind((hostname.as_str(), port))?.run().await?;

    Ok(())
}
