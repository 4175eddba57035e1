//! Request-scoped clustering pipeline.
//!
//! Stages: detect -> adapt -> [encode] -> validate -> (optimize | fit) ->
//! assemble. Each stage is timed; numeric failures in the reducer, clusterer,
//! and scorer are recovered locally and surface only as response flags, never
//! as request errors.

pub mod adapt;
pub mod assemble;
pub mod cluster;
pub mod dbcv;
pub mod detect;
pub mod optimize;
pub mod params;
pub mod reduce;
pub mod validate;

use std::collections::BTreeMap;
use std::time::Instant;

use ndarray::Array2;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use clustering_core::models::{
    ClusteringConfig, ClusteringResponse, InputFormat, ModelInfo, OptimizationConfig,
    OptimizationResult,
};

use crate::config::ModelConfig;
use crate::encoder;
use self::reduce::ReductionMethod;

/// Request-level pipeline failures. Everything else is recovered in place.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    BadInputFormat(String),
    #[error("{0}")]
    HeterogeneousInput(String),
    #[error("{0}")]
    InvalidEmbeddings(String),
    #[error("{0}")]
    EncoderUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

pub struct PipelineOptions {
    /// Whether plain text items may route through the encoder.
    pub allow_plain_text: bool,
    pub content_analysis: bool,
    pub return_embeddings: bool,
    pub return_reduced_embeddings: bool,
}

/// Run the full pipeline for one request.
pub async fn run(
    model_config: &ModelConfig,
    raw_items: &[Map<String, Value>],
    config: Option<ClusteringConfig>,
    optimization: Option<OptimizationConfig>,
    options: PipelineOptions,
) -> Result<ClusteringResponse, PipelineError> {
    let total_start = Instant::now();
    let mut stage_timings: BTreeMap<String, f64> = BTreeMap::new();

    // detect
    let stage_start = Instant::now();
    let format = detect::detect_batch_format(raw_items)?;
    stage_timings.insert("detect".to_string(), stage_start.elapsed().as_secs_f64());

    if format == InputFormat::PlainText && !options.allow_plain_text {
        return Err(PipelineError::BadInputFormat(
            "this endpoint requires items with precomputed embeddings".to_string(),
        ));
    }

    // adapt
    let stage_start = Instant::now();
    let mut batch = adapt::adapt_items(raw_items, format)?;
    stage_timings.insert("adapt".to_string(), stage_start.elapsed().as_secs_f64());

    // encode, only when the input shape carried no embeddings
    let mut embeddings_computed = false;
    if !batch.has_embeddings {
        let stage_start = Instant::now();
        let enc = encoder::get_or_load(model_config).await?;
        let texts: Vec<String> = batch.items.iter().map(|item| item.text.clone()).collect();
        let vectors = enc
            .embed(
                texts,
                model_config.batch_size,
                model_config.task_prefix.as_deref(),
                true,
            )
            .await?;
        for (item, vector) in batch.items.iter_mut().zip(vectors) {
            item.embedding = vector;
        }
        embeddings_computed = true;
        stage_timings.insert("encode".to_string(), stage_start.elapsed().as_secs_f64());
    }

    // validate
    let stage_start = Instant::now();
    let rows: Vec<Vec<f32>> = batch
        .items
        .iter()
        .map(|item| item.embedding.clone())
        .collect();
    let matrix = validate::validate_embeddings(&rows, model_config.expected_embedding_dimensions)?;
    stage_timings.insert("validate".to_string(), stage_start.elapsed().as_secs_f64());

    // clustering is CPU-bound; keep it off the event loop
    let fit_config = config.unwrap_or_default();
    let artifacts = tokio::task::spawn_blocking(move || {
        run_clustering(matrix, fit_config, optimization)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("clustering task join error: {e}")))?;
    stage_timings.extend(artifacts.timings.clone());

    // assemble
    let stage_start = Instant::now();
    let stats = assemble::build_stats(&artifacts.labels, artifacts.dbcv_score);
    let clusters = assemble::build_clusters(
        &batch.items,
        &artifacts.labels,
        &artifacts.reduced,
        format,
        artifacts.config_used.remove_outliers,
        options.content_analysis,
    );
    stage_timings.insert("assemble".to_string(), stage_start.elapsed().as_secs_f64());

    info!(
        format = %format,
        n_samples = stats.n_samples,
        n_clusters = stats.n_clusters,
        n_outliers = stats.n_outliers,
        "clustering pipeline complete"
    );

    Ok(ClusteringResponse {
        clusters,
        clustering_stats: stats,
        optimization_result: artifacts.optimization_result,
        config_used: artifacts.config_used,
        embeddings: options.return_embeddings.then_some(rows),
        reduced_embeddings: options.return_reduced_embeddings.then(|| {
            artifacts
                .reduced
                .outer_iter()
                .map(|row| row.to_vec())
                .collect()
        }),
        processing_time: total_start.elapsed().as_secs_f64(),
        stage_timings,
        model_info: ModelInfo {
            embedding_model: model_config.embedding_model_name.clone(),
            detected_format: format,
            embeddings_computed,
            reducer_skipped: artifacts.reduction_method == ReductionMethod::SkippedSmallBatch,
            reducer_fallback: artifacts.reduction_method == ReductionMethod::FallbackSlice,
            clusterer_fallback: artifacts.clusterer_fallback,
        },
    })
}

struct FitArtifacts {
    labels: Vec<i32>,
    reduced: Array2<f64>,
    reduction_method: ReductionMethod,
    clusterer_fallback: bool,
    dbcv_score: Option<f64>,
    config_used: ClusteringConfig,
    optimization_result: OptimizationResult,
    timings: BTreeMap<String, f64>,
}

/// Synchronous clustering core: preprocess, then either grid-search or a
/// single safety-clamped fit.
fn run_clustering(
    matrix: Array2<f32>,
    base_config: ClusteringConfig,
    optimization: Option<OptimizationConfig>,
) -> FitArtifacts {
    let mut timings = BTreeMap::new();
    let mut x = matrix.mapv(f64::from);
    if base_config.normalize_embeddings {
        normalize_rows(&mut x);
    }
    let n_samples = x.nrows();

    let mut optimization_result = OptimizationResult::unused();
    if let Some(grid) = optimization.filter(|grid| grid.enabled) {
        let stage_start = Instant::now();
        let outcome = optimize::optimize(&x, &base_config, &grid);
        timings.insert("optimize".to_string(), stage_start.elapsed().as_secs_f64());

        if let Some(fit) = outcome.fit {
            return FitArtifacts {
                labels: fit.labels,
                reduced: fit.reduced,
                reduction_method: fit.reduction_method,
                clusterer_fallback: false,
                dbcv_score: Some(fit.score),
                config_used: fit.config,
                optimization_result: outcome.result,
                timings,
            };
        }
        // no winning combination; fall through to the safety-clamped base fit
        optimization_result = outcome.result;
    }

    let stage_start = Instant::now();
    let safe = params::resolve(n_samples, x.ncols(), &base_config);
    let reduction = reduce::reduce(&x, safe.n_components);
    let clustering = cluster::cluster(
        &reduction.matrix,
        base_config.hdbscan_metric,
        safe.min_cluster_size,
        safe.min_samples,
    );
    let dbcv_score = dbcv::score_labeling(&reduction.matrix, &clustering.labels);
    timings.insert("fit".to_string(), stage_start.elapsed().as_secs_f64());

    FitArtifacts {
        labels: clustering.labels,
        reduced: reduction.matrix,
        reduction_method: reduction.method,
        clusterer_fallback: clustering.fallback,
        dbcv_score,
        config_used: base_config,
        optimization_result,
        timings,
    }
}

/// L2-normalize every row in place; zero rows are kept as-is.
fn normalize_rows(x: &mut Array2<f64>) {
    for mut row in x.rows_mut() {
        let norm: f64 = row.iter().map(|&v| v * v).sum::<f64>().sqrt();
        if norm > 1e-10 {
            row.mapv_inplace(|v| v / norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn model_config() -> ModelConfig {
        ModelConfig {
            embedding_model_name: "intfloat/multilingual-e5-small".to_string(),
            expected_embedding_dimensions: 4,
            batch_size: 32,
            max_text_length: 512,
            task_prefix: None,
            hf_home: None,
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            allow_plain_text: true,
            content_analysis: false,
            return_embeddings: false,
            return_reduced_embeddings: false,
        }
    }

    fn simple_items(embeddings: &[[f32; 4]]) -> Vec<Map<String, Value>> {
        embeddings
            .iter()
            .enumerate()
            .map(|(index, embedding)| {
                match json!({"id": index, "embedding": embedding.to_vec()}) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_batches_are_rejected() {
        let err = run(&model_config(), &[], None, None, options())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEmbeddings(_)));
    }

    #[tokio::test]
    async fn wrong_dimension_is_rejected() {
        let items = vec![
            match json!({"id": 0, "embedding": [0.1, 0.2]}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        ];
        let err = run(&model_config(), &items, None, None, options())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEmbeddings(_)));
    }

    #[tokio::test]
    async fn plain_text_is_rejected_when_disallowed() {
        let items = vec![
            match json!({"id": "a", "text": "hello"}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        ];
        let mut opts = options();
        opts.allow_plain_text = false;
        let err = run(&model_config(), &items, None, None, opts)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::BadInputFormat(_)));
    }

    #[tokio::test]
    async fn single_item_forms_one_cluster() {
        let items = simple_items(&[[1.0, 0.0, 0.0, 0.0]]);
        let response = run(&model_config(), &items, None, None, options())
            .await
            .unwrap();

        assert_eq!(response.clustering_stats.n_samples, 1);
        assert_eq!(response.clustering_stats.n_clusters, 1);
        assert_eq!(response.clustering_stats.n_outliers, 0);
        assert!(response.clustering_stats.dbcv_score.is_none());
        assert_eq!(response.clusters[0].cluster_id, 0);
        assert!(response.model_info.reducer_skipped);
    }

    #[tokio::test]
    async fn three_items_form_a_single_cluster_without_reduction() {
        let items = simple_items(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ]);
        let response = run(&model_config(), &items, None, None, options())
            .await
            .unwrap();

        assert_eq!(response.clustering_stats.n_samples, 3);
        assert_eq!(response.clustering_stats.n_clusters, 1);
        assert_eq!(response.clusters[0].size, 3);
        assert!(response.model_info.reducer_skipped);
        assert!(!response.model_info.clusterer_fallback);
    }

    #[tokio::test]
    async fn four_separated_vectors_cluster_without_outliers() {
        let mut config = ClusteringConfig::default();
        config.hdbscan_min_cluster_size = 2;
        let items = simple_items(&[
            [1.0, 0.0, 0.0, 0.01],
            [0.99, 0.01, 0.0, 0.0],
            [-1.0, 0.0, 0.01, 0.0],
            [-0.99, -0.01, 0.0, 0.0],
        ]);
        let response = run(&model_config(), &items, Some(config), None, options())
            .await
            .unwrap();

        let stats = &response.clustering_stats;
        assert_eq!(stats.n_samples, 4);
        assert!(stats.n_clusters >= 1 && stats.n_clusters <= 2);
        let clustered: usize = stats.cluster_sizes.values().sum();
        assert_eq!(clustered + stats.n_outliers, 4);
    }

    #[tokio::test]
    async fn optional_matrices_are_returned_on_request() {
        let mut opts = options();
        opts.return_embeddings = true;
        opts.return_reduced_embeddings = true;
        let items = simple_items(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
        ]);
        let response = run(&model_config(), &items, None, None, opts)
            .await
            .unwrap();

        let embeddings = response.embeddings.unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 4);
        let reduced = response.reduced_embeddings.unwrap();
        assert_eq!(reduced.len(), 2);
    }

    #[tokio::test]
    async fn stage_timings_cover_the_stages_that_ran() {
        let items = simple_items(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
        ]);
        let response = run(&model_config(), &items, None, None, options())
            .await
            .unwrap();

        for stage in ["detect", "adapt", "validate", "fit", "assemble"] {
            assert!(response.stage_timings.contains_key(stage), "missing {stage}");
        }
        assert!(!response.stage_timings.contains_key("encode"));
        assert!(!response.stage_timings.contains_key("optimize"));
        assert!(response.processing_time >= 0.0);
    }

    #[tokio::test]
    async fn small_batch_optimization_falls_back_to_defaults() {
        let mut grid = OptimizationConfig::default();
        grid.enabled = true;
        let items = simple_items(&[
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let response = run(&model_config(), &items, None, Some(grid), options())
            .await
            .unwrap();

        let optimization = &response.optimization_result;
        assert!(optimization.used);
        assert!(optimization.fallback);
        assert!(optimization.best_params.is_none());
        assert!(optimization.best_score.is_none());
        assert!(response.stage_timings.contains_key("optimize"));
        assert!(response.stage_timings.contains_key("fit"));
    }

    #[tokio::test]
    async fn identical_requests_produce_identical_labelings() {
        let items = simple_items(&[
            [1.0, 0.0, 0.0, 0.01],
            [0.99, 0.01, 0.0, 0.0],
            [0.98, 0.0, 0.02, 0.0],
            [-1.0, 0.0, 0.01, 0.0],
            [-0.99, -0.01, 0.0, 0.0],
            [-0.98, 0.0, -0.02, 0.0],
        ]);
        let mut config = ClusteringConfig::default();
        config.hdbscan_min_cluster_size = 2;

        let first = run(&model_config(), &items, Some(config.clone()), None, options())
            .await
            .unwrap();
        let second = run(&model_config(), &items, Some(config), None, options())
            .await
            .unwrap();

        assert_eq!(first.clustering_stats, second.clustering_stats);
        let first_ids: Vec<i32> = first.clusters.iter().map(|c| c.cluster_id).collect();
        let second_ids: Vec<i32> = second.clusters.iter().map(|c| c.cluster_id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn normalize_rows_produces_unit_rows() {
        let mut x = Array2::from_shape_vec((2, 2), vec![3.0, 4.0, 0.0, 0.0]).unwrap();
        normalize_rows(&mut x);
        assert!((x[[0, 0]] - 0.6).abs() < 1e-12);
        assert!((x[[0, 1]] - 0.8).abs() < 1e-12);
        assert_eq!(x[[1, 0]], 0.0);
    }
}
