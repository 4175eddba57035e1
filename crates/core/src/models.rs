//! Wire schemas for clustering requests and responses.
//!
//! Input items arrive in one of five shapes emitted by different upstream
//! producers; the format detector tags a batch and the adapter normalizes it.
//! Everything serialized here uses plain Rust primitives so the JSON contract
//! stays stable regardless of the numeric libraries used internally.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Shape of an input batch, decided by inspecting the first item's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    SimpleVector,
    ExtendedVector,
    Article,
    VectorWithText,
    PlainText,
    Unknown,
}

impl InputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::SimpleVector => "simple_vector",
            InputFormat::ExtendedVector => "extended_vector",
            InputFormat::Article => "article",
            InputFormat::VectorWithText => "vector_with_text",
            InputFormat::PlainText => "plain_text",
            InputFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimal AI-worker format: an id and its embedding, nothing else.
#[derive(Debug, Clone, Deserialize)]
pub struct SimpleVectorItem {
    pub id: Value,
    pub embedding: Vec<f32>,
}

/// Simple vector plus optional article-ish metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedVectorItem {
    pub id: Value,
    pub embedding: Vec<f32>,
    pub title: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "publishDate")]
    pub publish_date: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
}

/// Full article record as produced by the AI worker.
#[derive(Debug, Clone, Deserialize)]
pub struct ArticleItem {
    pub id: Value,
    pub embedding: Vec<f32>,
    pub title: String,
    pub content: String,
    pub url: String,
    #[serde(rename = "publishDate")]
    pub publish_date: String,
    pub status: Option<String>,
    #[serde(rename = "contentFileKey")]
    pub content_file_key: Option<String>,
    #[serde(rename = "processedAt")]
    pub processed_at: Option<String>,
}

/// Text plus a precomputed embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorWithTextItem {
    pub id: Value,
    pub text: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Raw text with no embedding; routed through the encoder.
#[derive(Debug, Clone, Deserialize)]
pub struct PlainTextItem {
    pub id: Value,
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Internal item form every input shape normalizes to.
///
/// `text` may be empty but is never null; `embedding` is filled by the
/// encoder when the input shape did not carry one.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NormalizedItem {
    #[schema(value_type = Object)]
    pub id: Value,
    pub text: String,
    pub embedding: Vec<f32>,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

/// Distance metric for the dimensionality reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReducerMetric {
    Cosine,
    Euclidean,
    Manhattan,
}

/// Distance metric for the density clusterer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMetric {
    Euclidean,
    Manhattan,
    Chebyshev,
}

/// HDBSCAN cluster selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Eom,
    Leaf,
}

/// Hyperparameters for one reduction + clustering fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ClusteringConfig {
    pub umap_n_components: usize,
    pub umap_n_neighbors: usize,
    pub umap_min_dist: f64,
    pub umap_metric: ReducerMetric,
    pub hdbscan_min_cluster_size: usize,
    pub hdbscan_min_samples: usize,
    pub hdbscan_metric: ClusterMetric,
    pub hdbscan_cluster_selection_method: SelectionMethod,
    pub hdbscan_cluster_selection_epsilon: f64,
    pub normalize_embeddings: bool,
    pub remove_outliers: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            umap_n_components: 10,
            umap_n_neighbors: 15,
            umap_min_dist: 0.0,
            umap_metric: ReducerMetric::Cosine,
            hdbscan_min_cluster_size: 5,
            hdbscan_min_samples: 3,
            hdbscan_metric: ClusterMetric::Euclidean,
            hdbscan_cluster_selection_method: SelectionMethod::Eom,
            hdbscan_cluster_selection_epsilon: 0.0,
            normalize_embeddings: true,
            remove_outliers: false,
        }
    }
}

/// Grid axes and budget for hyperparameter optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct OptimizationConfig {
    pub enabled: bool,
    pub umap_n_neighbors_range: Vec<usize>,
    pub hdbscan_min_cluster_size_range: Vec<usize>,
    pub hdbscan_min_samples_range: Vec<usize>,
    pub hdbscan_epsilon_range: Vec<f64>,
    pub max_combinations: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            umap_n_neighbors_range: vec![10, 15, 20, 30],
            hdbscan_min_cluster_size_range: vec![5, 8, 10, 15],
            hdbscan_min_samples_range: vec![2, 3, 5],
            hdbscan_epsilon_range: vec![0.1, 0.2, 0.3],
            max_combinations: 100,
        }
    }
}

/// Reducer side of the winning grid combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BestUmapParams {
    pub n_neighbors: usize,
    pub n_components: usize,
    pub min_dist: f64,
    pub metric: ReducerMetric,
}

/// Clusterer side of the winning grid combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BestHdbscanParams {
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub epsilon: f64,
    pub metric: ClusterMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BestParams {
    pub umap: BestUmapParams,
    pub hdbscan: BestHdbscanParams,
}

/// Outcome of the grid search, reported verbatim in the response.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct OptimizationResult {
    pub used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_params: Option<BestParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluated_combinations: Option<usize>,
    pub truncated: bool,
    pub fallback: bool,
}

impl OptimizationResult {
    /// Optimization was not requested.
    pub fn unused() -> Self {
        Self {
            used: false,
            best_params: None,
            best_score: None,
            evaluated_combinations: None,
            truncated: false,
            fallback: false,
        }
    }

    /// Optimization was requested but safe defaults were used instead.
    pub fn fallback(evaluated_combinations: usize, truncated: bool) -> Self {
        Self {
            used: true,
            best_params: None,
            best_score: None,
            evaluated_combinations: Some(evaluated_combinations),
            truncated,
            fallback: true,
        }
    }
}

/// Aggregate statistics over one labeling.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClusteringStats {
    pub n_samples: usize,
    pub n_clusters: usize,
    pub n_outliers: usize,
    pub outlier_ratio: f64,
    #[schema(value_type = Object)]
    pub cluster_sizes: BTreeMap<i32, usize>,
    pub dbcv_score: Option<f64>,
}

/// One cluster with its members and representative content.
///
/// `cluster_id` of -1 is the outlier group; it sorts last. `summary` is
/// reserved for a future content analysis extension and is never populated.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClusterDescriptor {
    pub cluster_id: i32,
    pub size: usize,
    pub items: Vec<NormalizedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Vec<f64>>,
    pub representative_content: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Metadata about how the pipeline processed a request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelInfo {
    pub embedding_model: String,
    pub detected_format: InputFormat,
    pub embeddings_computed: bool,
    pub reducer_skipped: bool,
    pub reducer_fallback: bool,
    pub clusterer_fallback: bool,
}

/// Full clustering response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClusteringResponse {
    pub clusters: Vec<ClusterDescriptor>,
    pub clustering_stats: ClusteringStats,
    pub optimization_result: OptimizationResult,
    pub config_used: ClusteringConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_embeddings: Option<Vec<Vec<f64>>>,
    pub processing_time: f64,
    #[schema(value_type = Object)]
    pub stage_timings: BTreeMap<String, f64>,
    pub model_info: ModelInfo,
}

/// Body of the clustering endpoints.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClusteringRequest {
    /// Items in any of the supported input shapes (homogeneous per batch).
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<Map<String, Value>>,
    #[serde(default)]
    pub config: Option<ClusteringConfig>,
    #[serde(default)]
    pub optimization: Option<OptimizationConfig>,
    /// Populate per-cluster keywords from member texts.
    #[serde(default)]
    pub content_analysis: bool,
}

/// Body of the embeddings endpoint.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_normalize() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub model_name: String,
    pub dimensions: usize,
    pub processing_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clustering_config_defaults_match_contract() {
        let config = ClusteringConfig::default();
        assert_eq!(config.umap_n_components, 10);
        assert_eq!(config.umap_n_neighbors, 15);
        assert_eq!(config.umap_metric, ReducerMetric::Cosine);
        assert_eq!(config.hdbscan_min_cluster_size, 5);
        assert_eq!(config.hdbscan_min_samples, 3);
        assert_eq!(config.hdbscan_metric, ClusterMetric::Euclidean);
        assert!(config.normalize_embeddings);
        assert!(!config.remove_outliers);
    }

    #[test]
    fn clustering_config_deserializes_partial_bodies() {
        let config: ClusteringConfig =
            serde_json::from_str(r#"{"hdbscan_min_cluster_size": 2, "umap_metric": "euclidean"}"#)
                .unwrap();
        assert_eq!(config.hdbscan_min_cluster_size, 2);
        assert_eq!(config.umap_metric, ReducerMetric::Euclidean);
        assert_eq!(config.umap_n_neighbors, 15);
    }

    #[test]
    fn optimization_config_defaults_match_contract() {
        let grid = OptimizationConfig::default();
        assert!(!grid.enabled);
        assert_eq!(grid.umap_n_neighbors_range, vec![10, 15, 20, 30]);
        assert_eq!(grid.hdbscan_min_cluster_size_range, vec![5, 8, 10, 15]);
        assert_eq!(grid.hdbscan_min_samples_range, vec![2, 3, 5]);
        assert_eq!(grid.hdbscan_epsilon_range, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn article_item_uses_camel_case_wire_names() {
        let article: ArticleItem = serde_json::from_str(
            r#"{
                "id": "a-1",
                "embedding": [0.1, 0.2],
                "title": "Title",
                "content": "Body",
                "url": "https://example.com/a-1",
                "publishDate": "2024-05-01T12:00:00Z",
                "contentFileKey": "articles/a-1.md",
                "processedAt": "2024-05-01T13:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(article.publish_date, "2024-05-01T12:00:00Z");
        assert_eq!(article.content_file_key.as_deref(), Some("articles/a-1.md"));
    }

    #[test]
    fn optimization_result_is_serialized_without_empty_fields() {
        let unused = OptimizationResult::unused();
        let value = serde_json::to_value(&unused).unwrap();
        assert_eq!(value["used"], false);
        assert!(value.get("best_params").is_none());
        assert!(value.get("best_score").is_none());
    }

    #[test]
    fn stats_serialize_to_plain_json_numbers() {
        let stats = ClusteringStats {
            n_samples: 4,
            n_clusters: 2,
            n_outliers: 0,
            outlier_ratio: 0.0,
            cluster_sizes: BTreeMap::from([(0, 2), (1, 2)]),
            dbcv_score: None,
        };
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["cluster_sizes"]["0"], 2);
        assert_eq!(value["dbcv_score"], serde_json::Value::Null);
    }
}
