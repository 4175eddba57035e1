//! Grid search over clustering hyperparameters, scored by DBCV.
//!
//! For each `n_neighbors` value the reducer is fitted once and the projection
//! is reused across every downstream clusterer combination. The winning fit
//! (labels and projection) is kept so the pipeline never refits with the best
//! parameters.

use ndarray::Array2;
use tracing::{debug, info, warn};

use clustering_core::models::{
    BestHdbscanParams, BestParams, BestUmapParams, ClusteringConfig, OptimizationConfig,
    OptimizationResult,
};

use super::reduce::ReductionMethod;
use super::{cluster, dbcv, params, reduce};

pub struct WinningFit {
    pub labels: Vec<i32>,
    pub reduced: Array2<f64>,
    pub reduction_method: ReductionMethod,
    pub config: ClusteringConfig,
    pub score: f64,
}

pub struct OptimizationOutcome {
    pub result: OptimizationResult,
    /// Populated unless the search fell back to safe defaults.
    pub fit: Option<WinningFit>,
}

/// Grid-search the parameter lattice. Batches of five or fewer points skip
/// the search entirely and fall back to the safety-clamped base config.
pub fn optimize(
    x: &Array2<f64>,
    base: &ClusteringConfig,
    grid: &OptimizationConfig,
) -> OptimizationOutcome {
    let n_samples = x.nrows();

    if n_samples <= 5 {
        info!(
            n_samples,
            "batch too small for parameter optimization, using safe defaults"
        );
        return OptimizationOutcome {
            result: OptimizationResult::fallback(0, false),
            fit: None,
        };
    }

    let neighbors = dedup_preserving_order(
        grid.umap_n_neighbors_range
            .iter()
            .map(|&value| params::safe_n_neighbors(n_samples, value)),
    );
    let cluster_sizes = dedup_preserving_order(
        grid.hdbscan_min_cluster_size_range
            .iter()
            .map(|&value| params::safe_min_cluster_size(n_samples, value)),
    );
    let safe_components = params::safe_n_components(n_samples, base.umap_n_components, x.ncols());

    info!(
        n_samples,
        n_neighbors = ?neighbors,
        min_cluster_sizes = ?cluster_sizes,
        max_combinations = grid.max_combinations,
        "starting grid search"
    );

    let mut best: Option<(BestParams, WinningFit)> = None;
    let mut evaluated = 0usize;
    let mut truncated = false;

    'grid: for &n_neighbors in &neighbors {
        debug!(n_neighbors, "fitting reducer for grid column");
        let reduction = reduce::reduce(x, safe_components);

        for &min_cluster_size in &cluster_sizes {
            for &requested_min_samples in &grid.hdbscan_min_samples_range {
                let min_samples =
                    params::safe_min_samples(n_samples, requested_min_samples, min_cluster_size);

                for &epsilon in &grid.hdbscan_epsilon_range {
                    if evaluated >= grid.max_combinations {
                        truncated = true;
                        break 'grid;
                    }
                    evaluated += 1;

                    let clustering = cluster::cluster(
                        &reduction.matrix,
                        base.hdbscan_metric,
                        min_cluster_size,
                        min_samples,
                    );
                    if clustering.fallback {
                        continue;
                    }
                    if clustering.labels.iter().all(|&label| label == -1) {
                        debug!("all points labeled outliers, skipping combination");
                        continue;
                    }

                    let Some(score) = dbcv::score_labeling(&reduction.matrix, &clustering.labels)
                    else {
                        continue;
                    };

                    let improved = match &best {
                        None => true,
                        Some((_, incumbent)) => score > incumbent.score,
                    };
                    if improved {
                        info!(
                            score,
                            n_neighbors, min_cluster_size, min_samples, epsilon,
                            "new best grid combination"
                        );

                        let mut config = base.clone();
                        config.umap_n_neighbors = n_neighbors;
                        config.umap_n_components = safe_components;
                        config.hdbscan_min_cluster_size = min_cluster_size;
                        config.hdbscan_min_samples = min_samples;
                        config.hdbscan_cluster_selection_epsilon = epsilon;

                        let best_params = BestParams {
                            umap: BestUmapParams {
                                n_neighbors,
                                n_components: safe_components,
                                min_dist: base.umap_min_dist,
                                metric: base.umap_metric,
                            },
                            hdbscan: BestHdbscanParams {
                                min_cluster_size,
                                min_samples,
                                epsilon,
                                metric: base.hdbscan_metric,
                            },
                        };
                        best = Some((
                            best_params,
                            WinningFit {
                                labels: clustering.labels,
                                reduced: reduction.matrix.clone(),
                                reduction_method: reduction.method,
                                config,
                                score,
                            },
                        ));
                    }
                }
            }
        }
    }

    match best {
        Some((best_params, fit)) => {
            info!(
                best_score = fit.score,
                evaluated, truncated, "grid search complete"
            );
            OptimizationOutcome {
                result: OptimizationResult {
                    used: true,
                    best_params: Some(best_params),
                    best_score: Some(fit.score),
                    evaluated_combinations: Some(evaluated),
                    truncated,
                    fallback: false,
                },
                fit: Some(fit),
            }
        }
        None => {
            warn!(evaluated, "no valid grid combination found, using safe defaults");
            OptimizationOutcome {
                result: OptimizationResult::fallback(evaluated, truncated),
                fit: None,
            }
        }
    }
}

fn dedup_preserving_order(values: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}
