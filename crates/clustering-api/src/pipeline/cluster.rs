//! Density-based clustering over the reduced projection.

use clustering_core::models::ClusterMetric;
use hdbscan::{DistanceMetric, Hdbscan, HdbscanHyperParams};
use ndarray::Array2;
use tracing::warn;

pub struct Clustering {
    /// -1 marks outliers; cluster ids start at 0, in backend order.
    pub labels: Vec<i32>,
    pub fallback: bool,
}

/// Cluster the reduced rows. Batches of three or fewer points become a
/// single cluster without fitting; a backend failure degrades to the same
/// single-cluster labeling with the fallback flag set.
pub fn cluster(
    reduced: &Array2<f64>,
    metric: ClusterMetric,
    min_cluster_size: usize,
    min_samples: usize,
) -> Clustering {
    let n_samples = reduced.nrows();

    if n_samples <= 3 {
        warn!(
            n_samples,
            "batch too small for density clustering, assigning a single cluster"
        );
        return Clustering {
            labels: vec![0; n_samples],
            fallback: false,
        };
    }

    let rows: Vec<Vec<f32>> = reduced
        .outer_iter()
        .map(|row| row.iter().map(|&v| v as f32).collect())
        .collect();

    let hyper_params = HdbscanHyperParams::builder()
        .min_cluster_size(min_cluster_size)
        .min_samples(min_samples)
        .allow_single_cluster(false)
        .dist_metric(dist_metric(metric))
        .build();

    let clusterer = Hdbscan::new(&rows, hyper_params);
    match clusterer.cluster() {
        Ok(labels) => Clustering {
            labels,
            fallback: false,
        },
        Err(error) => {
            warn!(%error, "density clustering failed, assigning a single cluster");
            Clustering {
                labels: vec![0; n_samples],
                fallback: true,
            }
        }
    }
}

fn dist_metric(metric: ClusterMetric) -> DistanceMetric {
    match metric {
        ClusterMetric::Euclidean => DistanceMetric::Euclidean,
        ClusterMetric::Manhattan => DistanceMetric::Manhattan,
        // The backend has no chebyshev metric; euclidean is the closest fit.
        ClusterMetric::Chebyshev => {
            warn!("chebyshev metric is not supported by the clustering backend, using euclidean");
            DistanceMetric::Euclidean
        }
    }
}
