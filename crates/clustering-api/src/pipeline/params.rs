//! Parameter clamps that keep the reducer and clusterer valid on small
//! batches. These are the only mechanism preventing low-n failures and are
//! applied before every fit, including inside the grid search.

use clustering_core::models::ClusteringConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeParams {
    pub n_neighbors: usize,
    pub n_components: usize,
    pub min_cluster_size: usize,
    pub min_samples: usize,
}

pub fn safe_n_neighbors(n_samples: usize, requested: usize) -> usize {
    if n_samples <= 3 {
        n_samples.saturating_sub(1).max(1)
    } else if n_samples <= 10 {
        requested.min(n_samples - 2)
    } else {
        requested.min(n_samples - 1)
    }
}

pub fn safe_n_components(n_samples: usize, requested: usize, n_features: usize) -> usize {
    requested
        .min(n_samples.saturating_sub(1))
        .min(n_features)
}

pub fn safe_min_cluster_size(n_samples: usize, requested: usize) -> usize {
    if n_samples <= 5 {
        2
    } else if n_samples <= 10 {
        requested.min(3)
    } else {
        requested
    }
}

pub fn safe_min_samples(n_samples: usize, requested: usize, min_cluster_size: usize) -> usize {
    requested
        .min(min_cluster_size.saturating_sub(1))
        .min(n_samples.saturating_sub(1))
        .max(1)
}

/// Clamp every requested parameter for the given batch size and width.
pub fn resolve(n_samples: usize, n_features: usize, config: &ClusteringConfig) -> SafeParams {
    let min_cluster_size = safe_min_cluster_size(n_samples, config.hdbscan_min_cluster_size);
    SafeParams {
        n_neighbors: safe_n_neighbors(n_samples, config.umap_n_neighbors),
        n_components: safe_n_components(n_samples, config.umap_n_components, n_features),
        min_cluster_size,
        min_samples: safe_min_samples(n_samples, config.hdbscan_min_samples, min_cluster_size),
    }
}
