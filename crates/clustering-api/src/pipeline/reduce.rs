//! Dimensionality reduction with a small-batch skip and a column-slice
//! fallback.
//!
//! The projection is a PCA fit; the UMAP-shaped tunables of the public config
//! (`n_neighbors`, `min_dist`, `metric`) are accepted and echoed but do not
//! alter the projection (see DESIGN.md).

use linfa::DatasetBase;
use linfa::traits::{Fit, Predict};
use linfa_reduction::Pca;
use ndarray::{Array2, s};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionMethod {
    /// A projection was fitted normally.
    Fitted,
    /// Batch of three or fewer points: fitting skipped, columns sliced.
    SkippedSmallBatch,
    /// The fit failed; columns sliced instead.
    FallbackSlice,
}

pub struct Reduction {
    pub matrix: Array2<f64>,
    pub method: ReductionMethod,
}

/// Project `x` down to `n_components` dimensions. Never fails: small batches
/// and fit errors both degrade to a column slice of the input.
pub fn reduce(x: &Array2<f64>, n_components: usize) -> Reduction {
    reduce_with(x, n_components, fit_projection)
}

fn reduce_with(
    x: &Array2<f64>,
    n_components: usize,
    fit: impl Fn(&Array2<f64>, usize) -> Result<Array2<f64>, String>,
) -> Reduction {
    let n_samples = x.nrows();
    let target = n_components.min(x.ncols());

    if n_samples <= 3 {
        warn!(
            n_samples,
            "batch too small for dimensionality reduction, slicing columns"
        );
        return Reduction {
            matrix: x.slice(s![.., ..target]).to_owned(),
            method: ReductionMethod::SkippedSmallBatch,
        };
    }

    match fit(x, target) {
        Ok(matrix) => Reduction {
            matrix,
            method: ReductionMethod::Fitted,
        },
        Err(error) => {
            warn!(%error, "dimensionality reduction failed, slicing columns");
            Reduction {
                matrix: x.slice(s![.., ..target]).to_owned(),
                method: ReductionMethod::FallbackSlice,
            }
        }
    }
}

fn fit_projection(x: &Array2<f64>, n_components: usize) -> Result<Array2<f64>, String> {
    let dataset = DatasetBase::from(x.clone());
    let pca = Pca::params(n_components)
        .fit(&dataset)
        .map_err(|e| e.to_string())?;
    Ok(pca.predict(x))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn tiny_batches_slice_columns() {
        let x = array![[1.0, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]];
        let reduction = reduce(&x, 2);

        assert_eq!(reduction.method, ReductionMethod::SkippedSmallBatch);
        assert_eq!(reduction.matrix, array![[1.0, 2.0], [5.0, 6.0]]);
    }

    #[test]
    fn tiny_batch_narrower_than_target_keeps_all_columns() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let reduction = reduce(&x, 10);

        assert_eq!(reduction.method, ReductionMethod::SkippedSmallBatch);
        assert_eq!(reduction.matrix.shape(), &[3, 2]);
    }

    #[test]
    fn fitted_projection_has_the_requested_shape() {
        let x = array![
            [1.0, 0.0, 0.0, 0.5],
            [0.9, 0.1, 0.0, 0.4],
            [0.0, 1.0, 0.2, 0.0],
            [0.1, 0.9, 0.1, 0.1],
            [0.5, 0.5, 0.9, 0.2],
            [0.4, 0.6, 1.0, 0.3],
        ];
        let reduction = reduce(&x, 2);

        assert_eq!(reduction.method, ReductionMethod::Fitted);
        assert_eq!(reduction.matrix.shape(), &[6, 2]);
        assert!(reduction.matrix.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn failed_fits_fall_back_to_a_column_slice() {
        let x = array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
            [10.0, 11.0, 12.0],
        ];
        let reduction = reduce_with(&x, 2, |_, _| Err("fit exploded".to_string()));

        assert_eq!(reduction.method, ReductionMethod::FallbackSlice);
        assert_eq!(
            reduction.matrix,
            array![[1.0, 2.0], [4.0, 5.0], [7.0, 8.0], [10.0, 11.0]]
        );
    }

    #[test]
    fn projection_is_deterministic() {
        let x = array![
            [1.0, 0.0, 0.0],
            [0.9, 0.1, 0.0],
            [0.0, 1.0, 0.2],
            [0.1, 0.9, 0.1],
            [0.5, 0.5, 0.9],
        ];
        let first = reduce(&x, 2);
        let second = reduce(&x, 2);
        assert_eq!(first.matrix, second.matrix);
    }
}
