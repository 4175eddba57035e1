//! Embedding matrix validation.

use ndarray::Array2;
use tracing::warn;

use super::PipelineError;

/// Validate embedding rows and assemble them into a dense matrix. Enforces a
/// non-empty batch, a uniform expected width, and finite values. Unusually
/// large magnitudes only warn.
pub fn validate_embeddings(
    rows: &[Vec<f32>],
    expected_dim: usize,
) -> Result<Array2<f32>, PipelineError> {
    if rows.is_empty() {
        return Err(PipelineError::InvalidEmbeddings(
            "embedding matrix is empty".to_string(),
        ));
    }

    let mut data = Vec::with_capacity(rows.len() * expected_dim);
    for (index, row) in rows.iter().enumerate() {
        if row.len() != expected_dim {
            return Err(PipelineError::InvalidEmbeddings(format!(
                "item {index}: expected a {expected_dim}-dimensional embedding, got {}",
                row.len()
            )));
        }
        if row.iter().any(|value| !value.is_finite()) {
            return Err(PipelineError::InvalidEmbeddings(format!(
                "item {index}: embedding contains NaN or infinite values"
            )));
        }
        data.extend_from_slice(row);
    }

    let matrix = Array2::from_shape_vec((rows.len(), expected_dim), data)
        .map_err(|e| PipelineError::InvalidEmbeddings(e.to_string()))?;

    if matrix.iter().any(|value| value.abs() > 100.0) {
        warn!("embedding values exceed |100|; inputs may not be normalized");
    }

    Ok(matrix)
}
