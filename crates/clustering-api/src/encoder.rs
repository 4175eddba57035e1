//! Process-wide text encoder backed by fastembed ONNX models.
//!
//! The model is loaded lazily on first use; concurrent first callers all
//! await the same load. A failed load is sticky: every later call reports the
//! encoder as unavailable until the process restarts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::config::ModelConfig;
use crate::pipeline::PipelineError;

pub struct Encoder {
    model: Mutex<TextEmbedding>,
    model_code: String,
    dimensions: usize,
}

/// Lifecycle of the process-wide encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    NotLoaded,
    Loaded,
    Failed,
}

static ENCODER: OnceCell<Arc<Encoder>> = OnceCell::const_new();
static LOAD_FAILED: AtomicBool = AtomicBool::new(false);

/// Resolve a model code string to a fastembed model and its output width.
fn resolve_embedding_model(model_code: &str) -> Result<(EmbeddingModel, usize), String> {
    TextEmbedding::list_supported_models()
        .iter()
        .find(|m| m.model_code == model_code)
        .map(|m| (m.model.clone(), m.dim))
        .ok_or_else(|| format!("unknown embedding model: {model_code}"))
}

fn load_encoder(config: &ModelConfig) -> Result<Encoder, String> {
    let (embedding_model, dimensions) = resolve_embedding_model(&config.embedding_model_name)?;

    let mut options =
        TextInitOptions::new(embedding_model).with_max_length(config.max_text_length);
    if let Some(ref hf_home) = config.hf_home {
        options = options.with_cache_dir(hf_home.clone());
    }

    let start = Instant::now();
    let model = TextEmbedding::try_new(options).map_err(|e| e.to_string())?;

    info!(
        model_code = %config.embedding_model_name,
        dimensions,
        init_secs = start.elapsed().as_secs_f64(),
        "Loaded embedding model"
    );

    Ok(Encoder {
        model: Mutex::new(model),
        model_code: config.embedding_model_name.clone(),
        dimensions,
    })
}

/// Get the encoder, loading it on first use. Load happens on a blocking
/// thread; concurrent first callers block until it completes.
pub async fn get_or_load(config: &ModelConfig) -> Result<Arc<Encoder>, PipelineError> {
    if LOAD_FAILED.load(Ordering::Relaxed) {
        return Err(PipelineError::EncoderUnavailable(
            "embedding model failed to load".to_string(),
        ));
    }

    let model_config = config.clone();
    ENCODER
        .get_or_try_init(|| async move {
            let result = tokio::task::spawn_blocking(move || load_encoder(&model_config)).await;
            match result {
                Ok(Ok(encoder)) => Ok(Arc::new(encoder)),
                Ok(Err(message)) => {
                    LOAD_FAILED.store(true, Ordering::Relaxed);
                    error!(error = %message, "Failed to load embedding model");
                    Err(message)
                }
                Err(join_err) => {
                    LOAD_FAILED.store(true, Ordering::Relaxed);
                    error!(error = %join_err, "Embedding model load task panicked");
                    Err(join_err.to_string())
                }
            }
        })
        .await
        .cloned()
        .map_err(PipelineError::EncoderUnavailable)
}

/// Current encoder lifecycle state, for health reporting.
pub fn load_state() -> EncoderState {
    if ENCODER.get().is_some() {
        EncoderState::Loaded
    } else if LOAD_FAILED.load(Ordering::Relaxed) {
        EncoderState::Failed
    } else {
        EncoderState::NotLoaded
    }
}

impl Encoder {
    pub fn model_code(&self) -> &str {
        &self.model_code
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed a batch of texts on a blocking thread. An optional task prefix
    /// is prepended to every text before tokenization; outputs are
    /// L2-normalized unless `normalize` is false.
    pub async fn embed(
        self: &Arc<Self>,
        texts: Vec<String>,
        batch_size: usize,
        task_prefix: Option<&str>,
        normalize: bool,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let texts: Vec<String> = match task_prefix {
            Some(prefix) => texts
                .into_iter()
                .map(|text| format!("{prefix}{text}"))
                .collect(),
            None => texts,
        };
        let text_count = texts.len();

        let encoder = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let mut model = encoder
                .model
                .lock()
                .map_err(|e| PipelineError::Internal(format!("encoder lock poisoned: {e}")))?;

            let embed_start = Instant::now();
            let mut embeddings = model
                .embed(texts, Some(batch_size))
                .map_err(|e| PipelineError::Internal(format!("embedding generation failed: {e}")))?;

            if normalize {
                for row in &mut embeddings {
                    normalize_l2(row);
                }
            }

            debug!(
                text_count,
                embed_secs = embed_start.elapsed().as_secs_f64(),
                "Computed embeddings"
            );

            Ok(embeddings)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("embedding task join error: {e}")))?
    }
}

/// L2-normalize one vector in place. Zero-length vectors are kept as-is.
fn normalize_l2(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|&x| x * x).sum::<f32>().sqrt();
    if norm > 1e-10 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_l2_produces_unit_vectors() {
        let mut vector = vec![3.0, 4.0];
        normalize_l2(&mut vector);
        let norm: f32 = vector.iter().map(|&x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_l2_keeps_zero_vectors() {
        let mut vector = vec![0.0, 0.0, 0.0];
        normalize_l2(&mut vector);
        assert_eq!(vector, vec![0.0, 0.0, 0.0]);
    }
}
