//! Configuration for the clustering service.
//!
//! All configuration is loaded from environment variables at startup.
//! Supports airgapped deployments through the HF_HOME cache directory hint.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub auth: AuthConfig,
    pub log_format: LogFormat,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

/// Encoder and validation configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// fastembed model code of the text encoder
    pub embedding_model_name: String,
    /// Width every embedding must have to pass validation
    pub expected_embedding_dimensions: usize,
    /// Encoder batch size
    pub batch_size: usize,
    /// Token truncation length for the encoder
    pub max_text_length: usize,
    /// Optional task prefix prepended to every text before encoding
    /// (e.g. "query: " for e5-family models)
    pub task_prefix: Option<String>,
    /// Model cache directory (HF_HOME)
    pub hf_home: Option<PathBuf>,
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Expected token; requests are unauthenticated when unset
    pub api_token: Option<String>,
}

/// Log format type
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// This should be called once at application startup.
    pub fn from_env() -> Result<Self> {
        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "json".to_string())
            .to_lowercase()
            .as_str()
        {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        };

        Ok(Self {
            server: ServerConfig::from_env()?,
            model: ModelConfig::from_env()?,
            auth: AuthConfig::from_env(),
            log_format,
        })
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            hostname: env::var("HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .context("PORT must be a number")?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }
}

impl ModelConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            embedding_model_name: env::var("EMBEDDING_MODEL_NAME")
                .unwrap_or_else(|_| "intfloat/multilingual-e5-small".to_string()),
            expected_embedding_dimensions: env::var("EXPECTED_EMBEDDING_DIMENSIONS")
                .unwrap_or_else(|_| "384".to_string())
                .parse()
                .context("EXPECTED_EMBEDDING_DIMENSIONS must be a number")?,
            batch_size: env::var("BATCH_SIZE")
                .unwrap_or_else(|_| "32".to_string())
                .parse()
                .context("BATCH_SIZE must be a number")?,
            max_text_length: env::var("MAX_TEXT_LENGTH")
                .unwrap_or_else(|_| "512".to_string())
                .parse()
                .context("MAX_TEXT_LENGTH must be a number")?,
            task_prefix: env::var("TASK_PREFIX").ok().filter(|s| !s.is_empty()),
            hf_home: env::var("HF_HOME").ok().map(PathBuf::from),
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            api_token: env::var("API_TOKEN").ok().filter(|s| !s.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_fields() {
        let model = ModelConfig {
            embedding_model_name: "intfloat/multilingual-e5-small".to_string(),
            expected_embedding_dimensions: 384,
            batch_size: 32,
            max_text_length: 512,
            task_prefix: Some("query: ".to_string()),
            hf_home: Some(PathBuf::from("/tmp/hf_cache")),
        };

        assert_eq!(model.expected_embedding_dimensions, 384);
        assert_eq!(model.batch_size, 32);
        assert_eq!(model.hf_home, Some(PathBuf::from("/tmp/hf_cache")));
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::Json, LogFormat::Json);
        assert_ne!(LogFormat::Json, LogFormat::Pretty);
    }

    #[test]
    fn auth_config_treats_empty_token_as_unset() {
        let auth = AuthConfig { api_token: None };
        assert!(auth.api_token.is_none());
    }
}
