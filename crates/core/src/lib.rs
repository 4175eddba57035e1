//! Shared types for the text clustering service.
//!
//! Holds the wire schemas exchanged with the upstream AI worker and the
//! downstream brief pipeline, plus the keyword extraction used for cluster
//! content analysis.

pub mod keywords;
pub mod models;
