//! Input format detection over raw JSON items.

use clustering_core::models::InputFormat;
use serde_json::{Map, Value};

use super::PipelineError;

const ARTICLE_KEYS: [&str; 4] = ["title", "content", "url", "publishDate"];

/// Classify one raw item by its keys. Rules are evaluated in order; the
/// first match wins.
pub fn detect_item_format(item: &Map<String, Value>) -> InputFormat {
    let has_embedding = item.contains_key("embedding");

    if has_embedding && item.len() == 2 && item.contains_key("id") {
        return InputFormat::SimpleVector;
    }
    if has_embedding && ARTICLE_KEYS.iter().all(|key| item.contains_key(*key)) {
        return InputFormat::Article;
    }
    if has_embedding && item.contains_key("text") {
        return InputFormat::VectorWithText;
    }
    if has_embedding && item.len() <= 7 {
        return InputFormat::ExtendedVector;
    }
    if !has_embedding && item.contains_key("text") {
        return InputFormat::PlainText;
    }
    InputFormat::Unknown
}

/// Classify a batch. The first item fixes the tag; items are required to be
/// homogeneous.
pub fn detect_batch_format(items: &[Map<String, Value>]) -> Result<InputFormat, PipelineError> {
    let first = items.first().ok_or_else(|| {
        PipelineError::InvalidEmbeddings("received an empty item batch".to_string())
    })?;

    let format = detect_item_format(first);
    if format == InputFormat::Unknown {
        return Err(PipelineError::BadInputFormat(
            "could not classify input items; expected vectors, articles, or texts".to_string(),
        ));
    }

    for (index, item) in items.iter().enumerate().skip(1) {
        let other = detect_item_format(item);
        if other != format {
            return Err(PipelineError::HeterogeneousInput(format!(
                "item {index} looks like {other} but the batch was detected as {format}"
            )));
        }
    }

    Ok(format)
}
