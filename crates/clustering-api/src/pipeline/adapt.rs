//! Normalization of detected input shapes into the common internal form.

use clustering_core::models::{
    ArticleItem, ExtendedVectorItem, InputFormat, NormalizedItem, PlainTextItem, SimpleVectorItem,
    VectorWithTextItem,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::PipelineError;

/// Article text previews are capped at this many characters.
const ARTICLE_PREVIEW_CHARS: usize = 500;

pub struct NormalizedBatch {
    pub items: Vec<NormalizedItem>,
    /// False only for plain text, which must route through the encoder.
    pub has_embeddings: bool,
}

/// Parse every raw item as the detected variant and normalize it.
pub fn adapt_items(
    items: &[Map<String, Value>],
    format: InputFormat,
) -> Result<NormalizedBatch, PipelineError> {
    let mut normalized = Vec::with_capacity(items.len());

    for (index, raw) in items.iter().enumerate() {
        let item = match format {
            InputFormat::SimpleVector => from_simple(parse(index, raw)?),
            InputFormat::ExtendedVector => from_extended(parse(index, raw)?),
            InputFormat::Article => from_article(parse(index, raw)?),
            InputFormat::VectorWithText => from_vector_with_text(parse(index, raw)?),
            InputFormat::PlainText => from_plain_text(parse(index, raw)?),
            InputFormat::Unknown => {
                return Err(PipelineError::BadInputFormat(
                    "cannot normalize items of unknown format".to_string(),
                ));
            }
        };
        normalized.push(item);
    }

    Ok(NormalizedBatch {
        items: normalized,
        has_embeddings: format != InputFormat::PlainText,
    })
}

fn parse<T: DeserializeOwned>(index: usize, raw: &Map<String, Value>) -> Result<T, PipelineError> {
    serde_json::from_value(Value::Object(raw.clone())).map_err(|e| {
        PipelineError::BadInputFormat(format!(
            "item {index} does not match the detected batch shape: {e}"
        ))
    })
}

fn from_simple(item: SimpleVectorItem) -> NormalizedItem {
    let mut metadata = Map::new();
    metadata.insert("id".to_string(), item.id.clone());

    NormalizedItem {
        id: item.id,
        text: String::new(),
        embedding: item.embedding,
        metadata,
    }
}

fn from_extended(item: ExtendedVectorItem) -> NormalizedItem {
    let text = match item.title.as_deref() {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => format!("Article {}", id_display(&item.id)),
    };

    let mut metadata = Map::new();
    insert_opt(&mut metadata, "title", item.title);
    insert_opt(&mut metadata, "url", item.url);
    insert_opt(&mut metadata, "publishDate", item.publish_date);
    insert_opt(&mut metadata, "content", item.content);
    insert_opt(&mut metadata, "status", item.status);

    NormalizedItem {
        id: item.id,
        text,
        embedding: item.embedding,
        metadata,
    }
}

fn from_article(item: ArticleItem) -> NormalizedItem {
    let preview: String = item.content.chars().take(ARTICLE_PREVIEW_CHARS).collect();
    let text = format!("{}\n\n{}...", item.title, preview);

    let mut metadata = Map::new();
    metadata.insert("title".to_string(), Value::from(item.title));
    metadata.insert("content".to_string(), Value::from(item.content));
    metadata.insert("url".to_string(), Value::from(item.url));
    metadata.insert("publishDate".to_string(), Value::from(item.publish_date));
    insert_opt(&mut metadata, "status", item.status);
    insert_opt(&mut metadata, "contentFileKey", item.content_file_key);
    insert_opt(&mut metadata, "processedAt", item.processed_at);

    NormalizedItem {
        id: item.id,
        text,
        embedding: item.embedding,
        metadata,
    }
}

fn from_vector_with_text(item: VectorWithTextItem) -> NormalizedItem {
    NormalizedItem {
        id: item.id,
        text: item.text,
        embedding: item.embedding,
        metadata: item.metadata,
    }
}

fn from_plain_text(item: PlainTextItem) -> NormalizedItem {
    NormalizedItem {
        id: item.id,
        text: item.text,
        embedding: Vec::new(),
        metadata: item.metadata,
    }
}

fn insert_opt(metadata: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        metadata.insert(key.to_string(), Value::from(value));
    }
}

fn id_display(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
