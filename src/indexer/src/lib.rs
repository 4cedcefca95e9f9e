// Copyright 2026 the crawler authors.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Opaque vector-search indexer. `Indexer` is deliberately thin: a hash-keyed
//! upsert/delete batch contract against a backend whose concrete vendor is
//! an external collaborator out of scope for this crate (SPEC_FULL.md §4.3).
//! [`SearchIndexer`] is the one shipped implementation, speaking a generic
//! REST shape over `reqwest` the way the original spoke Azure Cognitive
//! Search, with a pluggable [`EmbeddingProvider`] standing in for the
//! concrete embedding vendor.

use async_trait::async_trait;
use chrono::Utc;
use errors::{IndexerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod embedding;

pub use embedding::{DummyEmbedding, EmbeddingProvider, HttpEmbedding};

/// One object to index: its opaque id (the original `@id`/URL), the owning
/// site, and the JSON-LD object itself.
#[derive(Debug, Clone)]
pub struct IndexItem {
    pub id: String,
    pub site: String,
    pub payload: Value,
}

/// The document actually uploaded to the backend, per SPEC_FULL.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub url: String,
    pub site: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub content: String,
    pub timestamp: String,
    pub embedding: Vec<f32>,
}

/// Hashes `id` to the backend's restricted key alphabet: the first 32 hex
/// chars (128 bits) of its SHA-256 digest.
pub fn hash_key(id: &str) -> String {
    sha256::digest(id)[..32].to_string()
}

fn object_type(payload: &Value) -> String {
    match payload.get("@type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        _ => "Unknown".to_string(),
    }
}

fn stringify_content(payload: &Value, char_budget: usize) -> String {
    let mut parts = Vec::new();
    if let Value::Object(map) = payload {
        for (key, value) in map {
            match value {
                Value::String(s) => parts.push(format!("{key}: {s}")),
                Value::Array(_) | Value::Object(_) => {
                    let mut encoded = value.to_string();
                    encoded.truncate(encoded.char_indices().take(500).last().map_or(0, |(i, c)| i + c.len_utf8()));
                    parts.push(format!("{key}: {encoded}"));
                }
                _ => {}
            }
        }
    }
    let mut content = parts.join(" ");
    content.truncate(content.char_indices().take(char_budget).last().map_or(0, |(i, c)| i + c.len_utf8()));
    content
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Builds the uploaded [`Document`] for one item, given its already-computed
/// embedding vector.
pub fn prepare_document(item: &IndexItem, embedding: Vec<f32>, stored_content_char_budget: usize) -> Document {
    Document {
        id: hash_key(&item.id),
        url: item.id.clone(),
        site: item.site.clone(),
        object_type: object_type(&item.payload),
        content: stringify_content(&item.payload, stored_content_char_budget),
        timestamp: Utc::now().to_rfc3339(),
        embedding,
    }
}

#[async_trait]
pub trait Indexer: Sync + Send + 'static {
    async fn add(&self, id: &str, site: &str, payload: &Value) -> Result<()> {
        self.add_batch(&[IndexItem { id: id.to_string(), site: site.to_string(), payload: payload.clone() }]).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_batch(&[id.to_string()]).await
    }

    async fn add_batch(&self, items: &[IndexItem]) -> Result<()>;
    async fn delete_batch(&self, ids: &[String]) -> Result<()>;
}

/// Selects the embedding provider from config and returns the shipped
/// REST-backed indexer.
pub fn connect() -> Box<dyn Indexer> {
    let cfg = config::get_config();
    let embedding: Box<dyn EmbeddingProvider> = if cfg.indexer.embedding_endpoint.is_empty() {
        Box::new(DummyEmbedding)
    } else {
        Box::new(HttpEmbedding::new())
    };
    Box::new(SearchIndexer::new(embedding))
}

pub struct SearchIndexer {
    client: reqwest::Client,
    endpoint: String,
    index: String,
    api_key: String,
    batch_size: usize,
    content_char_budget: usize,
    stored_content_char_budget: usize,
    embedding: Box<dyn EmbeddingProvider>,
}

impl SearchIndexer {
    pub fn new(embedding: Box<dyn EmbeddingProvider>) -> Self {
        let cfg = config::get_config();
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.indexer.search_endpoint.clone(),
            index: cfg.indexer.search_index.clone(),
            api_key: cfg.indexer.search_api_key.clone(),
            batch_size: cfg.indexer.batch_size,
            content_char_budget: cfg.indexer.content_char_budget,
            stored_content_char_budget: cfg.indexer.stored_content_char_budget,
            embedding,
        }
    }

    fn docs_url(&self) -> String {
        format!("{}/indexes/{}/docs/index", self.endpoint.trim_end_matches('/'), self.index)
    }

    async fn upload(&self, documents: Vec<Document>, batch_start: usize) -> Result<()> {
        if self.endpoint.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.docs_url())
            .header("api-key", &self.api_key)
            .json(&serde_json::json!({ "value": documents }))
            .send()
            .await
            .map_err(|e| IndexerError { batch_start, cause: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(IndexerError { batch_start, cause: format!("backend returned {}", resp.status()) }.into());
        }
        Ok(())
    }

    async fn delete_ids(&self, hashed_ids: Vec<String>, batch_start: usize) -> Result<()> {
        if self.endpoint.is_empty() {
            return Ok(());
        }
        let documents: Vec<Value> = hashed_ids
            .into_iter()
            .map(|id| serde_json::json!({ "@search.action": "delete", "id": id }))
            .collect();
        let resp = self
            .client
            .post(self.docs_url())
            .header("api-key", &self.api_key)
            .json(&serde_json::json!({ "value": documents }))
            .send()
            .await
            .map_err(|e| IndexerError { batch_start, cause: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(IndexerError { batch_start, cause: format!("backend returned {}", resp.status()) }.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Indexer for SearchIndexer {
    async fn add_batch(&self, items: &[IndexItem]) -> Result<()> {
        for (batch_start, chunk) in items.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = chunk
                .iter()
                .map(|item| truncate_chars(&item.payload.to_string(), self.content_char_budget))
                .collect();
            let embeddings = self
                .embedding
                .embed_batch(&texts)
                .await
                .map_err(|e| IndexerError { batch_start: batch_start * self.batch_size, cause: e.to_string() })?;
            let documents: Vec<Document> = chunk
                .iter()
                .zip(embeddings)
                .map(|(item, embedding)| prepare_document(item, embedding, self.stored_content_char_budget))
                .collect();
            self.upload(documents, batch_start * self.batch_size).await?;
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        for (batch_start, chunk) in ids.chunks(self.batch_size).enumerate() {
            let hashed: Vec<String> = chunk.iter().map(|id| hash_key(id)).collect();
            self.delete_ids(hashed, batch_start * self.batch_size).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_key_is_32_hex_chars() {
        let key = hash_key("https://example.com/a.json#Widget");
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_key_is_stable_for_the_same_id() {
        assert_eq!(hash_key("https://example.com/a"), hash_key("https://example.com/a"));
        assert_ne!(hash_key("https://example.com/a"), hash_key("https://example.com/b"));
    }

    #[test]
    fn object_type_joins_array_variants() {
        let payload = serde_json::json!({ "@type": ["Product", "Offer"] });
        assert_eq!(object_type(&payload), "Product, Offer");
    }

    #[test]
    fn object_type_defaults_to_unknown() {
        let payload = serde_json::json!({ "name": "no type here" });
        assert_eq!(object_type(&payload), "Unknown");
    }

    #[test]
    fn stringify_content_truncates_to_budget() {
        let payload = serde_json::json!({ "name": "a".repeat(50) });
        let content = stringify_content(&payload, 10);
        assert_eq!(content.chars().count(), 10);
    }

    #[test]
    fn prepare_document_hashes_id_and_keeps_raw_url() {
        let item = IndexItem {
            id: "https://example.com/a.json".into(),
            site: "example.com".into(),
            payload: serde_json::json!({ "@type": "Product", "name": "Widget" }),
        };
        let doc = prepare_document(&item, vec![0.0; 4], 10_000);
        assert_eq!(doc.id, hash_key(&item.id));
        assert_eq!(doc.url, item.id);
        assert_eq!(doc.object_type, "Product");
    }
}
