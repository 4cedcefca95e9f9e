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

//! Embedding generation, split out from the upload path the same way the
//! original kept `EmbeddingWrapper` separate from `VectorDB`. The concrete
//! embedding vendor is out of scope; [`HttpEmbedding`] speaks a generic
//! REST shape and [`DummyEmbedding`] stands in when no endpoint is
//! configured, matching the original's no-credentials fallback to a
//! constant-dimension zero vector.

use async_trait::async_trait;
use errors::Result;
use serde::{Deserialize, Serialize};

const EMBEDDING_DIMENSIONS: usize = 1536;

#[async_trait]
pub trait EmbeddingProvider: Sync + Send + 'static {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Used when no embedding endpoint is configured; returns a constant-shape
/// zero vector so the indexing pipeline stays exercisable in development.
pub struct DummyEmbedding;

#[async_trait]
impl EmbeddingProvider for DummyEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; EMBEDDING_DIMENSIONS]).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponseItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingResponseItem>,
}

pub struct HttpEmbedding {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    deployment: String,
}

impl HttpEmbedding {
    pub fn new() -> Self {
        let cfg = config::get_config();
        Self {
            client: reqwest::Client::new(),
            endpoint: cfg.indexer.embedding_endpoint.clone(),
            api_key: cfg.indexer.embedding_api_key.clone(),
            deployment: cfg.indexer.embedding_deployment.clone(),
        }
    }
}

impl Default for HttpEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&EmbeddingRequest { input: texts, model: &self.deployment })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;
        Ok(resp.data.into_iter().map(|item| item.embedding).collect())
    }
}
