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

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type for every crate in the workspace. Each component wraps
/// its own failure modes in the variants below rather than defining a
/// private error type, following a single-`Error`-enum-per-binary shape.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("StoreError# {0}")]
    Store(#[from] StoreError),
    #[error("SqlxError# {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("QueueError# {0}")]
    Queue(#[from] QueueError),
    #[error("IndexerError# {0}")]
    Indexer(#[from] IndexerError),
    #[error("HttpError# {0}")]
    Http(#[from] reqwest::Error),
    #[error("XmlError# {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("SerdeJsonError# {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("IoError# {0}")]
    Io(#[from] std::io::Error),
    #[error("Message# {0}")]
    Message(String),
}

#[derive(ThisError, Debug)]
pub enum StoreError {
    #[error("the backing store connection is unavailable: {0}")]
    Unavailable(String),
    #[error("row not found: {0}")]
    NotFound(String),
}

#[derive(ThisError, Debug)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
    #[error("message receipt is no longer valid: {0}")]
    InvalidReceipt(String),
}

/// Raised by an [`Indexer`](indexer crate) batch call. Carries enough
/// context for the caller to record a `ProcessingError` without reverting
/// the `ids` table — the `ids` table stays authoritative and a later
/// reconciliation run retries the same diff.
#[derive(ThisError, Debug)]
#[error("indexer batch starting at {batch_start} failed: {cause}")]
pub struct IndexerError {
    pub batch_start: usize,
    pub cause: String,
}
