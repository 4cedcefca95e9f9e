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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

pub struct NewUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Site {
    pub site_url: String,
    pub user_id: String,
    pub process_interval_hours: i64,
    pub last_processed: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteStatus {
    pub site_url: String,
    pub is_active: bool,
    pub last_processed: Option<DateTime<Utc>>,
    pub total_files: i64,
    pub manual_files: i64,
    pub total_ids: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FileRecord {
    pub site_url: String,
    pub user_id: String,
    pub file_url: String,
    pub schema_map: Option<String>,
    pub last_read_time: Option<DateTime<Utc>>,
    pub number_of_items: i64,
    pub is_manual: bool,
    pub is_active: bool,
}

/// One candidate entry discovered from a schema map: the payload URL and its
/// optional `contentType` attribute. Scoped to a single `(site, schema_map)`
/// pair — see `diff_site_files`.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub file_url: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    ExtractionFailed,
    NoIdsFound,
    VectorDbAddFailed,
    VectorDbDeleteFailed,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::ExtractionFailed => "extraction_failed",
            ErrorType::NoIdsFound => "no_ids_found",
            ErrorType::VectorDbAddFailed => "vector_db_add_failed",
            ErrorType::VectorDbDeleteFailed => "vector_db_delete_failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProcessingErrorRecord {
    pub id: i64,
    pub file_url: String,
    pub user_id: String,
    pub error_type: String,
    pub error_message: String,
    pub error_details: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Generates a cryptographically random, globally-unique opaque API key
/// for a newly-created user.
pub fn generate_api_key() -> String {
    use rand::Rng;
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..48)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Strips scheme, leading `www.`, and a trailing `/` from a site URL so that
/// `https://www.example.com/` and `example.com` key the same row.
pub fn normalize_site_url(site_url: &str) -> String {
    let without_scheme = site_url
        .strip_prefix("https://")
        .or_else(|| site_url.strip_prefix("http://"))
        .unwrap_or(site_url);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    without_www.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_www_and_trailing_slash() {
        assert_eq!(normalize_site_url("https://www.imdb.com/"), "imdb.com");
        assert_eq!(normalize_site_url("http://example.com"), "example.com");
        assert_eq!(normalize_site_url("www.site.org"), "site.org");
        assert_eq!(normalize_site_url("site.com"), "site.com");
    }
}
