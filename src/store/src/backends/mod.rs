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

use std::collections::HashSet;

use async_trait::async_trait;
use errors::Result;

use crate::types::{
    DiscoveredFile, ErrorType, FileRecord, NewUser, Site, SiteStatus, User,
};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

/// Durable relational state for users, sites, files, ids and processing
/// errors. One implementation per backend (sqlite/postgres/mysql); callers
/// only ever see `Box<dyn Store>`.
///
/// `diff_site_files` and `diff_file_ids` are the two convergence primitives
/// described in SPEC_FULL.md §4.1 — every other method is CRUD around them.
#[async_trait]
pub trait Store: Sync + Send + 'static {
    async fn provision(&self) -> Result<()>;

    async fn add_user(&self, user: NewUser) -> Result<()>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>>;
    async fn update_last_login(&self, user_id: &str) -> Result<()>;

    async fn add_site(&self, site_url: &str, user_id: &str, interval_hours: i64) -> Result<()>;
    /// Hard-deletes a site along with its files and ids, returning the file
    /// URLs that were removed so the caller can fan out removal jobs for any
    /// in-flight work (the core pipeline otherwise only ever soft-deletes
    /// files via `diff_site_files`).
    async fn remove_site(&self, site_url: &str, user_id: &str) -> Result<Vec<String>>;
    async fn get_due_sites(&self) -> Result<Vec<Site>>;
    async fn update_site_last_processed(&self, site_url: &str, user_id: &str) -> Result<()>;
    async fn get_site_status(&self, user_id: &str) -> Result<Vec<SiteStatus>>;

    async fn list_site_files(&self, site_url: &str, user_id: &str) -> Result<Vec<FileRecord>>;
    async fn file_exists(&self, file_url: &str, user_id: &str) -> Result<bool>;
    async fn add_manual_schema_file(
        &self,
        site_url: &str,
        user_id: &str,
        file_url: &str,
    ) -> Result<()>;
    /// Converges the active files for `(site_url, user_id, schema_map)`
    /// against `discovered`. Additions are upserted with `is_active = true`
    /// (reactivating tombstones); removals are marked `is_active = false`,
    /// not deleted — their `ids` rows persist until a removal job drains
    /// them. Scoped to one schema map: files belonging to a different map on
    /// the same site are untouched.
    async fn diff_site_files(
        &self,
        site_url: &str,
        user_id: &str,
        schema_map: &str,
        discovered: &[DiscoveredFile],
    ) -> Result<(Vec<String>, Vec<String>)>;
    /// Hard-deletes a single file row. Only called from the
    /// `process_removed_file` path, after the worker has already cleared
    /// the index and the `ids` table for it.
    async fn delete_file(&self, file_url: &str, user_id: &str) -> Result<()>;

    async fn list_file_ids(&self, file_url: &str, user_id: &str) -> Result<HashSet<String>>;
    /// Converges the `ids` rows for `(file_url, user_id)` against
    /// `new_ids`, then updates `last_read_time` and `number_of_items`.
    /// An empty `new_ids` takes the wildcard delete path.
    async fn diff_file_ids(
        &self,
        file_url: &str,
        user_id: &str,
        new_ids: &HashSet<String>,
    ) -> Result<(Vec<String>, Vec<String>)>;
    /// Number of files (for this user) that currently reference `id`. Must
    /// observe the writes of an immediately preceding `diff_file_ids` call.
    async fn ref_count(&self, id: &str, user_id: &str) -> Result<i64>;

    async fn log_error(
        &self,
        file_url: &str,
        user_id: &str,
        error_type: ErrorType,
        message: &str,
        details: Option<&str>,
    ) -> Result<()>;
    async fn clear_errors(&self, file_url: &str, user_id: &str) -> Result<()>;
}

/// Selects the configured backend and wraps it with per-site serialization
/// (see [`crate::SiteLocks`]).
pub fn connect() -> Box<dyn Store> {
    let cfg = config::get_config();
    match cfg.store.backend.as_str() {
        "postgres" | "postgresql" => Box::<postgres::PostgresStore>::default(),
        "mysql" => Box::<mysql::MysqlStore>::default(),
        _ => Box::<sqlite::SqliteStore>::default(),
    }
}
