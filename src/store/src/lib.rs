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

//! Durable relational state for users, sites, files, ids and processing
//! errors (SPEC_FULL.md §4.1). `connect()` selects a backend from config
//! and wraps it with per-site serialization so every caller gets I3 for
//! free.

use std::collections::HashSet;

use async_trait::async_trait;
use errors::Result;

pub mod backends;
pub mod site_locks;
pub mod types;

pub use backends::Store;
pub use site_locks::SiteLocks;
pub use types::*;

/// Wraps an inner `Store` with a [`SiteLocks`] map, serializing
/// `diff_site_files` per `(site_url, user_id)`. Every other call passes
/// straight through.
struct LockedStore {
    inner: Box<dyn Store>,
    locks: SiteLocks,
}

#[async_trait]
impl Store for LockedStore {
    async fn provision(&self) -> Result<()> {
        self.inner.provision().await
    }

    async fn add_user(&self, user: NewUser) -> Result<()> {
        self.inner.add_user(user).await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>> {
        self.inner.get_user_by_api_key(api_key).await
    }

    async fn update_last_login(&self, user_id: &str) -> Result<()> {
        self.inner.update_last_login(user_id).await
    }

    async fn add_site(&self, site_url: &str, user_id: &str, interval_hours: i64) -> Result<()> {
        self.inner.add_site(site_url, user_id, interval_hours).await
    }

    async fn remove_site(&self, site_url: &str, user_id: &str) -> Result<Vec<String>> {
        self.inner.remove_site(site_url, user_id).await
    }

    async fn get_due_sites(&self) -> Result<Vec<Site>> {
        self.inner.get_due_sites().await
    }

    async fn update_site_last_processed(&self, site_url: &str, user_id: &str) -> Result<()> {
        self.inner.update_site_last_processed(site_url, user_id).await
    }

    async fn get_site_status(&self, user_id: &str) -> Result<Vec<SiteStatus>> {
        self.inner.get_site_status(user_id).await
    }

    async fn list_site_files(&self, site_url: &str, user_id: &str) -> Result<Vec<FileRecord>> {
        self.inner.list_site_files(site_url, user_id).await
    }

    async fn file_exists(&self, file_url: &str, user_id: &str) -> Result<bool> {
        self.inner.file_exists(file_url, user_id).await
    }

    async fn add_manual_schema_file(
        &self,
        site_url: &str,
        user_id: &str,
        file_url: &str,
    ) -> Result<()> {
        self.inner.add_manual_schema_file(site_url, user_id, file_url).await
    }

    async fn diff_site_files(
        &self,
        site_url: &str,
        user_id: &str,
        schema_map: &str,
        discovered: &[DiscoveredFile],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let lock = self.locks.get(site_url, user_id).await;
        let _guard = lock.lock().await;
        self.inner
            .diff_site_files(site_url, user_id, schema_map, discovered)
            .await
    }

    async fn delete_file(&self, file_url: &str, user_id: &str) -> Result<()> {
        self.inner.delete_file(file_url, user_id).await
    }

    async fn list_file_ids(&self, file_url: &str, user_id: &str) -> Result<HashSet<String>> {
        self.inner.list_file_ids(file_url, user_id).await
    }

    async fn diff_file_ids(
        &self,
        file_url: &str,
        user_id: &str,
        new_ids: &HashSet<String>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        self.inner.diff_file_ids(file_url, user_id, new_ids).await
    }

    async fn ref_count(&self, id: &str, user_id: &str) -> Result<i64> {
        self.inner.ref_count(id, user_id).await
    }

    async fn log_error(
        &self,
        file_url: &str,
        user_id: &str,
        error_type: ErrorType,
        message: &str,
        details: Option<&str>,
    ) -> Result<()> {
        self.inner
            .log_error(file_url, user_id, error_type, message, details)
            .await
    }

    async fn clear_errors(&self, file_url: &str, user_id: &str) -> Result<()> {
        self.inner.clear_errors(file_url, user_id).await
    }
}

/// Selects the configured backend and wraps it with per-site
/// serialization. This is the entry point every other crate uses.
pub fn connect() -> Box<dyn Store> {
    Box::new(LockedStore {
        inner: backends::connect(),
        locks: SiteLocks::new(),
    })
}
