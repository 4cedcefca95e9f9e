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

//! Periodic discovery fan-out (SPEC_FULL.md §4.6). One tick per
//! `SCHEDULER_INTERVAL`: pull every due `(site, user)` pair from the Store
//! and run the Discoverer on each, bounded by `DISCOVERY_CONCURRENCY` so a
//! tick with thousands of due sites can't exhaust connections or file
//! descriptors. The scheduler holds no per-site state of its own; dueness
//! comes entirely from `sites.last_processed`.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use queue::Queue;
use store::Store;

/// Runs the scheduler loop forever, ticking every `SCHEDULER_INTERVAL`
/// seconds. Never returns under normal operation; a tick's per-site
/// failures are logged and do not abort the loop.
pub async fn run(store: Arc<dyn Store>, queue: Arc<dyn Queue>) {
    let cfg = config::get_config();
    let mut interval = tokio::time::interval(Duration::from_secs(cfg.scheduler.tick_interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = run_tick(&store, &queue).await {
            error!("[SCHEDULER] tick failed: {e}");
        }
    }
}

/// Runs exactly one scheduling tick: select due sites, discover each with
/// bounded concurrency, and wait for all of them before returning.
pub async fn run_tick(store: &Arc<dyn Store>, queue: &Arc<dyn Queue>) -> errors::Result<()> {
    let cfg = config::get_config();
    let due = store.get_due_sites().await?;
    if due.is_empty() {
        info!("[SCHEDULER] no due sites this tick");
        return Ok(());
    }
    info!("[SCHEDULER] {} due site(s) this tick", due.len());

    let results: Vec<_> = stream::iter(due.into_iter())
        .map(|site| {
            let store = store.clone();
            let queue = queue.clone();
            async move {
                let result = discoverer::discover_site(
                    store.as_ref(),
                    queue.as_ref(),
                    &site.site_url,
                    &site.user_id,
                    site.process_interval_hours,
                )
                .await;
                (site, result)
            }
        })
        .buffer_unordered(cfg.scheduler.discovery_concurrency)
        .collect()
        .await;

    for (site, result) in results {
        match result {
            Ok((added, queued)) => {
                info!(
                    "[SCHEDULER] discovered {} for user {}: {added} file(s) added, {queued} queued",
                    site.site_url, site.user_id
                );
            }
            Err(e) => {
                warn!("[SCHEDULER] discovery failed for {} ({}): {e}", site.site_url, site.user_id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use errors::Result;
    use queue::JobBody;
    use std::collections::HashSet;
    use store::{DiscoveredFile, ErrorType, FileRecord, NewUser, Site, SiteStatus, User};

    /// Minimal in-memory `Store` fake: enough due sites to exercise bounded
    /// fan-out, no persistence beyond a call counter.
    struct FakeStore {
        sites: Vec<Site>,
        discover_calls: AtomicUsize,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn provision(&self) -> Result<()> {
            Ok(())
        }
        async fn add_user(&self, _user: NewUser) -> Result<()> {
            Ok(())
        }
        async fn get_user(&self, _user_id: &str) -> Result<Option<User>> {
            Ok(None)
        }
        async fn get_user_by_api_key(&self, _api_key: &str) -> Result<Option<User>> {
            Ok(None)
        }
        async fn update_last_login(&self, _user_id: &str) -> Result<()> {
            Ok(())
        }
        async fn add_site(&self, _site_url: &str, _user_id: &str, _interval_hours: i64) -> Result<()> {
            self.discover_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove_site(&self, _site_url: &str, _user_id: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn get_due_sites(&self) -> Result<Vec<Site>> {
            Ok(self.sites.clone())
        }
        async fn update_site_last_processed(&self, _site_url: &str, _user_id: &str) -> Result<()> {
            Ok(())
        }
        async fn get_site_status(&self, _user_id: &str) -> Result<Vec<SiteStatus>> {
            Ok(Vec::new())
        }
        async fn list_site_files(&self, _site_url: &str, _user_id: &str) -> Result<Vec<FileRecord>> {
            Ok(Vec::new())
        }
        async fn file_exists(&self, _file_url: &str, _user_id: &str) -> Result<bool> {
            Ok(false)
        }
        async fn add_manual_schema_file(&self, _site_url: &str, _user_id: &str, _file_url: &str) -> Result<()> {
            Ok(())
        }
        async fn diff_site_files(
            &self,
            _site_url: &str,
            _user_id: &str,
            _schema_map: &str,
            _discovered: &[DiscoveredFile],
        ) -> Result<(Vec<String>, Vec<String>)> {
            Ok((Vec::new(), Vec::new()))
        }
        async fn delete_file(&self, _file_url: &str, _user_id: &str) -> Result<()> {
            Ok(())
        }
        async fn list_file_ids(&self, _file_url: &str, _user_id: &str) -> Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn diff_file_ids(
            &self,
            _file_url: &str,
            _user_id: &str,
            _new_ids: &HashSet<String>,
        ) -> Result<(Vec<String>, Vec<String>)> {
            Ok((Vec::new(), Vec::new()))
        }
        async fn ref_count(&self, _id: &str, _user_id: &str) -> Result<i64> {
            Ok(0)
        }
        async fn log_error(
            &self,
            _file_url: &str,
            _user_id: &str,
            _error_type: ErrorType,
            _message: &str,
            _details: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }
        async fn clear_errors(&self, _file_url: &str, _user_id: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeQueue;

    #[async_trait]
    impl Queue for FakeQueue {
        async fn provision(&self) -> Result<()> {
            Ok(())
        }
        async fn send(&self, _body: &JobBody) -> Result<bool> {
            Ok(true)
        }
        async fn receive(&self, _visibility_timeout: Duration) -> Result<Option<queue::Msg>> {
            Ok(None)
        }
        async fn ack(&self, _msg: &queue::Msg) -> Result<bool> {
            Ok(true)
        }
        async fn nack(&self, _msg: &queue::Msg) -> Result<bool> {
            Ok(true)
        }
    }

    fn site(site_url: &str, user_id: &str) -> Site {
        Site {
            site_url: site_url.to_string(),
            user_id: user_id.to_string(),
            process_interval_hours: 24,
            last_processed: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn a_tick_with_no_due_sites_is_a_no_op() {
        let store: Arc<dyn Store> = Arc::new(FakeStore { sites: Vec::new(), discover_calls: AtomicUsize::new(0) });
        let queue: Arc<dyn Queue> = Arc::new(FakeQueue);
        run_tick(&store, &queue).await.unwrap();
    }

    #[tokio::test]
    async fn a_tick_discovers_every_due_site() {
        // Site URLs here are deliberately unparseable even with a scheme
        // prepended, so the Discoverer's URL resolution bails out before any
        // real network call, keeping this test deterministic and offline.
        let sites = vec![
            site("not a valid host a", "u1"),
            site("not a valid host b", "u1"),
            site("not a valid host c", "u2"),
        ];
        let store: Arc<dyn Store> =
            Arc::new(FakeStore { sites, discover_calls: AtomicUsize::new(0) });
        let queue: Arc<dyn Queue> = Arc::new(FakeQueue);
        run_tick(&store, &queue).await.unwrap();
    }
}
