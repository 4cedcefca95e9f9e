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

//! Drains the job queue and drives payload fetch → id reconciliation →
//! Indexer staging (SPEC_FULL.md §4.5). Each worker is an independent
//! `tokio` task pulling one message at a time; `run_pool` spawns
//! `WORKER_COUNT` of them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use indexer::{IndexItem, Indexer};
use log::{debug, info, warn};
use queue::{JobBody, JobType, Msg, Queue};
use serde_json::Value;
use store::{ErrorType, Store};

pub mod extract;
pub mod status;

pub use status::{WorkerState, WorkerStatus};

fn http_client() -> reqwest::Client {
    let cfg = config::get_config();
    reqwest::Client::builder()
        .user_agent(cfg.http.user_agent.clone())
        .build()
        .unwrap_or_default()
}

/// Spawns `WORKER_COUNT` worker tasks, each looping forever. Returns their
/// join handles and the shared status handles so a caller can observe
/// counters or await shutdown.
pub fn run_pool(
    store: Arc<dyn Store>,
    queue: Arc<dyn Queue>,
    indexer: Arc<dyn Indexer>,
) -> (Vec<tokio::task::JoinHandle<()>>, Vec<Arc<WorkerStatus>>) {
    let cfg = config::get_config();
    let mut handles = Vec::with_capacity(cfg.worker.worker_count);
    let mut statuses = Vec::with_capacity(cfg.worker.worker_count);
    for _ in 0..cfg.worker.worker_count {
        let worker_id = status::NEXT_WORKER_ID.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let status = Arc::new(WorkerStatus::new(worker_id));
        let store = store.clone();
        let queue = queue.clone();
        let indexer = indexer.clone();
        let status_for_task = status.clone();
        handles.push(tokio::spawn(async move {
            run_worker_loop(worker_id, store, queue, indexer, status_for_task).await;
        }));
        statuses.push(status);
    }
    (handles, statuses)
}

/// Runs one worker forever: receive, dispatch, ack/nack, repeat. Never
/// returns under normal operation.
pub async fn run_worker_loop(
    worker_id: usize,
    store: Arc<dyn Store>,
    queue: Arc<dyn Queue>,
    indexer: Arc<dyn Indexer>,
    status: Arc<WorkerStatus>,
) {
    let cfg = config::get_config();
    let visibility_timeout = Duration::from_secs(cfg.queue.visibility_timeout_secs as u64);
    let poll_budget = Duration::from_secs(cfg.queue.poll_budget_secs);
    let client = http_client();
    info!("[WORKER {worker_id}] started");

    loop {
        status.set_state(WorkerState::Waiting);
        let msg = match queue.receive(visibility_timeout).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tokio::time::sleep(poll_budget).await;
                continue;
            }
            Err(e) => {
                warn!("[WORKER {worker_id}] queue receive failed: {e}");
                tokio::time::sleep(poll_budget).await;
                continue;
            }
        };

        status.set_state(WorkerState::Processing);
        status.set_current_job(Some(msg.body.file_url.clone()));
        info!("[WORKER {worker_id}] processing {:?} {}", msg.body.job_type, msg.body.file_url);

        let ack = handle_message(store.as_ref(), indexer.as_ref(), &client, &msg).await;
        status.set_current_job(None);

        let queue_result = if ack { queue.ack(&msg).await } else { queue.nack(&msg).await };
        match queue_result {
            Ok(true) => {}
            Ok(false) => warn!("[WORKER {worker_id}] queue rejected {} for {}", if ack { "ack" } else { "nack" }, msg.body.file_url),
            Err(e) => warn!("[WORKER {worker_id}] failed to {} {}: {e}", if ack { "ack" } else { "nack" }, msg.body.file_url),
        }

        if ack {
            status.record_success();
        } else {
            status.record_failure();
        }
    }
}

/// Dispatches one drained message to its handler. Returns `true` to ack,
/// `false` to nack and let the queue redeliver it.
pub async fn handle_message(store: &dyn Store, indexer: &dyn Indexer, client: &reqwest::Client, msg: &Msg) -> bool {
    match msg.body.job_type {
        JobType::ProcessFile => process_file(store, indexer, client, &msg.body).await,
        JobType::ProcessRemovedFile => process_removed_file(store, indexer, &msg.body).await,
    }
}

async fn fetch_payload(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<(u16, String), String> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| format!("request error: {e}"))?;
    let status = resp.status();
    let body = resp.text().await.map_err(|e| format!("failed to read response body: {e}"))?;
    if !status.is_success() {
        return Err(format!("http status {status}"));
    }
    Ok((status.as_u16(), body))
}

/// Handler for `process_file` (SPEC_FULL.md §4.5). Returns `true` to ack.
async fn process_file(store: &dyn Store, indexer: &dyn Indexer, client: &reqwest::Client, body: &JobBody) -> bool {
    match store.file_exists(&body.file_url, &body.user_id).await {
        Ok(false) => {
            debug!("[WORKER] file {} no longer exists, dropping job", body.file_url);
            return true;
        }
        Ok(true) => {}
        Err(e) => {
            warn!("[WORKER] store unavailable checking {}: {e}", body.file_url);
            return false;
        }
    }

    let cfg = config::get_config();
    let (status_code, payload) =
        match fetch_payload(client, &body.file_url, Duration::from_secs(cfg.worker.fetch_timeout_secs)).await {
            Ok(ok) => ok,
            Err(cause) => {
                info!("[WORKER] fetch {} failed: {cause}", body.file_url);
                let _ = store
                    .log_error(&body.file_url, &body.user_id, ErrorType::ExtractionFailed, &cause, None)
                    .await;
                return false;
            }
        };

    let objects = match extract::extract_objects(&payload, body.content_type.as_deref()) {
        Ok(objs) => objs,
        Err(e) => {
            let cause = format!("payload parse error: {e}");
            info!(
                "[WORKER] fetch {} status={status_code} len={} failed: {cause}",
                body.file_url,
                payload.len()
            );
            let _ = store
                .log_error(&body.file_url, &body.user_id, ErrorType::ExtractionFailed, &cause, None)
                .await;
            return false;
        }
    };

    let filtered: Vec<Value> = objects.into_iter().filter(|obj| !extract::is_skipped(obj)).collect();
    info!(
        "[WORKER] fetch {} status={status_code} len={} ids={}",
        body.file_url,
        payload.len(),
        filtered.len()
    );

    if filtered.is_empty() {
        let _ = store
            .log_error(
                &body.file_url,
                &body.user_id,
                ErrorType::NoIdsFound,
                "payload parsed but yielded zero @id-bearing objects",
                None,
            )
            .await;
    }

    let mut by_id: HashMap<String, Value> = HashMap::with_capacity(filtered.len());
    let mut new_ids: HashSet<String> = HashSet::with_capacity(filtered.len());
    for obj in filtered {
        if let Some(id) = obj.get("@id").and_then(Value::as_str) {
            new_ids.insert(id.to_string());
            by_id.insert(id.to_string(), obj);
        }
    }

    let (added, removed) = match store.diff_file_ids(&body.file_url, &body.user_id, &new_ids).await {
        Ok(diff) => diff,
        Err(e) => {
            warn!("[WORKER] store unavailable diffing ids for {}: {e}", body.file_url);
            return false;
        }
    };

    let mut to_add = Vec::new();
    for id in &added {
        match store.ref_count(id, &body.user_id).await {
            Ok(1) => {
                if let Some(payload) = by_id.get(id) {
                    to_add.push(IndexItem { id: id.clone(), site: body.site.clone(), payload: payload.clone() });
                }
            }
            Ok(_) => {}
            Err(e) => warn!("[WORKER] ref_count failed for {id}: {e}"),
        }
    }

    let mut to_delete = Vec::new();
    for id in &removed {
        match store.ref_count(id, &body.user_id).await {
            Ok(0) => to_delete.push(id.clone()),
            Ok(_) => {}
            Err(e) => warn!("[WORKER] ref_count failed for {id}: {e}"),
        }
    }

    if !to_add.is_empty() {
        if let Err(e) = indexer.add_batch(&to_add).await {
            warn!("[WORKER] indexer add_batch failed for {}: {e}", body.file_url);
            let _ = store
                .log_error(&body.file_url, &body.user_id, ErrorType::VectorDbAddFailed, &e.to_string(), None)
                .await;
        }
    }
    if !to_delete.is_empty() {
        if let Err(e) = indexer.delete_batch(&to_delete).await {
            warn!("[WORKER] indexer delete_batch failed for {}: {e}", body.file_url);
            let _ = store
                .log_error(&body.file_url, &body.user_id, ErrorType::VectorDbDeleteFailed, &e.to_string(), None)
                .await;
        }
    }

    if let Err(e) = store.update_site_last_processed(&body.site, &body.user_id).await {
        warn!("[WORKER] failed to update last_processed for {}: {e}", body.site);
        return false;
    }
    if let Err(e) = store.clear_errors(&body.file_url, &body.user_id).await {
        warn!("[WORKER] failed to clear errors for {}: {e}", body.file_url);
        return false;
    }
    true
}

/// Handler for `process_removed_file` (SPEC_FULL.md §4.5). Returns `true`
/// to ack.
async fn process_removed_file(store: &dyn Store, indexer: &dyn Indexer, body: &JobBody) -> bool {
    let ids_before = match store.list_file_ids(&body.file_url, &body.user_id).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("[WORKER] store unavailable listing ids for {}: {e}", body.file_url);
            return false;
        }
    };

    if let Err(e) = store.diff_file_ids(&body.file_url, &body.user_id, &HashSet::new()).await {
        warn!("[WORKER] store unavailable clearing ids for {}: {e}", body.file_url);
        return false;
    }

    let mut to_delete = Vec::new();
    for id in &ids_before {
        match store.ref_count(id, &body.user_id).await {
            Ok(0) => to_delete.push(id.clone()),
            Ok(_) => {}
            Err(e) => warn!("[WORKER] ref_count failed for {id}: {e}"),
        }
    }

    if !to_delete.is_empty() {
        if let Err(e) = indexer.delete_batch(&to_delete).await {
            warn!("[WORKER] indexer delete_batch failed removing {}: {e}", body.file_url);
            let _ = store
                .log_error(&body.file_url, &body.user_id, ErrorType::VectorDbDeleteFailed, &e.to_string(), None)
                .await;
        }
    }

    if let Err(e) = store.delete_file(&body.file_url, &body.user_id).await {
        warn!("[WORKER] failed to delete file row {}: {e}", body.file_url);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use errors::Result;
    use std::sync::Mutex;
    use store::{DiscoveredFile, FileRecord, NewUser, Site, SiteStatus, User};

    #[derive(Default)]
    struct FakeStore {
        file_exists: bool,
        ids: Mutex<HashSet<String>>,
        errors_logged: Mutex<Vec<(String, ErrorType)>>,
        last_processed_updated: Mutex<bool>,
        errors_cleared: Mutex<bool>,
        deleted: Mutex<bool>,
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
            Ok(())
        }
        async fn remove_site(&self, _site_url: &str, _user_id: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn get_due_sites(&self) -> Result<Vec<Site>> {
            Ok(Vec::new())
        }
        async fn update_site_last_processed(&self, _site_url: &str, _user_id: &str) -> Result<()> {
            *self.last_processed_updated.lock().unwrap() = true;
            Ok(())
        }
        async fn get_site_status(&self, _user_id: &str) -> Result<Vec<SiteStatus>> {
            Ok(Vec::new())
        }
        async fn list_site_files(&self, _site_url: &str, _user_id: &str) -> Result<Vec<FileRecord>> {
            Ok(Vec::new())
        }
        async fn file_exists(&self, _file_url: &str, _user_id: &str) -> Result<bool> {
            Ok(self.file_exists)
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
            *self.deleted.lock().unwrap() = true;
            Ok(())
        }
        async fn list_file_ids(&self, _file_url: &str, _user_id: &str) -> Result<HashSet<String>> {
            Ok(self.ids.lock().unwrap().clone())
        }
        async fn diff_file_ids(
            &self,
            _file_url: &str,
            _user_id: &str,
            new_ids: &HashSet<String>,
        ) -> Result<(Vec<String>, Vec<String>)> {
            let mut ids = self.ids.lock().unwrap();
            let added: Vec<String> = new_ids.difference(&ids).cloned().collect();
            let removed: Vec<String> = ids.difference(new_ids).cloned().collect();
            *ids = new_ids.clone();
            Ok((added, removed))
        }
        async fn ref_count(&self, id: &str, _user_id: &str) -> Result<i64> {
            Ok(if self.ids.lock().unwrap().contains(id) { 1 } else { 0 })
        }
        async fn log_error(
            &self,
            file_url: &str,
            _user_id: &str,
            error_type: ErrorType,
            _message: &str,
            _details: Option<&str>,
        ) -> Result<()> {
            self.errors_logged.lock().unwrap().push((file_url.to_string(), error_type));
            Ok(())
        }
        async fn clear_errors(&self, _file_url: &str, _user_id: &str) -> Result<()> {
            *self.errors_cleared.lock().unwrap() = true;
            Ok(())
        }
    }

    struct FakeIndexer {
        added: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        fail_add: bool,
    }

    impl FakeIndexer {
        fn new() -> Self {
            Self { added: Mutex::new(Vec::new()), deleted: Mutex::new(Vec::new()), fail_add: false }
        }
    }

    #[async_trait]
    impl Indexer for FakeIndexer {
        async fn add_batch(&self, items: &[IndexItem]) -> Result<()> {
            if self.fail_add {
                return Err(errors::IndexerError { batch_start: 0, cause: "boom".to_string() }.into());
            }
            self.added.lock().unwrap().extend(items.iter().map(|i| i.id.clone()));
            Ok(())
        }
        async fn delete_batch(&self, ids: &[String]) -> Result<()> {
            self.deleted.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        }
    }

    fn job(job_type: JobType, file_url: &str, content_type: Option<&str>) -> JobBody {
        JobBody {
            job_type,
            user_id: "google:u1".into(),
            site: "example.com".into(),
            file_url: file_url.to_string(),
            schema_map: None,
            content_type: content_type.map(str::to_string),
            queued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_row_acks_without_fetching() {
        let store = FakeStore { file_exists: false, ..Default::default() };
        let indexer = FakeIndexer::new();
        let client = reqwest::Client::new();
        let body = job(JobType::ProcessFile, "https://example.com/gone.json", None);
        assert!(process_file(&store, &indexer, &client, &body).await);
    }

    #[tokio::test]
    async fn removed_file_deletes_ids_and_the_file_row_and_indexes_deletes() {
        let store = FakeStore { file_exists: true, ..Default::default() };
        store.ids.lock().unwrap().insert("a".to_string());
        let indexer = FakeIndexer::new();
        let body = job(JobType::ProcessRemovedFile, "https://example.com/a.json", None);
        assert!(process_removed_file(&store, &indexer, &body).await);
        assert!(store.ids.lock().unwrap().is_empty());
        assert!(*store.deleted.lock().unwrap());
        assert_eq!(&*indexer.deleted.lock().unwrap(), &["a".to_string()]);
    }

    #[tokio::test]
    async fn indexer_failure_is_recorded_but_still_acks() {
        let store = FakeStore { file_exists: true, ..Default::default() };
        let indexer = FakeIndexer { fail_add: true, ..FakeIndexer::new() };
        let body = job(JobType::ProcessFile, "https://example.com/a.json", None);
        let payload = r#"{"@id":"a","@type":"Recipe"}"#;
        // Exercise the staging path directly: diff_file_ids converges first,
        // then the indexer failure is recorded without reverting it or
        // nacking the job (SPEC_FULL.md §4.3 rationale).
        let objects = extract::extract_objects(payload, body.content_type.as_deref()).unwrap();
        assert_eq!(objects.len(), 1);
        let (added, _) = store.diff_file_ids(&body.file_url, &body.user_id, &HashSet::from(["a".to_string()])).await.unwrap();
        assert_eq!(added, vec!["a".to_string()]);
        let err = indexer
            .add_batch(&[IndexItem { id: "a".into(), site: body.site.clone(), payload: objects[0].clone() }])
            .await;
        assert!(err.is_err());
        assert!(indexer.added.lock().unwrap().is_empty());
    }

    #[test]
    fn skip_set_matches_spec_membership() {
        assert_eq!(extract::SKIP_TYPES.len(), 17);
        assert!(extract::SKIP_TYPES.contains(&"BreadcrumbList"));
        assert!(extract::SKIP_TYPES.contains(&"ReadAction"));
    }
}
