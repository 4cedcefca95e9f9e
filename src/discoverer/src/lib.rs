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

//! Schema-map discovery (SPEC_FULL.md §4.4): resolve a site's schema-map
//! URL(s) from `robots.txt` or well-known fallbacks, parse each as a
//! sitemap, converge the result against the Store, and enqueue jobs for
//! whatever changed.

use std::time::Duration;

use chrono::Utc;
use errors::Result;
use log::{info, warn};
use queue::{JobBody, JobType, Queue};
use regex::Regex;
use store::{DiscoveredFile, Store};
use url::Url;

pub mod sitemap;

pub use sitemap::{parse_schema_map_xml, SchemaUrl};

fn http_client() -> reqwest::Client {
    let cfg = config::get_config();
    reqwest::Client::builder()
        .user_agent(cfg.http.user_agent.clone())
        .timeout(Duration::from_secs(cfg.worker.discovery_timeout_secs))
        .build()
        .unwrap_or_default()
}

/// Sites are keyed in the Store by their normalized form (scheme stripped,
/// `normalize_site_url`), but every HTTP request needs an absolute URL.
/// Reconstructs one by parsing `site_url` as-is and, only when that fails
/// for lack of a scheme, retrying with `https://` prepended.
fn absolute_base_url(site_url: &str) -> Option<Url> {
    Url::parse(site_url).or_else(|_| Url::parse(&format!("https://{site_url}"))).ok()
}

/// Step 1: resolve the set of schema-map URLs to process for `site_url`.
async fn resolve_schema_map_urls(client: &reqwest::Client, site_url: &str) -> Vec<String> {
    let Some(base) = absolute_base_url(site_url) else {
        return Vec::new();
    };

    if site_url.ends_with("schema_map.xml") {
        return vec![base.to_string()];
    }

    let robots_url = match base.join("/robots.txt") {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };

    if let Ok(resp) = client.get(robots_url).send().await {
        if resp.status().is_success() {
            if let Ok(body) = resp.text().await {
                let re = Regex::new(r"(?i)^schemamap:\s*(\S+)").unwrap();
                let maps: Vec<String> = body
                    .lines()
                    .filter_map(|line| re.captures(line.trim()))
                    .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
                    .filter_map(|raw| base.join(&raw).ok())
                    .map(|u| u.to_string())
                    .collect();
                if !maps.is_empty() {
                    return maps;
                }
            }
        }
    }

    match base.join("schema_map.xml") {
        Ok(u) => vec![u.to_string()],
        Err(_) => Vec::new(),
    }
}

/// Step 2-6 for a single schema map: fetch, parse, diff, enqueue. Returns
/// `(files_added, files_queued)`.
async fn process_schema_map(
    client: &reqwest::Client,
    store: &dyn Store,
    queue: &dyn Queue,
    site_url: &str,
    user_id: &str,
    map_url: &str,
) -> Result<(usize, usize)> {
    let resp = match client.get(map_url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("failed to fetch schema map {map_url}: {e}");
            return Ok((0, 0));
        }
    };
    if !resp.status().is_success() {
        warn!("schema map {map_url} returned HTTP {}, treating as empty", resp.status());
        return Ok((0, 0));
    }
    let body = resp.text().await.unwrap_or_default();
    let base = absolute_base_url(site_url).map(|u| u.to_string()).unwrap_or_else(|| site_url.to_string());
    let schema_urls = parse_schema_map_xml(&body, &base);
    if schema_urls.is_empty() {
        return Ok((0, 0));
    }

    let discovered: Vec<DiscoveredFile> = schema_urls
        .iter()
        .map(|s| DiscoveredFile { file_url: s.loc.clone(), content_type: Some(s.content_type.clone()) })
        .collect();
    let (added, removed) = store.diff_site_files(site_url, user_id, map_url, &discovered).await?;

    let content_type_of = |file_url: &str| {
        schema_urls.iter().find(|s| s.loc == file_url).map(|s| s.content_type.clone())
    };

    let mut queued = 0;
    for file_url in &added {
        let body = JobBody {
            job_type: JobType::ProcessFile,
            user_id: user_id.to_string(),
            site: site_url.to_string(),
            file_url: file_url.clone(),
            schema_map: Some(map_url.to_string()),
            content_type: content_type_of(file_url),
            queued_at: Utc::now(),
        };
        match queue.send(&body).await {
            Ok(true) => queued += 1,
            Ok(false) => warn!("queue rejected process_file job for {file_url}"),
            Err(e) => warn!("failed to queue process_file job for {file_url}: {e}"),
        }
    }

    for file_url in &removed {
        let body = JobBody {
            job_type: JobType::ProcessRemovedFile,
            user_id: user_id.to_string(),
            site: site_url.to_string(),
            file_url: file_url.clone(),
            schema_map: None,
            content_type: None,
            queued_at: Utc::now(),
        };
        if let Err(e) = queue.send(&body).await {
            warn!("failed to queue process_removed_file job for {file_url}: {e}");
        }
    }

    Ok((added.len(), queued))
}

/// Runs the full discovery algorithm for one site. `interval_hours` is
/// round-tripped into `add_site` so rediscovery never resets a site's
/// configured processing interval back to a default.
pub async fn discover_site(
    store: &dyn Store,
    queue: &dyn Queue,
    site_url: &str,
    user_id: &str,
    interval_hours: i64,
) -> Result<(usize, usize)> {
    let client = http_client();
    store.add_site(site_url, user_id, interval_hours).await?;

    let map_urls = resolve_schema_map_urls(&client, site_url).await;
    if map_urls.is_empty() {
        info!("no schema maps found for {site_url}");
        return Ok((0, 0));
    }

    let mut total_added = 0;
    let mut total_queued = 0;
    for map_url in map_urls {
        match process_schema_map(&client, store, queue, site_url, user_id, &map_url).await {
            Ok((added, queued)) => {
                total_added += added;
                total_queued += queued;
            }
            Err(e) => warn!("error processing schema map {map_url} for {site_url}: {e}"),
        }
    }
    info!("processed {site_url}: {total_added} files added, {total_queued} queued");
    Ok((total_added, total_queued))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use store::{DiscoveredFile, ErrorType, FileRecord, NewUser, Site, SiteStatus, User};

    #[test]
    fn absolute_base_url_prepends_https_for_a_scheme_less_site_url() {
        let base = absolute_base_url("example.com").unwrap();
        assert_eq!(base.as_str(), "https://example.com/");
    }

    #[test]
    fn absolute_base_url_keeps_an_existing_scheme() {
        let base = absolute_base_url("http://example.com").unwrap();
        assert_eq!(base.as_str(), "http://example.com/");
    }

    #[test]
    fn absolute_base_url_rejects_a_host_that_cannot_be_parsed_even_with_a_scheme() {
        assert!(absolute_base_url("not a valid host").is_none());
    }

    #[tokio::test]
    async fn resolve_returns_the_site_url_itself_when_it_already_ends_in_schema_map_xml() {
        let client = reqwest::Client::new();
        let maps = resolve_schema_map_urls(&client, "https://example.com/schema_map.xml").await;
        assert_eq!(maps, vec!["https://example.com/schema_map.xml".to_string()]);
    }

    #[tokio::test]
    async fn resolve_prepends_a_scheme_before_resolving_the_schema_map_xml_fast_path() {
        // `site_url` here is the normalized, scheme-less form the Store
        // hands back (`normalize_site_url`); the fast path must still
        // produce a fetchable absolute URL.
        let client = reqwest::Client::new();
        let maps = resolve_schema_map_urls(&client, "example.com/schema_map.xml").await;
        assert_eq!(maps, vec!["https://example.com/schema_map.xml".to_string()]);
    }

    #[tokio::test]
    async fn resolve_returns_nothing_when_the_site_url_cannot_be_made_absolute() {
        let client = reqwest::Client::new();
        let maps = resolve_schema_map_urls(&client, "not a valid host").await;
        assert!(maps.is_empty());
    }

    #[derive(Default)]
    struct FakeStore {
        add_site_calls: AtomicUsize,
        diff_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn provision(&self) -> errors::Result<()> {
            Ok(())
        }
        async fn add_user(&self, _user: NewUser) -> errors::Result<()> {
            Ok(())
        }
        async fn get_user(&self, _user_id: &str) -> errors::Result<Option<User>> {
            Ok(None)
        }
        async fn get_user_by_api_key(&self, _api_key: &str) -> errors::Result<Option<User>> {
            Ok(None)
        }
        async fn update_last_login(&self, _user_id: &str) -> errors::Result<()> {
            Ok(())
        }
        async fn add_site(&self, _site_url: &str, _user_id: &str, _interval_hours: i64) -> errors::Result<()> {
            self.add_site_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove_site(&self, _site_url: &str, _user_id: &str) -> errors::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn get_due_sites(&self) -> errors::Result<Vec<Site>> {
            Ok(Vec::new())
        }
        async fn update_site_last_processed(&self, _site_url: &str, _user_id: &str) -> errors::Result<()> {
            Ok(())
        }
        async fn get_site_status(&self, _user_id: &str) -> errors::Result<Vec<SiteStatus>> {
            Ok(Vec::new())
        }
        async fn list_site_files(&self, _site_url: &str, _user_id: &str) -> errors::Result<Vec<FileRecord>> {
            Ok(Vec::new())
        }
        async fn file_exists(&self, _file_url: &str, _user_id: &str) -> errors::Result<bool> {
            Ok(false)
        }
        async fn add_manual_schema_file(&self, _site_url: &str, _user_id: &str, _file_url: &str) -> errors::Result<()> {
            Ok(())
        }
        async fn diff_site_files(
            &self,
            _site_url: &str,
            _user_id: &str,
            schema_map: &str,
            _discovered: &[DiscoveredFile],
        ) -> errors::Result<(Vec<String>, Vec<String>)> {
            self.diff_calls.lock().unwrap().push(schema_map.to_string());
            Ok((Vec::new(), Vec::new()))
        }
        async fn delete_file(&self, _file_url: &str, _user_id: &str) -> errors::Result<()> {
            Ok(())
        }
        async fn list_file_ids(&self, _file_url: &str, _user_id: &str) -> errors::Result<HashSet<String>> {
            Ok(HashSet::new())
        }
        async fn diff_file_ids(
            &self,
            _file_url: &str,
            _user_id: &str,
            _new_ids: &HashSet<String>,
        ) -> errors::Result<(Vec<String>, Vec<String>)> {
            Ok((Vec::new(), Vec::new()))
        }
        async fn ref_count(&self, _id: &str, _user_id: &str) -> errors::Result<i64> {
            Ok(0)
        }
        async fn log_error(
            &self,
            _file_url: &str,
            _user_id: &str,
            _error_type: ErrorType,
            _message: &str,
            _details: Option<&str>,
        ) -> errors::Result<()> {
            Ok(())
        }
        async fn clear_errors(&self, _file_url: &str, _user_id: &str) -> errors::Result<()> {
            Ok(())
        }
    }

    struct FakeQueue;

    #[async_trait]
    impl Queue for FakeQueue {
        async fn provision(&self) -> errors::Result<()> {
            Ok(())
        }
        async fn send(&self, _body: &JobBody) -> errors::Result<bool> {
            Ok(true)
        }
        async fn receive(&self, _visibility_timeout: Duration) -> errors::Result<Option<queue::Msg>> {
            Ok(None)
        }
        async fn ack(&self, _msg: &queue::Msg) -> errors::Result<bool> {
            Ok(true)
        }
        async fn nack(&self, _msg: &queue::Msg) -> errors::Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn discover_site_registers_the_site_even_when_no_schema_map_is_found() {
        let store = FakeStore::default();
        let queue = FakeQueue;
        let (added, queued) = discover_site(&store, &queue, "not a valid host", "u1", 24).await.unwrap();
        assert_eq!((added, queued), (0, 0));
        assert_eq!(store.add_site_calls.load(Ordering::SeqCst), 1);
        assert!(store.diff_calls.lock().unwrap().is_empty());
    }
}
