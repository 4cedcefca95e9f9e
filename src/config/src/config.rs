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

use std::sync::Arc;

use arc_swap::ArcSwap;
use dotenv_config::EnvConfig;
use dotenvy::dotenv_override;
use once_cell::sync::Lazy;

static CONFIG: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from(Arc::new(init())));

/// Returns the process-wide configuration, loaded once from the environment
/// on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.load_full()
}

#[derive(EnvConfig)]
pub struct Config {
    pub queue: Queue,
    pub store: Store,
    pub indexer: Indexer,
    pub scheduler: Scheduler,
    pub worker: Worker,
    pub http: Http,
    pub log: Log,
}

/// Queue backend selection and per-backend connection settings. See §4.2 /
/// §6 of SPEC_FULL.md for the three supported backends.
#[derive(EnvConfig)]
pub struct Queue {
    /// `file` (default, development), `bus` (cloud message bus), or
    /// `storage` (cloud storage queue).
    #[env_config(name = "QUEUE_TYPE", default = "file")]
    pub queue_type: String,
    #[env_config(name = "QUEUE_DIR", default = "./data/queue")]
    pub queue_dir: String,
    #[env_config(name = "QUEUE_NAMESPACE", default = "")]
    pub namespace: String,
    #[env_config(name = "QUEUE_NAME", default = "crawler-jobs")]
    pub queue_name: String,
    #[env_config(name = "QUEUE_CONNECTION_STRING", default = "")]
    pub connection_string: String,
    #[env_config(name = "QUEUE_VISIBILITY_TIMEOUT_SECS", default = 300)]
    pub visibility_timeout_secs: i64,
    #[env_config(name = "QUEUE_POLL_BUDGET_SECS", default = 5)]
    pub poll_budget_secs: u64,
}

/// Relational store backend selection. `sqlite` is the default for local
/// development; `postgres` and `mysql` are the two production backends.
#[derive(EnvConfig)]
pub struct Store {
    #[env_config(name = "DB_BACKEND", default = "sqlite")]
    pub backend: String,
    #[env_config(name = "DB_SQLITE_PATH", default = "./data/crawler.sqlite")]
    pub sqlite_path: String,
    #[env_config(name = "DB_SERVER", default = "")]
    pub server: String,
    #[env_config(name = "DB_DATABASE", default = "crawler")]
    pub database: String,
    #[env_config(name = "DB_USER", default = "")]
    pub user: String,
    #[env_config(name = "DB_PASSWORD", default = "")]
    pub password: String,
    #[env_config(name = "DB_MIN_CONNECTIONS", default = 1)]
    pub min_connections: u32,
    #[env_config(name = "DB_MAX_CONNECTIONS", default = 10)]
    pub max_connections: u32,
}

/// Embedding and vector-search endpoints used by the Indexer. The Indexer
/// itself is an opaque collaborator (see SPEC_FULL.md §1); only connection
/// settings live here.
#[derive(EnvConfig)]
pub struct Indexer {
    #[env_config(name = "EMBEDDING_ENDPOINT", default = "")]
    pub embedding_endpoint: String,
    #[env_config(name = "EMBEDDING_API_KEY", default = "")]
    pub embedding_api_key: String,
    #[env_config(name = "EMBEDDING_DEPLOYMENT", default = "")]
    pub embedding_deployment: String,
    #[env_config(name = "SEARCH_ENDPOINT", default = "")]
    pub search_endpoint: String,
    #[env_config(name = "SEARCH_API_KEY", default = "")]
    pub search_api_key: String,
    #[env_config(name = "SEARCH_INDEX", default = "schema-map-objects")]
    pub search_index: String,
    #[env_config(name = "INDEXER_BATCH_SIZE", default = 100)]
    pub batch_size: usize,
    #[env_config(name = "INDEXER_CONTENT_CHAR_BUDGET", default = 20000)]
    pub content_char_budget: usize,
    #[env_config(name = "INDEXER_STORED_CONTENT_CHAR_BUDGET", default = 10000)]
    pub stored_content_char_budget: usize,
}

#[derive(EnvConfig)]
pub struct Scheduler {
    #[env_config(name = "SCHEDULER_INTERVAL", default = 60)]
    pub tick_interval_secs: u64,
    #[env_config(name = "DISCOVERY_CONCURRENCY", default = 16)]
    pub discovery_concurrency: usize,
    #[env_config(name = "SITE_DEFAULT_PROCESS_INTERVAL_HOURS", default = 24)]
    pub default_process_interval_hours: i64,
}

#[derive(EnvConfig)]
pub struct Worker {
    #[env_config(name = "WORKER_COUNT", default = 4)]
    pub worker_count: usize,
    #[env_config(name = "WORKER_FETCH_TIMEOUT_SECS", default = 30)]
    pub fetch_timeout_secs: u64,
    #[env_config(name = "WORKER_DISCOVERY_TIMEOUT_SECS", default = 10)]
    pub discovery_timeout_secs: u64,
}

#[derive(EnvConfig)]
pub struct Http {
    #[env_config(name = "HTTP_USER_AGENT", default = "schema-crawler/0.1")]
    pub user_agent: String,
}

#[derive(EnvConfig)]
pub struct Log {
    #[env_config(name = "RUST_LOG", default = "info")]
    pub level: String,
}

fn init() -> Config {
    dotenv_override().ok();
    Config::init().expect("invalid configuration in environment")
}
