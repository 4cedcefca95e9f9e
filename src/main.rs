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

//! Process wiring: reads config, provisions the `Store` and `Queue`
//! backends, then runs the scheduler tick loop and the worker pool side by
//! side until a shutdown signal arrives (SPEC_FULL.md §2 "root binary").

use std::sync::Arc;

use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_level = config::get_config().log.level.clone();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("[MAIN] starting schema-crawler");

    let store: Arc<dyn store::Store> = Arc::from(store::connect());
    let queue: Arc<dyn queue::Queue> = Arc::from(queue::connect());
    let indexer: Arc<dyn indexer::Indexer> = Arc::from(indexer::connect());

    store.provision().await?;
    queue.provision().await?;
    info!("[MAIN] store and queue provisioned");

    let (worker_handles, _worker_statuses) = worker::run_pool(store.clone(), queue.clone(), indexer);
    info!("[MAIN] spawned {} worker task(s)", worker_handles.len());

    let scheduler_store = store.clone();
    let scheduler_queue = queue.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler::run(scheduler_store, scheduler_queue).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("[MAIN] shutdown signal received");
        }
        _ = scheduler_handle => {
            info!("[MAIN] scheduler task exited unexpectedly");
        }
    }

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}
