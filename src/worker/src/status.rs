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

//! Per-worker in-memory counters (SPEC_FULL.md §4.5, §9 "global mutable
//! state becomes a struct"). Nothing in the core pipeline reads these; they
//! exist so a future status surface can, without reintroducing a
//! process-wide singleton.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Waiting,
    Processing,
}

pub struct WorkerStatus {
    worker_id: usize,
    state: RwLock<WorkerState>,
    current_job: RwLock<Option<String>>,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl WorkerStatus {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            state: RwLock::new(WorkerState::Idle),
            current_job: RwLock::new(None),
            jobs_processed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    pub fn set_state(&self, state: WorkerState) {
        *self.state.write().expect("worker status lock poisoned") = state;
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read().expect("worker status lock poisoned")
    }

    pub fn set_current_job(&self, job: Option<String>) {
        *self.current_job.write().expect("worker status lock poisoned") = job;
    }

    pub fn current_job(&self) -> Option<String> {
        self.current_job.read().expect("worker status lock poisoned").clone()
    }

    pub fn record_success(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }
}

/// Counter used to assign each spawned worker task a stable id.
pub static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_success_and_failure_counts() {
        let status = WorkerStatus::new(0);
        status.record_success();
        status.record_success();
        status.record_failure();
        assert_eq!(status.jobs_processed(), 2);
        assert_eq!(status.jobs_failed(), 1);
    }

    #[test]
    fn tracks_current_job_and_state() {
        let status = WorkerStatus::new(1);
        status.set_state(WorkerState::Processing);
        status.set_current_job(Some("https://example.com/a.json".to_string()));
        assert_eq!(status.state(), WorkerState::Processing);
        assert_eq!(status.current_job().as_deref(), Some("https://example.com/a.json"));
    }
}
