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

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

/// Per-`(site_url, user_id)` mutex map, serializing concurrent
/// `diff_site_files` calls within this process (I3). Cross-process
/// isolation relies on the backing store's row-level semantics.
#[derive(Default)]
pub struct SiteLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SiteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `(site_url, user_id)`, creating it on
    /// first use. Callers lock the returned `Arc<Mutex<()>>` for the
    /// duration of their critical section.
    pub async fn get(&self, site_url: &str, user_id: &str) -> Arc<Mutex<()>> {
        let key = format!("{site_url}\0{user_id}");
        let mut locks = self.locks.lock().await;
        locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_returns_same_mutex() {
        let locks = SiteLocks::new();
        let a = locks.get("example.com", "u1").await;
        let b = locks.get("example.com", "u1").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_users_get_different_mutexes() {
        let locks = SiteLocks::new();
        let a = locks.get("example.com", "u1").await;
        let b = locks.get("example.com", "u2").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn serializes_concurrent_critical_sections() {
        let locks = Arc::new(SiteLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let locks = locks.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.get("site.com", "u1").await;
                let _guard = lock.lock().await;
                order.lock().await.push(i);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(order.lock().await.len(), 5);
    }
}
