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

//! Directory-backed queue for local development. Jobs are files named
//! `job-<timestamp>.json`; claiming a job is an atomic rename to
//! `<name>.processing`, ack removes the processing file, nack renames it
//! back to its original name so another worker can pick it up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use errors::Result;

use crate::{JobBody, Msg, Queue};

pub struct FileQueue {
    dir: PathBuf,
}

impl FileQueue {
    pub fn new() -> Self {
        let cfg = config::get_config();
        Self { dir: PathBuf::from(&cfg.queue.queue_dir) }
    }

    #[cfg(test)]
    fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn job_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Default for FileQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Queue for FileQueue {
    async fn provision(&self) -> Result<()> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || std::fs::create_dir_all(dir))
            .await
            .map_err(|e| errors::Error::Message(e.to_string()))??;
        Ok(())
    }

    async fn send(&self, body: &JobBody) -> Result<bool> {
        let dir = self.dir.clone();
        let payload = serde_json::to_vec(body)?;
        let job_id = format!(
            "job-{}-{}.json",
            body.queued_at.format("%Y%m%d-%H%M%S-%f"),
            uuid::Uuid::new_v4().simple()
        );
        tokio::task::spawn_blocking(move || -> Result<bool> {
            std::fs::create_dir_all(&dir)?;
            let final_path = dir.join(&job_id);
            let temp_path = dir.join(format!(".tmp-{job_id}"));
            std::fs::write(&temp_path, &payload)?;
            std::fs::rename(&temp_path, &final_path)?;
            Ok(true)
        })
        .await
        .map_err(|e| errors::Error::Message(e.to_string()))?
    }

    async fn receive(&self, _visibility_timeout: Duration) -> Result<Option<Msg>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Msg>> {
            let mut names: Vec<String> = match std::fs::read_dir(&dir) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|n| n.starts_with("job-") && n.ends_with(".json"))
                    .collect(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    std::fs::create_dir_all(&dir)?;
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            };
            names.sort();

            for name in names {
                let job_path = dir.join(&name);
                let processing_path = dir.join(format!("{name}.processing"));
                if std::fs::rename(&job_path, &processing_path).is_err() {
                    continue; // another worker claimed it first
                }
                let content = match std::fs::read(&processing_path) {
                    Ok(bytes) => bytes,
                    Err(_) => continue,
                };
                let body: JobBody = serde_json::from_slice(&content)?;
                return Ok(Some(Msg {
                    id: name,
                    body,
                    receipt: processing_path.to_string_lossy().into_owned(),
                }));
            }
            Ok(None)
        })
        .await
        .map_err(|e| errors::Error::Message(e.to_string()))?
    }

    async fn ack(&self, msg: &Msg) -> Result<bool> {
        let receipt = msg.receipt.clone();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let path = Path::new(&receipt);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            Ok(true)
        })
        .await
        .map_err(|e| errors::Error::Message(e.to_string()))?
    }

    async fn nack(&self, msg: &Msg) -> Result<bool> {
        let receipt = msg.receipt.clone();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let path = Path::new(&receipt);
            if path.exists() {
                let original = receipt.trim_end_matches(".processing");
                std::fs::rename(path, original)?;
            }
            Ok(true)
        })
        .await
        .map_err(|e| errors::Error::Message(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::JobType;

    fn sample_body() -> JobBody {
        JobBody {
            job_type: JobType::ProcessFile,
            user_id: "google:u1".into(),
            site: "example.com".into(),
            file_url: "https://example.com/a.json".into(),
            schema_map: Some("https://example.com/schema_map.xml".into()),
            content_type: Some("schema.org".into()),
            queued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn send_then_receive_round_trips_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let q = FileQueue::at(dir.path());
        q.provision().await.unwrap();
        q.send(&sample_body()).await.unwrap();

        let msg = q.receive(Duration::from_secs(300)).await.unwrap().unwrap();
        assert_eq!(msg.body.file_url, "https://example.com/a.json");
        assert!(Path::new(&msg.receipt).exists());
    }

    #[tokio::test]
    async fn receive_on_empty_queue_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let q = FileQueue::at(dir.path());
        q.provision().await.unwrap();
        assert!(q.receive(Duration::from_secs(300)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn a_claimed_message_is_invisible_to_other_receivers() {
        let dir = tempfile::tempdir().unwrap();
        let q = FileQueue::at(dir.path());
        q.provision().await.unwrap();
        q.send(&sample_body()).await.unwrap();

        let _msg = q.receive(Duration::from_secs(300)).await.unwrap().unwrap();
        assert!(q.receive(Duration::from_secs(300)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_removes_the_job_permanently() {
        let dir = tempfile::tempdir().unwrap();
        let q = FileQueue::at(dir.path());
        q.provision().await.unwrap();
        q.send(&sample_body()).await.unwrap();

        let msg = q.receive(Duration::from_secs(300)).await.unwrap().unwrap();
        q.ack(&msg).await.unwrap();
        assert!(!Path::new(&msg.receipt).exists());
        assert!(q.receive(Duration::from_secs(300)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_makes_the_job_visible_again() {
        let dir = tempfile::tempdir().unwrap();
        let q = FileQueue::at(dir.path());
        q.provision().await.unwrap();
        q.send(&sample_body()).await.unwrap();

        let msg = q.receive(Duration::from_secs(300)).await.unwrap().unwrap();
        q.nack(&msg).await.unwrap();

        let redelivered = q.receive(Duration::from_secs(300)).await.unwrap().unwrap();
        assert_eq!(redelivered.body.file_url, msg.body.file_url);
    }
}
