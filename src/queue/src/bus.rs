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

//! Cloud message bus backend. The concrete vendor is an external
//! collaborator outside this crate's scope, so this speaks a generic REST
//! envelope (`POST /queues/{name}/messages`, `POST .../receive`,
//! `POST .../complete`, `POST .../abandon`) against the endpoint configured
//! in `QUEUE_CONNECTION_STRING`. A message bus completes/abandons by id
//! alone; there is no separate claim-check artifact like a pop receipt.

use std::time::Duration;

use async_trait::async_trait;
use errors::{Error, QueueError, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::{JobBody, Msg, Queue};

pub struct BusQueue {
    client: Client,
    endpoint: String,
    queue_name: String,
}

impl BusQueue {
    pub fn new() -> Self {
        let cfg = config::get_config();
        Self {
            client: Client::new(),
            endpoint: cfg.queue.connection_string.clone(),
            queue_name: cfg.queue.queue_name.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/queues/{}/{}", self.endpoint.trim_end_matches('/'), self.queue_name, path)
    }
}

impl Default for BusQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ReceivedMessage {
    id: String,
    body: JobBody,
}

#[async_trait]
impl Queue for BusQueue {
    async fn provision(&self) -> Result<()> {
        self.client
            .put(format!("{}/queues/{}", self.endpoint.trim_end_matches('/'), self.queue_name))
            .send()
            .await?;
        Ok(())
    }

    async fn send(&self, body: &JobBody) -> Result<bool> {
        let resp = self.client.post(self.url("messages")).json(body).send().await?;
        Ok(resp.status().is_success())
    }

    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<Msg>> {
        let resp = self
            .client
            .post(self.url("receive"))
            .query(&[("visibility_timeout_secs", visibility_timeout.as_secs())])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let received: Option<ReceivedMessage> = resp.json().await.ok();
        Ok(received.map(|m| Msg { id: m.id.clone(), body: m.body, receipt: m.id }))
    }

    async fn ack(&self, msg: &Msg) -> Result<bool> {
        let resp = self.client.post(self.url(&format!("{}/complete", msg.id))).send().await?;
        if !resp.status().is_success() {
            return Err(Error::from(QueueError::InvalidReceipt(msg.id.clone())));
        }
        Ok(true)
    }

    async fn nack(&self, msg: &Msg) -> Result<bool> {
        let resp = self.client.post(self.url(&format!("{}/abandon", msg.id))).send().await?;
        Ok(resp.status().is_success())
    }
}
