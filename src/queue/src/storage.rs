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

//! Cloud storage queue backend. Unlike [`bus`](crate::bus), a storage queue
//! hands back a dequeue-count-scoped pop receipt on `receive`, and deletion
//! requires both the message id and that receipt — `update_message` with a
//! zero visibility timeout is how a storage queue makes a message reappear
//! immediately, which is what this backend's `nack` does.

use std::time::Duration;

use async_trait::async_trait;
use errors::{Error, QueueError, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::{JobBody, Msg, Queue};

pub struct StorageQueue {
    client: Client,
    endpoint: String,
    queue_name: String,
}

impl StorageQueue {
    pub fn new() -> Self {
        let cfg = config::get_config();
        Self {
            client: Client::new(),
            endpoint: cfg.queue.connection_string.clone(),
            queue_name: cfg.queue.queue_name.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.endpoint.trim_end_matches('/'), self.queue_name)
    }
}

impl Default for StorageQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// `id` and `pop_receipt` together authorize delete/update of one dequeued
/// message, mirroring a storage-queue-style receipt rather than a bus id.
#[derive(Deserialize)]
struct DequeuedMessage {
    #[serde(rename = "messageId")]
    message_id: String,
    #[serde(rename = "popReceipt")]
    pop_receipt: String,
    body: JobBody,
}

fn encode_receipt(id: &str, pop_receipt: &str) -> String {
    format!("{id}\u{0}{pop_receipt}")
}

fn decode_receipt(receipt: &str) -> (&str, &str) {
    receipt.split_once('\u{0}').unwrap_or((receipt, ""))
}

#[async_trait]
impl Queue for StorageQueue {
    async fn provision(&self) -> Result<()> {
        self.client
            .put(format!("{}/{}", self.endpoint.trim_end_matches('/'), self.queue_name))
            .send()
            .await?;
        Ok(())
    }

    async fn send(&self, body: &JobBody) -> Result<bool> {
        let resp = self.client.post(self.messages_url()).json(body).send().await?;
        Ok(resp.status().is_success())
    }

    async fn receive(&self, visibility_timeout: Duration) -> Result<Option<Msg>> {
        let resp = self
            .client
            .get(self.messages_url())
            .query(&[
                ("numofmessages", "1".to_string()),
                ("visibilitytimeout", visibility_timeout.as_secs().to_string()),
            ])
            .send()
            .await?;
        let dequeued: Vec<DequeuedMessage> = resp.json().await.unwrap_or_default();
        Ok(dequeued.into_iter().next().map(|m| Msg {
            id: m.message_id.clone(),
            body: m.body,
            receipt: encode_receipt(&m.message_id, &m.pop_receipt),
        }))
    }

    async fn ack(&self, msg: &Msg) -> Result<bool> {
        let (id, pop_receipt) = decode_receipt(&msg.receipt);
        let resp = self
            .client
            .delete(format!("{}/{id}", self.messages_url()))
            .query(&[("popreceipt", pop_receipt)])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::from(QueueError::InvalidReceipt(msg.receipt.clone())));
        }
        Ok(true)
    }

    async fn nack(&self, msg: &Msg) -> Result<bool> {
        let (id, pop_receipt) = decode_receipt(&msg.receipt);
        let resp = self
            .client
            .put(format!("{}/{id}", self.messages_url()))
            .query(&[("popreceipt", pop_receipt), ("visibilitytimeout", "0")])
            .send()
            .await?;
        Ok(resp.status().is_success())
    }
}
