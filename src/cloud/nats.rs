use async_nats::Client;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

use super::messages::{decode_records, FetchPage, FetchRequest, RemoteDropRecord, SaveAck};
use super::source::{RemoteDrop, RemoteError, RemoteSource};
use crate::drops::AudioDrop;

/// Upper bound on pages per fetch, guarding against a cursor that never ends
const MAX_PAGES: usize = 10_000;

/// Remote drop collection served over NATS request/reply
///
/// - `<prefix>.fetch`: `FetchRequest` -> `FetchPage`, repeated while a cursor comes back
/// - `<prefix>.save`: `RemoteDropRecord` -> `SaveAck`
pub struct NatsRemoteSource {
    client: Client,
    subject_prefix: String,
    request_timeout: Duration,
}

impl NatsRemoteSource {
    /// Connect to NATS server
    pub async fn connect(
        url: &str,
        subject_prefix: &str,
        request_timeout: Duration,
    ) -> Result<Self, RemoteError> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .map_err(|e| RemoteError::Connect(format!("{}: {}", url, e)))?;

        info!("Connected to NATS successfully");

        Ok(Self::with_client(client, subject_prefix, request_timeout))
    }

    pub fn with_client(client: Client, subject_prefix: &str, request_timeout: Duration) -> Self {
        Self {
            client,
            subject_prefix: subject_prefix.trim_end_matches('.').to_string(),
            request_timeout,
        }
    }

    pub fn fetch_subject(&self) -> String {
        format!("{}.fetch", self.subject_prefix)
    }

    pub fn save_subject(&self) -> String {
        format!("{}.save", self.subject_prefix)
    }

    async fn request(&self, subject: String, payload: Vec<u8>) -> Result<Vec<u8>, RemoteError> {
        let reply = timeout(self.request_timeout, self.client.request(subject, payload.into()))
            .await
            .map_err(|_| RemoteError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        Ok(reply.payload.to_vec())
    }
}

fn decode_error(e: serde_json::Error) -> RemoteError {
    RemoteError::Decode(e.to_string())
}

#[async_trait]
impl RemoteSource for NatsRemoteSource {
    async fn fetch_all(&self) -> Result<Vec<RemoteDrop>, RemoteError> {
        let subject = self.fetch_subject();
        let mut drops = Vec::new();
        let mut cursor: Option<String> = None;

        for page_index in 0..MAX_PAGES {
            let request = FetchRequest {
                cursor: cursor.take(),
            };
            let payload = serde_json::to_vec(&request).map_err(decode_error)?;

            let reply = self.request(subject.clone(), payload).await?;
            let page: FetchPage = serde_json::from_slice(&reply).map_err(decode_error)?;

            let received = page.records.len();
            let decoded = decode_records(page.records);
            debug!(
                "Fetched page {} from {} ({} records, {} usable)",
                page_index,
                subject,
                received,
                decoded.len()
            );
            drops.extend(decoded);

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => {
                    info!("Fetched {} drops from {}", drops.len(), subject);
                    return Ok(drops);
                }
            }
        }

        Err(RemoteError::Request(format!(
            "{} did not finish within {} pages",
            subject, MAX_PAGES
        )))
    }

    async fn save(&self, drop: &AudioDrop, audio: &[u8]) -> Result<(), RemoteError> {
        let subject = self.save_subject();
        let record = RemoteDropRecord::from_drop(drop, audio);
        let payload = serde_json::to_vec(&record).map_err(decode_error)?;

        let reply = self.request(subject.clone(), payload).await?;
        let ack: SaveAck = serde_json::from_slice(&reply).map_err(decode_error)?;

        if !ack.ok {
            return Err(RemoteError::Rejected(
                ack.error.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }

        info!("Saved drop {} to {} ({} bytes of audio)", drop.id, subject, audio.len());

        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}
