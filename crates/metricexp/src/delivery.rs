//! Fire-and-forget delivery of detached batches.
//!
//! Every batch is encoded and POSTed on its own task. A failed request is
//! logged and counted, never retried.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use api_types::Envelope;
use error_stack::Report;
use error_stack::ResultExt;
use reqwest::header;
use reqwest::Client;
use reqwest::Response;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::accumulator::Batches;
use crate::codec;
use crate::codec::EncoderPool;
use crate::dsn::Dsn;
use crate::error::ExportError;
use crate::error::ExportResult;

/// Longest response body quoted in a delivery error.
const MAX_ERROR_BODY: usize = 512;

/// Batch counters since the exporter was built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Accepted with a 2xx status
    pub sent: u64,
    /// Rejected by the endpoint or failed in transit
    pub failed: u64,
    /// Never sent: send queue full or exporter shut down
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

pub(crate) struct Delivery {
    client: Client,
    endpoint: String,
    token: String,
    encoders: EncoderPool,
    /// batches accepted but not finished, in flight or queued
    slots: Arc<Semaphore>,
    in_flight: Semaphore,
    tracker: TaskTracker,
    runtime: Handle,
    counters: Counters,
}

impl Delivery {
    pub(crate) fn new(
        dsn: &Dsn,
        request_timeout: Duration,
        max_in_flight: usize,
        max_queued: usize,
        runtime: Handle,
    ) -> ExportResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .change_context(ExportError::Configuration {
                message: "Failed to create HTTP client".into(),
            })?;

        Ok(Self {
            client,
            endpoint: dsn.metrics_endpoint(),
            token: dsn.token.clone(),
            encoders: EncoderPool::new(max_in_flight),
            slots: Arc::new(Semaphore::new(max_in_flight + max_queued)),
            in_flight: Semaphore::new(max_in_flight),
            tracker: TaskTracker::new(),
            runtime,
            counters: Counters::default(),
        })
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Starts sending `batches` in the background.
    ///
    /// The batch waits for an in-flight slot when all are taken; it is
    /// dropped when the queue is full too.
    pub(crate) fn spawn(self: &Arc<Self>, batches: Batches) {
        if self.tracker.is_closed() {
            tracing::warn!(
                records = batches.len(),
                "exporter is shut down, dropping batch"
            );
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
            tracing::warn!(
                records = batches.len(),
                pending = self.tracker.len(),
                "send queue is full, dropping batch"
            );
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let this = Arc::clone(self);
        self.tracker.spawn_on(
            async move {
                let _slot = slot;
                let Ok(_permit) = this.in_flight.acquire().await else {
                    return;
                };
                match this.send(Envelope::from(batches)).await {
                    Ok(()) => {
                        this.counters.sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(report) => {
                        this.counters.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(error = ?report, "send failed");
                    }
                }
            },
            &self.runtime,
        );
    }

    async fn send(&self, envelope: Envelope) -> ExportResult<()> {
        let encoded = self.encoders.get().encode_s2(&envelope);
        let body = encoded.change_context(ExportError::Encoding {
            message: "Failed to encode metrics envelope".into(),
        })?;

        tracing::trace!(
            mmsc = envelope.mmsc.len(),
            quantiles = envelope.quantiles.len(),
            bytes = body.len(),
            "sending metrics"
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(header::CONTENT_TYPE, codec::CONTENT_TYPE)
            .header(header::CONTENT_ENCODING, codec::CONTENT_ENCODING)
            .body(body)
            .send()
            .await
            .change_context(ExportError::Delivery {
                message: format!("Failed to reach {}", self.endpoint),
            })?;

        let status = resp.status();
        let head = drain_body(resp).await.change_context(ExportError::Delivery {
            message: format!("Failed to read response body, status {status}"),
        })?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&head);
            return Err(Report::new(ExportError::Delivery {
                message: format!("status {status}: {text}"),
            }));
        }
        Ok(())
    }

    pub(crate) fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting batches and waits up to `grace` for pending sends.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await;
        if drained.is_err() {
            tracing::warn!(
                pending = self.tracker.len(),
                grace_secs = grace.as_secs_f32(),
                "shutdown timed out, abandoning pending sends"
            );
        }
    }
}

/// Reads the body to the end, keeping its first [`MAX_ERROR_BODY`] bytes.
async fn drain_body(mut resp: Response) -> reqwest::Result<Vec<u8>> {
    let mut head = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        keep_head(&mut head, &chunk);
    }
    Ok(head)
}

fn keep_head(head: &mut Vec<u8>, chunk: &[u8]) {
    let room = MAX_ERROR_BODY.saturating_sub(head.len());
    head.extend_from_slice(&chunk[..chunk.len().min(room)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_head_is_capped() {
        let mut head = Vec::new();
        keep_head(&mut head, b"upstream ");
        keep_head(&mut head, b"unavailable");
        assert_eq!(head, b"upstream unavailable");

        for _ in 0..100 {
            keep_head(&mut head, &[b'x'; 64]);
        }
        assert_eq!(head.len(), MAX_ERROR_BODY);
        assert!(head.starts_with(b"upstream unavailable"));

        keep_head(&mut head, b"tail");
        assert_eq!(head.len(), MAX_ERROR_BODY);
        assert!(!head.ends_with(b"tail"));
    }
}
