//! The metrics exporter.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::accumulator::Accumulator;
use crate::accumulator::Batches;
use crate::checkpoint::CheckpointSet;
use crate::checkpoint::ExportKind;
use crate::config::Config;
use crate::delivery::Delivery;
use crate::delivery::DeliveryStats;
use crate::dsn::Dsn;
use crate::error::ExportResult;
use crate::shaper::shape;

/// Shapes checkpoint sets into wire records and ships them to the ingestion
/// endpoint.
///
/// An exporter built from a malformed DSN, or with `disabled` set, accepts
/// every call and sends nothing.
pub struct Exporter {
    accumulator: Accumulator,
    /// `None` when disabled
    delivery: Option<Arc<Delivery>>,
    shutdown_timeout: Duration,
}

impl Exporter {
    /// Builds an exporter whose sends run on `runtime`.
    ///
    /// The config is completed from the environment first (see
    /// [`Config::init`]). Fails only when the HTTP client can not be built.
    pub fn new(mut config: Config, runtime: Handle) -> ExportResult<Self> {
        config.init();

        let delivery = if config.disabled {
            tracing::info!("metrics exporter is disabled");
            None
        } else {
            match Dsn::parse(&config.dsn) {
                Ok(dsn) => {
                    let delivery = Delivery::new(
                        &dsn,
                        config.request_timeout,
                        config.max_in_flight.max(1),
                        config.max_queued,
                        runtime,
                    )?;
                    tracing::info!(endpoint = %delivery.endpoint(), "metrics exporter created");
                    Some(Arc::new(delivery))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "malformed DSN, metrics exporter is disabled");
                    None
                }
            }
        };

        Ok(Self {
            accumulator: Accumulator::new(),
            delivery,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.delivery.is_none()
    }

    /// Temporality requested from checkpoint sets. Always delta.
    pub fn export_kind_for(&self) -> ExportKind {
        ExportKind::Delta
    }

    /// Runs one export cycle.
    ///
    /// Every record is shaped into the current batches, which are then
    /// detached and sent in the background. Returns before delivery
    /// completes; delivery failures are only logged. If a record can not be
    /// read, the cycle's batches are discarded and the error is returned.
    pub fn export(&self, checkpoints: &dyn CheckpointSet) -> ExportResult<()> {
        let Some(delivery) = &self.delivery else {
            return Ok(());
        };

        let detached = {
            let mut batches = self.accumulator.lock();
            let result = checkpoints.for_each(self.export_kind_for(), &mut |record| {
                if let Some(shaped) = shape(record)? {
                    batches.push(shaped);
                }
                Ok(())
            });
            if let Err(report) = result {
                batches.clear();
                return Err(report);
            }
            if batches.is_empty() {
                None
            } else {
                Some(batches.detach())
            }
        };

        match detached {
            Some(batches) => dispatch(delivery, batches),
            None => tracing::debug!("nothing to export"),
        }
        Ok(())
    }

    /// Sends whatever is accumulated, if anything.
    pub fn flush(&self) {
        if let (Some(delivery), Some(batches)) = (&self.delivery, self.accumulator.detach()) {
            dispatch(delivery, batches);
        }
    }

    pub fn stats(&self) -> DeliveryStats {
        self.delivery
            .as_ref()
            .map(|delivery| delivery.stats())
            .unwrap_or_default()
    }

    /// Flushes, stops accepting batches and waits for in-flight sends up to
    /// the configured shutdown timeout.
    pub async fn shutdown(&self) {
        let Some(delivery) = &self.delivery else {
            return;
        };
        self.flush();
        delivery.shutdown(self.shutdown_timeout).await;

        let stats = delivery.stats();
        tracing::info!(
            sent = stats.sent,
            failed = stats.failed,
            dropped = stats.dropped,
            "metrics exporter shut down"
        );
    }
}

fn dispatch(delivery: &Arc<Delivery>, batches: Batches) {
    tracing::debug!(
        mmsc = batches.mmsc.len(),
        quantiles = batches.quantiles.len(),
        "exporting metrics"
    );
    delivery.spawn(batches);
}
