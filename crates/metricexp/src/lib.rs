//! Periodic metrics exporter.
//!
//! Each collection cycle hands a [`CheckpointSet`] to [`Exporter::export`].
//! Records whose aggregation reports min/max/sum/count, or answers quantile
//! queries, are shaped into wire records and accumulated. At the end of the
//! cycle the batches are detached, encoded as msgpack, compressed with s2 and
//! POSTed to `/api/v1/projects/{project_id}/metrics` with the DSN token as a
//! bearer token. Delivery runs in the background and is never retried.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use metricexp::{Checkpoint, Config, PushController};
//! # async fn run() -> metricexp::ExportResult<()> {
//! let config = Config::new("https://token@uptrace.dev/1");
//! let controller = PushController::from_config(
//!     config,
//!     Arc::new(Checkpoint::new),
//!     tokio::runtime::Handle::current(),
//! )?;
//! // ...
//! controller.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod aggregators;
pub mod checkpoint;
pub mod codec;
pub mod config;
mod delivery;
pub mod dsn;
pub mod error;
pub mod exporter;
pub mod pipeline;
pub mod shaper;

pub use checkpoint::Checkpoint;
pub use checkpoint::CheckpointSet;
pub use checkpoint::ExportKind;
pub use config::Config;
pub use delivery::DeliveryStats;
pub use error::ExportError;
pub use error::ExportResult;
pub use exporter::Exporter;
pub use pipeline::CheckpointSource;
pub use pipeline::PushController;
