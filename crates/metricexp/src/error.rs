//! Error types for the metrics exporter.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

/// Result type for exporter operations.
pub type ExportResult<T> = Result<T, Report<ExportError>>;

/// Errors raised by the exporter.
///
/// Only [`ExportError::AggregationRead`] ever reaches the caller of
/// [`crate::Exporter::export`]. A malformed connection string is reported once
/// when the exporter is built, and delivery failures stay inside the send task.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ExportError {
    /// The DSN could not be resolved into an endpoint and token
    #[display("Malformed connection string: {message}")]
    MalformedConnectionString { message: String },

    /// A numeric field could not be read from an aggregation
    #[display("Failed to read {field} of metric {metric}")]
    AggregationRead { metric: String, field: &'static str },

    /// The envelope could not be serialized or compressed
    #[display("Encoding error: {message}")]
    Encoding { message: String },

    /// The ingestion endpoint rejected the batch or could not be reached
    #[display("Delivery error: {message}")]
    Delivery { message: String },

    /// Invalid configuration, such as an HTTP client that cannot be built
    #[display("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error for ExportError {}
