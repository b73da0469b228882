//! Inbound model: what the instrumentation runtime hands to the exporter.
//!
//! A [`CheckpointSet`] is the snapshot taken at the end of one collection
//! cycle. Each [`Record`] carries a [`Descriptor`], its labels, the resource
//! labels and an [`Aggregator`] whose capabilities decide how it is exported.

use std::sync::Arc;

use api_types::KeyValue;
use api_types::Labels;
use thiserror::Error;

use crate::error::ExportResult;

/// Errors returned by aggregators when a value can not be read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("aggregation has no data")]
    NoData,
    #[error("quantile {0} is out of range [0, 1]")]
    InvalidQuantile(f64),
    #[error("inconsistent aggregator state: {0}")]
    Inconsistent(String),
}

/// Instrument kind. The discriminant is the value sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum InstrumentKind {
    ValueRecorder = 0,
    ValueObserver = 1,
    Counter = 2,
    UpDownCounter = 3,
    SumObserver = 4,
    UpDownSumObserver = 5,
}

impl InstrumentKind {
    pub fn as_i8(self) -> i8 {
        self as i8
    }
}

/// Declared numeric representation of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Int64,
    Float64,
}

/// A raw 64-bit number, interpreted according to a [`NumberKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Number(u64);

impl Number {
    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    pub fn from_f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Builds a number of the given kind from a float, truncating for integers.
    pub fn from_f64_as(value: f64, kind: NumberKind) -> Self {
        match kind {
            NumberKind::Int64 => Self::from_i64(value as i64),
            NumberKind::Float64 => Self::from_f64(value),
        }
    }

    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Converts to a float, reading the bits as `kind`.
    pub fn coerce_to_f64(self, kind: NumberKind) -> f64 {
        match kind {
            NumberKind::Int64 => self.as_i64() as f64,
            NumberKind::Float64 => self.as_f64(),
        }
    }
}

/// Aggregation temporality requested by an exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Each value is the change since the previous collection
    Delta,
    /// Each value is the total since the start of the process
    Cumulative,
}

/// Static description of an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub kind: InstrumentKind,
    pub number_kind: NumberKind,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, kind: InstrumentKind, number_kind: NumberKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            kind,
            number_kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Labels describing the process producing the measurements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    attributes: Vec<KeyValue>,
}

impl Resource {
    pub fn new(attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
        }
    }

    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Min, max, sum and count of a distribution.
pub trait MinMaxSumCount: Count {
    fn min(&self) -> Result<Number, AggregationError>;
    fn max(&self) -> Result<Number, AggregationError>;
    fn sum(&self) -> Result<Number, AggregationError>;
}

/// Point queries at arbitrary quantile levels.
pub trait Quantile {
    fn quantile(&self, q: f64) -> Result<Number, AggregationError>;
}

/// Number of observations.
pub trait Count {
    fn count(&self) -> Result<u64, AggregationError>;
}

/// Checkpointed state of one aggregator.
///
/// Capabilities are probed explicitly: an aggregator that supports none of
/// them is still valid, it is just not exported.
pub trait Aggregator: Send + Sync {
    /// Short name used in logs, e.g. `"sum"`.
    fn name(&self) -> &'static str;

    fn as_min_max_sum_count(&self) -> Option<&dyn MinMaxSumCount> {
        None
    }

    fn as_quantile(&self) -> Option<&dyn Quantile> {
        None
    }

    fn as_count(&self) -> Option<&dyn Count> {
        None
    }
}

/// Shape of an aggregation as seen by the exporter.
pub enum Aggregation<'a> {
    MinMaxSumCount(&'a dyn MinMaxSumCount),
    /// Quantile queries, with the count when the aggregator also tracks one
    Quantile(&'a dyn Quantile, Option<&'a dyn Count>),
    Unsupported(&'static str),
}

impl<'a> Aggregation<'a> {
    /// Classifies an aggregator. Min/max/sum/count wins over quantiles.
    pub fn of(aggregator: &'a dyn Aggregator) -> Self {
        if let Some(mmsc) = aggregator.as_min_max_sum_count() {
            Aggregation::MinMaxSumCount(mmsc)
        } else if let Some(quantile) = aggregator.as_quantile() {
            Aggregation::Quantile(quantile, aggregator.as_count())
        } else {
            Aggregation::Unsupported(aggregator.name())
        }
    }
}

/// One aggregated measurement.
#[derive(Clone)]
pub struct Record {
    descriptor: Arc<Descriptor>,
    labels: Labels,
    resource: Arc<Resource>,
    aggregator: Arc<dyn Aggregator>,
    temporality: ExportKind,
}

impl Record {
    pub fn new(
        descriptor: Arc<Descriptor>,
        labels: Labels,
        resource: Arc<Resource>,
        aggregator: Arc<dyn Aggregator>,
    ) -> Self {
        Self {
            descriptor,
            labels,
            resource,
            aggregator,
            temporality: ExportKind::Delta,
        }
    }

    pub fn with_temporality(mut self, temporality: ExportKind) -> Self {
        self.temporality = temporality;
        self
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn aggregation(&self) -> Aggregation<'_> {
        Aggregation::of(self.aggregator.as_ref())
    }

    pub fn temporality(&self) -> ExportKind {
        self.temporality
    }
}

/// Snapshot of aggregated records for one collection cycle.
pub trait CheckpointSet {
    /// Visits every record whose temporality matches `kind`.
    ///
    /// Iteration stops at the first error returned by `f`, which is then
    /// returned to the caller.
    fn for_each(
        &self,
        kind: ExportKind,
        f: &mut dyn FnMut(&Record) -> ExportResult<()>,
    ) -> ExportResult<()>;
}

/// In-memory checkpoint set.
#[derive(Clone, Default)]
pub struct Checkpoint {
    records: Vec<Record>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Record> for Checkpoint {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl CheckpointSet for Checkpoint {
    fn for_each(
        &self,
        kind: ExportKind,
        f: &mut dyn FnMut(&Record) -> ExportResult<()>,
    ) -> ExportResult<()> {
        self.records
            .iter()
            .filter(|record| record.temporality == kind)
            .try_for_each(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_coercion_follows_kind() {
        assert_eq!(Number::from_i64(-7).coerce_to_f64(NumberKind::Int64), -7.0);
        assert_eq!(
            Number::from_f64(2.5).coerce_to_f64(NumberKind::Float64),
            2.5
        );
        assert_eq!(
            Number::from_f64_as(3.9, NumberKind::Int64).coerce_to_f64(NumberKind::Int64),
            3.0
        );
    }

    #[test]
    fn instrument_kind_discriminants() {
        assert_eq!(InstrumentKind::ValueRecorder.as_i8(), 0);
        assert_eq!(InstrumentKind::Counter.as_i8(), 2);
        assert_eq!(InstrumentKind::UpDownSumObserver.as_i8(), 5);
    }

    struct Opaque;

    impl Aggregator for Opaque {
        fn name(&self) -> &'static str {
            "opaque"
        }
    }

    fn record(name: &str, temporality: ExportKind) -> Record {
        Record::new(
            Arc::new(Descriptor::new(
                name,
                InstrumentKind::Counter,
                NumberKind::Int64,
            )),
            Labels::default(),
            Arc::new(Resource::default()),
            Arc::new(Opaque),
        )
        .with_temporality(temporality)
    }

    #[test]
    fn for_each_filters_by_temporality() {
        let checkpoint: Checkpoint = [
            record("a", ExportKind::Delta),
            record("b", ExportKind::Cumulative),
            record("c", ExportKind::Delta),
        ]
        .into_iter()
        .collect();

        let mut seen = Vec::new();
        checkpoint
            .for_each(ExportKind::Delta, &mut |record| {
                seen.push(record.descriptor().name.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["a", "c"]);
    }

    #[test]
    fn for_each_stops_at_first_error() {
        let checkpoint: Checkpoint = (0..3).map(|_| record("x", ExportKind::Delta)).collect();

        let mut visited = 0;
        let result = checkpoint.for_each(ExportKind::Delta, &mut |_| {
            visited += 1;
            Err(error_stack::Report::new(crate::ExportError::AggregationRead {
                metric: "x".into(),
                field: "sum",
            }))
        });
        assert!(result.is_err());
        assert_eq!(visited, 1);
    }

    #[test]
    fn unsupported_aggregation_reports_name() {
        let record = record("a", ExportKind::Delta);
        assert!(matches!(
            record.aggregation(),
            Aggregation::Unsupported("opaque")
        ));
    }
}
