//! Conversion of aggregated records into wire records.

use api_types::BaseRecord;
use api_types::Labels;
use api_types::MmscRecord;
use api_types::QuantileRecord;
use api_types::QUANTILES;
use chrono::Utc;
use error_stack::ResultExt;

use crate::checkpoint::Aggregation;
use crate::checkpoint::AggregationError;
use crate::checkpoint::Count;
use crate::checkpoint::MinMaxSumCount;
use crate::checkpoint::Number;
use crate::checkpoint::Quantile;
use crate::checkpoint::Record;
use crate::error::ExportError;
use crate::error::ExportResult;

/// Output of shaping one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped {
    Mmsc(MmscRecord),
    Quantile(QuantileRecord),
}

/// Converts one record. Returns `Ok(None)` for aggregations that are neither
/// min/max/sum/count nor quantile-queryable.
pub fn shape(record: &Record) -> ExportResult<Option<Shaped>> {
    match record.aggregation() {
        Aggregation::MinMaxSumCount(agg) => shape_mmsc(record, agg).map(|r| Some(Shaped::Mmsc(r))),
        Aggregation::Quantile(agg, count) => {
            shape_quantile(record, agg, count).map(|r| Some(Shaped::Quantile(r)))
        }
        Aggregation::Unsupported(name) => {
            tracing::trace!(
                metric = %record.descriptor().name,
                aggregator = name,
                "skipping unsupported aggregation"
            );
            Ok(None)
        }
    }
}

fn shape_mmsc(record: &Record, agg: &dyn MinMaxSumCount) -> ExportResult<MmscRecord> {
    let base = base_record(record);
    let number_kind = record.descriptor().number_kind;
    let metric = &record.descriptor().name;

    let min = read(metric, "min", agg.min())?;
    let max = read(metric, "max", agg.max())?;
    let sum = read(metric, "sum", agg.sum())?;
    let count = read(metric, "count", agg.count())?;

    Ok(MmscRecord {
        base,
        min: min.coerce_to_f64(number_kind) as f32,
        max: max.coerce_to_f64(number_kind) as f32,
        sum: sum.coerce_to_f64(number_kind),
        count,
    })
}

fn shape_quantile(
    record: &Record,
    agg: &dyn Quantile,
    count: Option<&dyn Count>,
) -> ExportResult<QuantileRecord> {
    let base = base_record(record);
    let number_kind = record.descriptor().number_kind;
    let metric = &record.descriptor().name;

    let count = match count {
        Some(count) => read(metric, "count", count.count())?,
        None => 0,
    };

    let mut quantiles = [0f32; QUANTILES.len()];
    for (slot, level) in quantiles.iter_mut().zip(QUANTILES) {
        let value: Number = read(metric, "quantile", agg.quantile(level))?;
        *slot = value.coerce_to_f64(number_kind) as f32;
    }

    Ok(QuantileRecord {
        base,
        count,
        quantiles,
    })
}

fn read<T>(
    metric: &str,
    field: &'static str,
    value: Result<T, AggregationError>,
) -> ExportResult<T> {
    value.change_context(ExportError::AggregationRead {
        metric: metric.to_string(),
        field,
    })
}

/// Fills the fields shared by both record kinds. The timestamp is taken here,
/// per record, rather than once per cycle.
fn base_record(record: &Record) -> BaseRecord {
    let descriptor = record.descriptor();

    BaseRecord {
        name: descriptor.name.clone(),
        description: descriptor.description.clone(),
        unit: descriptor.unit.clone(),
        kind: descriptor.kind.as_i8(),
        labels: labels(record),
        time: Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX),
    }
}

/// Resource labels followed by record labels, or `None` if there are none.
fn labels(record: &Record) -> Option<Labels> {
    let resource = record.resource().attributes();
    let own = record.labels();
    if resource.is_empty() && own.is_empty() {
        return None;
    }

    let mut labels = Labels::with_capacity(resource.len() + own.len());
    for kv in resource.iter().chain(own.iter()) {
        labels.push(kv.clone());
    }
    Some(labels)
}
