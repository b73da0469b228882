//! Checkpointed aggregator states.
//!
//! These cover the shapes an instrumentation runtime typically produces: a
//! summary of min/max/sum/count, an exact distribution answering quantile
//! queries, and plain sums or last values which the exporter does not ship.

use crate::checkpoint::AggregationError;
use crate::checkpoint::Aggregator;
use crate::checkpoint::Count;
use crate::checkpoint::MinMaxSumCount;
use crate::checkpoint::Number;
use crate::checkpoint::NumberKind;
use crate::checkpoint::Quantile;

/// Min, max, sum and count of the observed values.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    kind: NumberKind,
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl Summary {
    pub fn new(kind: NumberKind) -> Self {
        Self {
            kind,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }

    pub fn from_values(kind: NumberKind, values: impl IntoIterator<Item = f64>) -> Self {
        let mut summary = Self::new(kind);
        for value in values {
            summary.update(value);
        }
        summary
    }

    pub fn update(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    fn number(&self, value: f64) -> Number {
        Number::from_f64_as(value, self.kind)
    }
}

impl Count for Summary {
    fn count(&self) -> Result<u64, AggregationError> {
        Ok(self.count)
    }
}

impl MinMaxSumCount for Summary {
    fn min(&self) -> Result<Number, AggregationError> {
        if self.count == 0 {
            return Err(AggregationError::NoData);
        }
        Ok(self.number(self.min))
    }

    fn max(&self) -> Result<Number, AggregationError> {
        if self.count == 0 {
            return Err(AggregationError::NoData);
        }
        Ok(self.number(self.max))
    }

    fn sum(&self) -> Result<Number, AggregationError> {
        Ok(self.number(self.sum))
    }
}

impl Aggregator for Summary {
    fn name(&self) -> &'static str {
        "minmaxsumcount"
    }

    fn as_min_max_sum_count(&self) -> Option<&dyn MinMaxSumCount> {
        Some(self)
    }

    fn as_count(&self) -> Option<&dyn Count> {
        Some(self)
    }
}

/// Every observed value, kept sorted for exact quantile queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    kind: NumberKind,
    points: Vec<f64>,
}

impl Distribution {
    pub fn from_values(kind: NumberKind, values: impl IntoIterator<Item = f64>) -> Self {
        let mut points: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        points.sort_by(f64::total_cmp);
        Self { kind, points }
    }
}

impl Quantile for Distribution {
    /// Nearest-rank quantile.
    fn quantile(&self, q: f64) -> Result<Number, AggregationError> {
        if self.points.is_empty() {
            return Err(AggregationError::NoData);
        }
        if !(0.0..=1.0).contains(&q) {
            return Err(AggregationError::InvalidQuantile(q));
        }

        let rank = (q * self.points.len() as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(self.points.len() - 1);
        Ok(Number::from_f64_as(self.points[index], self.kind))
    }
}

impl Count for Distribution {
    fn count(&self) -> Result<u64, AggregationError> {
        Ok(self.points.len() as u64)
    }
}

impl Aggregator for Distribution {
    fn name(&self) -> &'static str {
        "distribution"
    }

    fn as_quantile(&self) -> Option<&dyn Quantile> {
        Some(self)
    }

    fn as_count(&self) -> Option<&dyn Count> {
        Some(self)
    }
}

/// Running sum, as produced for counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sum(pub Number);

impl Aggregator for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }
}

/// Most recent observation, as produced for observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastValue(pub Number);

impl Aggregator for LastValue {
    fn name(&self) -> &'static str {
        "lastvalue"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Aggregation;

    #[test]
    fn summary_tracks_moments() {
        let summary = Summary::from_values(NumberKind::Int64, [3.0, 1.0, 9.0, 7.0]);
        assert_eq!(summary.min().unwrap().as_i64(), 1);
        assert_eq!(summary.max().unwrap().as_i64(), 9);
        assert_eq!(summary.sum().unwrap().as_i64(), 20);
        assert_eq!(Count::count(&summary).unwrap(), 4);
    }

    #[test]
    fn empty_summary_has_no_min() {
        let summary = Summary::new(NumberKind::Float64);
        assert_eq!(summary.min(), Err(AggregationError::NoData));
        assert_eq!(summary.max(), Err(AggregationError::NoData));
        assert_eq!(summary.sum().unwrap().as_f64(), 0.0);
    }

    #[test]
    fn distribution_nearest_rank() {
        let dist = Distribution::from_values(NumberKind::Float64, (1..=100).rev().map(f64::from));
        let q = |level| dist.quantile(level).unwrap().as_f64();
        assert_eq!(q(0.0), 1.0);
        assert_eq!(q(0.5), 50.0);
        assert_eq!(q(0.99), 99.0);
        assert_eq!(q(1.0), 100.0);
        assert_eq!(Count::count(&dist).unwrap(), 100);
    }

    #[test]
    fn distribution_rejects_bad_queries() {
        let empty = Distribution::from_values(NumberKind::Float64, []);
        assert_eq!(empty.quantile(0.5), Err(AggregationError::NoData));

        let dist = Distribution::from_values(NumberKind::Float64, [1.0]);
        assert_eq!(
            dist.quantile(1.5),
            Err(AggregationError::InvalidQuantile(1.5))
        );
    }

    #[test]
    fn capabilities() {
        let summary = Summary::new(NumberKind::Int64);
        assert!(matches!(
            Aggregation::of(&summary),
            Aggregation::MinMaxSumCount(_)
        ));

        let dist = Distribution::from_values(NumberKind::Int64, [1.0]);
        assert!(matches!(
            Aggregation::of(&dist),
            Aggregation::Quantile(_, Some(_))
        ));

        let sum = Sum(Number::from_i64(1));
        assert!(matches!(
            Aggregation::of(&sum),
            Aggregation::Unsupported("sum")
        ));

        let last = LastValue(Number::from_f64(1.0));
        assert!(matches!(
            Aggregation::of(&last),
            Aggregation::Unsupported("lastvalue")
        ));
    }
}
