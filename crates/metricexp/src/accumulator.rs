//! Per-exporter record batches for the current collection cycle.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use api_types::Envelope;
use api_types::MmscRecord;
use api_types::QuantileRecord;

use crate::shaper::Shaped;

/// Records shaped during one cycle, split by kind.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Batches {
    pub mmsc: Vec<MmscRecord>,
    pub quantiles: Vec<QuantileRecord>,
}

impl Batches {
    pub fn push(&mut self, record: Shaped) {
        match record {
            Shaped::Mmsc(record) => self.mmsc.push(record),
            Shaped::Quantile(record) => self.quantiles.push(record),
        }
    }

    pub fn len(&self) -> usize {
        self.mmsc.len() + self.quantiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmsc.is_empty() && self.quantiles.is_empty()
    }

    /// Moves the records out, leaving empty batches behind.
    pub fn detach(&mut self) -> Batches {
        std::mem::take(self)
    }

    pub fn clear(&mut self) {
        self.mmsc.clear();
        self.quantiles.clear();
    }
}

impl From<Batches> for Envelope {
    fn from(batches: Batches) -> Self {
        Envelope {
            mmsc: batches.mmsc,
            quantiles: batches.quantiles,
        }
    }
}

/// Batches shared by overlapping cycles on one exporter.
///
/// Appends and the detach at the end of a cycle happen under the same lock.
#[derive(Debug, Default)]
pub struct Accumulator {
    batches: Mutex<Batches>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Batches> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Detaches the current batches, or returns `None` if there is nothing to send.
    pub fn detach(&self) -> Option<Batches> {
        let mut batches = self.lock();
        if batches.is_empty() {
            None
        } else {
            Some(batches.detach())
        }
    }
}
