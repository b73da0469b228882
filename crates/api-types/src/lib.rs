//! Shared API type definitions
//!
//! This crate contains the record types accepted by the metrics ingestion API
//! (`POST /api/v1/projects/{project_id}/metrics`). Every struct is encoded as a
//! map keyed by field name, so the msgpack encoder must run in named-field mode.

use std::fmt;

use serde::de::MapAccess;
use serde::de::Visitor;
use serde::ser::SerializeMap;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;

/// Quantile levels reported by every [`QuantileRecord`], in wire order.
pub const QUANTILES: [f64; 5] = [0.5, 0.75, 0.9, 0.95, 0.99];

/// Label value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// A single label pair
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered label pairs.
///
/// Encoded as a map in insertion order. Keys may repeat: resource labels come
/// first and record labels follow without any merging.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Labels(pub Vec<KeyValue>);

impl Labels {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, kv: KeyValue) {
        self.0.push(kv);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }
}

impl FromIterator<KeyValue> for Labels {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Labels {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for kv in &self.0 {
            map.serialize_entry(&kv.key, &kv.value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Labels {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelsVisitor;

        impl<'de> Visitor<'de> for LabelsVisitor {
            type Value = Labels;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of label pairs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Labels, A::Error> {
                let mut labels = Labels::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    labels.push(KeyValue { key, value });
                }
                Ok(labels)
            }
        }

        deserializer.deserialize_map(LabelsVisitor)
    }
}

/// Fields shared by every exported record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRecord {
    pub name: String,
    pub description: String,
    pub unit: String,
    /// Instrument kind discriminator
    pub kind: i8,
    /// `None` when neither the resource nor the record carries labels
    pub labels: Option<Labels>,
    /// Capture time in nanoseconds since the unix epoch
    pub time: i64,
}

/// Summary of a distribution tracking only min, max, sum and count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmscRecord {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub min: f32,
    pub max: f32,
    pub sum: f64,
    pub count: u64,
}

impl fmt::Display for MmscRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={} min={:.6} max={:.6} sum={:.6} count={}",
            self.base.name, self.min, self.max, self.sum, self.count
        )
    }
}

/// Distribution sampled at the fixed [`QUANTILES`] levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileRecord {
    #[serde(flatten)]
    pub base: BaseRecord,
    pub count: u64,
    /// Values positionally matching [`QUANTILES`]
    pub quantiles: [f32; 5],
}

impl fmt::Display for QuantileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={} count={} quantiles={:?}",
            self.base.name, self.count, self.quantiles
        )
    }
}

/// Top-level payload of one delivery.
///
/// Empty batches are left out of the encoded map entirely.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mmsc: Vec<MmscRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quantiles: Vec<QuantileRecord>,
}

impl Envelope {
    pub fn is_empty(&self) -> bool {
        self.mmsc.is_empty() && self.quantiles.is_empty()
    }
}
