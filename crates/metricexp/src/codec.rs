//! Payload codec: msgpack with named fields, then s2 block compression.
//!
//! The compressed body is a snappy block, which s2 decoders accept as is.
//! Encoders carry reusable buffers and are handed out by an [`EncoderPool`].

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub const CONTENT_TYPE: &str = "application/msgpack";
pub const CONTENT_ENCODING: &str = "s2";

/// Buffers above this size are not returned to the pool.
const MAX_POOLED_CAPACITY: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("msgpack encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("s2 compression failed: {0}")]
    Compress(#[source] snap::Error),
    #[error("s2 decompression failed: {0}")]
    Decompress(#[source] snap::Error),
}

/// Reusable msgpack buffer and block compressor.
pub struct Encoder {
    buf: Vec<u8>,
    compressor: snap::raw::Encoder,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            compressor: snap::raw::Encoder::new(),
        }
    }

    /// Serializes `value` and returns the compressed bytes.
    pub fn encode_s2<T: Serialize>(&mut self, value: &T) -> Result<Vec<u8>, CodecError> {
        self.buf.clear();
        rmp_serde::encode::write_named(&mut self.buf, value)?;
        self.compressor
            .compress_vec(&self.buf)
            .map_err(CodecError::Compress)
    }
}

/// Inverse of [`Encoder::encode_s2`].
pub fn decode_s2<T: DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    let raw = snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(CodecError::Decompress)?;
    Ok(rmp_serde::from_slice(&raw)?)
}

/// Pool of idle encoders.
pub struct EncoderPool {
    idle: Mutex<Vec<Encoder>>,
    max_idle: usize,
}

impl EncoderPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Takes an idle encoder or creates one. It goes back to the pool when the
    /// guard is dropped, whatever the outcome of the encoding.
    pub fn get(&self) -> PooledEncoder<'_> {
        let encoder = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();

        PooledEncoder {
            pool: self,
            encoder,
        }
    }

    /// Number of encoders waiting in the pool.
    pub fn idle(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn put(&self, encoder: Encoder) {
        if encoder.buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(encoder);
        }
    }
}

/// Encoder checked out of an [`EncoderPool`].
pub struct PooledEncoder<'a> {
    pool: &'a EncoderPool,
    encoder: Encoder,
}

impl Deref for PooledEncoder<'_> {
    type Target = Encoder;

    fn deref(&self) -> &Encoder {
        &self.encoder
    }
}

impl DerefMut for PooledEncoder<'_> {
    fn deref_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }
}

impl Drop for PooledEncoder<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.encoder));
    }
}

#[cfg(test)]
mod tests {
    use api_types::BaseRecord;
    use api_types::Envelope;
    use api_types::KeyValue;
    use api_types::Labels;
    use api_types::MmscRecord;

    use super::*;

    fn mmsc(name: &str, labels: Option<Labels>) -> MmscRecord {
        MmscRecord {
            base: BaseRecord {
                name: name.to_string(),
                description: "queue depth".to_string(),
                unit: "1".to_string(),
                kind: 0,
                labels,
                time: 1_600_000_000_123_456_789,
            },
            min: 1.0,
            max: 9.0,
            sum: 20.0,
            count: 4,
        }
    }

    #[test]
    fn envelope_round_trip_without_quantiles() {
        let envelope = Envelope {
            mmsc: vec![
                mmsc("queue.depth", None),
                mmsc(
                    "queue.wait",
                    Some(Labels(vec![
                        KeyValue::new("queue", "jobs"),
                        KeyValue::new("queue", "retry"),
                        KeyValue::new("shard", 7i64),
                    ])),
                ),
            ],
            quantiles: vec![],
        };

        let pool = EncoderPool::new(2);
        let body = pool.get().encode_s2(&envelope).unwrap();

        let decoded: Envelope = decode_s2(&body).unwrap();
        assert!(decoded.quantiles.is_empty());
        similar_asserts::assert_eq!(decoded.mmsc, envelope.mmsc);
    }

    #[test]
    fn empty_batches_are_absent_on_the_wire() {
        let envelope = Envelope {
            mmsc: vec![mmsc("queue.depth", None)],
            quantiles: vec![],
        };
        let body = Encoder::new().encode_s2(&envelope).unwrap();

        let raw = snap::raw::Decoder::new().decompress_vec(&body).unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&raw).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["mmsc"]);
        assert_eq!(value["mmsc"][0]["name"], "queue.depth");
        assert_eq!(value["mmsc"][0]["count"], 4);
    }

    #[test]
    fn encoders_return_to_the_pool() {
        let pool = EncoderPool::new(1);
        assert_eq!(pool.idle(), 0);

        {
            let mut first = pool.get();
            let mut second = pool.get();
            first.encode_s2(&Envelope::default()).unwrap();
            second.encode_s2(&Envelope::default()).unwrap();
        }
        // capped at max_idle
        assert_eq!(pool.idle(), 1);

        let _reused = pool.get();
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn garbage_does_not_decode() {
        let result: Result<Envelope, _> = decode_s2(b"definitely not s2");
        assert!(result.is_err());
    }
}
