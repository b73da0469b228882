//! Synthetic instruments recording fake HTTP traffic.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use api_types::KeyValue;
use api_types::Labels;
use metricexp::aggregators::Distribution;
use metricexp::aggregators::Sum;
use metricexp::aggregators::Summary;
use metricexp::checkpoint::Aggregator;
use metricexp::checkpoint::Descriptor;
use metricexp::checkpoint::InstrumentKind;
use metricexp::checkpoint::Number;
use metricexp::checkpoint::NumberKind;
use metricexp::checkpoint::Record;
use metricexp::checkpoint::Resource;
use metricexp::Checkpoint;
use metricexp::CheckpointSource;

#[derive(Default)]
struct Window {
    latencies_ms: Vec<f64>,
    requests: i64,
}

/// Collects request latencies between two collections.
pub struct Recorder {
    resource: Arc<Resource>,
    duration: Arc<Descriptor>,
    latency: Arc<Descriptor>,
    requests: Arc<Descriptor>,
    labels: Labels,
    window: Mutex<Window>,
}

impl Recorder {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource: Arc::new(resource),
            duration: Arc::new(
                Descriptor::new(
                    "http.server.duration",
                    InstrumentKind::ValueRecorder,
                    NumberKind::Float64,
                )
                .with_description("HTTP request duration")
                .with_unit("ms"),
            ),
            latency: Arc::new(
                Descriptor::new(
                    "http.server.latency",
                    InstrumentKind::ValueRecorder,
                    NumberKind::Float64,
                )
                .with_description("HTTP request latency distribution")
                .with_unit("ms"),
            ),
            requests: Arc::new(
                Descriptor::new(
                    "http.server.requests",
                    InstrumentKind::Counter,
                    NumberKind::Int64,
                )
                .with_description("HTTP requests served"),
            ),
            labels: Labels(vec![
                KeyValue::new("http.method", "GET"),
                KeyValue::new("http.route", "/api/items"),
            ]),
            window: Mutex::new(Window::default()),
        }
    }

    pub fn record_request(&self, latency_ms: f64) {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.latencies_ms.push(latency_ms);
        window.requests += 1;
    }

    fn record(&self, descriptor: &Arc<Descriptor>, aggregator: Arc<dyn Aggregator>) -> Record {
        Record::new(
            descriptor.clone(),
            self.labels.clone(),
            self.resource.clone(),
            aggregator,
        )
    }
}

impl CheckpointSource for Recorder {
    fn collect(&self) -> Checkpoint {
        let mut guard = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let window = std::mem::take(&mut *guard);
        drop(guard);

        let mut checkpoint = Checkpoint::new();
        if window.latencies_ms.is_empty() {
            return checkpoint;
        }

        let latencies = window.latencies_ms;
        let summary = Summary::from_values(NumberKind::Float64, latencies.iter().copied());
        let distribution = Distribution::from_values(NumberKind::Float64, latencies);
        checkpoint.push(self.record(&self.duration, Arc::new(summary)));
        checkpoint.push(self.record(&self.latency, Arc::new(distribution)));
        // skipped by the exporter
        let requests = Sum(Number::from_i64(window.requests));
        checkpoint.push(self.record(&self.requests, Arc::new(requests)));

        tracing::debug!(records = checkpoint.len(), "collected demo metrics");
        checkpoint
    }
}

/// Deterministic latency pattern: a slow wave with a spike every 97th request.
pub fn synthetic_latency_ms(seq: u64) -> f64 {
    let wave = (seq as f64 / 50.0).sin() * 20.0;
    let spike = if seq % 97 == 0 { 250.0 } else { 0.0 };
    let jitter = (seq.wrapping_mul(2_654_435_761) % 1000) as f64 / 100.0;
    40.0 + wave + spike + jitter
}
