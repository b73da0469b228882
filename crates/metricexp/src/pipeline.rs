//! Periodic push pipeline: collect a checkpoint set, export it, repeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::Checkpoint;
use crate::config::Config;
use crate::error::ExportResult;
use crate::exporter::Exporter;

/// Produces the checkpoint set for one collection cycle.
pub trait CheckpointSource: Send + Sync + 'static {
    /// Snapshots and resets the current aggregation state.
    fn collect(&self) -> Checkpoint;
}

impl<F> CheckpointSource for F
where
    F: Fn() -> Checkpoint + Send + Sync + 'static,
{
    fn collect(&self) -> Checkpoint {
        self()
    }
}

/// Drives an [`Exporter`] from a [`CheckpointSource`] on a fixed period.
pub struct PushController {
    exporter: Arc<Exporter>,
    source: Arc<dyn CheckpointSource>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PushController {
    /// Builds an exporter from `config` and starts pushing every
    /// `config.period`.
    pub fn from_config(
        config: Config,
        source: Arc<dyn CheckpointSource>,
        runtime: Handle,
    ) -> ExportResult<Self> {
        let period = config.period;
        let exporter = Arc::new(Exporter::new(config, runtime.clone())?);
        Ok(Self::start(exporter, source, period, &runtime))
    }

    /// Starts the collection loop on `runtime`. The first collection happens
    /// one period after the start.
    pub fn start(
        exporter: Arc<Exporter>,
        source: Arc<dyn CheckpointSource>,
        period: Duration,
        runtime: &Handle,
    ) -> Self {
        let period = period.max(Duration::from_millis(1));
        let token = CancellationToken::new();

        let task = {
            let exporter = exporter.clone();
            let source = source.clone();
            let token = token.clone();
            runtime.spawn(async move {
                tracing::info!(
                    period_secs = period.as_secs_f32(),
                    "starting metrics push loop"
                );
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = interval.tick() => collect_and_export(source.as_ref(), &exporter),
                    }
                }
                tracing::info!("metrics push loop stopped");
            })
        };

        Self {
            exporter,
            source,
            token,
            task,
        }
    }

    pub fn exporter(&self) -> &Arc<Exporter> {
        &self.exporter
    }

    /// Stops the loop, runs one last collection and waits for in-flight
    /// sends.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::error!("Push loop failed during shutdown: {e}");
        }
        collect_and_export(self.source.as_ref(), &self.exporter);
        self.exporter.shutdown().await;
    }
}

fn collect_and_export(source: &dyn CheckpointSource, exporter: &Exporter) {
    let checkpoint = source.collect();
    if let Err(report) = exporter.export(&checkpoint) {
        tracing::error!(error = ?report, "export failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[derive(Default)]
    struct CountingSource {
        collected: AtomicUsize,
    }

    impl CheckpointSource for CountingSource {
        fn collect(&self) -> Checkpoint {
            self.collected.fetch_add(1, Ordering::SeqCst);
            Checkpoint::new()
        }
    }

    #[tokio::test]
    async fn collects_periodically_and_once_more_on_shutdown() {
        let source = Arc::new(CountingSource::default());
        let config = Config::new("").with_disabled(true);
        let exporter = Arc::new(Exporter::new(config, Handle::current()).unwrap());

        let controller = PushController::start(
            exporter,
            source.clone(),
            Duration::from_millis(20),
            &Handle::current(),
        );
        tokio::time::sleep(Duration::from_millis(110)).await;
        let before_shutdown = source.collected.load(Ordering::SeqCst);
        controller.shutdown().await;

        assert!(before_shutdown >= 1);
        assert_eq!(source.collected.load(Ordering::SeqCst), before_shutdown + 1);
    }

    #[tokio::test]
    async fn closures_are_sources() {
        let source: Arc<dyn CheckpointSource> = Arc::new(Checkpoint::new);
        let config = Config::new("").with_disabled(true);
        let controller = PushController::from_config(config, source, Handle::current()).unwrap();
        assert!(controller.exporter().is_disabled());
        controller.shutdown().await;
    }
}
