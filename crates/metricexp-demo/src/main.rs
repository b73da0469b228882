mod config;
mod recorder;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use metricexp::PushController;
use tokio::runtime::Handle;
use tokio::sync::watch;
use utils::logging;
use utils::version;

use crate::config::DemoArgs;
use crate::recorder::synthetic_latency_ms;
use crate::recorder::Recorder;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let args = DemoArgs::parse();
    let _guard = match &args.log_file {
        Some(path) => {
            let guard = logging::init_with_file(path).context("init file logging failed")?;
            Some(guard)
        }
        None => {
            logging::init();
            None
        }
    };

    tracing::info!("Starting metricexp demo {}", &**version::VERSION);

    let config = args.exporter_config()?;
    let recorder = Arc::new(Recorder::new(config.resource()));
    let controller = PushController::from_config(config, recorder.clone(), Handle::current())
        .map_err(|e| anyhow::anyhow!("Failed to start metrics pipeline: {e:?}"))?;
    if controller.exporter().is_disabled() {
        tracing::warn!("exporter is disabled, metrics are recorded but not sent");
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let traffic = tokio::spawn(generate_traffic(recorder, args.requests_per_sec, stop_rx));

    wait_for_signal().await?;

    let _ = stop_tx.send(true);
    if let Err(e) = traffic.await {
        tracing::error!("Traffic task failed: {e}");
    }
    controller.shutdown().await;

    Ok(())
}

/// Records `per_sec` synthetic requests per second in 100ms slices.
async fn generate_traffic(recorder: Arc<Recorder>, per_sec: u32, mut stop: watch::Receiver<bool>) {
    let per_tick = (per_sec / 10).max(1);
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    let mut seq = 0u64;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                for _ in 0..per_tick {
                    seq += 1;
                    recorder.record_request(synthetic_latency_ms(seq));
                }
            }
        }
    }
    tracing::info!(requests = seq, "traffic generator stopped");
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    }
    Ok(())
}
