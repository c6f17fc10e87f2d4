mod logging;

use anyhow::{Context, Result, bail};
use pmoconfig::Config;
use pmorecorder::{LocalClock, RecorderConfigExt, SchedulerEngine, SchedulerEvent};
use pmostream::{ClockedOutput, CpalOutput, EventSink, HttpStreamSource, OutputBackend, RecorderEngine};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

fn output_backend(name: &str) -> Result<Arc<dyn OutputBackend>> {
    match name {
        "cpal" => Ok(Arc::new(CpalOutput::new(None))),
        "null" | "none" => Ok(Arc::new(ClockedOutput::default())),
        other => bail!("Unknown output backend '{}' (expected cpal or null)", other),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Répertoire de configuration optionnel en premier argument
    let config_dir = std::env::args().nth(1).unwrap_or_default();
    let config = Config::load_config(&config_dir)?;
    logging::init_logging(&config);

    let station = config.get_station()?;
    let schedule = config.get_schedule()?;
    info!(
        station = %station.name,
        call_sign = %station.call_sign,
        shows = schedule.len(),
        "📻 PMORecorder starting"
    );
    for show in schedule.shows() {
        info!("  - {:02} {} {}-{}", show.id, show.title, show.start.format("%H:%M"), show.end.format("%H:%M"));
    }

    let urls = config.get_source_urls()?;
    let source = HttpStreamSource::new(urls).context("Cannot build stream source")?;
    let output = output_backend(&config.get_output_backend()?)?;
    info!(output = output.name(), "Monitoring output selected");

    let (sink, engine_events) = EventSink::channel();
    let engine = RecorderEngine::new(config.get_engine_settings()?, Arc::new(source), output, sink);

    let scheduler = SchedulerEngine::new(
        config.get_scheduler_settings()?,
        schedule,
        engine,
        engine_events,
        Arc::new(LocalClock),
    );
    let mut events = scheduler.subscribe();
    let handle = scheduler.spawn();

    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SchedulerEvent::ShowStarted(show)) => {
                    info!("🎙️ {} started", show.title)
                }
                Ok(SchedulerEvent::ShowEnded(show)) => match show.file_path() {
                    Some(path) => info!("✅ {} saved to {}", show.title, path.display()),
                    None => info!("✅ {} ended", show.title),
                },
                Ok(SchedulerEvent::RecorderException(err)) => error!("❌ {}", err),
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("{} scheduler events dropped", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    handle.shutdown().await?;
    reporter.abort();
    info!("👋 Bye");
    Ok(())
}
