//! flowcore server
//!
//! Deploys the YAML models given as arguments, then reads one JSON command
//! per line from stdin and writes every committed record to stdout as a
//! JSON line. Logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowcore_core::{
    ChannelJobNotifier, ClientCommand, CommandRequest, ElementAction, Engine, EngineConfig, Record,
    RecordLog, Services, SystemClock,
};

/// Points at an optional YAML config file.
const ENV_CONFIG: &str = "FLOWCORE_CONFIG";

const REQUEST_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(
        partition_id = config.partition_id,
        terminate_batch_size = config.processing.terminate_batch_size,
        "Starting flowcore"
    );

    let (notifier, mut work_available) = ChannelJobNotifier::channel();
    let services = Services::new(std::sync::Arc::new(SystemClock)).with_notifier(notifier);

    let (exporter, exported) = mpsc::unbounded_channel();
    let mut engine = Engine::new(config, services).with_exporter(exporter);

    for path in std::env::args_os().skip(1).map(PathBuf::from) {
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("reading model {}", path.display()))?;
        let definition_key = engine
            .deploy_yaml(&source)
            .with_context(|| format!("deploying {}", path.display()))?;
        tracing::info!(path = %path.display(), definition_key, "Model deployed");
    }

    let (requests, receiver) = mpsc::channel(REQUEST_BUFFER);
    tokio::spawn(read_requests(requests));
    let writer = tokio::spawn(write_records(exported));
    tokio::spawn(async move {
        while let Some(job_type) = work_available.recv().await {
            tracing::info!(job_type = %job_type, "jobs available");
        }
    });

    tokio::select! {
        _ = engine.run(receiver) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    tracing::info!(
        records = engine.log().records().len(),
        completed = engine.metrics().total(ElementAction::Completed),
        "Shutting down"
    );
    drop(engine);
    writer.await.context("record writer panicked")?;
    Ok(())
}

fn load_config() -> anyhow::Result<EngineConfig> {
    match std::env::var(ENV_CONFIG) {
        Ok(path) => {
            let path = PathBuf::from(path);
            let config = EngineConfig::load_from_file(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            Ok(config.with_overrides(|name| std::env::var(name).ok())?)
        }
        Err(_) => Ok(EngineConfig::from_env()?),
    }
}

async fn read_requests(requests: mpsc::Sender<CommandRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let request = serde_json::from_str::<ClientCommand>(&line)
            .map_err(anyhow::Error::from)
            .and_then(|command| CommandRequest::try_from(command).map_err(anyhow::Error::from));
        match request {
            Ok(request) => {
                if requests.send(request).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed command"),
        }
    }
    tracing::debug!("stdin closed");
}

async fn write_records(mut records: mpsc::UnboundedReceiver<Record>) {
    let mut stdout = tokio::io::stdout();
    while let Some(record) = records.recv().await {
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, position = record.position, "Failed to encode record");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            tracing::error!(error = %e, "Failed to write record");
            break;
        }
    }
    let _ = stdout.flush().await;
}
