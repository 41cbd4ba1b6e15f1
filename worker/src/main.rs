use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tracing::info;

use peerflow::destination::postgres::PostgresDestination;
use peerflow::destination::s3::S3Destination;
use peerflow::destination::Destination;
use peerflow::mirror::PullBounds;
use peerflow::shutdown::shutdown_channel;
use peerflow::source::pull::{LogHeartbeat, LogLsnObserver, PullCoordinator};
use peerflow::source::PgSource;

use crate::config::{DestinationSettings, WorkerConfig};

mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_flusher = telemetry::init_tracing(env!("CARGO_BIN_NAME"))?;
    let settings = config::load()?;
    run(settings).await
}

/// Drives one mirror: pull from the source, sync into the raw table,
/// normalize, repeat until ctrl-c.
async fn run(settings: WorkerConfig) -> anyhow::Result<()> {
    if settings.mirror.do_initial_copy {
        bail!("initial copies are coordinated by the workflow engine, not this worker");
    }

    let bounds = PullBounds::new(
        settings.batch.max_records,
        Duration::from_secs(settings.batch.max_wait_secs),
        Duration::from_secs(settings.batch.idle_timeout_secs),
    );

    let source = PgSource::connect(&settings.source, settings.mirror.clone()).await?;
    let destination: Box<dyn Destination> = match &settings.destination {
        DestinationSettings::Postgres(options) => Box::new(
            PostgresDestination::connect(options, settings.mirror.write_mode).await?,
        ),
        DestinationSettings::S3(options) => Box::new(S3Destination::new(options)?),
    };

    let job_name = settings.mirror.job_name.clone();

    if destination.needs_setup_metadata().await? {
        destination.setup_metadata().await?;
    }
    destination.create_raw_table(&job_name).await?;
    source.ensure_pullability().await?;
    let schemas = source.get_table_schemas().await?;
    destination.setup_normalized_tables(&schemas).await?;
    source.setup_replication(None).await?;

    let (shutdown_tx, mut shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown_tx.trigger();
        }
    });

    let coordinator = PullCoordinator::new(Arc::new(LogHeartbeat), Arc::new(LogLsnObserver));
    info!(job_name, "mirror started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let last_offset = destination.get_last_offset(&job_name).await?.unwrap_or(0);
        let batch = coordinator
            .pull_records(&source, last_offset, bounds, &mut shutdown_rx)
            .await?;

        if !batch.is_empty() {
            let sync = destination.sync_records(&job_name, &batch).await?;
            info!(
                job_name,
                records = sync.num_records,
                sync_batch_id = sync.sync_batch_id,
                last_checkpoint = sync.last_checkpoint,
                "sync complete"
            );
        }

        let normalize = destination.normalize_records(&job_name).await?;
        if normalize.start_batch_id <= normalize.end_batch_id {
            info!(
                job_name,
                start_batch_id = normalize.start_batch_id,
                end_batch_id = normalize.end_batch_id,
                "normalize complete"
            );
        }
    }

    source.close();
    info!(job_name, "mirror stopped");
    Ok(())
}
