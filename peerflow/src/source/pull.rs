use std::{cmp, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use postgres_replication::protocol::{LogicalReplicationMessage, ReplicationMessage};
use tokio::time::{sleep_until, Instant};
use tokio_postgres::types::PgLsn;
use tracing::{debug, info, warn};

use crate::mirror::PullBounds;
use crate::records::{Checkpoint, Record, RecordBatch};
use crate::shutdown::{self, ShutdownRx};
use crate::source::cdc::{CdcStream, RecordDecoder};
use crate::source::client::SourceClientError;
use crate::source::{PgSource, SourceError};
use crate::table::TableId;

/// Cadence of activity heartbeats during pulls and bulk loads.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Best-effort activity reporting to whatever orchestrates this mirror.
/// Failures are logged and swallowed; a heartbeat must never fail a pull.
pub trait Heartbeat: Send + Sync {
    fn beat(&self, details: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub struct LogHeartbeat;

impl Heartbeat for LogHeartbeat {
    fn beat(&self, details: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        debug!(details, "heartbeat");
        Ok(())
    }
}

/// Receives the `(job_name, lsn, wall_time)` observability record after
/// non-empty pulls.
pub trait SourceLsnObserver: Send + Sync {
    fn latest_source_lsn(&self, job_name: &str, lsn: Checkpoint, observed_at: DateTime<Utc>);
}

pub struct LogLsnObserver;

impl SourceLsnObserver for LogLsnObserver {
    fn latest_source_lsn(&self, job_name: &str, lsn: Checkpoint, observed_at: DateTime<Utc>) {
        info!(job_name, lsn, %observed_at, "latest source lsn");
    }
}

impl PgSource {
    /// Streams decoded records into a bounded batch. Returns when
    /// `max_records` is reached at a commit boundary, when `max_wait`
    /// elapses (completed transactions only; staged records of an in-flight
    /// transaction are discarded and replay on the next pull), or when
    /// `idle_timeout` elapses with nothing buffered. A triggered shutdown
    /// cuts the socket and returns whatever accumulated at the last commit
    /// boundary.
    pub async fn pull_records(
        &self,
        last_offset: Checkpoint,
        bounds: PullBounds,
        heartbeat: &dyn Heartbeat,
        shutdown: &mut ShutdownRx,
    ) -> Result<RecordBatch, SourceError> {
        let slot_name = self.config().slot_name();
        let publication_name = self.config().publication_name();

        let slot = self
            .client()
            .get_slot(&slot_name)
            .await?
            .ok_or_else(|| SourceError::MissingSlot(slot_name.clone()))?;
        let publication = if self.client().publication_exists(&publication_name).await? {
            Some(publication_name)
        } else {
            // a partially provisioned mirror; keep streaming without the
            // publication's table filter and rely on the table mapping
            warn!(
                publication = publication_name,
                "publication does not exist, streaming without publication filter"
            );
            None
        };

        let start_lsn = cmp::max(last_offset, slot.confirmed_flush_lsn.into());
        let stream = self
            .client()
            .start_replication(&slot_name, publication.as_deref(), PgLsn::from(start_lsn))
            .await?;
        let stream = CdcStream::new(stream);
        tokio::pin!(stream);

        let mut decoder = RecordDecoder::new(self.config().table_name_mapping.clone());
        let mut batch = RecordBatch::empty(last_offset);
        let mut staging: Vec<Record> = Vec::new();
        let mut in_transaction = false;
        let mut commit_lsn: Checkpoint = 0;

        let started = Instant::now();
        let wait_deadline = started + bounds.max_wait;
        let idle_deadline = started + bounds.idle_timeout;
        let mut next_beat = started + HEARTBEAT_INTERVAL;

        loop {
            if batch.len() >= bounds.max_records && !in_transaction {
                break;
            }

            let now = Instant::now();
            if now >= wait_deadline {
                if in_transaction {
                    debug!(
                        staged = staging.len(),
                        "max_wait elapsed mid-transaction, staged records will replay"
                    );
                }
                break;
            }
            if now >= idle_deadline && batch.is_empty() && staging.is_empty() {
                break;
            }
            if now >= next_beat {
                if let Err(e) = heartbeat.beat(&format!("pulled {} records", batch.len())) {
                    warn!("ignoring heartbeat failure: {e}");
                }
                next_beat = now + HEARTBEAT_INTERVAL;
            }

            let mut wake = cmp::min(wait_deadline, next_beat);
            if batch.is_empty() && staging.is_empty() {
                wake = cmp::min(wake, idle_deadline);
            }

            tokio::select! {
                _ = shutdown::triggered(shutdown) => {
                    info!("pull cancelled, returning records up to the last commit boundary");
                    break;
                }
                _ = sleep_until(wake) => continue,
                message = stream.next() => {
                    let Some(message) = message else {
                        return Err(SourceError::StreamClosed);
                    };
                    let message = message.map_err(SourceClientError::from)?;

                    match message {
                        ReplicationMessage::XLogData(xlog_data) => match xlog_data.into_data() {
                            LogicalReplicationMessage::Relation(body) => {
                                decoder.handle_relation(&body)?;
                            }
                            LogicalReplicationMessage::Begin(body) => {
                                in_transaction = true;
                                commit_lsn = body.final_lsn();
                            }
                            LogicalReplicationMessage::Insert(body) => {
                                if let Some(record) = decoder.decode_insert(&body, commit_lsn)? {
                                    staging.push(record);
                                }
                            }
                            LogicalReplicationMessage::Update(body) => {
                                if let Some(record) = decoder.decode_update(&body, commit_lsn)? {
                                    staging.push(record);
                                }
                            }
                            LogicalReplicationMessage::Delete(body) => {
                                if let Some(record) = decoder.decode_delete(&body, commit_lsn)? {
                                    staging.push(record);
                                }
                            }
                            LogicalReplicationMessage::Commit(body) => {
                                for record in staging.drain(..) {
                                    batch.push(record);
                                }
                                batch.last_checkpoint =
                                    batch.last_checkpoint.max(body.commit_lsn());
                                in_transaction = false;
                                // the source may recycle WAL up to this point
                                stream
                                    .as_mut()
                                    .send_status_update(PgLsn::from(batch.last_checkpoint))
                                    .await?;
                            }
                            LogicalReplicationMessage::Truncate(_)
                            | LogicalReplicationMessage::Type(_)
                            | LogicalReplicationMessage::Origin(_) => {
                                debug!("skipping unsupported logical replication message");
                            }
                            _ => {
                                debug!("skipping unknown logical replication message");
                            }
                        },
                        ReplicationMessage::PrimaryKeepAlive(keepalive) => {
                            if keepalive.reply() == 1 {
                                stream
                                    .as_mut()
                                    .send_status_update(PgLsn::from(batch.last_checkpoint))
                                    .await?;
                            }
                        }
                        _ => {
                            debug!("skipping unknown replication message");
                        }
                    }
                }
            }
        }

        batch.table_mapping = decoder.table_mapping_snapshot();
        Ok(batch)
    }
}

/// Thin wrapper around [`PgSource::pull_records`] that reports pull metrics,
/// approximate source row counts and the latest source LSN.
pub struct PullCoordinator {
    heartbeat: Arc<dyn Heartbeat>,
    lsn_observer: Arc<dyn SourceLsnObserver>,
}

impl PullCoordinator {
    pub fn new(heartbeat: Arc<dyn Heartbeat>, lsn_observer: Arc<dyn SourceLsnObserver>) -> Self {
        PullCoordinator {
            heartbeat,
            lsn_observer,
        }
    }

    pub async fn pull_records(
        &self,
        source: &PgSource,
        last_offset: Checkpoint,
        bounds: PullBounds,
        shutdown: &mut ShutdownRx,
    ) -> Result<RecordBatch, SourceError> {
        let batch = source
            .pull_records(last_offset, bounds, self.heartbeat.as_ref(), shutdown)
            .await?;

        if !batch.is_empty() {
            let table_ids: Vec<TableId> = batch.table_mapping.keys().copied().collect();
            let total_rows_at_source = source.client().approx_row_count(&table_ids).await?;
            info!(
                job_name = %source.config().job_name,
                records = batch.len(),
                total_rows_at_source,
                "pulled record batch"
            );

            let latest = source.current_wal_lsn().await?;
            self.lsn_observer
                .latest_source_lsn(&source.config().job_name, latest, Utc::now());
        }

        if let Err(e) = self.heartbeat.beat("pull complete") {
            warn!("ignoring heartbeat failure: {e}");
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingObserver {
        seen: Mutex<Vec<(String, Checkpoint)>>,
    }

    impl SourceLsnObserver for RecordingObserver {
        fn latest_source_lsn(&self, job_name: &str, lsn: Checkpoint, _observed_at: DateTime<Utc>) {
            self.seen.lock().unwrap().push((job_name.to_string(), lsn));
        }
    }

    #[test]
    fn log_heartbeat_never_fails() {
        assert!(LogHeartbeat.beat("testing").is_ok());
    }

    #[test]
    fn observers_receive_the_reported_lsn() {
        let observer = RecordingObserver {
            seen: Mutex::new(vec![]),
        };
        observer.latest_source_lsn("job_a", 7, Utc::now());
        assert_eq!(
            observer.seen.lock().unwrap().as_slice(),
            &[("job_a".to_string(), 7)]
        );
    }
}
