use std::cmp;
use std::collections::HashMap;

use async_trait::async_trait;
use awscreds::Credentials;
use awsregion::Region;
use s3::Bucket;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::destination::{
    raw_rows_for_batch, Destination, DestinationError, NormalizeResponse, SyncResponse,
};
use crate::records::{Checkpoint, RecordBatch};
use crate::table::TableSchema;

use self::avro::{encode_raw_batch, RawAvroRecord};

pub mod avro;

/// Object storage as a mirror destination: each synced batch becomes one
/// Avro OCF object under the job's raw prefix, and a small JSON state object
/// plays the job-metadata role. There are no normalized tables; normalize
/// only advances the batch counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// `s3://bucket` or `s3://bucket/prefix`.
    pub url: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (minio et al).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct JobState {
    last_offset: u64,
    sync_batch_id: i64,
    normalize_batch_id: i64,
}

pub struct S3Destination {
    bucket: Bucket,
    prefix: String,
}

fn parse_storage_url(url: &str) -> Result<(String, String), DestinationError> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| DestinationError::InvalidStorageUrl(url.to_string()))?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(DestinationError::InvalidStorageUrl(url.to_string()));
    }

    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    Ok((bucket.to_string(), prefix))
}

fn job_object_prefix(prefix: &str, job_name: &str) -> String {
    format!("{prefix}{job_name}/")
}

fn state_object_key(prefix: &str, job_name: &str) -> String {
    format!("{prefix}{job_name}/metadata.json")
}

fn raw_object_key(prefix: &str, job_name: &str, batch_id: i64) -> String {
    format!("{prefix}{job_name}/raw/{batch_id:020}.avro")
}

impl S3Destination {
    pub fn new(config: &S3Config) -> Result<S3Destination, DestinationError> {
        let (bucket_name, prefix) = parse_storage_url(&config.url)?;

        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|_| DestinationError::InvalidRegion(config.region.clone()))?,
        };

        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key), Some(secret)) => {
                Credentials::new(Some(key), Some(secret), None, None, None)?
            }
            _ => Credentials::default()?,
        };

        let bucket = Bucket::new(&bucket_name, region, credentials)?.with_path_style();
        Ok(S3Destination { bucket, prefix })
    }

    fn ensure_2xx(
        op: &'static str,
        key: &str,
        status: u16,
    ) -> Result<(), DestinationError> {
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(DestinationError::StorageStatus {
                op,
                key: key.to_string(),
                status,
            })
        }
    }

    async fn read_state(&self, job_name: &str) -> Result<Option<JobState>, DestinationError> {
        let key = state_object_key(&self.prefix, job_name);

        // listing avoids having to distinguish a missing object from other
        // get failures
        let results = self.bucket.list(key.clone(), None).await?;
        let exists = results
            .iter()
            .any(|result| result.contents.iter().any(|object| object.key == key));
        if !exists {
            return Ok(None);
        }

        let response = self.bucket.get_object(&key).await?;
        Self::ensure_2xx("get", &key, response.status_code())?;
        let state = serde_json::from_slice(response.as_slice())?;
        Ok(Some(state))
    }

    async fn write_state(&self, job_name: &str, state: &JobState) -> Result<(), DestinationError> {
        let key = state_object_key(&self.prefix, job_name);
        let payload = serde_json::to_vec(state)?;
        let response = self.bucket.put_object(&key, &payload).await?;
        Self::ensure_2xx("put", &key, response.status_code())
    }
}

#[async_trait]
impl Destination for S3Destination {
    async fn needs_setup_metadata(&self) -> Result<bool, DestinationError> {
        Ok(false)
    }

    async fn setup_metadata(&self) -> Result<(), DestinationError> {
        info!("metadata setup not needed for object storage");
        Ok(())
    }

    async fn create_raw_table(&self, job_name: &str) -> Result<(), DestinationError> {
        // raw objects are created per batch; this just proves the bucket is
        // reachable before the mirror starts
        self.bucket
            .list(job_object_prefix(&self.prefix, job_name), Some("/".to_string()))
            .await?;
        info!(job_name, "object storage raw prefix is reachable");
        Ok(())
    }

    async fn get_table_schema(
        &self,
        _identifiers: &[String],
    ) -> Result<HashMap<String, TableSchema>, DestinationError> {
        Err(DestinationError::Unsupported("table schema introspection"))
    }

    async fn setup_normalized_tables(
        &self,
        _schemas: &HashMap<String, TableSchema>,
    ) -> Result<(), DestinationError> {
        info!("normalized tables not needed for object storage");
        Ok(())
    }

    async fn sync_records(
        &self,
        job_name: &str,
        batch: &RecordBatch,
    ) -> Result<SyncResponse, DestinationError> {
        let state = self.read_state(job_name).await?.unwrap_or_default();
        if batch.is_empty() {
            return Ok(SyncResponse::empty(state.sync_batch_id));
        }
        let sync_batch_id = state.sync_batch_id + 1;

        let rows = raw_rows_for_batch(batch);
        let records: Vec<RawAvroRecord> = rows
            .iter()
            .map(|row| RawAvroRecord::from_raw_row(row, sync_batch_id))
            .collect();
        let payload = encode_raw_batch(&records)?;

        let key = raw_object_key(&self.prefix, job_name, sync_batch_id);
        let response = self.bucket.put_object(&key, &payload).await?;
        Self::ensure_2xx("put", &key, response.status_code())?;

        // the raw object lands before the state advances; a crash in between
        // rewrites the same key on retry
        let state = JobState {
            last_offset: cmp::max(state.last_offset, batch.last_checkpoint),
            sync_batch_id,
            normalize_batch_id: state.normalize_batch_id,
        };
        self.write_state(job_name, &state).await?;

        info!(
            job_name,
            records = rows.len(),
            sync_batch_id,
            key,
            "synced records to object storage"
        );
        Ok(SyncResponse {
            first_checkpoint: batch.first_checkpoint,
            last_checkpoint: batch.last_checkpoint,
            num_records: rows.len() as u64,
            sync_batch_id,
            table_rows: batch.table_name_to_row_count.clone(),
        })
    }

    async fn normalize_records(&self, job_name: &str) -> Result<NormalizeResponse, DestinationError> {
        let Some(state) = self.read_state(job_name).await? else {
            return Ok(NormalizeResponse {
                done: true,
                start_batch_id: 0,
                end_batch_id: 0,
            });
        };

        if state.sync_batch_id == state.normalize_batch_id {
            return Ok(NormalizeResponse {
                done: true,
                start_batch_id: state.normalize_batch_id,
                end_batch_id: state.sync_batch_id,
            });
        }

        // no normalized tables on object storage; advancing the counter is
        // the whole of normalize
        let start_batch_id = state.normalize_batch_id + 1;
        let state = JobState {
            normalize_batch_id: state.sync_batch_id,
            ..state
        };
        self.write_state(job_name, &state).await?;

        Ok(NormalizeResponse {
            done: true,
            start_batch_id,
            end_batch_id: state.sync_batch_id,
        })
    }

    async fn get_last_sync_batch_id(&self, job_name: &str) -> Result<i64, DestinationError> {
        Ok(self
            .read_state(job_name)
            .await?
            .map(|state| state.sync_batch_id)
            .unwrap_or(0))
    }

    async fn get_last_offset(&self, job_name: &str) -> Result<Option<Checkpoint>, DestinationError> {
        let Some(state) = self.read_state(job_name).await? else {
            return Ok(None);
        };
        if state.last_offset == 0 {
            warn!(job_name, "zero stored offset, treating as never synced");
            return Ok(None);
        }
        Ok(Some(state.last_offset))
    }

    async fn sync_flow_cleanup(&self, job_name: &str) -> Result<(), DestinationError> {
        let prefix = job_object_prefix(&self.prefix, job_name);
        let results = self.bucket.list(prefix.clone(), None).await?;

        for result in results {
            for object in result.contents {
                let response = self.bucket.delete_object(&object.key).await?;
                Self::ensure_2xx("delete", &object.key, response.status_code())?;
            }
        }

        info!(job_name, prefix, "deleted job objects");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_urls_split_into_bucket_and_prefix() {
        assert_eq!(
            parse_storage_url("s3://mirrors").unwrap(),
            ("mirrors".to_string(), String::new())
        );
        assert_eq!(
            parse_storage_url("s3://mirrors/team/cdc").unwrap(),
            ("mirrors".to_string(), "team/cdc/".to_string())
        );
        assert!(parse_storage_url("gs://mirrors").is_err());
        assert!(parse_storage_url("s3:///nope").is_err());
    }

    #[test]
    fn object_keys_are_stable_per_batch() {
        assert_eq!(
            raw_object_key("team/cdc/", "orders", 7),
            "team/cdc/orders/raw/00000000000000000007.avro"
        );
        assert_eq!(
            state_object_key("", "orders"),
            "orders/metadata.json"
        );
        assert_eq!(job_object_prefix("team/", "orders"), "team/orders/");
    }

    #[test]
    fn batch_ids_sort_lexicographically_in_keys() {
        let key_a = raw_object_key("", "j", 9);
        let key_b = raw_object_key("", "j", 10);
        assert!(key_a < key_b);
    }
}
