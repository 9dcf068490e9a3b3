use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use super::archive;
use super::exchange::RecordMeta;
use crate::config::MissingShardsAction;
use crate::error::{Result, SortError, StoreError};
use crate::membership::types::NodeId;
use crate::metrics::registry::NodeMetrics;
use crate::metrics::types::Phase;
use crate::storage::store::ObjectStore;

/// Records a node extracted from its input shards.
///
/// Keys are `<input shard name>/<entry path>`, so equal entry names in different shards
/// stay distinct records.
#[derive(Debug, Default)]
pub struct LocalRecords {
    pub data: HashMap<String, Vec<u8>>,
    pub index: Vec<RecordMeta>,
}

impl LocalRecords {
    pub fn bytes(&self) -> u64 {
        self.index.iter().map(|record| record.size).sum()
    }
}

pub struct Extractor<'a> {
    pub node: &'a NodeId,
    pub store: &'a dyn ObjectStore,
    pub bucket: &'a str,
    pub extension: &'a str,
    pub missing: MissingShardsAction,
    pub cancel: &'a CancellationToken,
    pub metrics: &'a NodeMetrics,
}

impl Extractor<'_> {
    pub async fn run(&self, shards: &[String]) -> Result<LocalRecords> {
        let mut local = LocalRecords::default();

        for shard in shards {
            if self.cancel.is_cancelled() {
                return Err(SortError::Aborted);
            }

            let object = format!("{}{}", shard, self.extension);
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SortError::Aborted),
                fetched = self.store.get(self.bucket, &object) => fetched?,
            };
            let Some(bytes) = fetched else {
                self.on_missing(&object)?;
                continue;
            };

            let cancel = self.cancel.clone();
            let name = object.clone();
            let records =
                tokio::task::spawn_blocking(move || archive::read_records(&name, &bytes, &cancel))
                    .await
                    .map_err(|e| {
                        SortError::transfer(format!("reading {} panicked: {}", object, e))
                    })??;

            let mut bytes_read = 0u64;
            let mut count = 0u64;
            for (path, data) in records {
                let key = format!("{}/{}", shard, path);
                let size = data.len() as u64;
                if local.data.contains_key(&key) {
                    tracing::warn!("Duplicate entry {} in {}, keeping the first one", path, object);
                    continue;
                }
                local.data.insert(key.clone(), data);
                local.index.push(RecordMeta {
                    key,
                    node: self.node.clone(),
                    size,
                });
                bytes_read += size;
                count += 1;
            }

            self.metrics
                .add(Phase::LocalExtraction, 1, count, bytes_read);
            tracing::trace!("Extracted {} records from {}", count, object);
        }

        Ok(local)
    }

    fn on_missing(&self, object: &str) -> Result<()> {
        match self.missing {
            MissingShardsAction::Ignore => Ok(()),
            MissingShardsAction::Warn => {
                tracing::warn!("Input shard {} not found, skipping", object);
                self.metrics
                    .warn(format!("input shard '{}' not found", object));
                Ok(())
            }
            MissingShardsAction::Abort => Err(StoreError::ObjectNotFound {
                bucket: self.bucket.to_string(),
                name: object.to_string(),
            }
            .into()),
        }
    }
}
