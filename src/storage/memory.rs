use async_trait::async_trait;
use dashmap::DashMap;

use super::store::{ObjectStore, StoreResult, validate_bucket, validate_object_name};
use crate::error::StoreError;

/// In-process object store.
///
/// Structure: `Bucket -> Object name -> bytes`. Each bucket has its own `DashMap`,
/// so writers to different buckets never contend.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: DashMap<String, DashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .get(bucket)
            .map(|objects| objects.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        validate_bucket(bucket)?;
        self.buckets
            .entry(bucket.to_string())
            .or_insert_with(DashMap::new);
        tracing::debug!("Created bucket {}", bucket);
        Ok(())
    }

    async fn destroy_bucket(&self, bucket: &str) -> StoreResult<()> {
        match self.buckets.remove(bucket) {
            Some(_) => Ok(()),
            None => Err(StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            }),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(self.buckets.contains_key(bucket))
    }

    async fn put(&self, bucket: &str, name: &str, data: Vec<u8>) -> StoreResult<()> {
        validate_object_name(name)?;
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        objects.insert(name.to_string(), data);
        Ok(())
    }

    async fn get(&self, bucket: &str, name: &str) -> StoreResult<Option<Vec<u8>>> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        Ok(objects.get(name).map(|data| data.value().clone()))
    }

    async fn delete(&self, bucket: &str, name: &str) -> StoreResult<bool> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        Ok(objects.remove(name).is_some())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let objects = self
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            })?;
        let mut names: Vec<String> = objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
