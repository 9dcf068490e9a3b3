use async_trait::async_trait;

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Name-addressable blob storage consumed by the sort service.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates the bucket; creating an existing bucket is not an error.
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Removes the bucket and every object in it.
    async fn destroy_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    /// Stores `data` under `name`, replacing any previous object.
    ///
    /// The object is visible only after the whole payload has been stored.
    async fn put(&self, bucket: &str, name: &str, data: Vec<u8>) -> StoreResult<()>;

    /// Returns `None` when the object does not exist.
    async fn get(&self, bucket: &str, name: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Returns whether an object was actually removed.
    async fn delete(&self, bucket: &str, name: &str) -> StoreResult<bool>;

    /// Object names starting with `prefix`, sorted.
    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>>;
}

pub fn validate_bucket(bucket: &str) -> StoreResult<()> {
    let valid = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && bucket != "."
        && bucket != "..";

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: bucket.to_string(),
        })
    }
}

/// Object names may contain `/` but no empty, `.` or `..` segments.
pub fn validate_object_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.contains('\0')
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            name: name.to_string(),
        })
    }
}
