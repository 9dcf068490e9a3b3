use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::store::{ObjectStore, StoreResult, validate_bucket, validate_object_name};
use crate::error::StoreError;

/// Scratch directory inside each bucket where puts are staged before the rename.
const STAGING_DIR: &str = ".staging";

/// Object store backed by a directory tree: `root/<bucket>/<object name>`.
///
/// Puts are written to a staging file in the same bucket and renamed into place,
/// so a crash or failed write never leaves a truncated object under its final name.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::io(root.display().to_string(), e))?;
        tracing::info!("Local object store at {}", root.display());
        Ok(Self { root })
    }

    fn bucket_path(&self, bucket: &str) -> StoreResult<PathBuf> {
        validate_bucket(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, name: &str) -> StoreResult<PathBuf> {
        validate_object_name(name)?;
        if name == STAGING_DIR || name.starts_with(&format!("{}/", STAGING_DIR)) {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.bucket_path(bucket)?.join(name))
    }

    async fn ensure_bucket(&self, bucket: &str) -> StoreResult<PathBuf> {
        let path = self.bucket_path(bucket)?;
        if !is_dir(&path).await {
            return Err(StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            });
        }
        Ok(path)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn io_err(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::io(path.display().to_string(), e)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let path = self.bucket_path(bucket)?;
        tokio::fs::create_dir_all(path.join(STAGING_DIR))
            .await
            .map_err(|e| io_err(&path, e))?;
        tracing::debug!("Created bucket {}", bucket);
        Ok(())
    }

    async fn destroy_bucket(&self, bucket: &str) -> StoreResult<()> {
        let path = self.bucket_path(bucket)?;
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::BucketNotFound {
                bucket: bucket.to_string(),
            }),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        Ok(is_dir(&self.bucket_path(bucket)?).await)
    }

    async fn put(&self, bucket: &str, name: &str, data: Vec<u8>) -> StoreResult<()> {
        let bucket_path = self.ensure_bucket(bucket).await?;
        let final_path = self.object_path(bucket, name)?;

        let staging = bucket_path.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| io_err(&staging, e))?;
        let staged = staging.join(uuid::Uuid::new_v4().to_string());

        if let Err(e) = tokio::fs::write(&staged, &data).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(io_err(&staged, e));
        }

        if let Some(parent) = final_path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(io_err(parent, e));
        }

        if let Err(e) = tokio::fs::rename(&staged, &final_path).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(io_err(&final_path, e));
        }

        tracing::trace!("Stored {}/{} ({} bytes)", bucket, name, data.len());
        Ok(())
    }

    async fn get(&self, bucket: &str, name: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // A directory sitting where the object would be, e.g. a prefix of other names
            Err(_) if is_dir(&path).await => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn delete(&self, bucket: &str, name: &str) -> StoreResult<bool> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let bucket_path = self.ensure_bucket(bucket).await?;

        let mut names = Vec::new();
        let mut pending = vec![(bucket_path.clone(), String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| io_err(&dir, e))?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
                let file_name = entry.file_name().to_string_lossy().to_string();
                if rel.is_empty() && file_name == STAGING_DIR {
                    continue;
                }
                let name = if rel.is_empty() {
                    file_name
                } else {
                    format!("{}/{}", rel, file_name)
                };

                let file_type = entry.file_type().await.map_err(|e| io_err(&dir, e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), name));
                } else if name.starts_with(prefix) {
                    names.push(name);
                }
            }
        }

        names.sort();
        Ok(names)
    }
}
