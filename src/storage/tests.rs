//! Storage Module Tests
//!
//! ## Test Scopes
//! - **Name validation**: bucket and object names that must be rejected.
//! - **MemoryObjectStore** / **LocalObjectStore**: the same contract exercised on both backends.

#[cfg(test)]
mod tests {
    use crate::error::StoreError;
    use crate::storage::local::LocalObjectStore;
    use crate::storage::memory::MemoryObjectStore;
    use crate::storage::store::{ObjectStore, validate_bucket, validate_object_name};

    // ============================================================
    // NAME VALIDATION
    // ============================================================

    #[test]
    fn test_bucket_names() {
        assert!(validate_bucket("input-bucket").is_ok());
        assert!(validate_bucket("out_1.v2").is_ok());
        assert!(validate_bucket("").is_err());
        assert!(validate_bucket("..").is_err());
        assert!(validate_bucket("a/b").is_err());
        assert!(validate_bucket("with space").is_err());
    }

    #[test]
    fn test_object_names() {
        assert!(validate_object_name("input-0001.tar").is_ok());
        assert!(validate_object_name("nested/dir/shard.tar").is_ok());
        assert!(validate_object_name("").is_err());
        assert!(validate_object_name("/abs").is_err());
        assert!(validate_object_name("a//b").is_err());
        assert!(validate_object_name("../escape").is_err());
        assert!(validate_object_name("a/./b").is_err());
    }

    // ============================================================
    // SHARED CONTRACT
    // ============================================================

    async fn check_contract(store: &dyn ObjectStore) {
        assert!(!store.bucket_exists("data").await.unwrap());
        assert!(matches!(
            store.put("data", "a", vec![1]).await,
            Err(StoreError::BucketNotFound { .. })
        ));

        store.create_bucket("data").await.unwrap();
        // Idempotent
        store.create_bucket("data").await.unwrap();
        assert!(store.bucket_exists("data").await.unwrap());

        store.put("data", "b.tar", b"second".to_vec()).await.unwrap();
        store.put("data", "a.tar", b"first".to_vec()).await.unwrap();
        store.put("data", "dir/c.tar", b"third".to_vec()).await.unwrap();

        assert_eq!(
            store.get("data", "a.tar").await.unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(
            store.get("data", "dir/c.tar").await.unwrap(),
            Some(b"third".to_vec())
        );
        assert_eq!(store.get("data", "missing").await.unwrap(), None);

        // Overwrite replaces the whole payload
        store.put("data", "a.tar", b"1".to_vec()).await.unwrap();
        assert_eq!(store.get("data", "a.tar").await.unwrap(), Some(b"1".to_vec()));

        assert_eq!(
            store.list("data", "").await.unwrap(),
            vec!["a.tar", "b.tar", "dir/c.tar"]
        );
        assert_eq!(store.list("data", "dir/").await.unwrap(), vec!["dir/c.tar"]);

        assert!(store.delete("data", "b.tar").await.unwrap());
        assert!(!store.delete("data", "b.tar").await.unwrap());

        assert!(matches!(
            store.put("data", "../x", vec![]).await,
            Err(StoreError::InvalidName { .. })
        ));

        store.destroy_bucket("data").await.unwrap();
        assert!(!store.bucket_exists("data").await.unwrap());
        assert!(matches!(
            store.destroy_bucket("data").await,
            Err(StoreError::BucketNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryObjectStore::new();
        check_contract(&store).await;
    }

    #[tokio::test]
    async fn test_local_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).await.unwrap();
        check_contract(&store).await;
    }

    // ============================================================
    // LOCAL STORE SPECIFICS
    // ============================================================

    #[tokio::test]
    async fn test_local_store_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).await.unwrap();
        store.create_bucket("out").await.unwrap();

        for i in 0..5 {
            store
                .put("out", &format!("shard-{}.tar", i), vec![0u8; 512])
                .await
                .unwrap();
        }

        let names = store.list("out", "").await.unwrap();
        assert_eq!(names.len(), 5);
        assert!(names.iter().all(|n| n.starts_with("shard-")));

        let staging = dir.path().join("out").join(".staging");
        let leftovers = std::fs::read_dir(staging).unwrap().count();
        assert_eq!(leftovers, 0, "Staged files must be renamed into place");
    }

    #[tokio::test]
    async fn test_local_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalObjectStore::open(dir.path()).await.unwrap();
            store.create_bucket("keep").await.unwrap();
            store.put("keep", "obj", b"payload".to_vec()).await.unwrap();
        }

        let store = LocalObjectStore::open(dir.path()).await.unwrap();
        assert_eq!(
            store.get("keep", "obj").await.unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[tokio::test]
    async fn test_local_store_rejects_staging_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::open(dir.path()).await.unwrap();
        store.create_bucket("b").await.unwrap();

        assert!(matches!(
            store.put("b", ".staging/x", vec![]).await,
            Err(StoreError::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn test_memory_store_object_count() {
        let store = MemoryObjectStore::new();
        store.create_bucket("b").await.unwrap();
        store.put("b", "x", vec![]).await.unwrap();
        store.put("b", "y", vec![]).await.unwrap();
        assert_eq!(store.object_count("b"), 2);
        assert_eq!(store.object_count("nope"), 0);
    }
}
