//! Local-filesystem content store.
//!
//! Each stored object lives in its own directory under the store root:
//! `{root}/{id}/blob` holds the bytes and `{root}/{id}/meta.json` the
//! name and MIME type. Storage refs are `fs:{id}` and opaque to callers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use consilium_core::{ContentStore, Error, ObjectInfo, Result};

const REF_PREFIX: &str = "fs:";

pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store, ensuring the root directory exists.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        fs::create_dir_all(&store.root).await.map_err(Error::Io)?;
        Ok(store)
    }

    fn object_dir(&self, storage_ref: &str) -> Result<PathBuf> {
        let id = storage_ref
            .strip_prefix(REF_PREFIX)
            .ok_or_else(|| Error::InvalidInput(format!("unsupported storage ref: {storage_ref}")))?;
        // Refs are generated here as hex uuids; anything else is foreign.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(format!(
                "unsupported storage ref: {storage_ref}"
            )));
        }
        Ok(self.root.join(id))
    }

    fn blob_path(dir: &Path) -> PathBuf {
        dir.join("blob")
    }

    fn meta_path(dir: &Path) -> PathBuf {
        dir.join("meta.json")
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn fetch(&self, storage_ref: &str) -> Result<Vec<u8>> {
        let dir = self.object_dir(storage_ref)?;
        match fs::read(Self::blob_path(&dir)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "stored object: {storage_ref}"
            ))),
            Err(e) => Err(Error::ExternalService(format!(
                "content read failed for {storage_ref}: {e}"
            ))),
        }
    }

    async fn put(&self, name: &str, content: &[u8], mime: &str) -> Result<String> {
        let id = Uuid::now_v7().simple().to_string();
        let dir = self.root.join(&id);
        fs::create_dir_all(&dir).await.map_err(Error::Io)?;

        let info = ObjectInfo {
            name: name.to_string(),
            mime: mime.to_string(),
        };
        let meta = serde_json::to_vec(&info)?;
        fs::write(Self::meta_path(&dir), meta)
            .await
            .map_err(Error::Io)?;
        fs::write(Self::blob_path(&dir), content)
            .await
            .map_err(Error::Io)?;

        Ok(format!("{REF_PREFIX}{id}"))
    }

    async fn update(&self, storage_ref: &str, content: &[u8]) -> Result<()> {
        let dir = self.object_dir(storage_ref)?;
        if !fs::try_exists(Self::meta_path(&dir)).await.map_err(Error::Io)? {
            return Err(Error::NotFound(format!("stored object: {storage_ref}")));
        }
        fs::write(Self::blob_path(&dir), content)
            .await
            .map_err(Error::Io)
    }

    async fn describe(&self, storage_ref: &str) -> Result<ObjectInfo> {
        let dir = self.object_dir(storage_ref)?;
        match fs::read(Self::meta_path(&dir)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "stored object: {storage_ref}"
            ))),
            Err(e) => Err(Error::ExternalService(format!(
                "metadata read failed for {storage_ref}: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, FsContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::open(dir.path().join("content")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_fetch_round_trip() {
        let (_dir, store) = temp_store().await;
        let storage_ref = store
            .put("D-1__Lease.pdf", b"%PDF-1.4", "application/pdf")
            .await
            .unwrap();
        assert!(storage_ref.starts_with("fs:"));

        let bytes = store.fetch(&storage_ref).await.unwrap();
        assert_eq!(bytes, b"%PDF-1.4");

        let info = store.describe(&storage_ref).await.unwrap();
        assert_eq!(info.name, "D-1__Lease.pdf");
        assert_eq!(info.mime, "application/pdf");
    }

    #[tokio::test]
    async fn test_update_replaces_content_keeps_meta() {
        let (_dir, store) = temp_store().await;
        let storage_ref = store.put("a.txt", b"v1", "text/plain").await.unwrap();

        store.update(&storage_ref, b"v2").await.unwrap();

        assert_eq!(store.fetch(&storage_ref).await.unwrap(), b"v2");
        assert_eq!(store.describe(&storage_ref).await.unwrap().name, "a.txt");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (_dir, store) = temp_store().await;
        let missing = "fs:0123456789abcdef0123456789abcdef";
        assert!(matches!(
            store.fetch(missing).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            store.describe(missing).await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            store.update(missing, b"x").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_foreign_ref_is_rejected() {
        let (_dir, store) = temp_store().await;
        for bad in ["s3://bucket/key", "fs:../../etc/passwd", "fs:"] {
            assert!(matches!(
                store.fetch(bad).await.unwrap_err(),
                Error::InvalidInput(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_refs_are_unique_per_put() {
        let (_dir, store) = temp_store().await;
        let a = store.put("a", b"x", "text/plain").await.unwrap();
        let b = store.put("a", b"x", "text/plain").await.unwrap();
        assert_ne!(a, b);
    }
}
