use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use marketech_contracts::media::{extension_for_mime, sniff_mime};
use marketech_contracts::results::BlobHandle;
use sha2::{Digest, Sha256};

/// Directory where fetched image bytes become local files.
///
/// Files are never cleaned up here; callers release handles they no longer
/// display.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn materialize(&self, bytes: &[u8], content_type: Option<&str>) -> Result<BlobHandle> {
        if bytes.is_empty() {
            bail!("refusing to store an empty blob");
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let mime_type = sniff_mime(bytes)
            .map(str::to_string)
            .or_else(|| content_type.map(|value| value.trim().to_string()))
            .filter(|value| !value.is_empty());
        let id = uuid::Uuid::new_v4().simple().to_string();
        let ext = extension_for_mime(mime_type.as_deref());
        let path = self.dir.join(format!("blob-{id}.{ext}"));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;

        Ok(BlobHandle {
            id,
            path,
            mime_type,
            sha256: hex::encode(Sha256::digest(bytes)),
            len: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialize_writes_bytes_with_digest() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = BlobStore::new(temp.path().join("blobs"));

        let blob = store.materialize(b"abc", Some("image/webp"))?;
        assert_eq!(fs::read(&blob.path)?, b"abc");
        assert_eq!(blob.len, 3);
        assert_eq!(blob.mime_type.as_deref(), Some("image/webp"));
        assert!(blob.path.to_string_lossy().ends_with(".webp"));
        assert_eq!(
            blob.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn sniffed_type_overrides_generic_content_type() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = BlobStore::new(temp.path());
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

        let blob = store.materialize(&png, Some("application/octet-stream"))?;
        assert_eq!(blob.mime_type.as_deref(), Some("image/png"));
        assert!(blob.path.to_string_lossy().ends_with(".png"));
        Ok(())
    }

    #[test]
    fn each_blob_gets_its_own_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = BlobStore::new(temp.path());
        let first = store.materialize(b"same", None)?;
        let second = store.materialize(b"same", None)?;
        assert_ne!(first.path, second.path);
        assert_eq!(first.sha256, second.sha256);
        Ok(())
    }

    #[test]
    fn empty_body_is_rejected() -> Result<()> {
        let temp = tempfile::tempdir()?;
        assert!(BlobStore::new(temp.path()).materialize(b"", None).is_err());
        Ok(())
    }
}
