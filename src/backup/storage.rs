//! Backup locations and the storage backends that read catalogs and chunks
//! from a local directory or an S3 prefix.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use url::Url;

use super::catalog::Backup;
use super::chunk::ChunkInput;
use crate::config::CATALOG_FILE_NAME;

/// Read access to a backup's catalog and chunk files
#[async_trait]
pub trait BackupStorage: Send + Sync {
    async fn read_catalog(&self) -> Result<Backup>;

    /// Opens a chunk as a buffered byte stream
    async fn open_input(&self, chunk_name: &str) -> Result<ChunkInput>;

    /// Human readable location, for logs
    fn describe(&self) -> String;
}

/// Represents a parsed backup location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupLocation {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
}

impl BackupLocation {
    /// Parse a path, `file://` URI or `s3://bucket/prefix` URI
    pub fn parse(location: &str) -> Result<Self> {
        let Ok(url) = Url::parse(location) else {
            return Ok(BackupLocation::Local(PathBuf::from(location)));
        };
        match url.scheme() {
            "s3" => {
                let bucket = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| anyhow!("S3 URI missing bucket: {}", location))?
                    .to_string();
                let prefix = url.path().trim_matches('/').to_string();
                Ok(BackupLocation::S3 { bucket, prefix })
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| anyhow!("Invalid file:// URI: {}", location))?;
                Ok(BackupLocation::Local(path))
            }
            // Windows drive letters parse as a one-letter scheme
            scheme if scheme.len() == 1 => Ok(BackupLocation::Local(PathBuf::from(location))),
            scheme => Err(anyhow!("Unsupported URI scheme: {}", scheme)),
        }
    }

    /// Opens storage for this location, loading AWS configuration for S3
    pub async fn open(&self) -> Result<Arc<dyn BackupStorage>> {
        match self {
            BackupLocation::Local(path) => Ok(Arc::new(LocalBackupStorage::new(path))),
            BackupLocation::S3 { bucket, prefix } => {
                let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
                let client = Arc::new(S3Client::new(&aws_config));
                Ok(Arc::new(S3BackupStorage::new(client, bucket.clone(), prefix.clone())))
            }
        }
    }
}

/// Backup stored in a local directory
#[derive(Debug, Clone)]
pub struct LocalBackupStorage {
    root: PathBuf,
}

impl LocalBackupStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl BackupStorage for LocalBackupStorage {
    async fn read_catalog(&self) -> Result<Backup> {
        let path = self.root.join(CATALOG_FILE_NAME);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read backup catalog {}", path.display()))?;
        Backup::from_json(&bytes)
    }

    async fn open_input(&self, chunk_name: &str) -> Result<ChunkInput> {
        let path = self.root.join(chunk_name);
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open chunk {}", path.display()))?;
        Ok(Box::pin(BufReader::new(file)))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Backup stored under an S3 prefix
#[derive(Clone)]
pub struct S3BackupStorage {
    s3_client: Arc<S3Client>,
    bucket: String,
    prefix: String,
}

impl S3BackupStorage {
    pub fn new(s3_client: Arc<S3Client>, bucket: String, prefix: String) -> Self {
        Self {
            s3_client,
            bucket,
            prefix,
        }
    }

    fn key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }
}

#[async_trait]
impl BackupStorage for S3BackupStorage {
    async fn read_catalog(&self) -> Result<Backup> {
        let key = self.key(CATALOG_FILE_NAME);
        let response = self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;

        let bytes = response
            .body
            .collect()
            .await
            .context("Failed to collect S3 response body")?
            .into_bytes();

        Backup::from_json(&bytes)
    }

    async fn open_input(&self, chunk_name: &str) -> Result<ChunkInput> {
        let key = self.key(chunk_name);
        let response = self
            .s3_client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", self.bucket, key))?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;

    #[test]
    fn test_parse_s3_location() {
        let location = BackupLocation::parse("s3://my-bucket/backups/2024-01-15/").unwrap();
        assert_eq!(
            location,
            BackupLocation::S3 {
                bucket: "my-bucket".to_string(),
                prefix: "backups/2024-01-15".to_string()
            }
        );
    }

    #[test]
    fn test_parse_s3_bucket_root() {
        let location = BackupLocation::parse("s3://bucket").unwrap();
        assert!(matches!(location, BackupLocation::S3 { ref prefix, .. } if prefix.is_empty()));
    }

    #[test]
    fn test_parse_local_locations() {
        assert!(matches!(
            BackupLocation::parse("/data/backup").unwrap(),
            BackupLocation::Local(_)
        ));
        assert!(matches!(
            BackupLocation::parse("data/backup").unwrap(),
            BackupLocation::Local(_)
        ));
        assert_eq!(
            BackupLocation::parse("file:///data/backup").unwrap(),
            BackupLocation::Local(PathBuf::from("/data/backup"))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert!(BackupLocation::parse("ftp://host/backup").is_err());
        assert!(BackupLocation::parse("s3:///backup").is_err());
    }

    #[tokio::test]
    async fn test_local_storage_reads_catalog_and_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let backup = Backup::new(Default::default());
        std::fs::write(dir.path().join(CATALOG_FILE_NAME), backup.to_json().unwrap()).unwrap();
        std::fs::write(dir.path().join("t.0.jsonl"), b"[\"1\"]\n").unwrap();

        let storage = LocalBackupStorage::new(dir.path());
        assert_eq!(storage.read_catalog().await.unwrap(), backup);

        let mut lines = storage.open_input("t.0.jsonl").await.unwrap().lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("[\"1\"]"));

        let err = storage.open_input("missing.jsonl").await.err().unwrap();
        assert!(err.to_string().contains("missing.jsonl"));
    }
}
