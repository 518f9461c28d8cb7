use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AppConfig, AttachmentBackend};

#[derive(Debug, Error)]
pub enum AttachmentStoreError {
    #[error("invalid storage name: {0}")]
    InvalidName(String),
    #[error("not found")]
    NotFound,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend: {0}")]
    Backend(String),
}

/// Physical home of attachment bytes, addressed by storage identifier.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), AttachmentStoreError>;
    /// Bytes and sniffed content type of a stored attachment.
    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), AttachmentStoreError>;
    /// Removing a name that is already gone is not an error.
    async fn delete(&self, name: &str) -> Result<(), AttachmentStoreError>;
}

// Identifiers come from stored rows too, so never trust them as paths.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

fn check_name(name: &str) -> Result<(), AttachmentStoreError> {
    if is_safe_name(name) { Ok(()) } else { Err(AttachmentStoreError::InvalidName(name.to_string())) }
}

// ---------------- Filesystem implementation (default backend) ----------------
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), AttachmentStoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), AttachmentStoreError> {
        check_name(name)?;
        let target = self.path_for(name);
        // write beside the target, then rename so readers never see a partial file
        let temp = self.root.join(format!(".{name}.part"));
        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            error!("attachment write failed name={name} path={} err={e}", temp.display());
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            error!("attachment rename failed name={name} err={e}");
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!("attachment stored name={name} size={}", bytes.len());
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), AttachmentStoreError> {
        check_name(name)?;
        match tokio::fs::read(self.path_for(name)).await {
            Ok(bytes) => {
                let mime = sniff_mime(&bytes);
                Ok((bytes, mime))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AttachmentStoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), AttachmentStoreError> {
        check_name(name)?;
        match tokio::fs::remove_file(self.path_for(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("attachment already absent name={name}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3AttachmentStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
}

impl S3AttachmentStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "noticeboard-attachments".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // path-style addressing: MinIO/local endpoints lack wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO attachment client");

        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            client
                .create_bucket()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e2| anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"))?;
            info!("created bucket '{bucket}'");
        }

        Ok(Self { bucket, client, prefix: "attachments".into() })
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

#[async_trait]
impl AttachmentStore for S3AttachmentStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), AttachmentStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        check_name(name)?;
        let key = self.key_for(name);
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(sniff_mime(bytes));
        if let Err(e) = put.send().await {
            error!("put_object failed name={name} key={key} bucket={} err={:?}", self.bucket, e);
            return Err(AttachmentStoreError::Backend(e.to_string()));
        }
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), AttachmentStoreError> {
        check_name(name)?;
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key_for(name))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(svc) if svc.is_no_such_key() => AttachmentStoreError::NotFound,
                _ => AttachmentStoreError::Backend(e.to_string()),
            })?;
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| AttachmentStoreError::Backend(e.to_string()))?;
        let bytes = data.into_bytes().to_vec();
        let mime = sniff_mime(&bytes);
        Ok((bytes, mime))
    }

    async fn delete(&self, name: &str) -> Result<(), AttachmentStoreError> {
        check_name(name)?;
        // S3 reports success for missing keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key_for(name))
            .send()
            .await
            .map_err(|e| AttachmentStoreError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Backend selected by `ATTACHMENT_BACKEND`.
pub async fn build_attachment_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn AttachmentStore>> {
    match cfg.attachment_backend {
        AttachmentBackend::Fs => {
            let store = FsAttachmentStore::new(&cfg.upload_dir);
            store.ensure_root().await?;
            info!("Using filesystem attachment store at '{}'", cfg.upload_dir.display());
            Ok(Arc::new(store))
        }
        AttachmentBackend::S3 => Ok(Arc::new(S3AttachmentStore::new().await?)),
    }
}
