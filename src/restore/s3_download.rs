// dbimporter/src/restore/s3_download.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;

use crate::config::SpacesConfig;

/// A backup object as listed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupObject {
    pub key: String,
    /// Last-modified time in Unix epoch seconds.
    pub last_modified: i64,
}

impl BackupObject {
    pub fn new(key: impl Into<String>, last_modified: i64) -> Self {
        BackupObject {
            key: key.into(),
            last_modified,
        }
    }
}

/// Object storage holding the backups.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Objects directly under `prefix`, in the order the store returns them.
    async fn list(&self, prefix: &str) -> Result<Vec<BackupObject>>;

    /// Content type the store reports for `key`. Empty when none was recorded.
    async fn content_type(&self, key: &str) -> Result<String>;

    /// Full content of `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Turns a configured folder prefix into an S3 listing prefix.
///
/// `""` and `"/"` list the bucket root, anything else gets exactly one
/// trailing slash so only objects inside that folder match.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// S3-compatible store (AWS, DigitalOcean Spaces, MinIO).
pub struct S3Store {
    client: s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(spaces_config: &SpacesConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());

        if let Some(endpoint) = &spaces_config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(region) = &spaces_config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some((access_key_id, secret_access_key)) = &spaces_config.credentials {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ));
        }

        let sdk_config = loader.load().await;
        tracing::debug!(
            bucket = %spaces_config.bucket_name,
            endpoint = spaces_config.endpoint_url.as_deref().unwrap_or("default"),
            "S3 client configured"
        );

        Ok(S3Store {
            client: s3::Client::new(&sdk_config),
            bucket: spaces_config.bucket_name.clone(),
        })
    }
}

#[async_trait]
impl RemoteStore for S3Store {
    async fn list(&self, prefix: &str) -> Result<Vec<BackupObject>> {
        let prefix = normalize_prefix(prefix);
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .delimiter("/");

            if let Some(token) = &continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.with_context(|| {
                format!("Failed to list objects in s3://{}/{}", self.bucket, prefix)
            })?;

            for obj in resp.contents.unwrap_or_default() {
                let Some(key) = obj.key else { continue };
                // Folder markers are not backups.
                if key.ends_with('/') {
                    continue;
                }
                let last_modified = obj.last_modified.map(|t| t.secs()).unwrap_or_default();
                objects.push(BackupObject::new(key, last_modified));
            }

            if resp.is_truncated.unwrap_or(false) {
                continuation_token = resp.next_continuation_token;
            } else {
                break;
            }
        }

        tracing::debug!(
            "Listed {} objects under s3://{}/{}",
            objects.len(),
            self.bucket,
            prefix
        );
        Ok(objects)
    }

    async fn content_type(&self, key: &str) -> Result<String> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to read metadata of s3://{}/{}", self.bucket, key))?;

        Ok(head.content_type().unwrap_or_default().to_string())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get object s3://{}/{}", self.bucket, key))?;

        let data = object
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read body of s3://{}/{}", self.bucket, key))?
            .into_bytes()
            .to_vec();

        tracing::debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(data)
    }
}
