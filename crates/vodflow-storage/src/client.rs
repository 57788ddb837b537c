//! Object store client over the S3 API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::content_type::content_type_for;
use crate::error::{StorageError, StorageResult};
use crate::retry::{retry_transient, RetryPolicy};

/// Per-call deadline for object store operations.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the object store client.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Region (often "auto" for S3-compatible stores)
    pub region: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Use path-style addressing (required by MinIO and friends)
    pub force_path_style: bool,
}

impl ObjectStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            force_path_style: std::env::var("S3_FORCE_PATH_STYLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }
}

/// Metadata for a stored object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Content type, when the store reports one
    pub content_type: String,
    /// Last modified timestamp (milliseconds since epoch)
    pub last_modified: Option<u64>,
}

/// A lazily pulled object body. The reader is a finite, non-restartable
/// byte sequence; dropping it cancels the upstream read.
pub struct ObjectStream {
    pub body: ByteStream,
    /// Bytes in this response (the range length for partial reads)
    pub content_length: u64,
    pub content_type: String,
    /// `Content-Range` echoed by the store for range reads
    pub content_range: Option<String>,
    /// Whether this is a partial-content response
    pub is_partial: bool,
}

/// Object store client bound to a single bucket.
#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
}

impl ObjectStore {
    /// Create a new client from configuration.
    pub fn new(config: ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vodflow",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(ObjectStoreConfig::from_env()?))
    }

    /// Upload a local file under `key`, streaming from disk.
    pub async fn put_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref().to_path_buf();
        let policy = RetryPolicy::new("put");

        retry_transient(&policy, || {
            let path = path.clone();
            async move {
                let body = ByteStream::from_path(&path)
                    .await
                    .map_err(|e| StorageError::upload_failed(e.to_string()))?;

                self.deadline(
                    self.client
                        .put_object()
                        .bucket(&self.bucket)
                        .key(key)
                        .body(body)
                        .content_type(content_type)
                        .send(),
                )
                .await?
                .map_err(|e| StorageError::classify_sdk(key, format!("{e:?}")))?;
                Ok(())
            }
        })
        .await?;

        debug!(key, "uploaded file");
        Ok(())
    }

    /// Upload in-memory bytes under `key`.
    pub async fn put_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let policy = RetryPolicy::new("put");

        retry_transient(&policy, || {
            let data = data.clone();
            async move {
                self.deadline(
                    self.client
                        .put_object()
                        .bucket(&self.bucket)
                        .key(key)
                        .body(ByteStream::from(data))
                        .content_type(content_type)
                        .send(),
                )
                .await?
                .map_err(|e| StorageError::classify_sdk(key, format!("{e:?}")))?;
                Ok(())
            }
        })
        .await
    }

    /// Fetch a whole object into memory. Only for small objects (playlists).
    pub async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let policy = RetryPolicy::new("get");

        retry_transient(&policy, || async move {
            let response = self
                .deadline(
                    self.client
                        .get_object()
                        .bucket(&self.bucket)
                        .key(key)
                        .send(),
                )
                .await?
                .map_err(|e| {
                    if matches!(&e, aws_sdk_s3::error::SdkError::ServiceError(se) if se.err().is_no_such_key())
                    {
                        StorageError::not_found(key)
                    } else {
                        StorageError::classify_sdk(key, format!("{e:?}"))
                    }
                })?;

            let bytes = response
                .body
                .collect()
                .await
                .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
                .into_bytes()
                .to_vec();

            Ok(bytes)
        })
        .await
    }

    /// Open a lazy byte stream over an object, optionally for a byte range
    /// (`bytes=start-end` syntax, forwarded verbatim).
    pub async fn get_stream(&self, key: &str, range: Option<&str>) -> StorageResult<ObjectStream> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(r) = range {
            request = request.range(r);
        }

        let response = self.deadline(request.send()).await?.map_err(|e| {
            if matches!(&e, aws_sdk_s3::error::SdkError::ServiceError(se) if se.err().is_no_such_key())
            {
                StorageError::not_found(key)
            } else {
                StorageError::classify_sdk(key, format!("{e:?}"))
            }
        })?;

        Ok(ObjectStream {
            content_length: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            content_range: response.content_range().map(str::to_string),
            is_partial: range.is_some(),
            body: response.body,
        })
    }

    /// Download an object to a local path. Writes to a `.part` sibling and
    /// renames on completion, so readers never observe a truncated file.
    pub async fn download(&self, key: &str, local_path: impl AsRef<Path>) -> StorageResult<()> {
        let local_path = local_path.as_ref().to_path_buf();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let part_path = part_path_for(&local_path);
        let policy = RetryPolicy::new("download");

        retry_transient(&policy, || {
            let part_path = part_path.clone();
            async move {
                let stream = self.get_stream(key, None).await?;
                let mut reader = stream.body.into_async_read();
                let mut file = tokio::fs::File::create(&part_path).await?;
                tokio::io::copy(&mut reader, &mut file)
                    .await
                    .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
                file.flush().await?;
                Ok(())
            }
        })
        .await
        .inspect_err(|_| {
            let _ = std::fs::remove_file(&part_path);
        })?;

        tokio::fs::rename(&part_path, &local_path).await?;
        info!(key, path = %local_path.display(), "downloaded object");
        Ok(())
    }

    /// Upload every file under `local_dir` beneath `key_prefix`, preserving
    /// the relative layout. Content types come from the extension table.
    pub async fn upload_tree(
        &self,
        local_dir: impl AsRef<Path>,
        key_prefix: &str,
    ) -> StorageResult<u32> {
        let root = local_dir.as_ref().to_path_buf();
        let prefix = key_prefix.trim_end_matches('/');
        let mut uploaded = 0u32;

        // Iterative walk so the upload order is deterministic per directory.
        let mut stack: Vec<PathBuf> = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            let mut files = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
            files.sort();

            for path in files {
                let relative = path
                    .strip_prefix(&root)
                    .map_err(|_| StorageError::upload_failed("path escaped upload root"))?;
                let relative = relative.to_string_lossy().replace('\\', "/");
                let key = format!("{prefix}/{relative}");
                let content_type = content_type_for(&relative);

                self.put_file(&path, &key, content_type).await?;
                uploaded += 1;
            }
        }

        info!(prefix, files = uploaded, "uploaded output tree");
        Ok(uploaded)
    }

    /// List objects under a prefix.
    pub async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = self
                .deadline(request.send())
                .await?
                .map_err(|e| StorageError::ListFailed(format!("{e:?}")))?;

            if let Some(contents) = &response.contents {
                for obj in contents {
                    objects.push(ObjectInfo {
                        key: obj.key.clone().unwrap_or_default(),
                        size: obj.size.unwrap_or(0).max(0) as u64,
                        content_type: String::new(),
                        last_modified: obj
                            .last_modified
                            .as_ref()
                            .and_then(|t| t.to_millis().ok())
                            .map(|ms| ms as u64),
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    /// HEAD an object for size and content type.
    pub async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let response = self
            .deadline(
                self.client
                    .head_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .await?
            .map_err(|e| {
                if matches!(&e, aws_sdk_s3::error::SdkError::ServiceError(se) if se.err().is_not_found())
                {
                    StorageError::not_found(key)
                } else {
                    StorageError::classify_sdk(key, format!("{e:?}"))
                }
            })?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            content_type: response
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            last_modified: response
                .last_modified
                .as_ref()
                .and_then(|t| t.to_millis().ok())
                .map(|ms| ms as u64),
        })
    }

    /// Check whether an object exists.
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Generate a presigned GET URL.
    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::PresignFailed(format!("{e:?}")))?;

        Ok(presigned.uri().to_string())
    }

    /// Delete every object under a prefix. Best effort per key; returns the
    /// number actually removed.
    pub async fn delete_prefix(&self, prefix: &str) -> StorageResult<u32> {
        let objects = self.list(prefix).await?;
        let mut deleted = 0u32;

        for obj in objects {
            match self
                .deadline(
                    self.client
                        .delete_object()
                        .bucket(&self.bucket)
                        .key(&obj.key)
                        .send(),
                )
                .await?
            {
                Ok(_) => deleted += 1,
                Err(e) => warn!(key = %obj.key, error = ?e, "failed to delete object"),
            }
        }

        if deleted > 0 {
            info!(prefix, deleted, "deleted objects under prefix");
        }
        Ok(deleted)
    }

    /// Readiness probe: HEAD the bucket.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.deadline(self.client.head_bucket().bucket(&self.bucket).send())
            .await?
            .map_err(|e| StorageError::classify_sdk(&self.bucket, format!("{e:?}")))?;
        Ok(())
    }

    /// Apply the per-call deadline to an in-flight request.
    async fn deadline<F, T>(&self, fut: F) -> StorageResult<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::time::timeout(CALL_TIMEOUT, fut)
            .await
            .map_err(|_| StorageError::Network("object store call timed out".into()))
    }
}

fn part_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    name.push_str(".part");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_keeps_directory() {
        let p = part_path_for(Path::new("/tmp/work/input.mp4"));
        assert_eq!(p, PathBuf::from("/tmp/work/input.mp4.part"));
    }

    #[test]
    fn config_defaults_path_style_on() {
        std::env::set_var("S3_ENDPOINT_URL", "http://localhost:9000");
        std::env::set_var("S3_ACCESS_KEY_ID", "minio");
        std::env::set_var("S3_SECRET_ACCESS_KEY", "minio123");
        std::env::set_var("S3_BUCKET_NAME", "videos");
        std::env::remove_var("S3_FORCE_PATH_STYLE");
        std::env::remove_var("S3_REGION");

        let config = ObjectStoreConfig::from_env().unwrap();
        assert!(config.force_path_style);
        assert_eq!(config.region, "auto");
        assert_eq!(config.bucket_name, "videos");
    }
}
