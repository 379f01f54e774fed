//! Object storage behind a narrow seam.
//!
//! The gateway consumes storage through [`ObjectStore`]; production wires
//! in [`S3Store`], tests use [`MemoryStore`]. Keys are opaque to everything
//! above this module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{FilesError, FilesResult};

/// Minimal object-store surface the Files subsystem needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes an object, overwriting any previous value.
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> FilesResult<()>;

    /// Reads an object; `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> FilesResult<Option<Bytes>>;

    /// Deletes an object; deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> FilesResult<()>;

    /// Lists keys under a prefix.
    async fn list(&self, prefix: &str) -> FilesResult<Vec<String>>;

    /// Cheap backend liveness probe.
    async fn probe(&self) -> FilesResult<()>;
}

/// S3-backed store.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn new(config: &config::FilesConfig, fallback_region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = config.region.as_deref().or(fallback_region) {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }

        let mut sdk_config = loader.load().await;

        if let Some(base_url) = &config.base_url {
            log::debug!("Using custom S3 endpoint: {base_url}");
            sdk_config = sdk_config.into_builder().endpoint_url(base_url).build();
        }

        Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, content_type: &str, body: Bytes) -> FilesResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body.into())
            .send()
            .await
            .map_err(|e| FilesError::Storage(format!("put {key}: {e}")))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> FilesResult<Option<Bytes>> {
        let output = self.client.get_object().bucket(&self.bucket).key(key).send().await;

        let output = match output {
            Ok(output) => output,
            Err(error) => {
                let not_found = error
                    .as_service_error()
                    .is_some_and(|service_error| service_error.is_no_such_key());

                if not_found {
                    return Ok(None);
                }

                return Err(FilesError::Storage(format!("get {key}: {error}")));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| FilesError::Storage(format!("read {key}: {e}")))?;

        Ok(Some(body.into_bytes()))
    }

    async fn delete(&self, key: &str) -> FilesResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| FilesError::Storage(format!("delete {key}: {e}")))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> FilesResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| FilesError::Storage(format!("list {prefix}: {e}")))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn probe(&self) -> FilesResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| FilesError::Storage(format!("head bucket {}: {e}", self.bucket)))?;

        Ok(())
    }
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    objects: tokio::sync::RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, _content_type: &str, body: Bytes) -> FilesResult<()> {
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> FilesResult<Option<Bytes>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> FilesResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> FilesResult<Vec<String>> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn probe(&self) -> FilesResult<()> {
        Ok(())
    }
}
