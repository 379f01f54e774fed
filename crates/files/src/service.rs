//! Artifact lifecycle on top of the object store.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;

use crate::{
    artifact::{self, ArtifactRecord, ArtifactStatus},
    context::{self, ContextEntry},
    error::{FilesError, FilesResult},
    extract::{self, Extracted},
    store::ObjectStore,
};

/// How many file fetches run concurrently during context injection.
const FETCH_FAN_OUT: usize = 4;

/// High-level artifact operations: upload, fetch, delete, list, and the
/// chat-context assembly used by the request orchestrator.
pub struct FileStore {
    store: Arc<dyn ObjectStore>,
    max_file_bytes: usize,
    max_context_bytes: usize,
    csv_preview_rows: usize,
}

impl FileStore {
    pub fn new(store: Arc<dyn ObjectStore>, config: &config::FilesConfig) -> Self {
        Self {
            store,
            max_file_bytes: config.max_file_bytes,
            max_context_bytes: config.max_context_bytes,
            csv_preview_rows: config.csv_preview_rows,
        }
    }

    /// Stores a new artifact: payload first, then the metadata record.
    ///
    /// The status reflects a trial extraction so callers learn immediately
    /// whether the content will be usable as context.
    pub async fn upload(
        &self,
        filename: &str,
        media_type: &str,
        purpose: &str,
        body: Bytes,
    ) -> FilesResult<ArtifactRecord> {
        if body.is_empty() {
            return Err(FilesError::Validation("Uploaded file is empty".to_string()));
        }

        if body.len() > self.max_file_bytes {
            return Err(FilesError::Validation(format!(
                "File of {} bytes exceeds the {} byte limit",
                body.len(),
                self.max_file_bytes
            )));
        }

        let status = match extract::extract(media_type, &body, self.max_context_bytes, self.csv_preview_rows) {
            Extracted::Text(_) | Extracted::Unsupported(_) => ArtifactStatus::Processed,
            Extracted::Failed(_) => ArtifactStatus::Error,
        };

        let record = ArtifactRecord {
            id: artifact::new_id(),
            original_filename: filename.to_string(),
            media_type: media_type.to_string(),
            size_bytes: body.len() as u64,
            created: now_unix(),
            purpose: purpose.to_string(),
            status,
        };

        self.store.put(&record.object_key(), media_type, body).await?;
        self.put_metadata(&record).await?;

        log::debug!("Stored artifact {} ({} bytes)", record.id, record.size_bytes);

        Ok(record)
    }

    /// Reads an artifact's metadata record.
    pub async fn metadata(&self, id: &str) -> FilesResult<ArtifactRecord> {
        artifact::validate_id(id)?;

        let bytes = self
            .store
            .get(&artifact::metadata_key(id))
            .await?
            .ok_or_else(|| FilesError::NotFound(id.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| FilesError::Storage(format!("corrupt metadata for {id}: {e}")))
    }

    /// Reads metadata and payload together.
    pub async fn content(&self, id: &str) -> FilesResult<(ArtifactRecord, Bytes)> {
        let record = self.metadata(id).await?;

        let body = self
            .store
            .get(&record.object_key())
            .await?
            .ok_or_else(|| FilesError::NotFound(id.to_string()))?;

        Ok((record, body))
    }

    /// Deletes payload and metadata. Missing artifacts are an error so the
    /// caller can answer 404 truthfully.
    pub async fn delete(&self, id: &str) -> FilesResult<()> {
        let record = self.metadata(id).await?;

        self.store.delete(&record.object_key()).await?;
        self.store.delete(&record.metadata_key()).await?;

        Ok(())
    }

    /// Lists artifacts, optionally filtered by purpose, newest first.
    pub async fn list(&self, purpose: Option<&str>, limit: usize) -> FilesResult<Vec<ArtifactRecord>> {
        let keys = self.store.list("files/").await?;

        let mut records = Vec::new();

        for key in keys.iter().filter(|key| key.ends_with(".json")) {
            let Some(bytes) = self.store.get(key).await? else {
                continue;
            };

            match serde_json::from_slice::<ArtifactRecord>(&bytes) {
                Ok(record) => {
                    if purpose.is_none_or(|purpose| record.purpose == purpose) {
                        records.push(record);
                    }
                }
                Err(e) => log::warn!("Skipping corrupt metadata object {key}: {e}"),
            }
        }

        records.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);

        Ok(records)
    }

    /// Storage backend probe for the health endpoint.
    pub async fn probe(&self) -> FilesResult<()> {
        self.store.probe().await
    }

    /// Builds the chat-context preamble for a set of file ids.
    ///
    /// Ids are validated up front, deduplicated, and sorted so the result
    /// is a pure function of the id set. Fetches fan out bounded; a
    /// missing artifact fails the whole request, while per-file extraction
    /// failures degrade to in-band placeholders unless every file fails.
    pub async fn chat_context(&self, ids: &[String]) -> FilesResult<String> {
        for id in ids {
            artifact::validate_id(id)?;
        }

        let mut unique: Vec<&String> = ids.iter().collect();
        unique.sort();
        unique.dedup();

        let fetched: Vec<FilesResult<(ArtifactRecord, Bytes)>> = futures::stream::iter(unique)
            .map(|id| self.content(id))
            .buffered(FETCH_FAN_OUT)
            .collect()
            .await;

        let mut entries = Vec::with_capacity(fetched.len());
        let mut failures = 0usize;

        for result in fetched {
            let (record, body) = result?;

            let content = match extract::extract(
                &record.media_type,
                &body,
                self.max_context_bytes,
                self.csv_preview_rows,
            ) {
                Extracted::Text(text) => text,
                Extracted::Unsupported(note) => note,
                Extracted::Failed(reason) => {
                    failures += 1;
                    context::failure_placeholder(&reason)
                }
            };

            entries.push(ContextEntry { record, content });
        }

        if !entries.is_empty() && failures == entries.len() {
            return Err(FilesError::Validation(
                "None of the referenced files could be processed into context".to_string(),
            ));
        }

        let preamble = context::build_preamble(&entries);

        if preamble.len() > self.max_context_bytes {
            return Err(FilesError::Validation(format!(
                "Assembled file context of {} bytes exceeds the {} byte limit",
                preamble.len(),
                self.max_context_bytes
            )));
        }

        Ok(preamble)
    }

    async fn put_metadata(&self, record: &ArtifactRecord) -> FilesResult<()> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| FilesError::Storage(format!("serializing metadata for {}: {e}", record.id)))?;

        self.store
            .put(&record.metadata_key(), "application/json", Bytes::from(bytes))
            .await
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_store() -> FileStore {
        let config: config::FilesConfig = toml::from_str("bucket = \"test\"").expect("valid config");
        FileStore::new(Arc::new(MemoryStore::new()), &config)
    }

    #[tokio::test]
    async fn upload_then_fetch_round_trips() {
        let store = test_store();

        let record = store
            .upload("notes.txt", "text/plain", "assistants", Bytes::from_static(b"hello"))
            .await
            .expect("upload succeeds");

        assert!(record.id.starts_with("file-"));
        assert_eq!(record.status, ArtifactStatus::Processed);

        let (fetched, body) = store.content(&record.id).await.expect("content resolves");
        assert_eq!(fetched.original_filename, "notes.txt");
        assert_eq!(body.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let store = test_store();

        let error = store.metadata("file-does-not-exist").await.expect_err("lookup fails");
        assert!(matches!(error, FilesError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_ids_fail_validation_before_storage() {
        let store = test_store();

        let error = store.metadata("not-a-file-id").await.expect_err("validation fails");
        assert!(matches!(error, FilesError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_removes_both_objects() {
        let store = test_store();

        let record = store
            .upload("gone.txt", "text/plain", "assistants", Bytes::from_static(b"bye"))
            .await
            .expect("upload succeeds");

        store.delete(&record.id).await.expect("delete succeeds");

        assert!(matches!(
            store.metadata(&record.id).await,
            Err(FilesError::NotFound(_))
        ));
        assert!(matches!(store.delete(&record.id).await, Err(FilesError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_filters_by_purpose_and_honors_limit() {
        let store = test_store();

        for (name, purpose) in [("a.txt", "assistants"), ("b.txt", "assistants"), ("c.txt", "batch")] {
            store
                .upload(name, "text/plain", purpose, Bytes::from_static(b"x"))
                .await
                .expect("upload succeeds");
        }

        let assistants = store.list(Some("assistants"), 20).await.expect("list succeeds");
        assert_eq!(assistants.len(), 2);

        let limited = store.list(None, 1).await.expect("list succeeds");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn chat_context_contains_the_framing_and_csv_header() {
        let store = test_store();

        let csv = "Date,Product,Sales\n2024-01-01,A,150\n2024-01-02,B,200";
        let record = store
            .upload("sales.csv", "text/csv", "assistants", Bytes::from(csv.to_string()))
            .await
            .expect("upload succeeds");

        let preamble = store
            .chat_context(&[record.id.clone()])
            .await
            .expect("context assembles");

        assert!(preamble.starts_with("=== UPLOADED FILES CONTEXT ==="));
        assert!(preamble.contains("Date,Product,Sales"));
        assert!(preamble.ends_with("========================"));
    }

    #[tokio::test]
    async fn chat_context_is_deterministic_for_the_same_id_set() {
        let store = test_store();

        let a = store
            .upload("a.txt", "text/plain", "assistants", Bytes::from_static(b"first"))
            .await
            .expect("upload succeeds");
        let b = store
            .upload("b.txt", "text/plain", "assistants", Bytes::from_static(b"second"))
            .await
            .expect("upload succeeds");

        let forward = store
            .chat_context(&[a.id.clone(), b.id.clone()])
            .await
            .expect("context assembles");
        let reversed = store
            .chat_context(&[b.id.clone(), a.id.clone(), b.id.clone()])
            .await
            .expect("context assembles");

        assert_eq!(forward, reversed);
    }

    #[tokio::test]
    async fn unresolvable_id_fails_the_whole_context() {
        let store = test_store();

        let record = store
            .upload("ok.txt", "text/plain", "assistants", Bytes::from_static(b"fine"))
            .await
            .expect("upload succeeds");

        let error = store
            .chat_context(&[record.id.clone(), "file-missing".to_string()])
            .await
            .expect_err("context fails");

        assert!(matches!(error, FilesError::NotFound(_)));
    }

    #[tokio::test]
    async fn oversized_uploads_are_rejected() {
        let config: config::FilesConfig =
            toml::from_str("bucket = \"test\"\nmax_file_bytes = 8").expect("valid config");
        let store = FileStore::new(Arc::new(MemoryStore::new()), &config);

        let error = store
            .upload("big.txt", "text/plain", "assistants", Bytes::from_static(b"way too large"))
            .await
            .expect_err("upload fails");

        assert!(matches!(error, FilesError::Validation(_)));
    }
}
