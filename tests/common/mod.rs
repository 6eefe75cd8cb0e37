use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rust_s3_uploader::services::storage::{ObjectStore, PartTag, TransferObserver};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory object store double. Records every call so tests can
/// assert on the exact protocol the coordinator drove, and reports
/// transfer progress in configurable increments so throttling is
/// exercised the way a streaming transport would.
#[derive(Default)]
pub struct MockStore {
    /// Parts whose upload call fails
    pub fail_parts: Vec<i32>,
    /// Whether the completion call fails
    pub fail_commit: bool,
    /// Progress callbacks per transfer (1 = only on completion)
    pub progress_increments: u64,

    pub initiate_calls: AtomicUsize,
    pub abort_calls: AtomicUsize,
    pub complete_calls: Mutex<Vec<Vec<PartTag>>>,
    /// part_number -> payload length
    pub uploaded_parts: DashMap<i32, usize>,
    /// (key, payload length) per single-shot put
    pub put_calls: Mutex<Vec<(String, usize)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            progress_increments: 1,
            ..Default::default()
        }
    }

    pub fn failing_parts(parts: &[i32]) -> Self {
        Self {
            fail_parts: parts.to_vec(),
            ..Self::new()
        }
    }

    pub fn failing_commit() -> Self {
        Self {
            fail_commit: true,
            ..Self::new()
        }
    }

    pub fn with_progress_increments(mut self, increments: u64) -> Self {
        self.progress_increments = increments;
        self
    }

    fn report(&self, total: u64, observer: &dyn TransferObserver) {
        let increments = self.progress_increments.max(1);
        for step in 1..=increments {
            observer.transferred(total * step / increments);
        }
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn initiate_upload(&self, _: &str, _: &str, _: &str) -> Result<String> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        Ok("upload-123".to_string())
    }

    async fn upload_part(
        &self,
        _: &str,
        _: &str,
        _: &str,
        part_number: i32,
        payload: Bytes,
        observer: &dyn TransferObserver,
    ) -> Result<String> {
        // Let submissions interleave like a real remote call would
        tokio::task::yield_now().await;

        if self.fail_parts.contains(&part_number) {
            anyhow::bail!("injected failure for part {part_number}");
        }
        self.uploaded_parts.insert(part_number, payload.len());
        self.report(payload.len() as u64, observer);
        Ok(format!("etag-{part_number}"))
    }

    async fn complete_upload(&self, _: &str, _: &str, _: &str, parts: &[PartTag]) -> Result<()> {
        if self.fail_commit {
            anyhow::bail!("injected commit failure");
        }
        self.complete_calls.lock().unwrap().push(parts.to_vec());
        Ok(())
    }

    async fn abort_upload(&self, _: &str, _: &str, _: &str) -> Result<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn put_object(
        &self,
        _: &str,
        key: &str,
        _: &str,
        payload: Bytes,
        observer: &dyn TransferObserver,
    ) -> Result<()> {
        self.put_calls
            .lock()
            .unwrap()
            .push((key.to_string(), payload.len()));
        self.report(payload.len() as u64, observer);
        Ok(())
    }

    async fn delete_object(&self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, _: Duration) -> Result<String> {
        Ok(format!("https://signed.example/{}/{}", bucket, key))
    }
}
