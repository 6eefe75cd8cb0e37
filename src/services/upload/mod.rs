pub mod aggregator;
pub mod chunker;
pub mod pool;
pub mod session;

pub use aggregator::CompletionAggregator;
pub use chunker::{Chunker, Part};
pub use pool::PartUploadPool;
pub use session::{SessionContext, SessionState, UploadSession};

use crate::config::UploadConfig;
use crate::services::progress::{PartProgress, ProgressBroadcaster};
use crate::services::storage::ObjectStore;
use crate::utils::keys;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read source stream: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to initiate multipart upload: {0}")]
    Initiate(#[source] anyhow::Error),

    #[error("upload of part {part_number} failed: {source}")]
    Part {
        part_number: i32,
        #[source]
        source: anyhow::Error,
    },

    #[error("interrupted while waiting for part uploads: {0}")]
    WaitInterrupted(#[source] anyhow::Error),

    #[error("failed to commit multipart upload: {0}")]
    Commit(#[source] anyhow::Error),

    #[error("single-shot upload failed: {0}")]
    Put(#[source] anyhow::Error),
}

/// What the caller gets back on success: the object is committed and
/// downloadable. Nothing in between is ever reported.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub session_id: String,
    pub key: String,
    pub url: String,
    pub size_bytes: u64,
    pub parts: usize,
}

/// Drives one upload end to end: chunk, fan out to the part workers,
/// fan in at the aggregator, then commit or abort. Exactly one of the
/// two is issued, never both, never neither. Small sources skip the
/// multipart machinery and go through a single put.
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    progress: ProgressBroadcaster,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        progress: ProgressBroadcaster,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            progress,
            config,
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Upload a source stream under the given file name. `session_id`
    /// addresses the progress subscription for this attempt; the caller
    /// may have registered a subscriber for it beforehand.
    pub async fn upload<R>(
        &self,
        session_id: &str,
        file_name: &str,
        reader: R,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let key = keys::derive_key(file_name);
        let mut chunker = Chunker::new(reader, self.config.part_size);

        // The first part is read before touching the store so the
        // content type can be sniffed from real bytes and tiny sources
        // can skip the multipart protocol entirely.
        let first = chunker.next_part().await.map_err(UploadError::Read)?;
        let head = first.as_ref().map(|p| &p.payload[..]).unwrap_or_default();
        let content_type = keys::sniff_content_type(head);

        let single_shot = match &first {
            None => true,
            Some(part) => {
                part.len() < self.config.part_size
                    && part.len() <= self.config.small_object_threshold
            }
        };

        if single_shot {
            let payload = first.map(|p| p.payload).unwrap_or_default();
            return self
                .upload_single(session_id, &key, &content_type, payload)
                .await;
        }

        self.upload_multipart(session_id, &key, &content_type, first, chunker)
            .await
    }

    /// Small-object path: one put call, no multipart session.
    async fn upload_single(
        &self,
        session_id: &str,
        key: &str,
        content_type: &str,
        payload: bytes::Bytes,
    ) -> Result<UploadOutcome, UploadError> {
        let size = payload.len() as u64;
        let observer = PartProgress::new(self.progress.clone(), session_id, 1, size);

        if let Err(e) = self
            .store
            .put_object(&self.config.bucket, key, content_type, payload, &observer)
            .await
        {
            self.progress.unregister(session_id);
            return Err(UploadError::Put(e));
        }

        self.progress.complete(session_id);
        let url = self.download_url(key).await;
        tracing::info!(session_id, key, size, "single-shot upload successful");

        Ok(UploadOutcome {
            session_id: session_id.to_string(),
            key: key.to_string(),
            url,
            size_bytes: size,
            parts: 1,
        })
    }

    async fn upload_multipart<R>(
        &self,
        session_id: &str,
        key: &str,
        content_type: &str,
        first: Option<Part>,
        mut chunker: Chunker<R>,
    ) -> Result<UploadOutcome, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let upload_id = self
            .store
            .initiate_upload(&self.config.bucket, key, content_type)
            .await
            .map_err(UploadError::Initiate)?;

        let mut upload_session = UploadSession::new(
            session_id.to_string(),
            self.config.bucket.clone(),
            key.to_string(),
            upload_id,
        );
        let context = Arc::new(upload_session.context().clone());

        let aggregator = Arc::new(CompletionAggregator::new());
        let pool = PartUploadPool::spawn(
            self.store.clone(),
            context.clone(),
            aggregator.clone(),
            self.progress.clone(),
            self.config.worker_count(),
            self.config.queue_depth,
        );
        upload_session.advance(SessionState::InProgress);

        let mut submitted: u32 = 0;
        let mut total_bytes: u64 = 0;
        let mut read_error: Option<std::io::Error> = None;
        let mut pending = first;

        loop {
            let Some(part) = pending.take() else { break };
            total_bytes += part.len() as u64;
            if pool.submit(part).await.is_err() {
                break;
            }
            submitted += 1;

            // A failed sibling means the session is doomed; stop
            // dispatching new parts but keep draining in-flight ones.
            if aggregator.has_failure() {
                break;
            }

            match chunker.next_part().await {
                Ok(next) => pending = next,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }

        // Fan-in barrier: every dispatched part gets a terminal outcome
        // before the session commits or aborts.
        let joined = aggregator.join(submitted).await;

        if let Err(join_err) = pool.shutdown().await {
            upload_session.advance(SessionState::Aborting);
            self.abort_session(&context).await;
            upload_session.advance(SessionState::Aborted);
            self.progress.unregister(&context.session_id);
            return Err(UploadError::WaitInterrupted(anyhow::Error::new(join_err)));
        }

        // The read error, if any, is the original trigger; otherwise a
        // part failure reported through the barrier.
        let collected: Result<Vec<_>, UploadError> = match (read_error, joined) {
            (None, Ok(tags)) => Ok(tags),
            (Some(e), _) => Err(UploadError::Read(e)),
            (None, Err(failure)) => Err(UploadError::Part {
                part_number: failure.part_number,
                source: failure.source,
            }),
        };

        match collected {
            Ok(tags) => {
                upload_session.advance(SessionState::Completing);
                match self
                    .store
                    .complete_upload(&context.bucket, &context.key, &context.upload_id, &tags)
                    .await
                {
                    Ok(()) => {
                        upload_session.advance(SessionState::Completed);
                        self.progress.complete(&context.session_id);
                        let url = self.download_url(&context.key).await;
                        tracing::info!(
                            session_id = %context.session_id,
                            key = %context.key,
                            parts = tags.len(),
                            size = total_bytes,
                            "multipart upload successful"
                        );
                        Ok(UploadOutcome {
                            session_id: context.session_id.clone(),
                            key: context.key.clone(),
                            url,
                            size_bytes: total_bytes,
                            parts: tags.len(),
                        })
                    }
                    Err(e) => {
                        // All parts landed but the commit failed. The
                        // remote upload is left as-is; no automatic
                        // abort or retry.
                        upload_session.advance(SessionState::Failed);
                        self.progress.unregister(&context.session_id);
                        Err(UploadError::Commit(e))
                    }
                }
            }
            Err(trigger) => {
                upload_session.advance(SessionState::Aborting);
                self.abort_session(&context).await;
                upload_session.advance(SessionState::Aborted);
                self.progress.unregister(&context.session_id);
                Err(trigger)
            }
        }
    }

    /// Best-effort abort: its own failure is logged, never surfaced.
    /// The error that triggered the abort is the one the caller sees.
    async fn abort_session(&self, context: &SessionContext) {
        if let Err(e) = self
            .store
            .abort_upload(&context.bucket, &context.key, &context.upload_id)
            .await
        {
            tracing::warn!(
                session_id = %context.session_id,
                upload_id = %context.upload_id,
                error = %e,
                "abort failed; remote multipart state may be orphaned"
            );
        }
    }

    async fn download_url(&self, key: &str) -> String {
        match self
            .store
            .presign_get(&self.config.bucket, key, self.config.presign_validity())
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(key, error = %e, "presigning failed, falling back to plain path");
                format!("{}/{}", self.config.bucket, key)
            }
        }
    }
}
