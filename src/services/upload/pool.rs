use crate::services::progress::{PartProgress, ProgressBroadcaster};
use crate::services::storage::ObjectStore;
use crate::services::upload::aggregator::CompletionAggregator;
use crate::services::upload::chunker::Part;
use crate::services::upload::session::SessionContext;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Bounded pool of part-upload workers for one session.
///
/// Parts flow through a bounded queue: `submit` awaits when the queue
/// is full, so a slow remote endpoint backpressures the chunker instead
/// of growing memory without limit. Workers pull from the shared queue,
/// call the store, and report every terminal outcome into the
/// aggregator. The pool belongs to a single coordinator invocation and
/// must be shut down on every terminal state.
pub struct PartUploadPool {
    queue: mpsc::Sender<Part>,
    workers: Vec<JoinHandle<()>>,
}

impl PartUploadPool {
    pub fn spawn(
        store: Arc<dyn ObjectStore>,
        context: Arc<SessionContext>,
        aggregator: Arc<CompletionAggregator>,
        progress: ProgressBroadcaster,
        worker_count: usize,
        queue_depth: usize,
    ) -> Self {
        let (queue, rx) = mpsc::channel::<Part>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..worker_count.max(1))
            .map(|_| {
                let rx = rx.clone();
                let store = store.clone();
                let context = context.clone();
                let aggregator = aggregator.clone();
                let progress = progress.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the lock only while dequeuing, not while
                        // the upload runs
                        let part = { rx.lock().await.recv().await };
                        let Some(part) = part else { break };
                        upload_one(&*store, &context, &aggregator, &progress, part).await;
                    }
                })
            })
            .collect();

        Self { queue, workers }
    }

    /// Submit a part for upload. Awaits while the queue is at capacity.
    /// Fails only if the pool has already been shut down.
    pub async fn submit(&self, part: Part) -> anyhow::Result<()> {
        self.queue
            .send(part)
            .await
            .map_err(|_| anyhow::anyhow!("part upload pool is shut down"))
    }

    /// Close the queue and wait for the workers to drain it. Any queued
    /// part still gets a terminal outcome before this returns.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        drop(self.queue);
        for worker in self.workers {
            worker.await?;
        }
        Ok(())
    }
}

async fn upload_one(
    store: &dyn ObjectStore,
    context: &SessionContext,
    aggregator: &CompletionAggregator,
    progress: &ProgressBroadcaster,
    part: Part,
) {
    let part_number = part.part_number;
    let observer = PartProgress::new(
        progress.clone(),
        &context.session_id,
        part_number,
        part.len() as u64,
    );

    match store
        .upload_part(
            &context.bucket,
            &context.key,
            &context.upload_id,
            part_number,
            part.payload,
            &observer,
        )
        .await
    {
        Ok(integrity_tag) => {
            tracing::debug!(
                session_id = %context.session_id,
                part_number,
                "part uploaded"
            );
            aggregator.record(part_number, integrity_tag);
        }
        Err(e) => {
            tracing::error!(
                session_id = %context.session_id,
                part_number,
                error = %e,
                "part upload failed"
            );
            aggregator.record_failure(part_number, e);
        }
    }
}
