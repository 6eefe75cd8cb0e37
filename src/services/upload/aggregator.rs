use crate::services::storage::PartTag;
use dashmap::DashMap;
use std::sync::OnceLock;
use tokio::sync::Semaphore;

enum PartOutcome {
    Done(String),
    Failed(anyhow::Error),
}

/// The first part failure observed, surfaced after the barrier.
#[derive(Debug)]
pub struct PartFailure {
    pub part_number: i32,
    pub source: anyhow::Error,
}

/// Fan-out/fan-in collector for per-part upload outcomes.
///
/// Each part's outcome is recorded at most once, by whichever worker
/// finished it. `join` is a barrier over every submitted part: it never
/// gives up early on the first failure, because parts already sent to
/// the remote store cannot be un-sent. Only after all outcomes are in
/// does it either hand back the successful tags in ascending part order
/// or report the first failure.
pub struct CompletionAggregator {
    outcomes: DashMap<i32, PartOutcome>,
    first_failure: OnceLock<i32>,
    // One permit per terminal outcome; join acquires `submitted` of them.
    completions: Semaphore,
}

impl CompletionAggregator {
    pub fn new() -> Self {
        Self {
            outcomes: DashMap::new(),
            first_failure: OnceLock::new(),
            completions: Semaphore::new(0),
        }
    }

    /// Record a successful part upload.
    pub fn record(&self, part_number: i32, integrity_tag: String) {
        if self
            .outcomes
            .insert(part_number, PartOutcome::Done(integrity_tag))
            .is_some()
        {
            tracing::error!(part_number, "part outcome recorded twice");
        }
        self.completions.add_permits(1);
    }

    /// Record a failed part upload.
    pub fn record_failure(&self, part_number: i32, source: anyhow::Error) {
        let _ = self.first_failure.set(part_number);
        if self
            .outcomes
            .insert(part_number, PartOutcome::Failed(source))
            .is_some()
        {
            tracing::error!(part_number, "part outcome recorded twice");
        }
        self.completions.add_permits(1);
    }

    /// Whether any part has failed so far. Lets the session stop
    /// submitting new parts while in-flight ones drain.
    pub fn has_failure(&self) -> bool {
        self.first_failure.get().is_some()
    }

    /// Wait until all `submitted` parts have a terminal outcome, then
    /// return the integrity tags sorted ascending by part number, or
    /// the first failure if any part did not finish cleanly.
    pub async fn join(&self, submitted: u32) -> Result<Vec<PartTag>, PartFailure> {
        let _permits = self
            .completions
            .acquire_many(submitted)
            .await
            .map_err(|e| PartFailure {
                part_number: 0,
                source: anyhow::Error::new(e).context("completion barrier closed"),
            })?;

        if let Some(&part_number) = self.first_failure.get() {
            let source = match self.outcomes.remove(&part_number) {
                Some((_, PartOutcome::Failed(e))) => e,
                _ => anyhow::anyhow!("part {part_number} failed"),
            };
            return Err(PartFailure {
                part_number,
                source,
            });
        }

        let mut tags = Vec::with_capacity(submitted as usize);
        for part_number in 1..=submitted as i32 {
            match self.outcomes.remove(&part_number) {
                Some((_, PartOutcome::Done(integrity_tag))) => tags.push(PartTag {
                    part_number,
                    integrity_tag,
                }),
                _ => {
                    // A hole means a worker vanished without recording.
                    return Err(PartFailure {
                        part_number,
                        source: anyhow::anyhow!("no outcome recorded for part {part_number}"),
                    });
                }
            }
        }

        tags.sort_by_key(|t| t.part_number);
        Ok(tags)
    }
}

impl Default for CompletionAggregator {
    fn default() -> Self {
        Self::new()
    }
}
