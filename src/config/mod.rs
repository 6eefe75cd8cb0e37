use std::env;
use std::time::Duration;

/// Tuning for the upload coordinator and its HTTP surface
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Target bucket for all uploads
    pub bucket: String,

    /// Multipart part size in bytes (default: 5 MiB)
    pub part_size: usize,

    /// Lower bound on part-upload workers (default: 4)
    pub min_workers: usize,

    /// Upper bound on part-upload workers (default: 10)
    pub max_workers: usize,

    /// Capacity of the part submission queue (default: 16). Submission
    /// awaits when the queue is full; the queue is never unbounded.
    pub queue_depth: usize,

    /// Objects at or below this size go through a single put call
    /// instead of a multipart session (default: 1 MiB)
    pub small_object_threshold: usize,

    /// Validity of presigned download URLs in seconds (default: 600)
    pub presign_validity_secs: u64,

    /// Maximum accepted request body size in bytes (default: 256 MiB)
    pub max_file_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            bucket: "uploads".to_string(),
            part_size: 5 * 1024 * 1024, // 5 MiB
            min_workers: 4,
            max_workers: 10,
            queue_depth: 16,
            small_object_threshold: 1024 * 1024, // 1 MiB
            presign_validity_secs: 600,
            max_file_size: 256 * 1024 * 1024, // 256 MiB
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            bucket: env::var("S3_BUCKET").unwrap_or(default.bucket),

            part_size: env::var("UPLOAD_PART_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.part_size),

            min_workers: env::var("UPLOAD_MIN_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.min_workers),

            max_workers: env::var("UPLOAD_MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_workers),

            queue_depth: env::var("UPLOAD_QUEUE_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&d| d > 0)
                .unwrap_or(default.queue_depth),

            small_object_threshold: env::var("SMALL_OBJECT_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.small_object_threshold),

            presign_validity_secs: env::var("PRESIGN_VALIDITY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presign_validity_secs),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),
        }
    }

    /// Number of part-upload workers for this host: available
    /// parallelism clamped to the configured bounds.
    pub fn worker_count(&self) -> usize {
        let max = self.max_workers.max(1);
        let min = self.min_workers.clamp(1, max);
        num_cpus::get().clamp(min, max)
    }

    pub fn presign_validity(&self) -> Duration {
        Duration::from_secs(self.presign_validity_secs)
    }
}
