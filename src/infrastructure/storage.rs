use crate::services::storage::S3ObjectStore;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

/// Build the S3-backed object store from the environment.
///
/// With `S3_ENDPOINT` set (MinIO or another S3-compatible endpoint),
/// static credentials from `S3_ACCESS_KEY` / `S3_SECRET_KEY` are used
/// and path-style addressing is forced. Without it, the default AWS
/// credential chain applies.
pub async fn setup_storage(bucket: &str) -> Arc<S3ObjectStore> {
    let region = env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let endpoint_url = env::var("S3_ENDPOINT").ok();

    let mut loader = aws_config::from_env().region(Region::new(region));

    if let Some(ref endpoint) = endpoint_url {
        info!("☁️  S3 Storage: {} (Bucket: {})", endpoint, bucket);
        let access_key = env::var("S3_ACCESS_KEY").expect("S3_ACCESS_KEY must be set");
        let secret_key = env::var("S3_SECRET_KEY").expect("S3_SECRET_KEY must be set");
        loader = loader
            .endpoint_url(endpoint)
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "static",
            ));
    } else {
        info!("☁️  S3 Storage: AWS (Bucket: {})", bucket);
    }

    let aws_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(endpoint_url.is_some())
        .build();
    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Fail loudly at startup if the bucket is unreachable, not on the
    // first upload
    match s3_client.head_bucket().bucket(bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(e) => {
            tracing::warn!("🪣 Bucket '{}' not reachable ({}), creating...", bucket, e);
            if let Err(e) = s3_client.create_bucket().bucket(bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created", bucket);
            }
        }
    }

    Arc::new(S3ObjectStore::new(s3_client))
}
