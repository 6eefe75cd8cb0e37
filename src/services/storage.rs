use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use std::time::Duration;

/// Integrity tag returned by the store for one uploaded part. The
/// completion call requires these in ascending `part_number` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTag {
    pub part_number: i32,
    pub integrity_tag: String,
}

/// Callback invoked by a store implementation as payload bytes go out.
/// `bytes` is cumulative for the current call. Implementations must be
/// cheap and must never fail the transfer.
pub trait TransferObserver: Send + Sync {
    fn transferred(&self, bytes: u64);
}

/// Observer for transfers nobody is watching.
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn transferred(&self, _bytes: u64) {}
}

/// Provider-agnostic object store capability set consumed by the upload
/// coordinator. The multipart trio (initiate / upload_part / complete or
/// abort) is transactional: a session that initiated must end in exactly
/// one of complete or abort.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn initiate_upload(&self, bucket: &str, key: &str, content_type: &str)
    -> Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        payload: Bytes,
        observer: &dyn TransferObserver,
    ) -> Result<String>;

    /// `parts` must be ascending by part number with no gaps.
    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()>;

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        payload: Bytes,
        observer: &dyn TransferObserver,
    ) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn presign_get(&self, bucket: &str, key: &str, validity: Duration) -> Result<String>;
}

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn initiate_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String> {
        let res = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_disposition("inline")
            .send()
            .await?;

        let upload_id = res
            .upload_id()
            .ok_or_else(|| anyhow::anyhow!("No upload ID"))?;
        Ok(upload_id.to_string())
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        payload: Bytes,
        observer: &dyn TransferObserver,
    ) -> Result<String> {
        let len = payload.len() as u64;
        let res = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(len as i64)
            .body(ByteStream::from(payload))
            .send()
            .await?;

        // The SDK hands the whole part buffer to the transport in one
        // call, so per-part completion is the finest granularity here.
        observer.transferred(len);

        Ok(res.e_tag().unwrap_or_default().to_string())
    }

    async fn complete_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.integrity_tag.as_str())
                    .build()
            })
            .collect();

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await?;
        Ok(())
    }

    async fn abort_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        payload: Bytes,
        observer: &dyn TransferObserver,
    ) -> Result<()> {
        let len = payload.len() as u64;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_disposition("inline")
            .body(ByteStream::from(payload))
            .send()
            .await?;

        observer.transferred(len);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, validity: Duration) -> Result<String> {
        let config = PresigningConfig::expires_in(validity)?;
        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(config)
            .await?;
        Ok(presigned.uri().to_string())
    }
}
