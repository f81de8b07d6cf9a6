use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("put {key} failed: {message}")]
    Put { key: String, message: String },
}

/// Result of an existence check. `tag` is reported verbatim, quotes included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadResult {
    pub exists: bool,
    pub tag: Option<String>,
}

impl HeadResult {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn found(tag: impl Into<String>) -> Self {
        Self {
            exists: true,
            tag: Some(tag.into()),
        }
    }
}

/// Per-run settings applied to every upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Canned ACL such as `public-read`.
    pub acl: Option<String>,
    /// Server-side encryption such as `AES256` or `aws:kms`.
    pub server_side_encryption: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Never fails: any error is reported as a missing object so the file
    /// gets uploaded instead of silently skipped.
    async fn head(&self, key: &str) -> HeadResult;

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        options: &PutOptions,
    ) -> Result<String, StoreError>;
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(sdk_config: &SdkConfig, bucket: impl Into<String>, force_path_style: bool) -> Self {
        let config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();
        Self::from_client(Client::from_conf(config), bucket)
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn head(&self, key: &str) -> HeadResult {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => HeadResult {
                exists: true,
                tag: output.e_tag().map(str::to_owned),
            },
            Err(err) => {
                debug!(key, error = %DisplayErrorContext(&err), "head object failed; treating as missing");
                HeadResult::missing()
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        options: &PutOptions,
    ) -> Result<String, StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .set_acl(options.acl.as_deref().map(ObjectCannedAcl::from))
            .set_server_side_encryption(
                options
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .send()
            .await
            .map_err(|err| StoreError::Put {
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(key.to_string())
    }
}
