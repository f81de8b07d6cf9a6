use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::error::{BuildError, DisplayErrorContext};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("invalid invalidation request: {0}")]
    Build(#[from] BuildError),
    #[error("create invalidation failed: {0}")]
    Request(String),
    #[error("response is missing the invalidation")]
    MissingInvalidation,
}

#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Issues one batched invalidation and returns its id.
    ///
    /// `caller_reference` must be unique per request; replaying a reference
    /// with different paths is rejected by CloudFront.
    async fn invalidate(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, CdnError>;
}

#[derive(Clone)]
pub struct CloudFrontClient {
    client: Client,
}

impl CloudFrontClient {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self::from_client(Client::new(sdk_config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CdnClient for CloudFrontClient {
    async fn invalidate(
        &self,
        distribution_id: &str,
        paths: &[String],
        caller_reference: &str,
    ) -> Result<String, CdnError> {
        let paths = Paths::builder()
            .quantity(paths.len() as i32)
            .set_items(Some(paths.to_vec()))
            .build()?;
        let batch = InvalidationBatch::builder()
            .paths(paths)
            .caller_reference(caller_reference)
            .build()?;
        let output = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|err| CdnError::Request(DisplayErrorContext(&err).to_string()))?;
        output
            .invalidation()
            .map(|invalidation| invalidation.id().to_string())
            .ok_or(CdnError::MissingInvalidation)
    }
}

/// `~` must be sent percent-encoded; CloudFront otherwise fails to match the path.
pub fn encode_invalidation_path(path: &str) -> String {
    path.replace('~', "%7E")
}
