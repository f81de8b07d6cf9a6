use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Overrides applied on top of the standard AWS configuration chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsSettings {
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    pub endpoint_url: Option<String>,
}

impl AwsSettings {
    /// Custom endpoints are addressed path-style (`/bucket/key`).
    pub fn force_path_style(&self) -> bool {
        self.endpoint_url.is_some()
    }
}

/// Loads shared SDK configuration; credentials come from the default provider chain.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint_url) = &settings.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }
    loader.load().await
}
