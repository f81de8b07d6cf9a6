use std::path::PathBuf;
use std::str::FromStr;

use bucket_sync_core::{AwsSettings, PutOptions};
use thiserror::Error;

use crate::sync::paths::normalize_prefix;

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
pub const DEFAULT_COMPARE_CONCURRENCY: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required input {0} is not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
    #[error("source path {0:?} does not exist or is not a directory")]
    SourceMissing(PathBuf),
}

/// What to do with the rest of the upload batch after a failed upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Continue,
    Fail,
}

impl FromStr for FailurePolicy {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "fail" => Ok(Self::Fail),
            _ => Err(()),
        }
    }
}

/// Which uploaded files get their CDN paths invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Only objects that existed remotely with a different tag.
    #[default]
    Changed,
    /// Every uploaded object, including ones new to the bucket.
    AllUploaded,
}

impl FromStr for InvalidationScope {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "changed" => Ok(Self::Changed),
            "all-uploaded" | "all_uploaded" => Ok(Self::AllUploaded),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub bucket: String,
    /// Key prefix inside the bucket, already normalized (no leading `/`).
    pub prefix: String,
    pub acl: Option<String>,
    pub sse: Option<String>,
    pub distribution_id: Option<String>,
    pub source: PathBuf,
    pub compare: bool,
    pub upload_concurrency: usize,
    pub compare_concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub invalidation_scope: InvalidationScope,
    pub aws: AwsSettings,
}

impl SyncConfig {
    pub fn new(bucket: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            acl: None,
            sse: None,
            distribution_id: None,
            source: source.into(),
            compare: false,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            compare_concurrency: DEFAULT_COMPARE_CONCURRENCY,
            failure_policy: FailurePolicy::default(),
            invalidation_scope: InvalidationScope::default(),
            aws: AwsSettings::default(),
        }
    }

    /// Reads action inputs (`INPUT_*`) and checks the source directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bucket = read("INPUT_AWS_BUCKET_NAME").ok_or(ConfigError::Missing("aws_bucket_name"))?;
        let source = read("INPUT_SOURCE").ok_or(ConfigError::Missing("source"))?;
        let mut config = Self::new(bucket, source);

        config.prefix = read("INPUT_AWS_BUCKET_DIR")
            .map(|value| normalize_prefix(&value))
            .unwrap_or_default();
        config.acl = read("INPUT_AWS_BUCKET_ACL");
        config.sse = read("INPUT_AWS_BUCKET_SSE");
        config.distribution_id = read("INPUT_AWS_CLOUDFRONT_DISTRIBUTION_ID");
        config.compare = read("INPUT_COMPARE")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config.upload_concurrency =
            read_limit(read("INPUT_CONCURRENT"), DEFAULT_UPLOAD_CONCURRENCY);
        config.compare_concurrency =
            read_limit(read("INPUT_COMPARE_CONCURRENT"), DEFAULT_COMPARE_CONCURRENCY);
        if let Some(value) = read("INPUT_IF_HAS_FAILED") {
            config.failure_policy = value.parse().map_err(|_| ConfigError::Invalid {
                name: "if_has_failed",
                value,
            })?;
        }
        if let Some(value) = read("INPUT_INVALIDATION_SCOPE") {
            config.invalidation_scope = value.parse().map_err(|_| ConfigError::Invalid {
                name: "invalidation_scope",
                value,
            })?;
        }
        config.aws = AwsSettings {
            region: read("INPUT_AWS_REGION"),
            endpoint_url: read("INPUT_AWS_ENDPOINT_URL"),
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.is_dir() {
            return Err(ConfigError::SourceMissing(self.source.clone()));
        }
        Ok(())
    }

    pub fn put_options(&self) -> PutOptions {
        PutOptions {
            acl: self.acl.clone(),
            server_side_encryption: self.sse.clone(),
        }
    }
}

// Zero or unparseable limits fall back to the default.
fn read_limit(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn applies_defaults_for_optional_inputs() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("INPUT_AWS_BUCKET_NAME", "site"),
            ("INPUT_SOURCE", "./dist"),
        ]))
        .unwrap();

        assert_eq!(config.bucket, "site");
        assert_eq!(config.source, PathBuf::from("./dist"));
        assert_eq!(config.prefix, "");
        assert!(!config.compare);
        assert_eq!(config.upload_concurrency, 4);
        assert_eq!(config.compare_concurrency, 100);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.invalidation_scope, InvalidationScope::Changed);
        assert_eq!(config.distribution_id, None);
        assert_eq!(config.put_options(), PutOptions::default());
    }

    #[test]
    fn reads_every_input() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("INPUT_AWS_BUCKET_NAME", "site"),
            ("INPUT_SOURCE", "dist"),
            ("INPUT_AWS_BUCKET_DIR", "/static\\v2/"),
            ("INPUT_AWS_BUCKET_ACL", "public-read"),
            ("INPUT_AWS_BUCKET_SSE", "AES256"),
            ("INPUT_AWS_CLOUDFRONT_DISTRIBUTION_ID", "E2EXAMPLE"),
            ("INPUT_COMPARE", "TRUE"),
            ("INPUT_CONCURRENT", "8"),
            ("INPUT_COMPARE_CONCURRENT", "50"),
            ("INPUT_IF_HAS_FAILED", "fail"),
            ("INPUT_INVALIDATION_SCOPE", "all-uploaded"),
            ("INPUT_AWS_REGION", "eu-west-1"),
            ("INPUT_AWS_ENDPOINT_URL", "http://localhost:9000"),
        ]))
        .unwrap();

        assert_eq!(config.prefix, "static/v2");
        assert_eq!(config.distribution_id.as_deref(), Some("E2EXAMPLE"));
        assert!(config.compare);
        assert_eq!(config.upload_concurrency, 8);
        assert_eq!(config.compare_concurrency, 50);
        assert_eq!(config.failure_policy, FailurePolicy::Fail);
        assert_eq!(config.invalidation_scope, InvalidationScope::AllUploaded);
        assert_eq!(
            config.put_options(),
            PutOptions {
                acl: Some("public-read".into()),
                server_side_encryption: Some("AES256".into()),
            }
        );
        assert_eq!(config.aws.region.as_deref(), Some("eu-west-1"));
        assert!(config.aws.force_path_style());
    }

    #[test]
    fn missing_bucket_is_an_error() {
        let err = SyncConfig::from_lookup(lookup(&[("INPUT_SOURCE", "dist")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("aws_bucket_name"));
    }

    #[test]
    fn blank_source_counts_as_missing() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("INPUT_AWS_BUCKET_NAME", "site"),
            ("INPUT_SOURCE", "   "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("source"));
    }

    #[test]
    fn invalid_or_zero_limits_fall_back_to_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("INPUT_AWS_BUCKET_NAME", "site"),
            ("INPUT_SOURCE", "dist"),
            ("INPUT_CONCURRENT", "0"),
            ("INPUT_COMPARE_CONCURRENT", "lots"),
        ]))
        .unwrap();
        assert_eq!(config.upload_concurrency, 4);
        assert_eq!(config.compare_concurrency, 100);
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let err = SyncConfig::from_lookup(lookup(&[
            ("INPUT_AWS_BUCKET_NAME", "site"),
            ("INPUT_SOURCE", "dist"),
            ("INPUT_IF_HAS_FAILED", "explode"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                name: "if_has_failed",
                value: "explode".into()
            }
        );
    }

    #[test]
    fn validate_requires_existing_source_directory() {
        let dir = tempdir().unwrap();
        assert_eq!(SyncConfig::new("site", dir.path()).validate(), Ok(()));

        let missing = dir.path().join("missing");
        assert_eq!(
            SyncConfig::new("site", &missing).validate(),
            Err(ConfigError::SourceMissing(missing))
        );
    }
}
