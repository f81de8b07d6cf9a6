mod aws;
mod cdn;
mod etag;
mod store;

pub use aws::{AwsSettings, load_sdk_config};
pub use cdn::{CdnClient, CdnError, CloudFrontClient, encode_invalidation_path};
pub use etag::{Fingerprint, Md5ETag, etag_for};
pub use store::{HeadResult, ObjectStore, PutOptions, S3Store, StoreError};
