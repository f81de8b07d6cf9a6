/// Computes a content tag comparable with the tag the object store reports.
pub trait Fingerprint: Send + Sync {
    fn fingerprint(&self, bytes: &[u8]) -> String;
}

/// S3 single-part ETag: quoted lowercase hex MD5 of the object body.
///
/// Objects written with SSE-KMS or multipart uploads carry a different
/// ETag and will always compare as changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5ETag;

impl Fingerprint for Md5ETag {
    fn fingerprint(&self, bytes: &[u8]) -> String {
        etag_for(bytes)
    }
}

pub fn etag_for(bytes: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(bytes))
}
