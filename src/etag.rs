//! ETag computation.
//!
//! Single-object ETags are the Base64-encoded MD5 of the content; the
//! multipart ETag is the MD5 over the decoded part ETags (in ascending
//! part-number order) with a `-{count}` suffix.  Both are returned
//! quoted, matching the wire format clients see in headers and XML.
//!
//! ETag computation never fails: if a part ETag cannot be decoded, the
//! placeholder value is returned so a response is always produced.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};

/// Placeholder returned when ETag computation cannot proceed.
pub const FALLBACK_ETAG: &str = "\"dummy-etag\"";

/// Quoted Base64 MD5 ETag for a single object's content.
pub fn object_etag(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    format!("\"{}\"", BASE64.encode(digest))
}

/// Quoted composite ETag for a completed multipart upload.
///
/// `part_etags` must already be ordered by ascending part number.  Each
/// part's own ETag is stripped of quotes, Base64-decoded, and fed into a
/// single MD5 accumulator; the digest is Base64-encoded and suffixed
/// with `-{part count}`.
pub fn multipart_etag(part_etags: &[String]) -> String {
    let mut hasher = Md5::new();
    for etag in part_etags {
        let clean = etag.trim_matches('"');
        match BASE64.decode(clean) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => return FALLBACK_ETAG.to_string(),
        }
    }
    format!("\"{}-{}\"", BASE64.encode(hasher.finalize()), part_etags.len())
}
