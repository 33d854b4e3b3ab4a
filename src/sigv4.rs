//! AWS Signature Version 4 primitives.
//!
//! This module is the pure-function core of request authentication:
//! canonical request construction, signing key derivation, string-to-sign
//! assembly, and signature computation/comparison.  The [`crate::auth`]
//! module layers credential lookup and request-level policy on top.
//!
//! The algorithm follows the AWS SigV4 specification:
//! 1. Build a canonical request
//! 2. Build a string-to-sign
//! 3. Derive a signing key via HMAC chain
//! 4. Compute and compare the signature

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Marker used in place of a payload hash when the client did not sign
/// the body.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// SHA-256 of the empty string.
pub const EMPTY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// The only supported signing algorithm.
pub const AWS4_HMAC_SHA256: &str = "AWS4-HMAC-SHA256";

// ── URI encoding ────────────────────────────────────────────────────

/// S3-compatible URI encoding (RFC 3986 with S3 exceptions).
///
/// - `A-Z a-z 0-9 - _ . ~` are left as-is (`~` stays unescaped).
/// - Everything else is percent-encoded with uppercase hex; a space
///   becomes `%20`, never `+`.
/// - `/` is encoded as `%2F` only when `encode_slash` is true (query
///   parameter position); in paths it is preserved.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len() * 2);
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~') {
            encoded.push(ch);
        } else if ch == '/' && !encode_slash {
            encoded.push('/');
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// Percent-decode a query-string or path component.
pub fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

// ── Canonical request ───────────────────────────────────────────────

/// Build the canonical query string from decoded parameters.
///
/// Each name and value is URI-encoded and the pairs are sorted
/// lexicographically by encoded name, joined with `&`.  Parameters with
/// no value render as `name=`.
pub fn canonical_query_string(params: &BTreeMap<String, String>) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Collapse internal whitespace runs to a single space and trim.
fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            result.push(ch);
            last_was_space = false;
        }
    }
    result
}

/// Build the canonical request string.
///
/// ```text
/// HTTPMethod + '\n' +
/// CanonicalURI + '\n' +
/// CanonicalQueryString + '\n' +
/// CanonicalHeaders + '\n' +
/// SignedHeaders + '\n' +
/// HashedPayload
/// ```
///
/// `headers` carries the headers to canonicalize (for verification, the
/// caller pre-filters to the client's `SignedHeaders` set).  Names are
/// lower-cased and sorted; values trimmed with whitespace runs
/// collapsed; `Authorization` is always excluded.  An `Accept-Encoding`
/// header is canonicalized to the literal `identity` regardless of its
/// actual value — intermediary proxies rewrite this header in flight,
/// so signing the observed value would break verification.
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &BTreeMap<String, String>,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
) -> String {
    let canonical_uri = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let canonical_query = canonical_query_string(query);

    let mut normalized: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_lowercase();
        if name == "authorization" {
            continue;
        }
        let value = if name == "accept-encoding" {
            "identity".to_string()
        } else {
            collapse_whitespace(value)
        };
        normalized.insert(name, value);
    }

    let mut canonical_headers = String::new();
    for (name, value) in &normalized {
        canonical_headers.push_str(name);
        canonical_headers.push(':');
        canonical_headers.push_str(value);
        canonical_headers.push('\n');
    }

    let signed_headers = normalized.keys().cloned().collect::<Vec<_>>().join(";");

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{payload_hash}"
    )
}

/// Resolve the payload hash for a request body.
///
/// Precedence: an explicit `UNSIGNED-PAYLOAD` declaration, then the
/// SHA-256 of a non-empty body, then the well-known empty-body hash.
pub fn payload_hash(content_sha256_header: Option<&str>, body: &[u8]) -> String {
    match content_sha256_header {
        Some(UNSIGNED_PAYLOAD) => UNSIGNED_PAYLOAD.to_string(),
        Some(declared) if !declared.is_empty() => declared.to_string(),
        _ if !body.is_empty() => hex::encode(Sha256::digest(body)),
        _ => EMPTY_SHA256.to_string(),
    }
}

// ── String to sign ──────────────────────────────────────────────────

/// Build the string to sign for the `s3` service.
///
/// ```text
/// AWS4-HMAC-SHA256 + '\n' +
/// Timestamp + '\n' +
/// DateStamp/Region/s3/aws4_request + '\n' +
/// HexEncode(SHA256(CanonicalRequest))
/// ```
pub fn string_to_sign(
    request_datetime: &str,
    date_stamp: &str,
    region: &str,
    canonical_request: &str,
) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!(
        "{AWS4_HMAC_SHA256}\n{request_datetime}\n{date_stamp}/{region}/s3/aws4_request\n{hash}"
    )
}

// ── Signing key and signature ───────────────────────────────────────

/// Compute HMAC-SHA256.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Derive the signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC-SHA256("AWS4" + secret, dateStamp)
/// kRegion  = HMAC-SHA256(kDate, region)
/// kService = HMAC-SHA256(kRegion, service)
/// kSigning = HMAC-SHA256(kService, "aws4_request")
/// ```
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Compute the signature: HexEncode(HMAC-SHA256(SigningKey, StringToSign)).
pub fn sign(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Compare a computed signature with a provided one in constant time.
pub fn verify(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
