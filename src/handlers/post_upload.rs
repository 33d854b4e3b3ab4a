//! Browser-style POST policy uploads.
//!
//! `POST /{bucket}` with `multipart/form-data` carries a Base64 policy
//! document plus `x-amz-*` auth fields and the file itself.  The policy
//! signature (SigV4 over the Base64 policy string) is the request's
//! authentication; header-based SigV4 does not apply here.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;

use crate::auth::AuthOutcome;
use crate::errors::S3Error;
use crate::etag;
use crate::handlers::bucket::xml_response;
use crate::store::blob::BlobStore;
use crate::xml;
use crate::AppState;

/// A single part of a `multipart/form-data` body.
#[derive(Debug)]
struct FormPart {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

/// `POST /{bucket}` with `multipart/form-data` -- policy upload.
pub async fn post_upload(
    state: Arc<AppState>,
    path_bucket: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Response, S3Error> {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = content_type
        .split("boundary=")
        .nth(1)
        .map(|b| b.trim_matches('"').to_string())
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing multipart boundary".to_string(),
        })?;

    let parts = parse_multipart_form(body, &boundary);
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut file: Option<(String, Vec<u8>)> = None;
    for part in parts {
        match part.filename {
            Some(filename) => file = Some((filename, part.data)),
            None => {
                fields.insert(
                    part.name.to_lowercase(),
                    String::from_utf8_lossy(&part.data).into_owned(),
                );
            }
        }
    }

    let policy = fields
        .get("policy")
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing policy field".to_string(),
        })?;
    let signature = fields
        .get("x-amz-signature")
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing x-amz-signature field".to_string(),
        })?;
    let credential = fields
        .get("x-amz-credential")
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing x-amz-credential field".to_string(),
        })?;

    match state
        .authenticator
        .verify_post_policy(credential, policy, signature)
    {
        AuthOutcome::Granted { .. } => {}
        AuthOutcome::UnknownAccessKey => return Err(S3Error::InvalidAccessKeyId),
        AuthOutcome::SignatureMismatch => return Err(S3Error::SignatureDoesNotMatch),
        other => {
            tracing::debug!(?other, "post policy rejected");
            return Err(S3Error::AccessDenied {
                message: "Invalid policy or signature".to_string(),
            });
        }
    }

    // The policy document names the target bucket in its conditions;
    // fall back to the bucket in the request path.
    let bucket = bucket_from_policy(policy).unwrap_or_else(|| path_bucket.to_string());
    if !state.store.bucket_exists(&bucket).await? {
        return Err(S3Error::NoSuchBucket { bucket });
    }

    let (filename, data) = file.ok_or_else(|| S3Error::InvalidArgument {
        message: "Missing file field".to_string(),
    })?;
    // An explicit `key` field wins over the uploaded filename.
    let key = fields.get("key").cloned().unwrap_or(filename);

    let object_etag = etag::object_etag(&data);
    state.store.put(&bucket, &key, Bytes::from(data)).await?;
    tracing::debug!(%bucket, %key, "post upload stored");

    let body = xml::render_post_upload_result(&bucket, &key, &object_etag);
    Ok(xml_response(StatusCode::OK, body))
}

/// Extract the bucket name from a Base64 policy document's conditions.
///
/// Looks for `{"bucket": "name"}` entries in the `conditions` array.
fn bucket_from_policy(policy_b64: &str) -> Option<String> {
    let decoded = BASE64.decode(policy_b64).ok()?;
    let policy: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    for condition in policy.get("conditions")?.as_array()? {
        if let Some(bucket) = condition.get("bucket").and_then(|b| b.as_str()) {
            return Some(bucket.to_string());
        }
    }
    None
}

/// Parse a `multipart/form-data` body into its parts.
///
/// Minimal parser for the POST upload form: sections are delimited by
/// `--{boundary}`, each with `Content-Disposition` naming the field and
/// an optional filename, a blank line, then the raw content.
fn parse_multipart_form(body: &[u8], boundary: &str) -> Vec<FormPart> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();

    for segment in split_bytes(body, delimiter.as_bytes()) {
        // The closing delimiter leaves a "--" segment; the preamble (if
        // any) has no Content-Disposition and is skipped below.
        let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);
        if segment.starts_with(b"--") {
            continue;
        }
        let Some(header_end) = find_bytes(segment, b"\r\n\r\n") else {
            continue;
        };
        let header_block = String::from_utf8_lossy(&segment[..header_end]);
        let mut content = &segment[header_end + 4..];
        if content.ends_with(b"\r\n") {
            content = &content[..content.len() - 2];
        }

        let mut name = None;
        let mut filename = None;
        for line in header_block.lines() {
            if !line.to_ascii_lowercase().starts_with("content-disposition:") {
                continue;
            }
            for attr in line.split(';') {
                let attr = attr.trim();
                if let Some(v) = attr.strip_prefix("name=") {
                    name = Some(v.trim_matches('"').to_string());
                } else if let Some(v) = attr.strip_prefix("filename=") {
                    filename = Some(v.trim_matches('"').to_string());
                }
            }
        }

        if let Some(name) = name {
            parts.push(FormPart {
                name,
                filename,
                data: content.to_vec(),
            });
        }
    }

    parts
}

/// Split `haystack` on every occurrence of `needle`.
fn split_bytes<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut start = 0;
    while let Some(pos) = find_bytes(&haystack[start..], needle) {
        segments.push(&haystack[start..start + pos]);
        start += pos + needle.len();
    }
    segments.push(&haystack[start..]);
    segments
}

/// First occurrence of `needle` in `haystack`.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
