//! Multipart-upload S3 API handlers.
//!
//! Thin HTTP shims over [`crate::uploads::UploadCoordinator`]: each
//! handler checks the upload ID against the active set up front so an
//! unknown or already-terminated upload is rejected with `NoSuchUpload`
//! before anything is dispatched.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::errors::S3Error;
use crate::handlers::bucket::xml_response;
use crate::store::blob::BlobStore;
use crate::xml;
use crate::AppState;

/// Pull the `uploadId` query parameter.
fn upload_id<'a>(query: &'a HashMap<String, String>) -> Result<&'a str, S3Error> {
    query
        .get("uploadId")
        .map(|s| s.as_str())
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing uploadId parameter".to_string(),
        })
}

/// `POST /{bucket}/{key}?uploads` -- Initiate a multipart upload.
pub async fn create_multipart_upload(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }

    let upload_id = state.uploads.initiate(bucket, key).await;
    tracing::debug!(bucket, key, %upload_id, "multipart upload initiated");

    let body = xml::render_initiate_multipart_upload_result(bucket, key, &upload_id);
    Ok(xml_response(StatusCode::OK, body))
}

/// `PUT /{bucket}/{key}?partNumber={n}&uploadId={id}` -- UploadPart.
pub async fn upload_part(
    state: Arc<AppState>,
    query: &HashMap<String, String>,
    body: Bytes,
) -> Result<Response, S3Error> {
    let upload_id = upload_id(query)?;
    let part_number: u32 = query
        .get("partNumber")
        .and_then(|s| s.parse().ok())
        .filter(|n| *n >= 1)
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing or invalid partNumber parameter".to_string(),
        })?;

    if !state.uploads.contains(upload_id).await {
        return Err(S3Error::NoSuchUpload {
            upload_id: upload_id.to_string(),
        });
    }

    let part_etag = state.uploads.upload_part(upload_id, part_number, body).await?;

    Ok((
        StatusCode::OK,
        [(header::ETAG, HeaderValue::from_str(&part_etag).unwrap())],
    )
        .into_response())
}

/// `POST /{bucket}/{key}?uploadId={id}` -- CompleteMultipartUpload.
///
/// The registered parts are authoritative; the request body's part
/// manifest is not consulted.
pub async fn complete_multipart_upload(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    query: &HashMap<String, String>,
) -> Result<Response, S3Error> {
    let upload_id = upload_id(query)?;
    if !state.uploads.contains(upload_id).await {
        return Err(S3Error::NoSuchUpload {
            upload_id: upload_id.to_string(),
        });
    }

    let completed = state.uploads.complete(upload_id, bucket, key).await?;
    tracing::debug!(
        bucket,
        key,
        upload_id,
        size = completed.size,
        "multipart upload completed"
    );

    let body =
        xml::render_complete_multipart_upload_result(bucket, key, completed.size, &completed.etag);
    Ok(xml_response(StatusCode::OK, body))
}

/// `DELETE /{bucket}/{key}?uploadId={id}` -- AbortMultipartUpload.
pub async fn abort_multipart_upload(
    state: Arc<AppState>,
    query: &HashMap<String, String>,
) -> Result<Response, S3Error> {
    let upload_id = upload_id(query)?;
    state.uploads.abort(upload_id).await?;
    tracing::debug!(upload_id, "multipart upload aborted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
