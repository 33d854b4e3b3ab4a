//! Object-level S3 API handlers.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::errors::S3Error;
use crate::etag;
use crate::handlers::bucket::xml_response;
use crate::sigv4;
use crate::store::blob::{BlobStore, StoreError};
use crate::xml;
use crate::AppState;

/// `PUT /{bucket}/{key}` -- PutObject. Returns the ETag header.
pub async fn put_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
    body: Bytes,
) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }

    let object_etag = etag::object_etag(&body);
    state.store.put(bucket, key, body).await?;
    tracing::debug!(bucket, key, "object stored");

    Ok((
        StatusCode::OK,
        [
            (header::ETAG, HeaderValue::from_str(&object_etag).unwrap()),
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/xml"),
            ),
        ],
        String::new(),
    )
        .into_response())
}

/// `GET /{bucket}/{key}` -- GetObject.
pub async fn get_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, S3Error> {
    let data = match state.store.get(bucket, key).await {
        Ok(data) => data,
        Err(StoreError::BucketNotFound(_)) | Err(StoreError::ObjectNotFound(_)) => {
            return Err(S3Error::NoSuchKey {
                key: key.to_string(),
            })
        }
        Err(other) => return Err(other.into()),
    };
    let last_modified = state.store.last_modified(bucket, key).await?;
    let object_etag = etag::object_etag(&data);

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::ETAG, HeaderValue::from_str(&object_etag).unwrap()),
            (
                header::LAST_MODIFIED,
                HeaderValue::from_str(&httpdate::fmt_http_date(last_modified)).unwrap(),
            ),
        ],
        data,
    )
        .into_response())
}

/// `HEAD /{bucket}/{key}` -- HeadObject. Headers only, no body.
pub async fn head_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }
    if !state.store.object_exists(bucket, key).await? {
        return Err(S3Error::NoSuchKey {
            key: key.to_string(),
        });
    }

    let size = state.store.size(bucket, key).await?;
    let last_modified = state.store.last_modified(bucket, key).await?;
    // The ETag requires the content; HEAD reports it like GET would.
    let data = state.store.get(bucket, key).await?;
    let object_etag = etag::object_etag(&data);

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&size.to_string()).unwrap(),
            ),
            (header::ETAG, HeaderValue::from_str(&object_etag).unwrap()),
            (
                header::LAST_MODIFIED,
                HeaderValue::from_str(&httpdate::fmt_http_date(last_modified)).unwrap(),
            ),
        ],
    )
        .into_response())
}

/// `DELETE /{bucket}/{key}` -- DeleteObject.
pub async fn delete_object(
    state: Arc<AppState>,
    bucket: &str,
    key: &str,
) -> Result<Response, S3Error> {
    match state.store.delete(bucket, key).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(StoreError::BucketNotFound(_)) | Err(StoreError::ObjectNotFound(_)) => {
            Err(S3Error::NoSuchKey {
                key: key.to_string(),
            })
        }
        Err(other) => Err(other.into()),
    }
}

/// `PUT /{bucket}/{key}` with `x-amz-copy-source` -- CopyObject.
pub async fn copy_object(
    state: Arc<AppState>,
    dst_bucket: &str,
    dst_key: &str,
    headers: &HeaderMap,
) -> Result<Response, S3Error> {
    let copy_source = headers
        .get("x-amz-copy-source")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| S3Error::InvalidArgument {
            message: "Missing x-amz-copy-source header".to_string(),
        })?;

    // Source format: [/]srcBucket/srcKey, possibly percent-encoded.
    let source = sigv4::percent_decode(copy_source.trim_start_matches('/'));
    let (src_bucket, src_key) = source.split_once('/').ok_or(S3Error::InvalidArgument {
        message: format!("Invalid x-amz-copy-source: {copy_source}"),
    })?;

    if !state.store.object_exists(src_bucket, src_key).await? {
        return Err(S3Error::NoSuchKey {
            key: src_key.to_string(),
        });
    }
    if !state.store.bucket_exists(dst_bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: dst_bucket.to_string(),
        });
    }

    state
        .store
        .copy(src_bucket, src_key, dst_bucket, dst_key)
        .await?;
    tracing::debug!(src_bucket, src_key, dst_bucket, dst_key, "object copied");

    let data = state.store.get(dst_bucket, dst_key).await?;
    let last_modified = state.store.last_modified(dst_bucket, dst_key).await?;
    let body = xml::render_copy_object_result(
        &xml::format_timestamp(last_modified),
        &etag::object_etag(&data),
    );

    Ok(xml_response(StatusCode::OK, body))
}

/// `POST /{bucket}?delete` -- DeleteObjects batch delete.
///
/// The body is `<Delete><Object><Key>..</Key></Object>...</Delete>`;
/// a body that does not parse is a `MalformedXML` error.  Deleting an
/// absent key counts as deleted (the operation is idempotent).
pub async fn delete_objects(
    state: Arc<AppState>,
    bucket: &str,
    body: &[u8],
) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }

    let keys = xml::parse_delete_objects(body).map_err(|_| S3Error::MalformedXML)?;
    if keys.is_empty() {
        return Err(S3Error::MalformedXML);
    }

    let mut deleted: Vec<String> = Vec::new();
    let mut failed: Vec<(String, String)> = Vec::new();
    for key in keys {
        match state.store.delete(bucket, &key).await {
            Ok(()) | Err(StoreError::ObjectNotFound(_)) => deleted.push(key),
            Err(e) => failed.push((key, e.to_string())),
        }
    }

    let errors: Vec<xml::DeleteErrorEntry<'_>> = failed
        .iter()
        .map(|(key, message)| xml::DeleteErrorEntry {
            key,
            code: "InternalError",
            message,
        })
        .collect();

    let body = xml::render_delete_result(&deleted, &errors);
    Ok(xml_response(StatusCode::OK, body))
}
