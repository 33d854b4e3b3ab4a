//! Bucket-level S3 API handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::errors::S3Error;
use crate::listing::{self, ListingRequest};
use crate::store::blob::BlobStore;
use crate::xml;
use crate::AppState;

/// `GET /` -- ListBuckets.
///
/// `owner` is the authenticated access key, reported as the bucket owner.
pub async fn list_buckets(state: Arc<AppState>, owner: &str) -> Result<Response, S3Error> {
    let buckets = state.store.list_buckets().await?;
    let rows: Vec<(String, String)> = buckets
        .into_iter()
        .map(|b| (b.path, xml::format_timestamp(b.last_modified)))
        .collect();

    let body = xml::render_list_buckets_result(owner, &rows);
    Ok(xml_response(StatusCode::OK, body))
}

/// `PUT /{bucket}` -- CreateBucket. 409 if the name is taken.
pub async fn create_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, S3Error> {
    state.store.create_bucket(bucket).await?;
    tracing::info!(bucket, "bucket created");
    Ok(xml_response(StatusCode::OK, String::new()))
}

/// `DELETE /{bucket}` -- DeleteBucket. Only empty buckets can go.
pub async fn delete_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, S3Error> {
    state.store.delete_bucket(bucket).await?;
    tracing::info!(bucket, "bucket deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `HEAD /{bucket}` -- existence probe.
pub async fn head_bucket(state: Arc<AppState>, bucket: &str) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }
    Ok(StatusCode::OK.into_response())
}

/// `GET /{bucket}` -- ListObjects (V1) / ListObjectsV2.
///
/// Query parameters: `prefix`, `delimiter`, `max-keys`,
/// `marker` | `continuation-token`, `list-type=2`.
pub async fn list_objects(
    state: Arc<AppState>,
    bucket: &str,
    query: &HashMap<String, String>,
) -> Result<Response, S3Error> {
    if !state.store.bucket_exists(bucket).await? {
        return Err(S3Error::NoSuchBucket {
            bucket: bucket.to_string(),
        });
    }

    let request = ListingRequest::from_query(query);
    let result = listing::list_bucket(state.store.as_ref(), bucket, &request).await?;

    let timestamps: Vec<String> = result
        .objects
        .iter()
        .map(|o| xml::format_timestamp(o.last_modified))
        .collect();
    let entries: Vec<xml::ObjectEntry<'_>> = result
        .objects
        .iter()
        .zip(timestamps.iter())
        .map(|(o, ts)| xml::ObjectEntry {
            key: &o.key,
            size: o.size,
            last_modified: ts,
        })
        .collect();

    let body = xml::render_list_objects_result(
        bucket,
        &request.prefix,
        &request.delimiter,
        request.max_keys,
        request.is_v2,
        if request.is_v2 {
            request.token.as_deref()
        } else {
            None
        },
        result.next_token.as_deref(),
        &entries,
        &result.common_prefixes,
    );

    Ok(xml_response(StatusCode::OK, body))
}

/// Build an `application/xml` response with the given status and body.
pub fn xml_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml"),
        )],
        body,
    )
        .into_response()
}
