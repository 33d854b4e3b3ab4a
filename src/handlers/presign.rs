//! Presigned-URL generation endpoint.
//!
//! `POST /?presigned-url` takes `method`, `path`, `accessKey`, and
//! `expiration` parameters (query string or urlencoded form body) and
//! responds with a ready-to-use presigned URL as plain text.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::parse_query_string;
use crate::errors::S3Error;
use crate::AppState;

/// `POST /?presigned-url` -- GeneratePresignedUrl.
pub async fn generate_presigned_url(
    state: Arc<AppState>,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, S3Error> {
    // Parameters may arrive as query parameters or as an urlencoded
    // form body; the body wins on duplicates.
    let mut params = query.clone();
    if let Ok(text) = std::str::from_utf8(body) {
        for (k, v) in parse_query_string(text) {
            params.insert(k, v);
        }
    }

    let method = require(&params, "method")?;
    let path = require(&params, "path")?;
    let access_key = require(&params, "accessKey")?;
    let expiration: u64 = require(&params, "expiration")?
        .parse()
        .map_err(|_| S3Error::InvalidArgument {
            message: "Invalid expiration value".to_string(),
        })?;

    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let url = state
        .authenticator
        .generate_presigned_url(method, path, access_key, expiration, host)
        .map_err(|message| S3Error::InvalidArgument { message })?;

    tracing::debug!(access_key, path, expiration, "presigned URL generated");

    Ok((
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain")],
        url,
    )
        .into_response())
}

fn require<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, S3Error> {
    params
        .get(name)
        .map(|s| s.as_str())
        .ok_or_else(|| S3Error::InvalidArgument {
            message: format!("Missing {name} parameter"),
        })
}
