//! Axum router construction and S3 route mapping.
//!
//! The [`app`] function wires every S3-compatible endpoint to its handler
//! and returns a ready-to-serve [`axum::Router`].
//!
//! S3 distinguishes operations by query parameters, not just path+method.
//! For example, `GET /:bucket` could be ListObjectsV2 (`?list-type=2`)
//! or ListObjectsV1 (default), and `POST /:bucket/:key` could be
//! CreateMultipartUpload (`?uploads`) or CompleteMultipartUpload
//! (`?uploadId=..`). We use a single handler per method+path that
//! dispatches internally based on query params.

use axum::{
    extract::{DefaultBodyLimit, Extension, Path, RawQuery, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, head, post, put},
    Router,
};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::auth::{self, AuthOutcome};
use crate::errors::{generate_request_id, S3Error};
use crate::metrics::{metrics_handler, metrics_middleware, record_auth_failure};
use crate::AppState;

/// The access key a request authenticated with, inserted into request
/// extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub String);

/// Build the axum [`Router`] with all S3-compatible routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Infrastructure endpoints (not part of the S3 API).
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Service-level routes.
        .route("/", get(handle_get_service))
        .route("/", post(handle_post_service))
        // Bucket-level routes.
        .route("/:bucket", get(handle_get_bucket))
        .route("/:bucket", put(handle_put_bucket))
        .route("/:bucket", delete(handle_delete_bucket))
        .route("/:bucket", head(handle_head_bucket))
        .route("/:bucket", post(handle_post_bucket))
        // Object-level routes (wildcard key captures slashes).
        .route("/:bucket/*key", get(handle_get_object))
        .route("/:bucket/*key", put(handle_put_object))
        .route("/:bucket/*key", delete(handle_delete_object))
        .route("/:bucket/*key", head(handle_head_object))
        .route("/:bucket/*key", post(handle_post_object))
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn_with_state(state, auth_middleware))
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        // OPTIONS preflight handling for browser uploads.
        .layer(CorsLayer::permissive())
        // Disable the default 2MB body size limit (S3 objects can be large).
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common S3 response headers to every response:
/// - `x-amz-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `PebbleStore`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Only set x-amz-request-id if not already present (the error
    // handler may have set it).
    if !headers.contains_key("x-amz-request-id") {
        let request_id = generate_request_id();
        headers.insert(
            "x-amz-request-id",
            HeaderValue::from_str(&request_id).unwrap(),
        );
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    headers.insert("date", HeaderValue::from_str(&date).unwrap());
    headers.insert("server", HeaderValue::from_static("PebbleStore"));

    response
}

// -- Auth middleware ---------------------------------------------------------

/// Paths that bypass authentication.
const AUTH_SKIP_PATHS: &[&str] = &["/health", "/metrics"];

/// SigV4 authentication middleware.
///
/// Runs before handlers. Detects auth type (header or presigned),
/// resolves the credential, and verifies the signature, stashing the
/// authenticated access key in request extensions.  Browser POST policy
/// uploads pass through: their policy signature is checked by the
/// handler instead.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, S3Error> {
    let path = req.uri().path().to_string();
    if AUTH_SKIP_PATHS.contains(&path.as_str()) {
        return Ok(next.run(req).await);
    }

    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if req.method() == Method::POST && content_type.starts_with("multipart/form-data") {
        return Ok(next.run(req).await);
    }

    let query = auth::parse_query_string(req.uri().query().unwrap_or(""));
    let header_map = headers_for_signing(req.headers());

    // Header-based auth without a declared payload hash signs over
    // SHA256(body): buffer the body and put it back for the handler.
    let needs_body = header_map.contains_key("authorization")
        && !header_map.contains_key("x-amz-content-sha256")
        && !auth::is_presigned(&query);
    let body_bytes = if needs_body {
        let (parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .unwrap_or_default();
        req = Request::from_parts(parts, axum::body::Body::from(bytes.clone()));
        bytes
    } else {
        Bytes::new()
    };

    let method = req.method().as_str().to_string();
    let outcome = state
        .authenticator
        .authenticate(&method, &path, &query, &header_map, &body_bytes);

    match outcome {
        AuthOutcome::Granted { access_key } => {
            debug!(%access_key, "auth ok");
            req.extensions_mut().insert(AuthenticatedKey(access_key));
            Ok(next.run(req).await)
        }
        AuthOutcome::Anonymous => {
            record_auth_failure("anonymous");
            Err(S3Error::AccessDenied {
                message: "No authentication information provided".to_string(),
            })
        }
        AuthOutcome::UnknownAccessKey => {
            record_auth_failure("unknown_key");
            Err(S3Error::InvalidAccessKeyId)
        }
        AuthOutcome::SignatureMismatch => {
            record_auth_failure("signature");
            debug!(%method, %path, "signature mismatch");
            Err(S3Error::SignatureDoesNotMatch)
        }
        AuthOutcome::Expired => {
            record_auth_failure("expired");
            Err(S3Error::AccessDenied {
                message: "Request has expired".to_string(),
            })
        }
        AuthOutcome::Malformed(message) => {
            record_auth_failure("malformed");
            warn!(%method, %path, %message, "malformed auth");
            Err(S3Error::AccessDenied { message })
        }
    }
}

/// Flatten an axum `HeaderMap` into lower-cased name/value pairs for
/// signing, joining repeated headers with commas.
fn headers_for_signing(header_map: &HeaderMap) -> BTreeMap<String, String> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in header_map.iter() {
        let name = name.as_str().to_lowercase();
        let value = value.to_str().unwrap_or("").to_string();
        grouped.entry(name).or_default().push(value);
    }
    grouped
        .into_iter()
        .map(|(name, values)| (name, values.join(",")))
        .collect()
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Query parameter parsing helper ------------------------------------------

/// Parse a raw query string into a HashMap for dispatching.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for (k, v) in auth::parse_query_string(&qs) {
            map.insert(k, v);
        }
    }
    map
}

// -- Service-level dispatch --------------------------------------------------

/// `GET /` -- ListBuckets.
async fn handle_get_service(
    State(state): State<Arc<AppState>>,
    authenticated: Option<Extension<AuthenticatedKey>>,
) -> Result<Response, S3Error> {
    let owner = authenticated
        .map(|Extension(AuthenticatedKey(key))| key)
        .unwrap_or_default();
    crate::handlers::bucket::list_buckets(state, &owner).await
}

/// `POST /` -- dispatches based on query params:
/// - `?presigned-url` -> GeneratePresignedUrl
async fn handle_post_service(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    let query = parse_query(raw_query);

    if query.contains_key("presigned-url") {
        crate::handlers::presign::generate_presigned_url(state, &query, &headers, &body).await
    } else {
        Err(S3Error::NotImplemented)
    }
}

// -- Bucket-level dispatch ---------------------------------------------------

/// `GET /:bucket` -- ListObjectsV1 or ListObjectsV2 (`?list-type=2`).
async fn handle_get_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, S3Error> {
    let query = parse_query(raw_query);
    crate::handlers::bucket::list_objects(state, &bucket, &query).await
}

/// `PUT /:bucket` -- CreateBucket.
async fn handle_put_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    crate::handlers::bucket::create_bucket(state, &bucket).await
}

/// `DELETE /:bucket` -- DeleteBucket.
async fn handle_delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    crate::handlers::bucket::delete_bucket(state, &bucket).await
}

/// `HEAD /:bucket` -- HeadBucket.
async fn handle_head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    crate::handlers::bucket::head_bucket(state, &bucket).await
}

/// `POST /:bucket` -- dispatches based on query params and content type:
/// - `multipart/form-data` -> browser-style policy upload
/// - `?delete` -> DeleteObjects (batch delete)
async fn handle_post_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    let query = parse_query(raw_query);

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("multipart/form-data") {
        crate::handlers::post_upload::post_upload(state, &bucket, &headers, &body).await
    } else if query.contains_key("delete") {
        crate::handlers::object::delete_objects(state, &bucket, &body).await
    } else {
        Err(S3Error::NotImplemented)
    }
}

// -- Object-level dispatch ---------------------------------------------------

/// `GET /:bucket/*key` -- GetObject.
async fn handle_get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    crate::handlers::object::get_object(state, &bucket, &key).await
}

/// `PUT /:bucket/*key` -- dispatches based on query params and headers:
/// - `?partNumber=...&uploadId=...` -> UploadPart
/// - `x-amz-copy-source` header -> CopyObject
/// - default -> PutObject
async fn handle_put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, S3Error> {
    let query = parse_query(raw_query);

    if query.contains_key("partNumber") && query.contains_key("uploadId") {
        crate::handlers::multipart::upload_part(state, &query, body).await
    } else if headers.contains_key("x-amz-copy-source") {
        crate::handlers::object::copy_object(state, &bucket, &key, &headers).await
    } else {
        crate::handlers::object::put_object(state, &bucket, &key, body).await
    }
}

/// `DELETE /:bucket/*key` -- dispatches based on query params:
/// - `?uploadId=...` -> AbortMultipartUpload
/// - default -> DeleteObject
async fn handle_delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, S3Error> {
    let query = parse_query(raw_query);

    if query.contains_key("uploadId") {
        crate::handlers::multipart::abort_multipart_upload(state, &query).await
    } else {
        crate::handlers::object::delete_object(state, &bucket, &key).await
    }
}

/// `HEAD /:bucket/*key` -- HeadObject.
async fn handle_head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, S3Error> {
    crate::handlers::object::head_object(state, &bucket, &key).await
}

/// `POST /:bucket/*key` -- dispatches based on query params:
/// - `?uploads` -> CreateMultipartUpload
/// - `?uploadId=...` -> CompleteMultipartUpload
async fn handle_post_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, S3Error> {
    let query = parse_query(raw_query);

    if query.contains_key("uploads") {
        crate::handlers::multipart::create_multipart_upload(state, &bucket, &key).await
    } else if query.contains_key("uploadId") {
        crate::handlers::multipart::complete_multipart_upload(state, &bucket, &key, &query).await
    } else {
        Err(S3Error::MethodNotAllowed)
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialStore, Credentials};
    use crate::config::Config;
    use crate::etag;
    use crate::sigv4;
    use crate::store::memory::MemoryBlobStore;
    use axum::body::Body;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use tower::util::ServiceExt;

    const ACCESS_KEY: &str = "testkey";
    const SECRET_KEY: &str = "testsecret";
    const REGION: &str = "us-east-1";
    const AMZ_DATE: &str = "20260222T120000Z";

    fn test_app() -> Router {
        let store = Arc::new(MemoryBlobStore::new());
        let credentials = Arc::new(CredentialStore::new([Credentials {
            access_key: ACCESS_KEY.to_string(),
            secret_key: SECRET_KEY.to_string(),
            region: REGION.to_string(),
        }]));
        let state = Arc::new(crate::AppState::new(Config::default(), store, credentials));
        app(state)
    }

    /// Build a SigV4-signed request with an unsigned payload.
    fn signed_request(method: &str, uri: &str, body: &[u8]) -> Request<Body> {
        let (path, query_string) = uri.split_once('?').unwrap_or((uri, ""));
        let query = auth::parse_query_string(query_string);

        let mut signing_headers = BTreeMap::new();
        signing_headers.insert("host".to_string(), "localhost".to_string());
        signing_headers.insert("x-amz-date".to_string(), AMZ_DATE.to_string());
        signing_headers.insert(
            "x-amz-content-sha256".to_string(),
            sigv4::UNSIGNED_PAYLOAD.to_string(),
        );

        let canonical = sigv4::canonical_request(
            method,
            path,
            &query,
            &signing_headers,
            sigv4::UNSIGNED_PAYLOAD,
        );
        let sts = sigv4::string_to_sign(AMZ_DATE, &AMZ_DATE[..8], REGION, &canonical);
        let key = sigv4::derive_signing_key(SECRET_KEY, &AMZ_DATE[..8], REGION, "s3");
        let signature = sigv4::sign(&key, &sts);

        Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "localhost")
            .header("x-amz-date", AMZ_DATE)
            .header("x-amz-content-sha256", sigv4::UNSIGNED_PAYLOAD)
            .header(
                "authorization",
                format!(
                    "AWS4-HMAC-SHA256 Credential={ACCESS_KEY}/{}/{REGION}/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={signature}",
                    &AMZ_DATE[..8]
                ),
            )
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn extract_tag(xml: &str, tag: &str) -> Option<String> {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        let start = xml.find(&open)? + open.len();
        let end = xml[start..].find(&close)? + start;
        Some(xml[start..end].to_string())
    }

    #[tokio::test]
    async fn test_end_to_end_put_get_delete() {
        let app = test_app();
        let expected_etag = etag::object_etag(b"hello");

        // Create the bucket.
        let res = app
            .clone()
            .oneshot(signed_request("PUT", "/bucket1", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        // Put an object; the response carries the Base64-MD5 ETag.
        let res = app
            .clone()
            .oneshot(signed_request("PUT", "/bucket1/file.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("etag").unwrap().to_str().unwrap(),
            expected_etag
        );

        // Get it back.
        let res = app
            .clone()
            .oneshot(signed_request("GET", "/bucket1/file.txt", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("etag").unwrap().to_str().unwrap(),
            expected_etag
        );
        assert_eq!(body_string(res).await, "hello");

        // Delete, then a further GET is NoSuchKey.
        let res = app
            .clone()
            .oneshot(signed_request("DELETE", "/bucket1/file.txt", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/bucket1/file.txt", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = body_string(res).await;
        assert!(body.contains("<Code>NoSuchKey</Code>"));
    }

    #[tokio::test]
    async fn test_unauthenticated_request_denied() {
        let app = test_app();
        let req = Request::builder()
            .method("GET")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = body_string(res).await;
        assert!(body.contains("<Code>AccessDenied</Code>"));
    }

    #[tokio::test]
    async fn test_bad_signature_denied() {
        let app = test_app();
        let mut req = signed_request("GET", "/", b"");
        req.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!(
                "AWS4-HMAC-SHA256 Credential={ACCESS_KEY}/20260222/{REGION}/s3/aws4_request, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={}",
                "0".repeat(64)
            ))
            .unwrap(),
        );
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = body_string(res).await;
        assert!(body.contains("SignatureDoesNotMatch"));
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let app = test_app();
        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bucket_conflicts() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();

        // Duplicate create: 409.
        let res = app
            .clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);

        // Non-empty delete: 409.
        app.clone()
            .oneshot(signed_request("PUT", "/b1/k", b"x"))
            .await
            .unwrap();
        let res = app
            .clone()
            .oneshot(signed_request("DELETE", "/b1", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let body = body_string(res).await;
        assert!(body.contains("BucketNotEmpty"));
    }

    #[tokio::test]
    async fn test_list_buckets() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/alpha", b""))
            .await
            .unwrap();
        app.clone()
            .oneshot(signed_request("PUT", "/beta", b""))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.contains("<Name>alpha</Name>"));
        assert!(body.contains("<Name>beta</Name>"));
        assert!(body.contains(&format!("<ID>{ACCESS_KEY}</ID>")));
    }

    #[tokio::test]
    async fn test_multipart_flow_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();

        // Initiate.
        let res = app
            .clone()
            .oneshot(signed_request("POST", "/b1/big.bin?uploads", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        let upload_id = extract_tag(&body, "UploadId").unwrap();

        // Upload parts out of order.
        for (n, data) in [(2u32, &b"world"[..]), (1u32, &b"hello "[..])] {
            let uri = format!("/b1/big.bin?partNumber={n}&uploadId={upload_id}");
            let res = app
                .clone()
                .oneshot(signed_request("PUT", &uri, data))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().contains_key("etag"));
        }

        // Complete; parts assemble in part-number order.
        let uri = format!("/b1/big.bin?uploadId={upload_id}");
        let res = app
            .clone()
            .oneshot(signed_request("POST", &uri, b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        let composite = extract_tag(&body, "ETag").unwrap();
        assert!(composite.contains("-2"));
        assert_eq!(extract_tag(&body, "Size").unwrap(), "11");

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/b1/big.bin", b""))
            .await
            .unwrap();
        assert_eq!(body_string(res).await, "hello world");

        // The upload is gone: completing again is NoSuchUpload.
        let res = app
            .clone()
            .oneshot(signed_request("POST", &uri, b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body_string(res).await.contains("NoSuchUpload"));
    }

    #[tokio::test]
    async fn test_multipart_unknown_upload() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(signed_request(
                "PUT",
                "/b1/k?partNumber=1&uploadId=bogus",
                b"data",
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body_string(res).await.contains("NoSuchUpload"));
    }

    #[tokio::test]
    async fn test_abort_multipart_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        let res = app
            .clone()
            .oneshot(signed_request("POST", "/b1/k?uploads", b""))
            .await
            .unwrap();
        let upload_id = extract_tag(&body_string(res).await, "UploadId").unwrap();

        let uri = format!("/b1/k?uploadId={upload_id}");
        let res = app
            .clone()
            .oneshot(signed_request("DELETE", &uri, b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        // Already aborted.
        let res = app
            .clone()
            .oneshot(signed_request("DELETE", &uri, b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_listing_pagination_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        for key in ["a", "b", "c", "d"] {
            app.clone()
                .oneshot(signed_request("PUT", &format!("/b1/{key}"), b"x"))
                .await
                .unwrap();
        }

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/b1?list-type=2&max-keys=2", b""))
            .await
            .unwrap();
        let body = body_string(res).await;
        assert!(body.contains("<ListBucketV2Result"));
        assert!(body.contains("<Key>a</Key>"));
        assert!(body.contains("<Key>b</Key>"));
        assert!(!body.contains("<Key>c</Key>"));
        assert!(body.contains("<IsTruncated>true</IsTruncated>"));
        assert_eq!(extract_tag(&body, "NextContinuationToken").unwrap(), "c");
        assert_eq!(extract_tag(&body, "KeyCount").unwrap(), "2");

        let res = app
            .clone()
            .oneshot(signed_request(
                "GET",
                "/b1?list-type=2&max-keys=2&continuation-token=c",
                b"",
            ))
            .await
            .unwrap();
        let body = body_string(res).await;
        assert!(body.contains("<Key>c</Key>"));
        assert!(body.contains("<Key>d</Key>"));
        assert!(body.contains("<IsTruncated>false</IsTruncated>"));
    }

    #[tokio::test]
    async fn test_listing_delimiter_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        for key in ["photos/1.jpg", "photos/2.jpg", "readme.txt"] {
            app.clone()
                .oneshot(signed_request("PUT", &format!("/b1/{key}"), b"x"))
                .await
                .unwrap();
        }

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/b1?delimiter=/", b""))
            .await
            .unwrap();
        let body = body_string(res).await;
        assert!(body.contains("<ListBucketResult"));
        assert!(body.contains("<CommonPrefixes><Prefix>photos/</Prefix></CommonPrefixes>"));
        assert!(body.contains("<Key>readme.txt</Key>"));
        assert!(!body.contains("<Key>photos/1.jpg</Key>"));
    }

    #[tokio::test]
    async fn test_copy_object_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/src", b""))
            .await
            .unwrap();
        app.clone()
            .oneshot(signed_request("PUT", "/dst", b""))
            .await
            .unwrap();
        app.clone()
            .oneshot(signed_request("PUT", "/src/orig.txt", b"payload"))
            .await
            .unwrap();

        let mut req = signed_request("PUT", "/dst/copy.txt", b"");
        req.headers_mut().insert(
            "x-amz-copy-source",
            HeaderValue::from_static("/src/orig.txt"),
        );
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_string(res).await;
        assert!(body.contains("<CopyObjectResult>"));
        assert!(body.contains("<ETag>"));

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/dst/copy.txt", b""))
            .await
            .unwrap();
        assert_eq!(body_string(res).await, "payload");
    }

    #[tokio::test]
    async fn test_batch_delete_over_http() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        for key in ["x", "y"] {
            app.clone()
                .oneshot(signed_request("PUT", &format!("/b1/{key}"), b"1"))
                .await
                .unwrap();
        }

        let body = b"<Delete><Object><Key>x</Key></Object><Object><Key>y</Key></Object></Delete>";
        let res = app
            .clone()
            .oneshot(signed_request("POST", "/b1?delete", body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let text = body_string(res).await;
        assert!(text.contains("<Deleted><Key>x</Key></Deleted>"));
        assert!(text.contains("<Deleted><Key>y</Key></Deleted>"));

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/b1/x", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_batch_delete_malformed_xml() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        let res = app
            .clone()
            .oneshot(signed_request("POST", "/b1?delete", b"this is not xml"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(res).await.contains("MalformedXML"));
    }

    #[tokio::test]
    async fn test_presigned_url_generation_and_use() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        app.clone()
            .oneshot(signed_request("PUT", "/b1/file.txt", b"presigned!"))
            .await
            .unwrap();

        // Ask the server for a presigned GET URL.
        let uri = format!(
            "/?presigned-url&method=GET&path=/b1/file.txt&accessKey={ACCESS_KEY}&expiration=3600"
        );
        let res = app
            .clone()
            .oneshot(signed_request("POST", &uri, b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let url = body_string(res).await;
        assert!(url.contains("X-Amz-Signature="));

        // Use it with no Authorization header at all.
        let req = Request::builder()
            .method("GET")
            .uri(url)
            .header("host", "localhost")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_string(res).await, "presigned!");
    }

    #[tokio::test]
    async fn test_post_policy_upload() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();

        let policy_b64 = BASE64.encode(r#"{"conditions":[{"bucket":"b1"}]}"#);
        let key = sigv4::derive_signing_key(SECRET_KEY, &AMZ_DATE[..8], REGION, "s3");
        let signature = sigv4::sign(&key, &policy_b64);
        let credential = format!("{ACCESS_KEY}/{}/{REGION}/s3/aws4_request", &AMZ_DATE[..8]);

        let boundary = "FORMBOUNDARY";
        let mut body = Vec::new();
        for (name, value) in [
            ("policy", policy_b64.as_str()),
            ("x-amz-signature", signature.as_str()),
            ("x-amz-credential", credential.as_str()),
            ("x-amz-date", AMZ_DATE),
            ("key", "uploaded.txt"),
        ] {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"ignored.txt\"\r\n\r\nform content\r\n--{boundary}--\r\n"
            )
            .as_bytes(),
        );

        let req = Request::builder()
            .method("POST")
            .uri("/b1")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let text = body_string(res).await;
        assert!(text.contains("<PostResponse>"));
        assert!(text.contains("<Key>uploaded.txt</Key>"));

        let res = app
            .clone()
            .oneshot(signed_request("GET", "/b1/uploaded.txt", b""))
            .await
            .unwrap();
        assert_eq!(body_string(res).await, "form content");
    }

    #[tokio::test]
    async fn test_post_policy_upload_bad_signature() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();

        let policy_b64 = BASE64.encode(r#"{"conditions":[{"bucket":"b1"}]}"#);
        let credential = format!("{ACCESS_KEY}/{}/{REGION}/s3/aws4_request", &AMZ_DATE[..8]);
        let boundary = "FORMBOUNDARY";
        let mut body = Vec::new();
        for (name, value) in [
            ("policy", policy_b64.as_str()),
            ("x-amz-signature", "deadbeef"),
            ("x-amz-credential", credential.as_str()),
        ] {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let req = Request::builder()
            .method("POST")
            .uri("/b1")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_head_bucket_and_object() {
        let app = test_app();
        app.clone()
            .oneshot(signed_request("PUT", "/b1", b""))
            .await
            .unwrap();
        app.clone()
            .oneshot(signed_request("PUT", "/b1/k", b"abc"))
            .await
            .unwrap();

        let res = app
            .clone()
            .oneshot(signed_request("HEAD", "/b1", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let res = app
            .clone()
            .oneshot(signed_request("HEAD", "/b1/k", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-length").unwrap().to_str().unwrap(),
            "3"
        );
        assert!(res.headers().contains_key("etag"));
        assert!(res.headers().contains_key("last-modified"));

        let res = app
            .clone()
            .oneshot(signed_request("HEAD", "/missing", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_common_headers_present() {
        let app = test_app();
        let res = app
            .clone()
            .oneshot(signed_request("GET", "/", b""))
            .await
            .unwrap();
        assert!(res.headers().contains_key("x-amz-request-id"));
        assert_eq!(res.headers().get("server").unwrap(), "PebbleStore");
        assert!(res.headers().contains_key("date"));
    }
}
