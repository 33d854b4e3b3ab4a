//! S3 XML bodies.
//!
//! All S3 API responses are XML-encoded.  This module renders the
//! response documents with `quick-xml` and parses the one request body
//! the server accepts in XML form (batch delete).

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use quick_xml::Writer;
use std::io::Cursor;
use std::time::SystemTime;

/// Render a `SystemTime` as the ISO-8601 format used in S3 XML bodies
/// (e.g. `2026-02-22T12:00:00.000Z`).
pub fn format_timestamp(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ── Error response ──────────────────────────────────────────────────

/// Render an S3 `<Error>` XML document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>NoSuchBucket</Code>
///   <Message>The specified bucket does not exist</Message>
///   <Resource>/mybucket</Resource>
///   <RequestId>abcd-1234</RequestId>
/// </Error>
/// ```
pub fn render_error(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    let mut writer = start_document();

    write_simple_element_group(
        &mut writer,
        "Error",
        &[
            ("Code", code),
            ("Message", message),
            ("Resource", resource),
            ("RequestId", request_id),
        ],
    );

    finish(writer)
}

// ── ListAllMyBucketsResult ──────────────────────────────────────────

/// Render the `<ListAllMyBucketsResult>` response for `GET /`.
///
/// `buckets` is a list of `(name, creation_date)` pairs.
pub fn render_list_buckets_result(owner: &str, buckets: &[(String, String)]) -> String {
    let mut writer = start_document();

    let root = BytesStart::new("ListAllMyBucketsResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_simple_element_group(
        &mut writer,
        "Owner",
        &[("ID", owner), ("DisplayName", owner)],
    );

    writer
        .write_event(Event::Start(BytesStart::new("Buckets")))
        .expect("start Buckets");
    for (name, date) in buckets {
        write_simple_element_group(
            &mut writer,
            "Bucket",
            &[("Name", name), ("CreationDate", date)],
        );
    }
    writer
        .write_event(Event::End(BytesEnd::new("Buckets")))
        .expect("end Buckets");

    writer
        .write_event(Event::End(BytesEnd::new("ListAllMyBucketsResult")))
        .expect("end root");

    finish(writer)
}

// ── ListBucketResult / ListBucketV2Result ───────────────────────────

/// One `<Contents>` row in a list-objects response.
pub struct ObjectEntry<'a> {
    pub key: &'a str,
    pub size: u64,
    pub last_modified: &'a str,
}

/// Render the list-objects response for V1 (`ListBucketResult`) or V2
/// (`ListBucketV2Result`).
///
/// V2 additionally reports `KeyCount` and echoes the continuation token
/// the page was requested with; V1 reports `NextMarker` instead of
/// `NextContinuationToken` when truncated.
#[allow(clippy::too_many_arguments)]
pub fn render_list_objects_result(
    bucket: &str,
    prefix: &str,
    delimiter: &str,
    max_keys: u32,
    is_v2: bool,
    continuation_token: Option<&str>,
    next_token: Option<&str>,
    entries: &[ObjectEntry<'_>],
    common_prefixes: &[String],
) -> String {
    let mut writer = start_document();

    let root_name = if is_v2 {
        "ListBucketV2Result"
    } else {
        "ListBucketResult"
    };
    let root = BytesStart::new(root_name)
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Name", bucket);
    write_text_element(&mut writer, "Prefix", prefix);
    if !delimiter.is_empty() {
        write_text_element(&mut writer, "Delimiter", delimiter);
    }
    write_text_element(&mut writer, "MaxKeys", &max_keys.to_string());

    if is_v2 {
        let key_count = entries.len() + common_prefixes.len();
        write_text_element(&mut writer, "KeyCount", &key_count.to_string());
        if let Some(token) = continuation_token {
            write_text_element(&mut writer, "ContinuationToken", token);
        }
    }

    write_text_element(
        &mut writer,
        "IsTruncated",
        if next_token.is_some() { "true" } else { "false" },
    );
    if let Some(token) = next_token {
        let tag = if is_v2 {
            "NextContinuationToken"
        } else {
            "NextMarker"
        };
        write_text_element(&mut writer, tag, token);
    }

    for cp in common_prefixes {
        writer
            .write_event(Event::Start(BytesStart::new("CommonPrefixes")))
            .expect("start CommonPrefixes");
        write_text_element(&mut writer, "Prefix", cp);
        writer
            .write_event(Event::End(BytesEnd::new("CommonPrefixes")))
            .expect("end CommonPrefixes");
    }

    for entry in entries {
        write_simple_element_group(
            &mut writer,
            "Contents",
            &[
                ("Key", entry.key),
                ("Size", &entry.size.to_string()),
                ("LastModified", entry.last_modified),
            ],
        );
    }

    writer
        .write_event(Event::End(BytesEnd::new(root_name)))
        .expect("end root");

    finish(writer)
}

// ── CopyObjectResult ────────────────────────────────────────────────

/// Render `<CopyObjectResult>` returned by `PUT` with `x-amz-copy-source`.
pub fn render_copy_object_result(last_modified: &str, etag: &str) -> String {
    let mut writer = start_document();
    write_simple_element_group(
        &mut writer,
        "CopyObjectResult",
        &[("LastModified", last_modified), ("ETag", etag)],
    );
    finish(writer)
}

// ── Multipart results ───────────────────────────────────────────────

/// Render `<InitiateMultipartUploadResult>`.
pub fn render_initiate_multipart_upload_result(bucket: &str, key: &str, upload_id: &str) -> String {
    let mut writer = start_document();
    write_simple_element_group(
        &mut writer,
        "InitiateMultipartUploadResult",
        &[("Bucket", bucket), ("Key", key), ("UploadId", upload_id)],
    );
    finish(writer)
}

/// Render `<CompleteMultipartUploadResult>`.
pub fn render_complete_multipart_upload_result(
    bucket: &str,
    key: &str,
    size: u64,
    etag: &str,
) -> String {
    let mut writer = start_document();
    write_simple_element_group(
        &mut writer,
        "CompleteMultipartUploadResult",
        &[
            ("Location", &format!("/{bucket}/{key}")),
            ("Bucket", bucket),
            ("Key", key),
            ("Size", &size.to_string()),
            ("ETag", etag),
        ],
    );
    finish(writer)
}

// ── PostResponse (browser form upload) ──────────────────────────────

/// Render `<PostResponse>` for a browser-style policy upload.
pub fn render_post_upload_result(bucket: &str, key: &str, etag: &str) -> String {
    let mut writer = start_document();
    write_simple_element_group(
        &mut writer,
        "PostResponse",
        &[
            (
                "Location",
                &format!("https://{bucket}.s3.amazonaws.com/{key}"),
            ),
            ("Bucket", bucket),
            ("Key", key),
            ("ETag", etag),
        ],
    );
    finish(writer)
}

// ── DeleteResult ────────────────────────────────────────────────────

/// A per-key failure in a batch delete response.
pub struct DeleteErrorEntry<'a> {
    pub key: &'a str,
    pub code: &'a str,
    pub message: &'a str,
}

/// Render `<DeleteResult>` for batch DeleteObjects.
pub fn render_delete_result(deleted: &[String], errors: &[DeleteErrorEntry<'_>]) -> String {
    let mut writer = start_document();

    let root = BytesStart::new("DeleteResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    for key in deleted {
        writer
            .write_event(Event::Start(BytesStart::new("Deleted")))
            .expect("start Deleted");
        write_text_element(&mut writer, "Key", key);
        writer
            .write_event(Event::End(BytesEnd::new("Deleted")))
            .expect("end Deleted");
    }

    for entry in errors {
        write_simple_element_group(
            &mut writer,
            "Error",
            &[
                ("Key", entry.key),
                ("Code", entry.code),
                ("Message", entry.message),
            ],
        );
    }

    writer
        .write_event(Event::End(BytesEnd::new("DeleteResult")))
        .expect("end root");

    finish(writer)
}

/// Parse a batch-delete request body, returning the listed keys.
///
/// ```xml
/// <Delete><Object><Key>a.txt</Key></Object>...</Delete>
/// ```
pub fn parse_delete_objects(body: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);

    let mut keys = Vec::new();
    let mut in_object = false;
    let mut in_key = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"Object" => in_object = true,
                b"Key" if in_object => in_key = true,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"Object" => in_object = false,
                b"Key" => in_key = false,
                _ => {}
            },
            Event::Text(t) if in_key => {
                keys.push(t.unescape()?.into_owned());
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(keys)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn start_document() -> Writer<Cursor<Vec<u8>>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("xml decl");
    writer
}

fn finish(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

/// Write a `<tag>text</tag>` element.
fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .expect("start tag");
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .expect("text");
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .expect("end tag");
}

/// Write a parent element containing a flat list of child text elements.
fn write_simple_element_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    parent: &str,
    children: &[(&str, &str)],
) {
    writer
        .write_event(Event::Start(BytesStart::new(parent)))
        .expect("start parent");
    for (tag, value) in children {
        write_text_element(writer, tag, value);
    }
    writer
        .write_event(Event::End(BytesEnd::new(parent)))
        .expect("end parent");
}
