//! Bucket listing: prefix/delimiter filtering, common-prefix grouping,
//! and V1/V2 pagination over a blob store's key listing.
//!
//! The continuation token (V2) / marker (V1) is an exclusive cursor:
//! the walk resumes at the first key strictly greater than it.  When
//! the walk stops because `max_keys` was consumed and keys remain, the
//! next token is the first unprocessed key, which pairs with the
//! exclusive-start rule to make resumption lossless.

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

use crate::store::blob::{BlobStore, StoreError};

/// Default `max-keys` when the client does not send one.
const DEFAULT_MAX_KEYS: u32 = 1000;

/// A parsed list-objects request.
#[derive(Debug, Clone)]
pub struct ListingRequest {
    /// Only keys starting with this prefix are considered.
    pub prefix: String,
    /// Delimiter for common-prefix grouping; empty disables grouping.
    pub delimiter: String,
    /// Upper bound on objects + distinct common prefixes returned.
    pub max_keys: u32,
    /// Exclusive resume cursor (`continuation-token` or `marker`).
    pub token: Option<String>,
    /// Whether this is a ListObjectsV2 request.
    pub is_v2: bool,
}

impl ListingRequest {
    /// Parse the request from decoded query parameters.
    ///
    /// V1 and V2 differ only in the cursor parameter name (`marker` vs
    /// `continuation-token`) and the `list-type=2` selector.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let is_v2 = query.get("list-type").is_some_and(|v| v == "2");
        let token = query
            .get(if is_v2 { "continuation-token" } else { "marker" })
            .cloned();
        let max_keys = query
            .get("max-keys")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_KEYS);
        Self {
            prefix: query.get("prefix").cloned().unwrap_or_default(),
            delimiter: query.get("delimiter").cloned().unwrap_or_default(),
            max_keys,
            token,
            is_v2,
        }
    }
}

/// One object row in a listing result.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: SystemTime,
}

/// Result of a list-objects walk. Recomputed per request; never stored.
#[derive(Debug)]
pub struct ListingResult {
    /// Matched objects in ascending key order.
    pub objects: Vec<ObjectSummary>,
    /// Distinct common prefixes, each counted once against `max_keys`.
    pub common_prefixes: Vec<String>,
    /// Cursor for the next page; `None` when the walk finished.
    pub next_token: Option<String>,
}

impl ListingResult {
    /// Whether more keys remain past this page.
    pub fn is_truncated(&self) -> bool {
        self.next_token.is_some()
    }

    /// Objects plus common prefixes (the V2 `KeyCount`).
    pub fn key_count(&self) -> u32 {
        (self.objects.len() + self.common_prefixes.len()) as u32
    }
}

/// List the objects of `bucket` according to `request`.
pub async fn list_bucket(
    store: &dyn BlobStore,
    bucket: &str,
    request: &ListingRequest,
) -> Result<ListingResult, StoreError> {
    let mut keys: Vec<_> = store
        .list_keys(bucket)
        .await?
        .into_iter()
        .filter(|e| !e.is_directory && e.path.starts_with(&request.prefix))
        .collect();
    keys.sort_by(|a, b| a.path.cmp(&b.path));

    // Exclusive start: resume at the first key strictly greater than
    // the cursor; no qualifying key means an empty page.
    let start = match &request.token {
        Some(token) => match keys.iter().position(|e| e.path.as_str() > token.as_str()) {
            Some(i) => i,
            None => {
                return Ok(ListingResult {
                    objects: Vec::new(),
                    common_prefixes: Vec::new(),
                    next_token: None,
                })
            }
        },
        None => 0,
    };

    let mut common: BTreeSet<String> = BTreeSet::new();
    let mut objects: Vec<ObjectSummary> = Vec::new();
    let mut count: u32 = 0;
    let mut next_token: Option<String> = None;

    let mut i = start;
    while i < keys.len() && count < request.max_keys {
        let entry = &keys[i];
        let key = &entry.path;

        let counted = if !request.delimiter.is_empty() {
            match key[request.prefix.len()..].find(&request.delimiter) {
                Some(pos) => {
                    // Collapse into the prefix up to and including the
                    // delimiter; only a distinct prefix consumes budget.
                    let end = request.prefix.len() + pos + request.delimiter.len();
                    common.insert(key[..end].to_string())
                }
                None => {
                    objects.push(ObjectSummary {
                        key: key.clone(),
                        size: entry.size,
                        last_modified: entry.last_modified,
                    });
                    true
                }
            }
        } else {
            objects.push(ObjectSummary {
                key: key.clone(),
                size: entry.size,
                last_modified: entry.last_modified,
            });
            true
        };

        if counted {
            count += 1;
            if count == request.max_keys && i + 1 < keys.len() {
                next_token = Some(keys[i + 1].path.clone());
            }
        }
        i += 1;
    }

    Ok(ListingResult {
        objects,
        common_prefixes: common.into_iter().collect(),
        next_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::blob::BlobStore;
    use crate::store::memory::MemoryBlobStore;
    use bytes::Bytes;

    async fn store_with_keys(keys: &[&str]) -> MemoryBlobStore {
        let store = MemoryBlobStore::new();
        store.create_bucket("b1").await.unwrap();
        for key in keys {
            store.put("b1", key, Bytes::from("x")).await.unwrap();
        }
        store
    }

    fn request(
        prefix: &str,
        delimiter: &str,
        max_keys: u32,
        token: Option<&str>,
    ) -> ListingRequest {
        ListingRequest {
            prefix: prefix.to_string(),
            delimiter: delimiter.to_string(),
            max_keys,
            token: token.map(|s| s.to_string()),
            is_v2: true,
        }
    }

    fn object_keys(result: &ListingResult) -> Vec<&str> {
        result.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[tokio::test]
    async fn test_pagination_exclusivity() {
        let store = store_with_keys(&["a", "b", "c", "d"]).await;

        let page1 = list_bucket(&store, "b1", &request("", "", 2, None))
            .await
            .unwrap();
        assert_eq!(object_keys(&page1), vec!["a", "b"]);
        assert_eq!(page1.next_token.as_deref(), Some("c"));
        assert!(page1.is_truncated());

        // The token is exclusive... resuming after "b" starts at "c".
        let page2 = list_bucket(&store, "b1", &request("", "", 2, page1.next_token.as_deref()))
            .await
            .unwrap();
        assert_eq!(object_keys(&page2), vec!["c", "d"]);
        assert_eq!(page2.next_token, None);
        assert!(!page2.is_truncated());
    }

    #[tokio::test]
    async fn test_token_is_exclusive_cursor() {
        let store = store_with_keys(&["a", "b", "c"]).await;
        // "b" itself is skipped: only keys strictly greater qualify.
        let result = list_bucket(&store, "b1", &request("", "", 10, Some("b")))
            .await
            .unwrap();
        assert_eq!(object_keys(&result), vec!["c"]);
    }

    #[tokio::test]
    async fn test_token_past_end_yields_empty() {
        let store = store_with_keys(&["a", "b"]).await;
        let result = list_bucket(&store, "b1", &request("", "", 10, Some("z")))
            .await
            .unwrap();
        assert!(result.objects.is_empty());
        assert!(result.common_prefixes.is_empty());
        assert!(!result.is_truncated());
    }

    #[tokio::test]
    async fn test_delimiter_grouping() {
        let store = store_with_keys(&["photos/1.jpg", "photos/2.jpg", "readme.txt"]).await;
        let result = list_bucket(&store, "b1", &request("", "/", 100, None))
            .await
            .unwrap();
        assert_eq!(result.common_prefixes, vec!["photos/"]);
        assert_eq!(object_keys(&result), vec!["readme.txt"]);
        assert_eq!(result.key_count(), 2);
    }

    #[tokio::test]
    async fn test_common_prefix_counts_once() {
        let store = store_with_keys(&[
            "logs/2026/01.log",
            "logs/2026/02.log",
            "logs/2026/03.log",
            "zzz",
        ])
        .await;
        // max_keys=2 with three keys collapsing into one prefix: both
        // the prefix and "zzz" fit in the page.
        let result = list_bucket(&store, "b1", &request("", "/", 2, None))
            .await
            .unwrap();
        assert_eq!(result.common_prefixes, vec!["logs/"]);
        assert_eq!(object_keys(&result), vec!["zzz"]);
        assert!(!result.is_truncated());
    }

    #[tokio::test]
    async fn test_prefix_filter_with_delimiter() {
        let store = store_with_keys(&[
            "photos/2025/a.jpg",
            "photos/2026/b.jpg",
            "photos/cover.jpg",
            "other.txt",
        ])
        .await;
        let result = list_bucket(&store, "b1", &request("photos/", "/", 100, None))
            .await
            .unwrap();
        // The delimiter search starts after the prefix.
        assert_eq!(
            result.common_prefixes,
            vec!["photos/2025/", "photos/2026/"]
        );
        assert_eq!(object_keys(&result), vec!["photos/cover.jpg"]);
    }

    #[tokio::test]
    async fn test_truncation_token_is_next_unprocessed_key() {
        let store = store_with_keys(&["a", "b", "c"]).await;
        let result = list_bucket(&store, "b1", &request("", "", 2, None))
            .await
            .unwrap();
        // Not the last processed key ("b") but the next one.
        assert_eq!(result.next_token.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_exact_fit_is_not_truncated() {
        let store = store_with_keys(&["a", "b"]).await;
        let result = list_bucket(&store, "b1", &request("", "", 2, None))
            .await
            .unwrap();
        assert_eq!(object_keys(&result), vec!["a", "b"]);
        assert!(!result.is_truncated());
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = MemoryBlobStore::new();
        assert!(matches!(
            list_bucket(&store, "nope", &request("", "", 10, None)).await,
            Err(StoreError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_request_from_query_v1_v2() {
        let mut query = HashMap::new();
        query.insert("marker".to_string(), "m".to_string());
        query.insert("prefix".to_string(), "p/".to_string());
        let v1 = ListingRequest::from_query(&query);
        assert!(!v1.is_v2);
        assert_eq!(v1.token.as_deref(), Some("m"));
        assert_eq!(v1.max_keys, DEFAULT_MAX_KEYS);

        query.insert("list-type".to_string(), "2".to_string());
        query.insert("continuation-token".to_string(), "t".to_string());
        query.insert("max-keys".to_string(), "7".to_string());
        let v2 = ListingRequest::from_query(&query);
        assert!(v2.is_v2);
        // V2 reads continuation-token, not marker.
        assert_eq!(v2.token.as_deref(), Some("t"));
        assert_eq!(v2.max_keys, 7);
        assert_eq!(v2.prefix, "p/");
    }
}
