// Trait seams for the extraction pipeline.
//
// SourceFetcher: one network round-trip per area query token.
// RecordParser: raw content to listing records, no I/O.
// ObjectStore: put/list against an S3-compatible bucket.
//
// Each is implemented by a production type (`fetchers`, `parser`, `storage`)
// and by a mock in `testing`, so the pipeline runs without network.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use rentscout_common::{Area, ListingRecord, ScoutError};

/// Content returned by a source for one area.
#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    /// Rendered page markdown (web-scraping API).
    Markdown(String),
    /// Structured API payload (Google Places).
    Json(Value),
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch raw content for a query token. Fails with `ScoutError::Fetch`
    /// on network/HTTP failures or an upstream error payload.
    async fn fetch(&self, query: &str) -> Result<RawContent, ScoutError>;

    fn name(&self) -> &str;
}

pub trait RecordParser: Send + Sync {
    /// Extract listings from one area's content. Malformed blocks are
    /// skipped with a warning; only wholly unparseable input is an error.
    fn parse(&self, content: &RawContent, area: &Area) -> Result<Vec<ListingRecord>, ScoutError>;
}

/// Per-object settings for [`ObjectStore::put`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    pub content_type: String,
    pub storage_class: String,
    pub encryption: String,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>, options: &PutOptions) -> Result<(), ScoutError>;

    /// All keys starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ScoutError>;

    /// Human-readable location of a key, e.g. `s3://bucket/key`.
    fn location(&self, key: &str) -> String;
}
