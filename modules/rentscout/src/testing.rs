// Test mocks for the extraction pipeline.
//
// Three mocks matching the trait boundaries:
// - MockFetcher (SourceFetcher): HashMap-based query→content, scripted failures and latency
// - MockParser (RecordParser): JSON array of ListingRecord, no regexes
// - InMemoryObjectStore (ObjectStore): BTreeMap of uploaded objects
//
// Plus helpers for constructing areas, listings and tagged listings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use rentscout_common::{Area, ListingRecord, Priority, ScoutError, TaggedListing, Zone, slugify};

use crate::traits::{ObjectStore, PutOptions, RawContent, RecordParser, SourceFetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based fetcher. Returns `Err(Fetch)` for unregistered queries.
/// Builder pattern: `.on_query()`, `.on_markdown()`, `.fail_times()`, `.with_delay()`.
pub struct MockFetcher {
    responses: HashMap<String, RawContent>,
    failures: HashMap<String, u32>,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            failures: HashMap::new(),
            delays: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_query(mut self, query: &str, content: RawContent) -> Self {
        self.responses.insert(query.to_string(), content);
        self
    }

    pub fn on_markdown(self, query: &str, markdown: &str) -> Self {
        self.on_query(query, RawContent::Markdown(markdown.to_string()))
    }

    /// Fail the first `n` fetches of `query` before serving its content.
    pub fn fail_times(mut self, query: &str, n: u32) -> Self {
        self.failures.insert(query.to_string(), n);
        self
    }

    /// Sleep `delay` (tokio time) on every fetch of `query` before answering.
    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    pub fn call_count(&self, query: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(query)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
    async fn fetch(&self, query: &str) -> Result<RawContent, ScoutError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(query.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }

        if call <= self.failures.get(query).copied().unwrap_or(0) {
            return Err(ScoutError::Fetch(format!(
                "MockFetcher: scripted failure {call} for {query}"
            )));
        }

        self.responses
            .get(query)
            .cloned()
            .ok_or_else(|| ScoutError::Fetch(format!("MockFetcher: no response for {query}")))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

/// Parses `RawContent::Json` holding an array of `ListingRecord`.
/// Anything else is a whole-content parse error.
pub struct MockParser;

impl RecordParser for MockParser {
    fn parse(&self, content: &RawContent, _area: &Area) -> Result<Vec<ListingRecord>, ScoutError> {
        match content {
            RawContent::Json(value) => serde_json::from_value(value.clone())
                .map_err(|e| ScoutError::Parse(format!("MockParser: {e}"))),
            RawContent::Markdown(_) => Err(ScoutError::Parse(
                "MockParser: markdown is not supported".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub options: PutOptions,
}

/// In-memory object store. Puts to keys containing `fail_on` error out.
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    fail_on: Option<String>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            fail_on: None,
        }
    }

    /// Pre-populate keys, e.g. earlier versions under a prefix.
    pub fn with_keys(self, keys: &[&str]) -> Self {
        {
            let mut objects = self.objects.lock().unwrap();
            for key in keys {
                objects.insert(
                    key.to_string(),
                    StoredObject {
                        body: Vec::new(),
                        options: PutOptions::default(),
                    },
                );
            }
        }
        self
    }

    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, options: &PutOptions) -> Result<(), ScoutError> {
        if let Some(fragment) = &self.fail_on {
            if key.contains(fragment.as_str()) {
                return Err(ScoutError::Sink(format!("InMemoryObjectStore: put rejected for {key}")));
            }
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                options: options.clone(),
            },
        );
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ScoutError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// An area whose query token is its slug.
pub fn test_area(name: &str, zone: Zone, priority: Priority) -> Area {
    Area {
        name: name.to_string(),
        zone,
        priority,
        query_token: slugify(name),
    }
}

pub fn listing(title: &str, rent: f64, area_sqft: f64) -> ListingRecord {
    ListingRecord {
        title: title.to_string(),
        address: format!("{title}, Mumbai"),
        rent: Some(rent),
        area_sqft: Some(area_sqft),
        ..Default::default()
    }
}

/// Tag a record for `area` at a fixed timestamp.
pub fn tagged(record: ListingRecord, area: &Area) -> TaggedListing {
    let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
    TaggedListing::tag(record, area, at)
}

/// Shorthand for a tagged listing in a West high-priority area.
pub fn tagged_in(area_name: &str, title: &str, rent: f64, area_sqft: f64) -> TaggedListing {
    tagged(
        listing(title, rent, area_sqft),
        &test_area(area_name, Zone::West, Priority::High),
    )
}

pub fn json_listings(records: &[ListingRecord]) -> RawContent {
    RawContent::Json(serde_json::to_value(records).unwrap_or_default())
}
