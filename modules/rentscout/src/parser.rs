//! Listing extraction from raw source content.
//!
//! `MarkdownListingParser` handles rendered listing pages: each listing card
//! starts at a markdown heading and runs until the next one. `PlacesParser`
//! maps Google Places search results.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use rentscout_common::{Area, ListingRecord, ScoutError};

use crate::traits::{RawContent, RecordParser};

/// Minimum heading length for a block to count as a listing title.
const MIN_TITLE_CHARS: usize = 6;

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,4}\s+(.+?)\s*#*$").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\(([^)\s]+)[^)]*\)").expect("valid regex"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\((https?://[^)\s]+)[^)]*\)").expect("valid regex")
});
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:₹|\brs\.?|\binr)\s*([\d,]+(?:\.\d+)?)\s*(lacs?|lakhs?|l|cr|crores?|k)?\b")
        .expect("valid regex")
});
static AREA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d,]+(?:\.\d+)?)\s*(?:sq\.?\s*ft|sqft|sq\.?\s*feet|square\s+feet)")
        .expect("valid regex")
});
static BHK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+(?:\.5)?)\s*(bhk|rk)\b").expect("valid regex"));
static FURNISHING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(semi[-\s]?furnished|unfurnished|fully[-\s]furnished|furnished)\b")
        .expect("valid regex")
});
static PROPERTY_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(apartment|flat|independent house|villa|builder floor|studio|penthouse|pg|hostel)\b",
    )
    .expect("valid regex")
});
static LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\W*(owner|posted by|agent|dealer|address|location|locality)\s*[:\-–]\s*(.+)$")
        .expect("valid regex")
});
static TITLE_LOCALITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+([^|]+?)\s*$").expect("valid regex"));
static TRAILING_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[-/=])(\d{5,})(?:[/?#&]|$)").expect("valid regex"));

/// What an amount on a card is for, judged by the label right before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmountKind {
    Rent,
    Deposit,
    Maintenance,
}

impl AmountKind {
    fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.contains("deposit") {
            AmountKind::Deposit
        } else if label.contains("maintenance") {
            AmountKind::Maintenance
        } else {
            AmountKind::Rent
        }
    }
}

pub struct MarkdownListingParser;

impl MarkdownListingParser {
    /// Split markdown into (heading, body-lines) blocks. Text before the first
    /// heading is page chrome and is dropped.
    fn blocks(markdown: &str) -> Vec<(&str, Vec<&str>)> {
        let mut blocks: Vec<(&str, Vec<&str>)> = Vec::new();
        for line in markdown.lines() {
            let trimmed = line.trim();
            if let Some(cap) = HEADING.captures(trimmed) {
                let heading = cap.get(1).map_or("", |m| m.as_str());
                blocks.push((heading, Vec::new()));
            } else if let Some((_, body)) = blocks.last_mut() {
                if !trimmed.is_empty() {
                    body.push(trimmed);
                }
            }
        }
        blocks
    }

    fn parse_block(heading: &str, body: &[&str]) -> Option<ListingRecord> {
        let (title, url) = match LINK.captures(heading) {
            Some(cap) => (cap[1].trim().to_string(), Some(cap[2].to_string())),
            None => (heading.trim().to_string(), None),
        };
        if title.chars().count() < MIN_TITLE_CHARS {
            return None;
        }

        let mut record = ListingRecord {
            title: title.clone(),
            url,
            ..Default::default()
        };
        let mut address: Option<String> = None;

        let all_lines = std::iter::once(heading).chain(body.iter().copied());
        for line in all_lines {
            for cap in IMAGE.captures_iter(line) {
                record.images.push(cap[1].to_string());
            }
            let text = IMAGE.replace_all(line, "");

            if let Some(cap) = LABELLED.captures(&text) {
                let value = cap[2].trim().to_string();
                match cap[1].to_ascii_lowercase().as_str() {
                    "owner" | "posted by" | "agent" | "dealer" => {
                        record.owner.get_or_insert(value);
                    }
                    _ => {
                        address.get_or_insert(value);
                    }
                }
                continue;
            }

            // "Rent: ₹45,000 | Deposit: ₹90,000": each amount takes the label since the last one.
            let mut label_start = 0;
            for cap in AMOUNT.captures_iter(&text) {
                let Some(whole) = cap.get(0) else { continue };
                let kind = AmountKind::from_label(&text[label_start..whole.start()]);
                label_start = whole.end();
                let Some(amount) = parse_amount(&cap) else { continue };
                match kind {
                    AmountKind::Deposit => {
                        record.deposit.get_or_insert(amount);
                    }
                    AmountKind::Rent if record.rent.is_none() => record.rent = Some(amount),
                    AmountKind::Rent | AmountKind::Maintenance => {}
                }
            }
            if record.area_sqft.is_none() {
                if let Some(cap) = AREA.captures(&text) {
                    record.area_sqft = parse_number(&cap[1]);
                }
            }
            if record.bhk.is_none() {
                if let Some(cap) = BHK.captures(&text) {
                    record.bhk = Some(format!("{} {}", &cap[1], cap[2].to_ascii_uppercase()));
                }
            }
            if record.furnishing.is_none() {
                if let Some(cap) = FURNISHING.captures(&text) {
                    record.furnishing = Some(cap[1].to_string());
                }
            }
            if record.property_type.is_none() {
                if let Some(cap) = PROPERTY_TYPE.captures(&text) {
                    record.property_type = Some(cap[1].to_string());
                }
            }
        }

        // A heading with none of the listing facts is navigation or an ad.
        if record.rent.is_none() && record.area_sqft.is_none() && record.bhk.is_none() {
            return None;
        }

        record.address = address
            .or_else(|| {
                TITLE_LOCALITY
                    .captures(&title)
                    .map(|c| c[1].trim().to_string())
            })
            .unwrap_or_default();
        record.id = record
            .url
            .as_deref()
            .and_then(|u| TRAILING_ID.captures(u))
            .map(|c| c[1].to_string());

        Some(record)
    }
}

impl RecordParser for MarkdownListingParser {
    fn parse(&self, content: &RawContent, area: &Area) -> Result<Vec<ListingRecord>, ScoutError> {
        let markdown = match content {
            RawContent::Markdown(md) => md,
            RawContent::Json(_) => {
                return Err(ScoutError::Parse(
                    "markdown parser received structured content".into(),
                ))
            }
        };
        if markdown.trim().is_empty() {
            return Err(ScoutError::Parse(format!("empty content for {}", area.name)));
        }

        let blocks = Self::blocks(markdown);
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (heading, body) in &blocks {
            match Self::parse_block(heading, body) {
                Some(record) => records.push(record),
                None => {
                    skipped += 1;
                    debug!(area = %area.name, heading, "Skipping non-listing block");
                }
            }
        }

        if records.is_empty() && !blocks.is_empty() {
            warn!(area = %area.name, blocks = blocks.len(), "No listing blocks recognised");
        }
        debug!(area = %area.name, parsed = records.len(), skipped, "Parsed markdown listings");
        Ok(records)
    }
}

/// Parse an amount capture ("45,000", "1.2 Lac", "2 Cr", "35k") into rupees.
fn parse_amount(cap: &regex::Captures<'_>) -> Option<f64> {
    let base = parse_number(cap.get(1)?.as_str())?;
    let multiplier = match cap.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(unit) if unit.starts_with('l') => 100_000.0,
        Some(unit) if unit.starts_with("cr") => 10_000_000.0,
        Some(unit) if unit == "k" => 1_000.0,
        _ => 1.0,
    };
    Some(base * multiplier)
}

/// Parse a number with Indian or western digit grouping.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

// ---------------------------------------------------------------------------
// Google Places
// ---------------------------------------------------------------------------

pub struct PlacesParser;

impl PlacesParser {
    fn parse_place(place: &Value) -> Option<ListingRecord> {
        let title = place
            .pointer("/displayName/text")
            .and_then(Value::as_str)?
            .trim()
            .to_string();
        if title.is_empty() {
            return None;
        }

        let rent = place
            .pointer("/priceRange/startPrice/units")
            .and_then(|u| match u {
                Value::String(s) => parse_number(s),
                Value::Number(n) => n.as_f64(),
                _ => None,
            });

        let images = place
            .get("photos")
            .and_then(Value::as_array)
            .map(|photos| {
                photos
                    .iter()
                    .filter_map(|p| p.get("name").and_then(Value::as_str))
                    .map(|name| format!("https://places.googleapis.com/v1/{name}/media"))
                    .collect()
            })
            .unwrap_or_default();

        Some(ListingRecord {
            id: place.get("id").and_then(Value::as_str).map(str::to_string),
            title,
            address: place
                .get("formattedAddress")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            rent,
            property_type: place
                .pointer("/primaryTypeDisplayName/text")
                .and_then(Value::as_str)
                .map(str::to_string),
            images,
            url: place
                .get("googleMapsUri")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..Default::default()
        })
    }
}

impl RecordParser for PlacesParser {
    fn parse(&self, content: &RawContent, area: &Area) -> Result<Vec<ListingRecord>, ScoutError> {
        let data = match content {
            RawContent::Json(v) if v.is_object() => v,
            RawContent::Json(_) => {
                return Err(ScoutError::Parse("Places payload is not an object".into()))
            }
            RawContent::Markdown(_) => {
                return Err(ScoutError::Parse(
                    "places parser received markdown content".into(),
                ))
            }
        };

        let Some(places) = data.get("places").and_then(Value::as_array) else {
            debug!(area = %area.name, "Places response has no results");
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(places.len());
        for (idx, place) in places.iter().enumerate() {
            match Self::parse_place(place) {
                Some(record) => records.push(record),
                None => warn!(area = %area.name, idx, "Skipping place without a display name"),
            }
        }
        Ok(records)
    }
}
