use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use rentscout_common::{CleaningSettings, ListingRecord, ScoutError, TaggedListing};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static BHK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.5)?)\s*-?\s*(bhk|rk|bedrooms?|beds?)\b").expect("valid regex")
});

const EMPHASIS: &[char] = &['*', '_', '`', '#'];
const TRAILING_SEPARATORS: &[char] = &[',', ';', ':', '-', '|', '/', '·', '•'];

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingTitle,
    MissingAddress,
    MissingRent,
    RentOutOfRange,
    AreaOutOfRange,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingTitle => "missing_title",
            DropReason::MissingAddress => "missing_address",
            DropReason::MissingRent => "missing_rent",
            DropReason::RentOutOfRange => "rent_out_of_range",
            DropReason::AreaOutOfRange => "area_out_of_range",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed check with its human-readable detail.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: DropReason,
    pub detail: String,
}

impl Rejection {
    fn new(reason: DropReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl From<Rejection> for ScoutError {
    fn from(r: Rejection) -> Self {
        ScoutError::Validation(format!("{}: {}", r.reason, r.detail))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRecord {
    pub title: String,
    pub area: String,
    pub reason: DropReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub input: usize,
    pub kept: usize,
    pub dropped: Vec<DroppedRecord>,
    pub by_reason: BTreeMap<String, usize>,
}

/// Collapse whitespace, strip markdown emphasis and trailing separators.
pub fn sanitize_text(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| !EMPHASIS.contains(c)).collect();
    let collapsed = WHITESPACE.replace_all(stripped.trim(), " ");
    collapsed
        .trim_end_matches(|c: char| TRAILING_SEPARATORS.contains(&c) || c.is_whitespace())
        .trim_start()
        .to_string()
}

/// "2bhk", "2 Bhk", "2 bedrooms" → "2 BHK"; "1rk", "studio" → "1 RK".
pub fn normalize_bhk(raw: &str) -> Option<String> {
    if let Some(cap) = BHK.captures(raw) {
        let unit = if cap[2].eq_ignore_ascii_case("rk") { "RK" } else { "BHK" };
        return Some(format!("{} {unit}", &cap[1]));
    }
    if raw.to_ascii_lowercase().contains("studio") {
        return Some("1 RK".to_string());
    }
    None
}

/// Map free-form furnishing text onto `Furnished | Semi-Furnished | Unfurnished`.
pub fn normalize_furnishing(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    let value = if lower.contains("semi") {
        "Semi-Furnished"
    } else if lower.contains("unfurnished") || lower.contains("not furnished") {
        "Unfurnished"
    } else if lower.contains("furnished") {
        "Furnished"
    } else {
        return None;
    };
    Some(value.to_string())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| sanitize_text(&v)).filter(|v| !v.is_empty())
}

/// Sanitize every text field and normalize categorical ones.
pub fn normalize(mut record: ListingRecord) -> ListingRecord {
    record.title = sanitize_text(&record.title);
    record.address = sanitize_text(&record.address);
    record.owner = clean_optional(record.owner);
    record.property_type = clean_optional(record.property_type);
    record.bhk = record.bhk.as_deref().and_then(normalize_bhk).or_else(|| normalize_bhk(&record.title));
    record.furnishing = record.furnishing.as_deref().and_then(normalize_furnishing);
    record.url = record.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
    record.images.retain(|u| !u.trim().is_empty());
    record
}

/// `normalize` applied to a tagged record. Runs before dedup so listings that
/// differ only in markup share a key.
pub fn normalize_listing(listing: TaggedListing) -> TaggedListing {
    TaggedListing {
        record: normalize(listing.record),
        provenance: listing.provenance,
    }
}

/// Minimum-field and plausible-range checks.
pub fn validate(record: &ListingRecord, settings: &CleaningSettings) -> Result<(), Rejection> {
    if record.title.is_empty() {
        return Err(Rejection::new(DropReason::MissingTitle, "title is empty"));
    }
    if record.address.is_empty() {
        return Err(Rejection::new(DropReason::MissingAddress, "address is empty"));
    }
    let rent = record
        .rent
        .ok_or_else(|| Rejection::new(DropReason::MissingRent, "rent is missing"))?;
    if !(settings.min_rent..=settings.max_rent).contains(&rent) {
        return Err(Rejection::new(
            DropReason::RentOutOfRange,
            format!("rent {rent} outside {}..={}", settings.min_rent, settings.max_rent),
        ));
    }
    if let Some(area) = record.area_sqft {
        if !(settings.min_area_sqft..=settings.max_area_sqft).contains(&area) {
            return Err(Rejection::new(
                DropReason::AreaOutOfRange,
                format!(
                    "area {area} sqft outside {}..={}",
                    settings.min_area_sqft, settings.max_area_sqft
                ),
            ));
        }
    }
    Ok(())
}

/// Normalize and validate every record. Never fails; dropped records are
/// attributed in the report.
pub fn clean(
    records: Vec<TaggedListing>,
    settings: &CleaningSettings,
) -> (Vec<TaggedListing>, CleaningReport) {
    let mut report = CleaningReport {
        input: records.len(),
        ..Default::default()
    };
    let mut kept = Vec::with_capacity(records.len());

    for listing in records {
        let TaggedListing { record, provenance } = listing;
        let record = normalize(record);
        match validate(&record, settings) {
            Ok(()) => kept.push(TaggedListing { record, provenance }),
            Err(rejection) => {
                *report
                    .by_reason
                    .entry(rejection.reason.to_string())
                    .or_insert(0) += 1;
                report.dropped.push(DroppedRecord {
                    title: record.title.clone(),
                    area: provenance.area.clone(),
                    reason: rejection.reason,
                    detail: rejection.detail.clone(),
                });
                debug!(
                    title = %record.title,
                    area = %provenance.area,
                    error = %ScoutError::from(rejection),
                    "Dropped listing"
                );
            }
        }
    }

    report.kept = kept.len();
    info!(
        input = report.input,
        kept = report.kept,
        dropped = report.dropped.len(),
        "Cleaned listings"
    );
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tagged_in;

    #[test]
    fn sanitize_strips_emphasis_and_trailing_separators() {
        assert_eq!(sanitize_text("  **Sea   View**  Flat ,"), "Sea View Flat");
        assert_eq!(sanitize_text("Carter Road |"), "Carter Road");
        assert_eq!(sanitize_text("   "), "");
    }

    #[test]
    fn bhk_and_furnishing_are_normalized() {
        assert_eq!(normalize_bhk("2bhk").as_deref(), Some("2 BHK"));
        assert_eq!(normalize_bhk("3 Bedrooms").as_deref(), Some("3 BHK"));
        assert_eq!(normalize_bhk("1rk").as_deref(), Some("1 RK"));
        assert_eq!(normalize_bhk("Studio apartment").as_deref(), Some("1 RK"));
        assert_eq!(normalize_bhk("penthouse"), None);

        assert_eq!(normalize_furnishing("semi furnished").as_deref(), Some("Semi-Furnished"));
        assert_eq!(normalize_furnishing("Fully Furnished").as_deref(), Some("Furnished"));
        assert_eq!(normalize_furnishing("UNFURNISHED").as_deref(), Some("Unfurnished"));
        assert_eq!(normalize_furnishing("n/a"), None);
    }

    #[test]
    fn bhk_falls_back_to_title() {
        let mut record = tagged_in("Powai", "3BHK Lake Facing", 60000.0, 1200.0).record;
        record.bhk = None;
        assert_eq!(normalize(record).bhk.as_deref(), Some("3 BHK"));
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let mut listing = tagged_in("Bandra West", "**Sea  View 2bhk** ,", 45000.0, 850.0);
        listing.record.furnishing = Some("semi furnished".into());
        let once = normalize_listing(listing);
        let twice = normalize_listing(once.clone());
        assert_eq!(once.record.title, "Sea View 2bhk");
        assert_eq!(once, twice);
    }

    #[test]
    fn clean_attributes_each_drop() {
        let mut no_rent = tagged_in("Juhu", "No rent", 1.0, 500.0);
        no_rent.record.rent = None;
        let mut no_address = tagged_in("Juhu", "No address", 25000.0, 500.0);
        no_address.record.address = "  ".into();
        let records = vec![
            tagged_in("Juhu", "Good flat", 25000.0, 500.0),
            no_rent,
            no_address,
            tagged_in("Juhu", "Too cheap", 500.0, 500.0),
            tagged_in("Juhu", "Huge", 25000.0, 50000.0),
        ];

        let (kept, report) = clean(records, &CleaningSettings::default());

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].record.title, "Good flat");
        assert_eq!(report.input, 5);
        assert_eq!(report.kept, 1);
        assert_eq!(report.dropped.len(), 4);
        assert_eq!(report.by_reason["missing_rent"], 1);
        assert_eq!(report.by_reason["missing_address"], 1);
        assert_eq!(report.by_reason["rent_out_of_range"], 1);
        assert_eq!(report.by_reason["area_out_of_range"], 1);
        assert!(report.dropped.iter().all(|d| d.area == "Juhu"));
    }

    #[test]
    fn missing_area_is_not_a_drop_reason() {
        let mut record = tagged_in("Sion", "Compact 1BHK", 18000.0, 400.0);
        record.record.area_sqft = None;
        let (kept, report) = clean(vec![record], &CleaningSettings::default());
        assert_eq!(kept.len(), 1);
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn rejection_converts_to_validation_error() {
        let err = ScoutError::from(Rejection::new(DropReason::MissingRent, "rent is missing"));
        assert!(matches!(err, ScoutError::Validation(ref m) if m.starts_with("missing_rent")));
    }
}
