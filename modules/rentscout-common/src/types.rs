use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Catalog Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Coarse grouping of areas (a city quadrant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    South,
    West,
    East,
    Central,
    Navi,
}

impl Zone {
    pub const ALL: [Zone; 5] = [Zone::South, Zone::West, Zone::East, Zone::Central, Zone::Navi];

    /// Slug used on the CLI, in strategy names and in export file names.
    pub fn slug(&self) -> &'static str {
        match self {
            Zone::South => "south",
            Zone::West => "west",
            Zone::East => "east",
            Zone::Central => "central",
            Zone::Navi => "navi",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Zone::South => "South Mumbai",
            Zone::West => "Western Suburbs",
            Zone::East => "Eastern Suburbs",
            Zone::Central => "Central Mumbai",
            Zone::Navi => "Navi Mumbai",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Zone> {
        Zone::ALL
            .into_iter()
            .find(|z| z.slug().eq_ignore_ascii_case(slug.trim()))
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A named sub-region of the city with the token a source is queried with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Area {
    pub name: String,
    pub zone: Zone,
    pub priority: Priority,
    pub query_token: String,
}

impl Area {
    /// File-system friendly form of the area name ("Bandra West" -> "bandra-west").
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// --- Listing Types ---

/// One listing as parsed from raw source content, before provenance is attached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub address: String,
    pub rent: Option<f64>,
    pub deposit: Option<f64>,
    pub area_sqft: Option<f64>,
    pub bhk: Option<String>,
    pub furnishing: Option<String>,
    pub property_type: Option<String>,
    pub owner: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub url: Option<String>,
}

impl ListingRecord {
    /// Rent per square foot, when both values are present and positive.
    pub fn rent_per_sqft(&self) -> Option<f64> {
        match (self.rent, self.area_sqft) {
            (Some(rent), Some(area)) if rent > 0.0 && area > 0.0 => Some(rent / area),
            _ => None,
        }
    }
}

/// Where and when a listing was extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(rename = "_area")]
    pub area: String,
    #[serde(rename = "_zone")]
    pub zone: Zone,
    #[serde(rename = "_priority")]
    pub priority: Priority,
    #[serde(rename = "_extractedAt")]
    pub extracted_at: DateTime<Utc>,
}

/// A listing together with its provenance. Aggregated record sets only ever
/// hold this type, so every record downstream of extraction is area-tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedListing {
    #[serde(flatten)]
    pub record: ListingRecord,
    #[serde(flatten)]
    pub provenance: Provenance,
}

impl TaggedListing {
    pub fn tag(record: ListingRecord, area: &Area, extracted_at: DateTime<Utc>) -> Self {
        Self {
            record,
            provenance: Provenance {
                area: area.name.clone(),
                zone: area.zone,
                priority: area.priority,
                extracted_at,
            },
        }
    }

    pub fn area(&self) -> &str {
        &self.provenance.area
    }

    pub fn zone(&self) -> Zone {
        self.provenance.zone
    }
}

// --- Extraction Outcome Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaStatus {
    Success,
    Failed,
}

/// Terminal outcome of one area's attempt sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaResult {
    pub area: String,
    pub zone: Zone,
    pub priority: Priority,
    pub status: AreaStatus,
    pub property_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaError {
    pub area: String,
    pub error: String,
    pub attempts: u32,
}

/// Everything the orchestrator produced for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionOutcome {
    pub records: Vec<TaggedListing>,
    pub area_results: BTreeMap<String, AreaResult>,
    pub errors: Vec<AreaError>,
    /// True when at least one area succeeded.
    pub success: bool,
}

impl ExtractionOutcome {
    pub fn succeeded_areas(&self) -> usize {
        self.area_results
            .values()
            .filter(|r| r.status == AreaStatus::Success)
            .count()
    }

    pub fn failed_areas(&self) -> usize {
        self.area_results.len() - self.succeeded_areas()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> Area {
        Area {
            name: "Bandra West".into(),
            zone: Zone::West,
            priority: Priority::High,
            query_token: "token".into(),
        }
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Bandra West"), "bandra-west");
        assert_eq!(slugify("  Powai / Hiranandani "), "powai-hiranandani");
        assert_eq!(slugify("CBD-Belapur"), "cbd-belapur");
    }

    #[test]
    fn zone_slug_round_trips() {
        for zone in Zone::ALL {
            assert_eq!(Zone::from_slug(zone.slug()), Some(zone));
        }
        assert_eq!(Zone::from_slug("NAVI"), Some(Zone::Navi));
        assert_eq!(Zone::from_slug("north"), None);
    }

    #[test]
    fn tagged_listing_serializes_provenance_with_underscore_fields() {
        let record = ListingRecord {
            title: "Sea View 2BHK".into(),
            address: "Carter Road".into(),
            rent: Some(45000.0),
            area_sqft: Some(850.0),
            ..Default::default()
        };
        let tagged = TaggedListing::tag(record, &area(), Utc::now());
        let value = serde_json::to_value(&tagged).unwrap();

        assert_eq!(value["_area"], "Bandra West");
        assert_eq!(value["_zone"], "west");
        assert_eq!(value["_priority"], "high");
        assert_eq!(value["areaSqft"], 850.0);
        assert!(value.get("_extractedAt").is_some());
    }

    #[test]
    fn rent_per_sqft_requires_positive_values() {
        let mut record = ListingRecord {
            rent: Some(30000.0),
            area_sqft: Some(600.0),
            ..Default::default()
        };
        assert_eq!(record.rent_per_sqft(), Some(50.0));
        record.area_sqft = Some(0.0);
        assert_eq!(record.rent_per_sqft(), None);
        record.area_sqft = None;
        assert_eq!(record.rent_per_sqft(), None);
    }
}
