//! Static registry of city areas and the strategies that select them.
//!
//! The catalog is built once at startup and only exposes read accessors.

use tracing::warn;

use rentscout_common::{Area, Priority, Zone};

use crate::fetchers::SourceProvider;

/// Built-in Mumbai localities, in declaration order.
const MUMBAI_AREAS: &[(&str, Zone, Priority)] = &[
    // South Mumbai
    ("Colaba", Zone::South, Priority::High),
    ("Worli", Zone::South, Priority::High),
    ("Lower Parel", Zone::South, Priority::High),
    ("Cuffe Parade", Zone::South, Priority::Medium),
    ("Malabar Hill", Zone::South, Priority::Medium),
    ("Tardeo", Zone::South, Priority::Low),
    ("Marine Lines", Zone::South, Priority::Low),
    // Western Suburbs
    ("Bandra West", Zone::West, Priority::High),
    ("Andheri West", Zone::West, Priority::High),
    ("Khar West", Zone::West, Priority::Medium),
    ("Santacruz West", Zone::West, Priority::Medium),
    ("Juhu", Zone::West, Priority::Medium),
    ("Goregaon West", Zone::West, Priority::Medium),
    ("Malad West", Zone::West, Priority::Medium),
    ("Borivali West", Zone::West, Priority::Medium),
    ("Kandivali West", Zone::West, Priority::Low),
    // Eastern Suburbs
    ("Powai", Zone::East, Priority::High),
    ("Chembur", Zone::East, Priority::High),
    ("Ghatkopar East", Zone::East, Priority::Medium),
    ("Mulund West", Zone::East, Priority::Medium),
    ("Vikhroli", Zone::East, Priority::Low),
    ("Kanjurmarg", Zone::East, Priority::Low),
    // Central Mumbai
    ("Dadar West", Zone::Central, Priority::High),
    ("Parel", Zone::Central, Priority::Medium),
    ("Sion", Zone::Central, Priority::Medium),
    ("Matunga", Zone::Central, Priority::Low),
    ("Wadala", Zone::Central, Priority::Low),
    // Navi Mumbai
    ("Vashi", Zone::Navi, Priority::High),
    ("Kharghar", Zone::Navi, Priority::Medium),
    ("Nerul", Zone::Navi, Priority::Medium),
    ("CBD Belapur", Zone::Navi, Priority::Low),
    ("Airoli", Zone::Navi, Priority::Low),
];

/// A named rule selecting the subset of areas for one extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    All,
    HighPriority,
    /// High first, then medium.
    MediumPriority,
    Zone(Zone),
}

impl Strategy {
    /// Parse a strategy name. Unknown names fall back to `HighPriority`.
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "all" => Strategy::All,
            "high-priority" | "high" => Strategy::HighPriority,
            "medium-priority" | "medium" => Strategy::MediumPriority,
            other => match Zone::from_slug(other) {
                Some(zone) => Strategy::Zone(zone),
                None => {
                    warn!(strategy = name, "Unknown strategy, falling back to high-priority");
                    Strategy::HighPriority
                }
            },
        }
    }

    pub fn name(&self) -> String {
        match self {
            Strategy::All => "all".to_string(),
            Strategy::HighPriority => "high-priority".to_string(),
            Strategy::MediumPriority => "medium-priority".to_string(),
            Strategy::Zone(zone) => zone.slug().to_string(),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone)]
pub struct AreaCatalog {
    areas: Vec<Area>,
}

impl AreaCatalog {
    pub fn new(areas: Vec<Area>) -> Self {
        Self { areas }
    }

    /// The built-in Mumbai catalog with query tokens for `provider`.
    pub fn mumbai(provider: SourceProvider) -> Self {
        let areas = MUMBAI_AREAS
            .iter()
            .map(|(name, zone, priority)| Area {
                name: name.to_string(),
                zone: *zone,
                priority: *priority,
                query_token: provider.query_token(name),
            })
            .collect();
        Self { areas }
    }

    pub fn list_all(&self) -> &[Area] {
        &self.areas
    }

    pub fn list_by_zone(&self, zone: Zone) -> Vec<&Area> {
        self.areas.iter().filter(|a| a.zone == zone).collect()
    }

    pub fn list_by_priority(&self, priority: Priority) -> Vec<&Area> {
        self.areas.iter().filter(|a| a.priority == priority).collect()
    }

    /// Look up an area by name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<&Area> {
        self.areas
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Zones present in the catalog, in first-declared order.
    pub fn zones(&self) -> Vec<Zone> {
        let mut zones = Vec::new();
        for area in &self.areas {
            if !zones.contains(&area.zone) {
                zones.push(area.zone);
            }
        }
        zones
    }

    pub fn resolve_extraction_set(&self, strategy: Strategy) -> Vec<&Area> {
        match strategy {
            Strategy::All => self.areas.iter().collect(),
            Strategy::HighPriority => self.list_by_priority(Priority::High),
            Strategy::MediumPriority => {
                let mut set = self.list_by_priority(Priority::High);
                set.extend(self.list_by_priority(Priority::Medium));
                set
            }
            Strategy::Zone(zone) => self.list_by_zone(zone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(name: &str, zone: Zone, priority: Priority) -> Area {
        Area {
            name: name.into(),
            zone,
            priority,
            query_token: format!("q:{name}"),
        }
    }

    fn small_catalog() -> AreaCatalog {
        AreaCatalog::new(vec![
            area("Colaba", Zone::South, Priority::High),
            area("Tardeo", Zone::South, Priority::Low),
            area("Bandra West", Zone::West, Priority::High),
        ])
    }

    #[test]
    fn high_priority_resolves_in_catalog_order() {
        let catalog = small_catalog();
        let names: Vec<_> = catalog
            .resolve_extraction_set(Strategy::HighPriority)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["Colaba", "Bandra West"]);
    }

    #[test]
    fn medium_priority_lists_high_before_medium() {
        let catalog = AreaCatalog::new(vec![
            area("Juhu", Zone::West, Priority::Medium),
            area("Powai", Zone::East, Priority::High),
            area("Airoli", Zone::Navi, Priority::Low),
            area("Parel", Zone::Central, Priority::Medium),
            area("Worli", Zone::South, Priority::High),
        ]);
        let names: Vec<_> = catalog
            .resolve_extraction_set(Strategy::MediumPriority)
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["Powai", "Worli", "Juhu", "Parel"]);
    }

    #[test]
    fn zone_strategy_returns_only_that_zone() {
        let catalog = small_catalog();
        let names: Vec<_> = catalog
            .resolve_extraction_set(Strategy::Zone(Zone::South))
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["Colaba", "Tardeo"]);
    }

    #[test]
    fn unknown_strategy_falls_back_to_high_priority() {
        assert_eq!(Strategy::parse("everything-please"), Strategy::HighPriority);
        assert_eq!(Strategy::parse("west"), Strategy::Zone(Zone::West));
        assert_eq!(Strategy::parse("ALL"), Strategy::All);
        assert_eq!(Strategy::parse("medium-priority"), Strategy::MediumPriority);
    }

    #[test]
    fn find_is_case_insensitive_and_returns_none_for_unknown() {
        let catalog = small_catalog();
        assert_eq!(catalog.find("bandra west").map(|a| a.zone), Some(Zone::West));
        assert!(catalog.find("Atlantis").is_none());
    }

    #[test]
    fn mumbai_catalog_covers_every_zone_with_tokens() {
        let catalog = AreaCatalog::mumbai(SourceProvider::GooglePlaces);
        assert_eq!(catalog.zones(), Zone::ALL.to_vec());
        assert!(catalog
            .list_all()
            .iter()
            .all(|a| a.query_token.contains(&a.name)));
        assert!(!catalog.list_by_priority(Priority::High).is_empty());
    }

    #[test]
    fn mumbai_area_names_are_unique() {
        let catalog = AreaCatalog::mumbai(SourceProvider::Apify);
        let mut names: Vec<_> = catalog.list_all().iter().map(|a| a.slug()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
