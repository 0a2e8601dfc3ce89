use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

pub use rentscout_common::KeyScope;
use rentscout_common::TaggedListing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub input: usize,
    pub kept: usize,
    pub removed: usize,
}

/// Identity of a listing. Floats are keyed by bit pattern, so equality is
/// exact and `None` only matches `None`.
#[derive(Debug, PartialEq, Eq, Hash)]
struct Fingerprint<'a> {
    title: &'a str,
    rent: Option<u64>,
    area_sqft: Option<u64>,
    area: Option<&'a str>,
}

impl<'a> Fingerprint<'a> {
    fn of(listing: &'a TaggedListing, scope: KeyScope) -> Self {
        Self {
            title: &listing.record.title,
            rent: listing.record.rent.map(canonical_bits),
            area_sqft: listing.record.area_sqft.map(canonical_bits),
            area: match scope {
                KeyScope::AreaScoped => Some(listing.area()),
                KeyScope::AreaAgnostic => None,
            },
        }
    }
}

// 0.0 and -0.0 compare equal, so they must share a key.
fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

/// Remove repeated listings, keeping the first occurrence and the input order.
pub fn dedupe(records: Vec<TaggedListing>, scope: KeyScope) -> (Vec<TaggedListing>, DedupStats) {
    let input = records.len();

    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(input);
        records
            .iter()
            .map(|r| seen.insert(Fingerprint::of(r, scope)))
            .collect()
    };

    let kept: Vec<TaggedListing> = records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, keep)| keep.then_some(r))
        .collect();

    let stats = DedupStats {
        input,
        kept: kept.len(),
        removed: input - kept.len(),
    };
    info!(
        input = stats.input,
        kept = stats.kept,
        removed = stats.removed,
        ?scope,
        "Deduplicated listings"
    );
    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tagged_in;

    #[test]
    fn same_listing_in_two_areas_survives_area_scoped() {
        let records = vec![
            tagged_in("Bandra West", "2BHK Sea View", 50000.0, 900.0),
            tagged_in("Khar West", "2BHK Sea View", 50000.0, 900.0),
        ];

        let (kept, stats) = dedupe(records.clone(), KeyScope::AreaScoped);
        assert_eq!(kept.len(), 2);
        assert_eq!(stats.removed, 0);

        let (kept, stats) = dedupe(records, KeyScope::AreaAgnostic);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].area(), "Bandra West");
        assert_eq!(stats.removed, 1);
    }

    #[test]
    fn first_occurrence_wins_and_order_is_preserved() {
        let mut dup = tagged_in("Powai", "Lake View", 35000.0, 700.0);
        dup.record.owner = Some("second".into());
        let records = vec![
            tagged_in("Powai", "Lake View", 35000.0, 700.0),
            tagged_in("Powai", "Hill Side", 28000.0, 600.0),
            dup,
            tagged_in("Powai", "Garden Flat", 30000.0, 650.0),
        ];

        let (kept, _) = dedupe(records, KeyScope::AreaScoped);
        let titles: Vec<_> = kept.iter().map(|r| r.record.title.as_str()).collect();
        assert_eq!(titles, vec!["Lake View", "Hill Side", "Garden Flat"]);
        assert_eq!(kept[0].record.owner, None);
    }

    #[test]
    fn missing_values_only_match_missing_values() {
        let mut a = tagged_in("Juhu", "Studio", 20000.0, 300.0);
        let mut b = a.clone();
        a.record.area_sqft = None;
        b.record.area_sqft = None;
        let c = tagged_in("Juhu", "Studio", 20000.0, 300.0);

        let (kept, _) = dedupe(vec![a, b, c], KeyScope::AreaScoped);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn dedupe_is_idempotent_and_never_grows() {
        let records = vec![
            tagged_in("Worli", "A", 1.0, 1.0),
            tagged_in("Worli", "A", 1.0, 1.0),
            tagged_in("Worli", "B", 1.0, 1.0),
            tagged_in("Colaba", "A", 1.0, 1.0),
        ];
        let (once, _) = dedupe(records.clone(), KeyScope::AreaScoped);
        let (twice, stats) = dedupe(once.clone(), KeyScope::AreaScoped);

        assert!(once.len() <= records.len());
        assert_eq!(once, twice);
        assert_eq!(stats.removed, 0);
    }
}
