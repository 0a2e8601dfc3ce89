//! Market analytics over a set of tagged listings.
//!
//! Everything here is a pure function of the record slice. Empty subsets
//! never produce NaN or infinities: whole sections become
//! [`Section::Insufficient`] and single averages become `None`.
//!
//! Percentiles use the floor-index estimator `sorted[floor(n * p)]`
//! (clamped to `n - 1`). It is biased upward for even `n`: the median of
//! `[20000, 30000, 40000, 50000]` is `40000`.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use typed_builder::TypedBuilder;

use rentscout_common::TaggedListing;

pub const INSUFFICIENT_DATA: &str = "insufficient data";

pub const RENT_EDGES: &[f64] = &[
    0.0, 10_000.0, 20_000.0, 30_000.0, 50_000.0, 75_000.0, 100_000.0, 150_000.0,
];
pub const AREA_EDGES: &[f64] = &[0.0, 400.0, 600.0, 800.0, 1_000.0, 1_500.0, 2_000.0];
pub const STANDARD_PERCENTILES: &[u8] = &[10, 25, 50, 75, 90];

// ---------------------------------------------------------------------------
// Section sentinel
// ---------------------------------------------------------------------------

/// A computed section, or the insufficient-data sentinel.
///
/// Serializes as the data itself or as `{"error": "insufficient data"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    Data(T),
    Insufficient { error: &'static str },
}

impl<T> Section<T> {
    pub fn insufficient() -> Self {
        Section::Insufficient {
            error: INSUFFICIENT_DATA,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Section::Insufficient { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Data(d) => Some(d),
            Section::Insufficient { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Basic statistics
// ---------------------------------------------------------------------------

fn percentile_at(sorted: &[f64], p: f64) -> f64 {
    let idx = ((sorted.len() as f64) * p).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Floor-index percentiles of an ascending slice, keyed by whole percent.
/// `None` on empty input.
pub fn percentiles(sorted: &[f64], ps: &[u8]) -> Option<BTreeMap<u8, f64>> {
    if sorted.is_empty() {
        return None;
    }
    Some(
        ps.iter()
            .map(|&p| (p, percentile_at(sorted, f64::from(p) / 100.0)))
            .collect(),
    )
}

pub fn average(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Floor-index median of unsorted values.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    Some(percentile_at(&sorted, 0.5))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

// ---------------------------------------------------------------------------
// Overview
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCompleteness {
    pub field: &'static str,
    pub present: usize,
    /// `round(100 * present / total)`.
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total: usize,
    pub with_rent: usize,
    pub with_area: usize,
    pub areas: usize,
    pub zones: usize,
    pub completeness: Vec<FieldCompleteness>,
}

type FieldCheck = fn(&TaggedListing) -> bool;

const COMPLETENESS_FIELDS: &[(&str, FieldCheck)] = &[
    ("title", |r| !r.record.title.trim().is_empty()),
    ("address", |r| !r.record.address.trim().is_empty()),
    ("rent", |r| r.record.rent.is_some()),
    ("deposit", |r| r.record.deposit.is_some()),
    ("areaSqft", |r| r.record.area_sqft.is_some()),
    ("bhk", |r| r.record.bhk.is_some()),
    ("furnishing", |r| r.record.furnishing.is_some()),
    ("propertyType", |r| r.record.property_type.is_some()),
    ("owner", |r| r.record.owner.is_some()),
    ("images", |r| !r.record.images.is_empty()),
    ("url", |r| r.record.url.is_some()),
];

pub fn overview(records: &[TaggedListing]) -> Section<Overview> {
    let total = records.len();
    if total == 0 {
        return Section::insufficient();
    }

    let completeness = COMPLETENESS_FIELDS
        .iter()
        .map(|(field, check)| {
            let present = records.iter().filter(|r| check(r)).count();
            FieldCompleteness {
                field: *field,
                present,
                percent: (100.0 * present as f64 / total as f64).round() as u32,
            }
        })
        .collect();

    let mut areas: Vec<&str> = records.iter().map(|r| r.area()).collect();
    areas.sort_unstable();
    areas.dedup();
    let mut zones: Vec<_> = records.iter().map(|r| r.zone()).collect();
    zones.sort_unstable();
    zones.dedup();

    Section::Data(Overview {
        total,
        with_rent: records.iter().filter(|r| positive(r.record.rent).is_some()).count(),
        with_area: records
            .iter()
            .filter(|r| positive(r.record.area_sqft).is_some())
            .count(),
        areas: areas.len(),
        zones: zones.len(),
        completeness,
    })
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quartiles {
    pub q1: f64,
    pub q3: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub label: String,
    pub min: f64,
    /// Exclusive upper edge; `None` for the open last bucket.
    pub max: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub quartiles: Quartiles,
    pub percentiles: BTreeMap<u8, f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub histogram: Vec<HistogramBucket>,
}

fn edge_label(v: f64) -> String {
    if v >= 10_000.0 && v % 1_000.0 == 0.0 {
        format!("{}k", v / 1_000.0)
    } else {
        format!("{v}")
    }
}

/// Bucket counts over `[e0, e1), [e1, e2), …, [e_last, ∞)`.
pub fn histogram(values: &[f64], edges: &[f64]) -> Vec<HistogramBucket> {
    edges
        .iter()
        .enumerate()
        .map(|(i, &min)| {
            let max = edges.get(i + 1).copied();
            let count = values
                .iter()
                .filter(|&&v| v >= min && max.is_none_or(|hi| v < hi))
                .count();
            let label = match max {
                Some(hi) => format!("{}-{}", edge_label(min), edge_label(hi)),
                None => format!("{}+", edge_label(min)),
            };
            HistogramBucket {
                label,
                min,
                max,
                count,
            }
        })
        .collect()
}

/// Summary statistics over the positive, finite values. Pass empty `edges`
/// to skip the histogram.
pub fn distribution(values: impl IntoIterator<Item = f64>, edges: &[f64]) -> Section<Distribution> {
    let mut sorted: Vec<f64> = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if sorted.is_empty() {
        return Section::insufficient();
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let Some(standard) = percentiles(&sorted, STANDARD_PERCENTILES) else {
        return Section::insufficient();
    };

    Section::Data(Distribution {
        count,
        min: sorted[0],
        max: sorted[count - 1],
        mean,
        median: percentile_at(&sorted, 0.5),
        quartiles: Quartiles {
            q1: percentile_at(&sorted, 0.25),
            q3: percentile_at(&sorted, 0.75),
        },
        percentiles: standard,
        histogram: if edges.is_empty() {
            Vec::new()
        } else {
            histogram(&sorted, edges)
        },
    })
}

pub fn rent_distribution(records: &[TaggedListing]) -> Section<Distribution> {
    distribution(records.iter().filter_map(|r| r.record.rent), RENT_EDGES)
}

pub fn area_distribution(records: &[TaggedListing]) -> Section<Distribution> {
    distribution(records.iter().filter_map(|r| r.record.area_sqft), AREA_EDGES)
}

pub fn rent_per_sqft_distribution(records: &[TaggedListing]) -> Section<Distribution> {
    distribution(records.iter().filter_map(|r| r.record.rent_per_sqft()), &[])
}

// ---------------------------------------------------------------------------
// Cross-tabulation
// ---------------------------------------------------------------------------

pub const UNKNOWN_GROUP: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Zone,
    Area,
    Bhk,
    Furnishing,
    PropertyType,
    Priority,
}

impl GroupField {
    fn key(&self, r: &TaggedListing) -> Option<String> {
        let value = match self {
            GroupField::Zone => Some(r.zone().display_name().to_string()),
            GroupField::Area => Some(r.area().to_string()),
            GroupField::Bhk => r.record.bhk.clone(),
            GroupField::Furnishing => r.record.furnishing.clone(),
            GroupField::PropertyType => r.record.property_type.clone(),
            GroupField::Priority => Some(r.provenance.priority.to_string()),
        };
        value.filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricField {
    Rent,
    AreaSqft,
    Deposit,
    RentPerSqft,
}

impl MetricField {
    /// The metric when present and positive.
    pub fn value(&self, r: &TaggedListing) -> Option<f64> {
        positive(match self {
            MetricField::Rent => r.record.rent,
            MetricField::AreaSqft => r.record.area_sqft,
            MetricField::Deposit => r.record.deposit,
            MetricField::RentPerSqft => r.record.rent_per_sqft(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStat {
    pub key: String,
    pub count: usize,
    /// Share of all records, one decimal place.
    pub percentage: f64,
    /// `None` when no record in the group has the metric.
    pub average: Option<f64>,
}

/// Group records by `group` and average `metric` per group, in first-seen
/// group order. Records without a group value fall under "Unknown".
pub fn cross_tab(records: &[TaggedListing], group: GroupField, metric: MetricField) -> Vec<GroupStat> {
    struct Acc {
        key: String,
        count: usize,
        sum: f64,
        with_metric: usize,
    }

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Acc> = Vec::new();

    for r in records {
        let key = group.key(r).unwrap_or_else(|| UNKNOWN_GROUP.to_string());
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(Acc {
                key,
                count: 0,
                sum: 0.0,
                with_metric: 0,
            });
            groups.len() - 1
        });
        let acc = &mut groups[slot];
        acc.count += 1;
        if let Some(v) = metric.value(r) {
            acc.sum += v;
            acc.with_metric += 1;
        }
    }

    let total = records.len();
    groups
        .into_iter()
        .map(|acc| GroupStat {
            percentage: (1000.0 * acc.count as f64 / total as f64).round() / 10.0,
            average: (acc.with_metric > 0).then(|| acc.sum / acc.with_metric as f64),
            key: acc.key,
            count: acc.count,
        })
        .collect()
}

/// Sort by count descending; ties keep their first-seen order.
pub fn ranked(mut stats: Vec<GroupStat>) -> Vec<GroupStat> {
    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}

/// Sort by average descending; groups without an average go last.
pub fn ranked_by_average(mut stats: Vec<GroupStat>) -> Vec<GroupStat> {
    stats.sort_by(|a, b| match (a.average, b.average) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    stats
}

// ---------------------------------------------------------------------------
// Top-N
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct TopNQuery {
    pub by: MetricField,
    #[builder(default = Direction::Descending)]
    pub direction: Direction,
    #[builder(default = 10)]
    pub n: usize,
}

/// A listing projected for display in reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayListing {
    pub title: String,
    pub address: String,
    pub area: String,
    pub zone: String,
    pub rent: Option<f64>,
    pub area_sqft: Option<f64>,
    pub bhk: Option<String>,
    pub furnishing: Option<String>,
    pub rent_per_sqft: Option<f64>,
    pub url: Option<String>,
}

impl From<&TaggedListing> for DisplayListing {
    fn from(r: &TaggedListing) -> Self {
        Self {
            title: r.record.title.clone(),
            address: r.record.address.clone(),
            area: r.area().to_string(),
            zone: r.zone().display_name().to_string(),
            rent: r.record.rent,
            area_sqft: r.record.area_sqft,
            bhk: r.record.bhk.clone(),
            furnishing: r.record.furnishing.clone(),
            rent_per_sqft: r.record.rent_per_sqft().map(|v| round_to(v, 2)),
            url: r.record.url.clone(),
        }
    }
}

/// The `n` records with the highest (or lowest) value of `by`. Records
/// without the field are excluded; equal values keep input order.
pub fn top_n(records: &[TaggedListing], query: &TopNQuery) -> Vec<DisplayListing> {
    let mut candidates: Vec<(f64, &TaggedListing)> = records
        .iter()
        .filter_map(|r| query.by.value(r).map(|v| (v, r)))
        .collect();

    candidates.sort_by(|(a, _), (b, _)| match query.direction {
        Direction::Ascending => a.total_cmp(b),
        Direction::Descending => b.total_cmp(a),
    });

    candidates
        .into_iter()
        .take(query.n)
        .map(|(_, r)| DisplayListing::from(r))
        .collect()
}

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

/// Summary of one slice of the market (a zone, an area, a price tier).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStats {
    pub count: usize,
    /// Share of all records, one decimal place.
    pub share: f64,
    pub avg_rent: Option<f64>,
    pub avg_area_sqft: Option<f64>,
    pub avg_rent_per_sqft: Option<f64>,
    pub median_rent: Option<f64>,
}

pub fn segment_stats(segment: &[&TaggedListing], total: usize) -> SegmentStats {
    let rents = || segment.iter().filter_map(|r| MetricField::Rent.value(r));
    SegmentStats {
        count: segment.len(),
        share: if total == 0 {
            0.0
        } else {
            (1000.0 * segment.len() as f64 / total as f64).round() / 10.0
        },
        avg_rent: average(rents()),
        avg_area_sqft: average(segment.iter().filter_map(|r| MetricField::AreaSqft.value(r))),
        avg_rent_per_sqft: average(
            segment
                .iter()
                .filter_map(|r| MetricField::RentPerSqft.value(r)),
        ),
        median_rent: median(rents()),
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// All analytics for one record set. Recomputed on demand, never persisted
/// incrementally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub overview: Section<Overview>,
    pub rent: Section<Distribution>,
    pub area_sqft: Section<Distribution>,
    pub rent_per_sqft: Section<Distribution>,
    pub avg_rent_per_sqft: Option<f64>,
    pub by_zone: Section<Vec<GroupStat>>,
    pub by_area: Section<Vec<GroupStat>>,
    pub by_bhk: Section<Vec<GroupStat>>,
    pub by_furnishing: Section<Vec<GroupStat>>,
    pub by_property_type: Section<Vec<GroupStat>>,
    pub by_priority: Section<Vec<GroupStat>>,
}

pub fn snapshot(records: &[TaggedListing]) -> AnalyticsSnapshot {
    let tab = |group| {
        if records.is_empty() {
            Section::insufficient()
        } else {
            Section::Data(cross_tab(records, group, MetricField::Rent))
        }
    };

    AnalyticsSnapshot {
        overview: overview(records),
        rent: rent_distribution(records),
        area_sqft: area_distribution(records),
        rent_per_sqft: rent_per_sqft_distribution(records),
        avg_rent_per_sqft: average(records.iter().filter_map(|r| MetricField::RentPerSqft.value(r))),
        by_zone: tab(GroupField::Zone),
        by_area: tab(GroupField::Area),
        by_bhk: tab(GroupField::Bhk),
        by_furnishing: tab(GroupField::Furnishing),
        by_property_type: tab(GroupField::PropertyType),
        by_priority: tab(GroupField::Priority),
    }
}
