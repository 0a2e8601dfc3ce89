use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use rentscout_common::{TaggedListing, Zone};

use crate::analytics::{
    self, cross_tab, ranked, ranked_by_average, segment_stats, top_n, AnalyticsSnapshot,
    Direction, DisplayListing, Distribution, GroupField, GroupStat, MetricField, Overview,
    Section, SegmentStats, TopNQuery, UNKNOWN_GROUP,
};

const PREMIUM_FACTOR: f64 = 1.5;
const BUDGET_FACTOR: f64 = 0.75;

/// Run facts the report header needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub strategy: String,
    pub provider: String,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
    pub areas_attempted: usize,
    pub areas_succeeded: usize,
    pub areas_failed: usize,
    pub raw_records: usize,
    pub deduplicated_records: usize,
    pub analyzed_records: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub overview: Section<Overview>,
    pub rent: Section<Distribution>,
    pub area_sqft: Section<Distribution>,
    pub avg_rent_per_sqft: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneAnalysis {
    pub zone: String,
    pub slug: String,
    #[serde(flatten)]
    pub stats: SegmentStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaAnalysis {
    pub area: String,
    pub zone: String,
    #[serde(flatten)]
    pub stats: SegmentStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tier {
    /// Inclusive lower bound on rent per sqft.
    pub min_rent_per_sqft: Option<f64>,
    /// Upper bound on rent per sqft.
    pub max_rent_per_sqft: Option<f64>,
    #[serde(flatten)]
    pub stats: SegmentStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceTiers {
    pub avg_rent_per_sqft: f64,
    pub premium: Tier,
    pub mid: Tier,
    pub budget: Tier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopListings {
    pub most_expensive: Vec<DisplayListing>,
    pub largest: Vec<DisplayListing>,
    pub best_value: Vec<DisplayListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub most_listed_zone: Option<GroupStat>,
    pub most_common_bhk: Option<GroupStat>,
    pub most_common_furnishing: Option<GroupStat>,
    pub priciest_zone: Option<GroupStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendations {
    /// 25th percentile rent.
    pub budget_threshold: Option<f64>,
    pub listings_within_budget: usize,
    pub cheapest_zone: Option<GroupStat>,
    /// Lowest average rent per sqft.
    pub best_value_area: Option<GroupStat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredReport {
    pub metadata: ReportMetadata,
    pub market_overview: MarketOverview,
    pub zones: Vec<ZoneAnalysis>,
    pub areas: Vec<AreaAnalysis>,
    pub price_tiers: Section<PriceTiers>,
    pub top_listings: TopListings,
    pub insights: Insights,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub structured: StructuredReport,
    /// Markdown rendering of `structured`.
    pub text: String,
}

pub struct ReportRenderer {
    top_n: usize,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

impl ReportRenderer {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn render(
        &self,
        snapshot: &AnalyticsSnapshot,
        records: &[TaggedListing],
        metadata: ReportMetadata,
    ) -> RenderedReport {
        let structured = StructuredReport {
            metadata,
            market_overview: MarketOverview {
                overview: snapshot.overview.clone(),
                rent: snapshot.rent.clone(),
                area_sqft: snapshot.area_sqft.clone(),
                avg_rent_per_sqft: snapshot.avg_rent_per_sqft,
            },
            zones: zone_analysis(records),
            areas: area_analysis(records),
            price_tiers: price_tiers(records, snapshot.avg_rent_per_sqft),
            top_listings: self.top_listings(records),
            insights: insights(records),
            recommendations: recommendations(records, snapshot),
        };
        let text = render_markdown(&structured);
        RenderedReport { structured, text }
    }

    fn top_listings(&self, records: &[TaggedListing]) -> TopListings {
        let query = |by, direction| {
            TopNQuery::builder()
                .by(by)
                .direction(direction)
                .n(self.top_n)
                .build()
        };
        TopListings {
            most_expensive: top_n(records, &query(MetricField::Rent, Direction::Descending)),
            largest: top_n(records, &query(MetricField::AreaSqft, Direction::Descending)),
            best_value: top_n(records, &query(MetricField::RentPerSqft, Direction::Ascending)),
        }
    }
}

fn zone_analysis(records: &[TaggedListing]) -> Vec<ZoneAnalysis> {
    Zone::ALL
        .into_iter()
        .filter_map(|zone| {
            let segment: Vec<&TaggedListing> = records.iter().filter(|r| r.zone() == zone).collect();
            (!segment.is_empty()).then(|| ZoneAnalysis {
                zone: zone.display_name().to_string(),
                slug: zone.slug().to_string(),
                stats: segment_stats(&segment, records.len()),
            })
        })
        .collect()
}

/// Areas ordered by listing count, ties in first-seen order.
fn area_analysis(records: &[TaggedListing]) -> Vec<AreaAnalysis> {
    ranked(cross_tab(records, GroupField::Area, MetricField::Rent))
        .into_iter()
        .map(|group| {
            let segment: Vec<&TaggedListing> =
                records.iter().filter(|r| r.area() == group.key).collect();
            AreaAnalysis {
                zone: segment
                    .first()
                    .map(|r| r.zone().display_name().to_string())
                    .unwrap_or_default(),
                stats: segment_stats(&segment, records.len()),
                area: group.key,
            }
        })
        .collect()
}

fn price_tiers(records: &[TaggedListing], avg: Option<f64>) -> Section<PriceTiers> {
    let Some(avg) = avg else {
        return Section::insufficient();
    };
    let priced: Vec<(f64, &TaggedListing)> = records
        .iter()
        .filter_map(|r| MetricField::RentPerSqft.value(r).map(|v| (v, r)))
        .collect();

    let premium_floor = avg * PREMIUM_FACTOR;
    let budget_ceiling = avg * BUDGET_FACTOR;
    let tier = |pred: &dyn Fn(f64) -> bool, min: Option<f64>, max: Option<f64>| {
        let segment: Vec<&TaggedListing> = priced
            .iter()
            .filter(|(v, _)| pred(*v))
            .map(|(_, r)| *r)
            .collect();
        Tier {
            min_rent_per_sqft: min.map(|v| analytics::round_to(v, 2)),
            max_rent_per_sqft: max.map(|v| analytics::round_to(v, 2)),
            stats: segment_stats(&segment, priced.len()),
        }
    };

    Section::Data(PriceTiers {
        avg_rent_per_sqft: analytics::round_to(avg, 2),
        premium: tier(&|v| v > premium_floor, Some(premium_floor), None),
        mid: tier(
            &|v| (budget_ceiling..=premium_floor).contains(&v),
            Some(budget_ceiling),
            Some(premium_floor),
        ),
        budget: tier(&|v| v < budget_ceiling, None, Some(budget_ceiling)),
    })
}

fn top_known(stats: Vec<GroupStat>) -> Option<GroupStat> {
    stats.into_iter().find(|g| g.key != UNKNOWN_GROUP)
}

fn insights(records: &[TaggedListing]) -> Insights {
    Insights {
        most_listed_zone: top_known(ranked(cross_tab(records, GroupField::Zone, MetricField::Rent))),
        most_common_bhk: top_known(ranked(cross_tab(records, GroupField::Bhk, MetricField::Rent))),
        most_common_furnishing: top_known(ranked(cross_tab(
            records,
            GroupField::Furnishing,
            MetricField::Rent,
        ))),
        priciest_zone: ranked_by_average(cross_tab(records, GroupField::Zone, MetricField::Rent))
            .into_iter()
            .find(|g| g.average.is_some()),
    }
}

/// Lowest average; ties go to the first group seen.
fn cheapest(stats: Vec<GroupStat>) -> Option<GroupStat> {
    stats
        .into_iter()
        .filter_map(|g| g.average.map(|avg| (avg, g)))
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, g)| g)
}

fn recommendations(records: &[TaggedListing], snapshot: &AnalyticsSnapshot) -> Recommendations {
    let budget_threshold = snapshot.rent.data().map(|d| d.quartiles.q1);
    Recommendations {
        budget_threshold,
        listings_within_budget: budget_threshold.map_or(0, |threshold| {
            records
                .iter()
                .filter(|r| MetricField::Rent.value(r).is_some_and(|rent| rent <= threshold))
                .count()
        }),
        cheapest_zone: cheapest(cross_tab(records, GroupField::Zone, MetricField::Rent)),
        best_value_area: cheapest(cross_tab(records, GroupField::Area, MetricField::RentPerSqft)),
    }
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Rupees with Indian digit grouping: 1250000 → "₹12,50,000".
pub fn format_rupees(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut parts: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 2 {
            parts.push(&head[end - 2..end]);
            end -= 2;
        }
        parts.push(&head[..end]);
        parts.reverse();
        format!("{},{tail}", parts.join(","))
    };
    let sign = if rounded < 0 { "-" } else { "" };
    format!("{sign}₹{grouped}")
}

fn rupees(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), format_rupees)
}

fn decimal(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn whole(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.0}"))
}

fn group_line(label: &str, group: &Option<GroupStat>, money: bool) -> String {
    match group {
        Some(g) if money => format!("- **{label}:** {} (avg {})\n", g.key, rupees(g.average)),
        Some(g) => format!("- **{label}:** {} ({} listings, {}%)\n", g.key, g.count, g.percentage),
        None => format!("- **{label}:** n/a\n"),
    }
}

fn listing_table(out: &mut String, title: &str, listings: &[DisplayListing]) {
    out.push_str(&format!("### {title}\n\n"));
    if listings.is_empty() {
        out.push_str("_No listings._\n\n");
        return;
    }
    out.push_str("| # | Title | Area | Rent | Sqft | Rent/sqft |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for (i, l) in listings.iter().enumerate() {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            i + 1,
            l.title.replace('|', "/"),
            l.area,
            rupees(l.rent),
            whole(l.area_sqft),
            decimal(l.rent_per_sqft)
        ));
    }
    out.push('\n');
}

fn distribution_block(out: &mut String, title: &str, section: &Section<Distribution>, money: bool) {
    out.push_str(&format!("### {title}\n\n"));
    let Some(d) = section.data() else {
        out.push_str(&format!("_{}._\n\n", analytics::INSUFFICIENT_DATA));
        return;
    };
    let fmt = |v: f64| if money { format_rupees(v) } else { format!("{v:.0}") };
    out.push_str(&format!("- Count: {}\n", d.count));
    out.push_str(&format!("- Min / Max: {} / {}\n", fmt(d.min), fmt(d.max)));
    out.push_str(&format!("- Mean: {}\n", fmt(d.mean)));
    out.push_str(&format!(
        "- Q1 / Median / Q3: {} / {} / {}\n",
        fmt(d.quartiles.q1),
        fmt(d.median),
        fmt(d.quartiles.q3)
    ));
    out.push('\n');
    if !d.histogram.is_empty() {
        out.push_str("| Range | Listings |\n|---|---|\n");
        for b in &d.histogram {
            out.push_str(&format!("| {} | {} |\n", b.label, b.count));
        }
        out.push('\n');
    }
}

fn segment_row(out: &mut String, name: &str, zone: Option<&str>, s: &SegmentStats) {
    let zone_cell = zone.map(|z| format!(" {z} |")).unwrap_or_default();
    out.push_str(&format!(
        "| {name} |{zone_cell} {} | {}% | {} | {} | {} | {} |\n",
        s.count,
        s.share,
        rupees(s.avg_rent),
        whole(s.avg_area_sqft),
        decimal(s.avg_rent_per_sqft),
        rupees(s.median_rent)
    ));
}

pub fn render_markdown(report: &StructuredReport) -> String {
    let m = &report.metadata;
    let mut out = String::new();

    out.push_str("# Mumbai Rental Market Report\n\n");
    out.push_str(&format!("- **Report ID:** {}\n", m.report_id));
    out.push_str(&format!(
        "- **Generated:** {}\n",
        m.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!("- **Strategy:** {} ({})\n", m.strategy, m.provider));
    out.push_str(&format!(
        "- **Areas:** {} attempted, {} succeeded, {} failed\n",
        m.areas_attempted, m.areas_succeeded, m.areas_failed
    ));
    out.push_str(&format!(
        "- **Listings:** {} extracted, {} after dedup, {} analyzed\n",
        m.raw_records, m.deduplicated_records, m.analyzed_records
    ));
    out.push_str(&format!(
        "- **Duration:** extraction {:.1}s, total {:.1}s\n\n",
        m.extraction_duration_ms as f64 / 1000.0,
        m.total_duration_ms as f64 / 1000.0
    ));

    out.push_str("## Market Overview\n\n");
    let mo = &report.market_overview;
    match mo.overview.data() {
        Some(ov) => {
            out.push_str(&format!(
                "{} listings across {} areas in {} zones. Average rent per sqft: {}.\n\n",
                ov.total,
                ov.areas,
                ov.zones,
                decimal(mo.avg_rent_per_sqft)
            ));
            out.push_str("| Field | Completeness |\n|---|---|\n");
            for f in &ov.completeness {
                out.push_str(&format!("| {} | {}% |\n", f.field, f.percent));
            }
            out.push('\n');
        }
        None => {
            out.push_str(&format!("_{}._\n\n", analytics::INSUFFICIENT_DATA));
        }
    }
    distribution_block(&mut out, "Rent Distribution", &mo.rent, true);
    distribution_block(&mut out, "Size Distribution (sqft)", &mo.area_sqft, false);

    out.push_str("## Zones\n\n");
    out.push_str("| Zone | Listings | Share | Avg rent | Avg sqft | Avg rent/sqft | Median rent |\n");
    out.push_str("|---|---|---|---|---|---|---|\n");
    for z in &report.zones {
        segment_row(&mut out, &z.zone, None, &z.stats);
    }
    out.push('\n');

    out.push_str("## Areas\n\n");
    out.push_str(
        "| Area | Zone | Listings | Share | Avg rent | Avg sqft | Avg rent/sqft | Median rent |\n",
    );
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for a in &report.areas {
        segment_row(&mut out, &a.area, Some(&a.zone), &a.stats);
    }
    out.push('\n');

    out.push_str("## Price Tiers\n\n");
    match report.price_tiers.data() {
        Some(t) => {
            out.push_str(&format!(
                "Tiers relative to the average rent per sqft of {:.2}.\n\n",
                t.avg_rent_per_sqft
            ));
            out.push_str("| Tier | Rent/sqft | Listings | Share | Avg rent |\n|---|---|---|---|---|\n");
            for (name, tier) in [("Premium", &t.premium), ("Mid", &t.mid), ("Budget", &t.budget)] {
                let range = match (tier.min_rent_per_sqft, tier.max_rent_per_sqft) {
                    (Some(lo), Some(hi)) => format!("{lo:.2}–{hi:.2}"),
                    (Some(lo), None) => format!("> {lo:.2}"),
                    (None, Some(hi)) => format!("< {hi:.2}"),
                    (None, None) => "n/a".to_string(),
                };
                out.push_str(&format!(
                    "| {name} | {range} | {} | {}% | {} |\n",
                    tier.stats.count,
                    tier.stats.share,
                    rupees(tier.stats.avg_rent)
                ));
            }
            out.push('\n');
        }
        None => {
            out.push_str(&format!("_{}._\n\n", analytics::INSUFFICIENT_DATA));
        }
    }

    out.push_str("## Top Listings\n\n");
    listing_table(&mut out, "Most Expensive", &report.top_listings.most_expensive);
    listing_table(&mut out, "Largest", &report.top_listings.largest);
    listing_table(&mut out, "Best Value (lowest rent/sqft)", &report.top_listings.best_value);

    out.push_str("## Insights\n\n");
    let i = &report.insights;
    out.push_str(&group_line("Most listed zone", &i.most_listed_zone, false));
    out.push_str(&group_line("Most common configuration", &i.most_common_bhk, false));
    out.push_str(&group_line("Most common furnishing", &i.most_common_furnishing, false));
    out.push_str(&group_line("Priciest zone", &i.priciest_zone, true));
    out.push('\n');

    out.push_str("## Recommendations\n\n");
    let r = &report.recommendations;
    match r.budget_threshold {
        Some(threshold) => {
            out.push_str(&format!(
                "- **Budget threshold:** {} ({} listings at or below)\n",
                format_rupees(threshold),
                r.listings_within_budget
            ));
        }
        None => out.push_str("- **Budget threshold:** n/a\n"),
    }
    out.push_str(&group_line("Cheapest zone", &r.cheapest_zone, true));
    match &r.best_value_area {
        Some(g) => {
            out.push_str(&format!(
                "- **Best value area:** {} ({} per sqft)\n",
                g.key,
                decimal(g.average)
            ));
        }
        None => out.push_str("- **Best value area:** n/a\n"),
    }

    out
}
