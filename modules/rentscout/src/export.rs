use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use rentscout_common::{slugify, ScoutError, TaggedListing};

use crate::analytics::AnalyticsSnapshot;
use crate::report::{RenderedReport, StructuredReport};

pub const LISTINGS_JSON: &str = "listings.json";
pub const LISTINGS_CSV: &str = "listings.csv";
pub const CLEANED_JSON: &str = "cleaned_listings.json";
pub const ANALYTICS_JSON: &str = "analytics_report.json";
pub const REPORT_MD: &str = "report.md";
pub const RUN_SUMMARY_JSON: &str = "run_summary.json";

/// Write `bytes` to `path` through a temp file in the same directory, then
/// rename over the target. Readers never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScoutError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| ScoutError::Sink(format!("create {}: {e}", dir.display())))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| ScoutError::Sink(format!("temp file in {}: {e}", dir.display())))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| ScoutError::Sink(format!("write {}: {e}", path.display())))?;
    tmp.persist(path)
        .map_err(|e| ScoutError::Sink(format!("rename into {}: {}", path.display(), e.error)))?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ScoutError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// One CSV row. Provenance columns keep their JSON names.
#[derive(Serialize)]
struct CsvRow<'a> {
    id: Option<&'a str>,
    title: &'a str,
    address: &'a str,
    rent: Option<f64>,
    deposit: Option<f64>,
    #[serde(rename = "areaSqft")]
    area_sqft: Option<f64>,
    bhk: Option<&'a str>,
    furnishing: Option<&'a str>,
    #[serde(rename = "propertyType")]
    property_type: Option<&'a str>,
    owner: Option<&'a str>,
    images: String,
    url: Option<&'a str>,
    #[serde(rename = "_area")]
    area: &'a str,
    #[serde(rename = "_zone")]
    zone: &'static str,
    #[serde(rename = "_priority")]
    priority: String,
    #[serde(rename = "_extractedAt")]
    extracted_at: String,
}

impl<'a> From<&'a TaggedListing> for CsvRow<'a> {
    fn from(l: &'a TaggedListing) -> Self {
        let r = &l.record;
        Self {
            id: r.id.as_deref(),
            title: &r.title,
            address: &r.address,
            rent: r.rent,
            deposit: r.deposit,
            area_sqft: r.area_sqft,
            bhk: r.bhk.as_deref(),
            furnishing: r.furnishing.as_deref(),
            property_type: r.property_type.as_deref(),
            owner: r.owner.as_deref(),
            images: r.images.join(";"),
            url: r.url.as_deref(),
            area: l.area(),
            zone: l.zone().slug(),
            priority: l.provenance.priority.to_string(),
            extracted_at: l.provenance.extracted_at.to_rfc3339(),
        }
    }
}

pub fn listings_csv(records: &[TaggedListing]) -> Result<Vec<u8>, ScoutError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(CsvRow::from(record))
            .map_err(|e| ScoutError::Sink(format!("csv: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| ScoutError::Sink(format!("csv: {e}")))
}

/// Group by a key in first-seen order.
fn group_by<'a, K: PartialEq>(
    records: &'a [TaggedListing],
    key: impl Fn(&TaggedListing) -> K,
) -> Vec<(K, Vec<&'a TaggedListing>)> {
    let mut groups: Vec<(K, Vec<&TaggedListing>)> = Vec::new();
    for r in records {
        let k = key(r);
        match groups.iter_mut().find(|(g, _)| *g == k) {
            Some((_, members)) => members.push(r),
            None => groups.push((k, vec![r])),
        }
    }
    groups
}

#[derive(Serialize)]
struct AnalyticsDocument<'a> {
    report: &'a StructuredReport,
    analytics: &'a AnalyticsSnapshot,
}

/// Everything written for one run.
pub struct ExportBundle<'a> {
    /// Deduplicated extraction output.
    pub listings: &'a [TaggedListing],
    pub cleaned: &'a [TaggedListing],
    pub snapshot: &'a AnalyticsSnapshot,
    pub report: &'a RenderedReport,
}

/// Writes run artifacts under one output directory.
pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write every artifact except the run summary. Returns written paths.
    pub fn export(&self, bundle: &ExportBundle<'_>) -> Result<Vec<PathBuf>, ScoutError> {
        let mut written = Vec::new();
        let mut put = |name: PathBuf, bytes: Vec<u8>| -> Result<(), ScoutError> {
            let path = self.output_dir.join(name);
            write_atomic(&path, &bytes)?;
            written.push(path);
            Ok(())
        };

        put(LISTINGS_JSON.into(), serde_json::to_vec_pretty(bundle.listings)?)?;
        put(CLEANED_JSON.into(), serde_json::to_vec_pretty(bundle.cleaned)?)?;

        for (area, members) in group_by(bundle.listings, |r| r.area().to_string()) {
            put(
                Path::new("areas").join(format!("{}.json", slugify(&area))),
                serde_json::to_vec_pretty(&members)?,
            )?;
        }
        for (zone, members) in group_by(bundle.listings, |r| r.zone()) {
            put(
                Path::new("zones").join(format!("{}.json", zone.slug())),
                serde_json::to_vec_pretty(&members)?,
            )?;
        }

        let document = AnalyticsDocument {
            report: &bundle.report.structured,
            analytics: bundle.snapshot,
        };
        put(ANALYTICS_JSON.into(), serde_json::to_vec_pretty(&document)?)?;

        let csv_path = self.output_dir.join(LISTINGS_CSV);
        write_atomic(&csv_path, &listings_csv(bundle.listings)?)?;
        written.push(csv_path);

        let md_path = self.output_dir.join(REPORT_MD);
        write_atomic(&md_path, bundle.report.text.as_bytes())?;
        written.push(md_path);

        info!(
            dir = %self.output_dir.display(),
            files = written.len(),
            listings = bundle.listings.len(),
            "Exported run artifacts"
        );
        Ok(written)
    }

    pub fn write_run_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf, ScoutError> {
        let path = self.output_dir.join(RUN_SUMMARY_JSON);
        write_json(&path, summary)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::snapshot;
    use crate::report::{ReportMetadata, ReportRenderer};
    use crate::testing::{listing, tagged, tagged_in, test_area};
    use chrono::Utc;
    use rentscout_common::{Priority, Zone};
    use uuid::Uuid;

    fn metadata() -> ReportMetadata {
        ReportMetadata {
            report_id: Uuid::nil(),
            generated_at: Utc::now(),
            strategy: "all".into(),
            provider: "mock".into(),
            extraction_duration_ms: 0,
            total_duration_ms: 0,
            areas_attempted: 2,
            areas_succeeded: 2,
            areas_failed: 0,
            raw_records: 3,
            deduplicated_records: 3,
            analyzed_records: 3,
        }
    }

    #[test]
    fn atomic_write_replaces_target_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("out.json")]);
    }

    #[test]
    fn csv_has_header_and_provenance_columns() {
        let mut record = listing("Flat, with comma", 30000.0, 600.0);
        record.images = vec!["a.jpg".into(), "b.jpg".into()];
        let area = test_area("Dadar West", Zone::Central, Priority::High);
        let bytes = listings_csv(&[tagged(record, &area)]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("id,title,address,rent"));
        assert!(header.ends_with("_area,_zone,_priority,_extractedAt"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"Flat, with comma\""));
        assert!(row.contains("a.jpg;b.jpg"));
        assert!(row.contains("Dadar West,central,high"));
    }

    #[test]
    fn export_writes_every_artifact_grouped_by_area_and_zone() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            tagged_in("Bandra West", "A", 50000.0, 900.0),
            tagged_in("Khar West", "B", 40000.0, 700.0),
            tagged_in("Bandra West", "C", 45000.0, 800.0),
        ];
        let snap = snapshot(&records);
        let report = ReportRenderer::default().render(&snap, &records, metadata());
        let exporter = Exporter::new(dir.path());

        let written = exporter
            .export(&ExportBundle {
                listings: &records,
                cleaned: &records,
                snapshot: &snap,
                report: &report,
            })
            .unwrap();

        for name in [
            LISTINGS_JSON,
            LISTINGS_CSV,
            CLEANED_JSON,
            ANALYTICS_JSON,
            REPORT_MD,
            "areas/bandra-west.json",
            "areas/khar-west.json",
            "zones/west.json",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
        assert_eq!(written.len(), 8);

        let bandra: serde_json::Value = serde_json::from_slice(
            &std::fs::read(dir.path().join("areas/bandra-west.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(bandra.as_array().unwrap().len(), 2);
        assert_eq!(bandra[1]["title"], "C");

        let analytics: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.path().join(ANALYTICS_JSON)).unwrap())
                .unwrap();
        assert!(analytics["report"]["metadata"].is_object());
        assert_eq!(analytics["analytics"]["rent"]["count"], 3);

        let summary = exporter
            .write_run_summary(&serde_json::json!({"success": true}))
            .unwrap();
        assert!(summary.ends_with(RUN_SUMMARY_JSON));
    }
}
