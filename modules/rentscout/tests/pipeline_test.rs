//! Integration test: full pipeline run against mocks, writing to a temp dir.

use std::sync::Arc;
use std::time::Duration;

use rentscout::catalog::{AreaCatalog, Strategy};
use rentscout::export::{
    CLEANED_JSON, LISTINGS_CSV, LISTINGS_JSON, REPORT_MD, RUN_SUMMARY_JSON,
};
use rentscout::orchestrator::ExtractionOptions;
use rentscout::pipeline::Pipeline;
use rentscout::storage::VersionedUploader;
use rentscout::testing::{json_listings, listing, test_area, InMemoryObjectStore, MockFetcher, MockParser};
use rentscout_common::{
    CleaningSettings, KeyScope, ListingRecord, Priority, ScoutError, UploadSettings, Zone,
};

fn catalog() -> AreaCatalog {
    AreaCatalog::new(vec![
        test_area("Bandra West", Zone::West, Priority::High),
        test_area("Khar West", Zone::West, Priority::Medium),
        test_area("Powai", Zone::East, Priority::High),
        test_area("Colaba", Zone::South, Priority::High),
    ])
}

fn fast() -> ExtractionOptions {
    ExtractionOptions::builder()
        .batch_delay(Duration::ZERO)
        .retry_delay(Duration::ZERO)
        .build()
}

fn fetcher() -> MockFetcher {
    let sea_view = listing("Sea View 2BHK", 60000.0, 900.0);
    let mut no_rent = listing("Price on request", 1.0, 700.0);
    no_rent.rent = None;
    MockFetcher::new()
        .on_query(
            "bandra-west",
            json_listings(&[
                sea_view.clone(),
                sea_view.clone(),
                listing("Pali Hill 3BHK", 150000.0, 1600.0),
                no_rent,
            ]),
        )
        .on_query("khar-west", json_listings(&[sea_view]))
        .on_query(
            "powai",
            json_listings(&[
                listing("Lake View 1BHK", 35000.0, 550.0),
                listing("Hiranandani 2BHK", 52000.0, 950.0),
            ]),
        )
    // Colaba is unregistered and fails.
}

#[tokio::test]
async fn run_extracts_dedupes_cleans_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("run");
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(fetcher()))
        .parser(Arc::new(MockParser))
        .output_dir(out.clone())
        .options(fast())
        .build();

    let summary = pipeline.run(Strategy::All).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.areas_attempted, 4);
    assert_eq!(summary.areas_succeeded, 3);
    assert_eq!(summary.areas_failed, 1);
    assert_eq!(summary.errors[0].area, "Colaba");

    // 4 + 1 + 2 raw; the repeated Bandra listing collapses, the Khar copy stays.
    assert_eq!(summary.records_extracted, 7);
    assert_eq!(summary.dedup.kept, 6);
    assert_eq!(summary.dedup.removed, 1);
    assert_eq!(summary.cleaning.kept, 5);
    assert_eq!(summary.cleaning.by_reason["missing_rent"], 1);

    for name in [LISTINGS_JSON, LISTINGS_CSV, REPORT_MD, RUN_SUMMARY_JSON, "zones/west.json"] {
        assert!(out.join(name).exists(), "missing {name}");
    }

    let exported: Vec<serde_json::Value> =
        serde_json::from_slice(&std::fs::read(out.join(LISTINGS_JSON)).unwrap()).unwrap();
    assert_eq!(exported.len(), 6);
    assert!(exported.iter().all(|r| r["_area"].is_string() && r["_zone"].is_string()));

    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join(RUN_SUMMARY_JSON)).unwrap()).unwrap();
    assert_eq!(on_disk["success"], true);
    assert_eq!(on_disk["area_results"]["Colaba"]["status"], "failed");

    let report = std::fs::read_to_string(out.join(REPORT_MD)).unwrap();
    assert!(report.contains("Bandra West"));
    assert!(summary.to_string().contains("Areas failed:      1"));
}

#[tokio::test]
async fn strategy_with_no_areas_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(fetcher()))
        .parser(Arc::new(MockParser))
        .output_dir(dir.path().to_path_buf())
        .options(fast())
        .build();

    let err = pipeline.run(Strategy::Zone(Zone::Navi)).await.unwrap_err();
    assert!(matches!(err, ScoutError::Fatal(_)));
}

#[tokio::test]
async fn all_areas_failing_reports_unsuccessful_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(MockFetcher::new()))
        .parser(Arc::new(MockParser))
        .output_dir(dir.path().join("run"))
        .options(fast())
        .build();

    let summary = pipeline.run(Strategy::HighPriority).await.unwrap();

    assert!(!summary.success);
    assert_eq!(summary.areas_failed, 3);
    assert_eq!(summary.cleaning.kept, 0);
    // Empty exports still land on disk with insufficient-data sections.
    let report = std::fs::read_to_string(dir.path().join("run").join(REPORT_MD)).unwrap();
    assert!(report.contains("insufficient data"));
}

#[tokio::test]
async fn upload_archives_run_directory_under_next_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::new().with_keys(&["archive/v1.0.0/listings.json"]));
    let uploader = VersionedUploader::new(store.clone(), "archive", UploadSettings::default());
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(fetcher()))
        .parser(Arc::new(MockParser))
        .output_dir(dir.path().join("run"))
        .options(fast())
        .uploader(Some(uploader))
        .build();

    let summary = pipeline.run(Strategy::Zone(Zone::East)).await.unwrap();

    let upload = summary.upload.as_ref().unwrap();
    assert!(upload.success, "{:?}", upload.error);
    assert_eq!(upload.version.as_deref(), Some("v1.1.0"));
    assert_eq!(upload.files_uploaded, upload.total_files);
    assert!(store.get("archive/v1.1.0/listings.json").is_some());
    assert!(store.get("archive/v1.1.0/run_summary.json").is_some());

    let listings: Vec<ListingRecord> = serde_json::from_slice(
        &store.get("archive/v1.1.0/listings.json").unwrap().body,
    )
    .unwrap();
    assert_eq!(listings.len(), 2);
}

#[tokio::test]
async fn listings_differing_only_in_markup_collapse_before_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MockFetcher::new().on_query(
        "bandra-west",
        json_listings(&[
            listing("Sea View 2BHK", 45000.0, 850.0),
            listing("**Sea View 2BHK**", 45000.0, 850.0),
            listing("  Sea  View 2BHK ,", 45000.0, 850.0),
        ]),
    );
    let pipeline = Pipeline::builder()
        .catalog(AreaCatalog::new(vec![test_area("Bandra West", Zone::West, Priority::High)]))
        .fetcher(Arc::new(fetcher))
        .parser(Arc::new(MockParser))
        .output_dir(dir.path().join("run"))
        .options(fast())
        .build();

    let summary = pipeline.run(Strategy::All).await.unwrap();

    assert_eq!(summary.records_extracted, 3);
    assert_eq!(summary.dedup.removed, 2);
    assert_eq!(summary.cleaning.kept, 1);

    let cleaned: Vec<ListingRecord> = serde_json::from_slice(
        &std::fs::read(dir.path().join("run").join(CLEANED_JSON)).unwrap(),
    )
    .unwrap();
    let titles: Vec<_> = cleaned.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Sea View 2BHK"]);
}

#[tokio::test]
async fn area_agnostic_scope_merges_the_same_flat_across_areas() {
    let dir = tempfile::tempdir().unwrap();
    let cleaning = CleaningSettings {
        dedupe_scope: KeyScope::AreaAgnostic,
        ..Default::default()
    };
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(fetcher()))
        .parser(Arc::new(MockParser))
        .output_dir(dir.path().join("run"))
        .options(fast())
        .cleaning(cleaning)
        .build();

    let summary = pipeline.run(Strategy::Zone(Zone::West)).await.unwrap();

    // 4 Bandra + 1 Khar; the Khar copy of Sea View now collapses too.
    assert_eq!(summary.records_extracted, 5);
    assert_eq!(summary.dedup.kept, 3);
    assert_eq!(summary.dedup.removed, 2);
}

#[tokio::test]
async fn export_failure_marks_run_unsuccessful() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the output directory should go.
    let occupied = dir.path().join("run");
    std::fs::write(&occupied, "not a directory").unwrap();
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(fetcher()))
        .parser(Arc::new(MockParser))
        .output_dir(occupied)
        .options(fast())
        .build();

    let summary = pipeline.run(Strategy::Zone(Zone::East)).await.unwrap();

    assert_eq!(summary.areas_succeeded, 1);
    assert!(!summary.success);
    assert!(!summary.sink_errors.is_empty());
    assert!(summary.files_written.is_empty());
}

#[tokio::test]
async fn failed_upload_marks_run_unsuccessful() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryObjectStore::new().failing_on("report.md"));
    let uploader = VersionedUploader::new(store, "archive", UploadSettings::default());
    let out = dir.path().join("run");
    let pipeline = Pipeline::builder()
        .catalog(catalog())
        .fetcher(Arc::new(fetcher()))
        .parser(Arc::new(MockParser))
        .output_dir(out.clone())
        .options(fast())
        .uploader(Some(uploader))
        .build();

    let summary = pipeline.run(Strategy::Zone(Zone::East)).await.unwrap();

    assert!(!summary.upload.as_ref().unwrap().success);
    assert!(!summary.success);
    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join(RUN_SUMMARY_JSON)).unwrap()).unwrap();
    assert_eq!(on_disk["success"], false);
}
