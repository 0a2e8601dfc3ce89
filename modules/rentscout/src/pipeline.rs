use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use rentscout_common::{
    AreaError, AreaResult, AreaStatus, CleaningSettings, ExtractionOutcome, ScoutError,
};

use crate::analytics;
use crate::catalog::{AreaCatalog, Strategy};
use crate::cleaning::{self, CleaningReport};
use crate::dedup::{self, DedupStats};
use crate::export::{ExportBundle, Exporter};
use crate::orchestrator::{ExtractionOptions, ExtractionOrchestrator};
use crate::report::{ReportMetadata, ReportRenderer};
use crate::storage::{UploadResult, VersionedUploader};
use crate::traits::{RecordParser, SourceFetcher};

/// Everything one run produced, written to `run_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub strategy: String,
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extraction_duration_ms: u64,
    pub total_duration_ms: u64,
    pub areas_attempted: usize,
    pub areas_succeeded: usize,
    pub areas_failed: usize,
    pub area_results: BTreeMap<String, AreaResult>,
    pub errors: Vec<AreaError>,
    pub records_extracted: usize,
    pub dedup: DedupStats,
    pub cleaning: CleaningReport,
    pub output_dir: PathBuf,
    pub files_written: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sink_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadResult>,
    /// True when at least one area succeeded, every file was written and
    /// the upload (if any) completed.
    pub success: bool,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== RentScout Run Complete ===")?;
        writeln!(f, "Run:               {}", self.run_id)?;
        writeln!(f, "Strategy:          {} ({})", self.strategy, self.provider)?;
        writeln!(f, "Areas attempted:   {}", self.areas_attempted)?;
        writeln!(f, "Areas succeeded:   {}", self.areas_succeeded)?;
        writeln!(f, "Areas failed:      {}", self.areas_failed)?;
        writeln!(f, "Listings raw:      {}", self.records_extracted)?;
        writeln!(f, "Listings deduped:  {} ({} removed)", self.dedup.kept, self.dedup.removed)?;
        writeln!(
            f,
            "Listings analyzed: {} ({} dropped)",
            self.cleaning.kept,
            self.cleaning.dropped.len()
        )?;
        writeln!(
            f,
            "Duration:          {:.1}s (extraction {:.1}s)",
            self.total_duration_ms as f64 / 1000.0,
            self.extraction_duration_ms as f64 / 1000.0
        )?;
        writeln!(f, "Output:            {}", self.output_dir.display())?;
        if let Some(upload) = &self.upload {
            match (&upload.location, upload.success) {
                (Some(location), true) => writeln!(f, "Uploaded:          {location}")?,
                _ => writeln!(
                    f,
                    "Upload failed:     {}",
                    upload.error.as_deref().unwrap_or("unknown error")
                )?,
            }
        }
        if !self.errors.is_empty() {
            writeln!(f, "\nFailed areas:")?;
            for e in &self.errors {
                writeln!(f, "  {} ({} attempts): {}", e.area, e.attempts, e.error)?;
            }
        }
        for e in &self.sink_errors {
            writeln!(f, "Sink error: {e}")?;
        }
        Ok(())
    }
}

/// extract → normalize → dedupe → validate → analyze → report → export → upload.
#[derive(TypedBuilder)]
pub struct Pipeline {
    catalog: AreaCatalog,
    fetcher: Arc<dyn SourceFetcher>,
    parser: Arc<dyn RecordParser>,
    output_dir: PathBuf,
    #[builder(default)]
    options: ExtractionOptions,
    #[builder(default)]
    cleaning: CleaningSettings,
    #[builder(default = 10)]
    top_n: usize,
    #[builder(default)]
    uploader: Option<VersionedUploader>,
    #[builder(default)]
    cancel: CancellationToken,
}

impl Pipeline {
    /// Run every stage for `strategy`. Only an empty area set is fatal;
    /// area, export and upload failures are reported in the summary.
    pub async fn run(&self, strategy: Strategy) -> Result<RunSummary, ScoutError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let areas = self.catalog.resolve_extraction_set(strategy);
        if areas.is_empty() {
            return Err(ScoutError::Fatal(format!(
                "strategy '{strategy}' resolved to no areas"
            )));
        }
        info!(%run_id, %strategy, areas = areas.len(), "Starting run");

        let orchestrator =
            ExtractionOrchestrator::new(self.fetcher.clone(), self.parser.clone(), self.options.clone())
                .with_cancellation(self.cancel.clone());
        let ExtractionOutcome {
            records,
            area_results,
            errors,
            success,
        } = orchestrator.run(&areas).await;
        let extraction_duration_ms = started.elapsed().as_millis() as u64;

        let records_extracted = records.len();
        let normalized: Vec<_> = records.into_iter().map(cleaning::normalize_listing).collect();
        let (deduped, dedup_stats) = dedup::dedupe(normalized, self.cleaning.dedupe_scope);
        let (cleaned, cleaning_report) = cleaning::clean(deduped.clone(), &self.cleaning);
        let snapshot = analytics::snapshot(&cleaned);

        let areas_succeeded = area_results
            .values()
            .filter(|r| r.status == AreaStatus::Success)
            .count();
        let metadata = ReportMetadata {
            report_id: run_id,
            generated_at: Utc::now(),
            strategy: strategy.to_string(),
            provider: self.fetcher.name().to_string(),
            extraction_duration_ms,
            total_duration_ms: started.elapsed().as_millis() as u64,
            areas_attempted: areas.len(),
            areas_succeeded,
            areas_failed: areas.len() - areas_succeeded,
            raw_records: records_extracted,
            deduplicated_records: deduped.len(),
            analyzed_records: cleaned.len(),
        };
        let report = ReportRenderer::new(self.top_n).render(&snapshot, &cleaned, metadata);

        let exporter = Exporter::new(&self.output_dir);
        let mut sink_errors = Vec::new();
        let files_written = match exporter.export(&ExportBundle {
            listings: &deduped,
            cleaned: &cleaned,
            snapshot: &snapshot,
            report: &report,
        }) {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, dir = %self.output_dir.display(), "Export failed");
                sink_errors.push(e.to_string());
                Vec::new()
            }
        };

        let mut summary = RunSummary {
            run_id,
            strategy: strategy.to_string(),
            provider: self.fetcher.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            extraction_duration_ms,
            total_duration_ms: started.elapsed().as_millis() as u64,
            areas_attempted: areas.len(),
            areas_succeeded,
            areas_failed: areas.len() - areas_succeeded,
            area_results,
            errors,
            records_extracted,
            dedup: dedup_stats,
            cleaning: cleaning_report,
            output_dir: self.output_dir.clone(),
            files_written,
            sink_errors,
            upload: None,
            success,
        };
        self.write_summary(&exporter, &mut summary);

        if let Some(uploader) = &self.uploader {
            if summary.sink_errors.is_empty() {
                let upload = uploader.upload_directory(&self.output_dir).await;
                if let Some(e) = &upload.error {
                    warn!(error = %e, "Upload incomplete");
                }
                summary.upload = Some(upload);
                summary.finished_at = Utc::now();
                summary.total_duration_ms = started.elapsed().as_millis() as u64;
                self.write_summary(&exporter, &mut summary);
            } else {
                warn!("Skipping upload after export failure");
            }
        }

        let delivered = summary.sink_errors.is_empty()
            && summary.upload.as_ref().map_or(true, |u| u.success);
        if success && !delivered {
            summary.success = false;
            // After a failed upload the directory is still writable.
            if summary.sink_errors.is_empty() {
                self.write_summary(&exporter, &mut summary);
            }
        }

        info!(
            %run_id,
            success = summary.success,
            succeeded = summary.areas_succeeded,
            failed = summary.areas_failed,
            listings = summary.cleaning.kept,
            "Run complete"
        );
        Ok(summary)
    }

    fn write_summary(&self, exporter: &Exporter, summary: &mut RunSummary) {
        match exporter.write_run_summary(&*summary) {
            Ok(path) => {
                if !summary.files_written.contains(&path) {
                    summary.files_written.push(path);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to write run summary");
                summary.sink_errors.push(e.to_string());
            }
        }
    }
}
