use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use typed_builder::TypedBuilder;

use rentscout_common::{
    Area, AreaError, AreaResult, AreaStatus, ExtractionOutcome, ExtractionSettings, ScoutError,
    TaggedListing,
};

use crate::traits::{RecordParser, SourceFetcher};

const CANCELLED: &str = "cancelled";

/// Batching, fan-out and retry knobs for one extraction run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ExtractionOptions {
    /// Areas per sequential batch.
    #[builder(default = 5)]
    pub batch_size: usize,
    /// Areas in flight at once within a batch.
    #[builder(default = 3)]
    pub concurrency: usize,
    /// Pause between batches. Not applied after the last batch.
    #[builder(default = Duration::from_millis(3000))]
    pub batch_delay: Duration,
    /// Total attempts per area, including the first.
    #[builder(default = 2)]
    pub max_attempts: u32,
    #[builder(default = Duration::from_secs(5))]
    pub retry_delay: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&ExtractionSettings> for ExtractionOptions {
    fn from(s: &ExtractionSettings) -> Self {
        Self::builder()
            .batch_size(s.batch_size)
            .concurrency(s.concurrency)
            .batch_delay(Duration::from_millis(s.batch_delay_ms))
            .max_attempts(s.max_attempts)
            .retry_delay(Duration::from_millis(s.retry_delay_ms))
            .build()
    }
}

/// Terminal state of one area plus the records of its successful attempt.
struct AreaRun {
    result: AreaResult,
    records: Vec<TaggedListing>,
}

impl AreaRun {
    fn succeeded(area: &Area, records: Vec<TaggedListing>, attempts: u32) -> Self {
        Self {
            result: AreaResult {
                area: area.name.clone(),
                zone: area.zone,
                priority: area.priority,
                status: AreaStatus::Success,
                property_count: records.len(),
                error: None,
                attempts,
                extracted_at: Utc::now(),
            },
            records,
        }
    }

    fn failed(area: &Area, error: String, attempts: u32) -> Self {
        Self {
            result: AreaResult {
                area: area.name.clone(),
                zone: area.zone,
                priority: area.priority,
                status: AreaStatus::Failed,
                property_count: 0,
                error: Some(error),
                attempts,
                extracted_at: Utc::now(),
            },
            records: Vec::new(),
        }
    }
}

/// Drives the fetch → parse → tag sequence over a resolved area set in
/// sequential batches, with bounded retries per area.
///
/// Area failures never surface as errors; they are recorded in the
/// returned [`ExtractionOutcome`].
pub struct ExtractionOrchestrator {
    fetcher: Arc<dyn SourceFetcher>,
    parser: Arc<dyn RecordParser>,
    options: ExtractionOptions,
    cancel: CancellationToken,
}

impl ExtractionOrchestrator {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        parser: Arc<dyn RecordParser>,
        options: ExtractionOptions,
    ) -> Self {
        Self {
            fetcher,
            parser,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, areas: &[&Area]) -> ExtractionOutcome {
        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let concurrency = self.options.concurrency.max(1);
        let total_batches = areas.len().div_ceil(batch_size);

        info!(
            areas = areas.len(),
            batches = total_batches,
            batch_size,
            concurrency,
            fetcher = self.fetcher.name(),
            "Starting extraction"
        );

        let mut outcome = ExtractionOutcome::default();

        for (index, batch) in areas.chunks(batch_size).enumerate() {
            info!(
                batch = index + 1,
                total_batches,
                areas = batch.len(),
                "Processing batch"
            );

            let mut runs: Vec<(usize, AreaRun)> = stream::iter(batch.iter().enumerate().map(
                |(position, area)| async move { (position, self.extract_area(area).await) },
            ))
            .buffer_unordered(concurrency)
            .collect()
            .await;

            // Append in resolved order so output is stable across runs.
            runs.sort_by_key(|(position, _)| *position);
            for (_, run) in runs {
                absorb(&mut outcome, run);
            }

            let is_last = index + 1 == total_batches;
            if !is_last && !self.options.batch_delay.is_zero() {
                info!(
                    delay_ms = self.options.batch_delay.as_millis() as u64,
                    "Waiting before next batch"
                );
                self.pause(self.options.batch_delay).await;
            }
        }

        outcome.success = outcome.succeeded_areas() > 0;

        info!(
            succeeded = outcome.succeeded_areas(),
            failed = outcome.failed_areas(),
            records = outcome.records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Extraction complete"
        );

        outcome
    }

    async fn extract_area(&self, area: &Area) -> AreaRun {
        let span = info_span!("area", area = %area.name, zone = area.zone.slug());
        async {
            let max_attempts = self.options.max_attempts.max(1);
            let mut attempts = 0u32;
            let mut last_error = String::new();

            while attempts < max_attempts {
                if self.cancel.is_cancelled() {
                    last_error = CANCELLED.to_string();
                    break;
                }
                if attempts > 0 {
                    info!(
                        attempt = attempts + 1,
                        max_attempts,
                        delay_ms = self.options.retry_delay.as_millis() as u64,
                        "Retrying area after delay"
                    );
                    if !self.pause(self.options.retry_delay).await {
                        last_error = CANCELLED.to_string();
                        break;
                    }
                }

                attempts += 1;
                match self.attempt(area).await {
                    Ok(records) => {
                        info!(attempts, records = records.len(), "Area extracted");
                        return AreaRun::succeeded(area, records, attempts);
                    }
                    Err(e) => {
                        warn!(attempt = attempts, max_attempts, error = %e, "Area attempt failed");
                        last_error = e.to_string();
                    }
                }
            }

            warn!(attempts, error = %last_error, "Area failed");
            AreaRun::failed(area, last_error, attempts)
        }
        .instrument(span)
        .await
    }

    /// One fetch → parse → tag pass. Records are only kept by the caller
    /// when the whole pass succeeds.
    async fn attempt(&self, area: &Area) -> Result<Vec<TaggedListing>, ScoutError> {
        let content = self.fetcher.fetch(&area.query_token).await?;
        let records = self.parser.parse(&content, area)?;
        let extracted_at = Utc::now();
        Ok(records
            .into_iter()
            .map(|record| TaggedListing::tag(record, area, extracted_at))
            .collect())
    }

    /// Sleep for `delay` unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

fn absorb(outcome: &mut ExtractionOutcome, run: AreaRun) {
    let AreaRun { result, records } = run;
    if let Some(error) = &result.error {
        outcome.errors.push(AreaError {
            area: result.area.clone(),
            error: error.clone(),
            attempts: result.attempts,
        });
    }
    outcome.records.extend(records);
    outcome.area_results.insert(result.area.clone(), result);
}
