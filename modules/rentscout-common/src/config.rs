use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// Secrets and environment-specific values, loaded from environment variables.
/// Tunables live in the TOML `ScoutSettings`.
#[derive(Debug, Clone)]
pub struct Config {
    // Sources
    pub apify_api_key: Option<String>,
    pub google_places_api_key: Option<String>,

    // Object storage
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,

    /// Root data directory (`DATA_DIR`, default `"data"`).
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            apify_api_key: optional_env("APIFY_API_KEY"),
            google_places_api_key: optional_env("GOOGLE_PLACES_API_KEY"),
            s3_bucket: optional_env("RENTSCOUT_S3_BUCKET"),
            s3_prefix: env::var("RENTSCOUT_S3_PREFIX")
                .unwrap_or_else(|_| "rentscout/listings".to_string()),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
        }
    }

    /// Log which keys are configured without revealing them.
    pub fn log_redacted(&self) {
        fn preview(val: &Option<String>) -> String {
            match val {
                Some(v) => format!("{}...", v.chars().take(4).collect::<String>()),
                None => "(not set)".to_string(),
            }
        }

        info!(
            apify_api_key = %preview(&self.apify_api_key),
            google_places_api_key = %preview(&self.google_places_api_key),
            s3_bucket = self.s3_bucket.as_deref().unwrap_or("(not set)"),
            s3_prefix = %self.s3_prefix,
            data_dir = %self.data_dir.display(),
            "Configuration loaded"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// TOML settings
// ---------------------------------------------------------------------------

/// Tunables loaded from an optional TOML file. Every field has a default, so
/// an empty file (or no file) yields the stock configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoutSettings {
    pub extraction: ExtractionSettings,
    pub cleaning: CleaningSettings,
    pub export: ExportSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionSettings {
    /// Areas per sequential batch.
    pub batch_size: usize,
    /// Areas in flight at once inside a batch.
    pub concurrency: usize,
    pub batch_delay_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            concurrency: 3,
            batch_delay_ms: 3000,
            max_attempts: 2,
            retry_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleaningSettings {
    pub min_rent: f64,
    pub max_rent: f64,
    pub min_area_sqft: f64,
    pub max_area_sqft: f64,
    /// Whether the same flat found under two areas counts as one listing.
    pub dedupe_scope: KeyScope,
}

/// Which fields make two listings the same listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    /// `(title, rent, area_sqft, _area)`: the same flat seen in two areas is kept twice.
    #[default]
    AreaScoped,
    /// `(title, rent, area_sqft)`, for merging results across sources.
    AreaAgnostic,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            min_rent: 1_000.0,
            max_rent: 10_000_000.0,
            min_area_sqft: 50.0,
            max_area_sqft: 20_000.0,
            dedupe_scope: KeyScope::AreaScoped,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSettings {
    /// Output directory. Relative paths resolve against `DATA_DIR`.
    pub output_dir: PathBuf,
    /// Entries in each top-N ranking of the report.
    pub top_n: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSettings {
    /// S3 storage class, e.g. "STANDARD", "STANDARD_IA", "INTELLIGENT_TIERING".
    pub storage_class: String,
    /// Server-side encryption, e.g. "AES256" or "aws:kms".
    pub encryption: String,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            storage_class: "STANDARD".to_string(),
            encryption: "AES256".to_string(),
        }
    }
}

impl ScoutSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: ScoutSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let e = &self.extraction;
        if e.batch_size == 0 {
            anyhow::bail!("extraction.batch_size must be at least 1");
        }
        if e.concurrency == 0 {
            anyhow::bail!("extraction.concurrency must be at least 1");
        }
        if e.max_attempts == 0 {
            anyhow::bail!("extraction.max_attempts must be at least 1");
        }
        let c = &self.cleaning;
        if c.min_rent > c.max_rent || c.min_area_sqft > c.max_area_sqft {
            anyhow::bail!("cleaning ranges must have min <= max");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let settings = ScoutSettings::from_toml("").unwrap();
        assert_eq!(settings.extraction.batch_size, 5);
        assert_eq!(settings.extraction.concurrency, 3);
        assert_eq!(settings.extraction.batch_delay_ms, 3000);
        assert_eq!(settings.extraction.max_attempts, 2);
        assert_eq!(settings.extraction.retry_delay_ms, 5000);
        assert_eq!(settings.export.top_n, 10);
        assert_eq!(settings.cleaning.dedupe_scope, KeyScope::AreaScoped);
    }

    #[test]
    fn dedupe_scope_is_read_from_cleaning_section() {
        let settings =
            ScoutSettings::from_toml("[cleaning]\ndedupe_scope = \"area_agnostic\"\n").unwrap();
        assert_eq!(settings.cleaning.dedupe_scope, KeyScope::AreaAgnostic);
        assert!(ScoutSettings::from_toml("[cleaning]\ndedupe_scope = \"global\"\n").is_err());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings = ScoutSettings::from_toml(
            r#"
            [extraction]
            batch_size = 8

            [cleaning]
            max_rent = 500000.0
            "#,
        )
        .unwrap();
        assert_eq!(settings.extraction.batch_size, 8);
        assert_eq!(settings.extraction.concurrency, 3);
        assert_eq!(settings.cleaning.max_rent, 500000.0);
        assert_eq!(settings.cleaning.min_rent, 1000.0);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(ScoutSettings::from_toml("[extraction]\nbatchsize = 3\n").is_err());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(ScoutSettings::from_toml("[extraction]\nbatch_size = 0\n").is_err());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rentscout.toml");
        std::fs::write(&path, "[export]\ntop_n = 3\n").unwrap();
        let settings = ScoutSettings::load(&path).unwrap();
        assert_eq!(settings.export.top_n, 3);
    }
}
