//! Versioned archiving of run artifacts to S3-compatible object storage.
//!
//! Every upload lands under `<prefix>/v<major>.<minor>.<patch>/`. The next
//! version is a minor bump of the highest version already under the prefix,
//! or `v1.0.0` for an empty prefix. Failed uploads are reported, never
//! rolled back.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ServerSideEncryption, StorageClass};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use rentscout_common::{ScoutError, UploadSettings};

use crate::traits::{ObjectStore, PutOptions};

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Client from the standard AWS environment (credentials chain, region,
    /// `AWS_ENDPOINT_URL`).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, options: &PutOptions) -> Result<(), ScoutError> {
        let metadata: HashMap<String, String> = options
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_metadata(Some(metadata));
        if !options.content_type.is_empty() {
            request = request.content_type(&options.content_type);
        }
        if !options.storage_class.is_empty() {
            request = request.storage_class(StorageClass::from(options.storage_class.as_str()));
        }
        if !options.encryption.is_empty() {
            request = request
                .server_side_encryption(ServerSideEncryption::from(options.encryption.as_str()));
        }

        request
            .send()
            .await
            .map_err(|e| ScoutError::Sink(format!("put s3://{}/{key}: {}", self.bucket, DisplayErrorContext(&e))))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, ScoutError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    ScoutError::Sink(format!(
                        "list s3://{}/{prefix}: {}",
                        self.bucket,
                        DisplayErrorContext(&e)
                    ))
                })?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{key}", self.bucket)
    }
}

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const INITIAL: Version = Version {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// Parse `v1.2.3` (the leading `v` is optional).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.strip_prefix('v').unwrap_or(s).split('.');
        let version = Version {
            major: parts.next()?.parse().ok()?,
            minor: parts.next()?.parse().ok()?,
            patch: parts.next()?.parse().ok()?,
        };
        parts.next().is_none().then_some(version)
    }

    /// Version directory of `key` directly under `prefix`.
    pub fn from_key(prefix: &str, key: &str) -> Option<Self> {
        let rest = key.strip_prefix(prefix)?.trim_start_matches('/');
        let (segment, _) = rest.split_once('/')?;
        Self::parse(segment)
    }

    pub fn next_minor(&self) -> Self {
        Version {
            major: self.major,
            minor: self.minor + 1,
            patch: 0,
        }
    }

    /// Minor bump of the highest version among `keys`, or `INITIAL`.
    pub fn next_for(prefix: &str, keys: &[String]) -> Self {
        keys.iter()
            .filter_map(|k| Self::from_key(prefix, k))
            .max()
            .map_or(Self::INITIAL, |v| v.next_minor())
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ---------------------------------------------------------------------------
// Uploader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub location: Option<String>,
    pub version: Option<String>,
    pub files_uploaded: usize,
    pub total_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    fn failed(error: &ScoutError, total_files: usize) -> Self {
        Self {
            total_files,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("md") => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// Files under `dir`, recursively, sorted by relative path.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, ScoutError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| ScoutError::Sink(format!("read {}: {e}", current.display())))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub struct VersionedUploader {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    settings: UploadSettings,
}

impl VersionedUploader {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, settings: UploadSettings) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            settings,
        }
    }

    pub async fn next_version(&self) -> Result<Version, ScoutError> {
        let keys = self.store.list_keys(&format!("{}/", self.prefix)).await?;
        Ok(Version::next_for(&self.prefix, &keys))
    }

    fn put_options(&self, path: &Path, content_hash: &str, object_hash: String) -> PutOptions {
        PutOptions {
            content_type: content_type(path).to_string(),
            storage_class: self.settings.storage_class.clone(),
            encryption: self.settings.encryption.clone(),
            metadata: BTreeMap::from([
                ("content-hash".to_string(), content_hash.to_string()),
                ("object-hash".to_string(), object_hash),
            ]),
        }
    }

    /// Upload every file under `dir` as one new version. `content-hash` is
    /// the SHA-256 of all file bytes concatenated in key order.
    pub async fn upload_directory(&self, dir: &Path) -> UploadResult {
        let files = match collect_files(dir) {
            Ok(files) => files,
            Err(e) => return UploadResult::failed(&e, 0),
        };
        let mut payload = Vec::with_capacity(files.len());
        for path in &files {
            match tokio::fs::read(path).await {
                Ok(bytes) => payload.push((relative_key(dir, path), path.as_path(), bytes)),
                Err(e) => return UploadResult::failed(&e.into(), files.len()),
            }
        }
        self.upload(payload).await
    }

    pub async fn upload_single_file(&self, path: &Path) -> UploadResult {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return UploadResult::failed(&e.into(), 1),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.upload(vec![(name, path, bytes)]).await
    }

    async fn upload(&self, payload: Vec<(String, &Path, Vec<u8>)>) -> UploadResult {
        let total_files = payload.len();
        let version = match self.next_version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, prefix = %self.prefix, "Could not resolve upload version");
                return UploadResult::failed(&e, total_files);
            }
        };
        let base = format!("{}/{version}", self.prefix);

        let mut hasher = Sha256::new();
        for (_, _, bytes) in &payload {
            hasher.update(bytes);
        }
        let content_hash = hex::encode(hasher.finalize());

        let mut result = UploadResult {
            location: Some(self.store.location(&format!("{base}/"))),
            version: Some(version.to_string()),
            total_files,
            ..Default::default()
        };

        for (relative, path, bytes) in payload {
            let key = format!("{base}/{relative}");
            let options = self.put_options(path, &content_hash, sha256_hex(&bytes));
            if let Err(e) = self.store.put(&key, bytes, &options).await {
                warn!(key, error = %e, "Upload failed");
                result.error = Some(e.to_string());
                return result;
            }
            result.files_uploaded += 1;
        }

        result.success = true;
        info!(
            version = %version,
            files = result.files_uploaded,
            location = result.location.as_deref().unwrap_or_default(),
            "Uploaded run artifacts"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryObjectStore;

    fn uploader(store: Arc<InMemoryObjectStore>) -> VersionedUploader {
        VersionedUploader::new(store, "rentscout/listings/", UploadSettings::default())
    }

    #[test]
    fn versions_parse_and_order() {
        assert_eq!(
            Version::parse("v1.10.2"),
            Some(Version { major: 1, minor: 10, patch: 2 })
        );
        assert_eq!(Version::parse("1.0"), None);
        assert_eq!(Version::parse("v1.0.0.1"), None);
        assert!(Version::parse("v1.10.0") > Version::parse("v1.9.3"));
        assert_eq!(Version::INITIAL.to_string(), "v1.0.0");
    }

    #[test]
    fn next_version_bumps_highest_minor() {
        let keys = vec![
            "p/v1.2.0/listings.json".to_string(),
            "p/v1.10.3/listings.json".to_string(),
            "p/v1.9.0/report.md".to_string(),
            "p/notes.txt".to_string(),
        ];
        assert_eq!(Version::next_for("p", &keys).to_string(), "v1.11.0");
        assert_eq!(Version::next_for("p", &[]), Version::INITIAL);
        assert_eq!(
            Version::from_key("p", "other/v2.0.0/x.json"),
            None
        );
    }

    #[tokio::test]
    async fn upload_directory_writes_under_next_version_with_hashes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("listings.json"), b"[]").unwrap();
        std::fs::create_dir(dir.path().join("areas")).unwrap();
        std::fs::write(dir.path().join("areas").join("powai.json"), b"[1]").unwrap();

        let store = Arc::new(
            InMemoryObjectStore::new().with_keys(&["rentscout/listings/v1.3.0/listings.json"]),
        );
        let result = uploader(store.clone()).upload_directory(dir.path()).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.version.as_deref(), Some("v1.4.0"));
        assert_eq!(result.files_uploaded, 2);
        assert_eq!(result.total_files, 2);
        assert_eq!(
            result.location.as_deref(),
            Some("memory://rentscout/listings/v1.4.0/")
        );

        let listings = store.get("rentscout/listings/v1.4.0/listings.json").unwrap();
        let nested = store.get("rentscout/listings/v1.4.0/areas/powai.json").unwrap();
        // areas/powai.json sorts before listings.json
        let expected = sha256_hex(b"[1][]");
        assert_eq!(listings.options.metadata["content-hash"], expected);
        assert_eq!(nested.options.metadata["content-hash"], expected);
        assert_eq!(listings.options.metadata["object-hash"], sha256_hex(b"[]"));
        assert_eq!(listings.options.content_type, "application/json");
        assert_eq!(listings.options.storage_class, "STANDARD");
        assert_eq!(listings.options.encryption, "AES256");
    }

    #[tokio::test]
    async fn first_upload_starts_at_initial_version() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.md");
        std::fs::write(&file, "# Report").unwrap();
        let store = Arc::new(InMemoryObjectStore::new());

        let result = uploader(store.clone()).upload_single_file(&file).await;

        assert!(result.success);
        assert_eq!(result.version.as_deref(), Some("v1.0.0"));
        let object = store.get("rentscout/listings/v1.0.0/report.md").unwrap();
        assert_eq!(object.body, b"# Report");
        assert_eq!(object.options.content_type, "text/markdown");
    }

    #[tokio::test]
    async fn failed_put_is_reported_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("b.json"), b"{}").unwrap();
        let store = Arc::new(InMemoryObjectStore::new().failing_on("b.json"));

        let result = uploader(store.clone()).upload_directory(dir.path()).await;

        assert!(!result.success);
        assert_eq!(result.files_uploaded, 1);
        assert_eq!(result.total_files, 2);
        assert!(result.error.unwrap().contains("b.json"));
        assert!(store.get("rentscout/listings/v1.0.0/a.json").is_some());
    }

    #[tokio::test]
    async fn missing_file_fails_without_touching_store() {
        let store = Arc::new(InMemoryObjectStore::new());
        let result = uploader(store.clone())
            .upload_single_file(Path::new("/definitely/not/here.json"))
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
        assert!(store.keys().is_empty());
    }
}
