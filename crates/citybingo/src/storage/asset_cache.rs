//! Local mirror of generated images.
//!
//! Files are named `<stem>_<millis>.<ext>` where the stem is a hash of the
//! item identity. A regeneration always writes a new file, so the previous
//! image stays valid until the durable reference moves to the new one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::AssetError;
use crate::sanitize;

use super::payload::{decode_inline, extension_for, RawSource};
use super::proxy::{self, IMAGES_PATH};
use super::root::StorageRoot;

/// Upper bound for downloading a remote artifact.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of hex characters of the identity hash used in file names.
const STEM_LEN: usize = 16;

/// Identity of the item an artifact illustrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactDescriptor<'a> {
    pub city_id: &'a str,
    pub item_id: &'a str,
    pub item_text: &'a str,
}

impl ArtifactDescriptor<'_> {
    /// Deterministic file name prefix for this item.
    pub fn stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.city_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.item_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.item_text.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..STEM_LEN].to_string()
    }
}

/// A stored image and where to find it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// The raw generator output this artifact came from.
    pub source_ref: String,
    pub local_path: PathBuf,
    pub byte_size: u64,
    /// The reference handed to clients and persisted (`/images/<name>`).
    pub public_ref: String,
}

#[derive(Debug, Clone)]
pub struct AssetCacheOptions {
    pub fetch_timeout: Duration,
    pub user_agent: String,
}

impl Default for AssetCacheOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: format!("citybingo-asset-cache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct AssetCache {
    root: StorageRoot,
    client: Client,
    fetch_timeout: Duration,
}

impl AssetCache {
    pub fn new(root: StorageRoot, options: AssetCacheOptions) -> Result<Self, AssetError> {
        let client = Client::builder()
            .user_agent(options.user_agent)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AssetError::Fetch {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            root,
            client,
            fetch_timeout: options.fetch_timeout,
        })
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Stores the bytes behind `raw_source` and returns the published artifact.
    ///
    /// Unless `force_new` is set, an existing valid file for the same item is
    /// returned as-is without decoding or downloading anything.
    pub async fn store(
        &self,
        raw_source: &str,
        descriptor: ArtifactDescriptor<'_>,
        force_new: bool,
    ) -> Result<Artifact, AssetError> {
        if !force_new {
            if let Some(existing) = self.find_existing(descriptor).await {
                debug!(public_ref = %existing.public_ref, "Reusing stored artifact");
                return Ok(Artifact {
                    source_ref: raw_source.to_string(),
                    ..existing
                });
            }
        }

        let source = RawSource::parse(raw_source)?;
        let (bytes, mime_type) = match &source {
            RawSource::Inline { mime_type, data } => (decode_inline(data)?, Some(mime_type.clone())),
            RawSource::Remote(url) => self.fetch(url).await?,
        };

        if bytes.is_empty() {
            return Err(AssetError::EmptyPayload);
        }

        let extension = extension_for(mime_type.as_deref());
        let directory = self.root.directory().to_path_buf();
        let stem = descriptor.stem();
        let (local_path, byte_size) = tokio::task::spawn_blocking(move || {
            let millis = Utc::now().timestamp_millis();
            let path = publish(&directory, &stem, millis, extension, &bytes)?;
            let size = verify_file(&path, bytes.len() as u64)?;
            Ok::<_, AssetError>((path, size))
        })
        .await
        .map_err(|e| AssetError::Task(e.to_string()))??;
        let public_ref = public_ref_for(&local_path)?;

        info!(
            public_ref = %public_ref,
            byte_size,
            remote = source.is_remote(),
            "Stored artifact"
        );

        Ok(Artifact {
            source_ref: raw_source.to_string(),
            local_path,
            byte_size,
            public_ref,
        })
    }

    /// Public reference of the newest valid stored file for this item.
    pub async fn lookup(&self, descriptor: ArtifactDescriptor<'_>) -> Option<String> {
        self.find_existing(descriptor).await.map(|a| a.public_ref)
    }

    /// Newest non-empty stored file for this item in the active root.
    pub async fn find_existing(&self, descriptor: ArtifactDescriptor<'_>) -> Option<Artifact> {
        let directory = self.root.directory().to_path_buf();
        let stem = descriptor.stem();
        let newest = tokio::task::spawn_blocking(move || newest_artifact(&directory, &stem))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Artifact directory scan did not complete");
                None
            });

        let (local_path, byte_size) = newest?;
        let public_ref = public_ref_for(&local_path).ok()?;
        Some(Artifact {
            source_ref: public_ref.clone(),
            local_path,
            byte_size,
            public_ref,
        })
    }

    /// Removes the file behind a local reference. Missing files are ignored.
    pub async fn discard(&self, reference: &str) -> Result<(), AssetError> {
        let path = self.resolve_public_ref(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(file = %sanitize::redact_path(&path), "Discarded artifact");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssetError::WriteFile { path, source: e }),
        }
    }

    /// Maps an `/images/<name>` reference to a file in the active root.
    pub fn resolve_public_ref(&self, reference: &str) -> Result<PathBuf, AssetError> {
        let name = reference
            .strip_prefix(IMAGES_PATH)
            .ok_or_else(|| AssetError::InvalidReference(reference.to_string()))?;
        if !is_safe_file_name(name) {
            return Err(AssetError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.directory().join(name))
    }

    /// Whether `reference` names an existing, non-empty stored file.
    pub async fn is_valid_reference(&self, reference: &str) -> bool {
        let Ok(path) = self.resolve_public_ref(reference) else {
            return false;
        };
        tokio::fs::metadata(path)
            .await
            .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
    }

    pub fn rewrite_for_display(&self, url: &str) -> String {
        proxy::rewrite_for_display(url)
    }

    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>), AssetError> {
        let span = info_span!("asset_cache.fetch", url = %sanitize::redact_url(url));
        let timeout_secs = self.fetch_timeout.as_secs();

        let download = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| fetch_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(AssetError::Fetch {
                    url: sanitize::redact_url(url),
                    message: format!("HTTP {}", status),
                });
            }

            let mime_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = response.bytes().await.map_err(|e| fetch_error(url, e))?;
            Ok((bytes.to_vec(), mime_type))
        };

        match tokio::time::timeout(self.fetch_timeout, download.instrument(span)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url = %sanitize::redact_url(url), timeout_secs, "Artifact download timed out");
                Err(AssetError::FetchTimeout {
                    url: sanitize::redact_url(url),
                    timeout_secs,
                })
            }
        }
    }
}

fn fetch_error(url: &str, error: reqwest::Error) -> AssetError {
    AssetError::Fetch {
        url: sanitize::redact_url(url),
        message: error.to_string(),
    }
}

/// Scans `directory` for the newest non-empty file named after `stem`.
fn newest_artifact(directory: &Path, stem: &str) -> Option<(PathBuf, u64)> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "Failed to list artifact directory {}: {}",
                directory.display(),
                e
            );
            return None;
        }
    };

    let mut newest: Option<((i64, u32), PathBuf, u64)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(order) = parse_artifact_name(name, stem) else {
            continue;
        };
        let size = match entry.metadata() {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta.len(),
            _ => continue,
        };
        if newest.as_ref().map_or(true, |(best, _, _)| order > *best) {
            newest = Some((order, entry.path(), size));
        }
    }

    newest.map(|(_, path, size)| (path, size))
}

/// Writes `content` to a temporary file, then links it under a fresh name.
/// Readers never observe a partially written artifact.
fn publish(
    directory: &Path,
    stem: &str,
    millis: i64,
    extension: &str,
    content: &[u8],
) -> Result<PathBuf, AssetError> {
    let temp_path = directory.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

    let written = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .and_then(|mut file| {
            file.write_all(content)?;
            file.sync_all()
        });
    let result = match written {
        Ok(()) => link_fresh_name(directory, &temp_path, stem, millis, extension),
        Err(e) => Err(AssetError::WriteFile {
            path: temp_path.clone(),
            source: e,
        }),
    };
    let _ = std::fs::remove_file(&temp_path);
    result
}

/// Hard-links `temp_path` as `<stem>_<millis>[_<n>].<ext>`. Linking fails
/// when the name is taken, so concurrent publishers never replace each
/// other's files.
fn link_fresh_name(
    directory: &Path,
    temp_path: &Path,
    stem: &str,
    millis: i64,
    extension: &str,
) -> Result<PathBuf, AssetError> {
    for counter in 1..=1000u32 {
        let name = if counter == 1 {
            format!("{}_{}.{}", stem, millis, extension)
        } else {
            format!("{}_{}_{}.{}", stem, millis, counter, extension)
        };
        let target = directory.join(name);
        match std::fs::hard_link(temp_path, &target) {
            Ok(()) => return Ok(target),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(AssetError::WriteFile {
                    path: target,
                    source: e,
                })
            }
        }
    }

    Err(AssetError::FileExists(
        directory.join(format!("{}_{}.{}", stem, millis, extension)),
    ))
}

/// Confirms the published file exists with the expected non-zero size.
/// A file that fails the check is removed so it can never be referenced.
fn verify_file(path: &Path, expected: u64) -> Result<u64, AssetError> {
    let failure = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 && meta.len() == expected => {
            return Ok(meta.len());
        }
        Ok(meta) => format!("size {} (expected {})", meta.len(), expected),
        Err(e) => e.to_string(),
    };

    let _ = std::fs::remove_file(path);
    Err(AssetError::Verify {
        path: path.to_path_buf(),
        reason: failure,
    })
}

fn public_ref_for(path: &Path) -> Result<String, AssetError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| format!("{}{}", IMAGES_PATH, name))
        .ok_or_else(|| AssetError::InvalidReference(path.display().to_string()))
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

/// Returns the `(millis, counter)` ordering key if `name` is an artifact for `stem`.
fn parse_artifact_name(name: &str, stem: &str) -> Option<(i64, u32)> {
    let rest = name.strip_prefix(stem)?.strip_prefix('_')?;
    let (base, _extension) = rest.rsplit_once('.')?;
    let mut parts = base.splitn(2, '_');
    let millis = parts.next()?.parse::<i64>().ok()?;
    let counter = match parts.next() {
        Some(counter) => counter.parse::<u32>().ok()?,
        None => 1,
    };
    Some((millis, counter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use tempfile::TempDir;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-data";

    fn descriptor() -> ArtifactDescriptor<'static> {
        ArtifactDescriptor {
            city_id: "paris",
            item_id: "louvre",
            item_text: "Visit the Louvre",
        }
    }

    fn cache_in(temp_dir: &TempDir) -> AssetCache {
        let root = StorageRoot::initialize(
            temp_dir.path().join("primary"),
            temp_dir.path().join("fallback"),
        )
        .unwrap();
        AssetCache::new(root, AssetCacheOptions::default()).unwrap()
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_stem_is_deterministic_and_distinct() {
        let a = descriptor();
        let b = ArtifactDescriptor {
            item_text: "Visit the Orsay",
            ..descriptor()
        };
        assert_eq!(a.stem(), descriptor().stem());
        assert_ne!(a.stem(), b.stem());
        assert_eq!(a.stem().len(), STEM_LEN);
    }

    #[test]
    fn test_parse_artifact_name() {
        assert_eq!(parse_artifact_name("abc_100.png", "abc"), Some((100, 1)));
        assert_eq!(parse_artifact_name("abc_100_3.jpg", "abc"), Some((100, 3)));
        assert_eq!(parse_artifact_name("abd_100.png", "abc"), None);
        assert_eq!(parse_artifact_name(".tmp", "abc"), None);
        assert_eq!(parse_artifact_name("abc_x.png", "abc"), None);
    }

    #[tokio::test]
    async fn test_store_inline_payload() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let artifact = cache
            .store(&RawSource::inline_png(PNG_BYTES), descriptor(), false)
            .await
            .unwrap();

        assert!(artifact.public_ref.starts_with("/images/"));
        assert_eq!(artifact.byte_size, PNG_BYTES.len() as u64);
        assert_eq!(std::fs::read(&artifact.local_path).unwrap(), PNG_BYTES);
        assert!(cache.is_valid_reference(&artifact.public_ref).await);
        assert_eq!(cache.lookup(descriptor()).await, Some(artifact.public_ref));
    }

    #[tokio::test]
    async fn test_store_reuses_existing_without_fetching() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let first = cache
            .store(&RawSource::inline_png(PNG_BYTES), descriptor(), false)
            .await
            .unwrap();
        // Nothing listens on the discard port; a fetch attempt would fail.
        let second = cache
            .store("http://127.0.0.1:9/never.png", descriptor(), false)
            .await
            .unwrap();

        assert_eq!(first.public_ref, second.public_ref);
        assert_eq!(file_count(cache.root().directory()), 1);
    }

    #[tokio::test]
    async fn test_force_new_writes_new_file_and_keeps_old() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let first = cache
            .store(&RawSource::inline_png(PNG_BYTES), descriptor(), false)
            .await
            .unwrap();
        let second = cache
            .store(&RawSource::inline_png(b"second image"), descriptor(), true)
            .await
            .unwrap();

        assert_ne!(first.public_ref, second.public_ref);
        assert!(cache.is_valid_reference(&first.public_ref).await);
        assert!(cache.is_valid_reference(&second.public_ref).await);
        assert_eq!(cache.lookup(descriptor()).await, Some(second.public_ref));
    }

    #[tokio::test]
    async fn test_invalid_inline_header_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let result = cache
            .store("data:text/html;base64,PGgxPg==", descriptor(), false)
            .await;

        assert!(matches!(result, Err(AssetError::InvalidPayloadFormat(_))));
        assert_eq!(file_count(cache.root().directory()), 0);
        assert!(cache.lookup(descriptor()).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_inline_payload_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let result = cache.store("data:image/png;base64,", descriptor(), false).await;

        assert!(matches!(result, Err(AssetError::EmptyPayload)));
        assert_eq!(file_count(cache.root().directory()), 0);
    }

    #[tokio::test]
    async fn test_fallback_root_used_for_store_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let fallback = temp_dir.path().join("fallback");
        let root = StorageRoot::initialize(blocker.join("images"), &fallback).unwrap();
        let cache = AssetCache::new(root, AssetCacheOptions::default()).unwrap();

        let artifact = cache
            .store(&RawSource::inline_png(PNG_BYTES), descriptor(), false)
            .await
            .unwrap();

        assert!(artifact.local_path.starts_with(&fallback));
        assert_eq!(cache.lookup(descriptor()).await, Some(artifact.public_ref.clone()));
        assert_eq!(
            cache.resolve_public_ref(&artifact.public_ref).unwrap(),
            artifact.local_path
        );
    }

    #[tokio::test]
    async fn test_remote_fetch_stores_bytes() {
        let router = Router::new().route(
            "/img.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], PNG_BYTES.to_vec()) }),
        );
        let base = serve(router).await;
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let artifact = cache
            .store(&format!("{}/img.jpg", base), descriptor(), false)
            .await
            .unwrap();

        assert!(artifact.public_ref.ends_with(".jpg"));
        assert_eq!(std::fs::read(&artifact.local_path).unwrap(), PNG_BYTES);
    }

    #[tokio::test]
    async fn test_remote_fetch_times_out() {
        let router = Router::new().route(
            "/slow.png",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                PNG_BYTES.to_vec()
            }),
        );
        let base = serve(router).await;
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::initialize(
            temp_dir.path().join("primary"),
            temp_dir.path().join("fallback"),
        )
        .unwrap();
        let options = AssetCacheOptions {
            fetch_timeout: Duration::from_millis(200),
            ..AssetCacheOptions::default()
        };
        let cache = AssetCache::new(root, options).unwrap();

        let result = cache
            .store(&format!("{}/slow.png", base), descriptor(), false)
            .await;

        assert!(matches!(result, Err(AssetError::FetchTimeout { .. })));
        assert_eq!(file_count(cache.root().directory()), 0);
    }

    #[tokio::test]
    async fn test_remote_error_status_is_fetch_error() {
        let base = serve(Router::new()).await;
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        let result = cache
            .store(&format!("{}/missing.png", base), descriptor(), false)
            .await;

        match result {
            Err(AssetError::Fetch { message, .. }) => assert!(message.contains("404")),
            other => panic!("Expected Fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_public_ref_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);

        assert!(cache.resolve_public_ref("/images/../secret").is_err());
        assert!(cache.resolve_public_ref("/images/a/b.png").is_err());
        assert!(cache.resolve_public_ref("/images/.hidden").is_err());
        assert!(cache.resolve_public_ref("/other/a.png").is_err());
        assert!(cache.resolve_public_ref("/images/a.png").is_ok());
        assert!(!cache.is_valid_reference("/images/a.png").await);
    }

    #[tokio::test]
    async fn test_lookup_ignores_empty_and_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        let stem = descriptor().stem();
        let dir = cache.root().directory();

        std::fs::write(dir.join(format!("{}_100.png", stem)), b"old").unwrap();
        std::fs::write(dir.join(format!("{}_200.png", stem)), b"").unwrap();
        std::fs::write(dir.join(".abc.tmp"), b"partial").unwrap();

        assert_eq!(
            cache.lookup(descriptor()).await,
            Some(format!("/images/{}_100.png", stem))
        );
    }

    #[test]
    fn test_publish_never_replaces_a_taken_name() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let taken = dir.join("abc_1700000000000.png");
        std::fs::write(&taken, b"first publisher").unwrap();

        let path = publish(dir, "abc", 1_700_000_000_000, "png", b"second publisher").unwrap();

        assert_eq!(path, dir.join("abc_1700000000000_2.png"));
        assert_eq!(std::fs::read(&taken).unwrap(), b"first publisher");
        assert_eq!(std::fs::read(&path).unwrap(), b"second publisher");
        // Only the two artifacts remain; the temp file is gone.
        assert_eq!(file_count(dir), 2);
    }

    #[tokio::test]
    async fn test_discard_removes_file_once() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(&temp_dir);
        let artifact = cache
            .store(&RawSource::inline_png(PNG_BYTES), descriptor(), false)
            .await
            .unwrap();

        cache.discard(&artifact.public_ref).await.unwrap();
        cache.discard(&artifact.public_ref).await.unwrap();

        assert!(!artifact.local_path.exists());
        assert!(cache.lookup(descriptor()).await.is_none());
        assert!(cache.discard("/images/../escape.png").await.is_err());
    }
}
