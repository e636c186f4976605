//! Fake collaborators for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use citybingo::persistence::{ReferenceStore, SqliteReferenceStore};
use citybingo::scheduler::{BatchProgress, StateRefresher};
use citybingo::storage::RawSource;
use citybingo::{GenerationError, GenerationKey, ImageGenerator, ImagePrompt, StoreError};

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nintegration-test-image";

/// Returns a fixed result after an optional delay and records every prompt.
pub struct CountingGenerator {
    result: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<ImagePrompt>>,
}

impl CountingGenerator {
    pub fn inline() -> Self {
        Self::returning(Some(RawSource::inline_png(PNG_BYTES)))
    }

    pub fn returning(result: Option<String>) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<ImagePrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for CountingGenerator {
    async fn generate_image(&self, prompt: &ImagePrompt) -> Result<Option<String>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.result.clone())
    }
}

/// The first call blocks until `open` is called; later calls return at once.
pub struct GatedGenerator {
    gate: Notify,
    calls: AtomicUsize,
}

impl GatedGenerator {
    pub fn new() -> Self {
        Self {
            gate: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
    async fn generate_image(&self, _prompt: &ImagePrompt) -> Result<Option<String>, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 {
            self.gate.notified().await;
        }
        Ok(Some(RawSource::inline_png(
            format!("image from call {}", call).as_bytes(),
        )))
    }
}

/// Silently drops the first `drop_writes` writes.
pub struct FlakyStore {
    inner: SqliteReferenceStore,
    drop_writes: usize,
    writes: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqliteReferenceStore, drop_writes: usize) -> Self {
        Self {
            inner,
            drop_writes,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceStore for FlakyStore {
    async fn read(&self, key: &GenerationKey) -> Result<Option<String>, StoreError> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &GenerationKey, reference: &str) -> Result<(), StoreError> {
        let attempt = self.writes.fetch_add(1, Ordering::SeqCst);
        if attempt < self.drop_writes {
            return Ok(());
        }
        self.inner.write(key, reference).await
    }
}

/// Keeps every progress snapshot it is handed.
#[derive(Default)]
pub struct RecordingRefresher {
    calls: Mutex<Vec<BatchProgress>>,
}

impl RecordingRefresher {
    pub fn calls(&self) -> Vec<BatchProgress> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateRefresher for RecordingRefresher {
    async fn refresh(&self, progress: BatchProgress) {
        self.calls.lock().unwrap().push(progress);
    }
}
