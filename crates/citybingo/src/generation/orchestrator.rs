use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::GenerationError;
use crate::persistence::{DurableWriter, PersistOutcome};
use crate::storage::AssetCache;

use super::generator::{ImageGenerator, ImagePrompt};
use super::item::WorkItem;

/// Result of one successful generation job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub public_ref: String,
    /// An existing stored file was reused and the generator was not called.
    pub reused: bool,
    pub persist: PersistOutcome,
}

/// Runs one work item through generate → store → persist.
pub struct GenerationOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    assets: Arc<AssetCache>,
    writer: Arc<DurableWriter>,
}

impl GenerationOrchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        assets: Arc<AssetCache>,
        writer: Arc<DurableWriter>,
    ) -> Self {
        Self {
            generator,
            assets,
            writer,
        }
    }

    pub fn assets(&self) -> &Arc<AssetCache> {
        &self.assets
    }

    pub async fn generate(
        &self,
        item: &WorkItem,
        force_new: bool,
    ) -> Result<GeneratedArtifact, GenerationError> {
        let key = item.key();
        let span = info_span!("generation", key = %key, force_new);

        async {
            let ticket = self.writer.begin(&key);

            let (public_ref, reused) = match self.reusable(item, force_new).await {
                Some(existing) => {
                    debug!(public_ref = %existing, "Reusing stored artifact");
                    (existing, true)
                }
                None => (self.produce(item, force_new).await?, false),
            };

            let persist = self
                .writer
                .persist(&ticket, &public_ref)
                .await
                .map_err(GenerationError::PersistenceFailure)?;

            let public_ref = match persist {
                PersistOutcome::Superseded => self.yield_to_newer(item, public_ref, reused).await,
                PersistOutcome::Verified => {
                    info!(public_ref = %public_ref, reused, "Generation complete");
                    public_ref
                }
            };

            Ok(GeneratedArtifact {
                public_ref,
                reused,
                persist,
            })
        }
        .instrument(span)
        .await
    }

    /// The persisted reference wins over a directory scan: a newer file on
    /// disk may belong to a job that lost the race for the key.
    async fn reusable(&self, item: &WorkItem, force_new: bool) -> Option<String> {
        if force_new {
            return None;
        }
        match self.writer.store().read(&item.key()).await {
            Ok(Some(current)) if self.assets.is_valid_reference(&current).await => {
                return Some(current);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read persisted reference, scanning stored files"),
        }
        self.assets.lookup(item.descriptor()).await
    }

    /// A newer job owns the key. Drops the file this job produced and
    /// reports the reference the newer job persisted.
    async fn yield_to_newer(&self, item: &WorkItem, public_ref: String, reused: bool) -> String {
        let current = match self.writer.store().read_authoritative(&item.key()).await {
            Ok(Some(current)) if current != public_ref => current,
            Ok(_) => {
                info!(public_ref = %public_ref, "Newer job persisted the same artifact");
                return public_ref;
            }
            Err(e) => {
                warn!(error = %e, "Could not read the newer reference");
                return public_ref;
            }
        };

        if !reused {
            if let Err(e) = self.assets.discard(&public_ref).await {
                warn!(public_ref = %public_ref, error = %e, "Failed to discard superseded artifact");
            }
        }
        info!(
            superseded = %public_ref,
            current = %current,
            "A newer job owns the reference"
        );
        current
    }

    async fn produce(&self, item: &WorkItem, force_new: bool) -> Result<String, GenerationError> {
        let prompt = ImagePrompt::for_item(item);

        let raw = self
            .generator
            .generate_image(&prompt)
            .await?
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(GenerationError::EmptyResult)?;

        let artifact = self
            .assets
            .store(&raw, item.descriptor(), force_new)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to store generated artifact");
                GenerationError::StorageFailure(e)
            })?;

        Ok(artifact.public_ref)
    }
}
