use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage::ArtifactDescriptor;

/// Prefix for item ids derived from free text when the caller has no item id.
const SYNTHETIC_ID_PREFIX: &str = "text-";

/// One generation job: produce the illustration for a single bingo item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub city_id: String,
    pub item_id: String,
    pub item_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque style hints forwarded to the generator untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_hints: Option<serde_json::Value>,
}

impl WorkItem {
    pub fn new(city_id: &str, item_id: &str, item_text: &str) -> Self {
        Self {
            city_id: city_id.to_string(),
            item_id: item_id.to_string(),
            item_text: item_text.to_string(),
            description: None,
            style_hints: None,
        }
    }

    /// Creates a job for free text with no catalog item behind it.
    /// The item id is derived from the text so repeated requests collide.
    pub fn from_text(city_id: &str, item_text: &str) -> Self {
        Self::new(city_id, &synthetic_item_id(item_text), item_text)
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_style_hints(mut self, style_hints: Option<serde_json::Value>) -> Self {
        self.style_hints = style_hints;
        self
    }

    pub fn key(&self) -> GenerationKey {
        GenerationKey::new(&self.city_id, &self.item_id)
    }

    pub fn descriptor(&self) -> ArtifactDescriptor<'_> {
        ArtifactDescriptor {
            city_id: &self.city_id,
            item_id: &self.item_id,
            item_text: &self.item_text,
        }
    }
}

/// Deterministic item id for a text-only request.
pub fn synthetic_item_id(item_text: &str) -> String {
    let digest = Sha256::digest(item_text.trim().to_lowercase().as_bytes());
    format!("{}{}", SYNTHETIC_ID_PREFIX, hex::encode(&digest[..6]))
}

/// Fingerprint of a generation job, used to detect duplicate work and to
/// address the durable row for an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationKey {
    city_id: String,
    item_id: String,
}

impl GenerationKey {
    pub fn new(city_id: &str, item_id: &str) -> Self {
        Self {
            city_id: city_id.to_string(),
            item_id: item_id.to_string(),
        }
    }

    pub fn city_id(&self) -> &str {
        &self.city_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

impl fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.city_id, self.item_id)
    }
}
