use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

use super::item::WorkItem;

/// What the image generator is asked to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePrompt {
    pub city_id: String,
    pub item_text: String,
    pub description: Option<String>,
    pub style_hints: Option<serde_json::Value>,
}

impl ImagePrompt {
    pub fn for_item(item: &WorkItem) -> Self {
        Self {
            city_id: item.city_id.clone(),
            item_text: item.item_text.clone(),
            description: item.description.clone(),
            style_hints: item.style_hints.clone(),
        }
    }

    /// Prompt text sent to text-to-image services.
    pub fn render(&self) -> String {
        let mut text = format!("An illustration of \"{}\" in {}", self.item_text, self.city_id);
        if let Some(description) = self.description.as_deref().filter(|d| !d.trim().is_empty()) {
            text.push_str(". ");
            text.push_str(description.trim());
        }
        if let Some(hints) = &self.style_hints {
            text.push_str(". Style: ");
            text.push_str(&hints.to_string());
        }
        text
    }
}

/// External text-to-image collaborator.
///
/// Returns a remote URL or an inline `data:image/...;base64,` payload, or
/// `None` when the service produced nothing. There is no internal timeout.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &ImagePrompt) -> Result<Option<String>, GenerationError>;
}
