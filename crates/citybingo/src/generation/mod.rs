pub mod generator;
pub mod item;
pub mod openai;
pub mod orchestrator;
pub mod service;

pub use generator::{ImageGenerator, ImagePrompt};
pub use item::{synthetic_item_id, GenerationKey, WorkItem};
pub use openai::{OpenAiImageGenerator, OpenAiSettings};
pub use orchestrator::{GeneratedArtifact, GenerationOrchestrator};
pub use service::{GenerateRequest, GenerateResponse, GenerationService, ServiceOutcome};
