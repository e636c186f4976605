use std::time::Duration;

use citybingo::CoreServices;
use reqwest::Client;

use crate::error::ServerError;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub core: CoreServices,
    /// Client used by the proxy route.
    pub http: Client,
}

impl AppState {
    pub fn new(core: CoreServices) -> Result<Self, ServerError> {
        let storage = &core.config.storage;
        let http = Client::builder()
            .user_agent(storage.user_agent.clone())
            .timeout(Duration::from_secs(storage.fetch_timeout_secs))
            .build()
            .map_err(|e| ServerError::HttpClient(e.to_string()))?;
        Ok(Self { core, http })
    }
}
