use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] citybingo::CityBingoError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl From<citybingo::ConfigError> for ServerError {
    fn from(e: citybingo::ConfigError) -> Self {
        ServerError::Core(e.into())
    }
}

impl From<citybingo::SchedulerError> for ServerError {
    fn from(e: citybingo::SchedulerError) -> Self {
        ServerError::Core(e.into())
    }
}

impl From<citybingo::db::DatabaseError> for ServerError {
    fn from(e: citybingo::db::DatabaseError) -> Self {
        ServerError::Core(e.into())
    }
}
