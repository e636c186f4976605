mod error;
mod regenerate;
mod routes;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use citybingo::{load_config_or_default, CoreServices};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use error::ServerError;
use state::AppState;

#[derive(Debug, Parser)]
#[command(name = "citybingo-server", version, about = "City Bingo artifact server")]
struct Cli {
    /// Path to the JSON config file. Defaults are used when it does not exist.
    #[arg(short, long, env = "CITYBINGO_CONFIG", default_value = "citybingo.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the generation API, the image proxy and stored images.
    Serve {
        /// Overrides `server.bind_address`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Regenerate every known item of a city through a running server.
    Regenerate {
        #[arg(long)]
        city: String,
        /// Base URL of the server to submit jobs to.
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,
        /// Replace existing images instead of reusing them.
        #[arg(long)]
        force_new: bool,
        /// Start one job every N milliseconds instead of running in groups.
        #[arg(long)]
        spacing_ms: Option<u64>,
    },
}

fn init_tracing() -> Result<(), ServerError> {
    tracing_log::LogTracer::init().map_err(|e| ServerError::Logging(e.to_string()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CITYBINGO_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let result = if json {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json()),
        )
    } else {
        tracing::subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer()),
        )
    };
    result.map_err(|e| ServerError::Logging(e.to_string()))
}

async fn serve(config_path: PathBuf, bind: Option<String>) -> Result<(), ServerError> {
    let config = load_config_or_default(&config_path)?;
    let address = bind.unwrap_or_else(|| config.server.bind_address.clone());

    let core = CoreServices::from_config(config)?;
    let state = AppState::new(core)?;
    let router = routes::build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ServerError::Bind {
            address: address.clone(),
            source: e,
        })?;
    info!("Listening on {}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting citybingo-server v{}", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(cli.config, bind).await,
        Command::Regenerate {
            city,
            server,
            force_new,
            spacing_ms,
        } => {
            regenerate::run(regenerate::RegenerateArgs {
                config_path: cli.config,
                city,
                server,
                force_new,
                spacing_ms,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
