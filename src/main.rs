mod config;
mod controller;
mod database;
mod error;
mod routes;
mod storage;


#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::middleware::Tracing;
use poem::{get, handler, Endpoint, EndpointExt, Route, Server};
use poem_openapi::OpenApiService;
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;
use crate::controller::PictureController;
use crate::database::{ProfilePictureRepository, UserRepository};
use crate::routes::PicsApi;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "profile-pics", version, about = "Serves users and their profile pictures.")]
pub struct ServerConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    /// The binding host address of the server.
    host: String,

    #[arg(long, env = "SERVER_PORT", default_value_t = 8000)]
    port: u16,

    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads/")]
    /// The directory uploads are written to when no config file is given.
    uploads_dir: PathBuf,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://profile_pics.db")]
    /// The metadata database when no config file is given.
    database_url: String,

    #[arg(long, env = "DATABASE_POOL_SIZE", default_value_t = 10)]
    pool_size: u32,

    #[arg(long, env = "CONFIG_FILE")]
    /// A YAML config file, when given it replaces the storage and database flags.
    config: Option<PathBuf>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    /// The log level of this service, `RUST_LOG` takes precedence when set.
    log_level: String,
}

#[handler]
fn index() -> &'static str {
    "Hello world"
}

/// Wires the storage backend, database and API together.
pub async fn build_app(cfg: &RuntimeConfig) -> anyhow::Result<impl Endpoint> {
    let storage = cfg.backend.connect();
    let pool = database::connect(&cfg.database).await?;

    let users = UserRepository::new(pool.clone());
    let pictures = ProfilePictureRepository::new(pool);
    let controller = PictureController::new(storage, users.clone(), pictures);

    let api_service = OpenApiService::new(
        PicsApi::new(users, Arc::new(controller)),
        "Profile Pictures API",
        env!("CARGO_PKG_VERSION"),
    )
    .server("/api");
    let ui = api_service.redoc();

    let app = Route::new()
        .at("/", get(index))
        .nest("/api", api_service)
        .nest("/ui", ui)
        .with(Tracing);

    Ok(app)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: ServerConfig = ServerConfig::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},poem=info",
            env!("CARGO_CRATE_NAME"),
            args.log_level,
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = match args.config.as_deref() {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::with_defaults(
            args.uploads_dir.clone(),
            args.database_url.clone(),
            args.pool_size,
        ),
    };

    let app = build_app(&cfg).await?;

    let bind = format!("{}:{}", args.host, args.port);
    info!("Starting server on {}", &bind);

    Server::new(TcpListener::bind(bind))
        .run_with_graceful_shutdown(
            app,
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
            Some(Duration::from_secs(5)),
        )
        .await?;

    info!("Server shutting down");

    Ok(())
}
