use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context as _;
use axum::{Router, extract::FromRef, routing::get};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity, log::LevelFilter};
use figment::{Figment, providers::Format as _};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

pub use super::error::Error;
use super::{
    broker::{HttpBroker, UploadBroker},
    config::{AppConfig, PolicyConfig},
    db::{self, Db},
    endpoints,
    filestore::LocalStore,
    mailer::{HttpMailer, Mailer},
};

/// The application user agent. Concatenates the package name and version. e.g. `appmarket/0.0.0`.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// The application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Parser, Debug, Clone)]
/// Command line arguments.
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "default.toml")]
    pub config: PathBuf,
    /// The verbosity level.
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Clone, FromRef)]
/// The application state, shared across all routes.
pub struct AppState {
    /// The application configuration.
    pub config: AppConfig,
    /// Trust thresholds, copied out of `config` for direct extraction.
    pub policy: PolicyConfig,
    /// The main database connection pool.
    pub db: Db,
    /// Issues upload tokens for new app artifacts.
    pub broker: Arc<dyn UploadBroker>,
    /// Absent when no mail relay is configured.
    pub mailer: Option<Arc<dyn Mailer>>,
    /// Uploaded images.
    pub store: LocalStore,
}

/// Build the HTTP surface over `state`. Uploaded files are served under `/files`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(super::index))
        .nest("/api/v1", endpoints::routes())
        .nest_service("/files", ServeDir::new(&state.config.storage.path))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The main application entry point.
pub async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    // Set up trace logging to console and account for the user-provided verbosity flag.
    if args.verbosity.log_level_filter() != LevelFilter::Off {
        let lvl = match args.verbosity.log_level_filter() {
            LevelFilter::Error => tracing::Level::ERROR,
            LevelFilter::Warn => tracing::Level::WARN,
            LevelFilter::Info | LevelFilter::Off => tracing::Level::INFO,
            LevelFilter::Debug => tracing::Level::DEBUG,
            LevelFilter::Trace => tracing::Level::TRACE,
        };
        tracing_subscriber::fmt().with_max_level(lvl).init();
    }

    if !args.config.exists() {
        // Not fatal: every setting can come from the environment instead.
        warn!(
            "configuration file {} does not exist",
            args.config.display()
        );
    }

    // Read and parse the user-provided configuration.
    let config: AppConfig = Figment::new()
        .admerge(figment::providers::Toml::file(args.config))
        .admerge(figment::providers::Env::prefixed("APPMARKET_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize metrics reporting.
    super::metrics::setup(config.metrics.as_ref()).context("failed to set up metrics exporter")?;

    tokio::fs::create_dir_all(&config.storage.path)
        .await
        .context("failed to create storage directory")?;

    let pool = db::establish_pool(&config.db)
        .await
        .context("failed to establish database connection pool")?;
    db::migrate(&pool).await?;

    let broker = HttpBroker::new(&config.broker).context("failed to build broker client")?;
    let mailer = match config.mail.as_ref() {
        Some(mail) => {
            let mailer = HttpMailer::new(mail).context("failed to build mail client")?;
            Some(Arc::new(mailer) as Arc<dyn Mailer>)
        }
        None => {
            warn!("no mail relay configured, /operate/email is disabled");
            None
        }
    };

    let addr = config
        .listen_address
        .unwrap_or(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000));

    let app = router(AppState {
        policy: config.policy,
        db: pool,
        broker: Arc::new(broker),
        mailer,
        store: LocalStore::new(&config.storage),
        config,
    });

    info!("listening on {addr}");
    info!("connect to: http://127.0.0.1:{}", addr.port());

    let listener = TcpListener::bind(&addr)
        .await
        .context("failed to bind address")?;

    axum::serve(listener, app.into_make_service())
        .await
        .context("failed to serve app")
}
