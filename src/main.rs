//! Heartbeat API server binary

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heartbeat_api::gateway::{KubernetesGateway, PrometheusClient};
use heartbeat_api::{AliasConfig, AppState, AuthService, Config, routes};

#[derive(Debug, Parser)]
#[command(version, about = "Monitoring dashboard backend")]
struct Args {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(long)]
    port: Option<u16>,

    /// Alias -> profile JSON document
    #[arg(long)]
    alias_config: Option<PathBuf>,

    /// Seconds between periodic refreshes
    #[arg(long)]
    refresh_interval: Option<u64>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    initialize_tracing();

    info!("Starting Heartbeat API v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(path) = args.alias_config {
        config.alias_config_file = path;
    }
    if let Some(seconds) = args.refresh_interval {
        config.refresh_interval = Duration::from_secs(seconds);
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    let aliases = match AliasConfig::load_or_create(&config.alias_config_file) {
        Ok(aliases) => aliases,
        Err(e) => {
            error!("Failed to load alias configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Monitoring {} aliases from {}: {:?}",
        aliases.len(),
        config.alias_config_file.display(),
        aliases.aliases()
    );

    let auth = match AuthService::from_config(&config) {
        Ok(auth) => Arc::new(auth),
        Err(e) => {
            error!("Failed to initialize authentication: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(admin) = &config.bootstrap_admin {
        match auth.bootstrap_admin(admin) {
            Ok(true) => info!("Created bootstrap admin {}", admin.username),
            Ok(false) => info!("Bootstrap admin {} already exists", admin.username),
            Err(e) => warn!("Could not create bootstrap admin {}: {}", admin.username, e),
        }
    }

    let metrics = match PrometheusClient::new(config.metrics_url.clone(), config.http_timeout) {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("Failed to build metrics client: {}", e);
            std::process::exit(1);
        }
    };
    let gateway = Arc::new(KubernetesGateway::new(metrics));

    let state = web::Data::new(AppState::new(aliases, gateway, config.refresh_workers));
    let refresher = state.coordinator.spawn_periodic(config.refresh_interval);
    info!("Periodic refresh every {}s", config.refresh_interval.as_secs());

    let auth = web::Data::from(auth);
    let cors_origin = config.cors_allowed_origin.clone();
    let bind = config.bind_address();
    info!("Server is live at http://{}:{}", bind.0, bind.1);

    let result = HttpServer::new(move || {
        App::new()
            .wrap(cors(cors_origin.as_deref()))
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(auth.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await;

    refresher.abort();
    info!("Heartbeat API stopped");
    result
}

fn cors(origin: Option<&str>) -> Cors {
    match origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials(),
        None => Cors::permissive(),
    }
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
