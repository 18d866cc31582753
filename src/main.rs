use diagram_colab::colab::spawn_idle_sweeper;
use diagram_colab::config::Config;
use diagram_colab::db::PgStore;
use diagram_colab::{create_app, AppState};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "diagram_colab=debug,tower_http=debug,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    if config.auth_jwt_secret.is_none() {
        warn!("No JWT secret configured - every authenticated request will fail");
    }

    // Threat models and diagrams live in PostgreSQL
    let Some(db_url) = config.db_url.as_deref() else {
        error!("DB_URL is not set, refusing to start without a database");
        std::process::exit(1);
    };
    let store = match PgStore::connect(db_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.ensure_schema().await {
        error!("Failed to prepare database schema: {}", e);
        std::process::exit(1);
    }
    info!("Database initialized successfully");
    let state = AppState::new(config.clone(), store.clone(), store);

    // Close abandoned sessions in the background
    spawn_idle_sweeper(
        state.registry.clone(),
        config.session_sweep_interval(),
        config.session_idle_timeout(),
    );

    let app = create_app(state);

    // Start the HTTP/WebSocket server
    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📚 OpenAPI document at http://{}/api-docs/openapi.json", config.server_address());

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
