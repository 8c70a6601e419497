use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use careslot::api;
use careslot::config;
use careslot::core_state::CoreState;
use careslot::identity;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let data_dir = config::app_data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!("Cannot create data directory {}: {e}", data_dir.display());
        std::process::exit(1);
    }

    let core = Arc::new(CoreState::new(config::database_path()));

    // Open once at startup so migrations run before traffic arrives
    let conn = match core.open_db() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Database initialization failed: {e}");
            std::process::exit(1);
        }
    };

    if let Some((email, password)) = config::staff_bootstrap() {
        if let Err(e) = identity::ensure_staff_account(
            &conn,
            &email,
            &password,
            chrono::Utc::now().naive_utc(),
        ) {
            tracing::error!("Staff bootstrap failed: {e}");
            std::process::exit(1);
        }
    }
    drop(conn);

    let mut server = match api::server::start(core, config::bind_addr()).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    server.shutdown();
}
