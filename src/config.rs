use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Careslot";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory.
/// `CARESLOT_DATA_DIR` overrides; defaults to ~/Careslot
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CARESLOT_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Path of the SQLite database file.
pub fn database_path() -> PathBuf {
    app_data_dir().join("careslot.db")
}

/// Listen address. `CARESLOT_ADDR` overrides; defaults to 127.0.0.1:3000
pub fn bind_addr() -> SocketAddr {
    std::env::var("CARESLOT_ADDR")
        .ok()
        .and_then(|addr| addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)))
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info,tower_http=info", env!("CARGO_PKG_NAME"))
}

/// Staff bootstrap credentials from the environment, if configured.
pub fn staff_bootstrap() -> Option<(String, String)> {
    let email = std::env::var("CARESLOT_STAFF_EMAIL").ok()?;
    let password = std::env::var("CARESLOT_STAFF_PASSWORD").ok()?;
    Some((email, password))
}
