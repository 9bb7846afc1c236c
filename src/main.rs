use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use filewarden::config::Settings;
use filewarden::filestore::FileProtection;
use filewarden::identity::{StaticDirectory, UserDirectory};
use filewarden::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config_path = std::env::var_os("FILEWARDEN_CONFIG").map(PathBuf::from);
    let settings = Arc::new(Settings::load(config_path.as_deref())?);
    let directory: Arc<dyn UserDirectory> = match std::env::var_os("FILEWARDEN_DIRECTORY") {
        Some(p) => Arc::new(StaticDirectory::load(Path::new(&p))?),
        None => Arc::new(StaticDirectory::new()),
    };

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "filewarden",
        "filewarden starting: RUST_LOG='{}', config={:?}, upload_dir={:?}, lock_file={}, http_port={}",
        rust_log, config_path, settings.upload_dir, settings.lock_file, settings.http_port
    );

    let protection = FileProtection::from_settings(settings.clone());
    if !protection.sync() {
        warn!(target: "filewarden", "upload directory protection is out of sync with lock_file={}", settings.lock_file);
    }

    server::run(AppState::new(settings, directory)).await
}
