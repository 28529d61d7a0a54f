use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Load `.env` from `dir` without overriding existing environment variables.
///
/// Must run before argument parsing so clap's env fallbacks see the values.
pub fn load_dotenv(dir: &Path) -> Result<()> {
    let env_path = dir.join(".env");
    if env_path.exists() {
        for item in dotenvy::from_path_iter(&env_path).context("load .env")? {
            let (key, val) = item.context("parse .env")?;
            if std::env::var_os(&key).is_none() {
                // SAFETY: runs before the runtime spawns any other thread.
                unsafe {
                    std::env::set_var(&key, &val);
                }
            }
        }
    }
    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
