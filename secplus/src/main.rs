use anyhow::{Context, Result};

use secplus::Shell;
use secplus_auth::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_path = secplus::logging::init_logging()?;
    eprintln!("secplus running; logs at {}", log_path.display());

    let settings = Settings::new().context("failed to load settings")?;

    Shell::new(settings).run().await
}
