use crate::api;
use crate::cli::actions::Action;
use crate::config::Settings;
use anyhow::{Context, Result};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, config } => {
            let settings = Settings::load(&config)
                .with_context(|| format!("failed to load settings from {}", config.display()))?;

            api::new(port, settings).await?;
        }
    }

    Ok(())
}
