use std::path::PathBuf;

use cliclack::{confirm, input, intro, outro};
use tracing::{debug, info};

use crate::validators::{ServerUrlValidator, validate_server_url};
use mirrorlist::types::config::{CONFIG_FILE, Config, DEFAULT_SERVER};

pub async fn run(path: Option<PathBuf>) -> anyhow::Result<()> {
    intro("mirrorlist init")?;

    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    debug!("Prompting for server URL");
    let server: String = input("Mirror server URL")
        .default_input(DEFAULT_SERVER)
        .validate_interactively(ServerUrlValidator)
        .interact()?;

    let config = Config {
        source_path: path,
        server: validate_server_url(&server)?,
    };

    debug!("Config: {:?}", config);

    if !confirm(format!("Write {}?", config.source_path.display())).interact()? {
        info!("Cancelled config creation.");
        return Ok(());
    }

    config.write().await?;

    outro(format!("wrote {}", config.source_path.display()))?;

    Ok(())
}
