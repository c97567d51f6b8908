use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, trace};
use url::Url;

pub const CONFIG_FILE: &str = "mirrorlist.toml";
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(skip)]
    pub source_path: PathBuf,

    /// Base URL of the mirror server, `/api/...` is joined onto it.
    #[serde(default = "default_server")]
    pub server: Url,
}

fn default_server() -> Url {
    Url::parse(DEFAULT_SERVER).expect("default server URL is valid")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(CONFIG_FILE),
            server: default_server(),
        }
    }
}

impl Config {
    /// Loads an explicit config file, or `./mirrorlist.toml` when present.
    ///
    /// A missing explicit file is an error, a missing default file is not.
    pub async fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_path(path).await,
            None => {
                let path = Path::new(CONFIG_FILE);

                if fs::try_exists(path).await? {
                    Self::from_path(path).await
                } else {
                    debug!("no {CONFIG_FILE} found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub async fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        trace!("reading config from {}", path.display());
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        let mut config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

        config.source_path = path.to_path_buf();

        Ok(config)
    }

    pub async fn write(&self) -> anyhow::Result<()> {
        if fs::try_exists(&self.source_path).await? {
            bail!("{} already exists", self.source_path.display());
        }

        debug!("writing config to {}", self.source_path.display());

        fs::write(&self.source_path, toml::to_string_pretty(self)?).await?;

        Ok(())
    }
}
