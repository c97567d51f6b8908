use anyhow::{Context, Result};
use clap::{Parser, Subcommand, arg, command};
use std::path::PathBuf;
use tracing::{Level, debug};
use url::Url;

use mirrorlist::{
    store::ListStore,
    sync::http::HttpSyncClient,
    types::{config::Config, record::Field},
};

mod commands;
mod validators;

/// CLI entrypoint
#[derive(Parser, Debug)]
#[command(
    about = "mirrorlist edits the source -> mirror repository list of a mirroring server. Changes show up immediately and are reverted if the server refuses them.",
    subcommand_required = true
)]
struct Cli {
    /// Sets the logging level
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Path to mirrorlist.toml
    #[arg(long, value_parser)]
    config: Option<PathBuf>,

    /// Mirror server base URL, overrides the config file
    #[arg(long, value_parser = parse_server)]
    server: Option<Url>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive setup for a new mirrorlist.toml
    Init,

    /// Prints every repository with its index
    List,

    /// Sets the source or mirror of a repository
    Set {
        /// Position of the repository, as shown by `list`
        index: usize,

        /// `source` or `mirror`
        field: Field,

        /// New value, may be empty
        value: String,
    },

    /// Removes a repository
    Remove {
        /// Position of the repository, as shown by `list`
        index: usize,
    },

    /// Appends an empty repository
    Add,

    /// Edits the list interactively
    Edit,
}

fn parse_server(input: &str) -> Result<Url> {
    validators::validate_server_url(input)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut sub = tracing_subscriber::fmt()
        .compact()
        .with_max_level(cli.log_level)
        .with_level(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .without_time();

    if cli.log_level >= Level::TRACE {
        sub = sub.with_file(true).with_line_number(true);
    }

    sub.init();

    if let Err(e) = run(cli).await {
        tracing::error!("{e:#}");

        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Init) {
        commands::init::run(cli.config).await?;
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).await?;

    if let Some(server) = cli.server {
        config.server = server;
    }

    debug!("using server {}", config.server);

    let store = ListStore::new(HttpSyncClient::new(config.server.clone())?);

    store
        .fetch_all()
        .await
        .with_context(|| format!("fetching the repository list from {}", config.server))?;

    match cli.command {
        Commands::List => commands::repo::list(&store)?,

        Commands::Set {
            index,
            field,
            value,
        } => commands::repo::set(&store, index, field, value).await?,

        Commands::Remove { index } => commands::repo::remove(&store, index).await?,

        Commands::Add => commands::repo::add(&store).await?,

        Commands::Edit => commands::edit::run(store).await?,

        Commands::Init => unreachable!("Impossible for init to reach after init was checked"),
    }

    Ok(())
}
