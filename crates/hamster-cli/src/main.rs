use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hamster_cli::commands::{add, list, remove, search, settings, stop, today};
use hamster_cli::{Backend, Cli, Commands, Config};
use hamster_client::{Storage, StorageOptions};
use hamster_core::ConfigStore;
use hamster_db::Database;

/// Load config and open the settings store.
fn open_settings(config_path: Option<&Path>) -> Result<(Arc<ConfigStore>, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    let settings = Arc::new(ConfigStore::open_at(&config.settings_path));
    Ok((settings, config))
}

/// Open the configured record store behind the storage facade.
fn open_storage(config_path: Option<&Path>) -> Result<Storage<Database>> {
    let (settings, config) = open_settings(config_path)?;

    let db = match config.backend {
        Backend::Sqlite => {
            if let Some(parent) = config.database_path.parent() {
                std::fs::create_dir_all(parent).context("failed to create database directory")?;
            }
            Database::open(&config.database_path)
                .with_context(|| format!("failed to open {}", config.database_path.display()))?
        }
        Backend::Memory => {
            tracing::info!("using in-memory database, nothing will be saved");
            Database::open_in_memory().context("failed to open in-memory database")?
        }
    };

    let options = StorageOptions {
        implicit_start: config.implicit_start,
    };
    Ok(Storage::with_options(db, settings, options))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Some(Commands::Add(args)) => add::run(&mut stdout, &open_storage(config_path)?, args)?,
        Some(Commands::Stop(args)) => stop::run(&mut stdout, &open_storage(config_path)?, args)?,
        Some(Commands::ToggleTracking) => stop::toggle(&mut stdout, &open_storage(config_path)?)?,
        Some(Commands::Remove(args)) => {
            remove::run(&mut stdout, &open_storage(config_path)?, args)?;
        }
        Some(Commands::Today(args)) => today::run(&mut stdout, &open_storage(config_path)?, args)?,
        Some(Commands::Search(args)) => {
            search::run(&mut stdout, &open_storage(config_path)?, args)?;
        }
        Some(Commands::Activities(args)) => {
            list::activities(&mut stdout, &open_storage(config_path)?, args)?;
        }
        Some(Commands::Categories) => list::categories(&mut stdout, &open_storage(config_path)?)?,
        Some(Commands::Tags(args)) => list::tags(&mut stdout, &open_storage(config_path)?, args)?,
        Some(Commands::Settings(action)) => {
            // Settings never touch the database
            let (settings, _config) = open_settings(config_path)?;
            settings::run(&mut stdout, &settings, action)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
