use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::{BatchCommand, ConfigCommand, GroupCommand, LogCommand, ResultCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "studysync")]
#[command(version)]
#[command(about = "Acts as one study run against a study coordinator", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read, change or follow the batch session
    Batch(BatchCommand),

    /// Join a group and follow its members
    Group(GroupCommand),

    /// Send result data for the current component
    Result(ResultCommand),

    /// Write a message to the coordinator's log
    Log(LogCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studysync=info,studysync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let config = Config::load(Some(config_path.clone()))?;
    tracing::debug!(
        server = %config.server_url.value,
        study_result_id = config.study_result_id.value,
        "configuration loaded"
    );

    match cli.command {
        Some(Commands::Batch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Group(cmd)) => cmd.run(&config).await?,
        Some(Commands::Result(cmd)) => cmd.run(&config).await?,
        Some(Commands::Log(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config, &config_path)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
