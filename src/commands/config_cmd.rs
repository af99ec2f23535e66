use clap::{Args, Subcommand, ValueEnum};
use std::path::Path;

use crate::config::{Config, ConfigValue};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => show_text(config),
                }
                Ok(())
            }
            ConfigSubcommand::Init { force } => {
                if path.exists() && !force {
                    println!("Config file already exists: {}", path.display());
                    println!("Use --force to overwrite it.");
                    return Ok(());
                }
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(path, Config::template()?)?;
                println!("Wrote {}", path.display());
                Ok(())
            }
        }
    }
}

fn show_text(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    if let Some(path) = &config.config_file {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        );
    }
    println!();

    show_value("server_url", &config.server_url);
    show_value("study_id", &config.study_id);
    show_value("study_result_id", &config.study_result_id);
    show_value("component_id", &config.component_id);

    let channel = &config.sync.channel;
    println!("sync.channel:");
    println!("  sending_timeout_ms: {}", channel.sending_timeout_ms);
    println!("  heartbeat_interval_ms: {}", channel.heartbeat_interval_ms);
    println!("  heartbeat_timeout_ms: {}", channel.heartbeat_timeout_ms);
    println!(
        "  closed_check_interval_ms: {}",
        channel.closed_check_interval_ms
    );
    println!("  backoff_min_ms: {}", channel.backoff_min_ms);
    println!("  backoff_max_ms: {}", channel.backoff_max_ms);
    println!("sync.http:");
    println!("  timeout_ms: {}", config.sync.http.timeout_ms);
    println!("  retries: {}", config.sync.http.retries);
    println!("  retry_wait_ms: {}", config.sync.http.retry_wait_ms);
    println!("sync.heartbeat_period_ms: {}", config.sync.heartbeat_period_ms);
}

fn show_value<T: std::fmt::Display>(name: &str, value: &ConfigValue<T>) {
    println!("{}: {}", name, value.value);
    println!("  source: {}", value.source);
    println!();
}
