//! Batch session commands.

use clap::{Args, Subcommand};
use serde_json::Value;

use studysync_core::{RunHooks, StudyRun};

use crate::config::Config;

/// Read, change or follow the batch session
#[derive(Args)]
pub struct BatchCommand {
    #[command(subcommand)]
    pub command: BatchSubcommand,
}

#[derive(Subcommand)]
pub enum BatchSubcommand {
    /// Print the batch session, or the value at a JSON pointer
    Get {
        /// JSON pointer, e.g. /round/0
        path: Option<String>,
    },
    /// Set a first-level field and wait for the coordinator's ack
    Set {
        name: String,
        /// Value as JSON (plain words are taken as strings)
        value: String,
    },
    /// Print every session patch until Ctrl-C
    Watch,
}

impl BatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let hooks = match self.command {
            BatchSubcommand::Watch => RunHooks::default().on_batch_session(|path, op| {
                println!("{} {}", op, path);
            }),
            _ => RunHooks::default(),
        };
        let study = StudyRun::new(config.run_context(), config.sync.clone(), hooks);

        println!("Opening batch channel...");
        study.open_batch().await?;
        let session = study.batch().session();

        match &self.command {
            BatchSubcommand::Get { path } => {
                let value = match path {
                    Some(path) => session.find(path)?.unwrap_or(Value::Null),
                    None => session.get_all(),
                };
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            BatchSubcommand::Set { name, value } => {
                let value = parse_value(value);
                session.set(name, value).await?;
                println!("Set {} (version {:?})", name, session.version());
            }
            BatchSubcommand::Watch => {
                println!("Watching batch session (version {:?}), Ctrl-C to stop", session.version());
                tokio::signal::ctrl_c().await?;
            }
        }

        study.batch().close();
        Ok(())
    }
}

/// Parses a command-line value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("3"), json!(3));
        assert_eq!(parse_value(r#"{"a": [1]}"#), json!({"a": [1]}));
        assert_eq!(parse_value("hello"), json!("hello"));
        assert_eq!(parse_value(r#""quoted""#), json!("quoted"));
    }
}
