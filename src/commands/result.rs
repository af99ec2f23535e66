//! Result data commands.

use clap::{Args, Subcommand};

use studysync_core::{RunHooks, StudyRun};

use crate::config::Config;

/// Send result data for the current component
#[derive(Args)]
pub struct ResultCommand {
    #[command(subcommand)]
    pub command: ResultSubcommand,
}

#[derive(Subcommand)]
pub enum ResultSubcommand {
    /// Replace the component's result data
    Submit { data: String },
    /// Append to the component's result data
    Append { data: String },
}

impl ResultCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let study = StudyRun::new(config.run_context(), config.sync.clone(), RunHooks::default());

        let (delivery, verb) = match &self.command {
            ResultSubcommand::Submit { data } => (study.submit_result_data(data.as_str()), "submitted"),
            ResultSubcommand::Append { data } => (study.append_result_data(data.as_str()), "appended"),
        };
        delivery.await?;
        study.wait_drained().await;

        println!("Result data {}", verb);
        Ok(())
    }
}
