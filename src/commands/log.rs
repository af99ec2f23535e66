use clap::Args;

use studysync_core::{RunHooks, StudyRun};

use crate::config::Config;

/// Write a message to the coordinator's log
#[derive(Args)]
pub struct LogCommand {
    message: String,
}

impl LogCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let study = StudyRun::new(config.run_context(), config.sync.clone(), RunHooks::default());
        study.log(self.message.as_str()).await?;
        study.wait_drained().await;
        println!("Logged");
        Ok(())
    }
}
