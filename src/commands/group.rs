//! Group commands.

use clap::{Args, Subcommand};

use studysync_core::{GroupCallbacks, RunHooks, StudyRun};

use crate::config::Config;

/// Join a group and follow its members
#[derive(Args)]
pub struct GroupCommand {
    #[command(subcommand)]
    pub command: GroupSubcommand,
}

#[derive(Subcommand)]
pub enum GroupSubcommand {
    /// Join a group and print group events until Ctrl-C
    Join {
        /// Leave the group on Ctrl-C instead of only closing the channel
        #[arg(long)]
        leave: bool,
    },
}

impl GroupCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let GroupSubcommand::Join { leave } = self.command;
        let study = StudyRun::new(config.run_context(), config.sync.clone(), RunHooks::default());

        println!("Joining group...");
        let group = study.join_group(printing_callbacks()).await?;

        println!();
        println!(
            "Group result ID: {}",
            group.group_result_id().unwrap_or_default()
        );
        println!("Member ID: {}", group.member_id().unwrap_or_default());
        println!("Members: {}", group.members().join(", "));
        println!("Open channels: {}", group.open_channels().join(", "));
        println!();
        println!("Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        if leave {
            group.leave().await?;
            println!("Left group");
        }
        group.close();
        Ok(())
    }
}

fn printing_callbacks() -> GroupCallbacks {
    GroupCallbacks::default()
        .on_open(|member| println!("[open] channel open as {}", member))
        .on_close(|| println!("[close] channel closed"))
        .on_error(|e| eprintln!("[error] {}", e))
        .on_message(|msg| println!("[message] {}", msg))
        .on_member_join(|member| println!("[join] {}", member))
        .on_member_open(|member| println!("[member open] {}", member))
        .on_member_leave(|member| println!("[leave] {}", member))
        .on_member_close(|member| println!("[member close] {}", member))
        .on_group_session(|path, op| println!("[session] {} {}", op, path))
}
