mod batch;
mod config_cmd;
mod group;
mod log;
mod result;

pub use batch::BatchCommand;
pub use config_cmd::ConfigCommand;
pub use group::GroupCommand;
pub use log::LogCommand;
pub use result::ResultCommand;
