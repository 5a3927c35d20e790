//! CLI command implementations

pub mod error;
pub mod export;
pub mod validate;

pub use error::CliError;
pub use export::{Cli, Commands, ConfigArgs, ExportCommand, OutputFormat};
pub use validate::ValidateCommand;
