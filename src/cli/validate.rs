//! Validation subcommand

use clap::Parser;

use super::export::ConfigArgs;
use super::CliError;
use crate::config::ExportConfig;
use crate::resume::{CursorStatus, CursorStore};

/// Check configuration and the last run cursor
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl ValidateCommand {
    /// Validate `config` and report what the next export would resume from.
    /// Nothing is downloaded and the cursor file is never modified.
    pub fn execute(&self, config: &ExportConfig) -> Result<(), CliError> {
        config.validate()?;
        let org_id = config.org_id()?;
        let template = config.request_template()?;

        println!("Configuration is valid");
        println!("  Organization: {org_id}");
        println!("  Endpoint: {} {}", template.method(), template.url());
        println!("  Page size: {}", template.page_size());
        println!("  Output directory: {}", config.output.dir.display());

        let store = CursorStore::new(config.cursor_path.clone());
        match store.inspect(&org_id) {
            CursorStatus::Absent => {
                println!("No last run cursor at {}; next export downloads everything", store.path().display());
            }
            CursorStatus::Trusted(updated_since) => {
                println!("Last run cursor: records updated since {}", updated_since.to_rfc3339());
            }
            CursorStatus::OrgMismatch(other) => {
                println!("Last run cursor belongs to organization {other}; it will be discarded");
            }
            CursorStatus::Invalid(e) => {
                println!("Last run cursor is invalid ({e}); it will be discarded");
            }
            CursorStatus::Unreadable(e) => return Err(e.into()),
        }

        if let Some(updated_since) = &config.request.updated_since {
            println!("updatedSince is fixed to {updated_since}; the cursor will not be used");
        }

        Ok(())
    }
}
