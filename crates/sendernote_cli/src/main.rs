//! JSON request host.
//!
//! # Responsibility
//! - Open the configured store, run pending data migrations, then answer one
//!   JSON request on stdout.
//! - Report failures on stderr with a non-zero exit code.

mod config;

use clap::Parser;
use config::Cli;
use log::warn;
use sendernote_core::defaults::default_templates;
use sendernote_core::{
    dispatch_json, init_logging, MigrationRunner, NotesRepository, SqliteAdapter,
};
use std::error::Error;
use std::io::Read;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String, Box<dyn Error>> {
    if let Some(log_dir) = cli.log_dir() {
        init_logging(&cli.log_level(), log_dir)?;
    }

    let db = cli.db_source();
    let raw = match cli.request {
        Some(raw) => raw,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let repo = NotesRepository::new(SqliteAdapter::new(db))
        .with_default_templates(default_templates);

    let report = MigrationRunner::builtin().run_pending(repo.adapter())?;
    if let Some(failure) = &report.failed {
        // Serve the request against unmigrated data rather than refusing it.
        warn!(
            "event=migration_run module=cli status=degraded failed_id={}",
            failure.id
        );
    }

    Ok(dispatch_json(&repo, raw.trim())?)
}
