//! Bridge Devices CLI - inspect and edit a bridge device database by hand.

mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use crate::commands::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so command output stays pipeable.
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    debug!("Device database: {}", args.db.display());

    let mut registry = bridge_devices::DeviceRegistry::builder(&args.db)
        .with_backups(!args.no_backups)
        .max_backups(args.max_backups)
        .build()?;

    let output = commands::run(&mut registry, args.command.unwrap_or(Command::List))?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
