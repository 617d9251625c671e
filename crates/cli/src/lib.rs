pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "roadside",
    about = "Roadside assistance operator CLI",
    long_about = "Operate the roadside request service: preflight, migrations, roster seeding, config inspection, employee lookup, and end-to-end smoke validation.",
    after_help = "Examples:\n  roadside migrate\n  roadside employees --role technician\n  roadside smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic employee roster (idempotent)")]
    Seed,
    #[command(about = "Run end-to-end checks including a full request lifecycle")]
    Smoke,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "List employees, optionally filtered by name/email search and role")]
    Employees {
        #[arg(long, help = "Case-insensitive match against name or email")]
        search: Option<String>,
        #[arg(long, help = "admin, dispatcher, technician, or all")]
        role: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Employees { search, role } => {
            commands::employees::run(search.as_deref(), role.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
