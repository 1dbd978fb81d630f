pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::penalty::PenaltyArgs;
use commands::transition::TransitionArgs;

#[derive(Debug, Parser)]
#[command(
    name = "eventdesk",
    about = "Eventdesk booking operator CLI",
    long_about = "Inspect configuration, run migrations, and evaluate booking transitions and cancellation penalties.",
    after_help = "Examples:\n  eventdesk doctor --json\n  eventdesk penalty --amount 1200 --start 2024-07-20 --category service --now 2024-07-15\n  eventdesk transition --file booking.json --action cancel --reason \"venue flooded\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, penalty policies, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute the cancellation penalty for a booking amount and start time")]
    Penalty {
        #[arg(long, help = "Booking amount in currency units")]
        amount: String,
        #[arg(long, help = "Booking start (RFC 3339 or YYYY-MM-DD)")]
        start: String,
        #[arg(long, help = "Subject category: venue or service")]
        category: String,
        #[arg(long, help = "Evaluation instant (RFC 3339 or YYYY-MM-DD); defaults to now")]
        now: Option<String>,
    },
    #[command(about = "Apply accept, reject or cancel to a booking JSON document")]
    Transition {
        #[arg(long, help = "Path to the booking JSON document")]
        file: PathBuf,
        #[arg(long, help = "accept | reject | cancel")]
        action: String,
        #[arg(long, help = "Reason, required for reject and cancel")]
        reason: Option<String>,
        #[arg(long, help = "Evaluation instant (RFC 3339 or YYYY-MM-DD); defaults to now")]
        now: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Penalty { amount, start, category, now } => {
            commands::penalty::run(PenaltyArgs { amount, start, category, now })
        }
        Command::Transition { file, action, reason, now } => {
            commands::transition::run(TransitionArgs { file, action, reason, now })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
