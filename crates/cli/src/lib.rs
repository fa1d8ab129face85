pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "risepal",
    about = "RisePal operator CLI",
    long_about = "Operate the RisePal assistant: migrations, demo data, config inspection, readiness checks and one-off chat turns.",
    after_help = "Examples:\n  risepal doctor --json\n  risepal seed\n  risepal chat --user-id 3 --session demo \"I fixed the login bug today\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Create the demo admin, manager and employees if they do not exist yet")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, completion settings and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one conversational turn as the given user")]
    Chat {
        #[arg(long, help = "Id of the active user the turn runs as")]
        user_id: i64,
        #[arg(long, default_value = "cli", help = "Conversation session id")]
        session: String,
        #[arg(required = true, num_args = 1.., help = "Message text")]
        message: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Chat { user_id, session, message } => {
            commands::chat::run(user_id, &session, &message.join(" "))
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
