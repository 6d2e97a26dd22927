mod commands;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use state::AppState;

#[derive(Parser)]
#[command(
    name = "linkcast-bot",
    version,
    about = "Turns links shared in Slack into audio/video overviews"
)]
struct Cli {
    /// Path to the JSON config file. Missing file means defaults.
    #[arg(short, long, env = "LINKCAST_CONFIG", default_value = "linkcast.json", global = true)]
    config: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for mentions and process the queue (default).
    Run,
    /// Queue a job by hand.
    Enqueue {
        url: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        thread: String,
        #[arg(long)]
        user: String,
        /// Workspace (team) id the results are posted to.
        #[arg(long)]
        team: Option<String>,
    },
    /// Show one job and its artifacts.
    Status { job_id: i64 },
    /// Job counts per status.
    Stats,
    /// Workspaces recorded in the database.
    Workspaces,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal in production.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let state = match AppState::load(&cli.config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("linkcast-bot: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => commands::run::run(&state).await,
        Command::Enqueue {
            url,
            channel,
            thread,
            user,
            team,
        } => commands::jobs::enqueue(&state, &url, channel, thread, user, team, cli.json),
        Command::Status { job_id } => commands::jobs::status(&state, job_id, cli.json),
        Command::Stats => commands::jobs::stats(&state, cli.json),
        Command::Workspaces => commands::workspaces::list(&state, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("linkcast-bot: {}", e);
            ExitCode::FAILURE
        }
    }
}
