use clap::{Parser, Subcommand};
use puck_lib::{AppError, Config, Session};
use serde::Serialize;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "puck", about = "Puck: X account credentials and rate-limit state", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate: reuse or refresh stored credentials, else open the browser flow.
    Login,
    /// Show stored credential state.
    Status,
    /// Revoke the access token (best effort) and delete stored credentials.
    Logout,
    /// Show tracked rate-limit windows for this process.
    RateStatus {
        /// Authenticate first so the identity call populates a window.
        #[arg(long, default_value_t = false)]
        probe: bool,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("[puck] failed to render result: {err}"),
    }
}

fn fail(err: &AppError) -> ExitCode {
    tracing::error!("{}", err);
    print_json(&err.to_tool_error());
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[puck] {err}");
            print_json(&err.to_tool_error());
            return ExitCode::FAILURE;
        }
    };
    let _logging = match puck_lib::init_logging(&config) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("[puck] {err}");
            None
        }
    };

    let session = match Session::new(config) {
        Ok(session) => session,
        Err(err) => return fail(&err),
    };

    match cli.command {
        Command::Login => {
            if let Err(err) = session.authenticate().await {
                return fail(&err);
            }
            print_json(&puck_lib::auth_status(&session).await);
        }
        Command::Status => print_json(&puck_lib::auth_status(&session).await),
        Command::Logout => print_json(&puck_lib::auth_logout(&session).await),
        Command::RateStatus { probe } => {
            if probe {
                if let Err(err) = session.authenticate().await {
                    return fail(&err);
                }
            }
            print_json(&puck_lib::rate_status(&session));
        }
    }
    ExitCode::SUCCESS
}
