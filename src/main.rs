use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use sessiontron::config::{config_schema, load_config};
use sessiontron::models::Registration;
use sessiontron::startup;
use sessiontron::state::AppState;
use sessiontron::utils::init_logging;

#[derive(Parser, Debug)]
#[command(name = "sessiontron", about = "Log in once, stay logged in")]
struct Cli {
    #[arg(long, env = "SESSIONTRON_CONFIG", default_value = "./config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the configuration JSON schema.
    Schema,
    #[command(flatten)]
    Session(SessionCommand),
}

/// Commands that run against a loaded session.
#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Exchange email and password for a session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SESSIONTRON_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log into it.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "SESSIONTRON_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "organizer")]
        role: String,
    },
    Logout,
    /// Show the session state and when the next refresh is due.
    Status,
    Whoami,
    /// GET an API path with the session's bearer token.
    Get { path: String },
    /// Keep the session alive until Ctrl-C.
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let command = match cli.command {
        Command::Schema => {
            return match config_schema() {
                Ok(schema) => {
                    println!("{}", schema);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to render schema: {}", e);
                    ExitCode::FAILURE
                }
            };
        }
        Command::Session(command) => command,
    };

    let config = match load_config(&cli.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", cli.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let state = match startup::build(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(command, &state).await;
    state.session.shutdown();
    match outcome {
        Ok(output) => {
            if !output.is_null() {
                println!("{}", output);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: SessionCommand,
    state: &AppState,
) -> Result<Value, Box<dyn std::error::Error>> {
    let session = &state.session;
    match command {
        SessionCommand::Login { email, password } => {
            let identity = session.login(email, password).await?;
            Ok(serde_json::to_value(identity)?)
        }
        SessionCommand::Register {
            name,
            email,
            password,
            role,
        } => {
            let identity = session
                .register(Registration {
                    name,
                    email,
                    password,
                    role,
                })
                .await?;
            Ok(serde_json::to_value(identity)?)
        }
        SessionCommand::Logout => {
            session.logout().await;
            Ok(Value::Null)
        }
        SessionCommand::Status => Ok(serde_json::to_value(state.status().await)?),
        SessionCommand::Whoami => {
            session.check_auth().await?;
            Ok(serde_json::to_value(session.sync_identity().await?)?)
        }
        SessionCommand::Get { path } => {
            session.check_auth().await?;
            Ok(state.client.get::<Value>(&path).await?)
        }
        SessionCommand::Watch => {
            session.check_auth().await?;
            info!("Keeping the session alive, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            Ok(Value::Null)
        }
    }
}
