use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use infograph::config::{ClientConfig, ConfigError, StorageBackend};
use infograph::net::types::MessageRole;
use infograph::net::ApiError;
use infograph::AppContext;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("not signed in; run `infograph login` first")]
    NotSignedIn,
    #[error("service unhealthy: {0}")]
    Unhealthy(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "infograph", about = "Infograph research assistant API CLI")]
struct Cli {
    /// API origin; overrides INFOGRAPH_API_BASE from the environment.
    #[arg(long, env = "INFOGRAPH_API_BASE")]
    api_base: Option<String>,

    /// Credential file; overrides INFOGRAPH_STORAGE_PATH.
    #[arg(long, env = "INFOGRAPH_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    /// Exchange a Google ID token for an API session.
    Login {
        #[arg(long, env = "INFOGRAPH_GOOGLE_CREDENTIAL")]
        credential: String,
    },
    /// Adopt an existing API token and look up its profile.
    LoginToken {
        token: String,
    },
    Logout,
    Whoami {
        /// Re-fetch the profile from the server.
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    Sessions(SessionsCommand),
    Sources {
        session_id: String,
    },
    Messages(MessagesCommand),
    /// Show where navigating to a path would land.
    Route {
        path: String,
    },
}

#[derive(Args, Debug)]
struct SessionsCommand {
    #[command(subcommand)]
    command: SessionsSubcommand,
}

#[derive(Subcommand, Debug)]
enum SessionsSubcommand {
    List,
    Create { prompt: String },
    Get { session_id: String },
    Delete { session_id: String },
}

#[derive(Args, Debug)]
struct MessagesCommand {
    #[command(subcommand)]
    command: MessagesSubcommand,
}

#[derive(Subcommand, Debug)]
enum MessagesSubcommand {
    List {
        session_id: String,
    },
    Post {
        session_id: String,
        content: String,
        #[arg(long, value_enum, default_value_t = RoleArg::User)]
        role: RoleArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    User,
    Assistant,
    System,
}

impl From<RoleArg> for MessageRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Self::User,
            RoleArg::Assistant => Self::Assistant,
            RoleArg::System => Self::System,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let ctx = AppContext::new(load_config(&cli)?)?;

    match cli.command {
        Command::Health => run_health(&ctx).await,
        Command::Login { credential } => {
            let user = ctx.auth().sign_in_with_google(&credential).await?;
            print_json(&user)
        }
        Command::LoginToken { token } => run_login_token(&ctx, &token).await,
        Command::Logout => {
            ctx.auth().sign_out().await;
            println!("signed out");
            Ok(())
        }
        Command::Whoami { refresh } => run_whoami(&ctx, refresh).await,
        Command::Sessions(sessions) => run_sessions(&ctx, sessions).await,
        Command::Sources { session_id } => {
            require_auth(&ctx)?;
            let sources = ctx.sessions().list_sources(&session_id).await?;
            print_json(&sources)
        }
        Command::Messages(messages) => run_messages(&ctx, messages).await,
        Command::Route { path } => {
            let route = ctx.navigator().navigate(&path);
            println!("{} -> {}", path, route.path());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_base) = &cli.api_base {
        config = config.with_api_base(api_base)?;
    }
    if let Some(path) = &cli.storage_path {
        config = config.with_storage(StorageBackend::File(path.clone()));
    }
    Ok(config)
}

fn require_auth(ctx: &AppContext) -> Result<(), CliError> {
    if ctx.auth().is_authenticated() { Ok(()) } else { Err(CliError::NotSignedIn) }
}

async fn run_health(ctx: &AppContext) -> Result<(), CliError> {
    let health = ctx.api().health().await?;
    if !health.is_ok() {
        return Err(CliError::Unhealthy(health.status));
    }
    print_json(&health)
}

async fn run_login_token(ctx: &AppContext, token: &str) -> Result<(), CliError> {
    let user = ctx.auth().login_with_token(token).await?;
    print_json(&user)
}

async fn run_whoami(ctx: &AppContext, refresh: bool) -> Result<(), CliError> {
    require_auth(ctx)?;
    let user = if refresh { Some(ctx.auth().refresh_profile().await?) } else { ctx.auth().user() };
    match user {
        Some(user) => print_json(&user),
        None => {
            println!("signed in (no cached profile; try --refresh)");
            Ok(())
        }
    }
}

async fn run_sessions(ctx: &AppContext, sessions: SessionsCommand) -> Result<(), CliError> {
    require_auth(ctx)?;
    let store = ctx.sessions();
    match sessions.command {
        SessionsSubcommand::List => {
            store.fetch_sessions().await;
            if let Some(error) = store.error() {
                return Err(error.into());
            }
            print_json(&store.sessions())
        }
        SessionsSubcommand::Create { prompt } => {
            let session = store.create_session(&prompt).await?;
            print_json(&session)
        }
        SessionsSubcommand::Get { session_id } => {
            let session = store.get_session(&session_id).await?;
            print_json(&session)
        }
        SessionsSubcommand::Delete { session_id } => {
            store.delete_session(&session_id).await?;
            println!("deleted {session_id}");
            Ok(())
        }
    }
}

async fn run_messages(ctx: &AppContext, messages: MessagesCommand) -> Result<(), CliError> {
    require_auth(ctx)?;
    let store = ctx.sessions();
    match messages.command {
        MessagesSubcommand::List { session_id } => {
            let messages = store.list_messages(&session_id).await?;
            print_json(&messages)
        }
        MessagesSubcommand::Post { session_id, content, role } => {
            let message = store.post_message(&session_id, role.into(), &content).await?;
            print_json(&message)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_session_command() {
        let cli = Cli::try_parse_from(["infograph", "sessions", "create", "solar panels"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Sessions(SessionsCommand { command: SessionsSubcommand::Create { ref prompt } }) if prompt == "solar panels"
        ));
    }

    #[test]
    fn message_role_defaults_to_user() {
        let cli = Cli::try_parse_from(["infograph", "messages", "post", "s1", "hi"]).unwrap();
        let Command::Messages(MessagesCommand { command: MessagesSubcommand::Post { role, .. } }) = cli.command else {
            panic!("expected messages post");
        };
        assert_eq!(MessageRole::from(role), MessageRole::User);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
