#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

mod command;

use clap::{Parser, Subcommand};
use command::{
    ChatInput, ChatStrategy, CommandStrategy, InfoStrategy, InitStrategy, SessionsInput,
    SessionsStrategy, VersionStrategy,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "chatrs")]
#[command(about = "Multi-turn chat assistant backed by a remote language model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model, interactively or with a single message
    Chat {
        /// Session id to continue; without one every turn is standalone
        #[arg(short = 's', long)]
        session: Option<String>,

        /// Preferred response language
        #[arg(short = 'l', long)]
        language: Option<String>,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,

        /// Single message to send
        #[arg(short = 'm', long)]
        message: Option<String>,

        /// Model to use
        #[arg(short = 'M', long)]
        model: Option<String>,
    },
    /// List or clear stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Initialize configuration
    Init,
    /// Show configuration
    Info,
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List stored session ids
    List,
    /// Delete a stored session
    Clear {
        /// Session id to delete
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            session,
            language,
            stream,
            message,
            model,
        } => {
            ChatStrategy
                .execute(ChatInput {
                    session_id: session,
                    language,
                    stream,
                    message,
                    model,
                })
                .await
        }
        Commands::Sessions { action } => {
            let input = match action {
                SessionsAction::List => SessionsInput::List,
                SessionsAction::Clear { id } => SessionsInput::Clear(id),
            };
            SessionsStrategy.execute(input).await
        }
        Commands::Init => InitStrategy.execute(()).await,
        Commands::Info => InfoStrategy.execute(()).await,
        Commands::Version => VersionStrategy.execute(()).await,
    }
}
