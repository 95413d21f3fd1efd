use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sitecompass::cli::{self, assistant, chats, files, verify};
use sitecompass::config::Config;
use sitecompass::server;
use sitecompass::store::ChatStore;

#[derive(Parser)]
#[command(name = "sitecompass")]
#[command(about = "Website chat relay for a hosted assistant service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "sitecompass.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP chat service
    Serve,

    /// Browse and clean up stored conversations
    Chats {
        #[command(subcommand)]
        command: ChatCommands,
    },

    /// Manage knowledge base documents
    Files {
        #[command(subcommand)]
        command: FileCommands,
    },

    /// Manage assistants
    Assistant {
        #[command(subcommand)]
        command: AssistantCommands,
    },

    /// Check that the configured API key is accepted
    VerifyKey,
}

#[derive(Subcommand)]
enum ChatCommands {
    /// List conversations, most recent first
    List {
        /// Match session id, thread id or message text
        #[arg(short, long)]
        search: Option<String>,
        /// Earliest message date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Latest message date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        #[arg(short, long, default_value_t = 1)]
        page: u32,
    },
    /// Show one thread's transcript
    Read {
        thread_id: String,
    },
    /// Delete every message of a session
    Delete {
        session_id: String,
    },
}

#[derive(Subcommand)]
enum FileCommands {
    /// Upload a document to the assistant service
    Upload {
        path: PathBuf,
    },
    /// List uploaded documents
    List,
    /// Remove a document locally and remotely
    Remove {
        /// Local record id
        id: i64,
    },
}

#[derive(Subcommand)]
enum AssistantCommands {
    /// Create an assistant with file search over vector stores
    Create {
        name: String,
        /// Vector store id (repeatable)
        #[arg(long = "vector-store")]
        vector_stores: Vec<String>,
    },
    /// List assistants created from this installation
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();

    let config = Config::load(&args.config).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });

    match args.command {
        Commands::Serve => server::serve(&config).await?,
        Commands::Chats { command } => {
            let store = open_store(&config)?;
            match command {
                ChatCommands::List {
                    search,
                    from,
                    to,
                    page,
                } => chats::list(&store, search, from, to, page)?,
                ChatCommands::Read { thread_id } => chats::read(&store, &thread_id)?,
                ChatCommands::Delete { session_id } => chats::delete(&store, &session_id)?,
            }
        }
        Commands::Files { command } => {
            let store = open_store(&config)?;
            match command {
                FileCommands::Upload { path } => {
                    files::upload(&store, &cli::client(&config)?, &path).await?
                }
                FileCommands::List => files::list(&store)?,
                FileCommands::Remove { id } => {
                    files::remove(&store, &cli::client(&config)?, id).await?
                }
            }
        }
        Commands::Assistant { command } => {
            let store = open_store(&config)?;
            match command {
                AssistantCommands::Create {
                    name,
                    vector_stores,
                } => {
                    let client = cli::client(&config)?;
                    assistant::create(&store, &client, &name, vector_stores).await?
                }
                AssistantCommands::List => assistant::list(&store)?,
            }
        }
        Commands::VerifyKey => verify::run(&cli::client(&config)?).await?,
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<ChatStore> {
    ChatStore::open(&config.database_path())
}
