mod config;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::HostConfig;
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_agent::{AdapterSet, LlmService, Stores};
use switchboard_core::HistoryMessage;
use switchboard_store::{ConfigStore, HistorySource, SqliteStore};
use switchboard_tools::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard: LLM backend router")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configured channels and model bindings into the store
    Seed,
    /// Ask a model, printing the answer as it grows
    Ask {
        #[arg(short, long)]
        model: String,
        #[arg(long, default_value_t = 0)]
        chat_id: i64,
        /// Sender name recorded in the chat history
        #[arg(long, default_value = "operator")]
        sender: String,
        message: String,
    },
    /// Embed a text with the configured embedding model
    Embed { text: String },
    /// Describe an image with the alternate photo model
    Image {
        path: PathBuf,
        #[arg(long, default_value_t = 0)]
        chat_id: i64,
    },
    /// Spare capacity of a model
    Capacity { model: String },
    /// Models served by a channel
    Models {
        channel_id: i64,
        /// Annotate each model with inferred capabilities
        #[arg(long)]
        capabilities: bool,
    },
    /// Probe a channel
    Health { channel_id: i64 },
    /// Print the tool description embedded in the system prompt
    Tools,
}

fn init_tracing(plain: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if plain {
        builder.init();
    } else {
        builder.json().init();
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.plain);
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "Loaded environment file");
    }

    let config = HostConfig::load(&cli.config).await?;

    let mut tools = ToolRegistry::new();
    switchboard_builtins::register_builtins(&mut tools);
    let tools = Arc::new(tools);

    if let Commands::Tools = cli.command {
        println!("{}", tools.render_prompt_xml());
        return Ok(());
    }

    let store = Arc::new(
        SqliteStore::open(&config.database)
            .with_context(|| format!("Failed to open database '{}'", config.database.display()))?,
    );
    let service = LlmService::new(
        config.service.clone(),
        Stores::shared(store.clone()),
        AdapterSet::with_defaults(),
        tools,
    );
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    match cli.command {
        Commands::Seed => {
            for seed in &config.channels {
                let channel = seed.to_channel(|var| std::env::var(var).ok())?;
                store.upsert_channel(&channel).await?;
                for model in &seed.models {
                    store.bind_model(model, channel.id).await?;
                }
                info!(channel = channel.id, models = seed.models.len(), "Channel seeded");
            }
            println!("Seeded {} channel(s).", config.channels.len());
        }
        Commands::Ask {
            model,
            chat_id,
            sender,
            message,
        } => {
            let now = Utc::now();
            let incoming = HistoryMessage {
                message_id: now.timestamp_millis(),
                chat_id,
                sender_name: sender,
                content: message,
                sent_at: now,
                reply_to: None,
                from_bot: false,
            };
            store.record(&incoming).await?;

            let mut answers = service.execute(incoming.clone(), None, &model, cancel);
            let mut shown = String::new();
            let mut stdout = std::io::stdout();
            while let Some(snapshot) = answers.next().await {
                match snapshot.strip_prefix(shown.as_str()) {
                    Some(rest) => write!(stdout, "{rest}")?,
                    None => write!(stdout, "\n{snapshot}")?,
                }
                stdout.flush()?;
                shown = snapshot;
            }
            writeln!(stdout)?;

            if !shown.is_empty() && !shown.starts_with("Error: ") {
                let reply = HistoryMessage {
                    message_id: Utc::now().timestamp_millis(),
                    chat_id,
                    sender_name: config.service.bot_name.clone(),
                    content: shown,
                    sent_at: Utc::now(),
                    reply_to: Some(incoming.message_id),
                    from_bot: true,
                };
                store.record(&reply).await?;
            }
        }
        Commands::Embed { text } => {
            let vector = service.generate_embedding(&text, cancel).await?;
            println!("{}", serde_json::to_string(&vector)?);
            info!(dimensions = vector.len(), "Embedding generated");
        }
        Commands::Image { path, chat_id } => {
            let text = service.analyze_image(&path, chat_id, cancel).await?;
            println!("{text}");
        }
        Commands::Capacity { model } => {
            println!("{}", service.available_capacity(&model).await?);
        }
        Commands::Models {
            channel_id,
            capabilities,
        } => {
            if capabilities {
                let models = service.list_models_with_capabilities(channel_id).await?;
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                for model in service.list_models(channel_id).await? {
                    println!("{model}");
                }
            }
        }
        Commands::Health { channel_id } => {
            let healthy = service.check_health(channel_id).await?;
            println!(
                "channel {channel_id}: {}",
                if healthy { "healthy" } else { "unhealthy" }
            );
        }
        Commands::Tools => {}
    }

    Ok(())
}
