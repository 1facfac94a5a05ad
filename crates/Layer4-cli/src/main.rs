//! tether CLI - Main entry point

mod commands;
mod console;
mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_foundation::{JsonStore, TetherConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// tether - drive a terminal coding agent one chat message at a time
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding config.json and channels.json (default: ~/.config/tether)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read chat input from stdin and run it against a registered channel
    Serve {
        /// Channel (context) id
        #[arg(short, long)]
        context: String,
    },
    /// Manage registered channels
    Channel {
        #[command(subcommand)]
        action: ChannelCommand,
    },
    /// Show persisted session state
    State,
    /// Parse a backtick key command and print the segments
    Parse {
        /// Input text, e.g. "`ddd` my-app `e`"
        text: String,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelCommand {
    /// Register a channel for a project directory
    Add {
        context: String,
        project_name: String,
        path: PathBuf,
        /// tmux session name (default: tether-<context>)
        #[arg(long)]
        session: Option<String>,
    },
    /// Remove a channel
    Remove { context: String },
    /// List channels
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stdout 은 채널 메시지용)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let store = match args.config_dir {
        Some(dir) => JsonStore::new(dir),
        None => JsonStore::global()?,
    };
    let config = TetherConfig::load(&store).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        TetherConfig::default()
    });

    match args.command {
        Command::Serve { context } => serve::run(store, config, &context).await,
        Command::Channel { action } => match action {
            ChannelCommand::Add {
                context,
                project_name,
                path,
                session,
            } => commands::channel_add(store, &context, &project_name, &path, session),
            ChannelCommand::Remove { context } => commands::channel_remove(store, &context),
            ChannelCommand::List => commands::channel_list(store),
        },
        Command::State => commands::show_state(&store, &config),
        Command::Parse { text } => commands::parse(&text),
    }
}
