//! Command-line interface parsing and dispatch.
//!
//! Flags override config, config overrides built-in defaults. The `set` and
//! `unset` subcommands edit the persisted config; everything else starts an
//! interactive chat.

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::core::config::Config;
use crate::ui::chat_loop::{run_chat, ChatSetup};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "A full-screen terminal chat client with animated markdown replies")]
#[command(
    long_about = "Parley is a full-screen terminal chat client for a lightweight chat API \
server. Assistant replies are lightly formatted markdown, revealed with a \
typewriter animation; conversations can be cleared, exported to JSON, and \
imported back.\n\n\
Controls:\n\
  Type              Enter your message in the input field\n\
  Enter             Send the message\n\
  Esc               Cancel the pending response or skip the typing animation\n\
  Up/Down/Mouse     Scroll through chat history\n\
  Ctrl+C            Quit\n\n\
Commands:\n\
  /help             Extended help inside the chat\n\
  /export [file]    Save the conversation as JSON\n\
  /import <file>    Load a previously exported conversation"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Base URL of the chat service
    #[arg(short = 's', long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Log the conversation to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Set a configuration value (server-url, default-model, char-delay-ms, post-code-delay-ms)
    Set {
        /// Configuration key to set
        key: String,
        /// Value for the key
        value: String,
    },
    /// Remove a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config = Config::load()?;

    match args.command {
        Some(Commands::Set { key, value }) => {
            let mut config = config;
            config.set(&key, &value).map_err(|e| -> Box<dyn Error> { e.into() })?;
            config.save()?;
            println!("Set {key}");
            Ok(())
        }
        Some(Commands::Unset { key }) => {
            let mut config = config;
            config.unset(&key).map_err(|e| -> Box<dyn Error> { e.into() })?;
            config.save()?;
            println!("Unset {key}");
            Ok(())
        }
        Some(Commands::Chat) | None => {
            let setup = ChatSetup {
                model: args
                    .model
                    .unwrap_or_else(|| config.default_model().to_string()),
                server_url: args
                    .server
                    .unwrap_or_else(|| config.server_url().to_string()),
                log_file: args.log,
                config,
            };
            run_chat(setup).await
        }
    }
}

/// Diagnostics go to a file named by `PARLEY_LOG`; the alternate screen owns
/// stdout and stderr, so there is nowhere else to write them.
fn init_tracing() {
    let Ok(path) = std::env::var("PARLEY_LOG") else {
        return;
    };
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    else {
        eprintln!("Warning: could not open trace log {path}");
        return;
    };

    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("PARLEY_LOG_FILTER")
        .unwrap_or_else(|_| EnvFilter::new("parley=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Arc::new(file))
        .with_ansi(false)
        .init();
}
