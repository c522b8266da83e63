use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chat_provider_mock::ScriptedProvider;
use chat_session::session::default_data_dir;
use chat_session::{chat_menu, ChatOptions, ChatSession};
use clap::Parser;
use tape_menu::{init_logging, MenuConfig, ProcessTerminal};

/// Streaming chat console. Answers come from the built-in echo provider.
#[derive(Parser)]
#[command(name = "tape_chat")]
struct Cli {
    /// Message sent as soon as the chat opens
    message: Option<String>,

    /// Model name passed to the provider
    #[arg(long)]
    model: Option<String>,

    #[arg(long, default_value = "")]
    system_prompt: String,

    /// File whose content is attached as context (literal text otherwise)
    #[arg(long)]
    context: Option<String>,

    /// Image URL attached to the first message
    #[arg(long = "image")]
    images: Vec<String>,

    /// Write the first answer to this file and exit
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Settings and history directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Offer the built-in tools to the model
    #[arg(long)]
    agent: bool,

    /// Ask before running each tool
    #[arg(long)]
    confirm_tools: bool,

    /// Let Escape close the chat when nothing is generating
    #[arg(long)]
    cancellable: bool,

    /// Continue a saved conversation
    #[arg(long)]
    load: Option<PathBuf>,

    /// Delay between streamed chunks of the echo provider, in milliseconds
    #[arg(long, default_value_t = 30)]
    chunk_delay_ms: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = MenuConfig::from_env();
    init_logging(&config).context("failed to set up logging")?;

    let context = match cli.context {
        Some(context) if PathBuf::from(&context).is_file() => vec![fs::read_to_string(&context)
            .with_context(|| format!("failed to read context file {context}"))?],
        Some(context) => vec![context],
        None => Vec::new(),
    };
    let run_once = cli.agent && cli.out_file.is_none();
    let options = ChatOptions {
        data_dir: cli.data_dir.unwrap_or_else(default_data_dir),
        system_prompt: cli.system_prompt,
        first_message: cli.message,
        context,
        image_urls: cli.images,
        out_file: cli.out_file,
        model: cli.model,
        agent: cli.agent,
        confirm_tools: cli.confirm_tools,
        run_once,
        cancellable: cli.cancellable,
        idle_poll: config.idle_poll(),
        ..ChatOptions::default()
    };

    let provider =
        ScriptedProvider::new().with_chunk_delay(Duration::from_millis(cli.chunk_delay_ms));
    let mut session =
        ChatSession::new(options, Arc::new(provider)).context("failed to start chat session")?;
    if let Some(path) = &cli.load {
        session
            .load_conversation(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }

    let mut menu = chat_menu(session);
    menu.run(ProcessTerminal::new()).context("chat terminal failed")?;

    let session = menu.host_mut();
    if let Some(error) = session.take_fatal_error() {
        return Err(error).context("chat session stopped");
    }
    if let Some(result) = session.task_result() {
        println!("{result}");
    }
    Ok(())
}
