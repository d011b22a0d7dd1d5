//! # kb-chat CLI (`kbchat`)
//!
//! Ask questions of a hosted generative model, optionally grounded in a
//! bundled JSON knowledge base.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbchat ask "<question>"` | One turn, enriched with knowledge-base matches |
//! | `kbchat search "<query>"` | Print knowledge-base matches |
//! | `kbchat prompt "<question>"` | Print the composed prompt without sending it |
//! | `kbchat chat` | Interactive session (text and voice) |
//! | `kbchat serve` | Start the JSON HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! kbchat ask "what is the capital of France?" --config ./config/kbchat.toml
//! kbchat ask "tell me a joke" --no-knowledge
//! kbchat search "france"
//! RUST_LOG=kb_chat=debug kbchat chat --speak
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use kb_chat::config;
use kb_chat::conversation::{Message, MessageKind, Origin};
use kb_chat::server;
use kb_chat::session::ChatSession;

/// kb-chat: a knowledge-base-augmented chat assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "kbchat",
    about = "kb-chat: ask a hosted language model, grounded in a JSON knowledge base",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question and print the answer.
    Ask {
        question: String,

        /// Send the question as-is, without knowledge-base context.
        #[arg(long)]
        no_knowledge: bool,

        /// Speak the answer with the configured speak command.
        #[arg(long)]
        speak: bool,
    },

    /// Search the knowledge base.
    ///
    /// Prints one JSON record per line, in document order.
    Search { query: String },

    /// Print the prompt that `ask` would send for a question.
    Prompt { question: String },

    /// Start an interactive chat.
    ///
    /// Lines are sent as questions. Commands: `/record`, `/stop`,
    /// `/voice <transcript>`, `/clear`, `/quit`.
    Chat {
        #[arg(long)]
        no_knowledge: bool,

        #[arg(long)]
        speak: bool,
    },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kbchat=info,kb_chat=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_or_minimal(&cli.config)?;

    match cli.command {
        Commands::Ask {
            question,
            no_knowledge,
            speak,
        } => {
            let session = ChatSession::from_config(&cfg)?;
            if no_knowledge {
                session.send_message(&question).await;
            } else {
                session.send_message_to_json(&question).await;
            }
            let state = session.conversation();
            for msg in state.messages().iter().filter(|m| m.origin == Origin::Assistant) {
                print_message(msg);
            }
            if speak {
                session.speak_last_response();
            }
        }
        Commands::Search { query } => {
            let session = ChatSession::from_config(&cfg)?;
            let matches = session.search(&query).await?;
            if matches.is_empty() {
                println!("No results.");
            }
            for record in matches.records() {
                println!("{}", serde_json::to_string(record)?);
            }
        }
        Commands::Prompt { question } => {
            let session = ChatSession::from_config(&cfg)?;
            let prompt = session.compose_prompt(&question).await?;
            println!("{}", prompt);
        }
        Commands::Chat {
            no_knowledge,
            speak,
        } => {
            let session = ChatSession::from_config(&cfg)?;
            run_chat(&session, !no_knowledge, speak).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_chat(session: &ChatSession, use_knowledge: bool, speak: bool) -> anyhow::Result<()> {
    println!("kbchat: type a question, /record to talk, /quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/record" => {
                session.start_recording().await;
                println!("(recording, /stop when done)");
            }
            "/stop" => {
                session.stop_recording().await;
                session.transcribe_recording().await;
            }
            "/clear" => session.clear_last_response(),
            _ => {
                if let Some(transcript) = line.strip_prefix("/voice ") {
                    session.process_voice_input(transcript).await;
                } else if use_knowledge {
                    session.send_message_to_json(line).await;
                } else {
                    session.send_message(line).await;
                }
            }
        }

        let state = session.conversation();
        for msg in &state.messages()[shown..] {
            if msg.origin == Origin::Assistant || msg.kind == MessageKind::VoiceInput {
                print_message(msg);
            }
        }
        shown = state.messages().len();

        if speak {
            session.speak_last_response();
        }
    }

    Ok(())
}

fn print_message(msg: &Message) {
    match msg.kind {
        MessageKind::Error => eprintln!("[error] {}", msg.content),
        MessageKind::System => eprintln!("[system] {}", msg.content),
        MessageKind::VoiceInput => println!("[you, voice] {}", msg.content),
        _ => println!("{}", msg.content),
    }
}
