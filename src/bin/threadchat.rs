//! Interactive chat application for a hosted assistant.
//!
//! # Usage
//!
//! ```bash
//! export THREADCHAT_API_KEY=sk-...
//! export THREADCHAT_ASSISTANT_ID=asst_...
//! threadchat
//!
//! # Settings and secrets from a file
//! threadchat --config threadchat.yaml
//!
//! # Poll every 500ms, give up after 30 reads
//! threadchat --poll-interval-ms 500 --max-attempts 30
//! ```
//!
//! Set `THREADCHAT_LOG=debug` to see each status read.
//!
//! # Commands
//!
//! - `/reset` - Start over with an empty conversation
//! - `/history` - Show the conversation so far
//! - `/save <file>` / `/load <file>` - Persist or restore the transcript
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::path::PathBuf;
use std::process::ExitCode;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use threadchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, ConfigFile, PlainTextRenderer, Renderer,
    Secrets, help_text, parse_command,
};
use threadchat::{Assistant, HttpAssistant};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("THREADCHAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("threadchat [OPTIONS]");

    let session = match setup(&args) {
        Ok(session) => session,
        Err(err) => {
            PlainTextRenderer::with_color(!args.no_color).print_error(&err.to_string());
            return ExitCode::FAILURE;
        }
    };
    let mut renderer = PlainTextRenderer::with_color(session.config().use_color);

    match run(session, &mut renderer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            renderer.print_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}

fn setup(args: &ChatArgs) -> threadchat::Result<ChatSession<HttpAssistant>> {
    let file = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let secrets = Secrets::from_env(&file)?;
    let config = ChatConfig::resolve(&file, args)?;
    ChatSession::connect(&secrets, config)
}

async fn run<A: Assistant>(
    mut session: ChatSession<A>,
    renderer: &mut PlainTextRenderer,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut rl = DefaultEditor::new()?;

    renderer.print_info(&session.config().title);
    renderer.print_info("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    if !handle_command(cmd, &mut session, renderer) {
                        break;
                    }
                    continue;
                }

                // Input stays blocked until the exchange is over.
                renderer.start_waiting();
                let exchange = session.submit(line).await;
                renderer.finish_waiting();
                match exchange {
                    Ok(exchange) => {
                        if let Some(entry) = session.history().last() {
                            renderer.print_entry(entry);
                        }
                        if let Some(err) = exchange.autosave_error {
                            renderer.print_error(&format!("Failed to save transcript: {err}"));
                        }
                    }
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Applies a slash command.  Returns false when the chat should exit.
fn handle_command<A: Assistant>(
    cmd: ChatCommand,
    session: &mut ChatSession<A>,
    renderer: &mut PlainTextRenderer,
) -> bool {
    match cmd {
        ChatCommand::Quit => {
            println!("Goodbye!");
            return false;
        }
        ChatCommand::Reset => {
            session.reset();
            renderer.print_info("Conversation reset.");
        }
        ChatCommand::History => {
            if session.history().is_empty() {
                renderer.print_info("(no messages yet)");
            } else {
                renderer.print_transcript(session.history());
            }
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::TranscriptPath(path) => {
            session.set_transcript_path(Some(PathBuf::from(&path)));
            renderer.print_info(&format!("Transcript auto-save set to {}", path));
        }
        ChatCommand::ClearTranscriptPath => {
            session.set_transcript_path(None);
            renderer.print_info("Transcript auto-save disabled.");
        }
        ChatCommand::SaveTranscript(path) => match session.save_transcript_to(&path) {
            Ok(()) => renderer.print_info(&format!("Transcript saved to {}", path)),
            Err(err) => renderer.print_error(&format!("Failed to save transcript: {}", err)),
        },
        ChatCommand::LoadTranscript(path) => match session.load_transcript_from(&path) {
            Ok(()) => {
                renderer.print_info(&format!("Transcript loaded from {}", path));
                renderer.print_transcript(session.history());
            }
            Err(err) => renderer.print_error(&format!("Failed to load transcript: {}", err)),
        },
        ChatCommand::Stats => print_stats(session),
        ChatCommand::ShowConfig => print_config(session),
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
    true
}

fn print_stats<A: Assistant>(session: &ChatSession<A>) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Messages: {}", stats.transcript_len);
    println!(
        "      Exchanges: {} ({} failed)",
        stats.exchanges, stats.failures
    );
    println!("      Topics: {}", stats.topics);
    println!("      Clarifications: {}", stats.clarifications);
    match stats.context_id {
        Some(ref id) => println!("      Context: {}", id),
        None => println!("      Context: (none)"),
    }
    match stats.transcript_path {
        Some(ref path) => println!("      Transcript file: {}", path.display()),
        None => println!("      Transcript file: (disabled)"),
    }
}

fn print_config<A: Assistant>(session: &ChatSession<A>) {
    let config = session.config();
    println!("    Current Configuration:");
    println!(
        "      Base URL: {}",
        config.base_url.as_deref().unwrap_or("(default)")
    );
    println!("      Poll interval: {:?}", config.poll.interval);
    println!("      Max attempts: {}", config.poll.max_attempts);
    println!(
        "      Clarification phrases: {}",
        config.classifier.phrases().len()
    );
    println!(
        "      Clarification template: {:?}",
        config.clarification_template.as_str()
    );
    match config.transcript_path {
        Some(ref path) => println!("      Transcript file: {}", path.display()),
        None => println!("      Transcript file: (disabled)"),
    }
}
