use crate::backend::ChatBackend;
use crate::config::Config;
use crate::directory::{search_by_name, ConversationDirectory};
use crate::engine::{ChatEngine, EngineHandle};
use crate::error::ChatError;
use crate::events::EngineEvent;
use crate::http_backend::HttpChatBackend;
use crate::model::{Conversation, ConversationId, Message, MessageId};
use crate::scheduler::Visibility;
use colored::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

/// Command line front-end: one-shot commands plus an interactive `watch` mode.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("chatsync")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let command = args[1].as_str();
    let (positional, flags) = split_flags(&args[2..]);
    let config = Config::from_args(flags)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    match command {
        "list" => {
            let query = positional.join(" ");
            list_conversations(&config, &query).await?;
        }
        "send" => {
            if positional.len() < 2 {
                eprintln!("{}", format!("Usage: {} send <conversation_id> <message>", bin).yellow());
                return Ok(());
            }
            let conversation = parse_id(&positional[0])?;
            send_once(&config, conversation, &positional[1..].join(" ")).await?;
        }
        "open-with" => {
            if positional.is_empty() {
                eprintln!("{}", format!("Usage: {} open-with <profile_id>", bin).yellow());
                return Ok(());
            }
            let profile = parse_id(&positional[0])?;
            open_with(&config, profile).await?;
        }
        "watch" => {
            watch_conversations(config).await?;
        }
        "help" | "--help" | "-h" => print_usage(&bin),
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

/// Positional arguments run up to the first `--flag`.
fn split_flags(args: &[String]) -> (&[String], &[String]) {
    let at = args
        .iter()
        .position(|a| a.starts_with("--"))
        .unwrap_or(args.len());
    args.split_at(at)
}

fn parse_id(raw: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| anyhow::anyhow!("Expected a numeric id, got {:?}", raw))
}

fn print_usage(bin: &str) {
    println!("{}", "💬 Chatsync CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args] [--flags]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} [query]                    List conversations, optionally filtered by name", "list".cyan());
    println!("  {} <conversation_id> <text>   Send one message", "send".cyan());
    println!("  {} <profile_id>          Find or create a conversation with a user", "open-with".cyan());
    println!("  {}                           Follow conversations interactively", "watch".cyan());
    println!();
    println!("{}", "Flags:".bright_white().bold());
    println!("  {} <url>   {} <cookie>   {} requester|responder", "--base-url".cyan(), "--session".cyan(), "--role".cyan());
    println!("  {} <n>   {} <id>   {} <px>", "--poll-secs".cyan(), "--conversation".cyan(), "--near-bottom-px".cyan());
    println!("  {}   {}", "--keep-failed".cyan(), "--no-mark-read".cyan());
}

fn print_watch_help() {
    println!("{}", "Type a line to send it. Commands:".dimmed());
    println!("  {} <id>      switch conversation", "/open".cyan());
    println!("  {} <id>      open a conversation with a profile", "/with".cyan());
    println!("  {} <text>   set the draft without sending", "/draft".cyan());
    println!("  {}          send the current draft", "/send".cyan());
    println!("  {} <query> filter the conversation list", "/search".cyan());
    println!("  {} / {}  pause or resume polling", "/hide".cyan(), "/show".cyan());
    println!("  {}  {}", "/reload".cyan(), "/quit".cyan());
}

// ─── One-shot commands ───────────────────────────────────────────────────────

async fn list_conversations(config: &Config, query: &str) -> anyhow::Result<()> {
    let backend = HttpChatBackend::new(config)?;
    let mut directory = ConversationDirectory::new(None);
    directory
        .load(&backend)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    print_directory(&directory.search(query));
    Ok(())
}

async fn send_once(config: &Config, conversation: ConversationId, text: &str) -> anyhow::Result<()> {
    let text = text.trim();
    if text.is_empty() {
        eprintln!("{}", "Nothing to send".yellow());
        return Ok(());
    }
    let backend = HttpChatBackend::new(config)?;
    match backend.create_message(conversation, text).await {
        Ok(message) => {
            println!("{} Message sent! ID: {}", "✓".green().bold(), message.id.to_string().cyan());
        }
        Err(e) => exit_with(&e),
    }
    Ok(())
}

async fn open_with(config: &Config, profile: u64) -> anyhow::Result<()> {
    let backend = HttpChatBackend::new(config)?;
    match backend.open_conversation_with(profile).await {
        Ok(id) => println!("{} Conversation {}", "✓".green().bold(), id.to_string().cyan()),
        Err(e) => exit_with(&e),
    }
    Ok(())
}

/// Text for a failed one-shot command. Transient failures get a retry hint.
fn failure_text(e: &ChatError) -> String {
    if e.is_transient() {
        format!("{} (temporary problem, try again)", e.user_message())
    } else {
        e.user_message()
    }
}

fn exit_with(e: &ChatError) -> ! {
    eprintln!("{} Error: {}", "✗".red().bold(), failure_text(e).red());
    std::process::exit(1);
}

// ─── Interactive mode ────────────────────────────────────────────────────────

async fn watch_conversations(config: Config) -> anyhow::Result<()> {
    let backend: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(&config)?);
    let (visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let (engine, handle) = ChatEngine::new(&config, backend, visibility_rx);
    let mut events = handle.subscribe();
    let engine_task = tokio::spawn(engine.run());

    print_watch_help();

    let mut view = WatchView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(line.trim(), &handle, &visibility_tx, &view)? {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => view.render(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Display lagged {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    // Engine may already be gone (every handle dropped)
    let _ = handle.shutdown();
    engine_task.await??;
    Ok(())
}

/// Returns false when the user asked to quit.
fn handle_input(
    line: &str,
    handle: &EngineHandle,
    visibility: &watch::Sender<Visibility>,
    view: &WatchView,
) -> anyhow::Result<bool> {
    let (command, rest) = match line.split_once(' ') {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match command {
        "" | "/send" => handle.send()?,
        "/quit" | "/exit" => return Ok(false),
        "/open" => match rest.parse::<ConversationId>() {
            Ok(id) => handle.select(id)?,
            Err(_) => eprintln!("{}", "Usage: /open <conversation_id>".yellow()),
        },
        "/with" => match rest.parse::<u64>() {
            Ok(profile) => handle.open_with(profile)?,
            Err(_) => eprintln!("{}", "Usage: /with <profile_id>".yellow()),
        },
        "/draft" => handle.set_draft(rest)?,
        "/search" => print_directory(&search_by_name(&view.conversations, rest)),
        "/hide" => {
            visibility.send_replace(Visibility::Hidden);
            println!("{}", "Polling paused".dimmed());
        }
        "/show" => {
            visibility.send_replace(Visibility::Visible);
            println!("{}", "Polling resumed".dimmed());
        }
        "/reload" => handle.reload_directory()?,
        "/help" => print_watch_help(),
        _ if command.starts_with('/') => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
        }
        _ => {
            handle.set_draft(line)?;
            handle.send()?;
        }
    }
    Ok(true)
}

/// Terminal rendering state: prints only what is new since the last commit.
#[derive(Default)]
struct WatchView {
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
    shown: HashSet<MessageId>,
}

impl WatchView {
    fn render(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::DirectoryUpdated { conversations } => {
                let first_load = self.conversations.is_empty();
                self.conversations = conversations;
                if first_load {
                    print_directory(&self.conversations.iter().collect::<Vec<_>>());
                }
            }
            EngineEvent::SelectionChanged { conversation_id } => {
                self.active = Some(conversation_id);
                self.shown.clear();
                let name = self
                    .conversations
                    .iter()
                    .find(|c| c.id == conversation_id)
                    .map(|c| c.counterpart.display_name.as_str())
                    .unwrap_or("Conversation");
                println!();
                println!(
                    "{} {} {}",
                    "──".bright_cyan(),
                    format!("{} (#{})", name, conversation_id).bright_white().bold(),
                    "─".repeat(40).bright_cyan()
                );
            }
            EngineEvent::MessagesCommitted {
                conversation_id,
                messages,
                ..
            } => {
                if self.active != Some(conversation_id) {
                    return;
                }
                for message in &messages {
                    if self.shown.insert(message.id) {
                        print_message(message);
                    }
                }
            }
            EngineEvent::ScrollToBottom { .. } => {}
            EngineEvent::DraftChanged { text } => {
                if !text.is_empty() {
                    println!("{} {}", "draft:".dimmed(), text.dimmed());
                    println!("{}", "(press Enter to send it)".dimmed());
                }
            }
            EngineEvent::Error { message } => {
                eprintln!("{} {}", "✗".red().bold(), message.red());
            }
            EngineEvent::ErrorCleared => {
                println!("{}", "✓ Back online".green());
            }
        }
    }
}

fn print_directory(conversations: &[&Conversation]) {
    if conversations.is_empty() {
        println!("{}", "No conversations found".yellow());
        return;
    }
    println!(
        "{}",
        format!("Conversations ({})", conversations.len())
            .bright_cyan()
            .bold()
    );
    println!("{}", "─".repeat(60).dimmed());
    for c in conversations {
        let unread = if c.unread_count > 0 {
            format!(" [{}]", c.unread_count).yellow().bold()
        } else {
            "".normal()
        };
        println!(
            "  {} {}{}  {}",
            format!("#{}", c.id).cyan(),
            c.counterpart.display_name.bright_white(),
            unread,
            c.last_message_preview.dimmed()
        );
    }
}

fn print_message(message: &Message) {
    let time = message.created_at.format("%H:%M").to_string();
    if message.is_pending() {
        println!("  {} {} {}", time.dimmed(), "you:".green(), format!("{} (sending…)", message.text).dimmed());
    } else if message.is_mine {
        println!("  {} {} {}", time.dimmed(), "you:".green(), message.text);
    } else {
        println!("  {} {} {}", time.dimmed(), "them:".cyan(), message.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_flags() {
        let args = strings(&["12", "hello", "there", "--role", "blogger"]);
        let (positional, flags) = split_flags(&args);
        assert_eq!(positional, &strings(&["12", "hello", "there"])[..]);
        assert_eq!(flags, &strings(&["--role", "blogger"])[..]);

        let args = strings(&["--keep-failed"]);
        let (positional, flags) = split_flags(&args);
        assert!(positional.is_empty());
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn test_failure_text_hints_retry_for_transient_errors() {
        let down = ChatError::Network("reset".to_string());
        assert_eq!(
            failure_text(&down),
            "Connection to the server failed (temporary problem, try again)"
        );

        let denied = ChatError::Server {
            status: 403,
            message: "Not a participant".to_string(),
        };
        assert_eq!(failure_text(&denied), "Not a participant");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id(" 42 ").unwrap(), 42);
        assert!(parse_id("abc").is_err());
    }
}
