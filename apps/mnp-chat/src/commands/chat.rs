//! Interactive chat session.
//!
//! The store is the only state: a printer task renders whatever it emits,
//! and each stdin line becomes one intent on the store or the connection.

use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use clap::Args;
use colored::Colorize;
use mnp_chat::config::loader::load_merged;
use mnp_chat::types::{
    ActionKind, ChatMode, ConnectionStatus, DeliveryStatus, EscalationOptions, Message,
    MessageType,
};
use mnp_chat::{ApiClient, ChatState, ChatStore, ConnectionManager, ConnectionOptions, StoreOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

const DEFAULT_ESCALATION_REASON: &str = "Customer asked for a human agent";

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Conversation mode: step-by-step | roadmap
    #[arg(long, default_value = "step-by-step")]
    mode: ChatMode,

    /// Resume an existing session token
    #[arg(long, value_name = "TOKEN")]
    session_token: Option<String>,

    /// Do not open the real-time channel; REST only
    #[arg(long)]
    offline: bool,

    /// Path to use as local directory for config (defaults to current dir)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Escalation status poll interval in seconds
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    poll_interval: u64,
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Say(String),
    Pick(usize),
    Escalate(Option<String>),
    Status,
    Mode(String),
    Retry,
    Export(Option<PathBuf>),
    Reconnect,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(cmd) = line.strip_prefix('/') else {
        return match line.parse::<usize>() {
            Ok(n) if n > 0 => Input::Pick(n),
            _ => Input::Say(line.to_string()),
        };
    };

    let (name, rest) = cmd.split_once(char::is_whitespace).unwrap_or((cmd, ""));
    let rest = rest.trim();
    let arg = (!rest.is_empty()).then(|| rest.to_string());
    match name {
        "escalate" => Input::Escalate(arg),
        "status" => Input::Status,
        "mode" => Input::Mode(rest.to_string()),
        "retry" => Input::Retry,
        "export" => Input::Export(arg.map(PathBuf::from)),
        "reconnect" => Input::Reconnect,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => Input::Unknown(other.to_string()),
    }
}

const HELP: &str = "\
Type a question and press enter. A number picks a suggested option.
  /escalate [reason]  talk to a person
  /status             connection and escalation status
  /mode <mode>        step-by-step | roadmap
  /retry              resend the last undelivered message
  /export [path]      chat history as JSON (stdout without a path)
  /reconnect          reopen the real-time channel
  /quit               leave";

enum Flow {
    Continue,
    Quit,
}

struct Repl {
    store: ChatStore,
    conn: Option<ConnectionManager>,
    poll_interval: Duration,
    watcher: Option<JoinHandle<()>>,
}

pub async fn execute(args: ChatArgs) -> Result<()> {
    let dir = match args.path {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    let loaded = load_merged(&dir)
        .with_context(|| format!("Failed to load config from {}", dir.display()))?;
    for warning in &loaded.warnings {
        eprintln!("{} {}", "WARN".yellow(), warning);
    }
    let mut config = loaded.config;
    if let Some(token) = args.session_token {
        config.session_token = Some(token);
    }

    let api = Arc::new(ApiClient::new(&config).context("Failed to build HTTP client")?);
    let store = ChatStore::new(api.clone(), StoreOptions::from_config(&config));
    let session = store.start_new_session(args.mode);
    tracing::info!(session = %session.id, mode = %session.mode, "session started");

    let printer = spawn_printer(store.clone());

    let conn = if args.offline {
        None
    } else {
        let conn =
            ConnectionManager::spawn(ConnectionOptions::from_config(&config), api, store.clone());
        if let Err(e) = conn.connect().await {
            eprintln!("{} {e}", "WARN".yellow());
        }
        Some(conn)
    };

    let mut repl = Repl {
        store,
        conn,
        poll_interval: Duration::from_secs(args.poll_interval.max(1)),
        watcher: None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match repl.handle(parse_input(&line)).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("{} {e:#}", "ERROR".red()),
        }
    }

    repl.store.dispose();
    if let Some(conn) = repl.conn.take() {
        conn.shutdown().await;
    }
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "printer task failed");
    }
    Ok(())
}

impl Repl {
    async fn handle(&mut self, input: Input) -> Result<Flow> {
        match input {
            Input::Empty => {}
            Input::Say(text) => self.say(&text).await,
            Input::Pick(n) => self.pick(n).await?,
            Input::Escalate(reason) => {
                self.escalate(reason.as_deref().unwrap_or(DEFAULT_ESCALATION_REASON))
                    .await?;
            }
            Input::Status => self.status().await,
            Input::Mode(name) => {
                let mode: ChatMode = name.parse().map_err(|e: String| anyhow!(e))?;
                self.store.switch_mode(mode);
            }
            Input::Retry => self.retry().await?,
            Input::Export(path) => self.export(path)?,
            Input::Reconnect => match &self.conn {
                Some(conn) => conn.reconnect().await?,
                None => println!("{}", "Running offline; no real-time channel.".dimmed()),
            },
            Input::Help => println!("{HELP}"),
            Input::Quit => return Ok(Flow::Quit),
            Input::Unknown(cmd) => println!("Unknown command /{cmd}. Type /help."),
        }
        Ok(Flow::Continue)
    }

    async fn say(&self, text: &str) {
        // Failures are already in the store as a fallback reply or ui.error.
        if let Err(e) = self.store.send_message(text).await {
            tracing::debug!(error = %e, "send failed");
        }
    }

    async fn pick(&mut self, n: usize) -> Result<()> {
        let action = self
            .store
            .snapshot()
            .messages
            .iter()
            .rev()
            .find(|m| !m.actions().is_empty())
            .and_then(|m| m.actions().get(n - 1).cloned())
            .ok_or_else(|| anyhow!("No option {n}"))?;
        match action.kind {
            ActionKind::Escalation => self.escalate(&action.value).await,
            _ => {
                self.say(&action.value).await;
                Ok(())
            }
        }
    }

    async fn escalate(&mut self, reason: &str) -> Result<()> {
        self.store
            .initiate_escalation(reason, EscalationOptions::default())
            .await?;
        if let Some(old) = self.watcher.take() {
            old.abort();
        }
        self.watcher = Some(self.store.watch_escalation(self.poll_interval));
        Ok(())
    }

    async fn status(&self) {
        if let Err(e) = self.store.refresh_escalation_status().await {
            tracing::debug!(error = %e, "status refresh failed");
        }
        let state = self.store.snapshot();
        match &self.conn {
            Some(conn) => {
                let c = conn.state();
                println!("Connection: {}", describe_connection(state.ui.connection));
                if let Some(err) = c.last_error {
                    println!("  last error: {err}");
                }
                let d = conn.diagnostics().snapshot();
                println!(
                    "  dropped frames: malformed {}, unknown kind {}, incomplete {}",
                    d.malformed, d.unknown_kind, d.incomplete_message
                );
            }
            None => println!("Connection: offline"),
        }
        println!("Mode: {}", state.mode.label());
        let esc = &state.escalation;
        if esc.is_escalated {
            println!(
                "Escalation: {} (ticket {})",
                esc.status,
                esc.ticket_id.as_deref().unwrap_or("unknown")
            );
            if let Some(agent) = &esc.assigned_agent {
                println!("  agent: {agent}");
            }
        } else {
            println!("Escalation: none");
        }
    }

    async fn retry(&self) -> Result<()> {
        let failed = self
            .store
            .snapshot()
            .messages
            .iter()
            .rev()
            .find(|m| {
                m.kind == MessageType::User && m.delivery_status == Some(DeliveryStatus::Failed)
            })
            .map(|m| m.id.clone());
        match failed {
            Some(id) => self.store.retry_message(&id).await.map_err(Into::into),
            None => {
                println!("Nothing to retry.");
                Ok(())
            }
        }
    }

    fn export(&self, path: Option<PathBuf>) -> Result<()> {
        let json = self.store.export_chat_history()?;
        match path {
            Some(path) => {
                AtomicFile::new(&path, OverwriteBehavior::AllowOverwrite)
                    .write(|f| f.write_all(json.as_bytes()))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!(
                    "{} Exported to {}",
                    "OK".green(),
                    path.display().to_string().cyan()
                );
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

fn describe_connection(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Disconnected => "disconnected".into(),
        ConnectionStatus::Connecting => "connecting".into(),
        ConnectionStatus::Connected => "connected".into(),
        ConnectionStatus::Reconnecting { attempt } => format!("reconnecting (attempt {attempt})"),
        ConnectionStatus::Exhausted => "gave up reconnecting; /reconnect to retry".into(),
    }
}

/// What the printer has already shown.
#[derive(Default)]
struct Rendered {
    messages: HashSet<String>,
    failed: HashSet<String>,
    connection: Option<ConnectionStatus>,
    error: Option<String>,
}

impl Rendered {
    fn render(&mut self, state: &ChatState) {
        for msg in &state.messages {
            if self.messages.insert(msg.id.clone()) && msg.kind != MessageType::User {
                print_message(msg);
            }
            if msg.delivery_status == Some(DeliveryStatus::Failed)
                && self.failed.insert(msg.id.clone())
            {
                println!("{}", "  (not delivered; /retry to resend)".dimmed());
            }
        }

        if self.connection != Some(state.ui.connection) {
            if self.connection.is_some() {
                eprintln!(
                    "{}",
                    format!("[{}]", describe_connection(state.ui.connection)).dimmed()
                );
            }
            self.connection = Some(state.ui.connection);
        }

        if state.ui.error != self.error {
            if let Some(err) = &state.ui.error {
                eprintln!("{} {err}", "ERROR".red());
            }
            self.error.clone_from(&state.ui.error);
        }
    }
}

fn print_message(msg: &Message) {
    let who = match msg.kind {
        MessageType::Ai => "assistant".cyan().bold(),
        MessageType::System => "system".yellow(),
        MessageType::User => "you".green(),
    };
    if msg.is_demo() {
        println!("{who} {}: {}", "(offline)".dimmed(), msg.content);
    } else {
        println!("{who}: {}", msg.content);
    }
    for (i, action) in msg.actions().iter().enumerate() {
        println!("  [{}] {}", i + 1, action.label);
    }
}

fn spawn_printer(store: ChatStore) -> JoinHandle<()> {
    let mut rx = store.subscribe();
    let cancel = store.cancellation();
    tokio::spawn(async move {
        let mut rendered = Rendered::default();
        loop {
            let state = rx.borrow_and_update().clone();
            rendered.render(&state);
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = rx.changed() => if changed.is_err() { break },
            }
        }
    })
}
