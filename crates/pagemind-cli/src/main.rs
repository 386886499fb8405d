//! pagemind - summarize, translate and chat about web pages with a local model

mod commands;
mod config;
mod history;
mod native;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::Parser;
use pagemind_engine::{ModelSpec, SamplingParams, models, providers::ollama};
use pagemind_runtime::{
    ActionOutcome, BackgroundService, ContextAction, HistoryStore, ManagerConfig, MemoryHistory,
    ModelManager, Notification, NotificationBus, PageContext, Payload, PopupController,
    PromptTemplates, Request, Role, Subscription, popup::NO_SELECTION, prompts,
    protocol::DEFAULT_MAX_TOKENS, transport::Port,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use commands::Command;

/// pagemind - summarize, translate and chat about web pages with a local model
#[derive(Parser, Debug)]
#[command(name = "pagemind")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to load, by id or name (default: stablelm2:1.6b-zephyr)
    #[arg(short, long)]
    model: Option<String>,

    /// Model tried once if the main one fails to load
    #[arg(long, conflicts_with = "no_fallback")]
    fallback_model: Option<String>,

    /// Do not fall back to a smaller model
    #[arg(long)]
    no_fallback: bool,

    /// Base URL of the local inference engine
    #[arg(long)]
    engine_url: Option<String>,

    /// HTML file to open as the current page
    #[arg(long)]
    page: Option<PathBuf>,

    /// Text to treat as the current selection
    #[arg(long)]
    selection: Option<String>,

    /// Language for summaries and translations (default: Japanese)
    #[arg(short, long)]
    language: Option<String>,

    /// Upper bound on tokens per generation
    #[arg(long)]
    max_tokens_ceiling: Option<u32>,

    /// Conversation history file
    #[arg(long, conflicts_with = "no_history")]
    history: Option<PathBuf>,

    /// Keep the conversation in memory only
    #[arg(long)]
    no_history: bool,

    /// Run in non-interactive mode with a single chat message
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Summarize the selection (or the page when nothing is selected) and exit
    #[arg(long, conflicts_with_all = ["command", "translate"])]
    summarize: bool,

    /// Translate the selection and exit
    #[arg(long, conflicts_with = "command")]
    translate: bool,

    /// Print the model status as JSON and exit
    #[arg(long)]
    status: bool,

    /// Serve the native-messaging protocol on stdin/stdout
    #[arg(long)]
    native_host: bool,

    /// Do not start loading the model at startup
    #[arg(long)]
    no_autoload: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Settings after merging the config file with CLI flags (flags win)
#[derive(Debug)]
struct Settings {
    model: ModelSpec,
    fallback: Option<ModelSpec>,
    engine_url: String,
    max_tokens_ceiling: u32,
    language: String,
    /// `None` keeps the conversation in memory
    history_path: Option<PathBuf>,
}

impl Settings {
    fn resolve(args: &Args, cfg: &config::Config) -> Self {
        let model = args
            .model
            .as_deref()
            .or(cfg.model.as_deref())
            .map(models::resolve_model)
            .unwrap_or_else(models::default_model);

        let fallback = if args.no_fallback {
            None
        } else {
            match args.fallback_model.as_deref().or(cfg.fallback_model.as_deref()) {
                Some(key) if key.eq_ignore_ascii_case("none") => None,
                Some(key) => Some(models::resolve_model(key)),
                None => Some(models::default_fallback()),
            }
        };

        let engine_url = pagemind_engine::providers::engine_url(
            args.engine_url.as_deref().or(cfg.engine_url.as_deref()),
            ollama::BASE_URL_ENV,
            ollama::DEFAULT_BASE_URL,
        );

        Self {
            model,
            fallback,
            engine_url,
            max_tokens_ceiling: args
                .max_tokens_ceiling
                .or(cfg.max_tokens_ceiling)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            language: args
                .language
                .clone()
                .or_else(|| cfg.language.clone())
                .unwrap_or_else(|| prompts::DEFAULT_LANGUAGE.to_string()),
            history_path: (!args.no_history)
                .then(|| args.history.clone().unwrap_or_else(|| cfg.history_path())),
        }
    }

    fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            model: self.model.clone(),
            fallback: self.fallback.clone(),
            max_tokens_ceiling: self.max_tokens_ceiling,
            sampling: SamplingParams::default(),
        }
    }
}

fn init_tracing(verbose: bool) {
    // Stderr only: stdout carries answers and, for the native host, the protocol.
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("pagemind=debug,pagemind_engine=debug,pagemind_runtime=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init().context("failed to create config file")?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = config::Config::load();
    let settings = Settings::resolve(&args, &cfg);
    tracing::debug!(?settings, "Resolved settings");

    let bus = NotificationBus::new();
    let engine = Arc::new(ollama::OllamaEngine::new(&settings.engine_url));
    let manager = ModelManager::new(settings.manager_config(), engine, bus.clone());
    let templates = PromptTemplates::new(&settings.language);

    let page = PageContext::new();
    if let Some(ref path) = args.page {
        let html = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read page {}", path.display()))?;
        page.set_page(html);
    }
    if let Some(ref selection) = args.selection {
        page.set_selection(selection.as_str());
    }

    // Subscribe before the background starts so autoload notifications are seen
    let notifications = bus.subscribe();
    let one_shot = args.status || args.command.is_some() || args.summarize || args.translate;
    let autoload = !args.no_autoload && !args.status;
    let (background, _background_task) =
        BackgroundService::new(manager, templates.clone()).spawn(autoload);
    let (content, _content_task) = page.spawn();

    if args.native_host {
        return native::run_stdio(background, notifications).await;
    }

    if args.status {
        let response = background.send(Request::GetModelStatus).await;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if one_shot {
        return run_one_shot(&args, &background, &content, &page, notifications).await;
    }

    let history: Arc<dyn HistoryStore> = match &settings.history_path {
        Some(path) => Arc::new(history::FileHistory::new(path)),
        None => Arc::new(MemoryHistory::new()),
    };
    let popup = PopupController::open(background.clone(), content, history, templates).await;
    run_interactive(popup, background, page, notifications, &settings.model).await
}

/// Ask for a load and wait until the model is ready, reporting progress on stderr
async fn wait_until_ready(background: &Port, notifications: &mut Subscription) -> anyhow::Result<()> {
    match background.send(Request::LoadModel).await.into_result() {
        Ok(Payload::LoadState { ready: true, .. }) => return Ok(()),
        Ok(_) => {}
        Err(e) => bail!(e),
    }

    while let Some(notification) = notifications.recv().await {
        match notification {
            Notification::ModelLoading => eprintln!("Loading model..."),
            Notification::DownloadProgress { progress } => {
                eprint!("\rLoading model... {progress}%");
                std::io::stderr().flush().ok();
            }
            Notification::ModelReady { model_name } => {
                eprintln!("\rModel ready: {model_name}        ");
                return Ok(());
            }
            Notification::ModelError { error } => bail!(error),
        }
    }
    bail!("notification bus closed before the model was ready")
}

async fn run_one_shot(
    args: &Args,
    background: &Port,
    content: &Port,
    page: &PageContext,
    mut notifications: Subscription,
) -> anyhow::Result<()> {
    wait_until_ready(background, &mut notifications).await?;

    if let Some(ref message) = args.command {
        let response = background
            .send(Request::GenerateText {
                prompt: prompts::chat_prompt(message),
                max_tokens: None,
            })
            .await;
        return match response.into_result() {
            Ok(Payload::Generated { response }) => {
                println!("{response}");
                Ok(())
            }
            Ok(other) => bail!("unexpected response: {other:?}"),
            Err(e) => bail!(e),
        };
    }

    let selection = page.selection();
    let (action, text) = if args.translate {
        if !selection.has_selection {
            bail!(NO_SELECTION);
        }
        (ContextAction::Translate, selection.text)
    } else if selection.has_selection {
        (ContextAction::Summarize, selection.text)
    } else {
        match content.send(Request::GetPageContent).await.into_result() {
            Ok(Payload::PageContent { content }) => (ContextAction::Summarize, content),
            Ok(other) => bail!("unexpected response: {other:?}"),
            Err(e) => bail!(e),
        }
    };

    eprintln!("{}", action.pending_toast().message);
    let outcome = action.run(&text, background).await;
    eprintln!("{}", outcome.toast().message);
    match outcome {
        ActionOutcome::Completed { action, result } => {
            println!("{}:\n{}", action.result_title(), result);
            Ok(())
        }
        ActionOutcome::Failed { error, .. } => bail!(error),
    }
}

fn print_prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}

async fn run_interactive(
    mut popup: PopupController,
    background: Port,
    page: PageContext,
    mut notifications: Subscription,
    model: &ModelSpec,
) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("pagemind ({})  {}", model.id, popup.status().message);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_prompt()?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(notification) = notifications.recv() => {
                let status = popup.on_notification(&notification);
                // Progress is noisy; only the start and the outcome get their own line.
                if !matches!(notification, Notification::DownloadProgress { .. }) {
                    println!("\n[{}]", status.message);
                    print_prompt()?;
                }
                continue;
            }
        };

        // EOF
        let Some(line) = line else { break };
        let input = line.trim();
        if input.is_empty() {
            print_prompt()?;
            continue;
        }

        match commands::parse_command(input) {
            None => {
                if !popup.is_model_ready() {
                    eprintln!("[{}]", popup.status().message);
                }
                if let Some(reply) = popup.send_message(input).await {
                    println!("{reply}");
                }
            }
            Some(Command::Exit) => break,
            Some(command) => {
                run_command(command, &mut popup, &background, &page, &mut lines).await?;
            }
        }
        println!();
        print_prompt()?;
    }

    Ok(())
}

async fn run_command<R>(
    command: Command,
    popup: &mut PopupController,
    background: &Port,
    page: &PageContext,
    lines: &mut tokio::io::Lines<R>,
) -> anyhow::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match command {
        Command::Summarize => println!("{}", popup.summarize_page().await),
        Command::Translate => println!("{}", popup.translate_selection().await),
        Command::Select(text) => {
            page.set_selection(text.as_str());
            if page.selection().has_selection {
                println!("Selection set ({} chars).", text.chars().count());
            } else {
                println!("Selection cleared.");
            }
        }
        Command::Open(path) => match tokio::fs::read_to_string(&path).await {
            Ok(html) => {
                page.set_page(html);
                println!("Opened {}.", path.display());
            }
            Err(e) => println!("Could not open {}: {}", path.display(), e),
        },
        Command::Status => {
            let response = background.send(Request::GetModelStatus).await;
            match response.into_result() {
                Ok(Payload::ModelStatus {
                    is_loading,
                    is_ready,
                    model_name,
                    progress,
                }) => {
                    let phase = match (is_ready, is_loading) {
                        (true, _) => "ready".to_string(),
                        (false, true) => format!("loading ({progress}%)"),
                        (false, false) => "not loaded".to_string(),
                    };
                    println!("{model_name}: {phase}");
                }
                Ok(other) => println!("Unexpected response: {other:?}"),
                Err(e) => println!("Error: {e}"),
            }
        }
        Command::Load => match background.send(Request::LoadModel).await.into_result() {
            Ok(Payload::LoadState { ready: true, .. }) => println!("Model is already loaded."),
            Ok(Payload::LoadState { progress, .. }) => println!("Loading model ({progress}%)..."),
            Ok(other) => println!("Unexpected response: {other:?}"),
            Err(e) => println!("Error: {e}"),
        },
        Command::Clear => {
            print!("Clear conversation history? [y/N] ");
            std::io::stdout().flush()?;
            let answer = lines.next_line().await?.unwrap_or_default();
            if popup.clear(commands::is_confirmation(&answer)).await {
                println!("Cleared conversation.");
            } else {
                println!("Kept conversation.");
            }
        }
        Command::History => {
            let entries = popup.entries();
            if entries.is_empty() {
                println!("No messages yet.");
            }
            for entry in entries {
                let who = match entry.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                let when = chrono::DateTime::from_timestamp_millis(entry.timestamp)
                    .map(|dt| dt.format("%H:%M:%S").to_string())
                    .unwrap_or_default();
                println!("[{when}] {who}: {}", entry.text);
            }
        }
        Command::Message(msg) => println!("{msg}"),
        Command::Unknown(cmd) => {
            println!("Unknown command: /{cmd}");
            println!("Type /help for available commands.");
        }
        Command::Exit => {}
    }
    Ok(())
}
