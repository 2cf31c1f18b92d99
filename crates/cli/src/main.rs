use anyhow::Result;
use clap::{Parser, Subcommand};
use lib::alerts::Alerts;
use lib::attachment::AttachmentPipeline;
use lib::credentials::{CredentialStore, Credentials};
use lib::message::{ConversationItem, SenderRole};
use lib::sync::ConversationSync;
use lib::thumbnail::NoopFrameExtractor;
use lib::transport::{RequestOptions, Transport, TransportError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

#[derive(Parser)]
#[command(name = "coachline")]
#[command(about = "Coachline terminal client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default config file (default: COACHLINE_CONFIG_PATH or ~/.coachline/config.json)
    Init {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Log in and persist the session token next to the config file
    Login {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Chat with your coach (interactive): polls in the background, sends
    /// text lines, `/send <path> [caption]` uploads an attachment
    Chat {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Talk to support instead of your coach
        #[arg(long)]
        support: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("coachline {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Login {
            config,
            email,
            password,
        }) => {
            if let Err(e) = run_login(config, email, password).await {
                log::error!("login failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, support }) => {
            if let Err(e) = run_chat(config, support).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config: Option<PathBuf>) -> Result<()> {
    let path = config.unwrap_or_else(lib::config::default_config_path);
    if path.exists() {
        println!("config already exists: {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let defaults = lib::config::Config::default();
    std::fs::write(&path, serde_json::to_string_pretty(&defaults)?)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn run_login(config: Option<PathBuf>, email: String, password: String) -> Result<()> {
    let (config, config_path) = lib::config::load_config(config)?;
    let credentials = CredentialStore::open(lib::config::credentials_path(&config_path));
    let transport = Transport::new(&config, credentials.clone(), Alerts::new());

    // Login failures render inline here; the global banner stays quiet.
    let res = transport
        .request(
            "/auth/login",
            RequestOptions::post_json(serde_json::json!({
                "email": email,
                "password": password,
            }))
            .local_only(),
        )
        .await;

    match res {
        Ok(res) => {
            let body: serde_json::Value = res
                .json()
                .await
                .map_err(|e| anyhow::anyhow!("decoding login response: {}", e))?;
            let token = body
                .get("token")
                .and_then(|v| v.as_str())
                .ok_or_else(|| anyhow::anyhow!("login response missing token"))?;
            credentials
                .store(Credentials {
                    token: token.to_string(),
                })
                .await?;
            println!("logged in");
            Ok(())
        }
        Err(TransportError::Http { status: 401, .. }) => {
            anyhow::bail!("invalid email or password")
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_chat(config: Option<PathBuf>, support: bool) -> Result<()> {
    let (config, config_path) = lib::config::load_config(config)?;
    let credentials = CredentialStore::open(lib::config::credentials_path(&config_path));
    if credentials.token().await.is_none() {
        anyhow::bail!("not logged in; run `coachline login` first");
    }

    let alerts = Alerts::new();
    let mut alert_rx = alerts.subscribe();
    tokio::spawn(async move {
        while let Ok(key) = alert_rx.recv().await {
            eprintln!("! {}", key);
        }
    });

    let transport = Transport::new(&config, credentials, alerts.clone());
    let pipeline = AttachmentPipeline::new(
        transport.clone(),
        alerts,
        Arc::new(NoopFrameExtractor),
        config.upload_timeout_ms,
    );

    let counterpart = if support {
        SenderRole::Support
    } else {
        SenderRole::Coach
    };
    let pair = lib::endpoints::resolve(SenderRole::Client, counterpart);

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let sync = Arc::new(ConversationSync::new(
        transport,
        pair,
        lib::reconcile::local_offset(),
        config.poll_interval_secs,
        tx,
    ));
    tokio::spawn(async move {
        let extractor = NoopFrameExtractor;
        while let Some(items) = rx.recv().await {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    ConversationItem::Message(m) => resolved.push(ConversationItem::Message(
                        lib::thumbnail::resolve(&m, &extractor).await,
                    )),
                    other => resolved.push(other),
                }
            }
            render(&resolved);
        }
    });
    let poll_task = sync.clone().start();

    println!("type a message, `/send <path> [caption]`, or `/quit`");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Some(rest) = line.strip_prefix("/send ") {
            let mut parts = rest.splitn(2, ' ');
            let path = PathBuf::from(parts.next().unwrap_or(""));
            let caption = parts.next().unwrap_or("").to_string();
            match pipeline.prepare(&path).await {
                Ok(pending) => {
                    if let Err(e) = sync.send_attachment(&pipeline, pending, &caption).await {
                        eprintln!("send failed: {}", e);
                    }
                }
                Err(e) => eprintln!("could not prepare {}: {}", path.display(), e),
            }
            continue;
        }
        if let Err(e) = sync.send_text(&line).await {
            eprintln!("send failed: {}", e);
        }
    }

    sync.stop();
    let _ = poll_task.await;
    Ok(())
}

fn role_label(role: SenderRole) -> &'static str {
    match role {
        SenderRole::Client => "you",
        SenderRole::Coach => "coach",
        SenderRole::Support => "support",
    }
}

fn render(items: &[ConversationItem]) {
    println!();
    for item in items {
        match item {
            ConversationItem::DateMarker(date) => println!("--- {} ---", date),
            ConversationItem::Message(m) => match &m.attachment {
                Some(att) => {
                    let preview = att.thumbnail_url.as_deref().unwrap_or("no preview");
                    println!("[{}] {} ({}) {}", role_label(m.sender), att.url, preview, m.text)
                }
                None => println!("[{}] {}", role_label(m.sender), m.text),
            },
        }
    }
}
