//! CLI entry point for `mailsink`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};

use mailsink::config::Config;
use mailsink::error::MailsinkError;
use mailsink::http::{self, AppState};
use mailsink::model::body::MessageBody;
use mailsink::parser::body::parse_message_body;
use mailsink::sender::LoopbackSender;
use mailsink::service::Mailbox;
use mailsink::store::{MailStore, MemoryStore};

#[derive(Parser)]
#[command(
    name = "mailsink",
    version,
    about = "Capture mail and inspect its text, HTML and attachments over HTTP"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to $MAILSINK_CONFIG or the user config dir)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overriding the config file
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
        /// Do not create the example mails on startup
        #[arg(long)]
        no_examples: bool,
    },
    /// Print the text, HTML and attachments of a message file
    Extract {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Run an XPath query against the HTML part of a message file
    Query { path: PathBuf, xpath: String },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => mailsink::config::load_config_from(path),
        None => mailsink::config::load_config(),
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Serve { bind, no_examples } => cmd_serve(config, bind, no_examples),
        Commands::Extract { path, json } => cmd_extract(&path, json),
        Commands::Query { path, xpath } => cmd_query(&path, &xpath),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailsink::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailsink.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Seed the store, then serve HTTP until Ctrl-C.
fn cmd_serve(mut config: Config, bind: Option<String>, no_examples: bool) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if no_examples {
        config.bootstrap.create_examples = false;
    }
    let addr = config.server.bind_addr()?;

    let store: Arc<dyn MailStore> = Arc::new(MemoryStore::new());
    let created = mailsink::bootstrap::run_startup_hook(&config.bootstrap, store.as_ref())?;
    tracing::info!(count = created, "Store ready");

    let sender = Arc::new(LoopbackSender::new(store.clone()));
    let mailbox = Mailbox::new(store, sender, config.bootstrap.sender.clone());
    let state = AppState {
        mailbox: Arc::new(mailbox),
        public_url: config.server.public_url.clone(),
    };
    let app = http::router(state, config.limits.max_message_size);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(http::serve(addr, app))
}

fn read_message(path: &Path) -> anyhow::Result<MessageBody> {
    let raw = std::fs::read(path).map_err(|e| MailsinkError::io(path, e))?;
    Ok(parse_message_body(&raw)?)
}

/// Print the extracted body of a message file.
fn cmd_extract(path: &Path, json: bool) -> anyhow::Result<()> {
    let body = read_message(path)?;
    if json {
        print_body_json(&body)
    } else {
        print_body_text(&body);
        Ok(())
    }
}

/// Evaluate an XPath query against the HTML part of a message file.
fn cmd_query(path: &Path, xpath: &str) -> anyhow::Result<()> {
    let body = read_message(path)?;
    let nodes = mailsink::html::query_html(&body.html, xpath)?;
    println!("{}", serde_json::to_string_pretty(&nodes)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsink", &mut std::io::stdout());
    Ok(())
}

fn print_body_text(body: &MessageBody) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<14} {}", "Text", format_size(body.plain_text.len(), BINARY));
    println!("  {:<14} {}", "HTML", format_size(body.html.len(), BINARY));
    println!("  {:<14} {}", "Attachments", body.attachments.len());
    for (index, att) in body.attachments.iter().enumerate() {
        let name = if att.filename.is_empty() {
            "(unnamed)"
        } else {
            att.filename.as_str()
        };
        let cid = att
            .content_id
            .as_deref()
            .map(|c| format!("  <{c}>"))
            .unwrap_or_default();
        println!(
            "    {index:>3}  {name}  {}  {}{cid}",
            att.mime_type,
            format_size(att.data.len(), BINARY)
        );
    }

    if !body.plain_text.is_empty() {
        println!();
        println!("{}", body.plain_text.trim_end());
    }
    println!();
}

fn print_body_json(body: &MessageBody) -> anyhow::Result<()> {
    let attachments: Vec<_> = body
        .attachments
        .iter()
        .enumerate()
        .map(|(index, att)| att.info(index))
        .collect();

    let output = serde_json::json!({
        "plainText": body.plain_text,
        "html": body.html,
        "attachments": attachments,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
