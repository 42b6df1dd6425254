use clap::{Parser, Subcommand};
use relay::llm::{ChatMessage, ChatbaseClient};
use std::io::Write;

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(about = "Slack to Chatbase relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a config skeleton to fill in.
    Init {
        /// Config file path (default: CHATRELAY_CONFIG_PATH or ~/.chatrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the relay: receive Slack events and answer messages through Chatbase.
    Gateway {
        /// Config file path (default: CHATRELAY_CONFIG_PATH or ~/.chatrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Webhook port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send one message to the chatbot and print the reply.
    Ask {
        /// Config file path (default: CHATRELAY_CONFIG_PATH or ~/.chatrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Print the reply as it streams in instead of waiting for the whole answer.
        #[arg(long)]
        stream: bool,

        message: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chatrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            stream,
            message,
        }) => {
            if let Err(e) = run_ask(config, &message, stream).await {
                log::error!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    println!("set slack.botToken, slack.signingSecret, backend.secret and backend.chatId (or their environment variables) before running the gateway");
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    relay::gateway::run_gateway(config).await
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    message: &str,
    stream: bool,
) -> anyhow::Result<()> {
    let (config, _) = relay::config::load_config(config_path)?;
    let creds = relay::config::resolve_backend_credentials(&config)?;
    let client = ChatbaseClient::new(
        creds.secret,
        creds.chat_id,
        config.backend.api_url.clone(),
        config.backend.timeout(),
    )?;
    let messages = [ChatMessage::user(message)];

    if !stream {
        let reply = client.send_message(&messages).await?;
        println!("{}", reply.text.trim());
        return Ok(());
    }

    let mut fragments = client.reply_stream(&messages).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next_fragment().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
