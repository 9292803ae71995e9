use anyhow::{Context, Result};
use clap::Parser;
use peerchat_core::logging::{init_logging_with_config, LogConfig};
use peerchat_core::metrics::describe_metrics;
use peerchat_core::pipeline::SelfEcho;
use peerchat_core::{ChatPeer, Config, InMemoryTransport};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

mod shell;

use shell::Command;

#[derive(Parser, Debug)]
#[command(name = "peerchat")]
#[command(author, version, about = "Serverless group chat shell", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Seconds between inbox polls, e.g. 0.3
    #[arg(long)]
    poll_interval: Option<f64>,

    /// Whether senders receive their own messages (deliver, suppress)
    #[arg(long)]
    self_echo: Option<SelfEcho>,

    /// TOML configuration file; environment variables are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::from_env().context("reading PEERCHAT_* environment")?,
    };

    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(secs) = args.poll_interval {
        config.bus.poll_interval =
            Duration::try_from_secs_f64(secs).context("invalid --poll-interval")?;
    }
    if let Some(mode) = args.self_echo {
        config.bus.self_echo = mode;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_config(&config.logging)?)?;
    describe_metrics();

    let transport = InMemoryTransport::new(config.qos);
    let peer = ChatPeer::start(config, Arc::new(transport))?;
    info!(peer_id = %peer.peer_id(), "peerchat shell started");

    println!("peerchat shell, type 'help' for commands");
    run_repl(&peer).await;

    peer.shutdown();
    info!("peerchat shell finished");
    Ok(())
}

async fn run_repl(peer: &ChatPeer) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            result = lines.next_line() => match result {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read input");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("Error: {}", e);
                continue;
            }
        };
        let exit = command == Command::Exit;

        match shell::execute(peer, command) {
            Ok(out) => println!("{}\n", out),
            Err(e) => println!("Error: {}\n", e),
        }
        if exit {
            break;
        }
    }
}
