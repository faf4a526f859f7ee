use anyhow::{anyhow, bail};
use audit_relay::config::{self, FileConfig, Layers, ENV_FORWARD_TOKEN, ENV_FORWARD_URL};
use audit_relay::error::RelayError;
use audit_relay::infra::ReqwestHttp;
use audit_relay::observability;
use audit_relay::pipeline::{CursorStore, ForwardSink, LogFetcher, Orchestrator, RateLimitGate};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "audit_relay")]
#[command(about = "Relays enterprise audit-log events to a downstream collector")]
#[command(version)]
struct Cli {
    /// Optional TOML config file (environment variables take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the cursor and rate-limit state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory for rotated JSON log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and forward events (the default command)
    Run {
        /// Run a single pass even if a poll interval is configured
        #[arg(long)]
        once: bool,
        /// Seconds between passes; 0 runs a single pass
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Show the recorded cursor and rate-limit cooldown
    Status,
    /// Forget the recorded cursor so the next pass bootstraps again
    ResetCursor {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let file = match cli.config.as_deref().map(FileConfig::load).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };
    let env = config::process_env;
    let layers = Layers::new(&file, &env);

    let log_dir = cli.log_dir.clone().unwrap_or_else(|| layers.log_dir());
    let _guard = observability::init_logging(&log_dir);

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| layers.data_dir());
    let result = match cli.command.unwrap_or(Commands::Run { once: false, poll_interval: None }) {
        Commands::Run { once, poll_interval } => run(&layers, data_dir, once, poll_interval).await,
        Commands::Status => status(data_dir),
        Commands::ResetCursor { yes } => reset_cursor(data_dir, yes),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let stage = e
                .downcast_ref::<RelayError>()
                .map(|r| r.stage())
                .unwrap_or("relay");
            error!(stage, "{:#}", e);
            eprintln!("❌ {} stage failed: {:#}", stage, e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    layers: &Layers<'_>,
    data_dir: PathBuf,
    once: bool,
    poll_interval: Option<u64>,
) -> anyhow::Result<()> {
    let mut config = layers.relay_config()?;
    config.data_dir = data_dir;
    if once {
        config.poll_interval = None;
    } else if let Some(secs) = poll_interval {
        config.poll_interval = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let Some(forward) = config.forward.clone() else {
        warn!(
            "Please set {} and {} to forward logs. Gracefully exiting!!",
            ENV_FORWARD_URL, ENV_FORWARD_TOKEN
        );
        return Ok(());
    };

    if let Some(addr) = config.metrics_addr {
        observability::metrics::init(addr).map_err(|e| anyhow!(e.to_string()))?;
    }

    info!(
        enterprise = %config.source.enterprise_id,
        data_dir = %config.data_dir.display(),
        commit_mode = config.commit_mode.as_str(),
        poll_interval = ?config.poll_interval,
        "Starting audit-log relay"
    );

    let fetcher = LogFetcher::new(
        Box::new(ReqwestHttp::for_source(config.source.admin_token.expose())?),
        &config.source.api_url,
        &config.source.enterprise_id,
        RateLimitGate::open_at_root(&config.data_dir),
    );
    let sink = ForwardSink::new(
        Box::new(ReqwestHttp::for_sink(forward.auth_token.expose())?),
        &forward.endpoint_url,
        forward.expected_status,
    );
    let orchestrator = Orchestrator::new(
        Box::new(fetcher),
        Box::new(sink),
        CursorStore::open_at_root(&config.data_dir),
        config.commit_mode,
    );

    let report = orchestrator.run(config.poll_interval).await?;
    println!("\n📊 Relay pass {}:", report.pass_id);
    println!("   Bootstrapped: {}", report.bootstrapped);
    println!("   Pages fetched: {}", report.pages);
    println!("   Batches forwarded: {}", report.batches_forwarded);
    println!("   Events forwarded: {}", report.events_forwarded);
    if report.events_unconfirmed > 0 {
        println!("   Events awaiting a newer cursor: {}", report.events_unconfirmed);
    }
    println!("   Cursor: {}", report.cursor);
    Ok(())
}

fn status(data_dir: PathBuf) -> anyhow::Result<()> {
    let cursor = CursorStore::open_at_root(&data_dir).get()?;
    let gate = RateLimitGate::open_at_root(&data_dir);

    println!("📁 State directory: {}", data_dir.display());
    println!("   Cursor: {}", cursor);
    match gate.reset_at()? {
        Some(reset_at) if Utc::now() < reset_at => {
            println!("   Cooldown: active until {}", reset_at.to_rfc3339())
        }
        Some(reset_at) => println!("   Cooldown: expired at {}", reset_at.to_rfc3339()),
        None => println!("   Cooldown: none recorded"),
    }
    Ok(())
}

fn reset_cursor(data_dir: PathBuf, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("refusing to reset the cursor without --yes");
    }
    let store = CursorStore::open_at_root(&data_dir);
    let previous = store.get()?;
    store.clear()?;
    println!("✅ Cursor reset (was {}); the next run bootstraps from the current head", previous);
    Ok(())
}
