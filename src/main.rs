use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use notify_relay::services::notification::{
    DeliveryOutcome, DispatchReport, Dispatcher, NotifyError,
};
use notify_relay::storage::{CredentialCipher, NotifyConfig};
use notify_relay::utils::paths;

/// Exit status when the rate limit rejected the call.
const EXIT_RATE_LIMITED: u8 = 2;

/// Notify Relay - send status notifications to every configured channel
#[derive(Parser)]
#[command(name = "notify-relay", version, about)]
struct Cli {
    /// Config file (default: ~/.notify-relay/notify.conf)
    #[arg(short, long, env = "NOTIFY_RELAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a notification to every configured channel
    Send {
        /// Message text
        message: String,
    },
    /// Show per-channel configuration and send a test message
    Diagnose {
        /// Test message text
        #[arg(default_value = "notify-relay diagnostic: test notification")]
        message: String,
    },
    /// Deliver queued low-priority messages if the batch is due
    Flush,
    /// Encrypt a value for this machine, for pasting into the config file
    Encrypt {
        /// Plaintext secret
        value: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = match cli.config {
        Some(path) => path,
        None => paths::config_path().context("cannot locate the config file")?,
    };

    match cli.command {
        Command::Encrypt { value } => cmd_encrypt(&value),
        Command::Send { message } => {
            let dispatcher = dispatcher(&config_path)?;
            cmd_send(&dispatcher, &message).await
        }
        Command::Diagnose { message } => {
            let dispatcher = dispatcher(&config_path)?;
            cmd_diagnose(&dispatcher, &config_path, &message).await
        }
        Command::Flush => {
            let dispatcher = dispatcher(&config_path)?;
            cmd_flush(&dispatcher).await
        }
    }
}

fn dispatcher(config_path: &std::path::Path) -> anyhow::Result<Dispatcher> {
    let config = NotifyConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let state_dir = paths::ensure_state_dir().context("cannot create the state directory")?;
    Ok(Dispatcher::new(config, &state_dir)?)
}

async fn cmd_send(dispatcher: &Dispatcher, message: &str) -> anyhow::Result<ExitCode> {
    let result = dispatcher.send(message).await;
    match &result {
        Ok(report) if !report.succeeded() => {
            for delivery in &report.deliveries {
                if let DeliveryOutcome::Failed(e) = &delivery.outcome {
                    eprintln!("{}: {}", delivery.channel, e);
                }
            }
        }
        Ok(_) => {}
        Err(e) => eprintln!("{}", e),
    }
    Ok(ExitCode::from(dispatch_exit_code(&result)))
}

/// Exit status for a dispatch: 0 when the report succeeded, 1 when every
/// configured channel failed, `EXIT_RATE_LIMITED` when the call was rejected.
fn dispatch_exit_code(result: &Result<DispatchReport, NotifyError>) -> u8 {
    match result {
        Ok(report) if report.succeeded() => 0,
        Err(NotifyError::RateLimited { .. }) => EXIT_RATE_LIMITED,
        _ => 1,
    }
}

async fn cmd_diagnose(
    dispatcher: &Dispatcher,
    config_path: &std::path::Path,
    message: &str,
) -> anyhow::Result<ExitCode> {
    println!("Config: {}", config_path.display());
    println!("{:<10} {}", "CHANNEL", "STATUS");
    for status in dispatcher.channel_status() {
        let state = match (&status.decryption_failure, status.configured) {
            (Some(key), _) => format!("credential {} could not be decrypted", key),
            (None, true) => "configured".to_string(),
            (None, false) => "not configured".to_string(),
        };
        println!("{:<10} {}", status.channel.to_string(), state);
    }

    let limits = &dispatcher.config().rate_limit;
    if limits.max_messages > 0 {
        println!(
            "Rate limit: {} per {}s",
            limits.max_messages, limits.window_secs
        );
    } else {
        println!("Rate limit: disabled");
    }
    let batch = &dispatcher.config().batch;
    if batch.delay_secs > 0 {
        println!(
            "Batching: email, {}s delay, max {} ({} pending)",
            batch.delay_secs,
            batch.max_size,
            dispatcher.pending_batch()
        );
    } else {
        println!("Batching: disabled");
    }

    println!();
    println!("Sending: {}", message);
    let result = dispatcher.send(message).await;
    let report = match &result {
        Ok(report) => report,
        Err(e) => {
            println!("{}", e);
            return Ok(ExitCode::from(dispatch_exit_code(&result)));
        }
    };

    for delivery in &report.deliveries {
        println!(
            "{:<10} {} ({} ms)",
            delivery.channel.to_string(),
            delivery.outcome,
            delivery.duration_ms
        );
    }
    println!(
        "Result: {} ({} configured)",
        if report.succeeded() { "ok" } else { "failed" },
        report.configured_count()
    );

    Ok(ExitCode::from(dispatch_exit_code(&result)))
}

async fn cmd_flush(dispatcher: &Dispatcher) -> anyhow::Result<ExitCode> {
    match dispatcher.flush().await {
        None => {
            tracing::info!("Nothing to flush");
            Ok(ExitCode::SUCCESS)
        }
        Some(outcome) if outcome.is_success() => Ok(ExitCode::SUCCESS),
        Some(outcome) => {
            eprintln!("batch flush {}", outcome);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_encrypt(value: &str) -> anyhow::Result<ExitCode> {
    let encrypted = CredentialCipher::for_this_machine()
        .encrypt(value)
        .context("encryption failed")?;
    println!("{}", encrypted);
    Ok(ExitCode::SUCCESS)
}
