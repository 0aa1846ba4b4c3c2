use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, ValueEnum};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use airhop_core::{Passphrase, Role, TransferConfig, TransferEvent, TransferSession};
use airhop_link::{
    CommandDriver, LoopbackDriver, PeerPlatform, SendOutcome, WifiDriver, link_for_platform,
    run_receive, run_send,
};

mod progress;

#[derive(Parser)]
#[command(name = "airhop")]
#[command(about = "Send one file to a nearby machine over a temporary ad-hoc wireless link")]
#[command(version)]
struct Cli {
    /// File to send
    #[arg(long, value_name = "FILE")]
    send: Option<PathBuf>,

    /// Where to write the received file
    #[arg(long, value_name = "FILE")]
    receive: Option<PathBuf>,

    /// TCP port; must match on both ends [default: from config, 3290]
    #[arg(short, long)]
    port: Option<u16>,

    /// Platform of the other machine: mac or windows
    #[arg(long)]
    peer: Option<PeerPlatform>,

    /// How to drive the wireless interface
    #[arg(long, value_enum, default_value_t = DriverKind::Command)]
    driver: DriverKind,

    /// Config file to use instead of the platform default
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Passphrase for the sending side; prompted for when absent
    #[arg(long, env = "AIRHOP_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DriverKind {
    /// Run the command lines configured under `driver_commands`
    Command,
    /// No radio; the peer is this machine
    Loopback,
}

enum Mode {
    Send(PathBuf),
    Receive(PathBuf),
}

impl Cli {
    /// Exactly one of `--send` and `--receive`
    fn mode(&self) -> Option<Mode> {
        match (&self.send, &self.receive) {
            (Some(path), None) => Some(Mode::Send(path.clone())),
            (None, Some(path)) => Some(Mode::Receive(path.clone())),
            _ => None,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<TransferConfig> {
    let config = match &cli.config {
        Some(path) => TransferConfig::load_from(path)?,
        None => TransferConfig::load(),
    };
    apply_overrides(config, cli)
}

/// Command-line flags win over the config file
fn apply_overrides(mut config: TransferConfig, cli: &Cli) -> Result<TransferConfig> {
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn prompt_passphrase() -> Result<Passphrase> {
    print!("Enter the passphrase shown on the receiving machine: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read passphrase")?;
    let passphrase = Passphrase::new(line);
    if passphrase.is_empty() {
        bail!("passphrase must not be empty");
    }
    Ok(passphrase)
}

fn print_passphrase_banner(passphrase: &Passphrase) {
    println!();
    println!("************************************************");
    println!("  Passphrase: {}", passphrase.expose());
    println!("  Enter it on the sending machine to start.");
    println!("************************************************");
    println!();
}

async fn resolve_passphrase(given: Option<&str>) -> Result<Passphrase> {
    if let Some(passphrase) = given.map(Passphrase::new).filter(|p| !p.is_empty()) {
        return Ok(passphrase);
    }
    tokio::task::spawn_blocking(prompt_passphrase)
        .await
        .context("Passphrase prompt did not finish")?
}

async fn run(cli: Cli, mode: Mode) -> Result<()> {
    let config = load_config(&cli)?;
    let Some(peer) = cli.peer else {
        bail!("--peer is required (mac or windows)");
    };

    // Terminal input happens before the progress renderer starts drawing
    let mut session = match mode {
        Mode::Send(path) => {
            if !path.is_file() {
                bail!("{} is not a readable file", path.display());
            }
            let passphrase = resolve_passphrase(cli.passphrase.as_deref()).await?;
            TransferSession::new(Role::Sender, path, passphrase, config.port)
        }
        Mode::Receive(path) => {
            let passphrase = Passphrase::generate();
            print_passphrase_banner(&passphrase);
            TransferSession::new(Role::Receiver, path, passphrase, config.port)
        }
    };
    tracing::info!("Peer platform: {}, network: {}", peer, session.network_name());

    let driver: Box<dyn WifiDriver> = match cli.driver {
        DriverKind::Command => Box::new(CommandDriver::new(config.driver_commands.clone())),
        DriverKind::Loopback => Box::new(LoopbackDriver::new()),
    };
    let mut link = link_for_platform(peer, driver, config.link_timeouts());

    let (event_tx, event_rx) = mpsc::channel::<TransferEvent>(1000);
    let renderer = tokio::spawn(progress::render(event_rx));

    let result = match session.role() {
        Role::Sender => run_send(&mut session, link.as_mut(), &config, &event_tx)
            .await
            .map(|outcome| match outcome {
                SendOutcome::Completed(summary) => {
                    tracing::info!("Transfer verified, file hash {}", summary.file_hash);
                }
                SendOutcome::PeerUnreachable { attempts } => {
                    tracing::warn!("Gave up after {} connection attempts", attempts);
                }
            })
            .map_err(|e| {
                let phase = e.phase();
                anyhow::Error::new(e).context(format!("{} failed", phase))
            }),
        Role::Receiver => run_receive(&mut session, link.as_mut(), &event_tx)
            .await
            .map(|summary| {
                tracing::info!("Transfer verified, file hash {}", summary.file_hash);
            })
            .map_err(|e| {
                let phase = e.phase();
                anyhow::Error::new(e).context(format!("{} failed", phase))
            }),
    };

    // Errors reach the operator once, from main
    drop(event_tx);
    if let Err(e) = renderer.await {
        tracing::debug!("Progress renderer stopped: {}", e);
    }
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(mode) = cli.mode() else {
        let _ = Cli::command().print_help();
        println!();
        return ExitCode::SUCCESS;
    };

    init_logging(cli.verbose);

    match run(cli, mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_mode_requires_exactly_one_direction() {
        let neither = Cli::parse_from(["airhop"]);
        assert!(neither.mode().is_none());

        let both = Cli::parse_from(["airhop", "--send", "a", "--receive", "b"]);
        assert!(both.mode().is_none());

        let send = Cli::parse_from(["airhop", "--send", "a.bin", "--peer", "windows"]);
        assert!(matches!(send.mode(), Some(Mode::Send(p)) if p == PathBuf::from("a.bin")));
        assert_eq!(send.peer, Some(PeerPlatform::Windows));
        assert_eq!(send.driver, DriverKind::Command);
    }

    #[test]
    fn test_unknown_peer_rejected() {
        assert!(Cli::try_parse_from(["airhop", "--receive", "b", "--peer", "linux"]).is_err());
    }

    #[test]
    fn test_port_flag_overrides_config() {
        let cli = Cli::parse_from(["airhop", "--receive", "b", "--port", "4000"]);
        let config = apply_overrides(TransferConfig::default(), &cli).unwrap();
        assert_eq!(config.port, 4000);

        let cli = Cli::parse_from(["airhop", "--receive", "b"]);
        let base = TransferConfig { port: 5123, ..TransferConfig::default() };
        assert_eq!(apply_overrides(base, &cli).unwrap().port, 5123);
    }

    #[test]
    fn test_overrides_still_validate() {
        let cli = Cli::parse_from(["airhop", "--receive", "b", "--port", "4000"]);
        let broken = TransferConfig { dial_attempts: 0, ..TransferConfig::default() };
        assert!(apply_overrides(broken, &cli).is_err());
    }

    #[tokio::test]
    async fn test_given_passphrase_skips_prompt() {
        let passphrase = resolve_passphrase(Some("correct-horse")).await.unwrap();
        assert_eq!(passphrase.expose(), "correct-horse");
    }
}
