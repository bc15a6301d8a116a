//! Relay Daemon - Multi-client TCP chat relay
//!
//! This binary runs the chat server, either in the foreground or as a
//! background daemon.
//!
//! # Usage
//!
//! ```bash
//! # Start the server (foreground)
//! relayd start
//!
//! # Start the server (background/daemonized)
//! relayd start -d
//!
//! # Listen on a specific port with newline framing
//! relayd start --port 6000 --framing line
//!
//! # Stop the server
//! relayd stop
//!
//! # Check server status
//! relayd status
//!
//! # Override the port from the environment
//! RELAY_PORT=6000 relayd start
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug relayd start
//! ```
//!
//! Settings are layered: config file, then `RELAY_HOST`/`RELAY_PORT`, then
//! command-line flags.
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown; every client receives `SERVER_SHUTDOWN`

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_protocol::Framing;
use relayd::config::ServerConfig;
use relayd::server::ChatServer;

/// relayd - multi-client TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Port to listen on
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Message framing: raw (one read per message) or line
        #[arg(long)]
        framing: Option<Framing>,
    },
    /// Stop the running server
    Stop,
    /// Show server status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("chatrelay")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("relayd.pid")
}

/// Returns the path to the log file.
fn log_file_path() -> PathBuf {
    state_dir().join("relayd.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Checks if the server is already running, clearing a stale PID file.
fn is_server_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the server process.
fn stop_server(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Builds the effective configuration: file, then environment, then flags.
fn load_config(
    path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    framing: Option<Framing>,
) -> Result<ServerConfig> {
    let mut config = ServerConfig::load_or_default(path.as_deref())?;

    let env_port = match env::var("RELAY_PORT") {
        Ok(value) => Some(
            value
                .parse::<u16>()
                .with_context(|| format!("Invalid RELAY_PORT: {value}"))?,
        ),
        Err(_) => None,
    };
    config = config
        .with_overrides(env::var("RELAY_HOST").ok(), env_port)
        .with_overrides(host, port);

    if let Some(framing) = framing {
        config.framing = framing;
    }
    if config.port == 0 {
        bail!("Port must be between 1 and 65535");
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        port: None,
        host: None,
        config: None,
        framing: None,
    });

    match command {
        Command::Start {
            daemon,
            port,
            host,
            config,
            framing,
        } => {
            if let Some(pid) = is_server_running() {
                eprintln!("Server is already running (PID {pid})");
                eprintln!("Use 'relayd stop' to stop it first.");
                process::exit(1);
            }

            // Fail before forking so config errors reach the terminal.
            let config = load_config(config, host, port, framing)?;

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize()?;
            }

            write_pid()?;
            let result = run_server(config);
            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_server_running() {
                println!("Stopping server (PID {pid})...");
                stop_server(pid)?;

                // Wait for process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Server stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Server did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Server is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_server_running() {
                println!("Server is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Server is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_core=info".parse()?)
                .add_directive("relay_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Chat relay starting"
    );

    let mut server = ChatServer::new(config);
    server.start().await.context("Failed to start server")?;

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    info!("Shutdown signal received");

    let report = server.stop().await.context("Failed to stop server")?;
    info!(notified = report.notified, "Chat relay stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
