//! Relay - terminal client for the chat relay
//!
//! # Usage
//!
//! ```bash
//! # Join a local server
//! relay --name Alice
//!
//! # Join a remote server that uses newline framing
//! relay --host chat.example.net --port 6000 --name Bob --framing line
//! ```
//!
//! Type a line to broadcast it. `/w <user> <message>` sends a private
//! message, `/users` lists who is online, `/help` shows the server's
//! commands and `/quit` leaves.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use relay_client::{local_echo, render, ChatClient, ClientConfig, ClientEvent};
use relay_protocol::{Framing, ServerMessage};

/// relay - chat relay terminal client
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 50000, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Display name to request
    #[arg(short, long)]
    name: String,

    /// Message framing; must match the server
    #[arg(long, default_value_t = Framing::Raw)]
    framing: Framing,
}

const QUIT_COMMAND: &str = "/quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they do not interleave with chat output on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("relay_client=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        host: args.host,
        port: args.port,
        name: args.name,
        framing: args.framing,
    };

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let mut client = ChatClient::connect(&config, events_tx)
        .await
        .context("Could not join the chat")?;

    let mut own_name = config.name.trim().to_string();
    println!(
        "Connected to {} as {own_name}. Type /help for commands, {QUIT_COMMAND} to leave.",
        client.addr()
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == QUIT_COMMAND {
                    break;
                }
                client.send(text).await.context("Failed to send message")?;
                if let Some(echo) = local_echo(text, &own_name) {
                    println!("{}", render(&echo, &own_name, &Local::now()));
                }
            }
            event = events.recv() => match event {
                Some(ClientEvent::Message(msg)) => {
                    println!("{}", render(&msg, &own_name, &Local::now()));
                }
                Some(ClientEvent::Renamed(name)) => own_name = name,
                Some(ClientEvent::Shutdown) => {
                    println!("{}", render(&ServerMessage::Shutdown, &own_name, &Local::now()));
                    break;
                }
                Some(ClientEvent::Disconnected) | None => {
                    println!("Connection to the server was lost.");
                    break;
                }
            },
        }
    }

    client.disconnect().await;
    Ok(())
}
