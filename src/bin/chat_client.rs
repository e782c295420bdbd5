//! netmux Chat Client
//!
//! Reads lines from stdin, sends each as one framed message, and prints
//! whatever the server broadcasts back.

use std::io::BufRead;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use netmux::{Config, Network, Protocol};
use tracing_subscriber::{fmt, EnvFilter};

/// netmux chat client
#[derive(Parser, Debug)]
#[command(name = "netmux-chat-client")]
#[command(about = "Client for the netmux chat server")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "4010")]
    port: u16,

    /// Registry name for this connection (defaults to host:port)
    #[arg(short, long)]
    name: Option<String>,

    /// Poll tick interval in milliseconds
    #[arg(short, long, default_value = "16")]
    tick_ms: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut network = Network::with_config(Config::default());
    let conn = match network.open_connection(args.name.as_deref(), &args.host, args.port, Protocol::Tcp)
    {
        Ok(name) => name,
        Err(e) => {
            tracing::error!("failed to connect: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(connection = %conn, "connected, type lines to chat");

    // Stdin is blocking, so a side thread feeds lines into the poll loop
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        network.poll();

        while let Ok(line) = rx.try_recv() {
            if let Err(e) = network.send_message(conn.as_str(), line.as_bytes()) {
                tracing::error!("send failed: {e}");
            }
        }

        while let Ok(Some(message)) = network.read_message(conn.as_str()) {
            println!("{}", message.payload_str());
        }

        match network.is_connection_open(conn.as_str()) {
            Ok(true) => {}
            _ => {
                let fault = network
                    .connection_fault(conn.as_str())
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "closed by server".to_string());
                tracing::info!("disconnected: {fault}");
                break;
            }
        }

        std::thread::sleep(Duration::from_millis(args.tick_ms));
    }
}
