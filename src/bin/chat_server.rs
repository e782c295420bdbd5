//! netmux Chat Server
//!
//! Broadcast chat demo built on the poll-driven multiplexer: every framed
//! line received from one peer is sent to all connected peers.

use std::time::Duration;

use clap::Parser;
use netmux::{Config, Network, Protocol};
use tracing_subscriber::{fmt, EnvFilter};

const SERVER_NAME: &str = "chat";

/// netmux chat server
#[derive(Parser, Debug)]
#[command(name = "netmux-chat-server")]
#[command(about = "Broadcast chat server built on the netmux poll loop")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "4010")]
    port: u16,

    /// Maximum framed message size in bytes
    #[arg(short, long, default_value = "65536")]
    max_message_size: usize,

    /// Poll tick interval in milliseconds
    #[arg(short, long, default_value = "16")]
    tick_ms: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,netmux=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    tracing::info!("netmux chat server v{}", netmux::VERSION);

    let config = Config::builder()
        .max_message_size(args.max_message_size)
        .build();
    let mut network = Network::with_config(config);

    if let Err(e) = network.create_server(SERVER_NAME, args.port, Protocol::Tcp) {
        tracing::error!("failed to start server: {e}");
        std::process::exit(1);
    }
    tracing::info!(port = args.port, "listening");

    loop {
        network.poll();

        if network.server_has_new_connection(SERVER_NAME).unwrap_or(false) {
            let count = network.connection_count(SERVER_NAME).unwrap_or(0);
            tracing::info!(peers = count, "new peer connected");
        }

        while let Ok(Some(message)) = network.read_server_message(SERVER_NAME) {
            let from = message.connection_name().unwrap_or("?").to_string();
            let line = format!("{from}: {}", message.payload_str());
            tracing::info!("{line}");
            broadcast(&mut network, &line);
        }

        std::thread::sleep(Duration::from_millis(args.tick_ms));
    }
}

/// Send one line to every open accepted connection
fn broadcast(network: &mut Network, line: &str) {
    let count = network.connection_count(SERVER_NAME).unwrap_or(0);
    for index in 0..count {
        let Ok(name) = network.connection_name_at(SERVER_NAME, index) else {
            continue;
        };
        if network.is_connection_open(name.as_str()).unwrap_or(false) {
            if let Err(e) = network.send_message(name.as_str(), line.as_bytes()) {
                tracing::warn!(connection = %name, error = %e, "broadcast failed");
            }
        }
    }
}
