// Command sender: fire a fixed velocity command at the bridge a few times
//
// Usage: cargo run --example cmd_sender -- --target 192.168.1.50:5005 --count 10 "0.2 0.0"
//
// Useful for checking the network path and the watchdog: the base should move
// while packets arrive and stop ~0.5 s after the last one.

use clap::Parser;
use std::net::{SocketAddr, UdpSocket};
use std::thread::sleep;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
struct Args {
    /// Bridge address
    #[arg(long, default_value = "127.0.0.1:5005")]
    target: SocketAddr,

    /// Number of datagrams to send
    #[arg(long, default_value_t = 10)]
    count: u32,

    /// Delay between datagrams in milliseconds
    #[arg(long, default_value_t = 300)]
    interval_ms: u64,

    /// Command text, "<linear_m_s> <angular_rad_s>"
    #[arg(default_value = "0.2 0.0")]
    command: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();
    let sock = UdpSocket::bind("0.0.0.0:0")?;

    for i in 0..args.count {
        sock.send_to(args.command.as_bytes(), args.target)?;
        info!("[{}/{}] sent {:?} to {}", i + 1, args.count, args.command, args.target);
        sleep(Duration::from_millis(args.interval_ms));
    }

    Ok(())
}
