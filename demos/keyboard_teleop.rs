// Virtual-stick teleop: the keyboard pushes a two-axis stick around,
// and the stick position is scaled to a velocity command at 20 Hz.
//
// Usage: cargo run --example keyboard_teleop -- --target 192.168.1.50:5005
//
// Arrows or WASD push the stick, Space recenters it, Q/Esc quits.
// With no key held the stick springs back toward center.
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::Write;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use tracing::info;

const MAX_LINEAR: f64 = 0.25; // m/s
const MAX_ANGULAR: f64 = 1.5; // rad/s

// Axis magnitudes below this read as centered
const DEADZONE: f64 = 0.12;

// Stick travel per key event, and spring-back per send period
const PUSH_STEP: f64 = 0.25;
const SPRING_STEP: f64 = 0.1;

const SEND_PERIOD: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(about = "Drive the bridge from a keyboard-controlled virtual stick")]
struct Args {
    /// Bridge UDP address
    #[arg(long, default_value = "127.0.0.1:5005")]
    target: SocketAddr,
}

/// Stick position in gamepad convention: x right-positive, y down-positive
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Stick {
    x: f64,
    y: f64,
}

impl Stick {
    fn push(&mut self, dx: f64, dy: f64) {
        self.x = (self.x + dx).clamp(-1.0, 1.0);
        self.y = (self.y + dy).clamp(-1.0, 1.0);
    }

    fn spring_back(&mut self) {
        self.x = toward_zero(self.x, SPRING_STEP);
        self.y = toward_zero(self.y, SPRING_STEP);
    }

    /// (linear m/s, angular rad/s); stick up is forward, stick left turns left
    fn to_command(self) -> (f64, f64) {
        let x = deadzone(self.x);
        let y = deadzone(self.y);
        // `+ 0.0` folds -0.0 so a centered stick prints "0.000"
        (-y * MAX_LINEAR + 0.0, -x * MAX_ANGULAR + 0.0)
    }
}

fn deadzone(axis: f64) -> f64 {
    if axis.abs() < DEADZONE { 0.0 } else { axis }
}

fn toward_zero(value: f64, step: f64) -> f64 {
    if value.abs() <= step {
        0.0
    } else {
        value - step * value.signum()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let sock = UdpSocket::bind("0.0.0.0:0")?;
    info!("Sending to {}", args.target);
    info!(
        "Full stick = {} m/s, {} rad/s; arrows/WASD push, Space centers, Q quits",
        MAX_LINEAR, MAX_ANGULAR
    );

    enable_raw_mode()?;
    let result = drive(&sock, args.target);
    disable_raw_mode()?;
    println!();

    result
}

fn drive(sock: &UdpSocket, target: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut stick = Stick::default();
    let mut next_send = Instant::now();
    let mut pushed = false;

    loop {
        let wait = next_send.saturating_duration_since(Instant::now());

        if event::poll(wait)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Release {
                    continue;
                }
                let before = pushed;
                pushed = true;
                match code {
                    KeyCode::Up | KeyCode::Char('w') => stick.push(0.0, -PUSH_STEP),
                    KeyCode::Down | KeyCode::Char('s') => stick.push(0.0, PUSH_STEP),
                    KeyCode::Left | KeyCode::Char('a') => stick.push(-PUSH_STEP, 0.0),
                    KeyCode::Right | KeyCode::Char('d') => stick.push(PUSH_STEP, 0.0),
                    KeyCode::Char(' ') => stick = Stick::default(),
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => pushed = before,
                }
            }
            if Instant::now() < next_send {
                continue;
            }
        }

        if !pushed {
            stick.spring_back();
        }

        let (linear, angular) = stick.to_command();
        let msg = format!("{:.3} {:.3}", linear, angular);
        sock.send_to(msg.as_bytes(), target)?;
        print!("SEND: {:<16}\r", msg);
        std::io::stdout().flush()?;

        pushed = false;
        next_send += SEND_PERIOD;
    }

    sock.send_to(b"0.000 0.000", target)?;
    Ok(())
}
