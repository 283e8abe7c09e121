// Base check: step-by-step hardware test of the Kobuki link
//
// Usage: cargo run --example base_check -- [port]
// Example: cargo run --example base_check -- /dev/ttyUSB1
//
// Safety features:
// - Explicit confirmation before any writes
// - Very slow test speeds, short bursts
// - Always ends with zero velocity and motors off

use kobuki_udp_bridge::base::kobuki::DEFAULT_BAUDRATE;
use kobuki_udp_bridge::base::KobukiBase;
use std::io::{self, Write};
use std::thread::sleep;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(50);

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Stream one velocity at 20 Hz for `duration`
fn drive_for(
    base: &mut KobukiBase,
    linear: f64,
    angular: f64,
    duration: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    while start.elapsed() < duration {
        let frame = base.set_velocity(linear, angular)?;
        print!(
            "\r  speed={:>5} mm/s radius={:>6} mm",
            frame.speed_mm_s, frame.radius_mm
        );
        io::stdout().flush()?;
        sleep(TICK);
    }
    println!();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB1".to_string());

    println!("Kobuki base check (WITH WRITES)");
    println!("This tool WILL move the base. Give it clear floor or lift the wheels.");
    println!("Serial port: {}", port);
    println!();

    if !confirm("Is the base clear to move?")? {
        println!("Aborted.");
        return Ok(());
    }

    let mut base = KobukiBase::open(&port, DEFAULT_BAUDRATE)?;
    sleep(Duration::from_millis(100));

    println!("Step 1: motor power on, zero velocity");
    base.set_motor_power(true)?;
    sleep(Duration::from_millis(100));
    drive_for(&mut base, 0.0, 0.0, Duration::from_millis(500))?;

    if confirm("Step 2: drive forward at 0.05 m/s for 1 s?")? {
        drive_for(&mut base, 0.05, 0.0, Duration::from_secs(1))?;
        drive_for(&mut base, 0.0, 0.0, Duration::from_millis(500))?;
    }

    if confirm("Step 3: spin in place (left) for 1 s?")? {
        drive_for(&mut base, 0.0, 0.5, Duration::from_secs(1))?;
        drive_for(&mut base, 0.0, 0.0, Duration::from_millis(500))?;
    }

    println!("Stopping and cutting motor power");
    for _ in 0..10 {
        base.stop()?;
        sleep(TICK);
    }
    base.set_motor_power(false)?;

    println!("Done.");
    Ok(())
}
