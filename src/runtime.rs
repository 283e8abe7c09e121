// Fixed-rate control loop with watchdog
// Note: the loop owns the current command and the watchdog state. Each tick it polls
// the UDP socket once, lets the watchdog zero stale commands, converts the result to
// a drive frame and writes it to the base. Ctrl+C / SIGTERM runs a bounded stop sequence
// before anything is released.

use std::io::Write;
use std::time::Instant;

use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tracing::{error, info};

// local imports
use crate::base::{velocity_to_drive_frame, DriveFrame, KobukiBase, KobukiError};
use crate::config::{BridgeConfig, ConfigError};
use crate::messages::{CommandMode, VelocityCommand};
use crate::receiver::CommandReceiver;
use crate::watchdog::{effective_velocity, LinkHealth, WatchdogState};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("base link error: {0}")]
    Base(#[from] KobukiError),

    #[error("failed to bind UDP listener on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install signal handler: {0}")]
    Signal(std::io::Error),
}

/// Per-tick state exclusively owned by the loop
pub struct ControlLoop {
    mode: CommandMode,
    command: Option<VelocityCommand>,
    watchdog: WatchdogState,
}

impl ControlLoop {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            mode: config.command_mode(),
            command: None,
            watchdog: WatchdogState::new(config.timeout()),
        }
    }

    /// Feed a raw datagram payload, as the receiver would
    pub fn on_datagram(&mut self, payload: &[u8], now: Instant) -> bool {
        crate::receiver::accept_datagram(
            payload,
            self.mode,
            &mut self.command,
            &mut self.watchdog,
            now,
        )
        .is_ok()
    }

    /// Drive frame for this tick (watchdog first, then kinematics)
    pub fn compute_frame(&mut self, now: Instant) -> DriveFrame {
        let vel = effective_velocity(&mut self.watchdog, self.command.as_ref(), now);
        velocity_to_drive_frame(vel.linear_m_s, vel.angular_rad_s)
    }

    /// One full tick: poll -> watchdog -> kinematics -> write
    pub fn tick<W: Write>(
        &mut self,
        receiver: &mut CommandReceiver,
        base: &mut KobukiBase<W>,
        now: Instant,
    ) -> Result<DriveFrame, KobukiError> {
        receiver.poll(&mut self.command, &mut self.watchdog, now);
        let frame = self.compute_frame(now);
        base.send_frame(frame)?;
        Ok(frame)
    }

    pub fn health(&self) -> LinkHealth {
        self.watchdog.health()
    }

    pub fn command(&self) -> Option<&VelocityCommand> {
        self.command.as_ref()
    }
}

/// Send the zero frame `count` times at tick cadence, then cut motor power if managed
pub async fn stop_sequence<W: Write>(
    base: &mut KobukiBase<W>,
    ticker: &mut Interval,
    count: u32,
    manage_motor_power: bool,
) -> Result<(), KobukiError> {
    info!("Stopping base ({} zero frames)", count);
    for _ in 0..count {
        ticker.tick().await;
        base.stop()?;
    }
    if manage_motor_power {
        base.set_motor_power(false)?;
    }
    Ok(())
}

/// Process signals that trigger the stop sequence.
///
/// Handlers are installed on construction, so a signal that lands during
/// startup is held until the loop first checks for it instead of killing
/// the process with the motors powered.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignal {
    /// Install SIGINT/SIGTERM handlers (Ctrl+C on Windows)
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Resolves once a shutdown signal has been received
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }

    #[cfg(windows)]
    pub async fn recv(&mut self) {
        self.ctrl_c.recv().await;
    }
}

fn ticker(config: &BridgeConfig) -> Interval {
    let mut tick = interval(config.tick_period());
    // A late tick is sent late, never in a burst
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

/// Let the link settle, then power the motors if this deployment manages them
pub async fn startup<W: Write>(
    config: &BridgeConfig,
    base: &mut KobukiBase<W>,
) -> Result<(), KobukiError> {
    sleep(config.settle_delay()).await;
    if config.manage_motor_power {
        base.set_motor_power(true)?;
        sleep(config.settle_delay()).await;
    }
    Ok(())
}

/// Tick until `shutdown` resolves, then run the stop sequence
///
/// `config` must have passed [`BridgeConfig::validate`].
pub async fn run_loop<W, S>(
    config: &BridgeConfig,
    base: &mut KobukiBase<W>,
    receiver: &mut CommandReceiver,
    shutdown: S,
) -> Result<(), BridgeError>
where
    W: Write,
    S: std::future::Future<Output = ()>,
{
    let mut control = ControlLoop::new(config);
    let mut tick = ticker(config);

    info!(
        "Bridge started: {}Hz loop, {}ms watchdog timeout, {:?} commands",
        config.tick_hz,
        config.timeout().as_millis(),
        control.mode
    );

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = tick.tick() => {
                // Transport errors are fatal; the base's Drop makes a last stop attempt
                control.tick(receiver, base, Instant::now())?;
            }
        }
    }

    info!("Shutdown requested");
    stop_sequence(base, &mut tick, config.stop_frames, config.manage_motor_power).await?;
    info!("Base stopped");
    Ok(())
}

/// Open the serial link, power up, bind the UDP listener and run until Ctrl+C / SIGTERM
pub async fn run(config: BridgeConfig) -> Result<(), BridgeError> {
    config.validate()?;
    let mut signals = ShutdownSignal::install().map_err(BridgeError::Signal)?;

    let mut base = KobukiBase::open(&config.serial_port, config.baudrate)?;
    startup(&config, &mut base).await?;

    let mut receiver = match CommandReceiver::bind(config.bind_addr, config.command_mode()) {
        Ok(receiver) => receiver,
        Err(source) => {
            if config.manage_motor_power {
                if let Err(e) = base.set_motor_power(false) {
                    error!("Failed to cut motor power: {}", e);
                }
            }
            return Err(BridgeError::Bind {
                addr: config.bind_addr,
                source,
            });
        }
    };

    info!("Driving Kobuki on {}", config.serial_port);
    run_loop(&config, &mut base, &mut receiver, signals.recv()).await
    // base and receiver are released here, after the stop sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::KobukiBus;
    use std::net::UdpSocket;
    use std::time::Duration;

    fn test_config(manage_motor_power: bool) -> BridgeConfig {
        BridgeConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            manage_motor_power,
            tick_hz: 100.0,
            stop_frames: 3,
            settle_ms: 1,
            ..BridgeConfig::teleop()
        }
    }

    fn memory_base() -> KobukiBase<Vec<u8>> {
        KobukiBase::from_bus(KobukiBus::from_writer(Vec::new()))
    }

    /// Split a written byte stream back into packets
    fn packets(mut bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while bytes.len() >= 4 {
            assert_eq!(&bytes[..2], &[0xAA, 0x55]);
            let total = 2 + 1 + bytes[2] as usize + 1;
            out.push(bytes[..total].to_vec());
            bytes = &bytes[total..];
        }
        assert!(bytes.is_empty());
        out
    }

    #[test]
    fn test_no_command_means_stop() {
        let mut control = ControlLoop::new(&test_config(false));
        assert_eq!(control.compute_frame(Instant::now()), DriveFrame::STOP);
        assert_eq!(control.health(), LinkHealth::CmdStale);
    }

    #[test]
    fn test_command_decays_after_timeout() {
        let mut control = ControlLoop::new(&BridgeConfig::teleop());
        let t0 = Instant::now();
        assert!(control.on_datagram(b"0.2 0.0", t0));

        // 20 Hz ticks up to and including t = 0.5 s
        for i in 0..=10 {
            let now = t0 + Duration::from_millis(50 * i);
            assert_eq!(control.compute_frame(now), DriveFrame::new(200, 0), "tick {}", i);
        }
        for i in 11..20 {
            let now = t0 + Duration::from_millis(50 * i);
            assert_eq!(control.compute_frame(now), DriveFrame::STOP, "tick {}", i);
        }
        assert_eq!(control.health(), LinkHealth::CmdStale);
    }

    #[test]
    fn test_malformed_datagram_has_no_effect() {
        let t0 = Instant::now();
        let late = t0 + Duration::from_millis(600);

        let mut clean = ControlLoop::new(&BridgeConfig::teleop());
        assert!(clean.on_datagram(b"0.2 0.0", t0));

        let mut noisy = ControlLoop::new(&BridgeConfig::teleop());
        assert!(noisy.on_datagram(b"0.2 0.0", t0));
        assert!(!noisy.on_datagram(b"abc def", t0 + Duration::from_millis(400)));

        let mid = t0 + Duration::from_millis(450);
        assert_eq!(noisy.compute_frame(mid), clean.compute_frame(mid));
        // The malformed packet did not extend the command past the timeout
        assert_eq!(noisy.compute_frame(late), DriveFrame::STOP);
        assert_eq!(noisy.compute_frame(late), clean.compute_frame(late));
    }

    #[test]
    fn test_linear_only_ignores_angular() {
        let mut control = ControlLoop::new(&BridgeConfig::linear_debug());
        let t0 = Instant::now();
        assert!(control.on_datagram(b"0.2 1.0", t0));
        assert_eq!(control.compute_frame(t0), DriveFrame::new(200, 0));
    }

    #[test]
    fn test_tick_writes_one_frame() {
        let config = test_config(false);
        let mut control = ControlLoop::new(&config);
        let mut receiver =
            CommandReceiver::bind(config.bind_addr, config.command_mode()).unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"0.0 0.5", receiver.local_addr().unwrap())
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let mut base = memory_base();
        let frame = control.tick(&mut receiver, &mut base, Instant::now()).unwrap();
        assert_eq!(frame, DriveFrame::new(0, 1));

        let written = packets(base.bus().get_ref());
        assert_eq!(written.len(), 1);
        assert_eq!(written[0][3..5], [0x01, 0x04]);
    }

    #[tokio::test]
    async fn test_startup_and_shutdown_sequence() {
        let config = test_config(true);
        let mut base = memory_base();
        startup(&config, &mut base).await.unwrap();
        let mut receiver =
            CommandReceiver::bind(config.bind_addr, config.command_mode()).unwrap();

        run_loop(
            &config,
            &mut base,
            &mut receiver,
            sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        let written = packets(base.bus().get_ref());
        // Motor power on first, motor power off last
        assert_eq!(written.first().unwrap()[3..6], [0x04, 0x02, 0x01]);
        assert_eq!(written.last().unwrap()[3..6], [0x04, 0x02, 0x00]);

        // Everything in between is a zero drive frame: no command was ever sent
        let frames = &written[1..written.len() - 1];
        assert!(frames.len() >= config.stop_frames as usize);
        for pkt in frames {
            assert_eq!(pkt[3..9], [0x01, 0x04, 0, 0, 0, 0]);
        }
        assert_eq!(base.last_frame(), Some(DriveFrame::STOP));
    }

    #[tokio::test]
    async fn test_motion_is_stopped_on_shutdown() {
        let config = test_config(false);
        let mut base = memory_base();
        let mut receiver =
            CommandReceiver::bind(config.bind_addr, config.command_mode()).unwrap();
        let target = receiver.local_addr().unwrap();

        // Keep the command fresh until after shutdown fires
        let sender = std::thread::spawn(move || {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            for _ in 0..30 {
                socket.send_to(b"0.2 0.0", target).unwrap();
                std::thread::sleep(Duration::from_millis(5));
            }
        });

        run_loop(
            &config,
            &mut base,
            &mut receiver,
            sleep(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        sender.join().unwrap();

        let written = packets(base.bus().get_ref());
        let stop_frames = config.stop_frames as usize;
        assert!(written.len() > stop_frames);
        assert!(written.iter().all(|pkt| pkt[3] == 0x01));

        // 200 mm/s straight while commands were flowing
        let moving = [0x01, 0x04, 0xC8, 0x00, 0x00, 0x00];
        assert!(written.iter().any(|pkt| pkt[3..9] == moving));
        assert_eq!(written[written.len() - stop_frames - 1][3..9], moving);

        // The tail is exactly the stop sequence
        for pkt in &written[written.len() - stop_frames..] {
            assert_eq!(pkt[3..9], [0x01, 0x04, 0, 0, 0, 0]);
        }
        assert_eq!(base.last_frame(), Some(DriveFrame::STOP));
    }

    #[tokio::test]
    async fn test_early_shutdown_still_cuts_motor_power() {
        // A signal held since startup resolves on the loop's first poll
        let config = test_config(true);
        let mut base = memory_base();
        startup(&config, &mut base).await.unwrap();
        let mut receiver =
            CommandReceiver::bind(config.bind_addr, config.command_mode()).unwrap();

        run_loop(&config, &mut base, &mut receiver, async {})
            .await
            .unwrap();

        let written = packets(base.bus().get_ref());
        assert_eq!(written.len(), 1 + config.stop_frames as usize + 1);
        assert_eq!(written[0][3..6], [0x04, 0x02, 0x01]);
        for pkt in &written[1..written.len() - 1] {
            assert_eq!(pkt[3..9], [0x01, 0x04, 0, 0, 0, 0]);
        }
        assert_eq!(written.last().unwrap()[3..6], [0x04, 0x02, 0x00]);
    }

    #[tokio::test]
    async fn test_leaves_motor_power_alone() {
        let config = test_config(false);
        let mut base = memory_base();
        startup(&config, &mut base).await.unwrap();
        assert!(base.bus().get_ref().is_empty());

        let mut receiver =
            CommandReceiver::bind(config.bind_addr, config.command_mode()).unwrap();
        run_loop(&config, &mut base, &mut receiver, async {})
            .await
            .unwrap();

        let written = packets(base.bus().get_ref());
        assert_eq!(written.len(), config.stop_frames as usize);
        assert!(written.iter().all(|pkt| pkt[3] == 0x01));
    }

    #[tokio::test]
    async fn test_signal_handlers_install() {
        assert!(ShutdownSignal::install().is_ok());
    }
}
