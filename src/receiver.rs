//! Non-blocking UDP command receiver.
//!
//! The socket is polled once per control tick. An empty socket is the common
//! case and leaves all state untouched; a malformed datagram is dropped
//! without refreshing the watchdog.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::messages::{CommandMode, ParseError, VelocityCommand};
use crate::watchdog::WatchdogState;

/// Largest datagram read per poll; longer payloads are truncated by the OS.
pub const RECV_BUFFER_LEN: usize = 1024;

/// What a single poll produced.
#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    /// Nothing pending this tick.
    Idle,
    /// A valid command replaced the current one.
    Accepted(VelocityCommand),
    /// A datagram arrived but was dropped.
    Rejected(ParseError),
}

/// Apply one datagram payload to the loop-owned command state.
///
/// On success the current command is replaced and the watchdog is fed. On
/// failure neither is touched.
pub fn accept_datagram(
    payload: &[u8],
    mode: CommandMode,
    command: &mut Option<VelocityCommand>,
    watchdog: &mut WatchdogState,
    now: Instant,
) -> Result<VelocityCommand, ParseError> {
    let cmd = VelocityCommand::parse(payload, mode, now)?;
    *command = Some(cmd);
    watchdog.feed(now);
    Ok(cmd)
}

/// UDP listener for textual velocity commands.
pub struct CommandReceiver {
    socket: UdpSocket,
    mode: CommandMode,
    buf: [u8; RECV_BUFFER_LEN],
}

impl CommandReceiver {
    /// Binds a non-blocking listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound (e.g., address in use).
    pub fn bind(addr: SocketAddr, mode: CommandMode) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        info!("Listening for commands on UDP {}", socket.local_addr()?);
        Ok(Self {
            socket,
            mode,
            buf: [0u8; RECV_BUFFER_LEN],
        })
    }

    /// Returns the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn mode(&self) -> CommandMode {
        self.mode
    }

    /// Attempts one read, returning `Ok(None)` instead of `WouldBlock`.
    fn try_recv_from(&mut self) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Reads at most one pending datagram and applies it to the command state.
    ///
    /// Socket errors are logged and reported as [`PollOutcome::Idle`]; they
    /// never stop the control loop.
    pub fn poll(
        &mut self,
        command: &mut Option<VelocityCommand>,
        watchdog: &mut WatchdogState,
        now: Instant,
    ) -> PollOutcome {
        let (len, from) = match self.try_recv_from() {
            Ok(Some(received)) => received,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                warn!("UDP receive error: {}", e);
                return PollOutcome::Idle;
            }
        };

        match accept_datagram(&self.buf[..len], self.mode, command, watchdog, now) {
            Ok(cmd) => {
                debug!(
                    "RX {} -> lin={:.3}, ang={:.3}",
                    from, cmd.linear_m_s, cmd.angular_rad_s
                );
                PollOutcome::Accepted(cmd)
            }
            Err(e) => {
                warn!("Dropped datagram from {}: {}", from, e);
                PollOutcome::Rejected(e)
            }
        }
    }
}
