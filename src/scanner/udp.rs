//! UDP broadcast scanner.
//!
//! # Overview
//!
//! [`UdpScanner`] binds a local socket, broadcasts the connector's probe
//! payload and collects every datagram that arrives during the listen
//! window. Each response becomes a [`DiscoveryMessage`] in the shared
//! backlog. The probe is repeated `probe_attempts` times, `probe_interval`
//! apart, because broadcast delivery on Wi-Fi is lossy.
//!
//! When the window closes the scanner reports [`ScannerEvent::Finished`].
//! Responses that are still in the backlog are left for the orchestrator to
//! drain.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::rc::Rc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;

use crate::config::ConnectorConfig;
use crate::discovery::{
    DiscoveryMessage, MessageBacklog, Scanner, ScannerError, ScannerEvent, ScannerEvents,
    TimerSlot,
};

/// Largest datagram accepted from a device.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Scanner that discovers devices answering a UDP broadcast probe.
#[derive(Debug)]
pub struct UdpScanner {
    connector: ConnectorConfig,
    backlog: Rc<MessageBacklog>,
    listener: TimerSlot,
}

impl UdpScanner {
    /// Create a scanner for `connector` that fills `backlog`.
    #[must_use]
    pub fn new(connector: ConnectorConfig, backlog: Rc<MessageBacklog>) -> Self {
        Self {
            connector,
            backlog,
            listener: TimerSlot::new("udp listener"),
        }
    }

    /// Bind and prepare the socket, then send the first probe.
    fn open_socket(&self) -> Result<StdUdpSocket, ScannerError> {
        let bind = self.connector.bind;
        let socket = StdUdpSocket::bind(bind).map_err(|source| ScannerError::Bind {
            addr: bind.to_string(),
            source,
        })?;
        socket.set_broadcast(true)?;
        socket
            .send_to(self.connector.probe.as_bytes(), self.connector.broadcast)
            .map_err(|source| ScannerError::Probe {
                target: self.connector.broadcast.to_string(),
                source,
            })?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }
}

impl Scanner for UdpScanner {
    fn discover(&mut self) -> Result<ScannerEvents, ScannerError> {
        if self.listener.is_armed() {
            return Err(ScannerError::Unavailable(
                "a discovery is already running".to_string(),
            ));
        }

        let socket = UdpSocket::from_std(self.open_socket()?)?;
        log::debug!(
            "Probing {} from {} for {:?}",
            self.connector.broadcast,
            socket
                .local_addr()
                .map_or_else(|_| "?".to_string(), |a| a.to_string()),
            self.connector.listen_window()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let listen = Listen {
            socket,
            backlog: Rc::clone(&self.backlog),
            connector: self.connector.clone(),
            events: tx,
        };
        self.listener.arm(listen.run());
        Ok(rx)
    }

    fn disconnect(&mut self) {
        if self.listener.cancel() {
            log::debug!("Disconnected scanner for {}", self.connector.id);
        }
    }
}

/// State moved into the listener task.
struct Listen {
    socket: UdpSocket,
    backlog: Rc<MessageBacklog>,
    connector: ConnectorConfig,
    events: UnboundedSender<ScannerEvent>,
}

impl Listen {
    async fn run(self) {
        let started = Instant::now();
        let window_end = started + self.connector.listen_window();
        let mut probes_sent = 1;
        let mut next_probe = started + self.connector.probe_interval();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                () = tokio::time::sleep_until(window_end) => {
                    log::debug!("Listen window for {} closed", self.connector.id);
                    let _ = self.events.send(ScannerEvent::Finished);
                    return;
                }
                () = tokio::time::sleep_until(next_probe), if probes_sent < self.connector.probe_attempts => {
                    self.send_probe().await;
                    probes_sent += 1;
                    next_probe += self.connector.probe_interval();
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        if may_be_truncated(len) {
                            log::warn!(
                                "Response from {} filled the {}-byte buffer and may have been truncated",
                                source,
                                MAX_DATAGRAM_SIZE
                            );
                        }
                        self.accept(source, &buf[..len]);
                    }
                    Err(e) => {
                        let _ = self.events.send(ScannerEvent::Failed(e.into()));
                        return;
                    }
                },
            }
        }
    }

    async fn send_probe(&self) {
        let probe = self.connector.probe.as_bytes();
        if let Err(e) = self.socket.send_to(probe, self.connector.broadcast).await {
            log::warn!("Failed to resend probe to {}: {}", self.connector.broadcast, e);
        }
    }

    fn accept(&self, source: SocketAddr, datagram: &[u8]) {
        // Broadcasts can loop back to the sender.
        if datagram == self.connector.probe.as_bytes() {
            return;
        }
        let payload = String::from_utf8_lossy(datagram).into_owned();
        log::trace!("Response from {}: {}", source, payload);
        self.backlog.push(DiscoveryMessage::new(source, payload));
    }
}

/// A datagram that fills the receive buffer may have lost its tail.
fn may_be_truncated(len: usize) -> bool {
    len >= MAX_DATAGRAM_SIZE
}
