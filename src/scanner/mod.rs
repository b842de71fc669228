//! Network scanners that feed discovery sessions.
//!
//! A scanner implements [`crate::discovery::Scanner`]: it starts producing
//! [`crate::discovery::DiscoveryMessage`]s into a shared backlog without
//! blocking, reports when its own work is done, and can be disconnected at
//! any time.
//!
//! - [`udp`]: broadcast probe / unicast response discovery

pub mod udp;

pub use udp::{UdpScanner, MAX_DATAGRAM_SIZE};
