//! Connectivity status snapshot.
//!
//! [`ConnectionStatus`] is produced on demand from the live link and never
//! cached between reads.

use std::fmt;
use std::net::IpAddr;

/// Point-in-time snapshot of the link state.
///
/// When `connected` is false every other field holds its zero value: empty
/// SSID, no address, zero signal strength and channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether the link is associated and has an address.
    pub connected: bool,
    /// SSID of the associated network, empty when disconnected.
    pub ssid: String,
    /// Local address, `None` when disconnected.
    pub local_addr: Option<IpAddr>,
    /// Received signal strength in dBm, 0 when disconnected.
    pub signal_strength: i32,
    /// Radio channel, 0 when disconnected.
    pub channel: u8,
}

impl ConnectionStatus {
    /// Snapshot for a link that is down.
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ssid: String::new(),
            local_addr: None,
            signal_strength: 0,
            channel: 0,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.connected {
            return write!(f, "disconnected");
        }
        match self.local_addr {
            Some(addr) => write!(
                f,
                "connected to \"{}\" ({}, {} dBm, channel {})",
                self.ssid, addr, self.signal_strength, self.channel
            ),
            None => write!(
                f,
                "connected to \"{}\" (no address, {} dBm, channel {})",
                self.ssid, self.signal_strength, self.channel
            ),
        }
    }
}
