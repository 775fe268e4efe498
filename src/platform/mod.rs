//! Collaborator interfaces consumed by the connection manager.
//!
//! The manager does not own a radio driver, a portal UI, or an update
//! transport; it drives them through the traits below. Each trait is
//! dyn-compatible so the manager can hold boxed collaborators, and none of
//! them require `Send`: the whole model is a single cooperative scheduler
//! thread.
//!
//! # Components
//!
//! - [`LinkControl`] - the network link (connect/disconnect plus readers)
//! - [`ProvisioningPortal`] - the captive configuration portal
//! - [`UpdateTransport`] - the OTA receive channel
//! - [`ServiceAdvertise`] - service discovery announcement
//! - [`TimeSync`] - best-effort wall-clock synchronization
//! - [`Filesystem`] - mount control for the update window
//!
//! Portal and transport deliver their lifecycle as events drained from
//! `pump()`/`poll()` once per tick rather than through registered callbacks,
//! which keeps edge handling synchronous and re-entrancy-safe.

pub mod sim;

use std::fmt;
use std::net::IpAddr;

/// The network link: connection control plus live state readers.
///
/// Readers return zero values (`false`, empty, `None`, 0) while the link is
/// down; the implementation is responsible for that, the manager does not
/// re-check.
pub trait LinkControl {
    /// Bring the link up using stored credentials.
    fn connect(&mut self) -> Result<(), PlatformError>;
    /// Take the link down. Stored credentials are kept.
    fn disconnect(&mut self) -> Result<(), PlatformError>;
    /// Current link-connected state. Sampled by the poller every tick.
    fn is_connected(&self) -> bool;
    /// SSID of the associated network, empty when disconnected.
    fn ssid(&self) -> String;
    /// Local address, `None` when disconnected.
    fn local_addr(&self) -> Option<IpAddr>;
    /// Received signal strength in dBm, 0 when disconnected.
    fn signal_strength(&self) -> i32;
    /// Radio channel, 0 when disconnected.
    fn channel(&self) -> u8;
    /// Set the device hostname used on the network.
    fn set_hostname(&mut self, name: &str) -> Result<(), PlatformError>;
    /// Short stable identifier derived from the factory MAC, used as the
    /// default portal name.
    fn device_id(&self) -> String;
}

/// Event surfaced by a modeless portal pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalEvent {
    /// The portal access point is up and serving the configuration UI.
    Activated,
    /// The user saved credentials; the portal session is over.
    CredentialsSaved,
}

/// How a blocking portal session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalOutcome {
    /// Credentials were saved.
    Saved,
    /// The portal timed out without a save.
    TimedOut,
}

/// The captive provisioning portal.
///
/// Exactly one of the two start shapes is used per session, chosen by the
/// configured mode: `start_blocking` cedes control until the session ends,
/// `start_modeless` returns immediately and relies on `pump` being called
/// every tick.
pub trait ProvisioningPortal {
    /// Run the portal to completion (save or timeout).
    fn start_blocking(&mut self, name: &str, password: Option<&str>) -> PortalOutcome;
    /// Open the portal and return immediately.
    fn start_modeless(&mut self, name: &str, password: Option<&str>);
    /// Service a modeless portal; drained once per tick while a session is
    /// active. Returns `None` when nothing happened.
    fn pump(&mut self) -> Option<PortalEvent>;
}

/// What kind of image an update carries. Diagnostics only; both kinds take
/// the filesystem offline for the duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Application firmware image.
    Firmware,
    /// Filesystem image.
    Filesystem,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firmware => write!(f, "firmware"),
            Self::Filesystem => write!(f, "filesystem"),
        }
    }
}

/// Why an update failed. Surfaced for diagnostics only; every kind triggers
/// the same recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateErrorKind {
    /// Authentication failed.
    Auth,
    /// The transport could not start the transfer.
    Begin,
    /// The peer connection failed.
    Connect,
    /// Receiving data failed mid-transfer.
    Receive,
    /// Finalizing the image failed.
    End,
}

impl fmt::Display for UpdateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Auth => "auth failed",
            Self::Begin => "begin failed",
            Self::Connect => "connect failed",
            Self::Receive => "receive failed",
            Self::End => "end failed",
        };
        write!(f, "{}", msg)
    }
}

/// Lifecycle event reported by the update transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    /// A transfer started.
    Begin {
        /// What kind of image is arriving.
        kind: UpdateKind,
    },
    /// Transfer progress. The transport guarantees `total` is non-zero, but
    /// consumers still guard the division.
    Progress { done: u32, total: u32 },
    /// The transfer completed and the image was applied.
    End,
    /// The transfer failed.
    Error(UpdateErrorKind),
}

/// The over-the-air update receive channel.
pub trait UpdateTransport {
    /// Set the identity the transport announces (hostname, optional auth).
    fn configure(&mut self, hostname: &str, password: Option<&str>);
    /// Start listening for updates.
    fn begin(&mut self) -> Result<(), PlatformError>;
    /// Stop listening. Safe to call when not running.
    fn end(&mut self);
    /// Drain one lifecycle event. Serviced only while the link is up.
    fn poll(&mut self) -> Option<UpdateEvent>;
}

/// Service-discovery announcement of the update endpoint.
pub trait ServiceAdvertise {
    fn advertise(&mut self, service: &str, proto: &str, port: u16) -> Result<(), PlatformError>;
}

/// Wall-clock synchronization from a network time source.
pub trait TimeSync {
    /// Best-effort sync; errors are reported but never fatal to the caller.
    fn sync(
        &mut self,
        server: &str,
        utc_offset_secs: i32,
        dst_offset_secs: i32,
    ) -> Result<(), PlatformError>;
}

/// Mount control for the filesystem that must be offline during an update.
pub trait Filesystem {
    fn mount(&mut self) -> Result<(), PlatformError>;
    fn unmount(&mut self) -> Result<(), PlatformError>;
}

/// The full set of collaborators handed to the manager at construction.
pub struct Collaborators {
    pub link: Box<dyn LinkControl>,
    pub portal: Box<dyn ProvisioningPortal>,
    pub transport: Box<dyn UpdateTransport>,
    pub advertiser: Box<dyn ServiceAdvertise>,
    pub clock: Box<dyn TimeSync>,
    pub filesystem: Box<dyn Filesystem>,
}

/// Errors reported by collaborator implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// No credentials are stored; connecting is not possible yet.
    NotConfigured,
    /// Connecting to the network failed.
    ConnectFailed(String),
    /// Driver-level failure.
    Driver(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "no credentials configured"),
            Self::ConnectFailed(reason) => write!(f, "connection failed: {}", reason),
            Self::Driver(reason) => write!(f, "driver error: {}", reason),
        }
    }
}

impl std::error::Error for PlatformError {}
