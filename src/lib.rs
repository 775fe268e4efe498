//! WiFi connection lifecycle manager for ESP32 firmware.
//!
//! This library brings a device's network link up, falls back to a captive
//! provisioning portal when no credentials work, detects connect/disconnect
//! transitions from a polled link signal, and coordinates an over-the-air
//! update window that is mutually exclusive with filesystem use.
//!
//! The core is platform-independent and host-testable: the radio driver,
//! portal UI, update transport, service advertisement, time sync, and
//! filesystem are all reached through the traits in [`platform`], with
//! ESP-IDF backed implementations gated behind the `esp32` feature and
//! deterministic simulations in [`platform::sim`] for the host.
//!
//! # Example
//!
//! ```
//! use wifi_connector_rs_esp32::platform::sim::SimPlatform;
//! use wifi_connector_rs_esp32::ConnectionManager;
//!
//! let sim = SimPlatform::new();
//! // Pretend the user enters credentials in the blocking portal.
//! sim.portal.script_save("home");
//!
//! let mut manager = ConnectionManager::new(sim.collaborators());
//! manager.setup(Some("portal"), None).unwrap();
//!
//! assert!(manager.current_status().connected);
//! assert_eq!(manager.current_status().ssid, "home");
//! ```

pub mod config;
pub mod manager;
pub mod platform;
pub mod status;

#[cfg(feature = "esp32")]
pub mod esp32;

// Re-export commonly used items
pub use config::{ConfigError, PortalConfig, TimeConfig};
pub use manager::{ConnectionManager, Edge, Notifications};
pub use platform::{
    Collaborators, PlatformError, PortalEvent, PortalOutcome, UpdateErrorKind, UpdateEvent,
    UpdateKind,
};
pub use status::ConnectionStatus;
