//! ESP-IDF implementations of the collaborator interfaces.
//!
//! Only the collaborators ESP-IDF provides directly are implemented here:
//! the WiFi link, NVS credential storage, mDNS advertisement, SNTP time
//! sync, and the SPIFFS filesystem. The captive portal and the OTA byte
//! transport depend on the application's HTTP/OTA stack; applications wire
//! their own [`crate::platform::ProvisioningPortal`] and
//! [`crate::platform::UpdateTransport`] implementations to it.

mod link;
mod mdns;
mod sntp;
mod spiffs;
mod storage;

pub use link::EspLink;
pub use mdns::EspAdvertiser;
pub use sntp::EspClock;
pub use spiffs::EspSpiffs;
pub use storage::{
    clear_wifi_credentials, load_wifi_credentials, open_credentials_nvs, save_wifi_credentials,
    StoredCredentials,
};

use crate::platform::PlatformError;

impl From<esp_idf_sys::EspError> for PlatformError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Driver(format!("ESP error: {:?}", e))
    }
}
