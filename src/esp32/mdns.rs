//! mDNS service advertisement.

use esp_idf_svc::mdns::EspMdns;

use crate::platform::{PlatformError, ServiceAdvertise};

/// Advertises the update-service endpoint over mDNS-SD.
pub struct EspAdvertiser {
    mdns: EspMdns,
}

impl EspAdvertiser {
    /// Take the mDNS responder and announce under `hostname`.
    pub fn new(hostname: &str) -> Result<Self, PlatformError> {
        let mut mdns = EspMdns::take()?;
        mdns.set_hostname(hostname)?;
        Ok(Self { mdns })
    }
}

impl ServiceAdvertise for EspAdvertiser {
    fn advertise(&mut self, service: &str, proto: &str, port: u16) -> Result<(), PlatformError> {
        // Service and proto names carry their leading underscore already,
        // so discovery tooling sees the full form (e.g. "_http._tcp").
        self.mdns.add_service(None, service, proto, port, &[])?;
        Ok(())
    }
}
