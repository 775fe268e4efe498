//! ESP-IDF WiFi link driver wrapper.
//!
//! Wraps the blocking ESP-IDF WiFi driver behind [`LinkControl`].
//! Credentials come from NVS, where the application's provisioning portal
//! stores them.

use std::net::IpAddr;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::handle::RawHandle;
use esp_idf_svc::nvs::{EspNvs, NvsDefault};
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::{info, warn};

use super::storage::load_wifi_credentials;
use crate::platform::{LinkControl, PlatformError};

/// ESP32 WiFi link.
pub struct EspLink<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
    nvs: EspNvs<NvsDefault>,
}

impl<'a> EspLink<'a> {
    /// Wrap the WiFi modem peripheral. `nvs` is the namespace holding the
    /// stored credentials.
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspNvs<NvsDefault>,
    ) -> Result<Self, PlatformError> {
        let esp_wifi = EspWifi::new(modem, sysloop.clone(), None)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        Ok(Self { wifi, nvs })
    }

    /// Record of the currently associated access point, `None` when the
    /// link is down.
    fn ap_record(&self) -> Option<esp_idf_sys::wifi_ap_record_t> {
        if !self.is_connected() {
            return None;
        }
        let mut record = esp_idf_sys::wifi_ap_record_t::default();
        let err = unsafe { esp_idf_sys::esp_wifi_sta_get_ap_info(&mut record) };
        if err == esp_idf_sys::ESP_OK {
            Some(record)
        } else {
            None
        }
    }
}

impl<'a> LinkControl for EspLink<'a> {
    fn connect(&mut self) -> Result<(), PlatformError> {
        let credentials =
            load_wifi_credentials(&self.nvs).ok_or(PlatformError::NotConfigured)?;
        info!("connecting to \"{}\"", credentials.ssid);

        let auth_method = if credentials.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| PlatformError::ConnectFailed("SSID too long".to_string()))?,
            password: credentials
                .password
                .as_str()
                .try_into()
                .map_err(|_| PlatformError::ConnectFailed("password too long".to_string()))?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        self.wifi.start()?;
        self.wifi
            .connect()
            .map_err(|e| PlatformError::ConnectFailed(format!("{:?}", e)))?;
        // Wait for DHCP before reporting up.
        self.wifi
            .wait_netif_up()
            .map_err(|e| PlatformError::ConnectFailed(format!("DHCP: {:?}", e)))?;

        if let Some(addr) = self.local_addr() {
            info!("connected, address {}", addr);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        if self.wifi.is_connected().unwrap_or(false) {
            self.wifi.disconnect()?;
        }
        if let Err(e) = self.wifi.stop() {
            warn!("stopping WiFi failed: {:?}", e);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn ssid(&self) -> String {
        let Some(record) = self.ap_record() else {
            return String::new();
        };
        let len = record.ssid.iter().position(|&b| b == 0).unwrap_or(record.ssid.len());
        String::from_utf8_lossy(&record.ssid[..len]).into_owned()
    }

    fn local_addr(&self) -> Option<IpAddr> {
        if !self.is_connected() {
            return None;
        }
        let info = self.wifi.wifi().sta_netif().get_ip_info().ok()?;
        format!("{}", info.ip).parse().ok()
    }

    fn signal_strength(&self) -> i32 {
        self.ap_record().map_or(0, |record| record.rssi as i32)
    }

    fn channel(&self) -> u8 {
        self.ap_record().map_or(0, |record| record.primary)
    }

    fn set_hostname(&mut self, name: &str) -> Result<(), PlatformError> {
        let hostname = std::ffi::CString::new(name)
            .map_err(|_| PlatformError::Driver("hostname contains NUL".to_string()))?;
        let netif = self.wifi.wifi().sta_netif().handle();
        esp_idf_sys::esp!(unsafe { esp_idf_sys::esp_netif_set_hostname(netif, hostname.as_ptr()) })?;
        Ok(())
    }

    fn device_id(&self) -> String {
        let mut mac = [0u8; 6];
        unsafe {
            esp_idf_sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
        }
        format!("esp32-{:02X}{:02X}", mac[4], mac[5])
    }
}
