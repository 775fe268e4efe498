//! NVS persistence for WiFi credentials.
//!
//! The provisioning portal stores credentials here; [`super::EspLink`]
//! reads them back on connect. They survive reboots.

use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::EspError;

/// NVS namespace for WiFi configuration.
const NVS_NAMESPACE: &str = "wifi_config";

/// NVS key for stored credentials.
const NVS_KEY: &str = "credentials";

/// Maximum SSID length per IEEE 802.11.
const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
const MAX_PASSWORD_LEN: usize = 64;

/// Buffer size for serialized credentials, with a small margin.
/// Format: `[ssid_len:1][ssid:32][password_len:1][password:64]`.
const MAX_CREDENTIAL_BUFFER_SIZE: usize = 1 + MAX_SSID_LEN + 1 + MAX_PASSWORD_LEN + 4;

/// WiFi credentials as stored in NVS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub ssid: String,
    /// Empty for open networks.
    pub password: String,
}

impl StoredCredentials {
    /// Serialize to the length-prefixed NVS byte format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.ssid.len() + self.password.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.password.len() as u8);
        bytes.extend_from_slice(self.password.as_bytes());
        bytes
    }

    /// Deserialize from the NVS byte format. Returns `None` on any
    /// truncation or encoding problem; corrupted credentials are treated
    /// the same as absent ones.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let ssid_len = *bytes.first()? as usize;
        let ssid_end = 1 + ssid_len;
        let ssid = String::from_utf8(bytes.get(1..ssid_end)?.to_vec()).ok()?;

        let password_len = *bytes.get(ssid_end)? as usize;
        let password_start = ssid_end + 1;
        let password =
            String::from_utf8(bytes.get(password_start..password_start + password_len)?.to_vec())
                .ok()?;

        Some(Self { ssid, password })
    }
}

/// Load credentials from NVS. Returns `None` when nothing is stored or the
/// stored blob is corrupted.
pub fn load_wifi_credentials(nvs: &EspNvs<NvsDefault>) -> Option<StoredCredentials> {
    let mut buf = [0u8; MAX_CREDENTIAL_BUFFER_SIZE];
    let bytes = nvs.get_raw(NVS_KEY, &mut buf).ok()??;
    StoredCredentials::from_bytes(bytes)
}

/// Save credentials to NVS.
pub fn save_wifi_credentials(
    nvs: &mut EspNvs<NvsDefault>,
    credentials: &StoredCredentials,
) -> Result<(), EspError> {
    nvs.set_raw(NVS_KEY, &credentials.to_bytes())?;
    Ok(())
}

/// Clear stored credentials.
pub fn clear_wifi_credentials(nvs: &mut EspNvs<NvsDefault>) -> Result<(), EspError> {
    nvs.remove(NVS_KEY)?;
    Ok(())
}

/// Open the NVS namespace used for WiFi credentials.
pub fn open_credentials_nvs() -> Result<EspNvs<NvsDefault>, EspError> {
    let partition = EspNvsPartition::<NvsDefault>::take()?;
    EspNvs::new(partition, NVS_NAMESPACE, true)
}
