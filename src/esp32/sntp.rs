//! SNTP wall-clock synchronization.

use esp_idf_svc::sntp::{EspSntp, SntpConf, SNTP_SERVER_NUM};

use crate::platform::{PlatformError, TimeSync};

/// Network time source backed by ESP-IDF SNTP.
#[derive(Default)]
pub struct EspClock {
    sntp: Option<EspSntp<'static>>,
}

impl EspClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSync for EspClock {
    fn sync(
        &mut self,
        server: &str,
        utc_offset_secs: i32,
        dst_offset_secs: i32,
    ) -> Result<(), PlatformError> {
        // SNTP keeps the server-name pointer, so intern the name for the
        // process lifetime. Re-arming replaces any previous session.
        let server: &'static str = Box::leak(server.to_owned().into_boxed_str());
        self.sntp = None;

        let conf = SntpConf {
            servers: [server; SNTP_SERVER_NUM],
            ..SntpConf::default()
        };
        self.sntp = Some(EspSntp::new(&conf)?);

        set_timezone(utc_offset_secs, dst_offset_secs);
        Ok(())
    }
}

/// Apply the UTC/DST offsets through the newlib TZ mechanism. POSIX TZ
/// offsets are west-positive, hence the sign flips.
fn set_timezone(utc_offset_secs: i32, dst_offset_secs: i32) {
    let std_hours = -utc_offset_secs / 3600;
    let tz = if dst_offset_secs != 0 {
        let dst_hours = std_hours - dst_offset_secs / 3600;
        format!("STD{:+}DST{:+}", std_hours, dst_hours)
    } else {
        format!("STD{:+}", std_hours)
    };
    std::env::set_var("TZ", &tz);
    unsafe {
        esp_idf_sys::tzset();
    }
}
