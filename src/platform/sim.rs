//! Simulated collaborators for host-side runs and tests.
//!
//! Every trait in [`crate::platform`] gets a deterministic in-process
//! implementation here. The simulations share state through
//! `Rc<RefCell<..>>` handles so a test (or the host demo) can keep a clone,
//! hand boxed clones to the manager, and then flip connectivity or inject
//! update events between ticks. `Rc` is fine because the whole model is
//! single-threaded.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::rc::Rc;

use super::{
    Collaborators, Filesystem, LinkControl, PlatformError, PortalEvent, PortalOutcome,
    ProvisioningPortal, ServiceAdvertise, TimeSync, UpdateEvent, UpdateTransport,
};

/// Address reported by the simulated link while connected.
const SIM_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 17));

#[derive(Debug, Default)]
struct LinkInner {
    connected: bool,
    credentials: Option<String>,
    ssid: String,
    hostname: String,
    connect_attempts: u32,
}

/// Simulated network link.
#[derive(Clone, Default)]
pub struct SimLink {
    inner: Rc<RefCell<LinkInner>>,
}

impl SimLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store credentials, as a portal save would.
    pub fn install_credentials(&self, ssid: &str) {
        self.inner.borrow_mut().credentials = Some(ssid.to_string());
    }

    /// Flip the live connectivity signal directly (simulates the radio
    /// joining or losing the network outside of `connect`/`disconnect`).
    pub fn set_connected(&self, connected: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.connected = connected;
        inner.ssid = if connected {
            inner.credentials.clone().unwrap_or_else(|| "sim-net".to_string())
        } else {
            String::new()
        };
    }

    pub fn hostname(&self) -> String {
        self.inner.borrow().hostname.clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.inner.borrow().connect_attempts
    }
}

impl LinkControl for SimLink {
    fn connect(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.borrow_mut();
        inner.connect_attempts += 1;
        match inner.credentials.clone() {
            Some(ssid) => {
                inner.connected = true;
                inner.ssid = ssid;
                Ok(())
            }
            None => Err(PlatformError::NotConfigured),
        }
    }

    fn disconnect(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.borrow_mut();
        inner.connected = false;
        inner.ssid.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }

    fn ssid(&self) -> String {
        self.inner.borrow().ssid.clone()
    }

    fn local_addr(&self) -> Option<IpAddr> {
        if self.is_connected() {
            Some(SIM_ADDR)
        } else {
            None
        }
    }

    fn signal_strength(&self) -> i32 {
        if self.is_connected() {
            -52
        } else {
            0
        }
    }

    fn channel(&self) -> u8 {
        if self.is_connected() {
            6
        } else {
            0
        }
    }

    fn set_hostname(&mut self, name: &str) -> Result<(), PlatformError> {
        self.inner.borrow_mut().hostname = name.to_string();
        Ok(())
    }

    fn device_id(&self) -> String {
        "esp32-5A7F".to_string()
    }
}

#[derive(Debug)]
enum BlockingScript {
    Save(String),
    Timeout,
}

#[derive(Debug, Default)]
struct PortalInner {
    blocking_script: Option<BlockingScript>,
    pending: VecDeque<PortalEvent>,
    starts: u32,
}

/// Simulated captive portal.
///
/// Blocking sessions resolve according to the last `script_*` call; modeless
/// sessions surface whatever [`SimPortal::user_saves`] queued.
#[derive(Clone)]
pub struct SimPortal {
    link: SimLink,
    inner: Rc<RefCell<PortalInner>>,
}

impl SimPortal {
    pub fn new(link: SimLink) -> Self {
        Self {
            link,
            inner: Rc::new(RefCell::new(PortalInner::default())),
        }
    }

    /// Script the next blocking session: the user saves credentials for
    /// `ssid` and the device joins that network.
    pub fn script_save(&self, ssid: &str) {
        self.inner.borrow_mut().blocking_script = Some(BlockingScript::Save(ssid.to_string()));
    }

    /// Script the next blocking session to time out without a save.
    pub fn script_timeout(&self) {
        self.inner.borrow_mut().blocking_script = Some(BlockingScript::Timeout);
    }

    /// Simulate the user saving credentials in a modeless session. The link
    /// joins the network immediately; the save event is surfaced by the next
    /// `pump`.
    pub fn user_saves(&self, ssid: &str) {
        self.link.install_credentials(ssid);
        self.link.set_connected(true);
        self.inner
            .borrow_mut()
            .pending
            .push_back(PortalEvent::CredentialsSaved);
    }

    /// How many sessions have been started (blocking or modeless).
    pub fn starts(&self) -> u32 {
        self.inner.borrow().starts
    }
}

impl ProvisioningPortal for SimPortal {
    fn start_blocking(&mut self, _name: &str, _password: Option<&str>) -> PortalOutcome {
        let script = {
            let mut inner = self.inner.borrow_mut();
            inner.starts += 1;
            inner.blocking_script.take()
        };
        match script {
            Some(BlockingScript::Save(ssid)) => {
                self.link.install_credentials(&ssid);
                self.link.set_connected(true);
                PortalOutcome::Saved
            }
            Some(BlockingScript::Timeout) | None => PortalOutcome::TimedOut,
        }
    }

    fn start_modeless(&mut self, _name: &str, _password: Option<&str>) {
        let mut inner = self.inner.borrow_mut();
        inner.starts += 1;
        inner.pending.push_back(PortalEvent::Activated);
    }

    fn pump(&mut self) -> Option<PortalEvent> {
        self.inner.borrow_mut().pending.pop_front()
    }
}

#[derive(Debug, Default)]
struct TransportInner {
    identity: Option<(String, Option<String>)>,
    running: bool,
    begin_calls: u32,
    end_calls: u32,
    events: VecDeque<UpdateEvent>,
}

/// Simulated update transport. Tests push lifecycle events; the manager
/// drains them on its next tick.
#[derive(Clone, Default)]
pub struct SimTransport {
    inner: Rc<RefCell<TransportInner>>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a lifecycle event for the next poll.
    pub fn push(&self, event: UpdateEvent) {
        self.inner.borrow_mut().events.push_back(event);
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    pub fn begin_calls(&self) -> u32 {
        self.inner.borrow().begin_calls
    }

    pub fn end_calls(&self) -> u32 {
        self.inner.borrow().end_calls
    }

    /// Identity from the last `configure` call.
    pub fn identity(&self) -> Option<(String, Option<String>)> {
        self.inner.borrow().identity.clone()
    }
}

impl UpdateTransport for SimTransport {
    fn configure(&mut self, hostname: &str, password: Option<&str>) {
        self.inner.borrow_mut().identity =
            Some((hostname.to_string(), password.map(str::to_string)));
    }

    fn begin(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.borrow_mut();
        inner.begin_calls += 1;
        inner.running = true;
        Ok(())
    }

    fn end(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.end_calls += 1;
        inner.running = false;
    }

    fn poll(&mut self) -> Option<UpdateEvent> {
        self.inner.borrow_mut().events.pop_front()
    }
}

#[derive(Debug)]
struct FilesystemInner {
    mounted: bool,
    mounts: u32,
    unmounts: u32,
}

/// Simulated filesystem; starts mounted.
#[derive(Clone)]
pub struct SimFilesystem {
    inner: Rc<RefCell<FilesystemInner>>,
}

impl SimFilesystem {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(FilesystemInner {
                mounted: true,
                mounts: 0,
                unmounts: 0,
            })),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.borrow().mounted
    }

    pub fn mounts(&self) -> u32 {
        self.inner.borrow().mounts
    }

    pub fn unmounts(&self) -> u32 {
        self.inner.borrow().unmounts
    }
}

impl Default for SimFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Filesystem for SimFilesystem {
    fn mount(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.borrow_mut();
        inner.mounted = true;
        inner.mounts += 1;
        Ok(())
    }

    fn unmount(&mut self) -> Result<(), PlatformError> {
        let mut inner = self.inner.borrow_mut();
        inner.mounted = false;
        inner.unmounts += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ClockInner {
    calls: u32,
    last: Option<(String, i32, i32)>,
    fail: bool,
}

/// Simulated network time source.
#[derive(Clone, Default)]
pub struct SimClock {
    inner: Rc<RefCell<ClockInner>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sync attempts fail (time server unreachable).
    pub fn set_fail(&self, fail: bool) {
        self.inner.borrow_mut().fail = fail;
    }

    pub fn calls(&self) -> u32 {
        self.inner.borrow().calls
    }

    pub fn last_sync(&self) -> Option<(String, i32, i32)> {
        self.inner.borrow().last.clone()
    }
}

impl TimeSync for SimClock {
    fn sync(
        &mut self,
        server: &str,
        utc_offset_secs: i32,
        dst_offset_secs: i32,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.borrow_mut();
        inner.calls += 1;
        if inner.fail {
            return Err(PlatformError::Driver("time server unreachable".to_string()));
        }
        inner.last = Some((server.to_string(), utc_offset_secs, dst_offset_secs));
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AdvertiserInner {
    services: Vec<(String, String, u16)>,
}

/// Simulated service-discovery responder.
#[derive(Clone, Default)]
pub struct SimAdvertiser {
    inner: Rc<RefCell<AdvertiserInner>>,
}

impl SimAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn services(&self) -> Vec<(String, String, u16)> {
        self.inner.borrow().services.clone()
    }
}

impl ServiceAdvertise for SimAdvertiser {
    fn advertise(&mut self, service: &str, proto: &str, port: u16) -> Result<(), PlatformError> {
        self.inner
            .borrow_mut()
            .services
            .push((service.to_string(), proto.to_string(), port));
        Ok(())
    }
}

/// The full simulated platform: one of each collaborator, pre-wired.
///
/// Keep the struct around for its handles and hand
/// [`SimPlatform::collaborators`] to the manager.
pub struct SimPlatform {
    pub link: SimLink,
    pub portal: SimPortal,
    pub transport: SimTransport,
    pub advertiser: SimAdvertiser,
    pub clock: SimClock,
    pub filesystem: SimFilesystem,
}

impl SimPlatform {
    pub fn new() -> Self {
        let link = SimLink::new();
        let portal = SimPortal::new(link.clone());
        Self {
            link,
            portal,
            transport: SimTransport::new(),
            advertiser: SimAdvertiser::new(),
            clock: SimClock::new(),
            filesystem: SimFilesystem::new(),
        }
    }

    /// Boxed clones of every collaborator, sharing state with this struct.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            link: Box::new(self.link.clone()),
            portal: Box::new(self.portal.clone()),
            transport: Box::new(self.transport.clone()),
            advertiser: Box::new(self.advertiser.clone()),
            clock: Box::new(self.clock.clone()),
            filesystem: Box::new(self.filesystem.clone()),
        }
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}
