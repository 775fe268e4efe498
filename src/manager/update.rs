//! Update window coordination.
//!
//! While an update is being received the filesystem must be offline: the
//! incoming image may replace it. [`UpdatingLock`] ties the `updating` flag
//! to the mount state so neither can be observed without the other, and
//! [`UpdateLifecycle`] keeps the transport's running state in step with
//! connectivity and drains its lifecycle events every tick.

use log::{debug, info, warn};

use super::notify::Notifications;
use crate::config::{PortalConfig, TimeConfig};
use crate::platform::{
    Filesystem, ServiceAdvertise, TimeSync, UpdateEvent, UpdateTransport,
};

/// Service advertised for update tooling discovery.
const UPDATE_SERVICE: &str = "_http";
const UPDATE_PROTO: &str = "_tcp";
const UPDATE_PORT: u16 = 80;

/// Ties the update-in-progress flag to filesystem availability.
///
/// The flag and the mount state change together inside one synchronous call,
/// so no tick can observe `updating == true` with the filesystem mounted or
/// the reverse. Acquire and release are idempotent.
pub struct UpdatingLock {
    updating: bool,
    filesystem: Box<dyn Filesystem>,
}

impl UpdatingLock {
    pub fn new(filesystem: Box<dyn Filesystem>) -> Self {
        Self {
            updating: false,
            filesystem,
        }
    }

    /// Take the filesystem offline and open the update window.
    pub fn acquire(&mut self) {
        if self.updating {
            return;
        }
        if let Err(e) = self.filesystem.unmount() {
            warn!("filesystem unmount failed: {}", e);
        }
        self.updating = true;
    }

    /// Close the update window and bring the filesystem back.
    pub fn release(&mut self) {
        if !self.updating {
            return;
        }
        self.updating = false;
        if let Err(e) = self.filesystem.mount() {
            warn!("filesystem remount failed: {}", e);
        }
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }
}

/// Keeps the update transport synchronized with connectivity and turns its
/// lifecycle events into lock transitions plus outward notifications.
pub struct UpdateLifecycle {
    transport: Box<dyn UpdateTransport>,
    advertiser: Box<dyn ServiceAdvertise>,
    clock: Box<dyn TimeSync>,
    lock: UpdatingLock,
    transport_running: bool,
}

impl UpdateLifecycle {
    pub fn new(
        transport: Box<dyn UpdateTransport>,
        advertiser: Box<dyn ServiceAdvertise>,
        clock: Box<dyn TimeSync>,
        filesystem: Box<dyn Filesystem>,
    ) -> Self {
        Self {
            transport,
            advertiser,
            clock,
            lock: UpdatingLock::new(filesystem),
            transport_running: false,
        }
    }

    /// The link came up: give the transport its identity, start it,
    /// advertise the update service, and sync the wall clock best-effort.
    pub fn on_link_up(&mut self, portal: &PortalConfig, time: &TimeConfig) {
        self.transport.configure(portal.name(), portal.password());
        match self.transport.begin() {
            Ok(()) => self.transport_running = true,
            Err(e) => warn!("update transport failed to start: {}", e),
        }
        if let Err(e) = self.advertiser.advertise(UPDATE_SERVICE, UPDATE_PROTO, UPDATE_PORT) {
            warn!("service advertisement failed: {}", e);
        }
        // Time sync is best-effort; an unreachable server must not block the
        // rest of the connection sequence.
        if let Err(e) = self
            .clock
            .sync(&time.server, time.utc_offset_secs, time.dst_offset_secs)
        {
            warn!("network time sync failed: {}", e);
        }
    }

    /// The link went down: stop the transport. Safe to call when it is not
    /// running.
    pub fn on_link_down(&mut self) {
        if !self.transport_running {
            return;
        }
        self.transport.end();
        self.transport_running = false;
    }

    /// Drain transport lifecycle events. Serviced only while connected.
    pub fn service(&mut self, connected: bool, notify: &mut Notifications) {
        if !connected {
            return;
        }
        while let Some(event) = self.transport.poll() {
            self.handle(event, notify);
        }
    }

    fn handle(&mut self, event: UpdateEvent, notify: &mut Notifications) {
        match event {
            UpdateEvent::Begin { kind } => {
                info!("update started ({})", kind);
                self.lock.acquire();
                notify.update_begin();
            }
            UpdateEvent::Progress { done, total } => {
                if total > 0 {
                    debug!("update progress: {}%", (done as u64) * 100 / (total as u64));
                }
                notify.update_progress(done, total);
            }
            UpdateEvent::End => {
                info!("update finished");
                self.lock.release();
                notify.update_end();
            }
            UpdateEvent::Error(kind) => {
                // The kind is diagnostics only; every failure takes the same
                // path back to idle with the filesystem mounted. No retry.
                warn!("update failed: {}", kind);
                self.lock.release();
                notify.update_end();
            }
        }
    }

    pub fn is_updating(&self) -> bool {
        self.lock.is_updating()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::{SimAdvertiser, SimClock, SimFilesystem, SimTransport};
    use crate::platform::{UpdateErrorKind, UpdateKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Fixture {
        lifecycle: UpdateLifecycle,
        transport: SimTransport,
        advertiser: SimAdvertiser,
        clock: SimClock,
        filesystem: SimFilesystem,
        notify: Notifications,
    }

    fn fixture() -> Fixture {
        let transport = SimTransport::new();
        let advertiser = SimAdvertiser::new();
        let clock = SimClock::new();
        let filesystem = SimFilesystem::new();
        let lifecycle = UpdateLifecycle::new(
            Box::new(transport.clone()),
            Box::new(advertiser.clone()),
            Box::new(clock.clone()),
            Box::new(filesystem.clone()),
        );
        Fixture {
            lifecycle,
            transport,
            advertiser,
            clock,
            filesystem,
            notify: Notifications::new(),
        }
    }

    fn portal() -> PortalConfig {
        PortalConfig::new("device", Some("portalpass")).unwrap()
    }

    #[test]
    fn test_link_up_starts_and_advertises() {
        let mut f = fixture();
        f.lifecycle.on_link_up(&portal(), &TimeConfig::default());

        assert!(f.transport.is_running());
        assert_eq!(
            f.transport.identity(),
            Some(("device".to_string(), Some("portalpass".to_string())))
        );
        assert_eq!(
            f.advertiser.services(),
            vec![("_http".to_string(), "_tcp".to_string(), 80)]
        );
        assert_eq!(
            f.clock.last_sync(),
            Some(("pool.ntp.org".to_string(), -8 * 3600, 3600))
        );
    }

    #[test]
    fn test_time_sync_failure_is_not_fatal() {
        let mut f = fixture();
        f.clock.set_fail(true);
        f.lifecycle.on_link_up(&portal(), &TimeConfig::default());
        // Transport still started despite the unreachable time server.
        assert!(f.transport.is_running());
    }

    #[test]
    fn test_link_down_is_idempotent() {
        let mut f = fixture();
        f.lifecycle.on_link_up(&portal(), &TimeConfig::default());
        f.lifecycle.on_link_down();
        f.lifecycle.on_link_down();
        assert_eq!(f.transport.end_calls(), 1);
        assert!(!f.transport.is_running());
    }

    #[test]
    fn test_link_down_before_up_does_nothing() {
        let mut f = fixture();
        f.lifecycle.on_link_down();
        assert_eq!(f.transport.end_calls(), 0);
    }

    #[test]
    fn test_mutual_exclusion_through_normal_update() {
        let mut f = fixture();
        f.lifecycle.on_link_up(&portal(), &TimeConfig::default());

        f.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Firmware,
        });
        f.lifecycle.service(true, &mut f.notify);
        assert!(f.lifecycle.is_updating());
        assert!(!f.filesystem.is_mounted());

        f.transport.push(UpdateEvent::Progress { done: 50, total: 100 });
        f.lifecycle.service(true, &mut f.notify);
        assert!(f.lifecycle.is_updating());
        assert!(!f.filesystem.is_mounted());

        f.transport.push(UpdateEvent::End);
        f.lifecycle.service(true, &mut f.notify);
        assert!(!f.lifecycle.is_updating());
        assert!(f.filesystem.is_mounted());
    }

    #[test]
    fn test_error_restores_filesystem_without_retry() {
        let mut f = fixture();
        f.lifecycle.on_link_up(&portal(), &TimeConfig::default());
        let begins = f.transport.begin_calls();

        f.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Filesystem,
        });
        f.transport.push(UpdateEvent::Error(UpdateErrorKind::Connect));
        f.lifecycle.service(true, &mut f.notify);

        assert!(!f.lifecycle.is_updating());
        assert!(f.filesystem.is_mounted());
        // No automatic retry: the transport was not restarted.
        assert_eq!(f.transport.begin_calls(), begins);
    }

    #[test]
    fn test_every_error_kind_takes_the_same_path() {
        for kind in [
            UpdateErrorKind::Auth,
            UpdateErrorKind::Begin,
            UpdateErrorKind::Connect,
            UpdateErrorKind::Receive,
            UpdateErrorKind::End,
        ] {
            let mut f = fixture();
            f.lifecycle.on_link_up(&portal(), &TimeConfig::default());
            f.transport.push(UpdateEvent::Begin {
                kind: UpdateKind::Firmware,
            });
            f.transport.push(UpdateEvent::Error(kind));
            f.lifecycle.service(true, &mut f.notify);
            assert!(!f.lifecycle.is_updating());
            assert!(f.filesystem.is_mounted());
        }
    }

    #[test]
    fn test_end_notification_fires_once_on_error() {
        let mut f = fixture();
        let ends = Rc::new(RefCell::new(0));
        let sink = ends.clone();
        f.notify.set_update_end(move || *sink.borrow_mut() += 1);

        f.lifecycle.on_link_up(&portal(), &TimeConfig::default());
        f.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Firmware,
        });
        f.transport.push(UpdateEvent::Error(UpdateErrorKind::Receive));
        f.lifecycle.service(true, &mut f.notify);

        assert_eq!(*ends.borrow(), 1);
    }

    #[test]
    fn test_not_serviced_while_disconnected() {
        let mut f = fixture();
        f.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Firmware,
        });
        f.lifecycle.service(false, &mut f.notify);
        assert!(!f.lifecycle.is_updating());
    }

    #[test]
    fn test_lock_acquire_release_idempotent() {
        let filesystem = SimFilesystem::new();
        let mut lock = UpdatingLock::new(Box::new(filesystem.clone()));
        lock.acquire();
        lock.acquire();
        assert_eq!(filesystem.unmounts(), 1);
        lock.release();
        lock.release();
        assert_eq!(filesystem.mounts(), 1);
        assert!(filesystem.is_mounted());
    }
}
