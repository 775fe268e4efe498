//! Connection lifecycle orchestration.
//!
//! [`ConnectionManager`] is the single owning object for a device's
//! connectivity state: it brings the link up, falls back to the provisioning
//! portal, edge-detects connect/disconnect transitions from the polled link
//! signal, and keeps the update transport and filesystem coordinated. The
//! application creates exactly one instance, registers its callbacks, calls
//! [`ConnectionManager::setup`] once, and then drives everything by calling
//! [`ConnectionManager::tick`] from its scheduler loop.
//!
//! # Components
//!
//! - [`poller`] - edge detection over the polled connectivity signal
//! - [`provisioning`] - captive-portal session control
//! - [`update`] - update window coordination and filesystem gating
//! - [`notify`] - outward notification slots
//!
//! All transitions happen synchronously inside the calling thread: within a
//! single tick at most one connectivity edge is emitted and it is fully
//! processed, callbacks included, before the tick returns. Re-entrancy from
//! a callback into the manager is ruled out by the exclusive borrow.

mod notify;
mod poller;
mod provisioning;
mod update;

pub use notify::Notifications;
pub use poller::{Edge, EdgeDetector};
pub use provisioning::{ProvisioningSession, SessionEvent, StartOutcome};
pub use update::{UpdateLifecycle, UpdatingLock};

use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{ConfigError, PortalConfig, TimeConfig};
use crate::platform::{Collaborators, LinkControl};
use crate::status::ConnectionStatus;

/// Facade over the connection/provisioning/update state machine.
pub struct ConnectionManager {
    link: Box<dyn LinkControl>,
    session: ProvisioningSession,
    updates: UpdateLifecycle,
    detector: EdgeDetector,
    notify: Notifications,
    /// Resolved at setup; doubles as the set-up flag.
    portal_config: Option<PortalConfig>,
    time_config: TimeConfig,
    /// Portal mode staged before setup.
    modeless: bool,
}

impl ConnectionManager {
    /// Build a manager over the given collaborators. Nothing is touched
    /// until [`ConnectionManager::setup`].
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            link: collaborators.link,
            session: ProvisioningSession::new(collaborators.portal),
            updates: UpdateLifecycle::new(
                collaborators.transport,
                collaborators.advertiser,
                collaborators.clock,
                collaborators.filesystem,
            ),
            detector: EdgeDetector::new(false),
            notify: Notifications::new(),
            portal_config: None,
            time_config: TimeConfig::default(),
            modeless: false,
        }
    }

    /// Called with `true` when the provisioning portal opens and `false`
    /// when it ends. Register before `setup` to catch the first session.
    pub fn set_activity_indicator(&mut self, f: impl FnMut(bool) + 'static) {
        self.notify.set_activity_indicator(f);
    }

    /// Called on every connectivity transition with the new state.
    pub fn set_on_connected(&mut self, f: impl FnMut(bool) + 'static) {
        self.notify.set_on_connected(f);
    }

    /// Called when an update transfer starts (filesystem already offline).
    pub fn set_update_begin(&mut self, f: impl FnMut() + 'static) {
        self.notify.set_update_begin(f);
    }

    /// Called with `(done, total)` while an update transfer runs.
    pub fn set_update_progress(&mut self, f: impl FnMut(u32, u32) + 'static) {
        self.notify.set_update_progress(f);
    }

    /// Called when an update transfer ends, normally or on error.
    pub fn set_update_end(&mut self, f: impl FnMut() + 'static) {
        self.notify.set_update_end(f);
    }

    /// Choose the portal servicing mode. Must be called strictly before
    /// `setup`; afterwards the mode is fixed.
    pub fn enable_modeless(&mut self, modeless: bool) {
        if self.portal_config.is_some() {
            warn!("enable_modeless called after setup has no effect");
            return;
        }
        self.modeless = modeless;
    }

    /// Override the network time parameters used after a connect.
    pub fn set_time_config(&mut self, time: TimeConfig) {
        self.time_config = time;
    }

    /// Initialize all subsystems and perform the first connectivity check.
    ///
    /// The portal name defaults to the device identity when absent. The
    /// previous link state is cleared, the hostname set, and a connect with
    /// stored credentials attempted; when that fails the provisioning
    /// portal opens (blocking or modeless per the configured mode). A
    /// device that is already provisioned reports connected without
    /// waiting for the first tick.
    pub fn setup(
        &mut self,
        portal_name: Option<&str>,
        portal_password: Option<&str>,
    ) -> Result<(), ConfigError> {
        if self.portal_config.is_some() {
            warn!("setup called twice, ignoring");
            return Ok(());
        }

        let name = match portal_name {
            Some(name) => name.to_string(),
            None => self.link.device_id(),
        };
        let mut config = PortalConfig::new(name, portal_password)?;
        config.modeless = self.modeless;
        info!("starting connection manager, portal \"{}\"", config.name());

        self.clear_link_state();
        if let Err(e) = self.link.set_hostname(config.name()) {
            warn!("failed to set hostname: {}", e);
        }
        self.portal_config = Some(config);

        let connected = match self.link.connect() {
            Ok(()) => self.link.is_connected(),
            Err(e) => {
                info!("link connect failed: {}", e);
                false
            }
        };
        if !connected {
            self.provision(false);
        }
        self.check_connectivity();
        Ok(())
    }

    /// Advance the state machine by one scheduler pass: service a modeless
    /// portal, poll connectivity and react to at most one edge, then
    /// service the update transport while connected.
    pub fn tick(&mut self) {
        if self.portal_config.is_none() {
            return;
        }

        // A save may predate the poller's next sample; check immediately so
        // the resulting edge is not delayed a tick.
        let synthesized = match self.session.pump(&mut self.notify) {
            Some(SessionEvent::Saved) => self.check_connectivity(),
            None => Edge::None,
        };
        if synthesized == Edge::None {
            self.check_connectivity();
        }

        self.updates.service(self.detector.last(), &mut self.notify);
    }

    /// Force re-entry into provisioning, superseding any active session.
    pub fn config(&mut self) {
        if self.portal_config.is_none() {
            error!("call setup before requesting provisioning");
            return;
        }
        self.provision(true);
    }

    /// Whether a firmware/filesystem update is being received right now.
    /// While true, the filesystem is unavailable.
    pub fn is_updating(&self) -> bool {
        self.updates.is_updating()
    }

    /// Snapshot of the live link. Not cached; every call re-reads the
    /// collaborator.
    pub fn current_status(&self) -> ConnectionStatus {
        if !self.link.is_connected() {
            return ConnectionStatus::disconnected();
        }
        ConnectionStatus {
            connected: true,
            ssid: self.link.ssid(),
            local_addr: self.link.local_addr(),
            signal_strength: self.link.signal_strength(),
            channel: self.link.channel(),
        }
    }

    /// Log the current link state.
    pub fn log_status(&self) {
        info!("{}", self.current_status());
    }

    /// Cooperative bounded wait for the link to come up.
    ///
    /// Samples the link, yielding for `poll_interval` between samples, and
    /// returns the elapsed time once connected or once `timeout` has
    /// passed. Does not call [`ConnectionManager::tick`]; with a modeless
    /// portal the caller must keep servicing the manager concurrently.
    pub fn wait_for_connection(&self, timeout: Duration, poll_interval: Duration) -> Duration {
        let started = Instant::now();
        loop {
            if self.link.is_connected() {
                break;
            }
            if started.elapsed() >= timeout {
                break;
            }
            std::thread::sleep(poll_interval);
        }
        started.elapsed()
    }

    /// Drop any previous association so setup starts from a known state.
    fn clear_link_state(&mut self) {
        if self.link.is_connected() {
            self.notify.connectivity(false);
        }
        if let Err(e) = self.link.disconnect() {
            debug!("link disconnect during setup failed: {}", e);
        }
        self.detector = EdgeDetector::new(self.link.is_connected());
    }

    fn provision(&mut self, force: bool) {
        let Some(config) = self.portal_config.as_ref() else {
            error!("call setup before requesting provisioning");
            return;
        };
        let outcome = if force {
            self.session.force_start(config, &mut self.notify)
        } else {
            self.session.start(config, &mut self.notify)
        };
        if outcome == StartOutcome::Saved {
            // Blocking portal finished with fresh credentials; the link
            // change may predate the poller's next sample.
            self.check_connectivity();
        }
    }

    /// Sample the link and process at most one edge. Returns what was
    /// observed.
    fn check_connectivity(&mut self) -> Edge {
        let Some(config) = self.portal_config.as_ref() else {
            return Edge::None;
        };
        let edge = self.detector.observe(self.link.is_connected());
        match edge {
            Edge::Up => {
                info!("link up");
                self.updates.on_link_up(config, &self.time_config);
                self.notify.connectivity(true);
            }
            Edge::Down => {
                info!("link down");
                self.updates.on_link_down();
                self.notify.connectivity(false);
            }
            Edge::None => {}
        }
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::SimPlatform;
    use crate::platform::{UpdateErrorKind, UpdateEvent, UpdateKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn manager(sim: &SimPlatform) -> ConnectionManager {
        ConnectionManager::new(sim.collaborators())
    }

    #[derive(Default)]
    struct Recorded {
        activity: Vec<bool>,
        connectivity: Vec<bool>,
        begins: u32,
        progress: Vec<(u32, u32)>,
        ends: u32,
    }

    fn record_all(mgr: &mut ConnectionManager) -> Rc<RefCell<Recorded>> {
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let sink = recorded.clone();
        mgr.set_activity_indicator(move |active| sink.borrow_mut().activity.push(active));
        let sink = recorded.clone();
        mgr.set_on_connected(move |connected| sink.borrow_mut().connectivity.push(connected));
        let sink = recorded.clone();
        mgr.set_update_begin(move || sink.borrow_mut().begins += 1);
        let sink = recorded.clone();
        mgr.set_update_progress(move |done, total| sink.borrow_mut().progress.push((done, total)));
        let sink = recorded.clone();
        mgr.set_update_end(move || sink.borrow_mut().ends += 1);
        recorded
    }

    // ==================== Setup Scenarios ====================

    #[test]
    fn test_fresh_device_blocking_provisioning() {
        // No stored credentials: setup enters the blocking portal, the user
        // saves "home", and the device reports connected right away.
        let sim = SimPlatform::new();
        sim.portal.script_save("home");
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);

        mgr.setup(None, None).unwrap();
        mgr.tick();

        let status = mgr.current_status();
        assert!(status.connected);
        assert_eq!(status.ssid, "home");
        assert_eq!(recorded.borrow().activity, vec![true, false]);
        assert_eq!(recorded.borrow().connectivity, vec![true]);
        assert!(sim.transport.is_running());
    }

    #[test]
    fn test_fresh_device_portal_timeout_stays_down() {
        let sim = SimPlatform::new();
        sim.portal.script_timeout();
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);

        mgr.setup(None, None).unwrap();

        assert!(!mgr.current_status().connected);
        assert_eq!(recorded.borrow().activity, vec![true, false]);
        assert!(recorded.borrow().connectivity.is_empty());
    }

    #[test]
    fn test_provisioned_device_connects_without_portal() {
        // Stored credentials work: no portal session, connected before the
        // first tick.
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);

        mgr.setup(Some("my-portal"), None).unwrap();

        assert!(mgr.current_status().connected);
        assert_eq!(sim.portal.starts(), 0);
        assert_eq!(recorded.borrow().connectivity, vec![true]);
        assert_eq!(sim.link.hostname(), "my-portal");
    }

    #[test]
    fn test_portal_name_defaults_to_device_id() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();
        assert_eq!(sim.link.hostname(), "esp32-5A7F");
    }

    #[test]
    fn test_setup_rejects_invalid_portal_password() {
        let sim = SimPlatform::new();
        let mut mgr = manager(&sim);
        assert!(matches!(
            mgr.setup(Some("portal"), Some("short")),
            Err(ConfigError::PasswordTooShort { .. })
        ));
    }

    #[test]
    fn test_connect_edge_wires_transport_identity() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        mgr.setup(Some("my-portal"), Some("portalpass")).unwrap();

        assert_eq!(
            sim.transport.identity(),
            Some(("my-portal".to_string(), Some("portalpass".to_string())))
        );
        assert_eq!(
            sim.advertiser.services(),
            vec![("_http".to_string(), "_tcp".to_string(), 80)]
        );
        assert_eq!(sim.clock.calls(), 1);
    }

    // ==================== Edge Detection ====================

    #[test]
    fn test_edges_fire_once_per_transition() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);
        mgr.setup(None, None).unwrap();

        // Stable link: no further events over several ticks.
        mgr.tick();
        mgr.tick();
        assert_eq!(recorded.borrow().connectivity, vec![true]);

        // Drop and restore.
        sim.link.set_connected(false);
        mgr.tick();
        mgr.tick();
        sim.link.set_connected(true);
        mgr.tick();
        assert_eq!(recorded.borrow().connectivity, vec![true, false, true]);
    }

    #[test]
    fn test_disconnect_stops_transport_once() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();
        assert!(sim.transport.is_running());

        sim.link.set_connected(false);
        mgr.tick();
        mgr.tick();
        mgr.tick();

        assert!(!sim.transport.is_running());
        assert_eq!(sim.transport.end_calls(), 1);
    }

    // ==================== Modeless Provisioning ====================

    #[test]
    fn test_save_triggers_edge_without_waiting_for_poll() {
        // Modeless portal: a save event produces exactly one Up edge on the
        // very tick that surfaces it.
        let sim = SimPlatform::new();
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);
        mgr.enable_modeless(true);
        mgr.setup(None, None).unwrap();

        assert!(!mgr.current_status().connected);
        assert_eq!(recorded.borrow().activity, vec![true]);

        mgr.tick(); // drains the Activated event, nothing else
        assert!(recorded.borrow().connectivity.is_empty());

        sim.portal.user_saves("home");
        mgr.tick();

        assert_eq!(recorded.borrow().activity, vec![true, false]);
        assert_eq!(recorded.borrow().connectivity, vec![true]);
        assert_eq!(mgr.current_status().ssid, "home");
        assert!(sim.transport.is_running());

        // The following poll must not re-emit the same edge.
        mgr.tick();
        assert_eq!(recorded.borrow().connectivity, vec![true]);
    }

    #[test]
    fn test_config_supersedes_active_modeless_session() {
        let sim = SimPlatform::new();
        let mut mgr = manager(&sim);
        mgr.enable_modeless(true);
        mgr.setup(None, None).unwrap();
        assert_eq!(sim.portal.starts(), 1);

        mgr.config();
        assert_eq!(sim.portal.starts(), 2);
    }

    #[test]
    fn test_config_before_setup_is_noop() {
        let sim = SimPlatform::new();
        let mut mgr = manager(&sim);
        mgr.config();
        assert_eq!(sim.portal.starts(), 0);
    }

    #[test]
    fn test_config_reenters_provisioning_while_connected() {
        // Manual re-provisioning works regardless of current connectivity.
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        sim.portal.script_timeout();
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();
        assert!(mgr.current_status().connected);

        mgr.config();
        assert_eq!(sim.portal.starts(), 1);
    }

    // ==================== Update Flow ====================

    #[test]
    fn test_update_round_trip() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);
        mgr.setup(None, None).unwrap();

        sim.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Firmware,
        });
        mgr.tick();
        assert!(mgr.is_updating());
        assert!(!sim.filesystem.is_mounted());

        sim.transport.push(UpdateEvent::Progress { done: 50, total: 100 });
        mgr.tick();
        assert!(mgr.is_updating());

        sim.transport.push(UpdateEvent::End);
        mgr.tick();
        assert!(!mgr.is_updating());
        assert!(sim.filesystem.is_mounted());

        let recorded = recorded.borrow();
        assert_eq!(recorded.begins, 1);
        assert_eq!(recorded.progress, vec![(50, 100)]);
        assert_eq!(recorded.ends, 1);
    }

    #[test]
    fn test_update_error_recovers_without_retry() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        let recorded = record_all(&mut mgr);
        mgr.setup(None, None).unwrap();
        let begins = sim.transport.begin_calls();

        sim.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Firmware,
        });
        sim.transport.push(UpdateEvent::Error(UpdateErrorKind::Connect));
        mgr.tick();

        assert!(!mgr.is_updating());
        assert!(sim.filesystem.is_mounted());
        assert_eq!(recorded.borrow().ends, 1);
        assert_eq!(sim.transport.begin_calls(), begins);
    }

    #[test]
    fn test_update_events_not_drained_while_disconnected() {
        let sim = SimPlatform::new();
        let mut mgr = manager(&sim);
        sim.portal.script_timeout();
        mgr.setup(None, None).unwrap();

        sim.transport.push(UpdateEvent::Begin {
            kind: UpdateKind::Firmware,
        });
        mgr.tick();
        assert!(!mgr.is_updating());
    }

    // ==================== Status & Waiting ====================

    #[test]
    fn test_status_invariant_when_disconnected() {
        let sim = SimPlatform::new();
        sim.portal.script_timeout();
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();

        let status = mgr.current_status();
        assert!(!status.connected);
        assert!(status.ssid.is_empty());
        assert_eq!(status.local_addr, None);
        assert_eq!(status.signal_strength, 0);
        assert_eq!(status.channel, 0);
    }

    #[test]
    fn test_status_reflects_live_link() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();

        let status = mgr.current_status();
        assert!(status.connected);
        assert_eq!(status.ssid, "home");
        assert!(status.local_addr.is_some());
        assert_ne!(status.signal_strength, 0);
        assert_ne!(status.channel, 0);

        // Not cached: a drop shows up on the next read.
        sim.link.set_connected(false);
        assert!(!mgr.current_status().connected);
    }

    #[test]
    fn test_wait_for_connection_times_out() {
        let sim = SimPlatform::new();
        let mgr = manager(&sim);

        let timeout = Duration::from_millis(40);
        let elapsed = mgr.wait_for_connection(timeout, Duration::from_millis(5));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_millis(500));
    }

    #[test]
    fn test_wait_for_connection_returns_early_when_up() {
        let sim = SimPlatform::new();
        sim.link.set_connected(true);
        let mgr = manager(&sim);

        let elapsed =
            mgr.wait_for_connection(Duration::from_millis(200), Duration::from_millis(5));
        assert!(elapsed < Duration::from_millis(100));
    }

    // ==================== Registration Contract ====================

    #[test]
    fn test_reregistering_replaces_previous_slot() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);

        let first = Rc::new(RefCell::new(0));
        let second = Rc::new(RefCell::new(0));
        let sink = first.clone();
        mgr.set_on_connected(move |_| *sink.borrow_mut() += 1);
        let sink = second.clone();
        mgr.set_on_connected(move |_| *sink.borrow_mut() += 1);

        mgr.setup(None, None).unwrap();
        assert_eq!(*first.borrow(), 0);
        assert_eq!(*second.borrow(), 1);
    }

    #[test]
    fn test_setup_twice_is_noop() {
        let sim = SimPlatform::new();
        sim.link.install_credentials("home");
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();
        let attempts = sim.link.connect_attempts();

        mgr.setup(None, None).unwrap();
        assert_eq!(sim.link.connect_attempts(), attempts);
    }

    #[test]
    fn test_enable_modeless_after_setup_has_no_effect() {
        let sim = SimPlatform::new();
        sim.portal.script_timeout();
        let mut mgr = manager(&sim);
        mgr.setup(None, None).unwrap();

        mgr.enable_modeless(true);
        // A forced re-entry still uses the blocking shape.
        sim.portal.script_timeout();
        mgr.config();
        assert_eq!(sim.portal.starts(), 2);
        assert!(!mgr.current_status().connected);
    }
}
