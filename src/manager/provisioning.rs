//! Captive-portal session control.
//!
//! One session at a time, in one of two control-flow shapes fixed before
//! setup: blocking (the portal runs to completion inside `start`) or
//! modeless (`start` returns immediately and `pump` services the portal once
//! per tick). A credential save ends the session; the manager reacts by
//! re-checking connectivity right away instead of waiting for the next poll.

use log::{debug, info, warn};

use super::notify::Notifications;
use crate::config::PortalConfig;
use crate::platform::{PortalEvent, PortalOutcome, ProvisioningPortal};

/// What a start request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session was already active; nothing changed.
    AlreadyActive,
    /// A modeless session opened; service it with `pump` every tick.
    Opened,
    /// A blocking session ran to completion with saved credentials.
    Saved,
    /// A blocking session ran to completion without a save.
    TimedOut,
}

/// Event surfaced from a modeless pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user saved credentials; the session is over.
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
}

/// Owns the portal collaborator and the session state machine.
pub struct ProvisioningSession {
    portal: Box<dyn ProvisioningPortal>,
    state: State,
}

impl ProvisioningSession {
    pub fn new(portal: Box<dyn ProvisioningPortal>) -> Self {
        Self {
            portal,
            state: State::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == State::Active
    }

    /// Open the portal. Only one session may run at a time; a start while a
    /// session is active is a no-op.
    pub fn start(&mut self, config: &PortalConfig, notify: &mut Notifications) -> StartOutcome {
        if self.state == State::Active {
            warn!("provisioning session already active, ignoring start request");
            return StartOutcome::AlreadyActive;
        }
        notify.provisioning_active(true);
        self.launch(config, notify)
    }

    /// Re-enter provisioning regardless of the current state, superseding
    /// any active session.
    pub fn force_start(
        &mut self,
        config: &PortalConfig,
        notify: &mut Notifications,
    ) -> StartOutcome {
        if self.state == State::Active {
            info!("superseding active provisioning session");
            // The activity indicator is already lit; just restart the portal.
            self.state = State::Idle;
        } else {
            notify.provisioning_active(true);
        }
        self.launch(config, notify)
    }

    fn launch(&mut self, config: &PortalConfig, notify: &mut Notifications) -> StartOutcome {
        let name = config.name();
        if config.modeless {
            info!("starting provisioning portal \"{}\" (modeless)", name);
            self.portal.start_modeless(name, config.password());
            self.state = State::Active;
            StartOutcome::Opened
        } else {
            info!("starting provisioning portal \"{}\" (blocking)", name);
            self.state = State::Active;
            let outcome = self.portal.start_blocking(name, config.password());
            self.state = State::Idle;
            notify.provisioning_active(false);
            match outcome {
                PortalOutcome::Saved => StartOutcome::Saved,
                PortalOutcome::TimedOut => {
                    info!("provisioning portal timed out without a save");
                    StartOutcome::TimedOut
                }
            }
        }
    }

    /// Service a modeless session; called once per tick. Returns the save
    /// event when the user finished, so the caller can re-check
    /// connectivity immediately.
    pub fn pump(&mut self, notify: &mut Notifications) -> Option<SessionEvent> {
        if self.state != State::Active {
            return None;
        }
        match self.portal.pump()? {
            PortalEvent::Activated => {
                debug!("provisioning portal activated");
                None
            }
            PortalEvent::CredentialsSaved => {
                info!("provisioning credentials saved");
                self.state = State::Idle;
                notify.provisioning_active(false);
                Some(SessionEvent::Saved)
            }
        }
    }
}
