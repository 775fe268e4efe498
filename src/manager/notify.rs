//! Outward notification slots.
//!
//! Five independent channels fan out to the application: provisioning
//! activity, connectivity changes, and update begin/progress/end. Each
//! channel holds exactly one registrant; setting a callback replaces the
//! previous one, and unset channels are no-ops. Register before `setup` to
//! be guaranteed no events are missed.

type BoolSlot = Box<dyn FnMut(bool)>;
type UnitSlot = Box<dyn FnMut()>;
type ProgressSlot = Box<dyn FnMut(u32, u32)>;

/// Single-slot callback registry.
pub struct Notifications {
    on_provisioning_active: BoolSlot,
    on_connectivity: BoolSlot,
    on_update_begin: UnitSlot,
    on_update_progress: ProgressSlot,
    on_update_end: UnitSlot,
}

impl Notifications {
    pub fn new() -> Self {
        Self {
            on_provisioning_active: Box::new(|_| {}),
            on_connectivity: Box::new(|_| {}),
            on_update_begin: Box::new(|| {}),
            on_update_progress: Box::new(|_, _| {}),
            on_update_end: Box::new(|| {}),
        }
    }

    /// Called with `true` when the provisioning portal opens and `false`
    /// when it ends.
    pub fn set_activity_indicator(&mut self, f: impl FnMut(bool) + 'static) {
        self.on_provisioning_active = Box::new(f);
    }

    /// Called on every connectivity transition with the new state.
    pub fn set_on_connected(&mut self, f: impl FnMut(bool) + 'static) {
        self.on_connectivity = Box::new(f);
    }

    /// Called when an update transfer starts (filesystem already offline).
    pub fn set_update_begin(&mut self, f: impl FnMut() + 'static) {
        self.on_update_begin = Box::new(f);
    }

    /// Called with `(done, total)` while an update transfer runs.
    pub fn set_update_progress(&mut self, f: impl FnMut(u32, u32) + 'static) {
        self.on_update_progress = Box::new(f);
    }

    /// Called when an update transfer ends, normally or on error
    /// (filesystem already back online).
    pub fn set_update_end(&mut self, f: impl FnMut() + 'static) {
        self.on_update_end = Box::new(f);
    }

    pub(crate) fn provisioning_active(&mut self, active: bool) {
        (self.on_provisioning_active)(active);
    }

    pub(crate) fn connectivity(&mut self, connected: bool) {
        (self.on_connectivity)(connected);
    }

    pub(crate) fn update_begin(&mut self) {
        (self.on_update_begin)();
    }

    pub(crate) fn update_progress(&mut self, done: u32, total: u32) {
        (self.on_update_progress)(done, total);
    }

    pub(crate) fn update_end(&mut self) {
        (self.on_update_end)();
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}
