//! Host-side demonstration of the connection manager.
//!
//! Drives the full provisioning → connect → update → disconnect lifecycle
//! against the simulated platform, so the state machine can be watched on a
//! development machine without ESP32 hardware:
//!
//! ```sh
//! RUST_LOG=debug cargo run --bin host-demo
//! ```

use std::time::Duration;

use wifi_connector_rs_esp32::platform::sim::SimPlatform;
use wifi_connector_rs_esp32::{ConnectionManager, UpdateErrorKind, UpdateEvent, UpdateKind};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let sim = SimPlatform::new();
    // Pretend the user enters home-network credentials in the portal.
    sim.portal.script_save("home");

    let mut manager = ConnectionManager::new(sim.collaborators());
    manager.set_activity_indicator(|active| println!("[app] portal active: {}", active));
    manager.set_on_connected(|connected| println!("[app] connected: {}", connected));
    manager.set_update_begin(|| println!("[app] update started"));
    manager.set_update_progress(|done, total| println!("[app] update {}/{}", done, total));
    manager.set_update_end(|| println!("[app] update ended"));

    if let Err(e) = manager.setup(Some("demo-portal"), None) {
        eprintln!("setup failed: {}", e);
        return;
    }
    manager.log_status();

    // A successful firmware update round trip.
    sim.transport.push(UpdateEvent::Begin {
        kind: UpdateKind::Firmware,
    });
    sim.transport.push(UpdateEvent::Progress { done: 50, total: 100 });
    sim.transport.push(UpdateEvent::End);
    manager.tick();
    println!("[app] updating now: {}", manager.is_updating());

    // A failed update: the manager recovers to idle with the filesystem back.
    sim.transport.push(UpdateEvent::Begin {
        kind: UpdateKind::Filesystem,
    });
    sim.transport.push(UpdateEvent::Error(UpdateErrorKind::Receive));
    manager.tick();
    println!("[app] filesystem mounted: {}", sim.filesystem.is_mounted());

    // Losing the link stops the update transport.
    sim.link.set_connected(false);
    manager.tick();
    manager.log_status();

    let waited = manager.wait_for_connection(Duration::from_millis(50), Duration::from_millis(10));
    println!("[app] waited {:?} without a link", waited);
}
