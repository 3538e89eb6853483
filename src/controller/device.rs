//! # Device Discovery Module
//!
//! Finds controllers among `/dev/input/event*` nodes and streams their
//! reports into the processing queue.
//!
//! ## Lifecycle
//!
//! 1. The scanner lists event nodes every `scan_interval`.
//! 2. Each new node is probed: its capabilities are read and a
//!    [`ControlProfile`] resolved. Nodes with nothing recognizable yet are
//!    probed again up to `configure_retries` times, `retry_interval` apart.
//! 3. A configured node gets a reader task that sends
//!    [`BridgeEvent::Connected`], then one [`BridgeEvent::Input`] per report.
//! 4. A read error means the device is gone: [`BridgeEvent::Disconnected`].
//!
//! Keyboards, pointers and the crate's own virtual keyboard are skipped
//! without probing. A node that never configures stays known (inert) until
//! it disappears from `/dev/input`.

use evdev::{Device, EventType, InputEvent, Key};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::adapter::RawInput;
use super::axis::AxisRange;
use super::input::ControllerId;
use super::profile::{Capabilities, ControlProfile};
use crate::bridge::BridgeEvent;

/// Default number of re-probes before a node is left inert.
pub const DEFAULT_CONFIGURE_RETRIES: u32 = 15;

/// Default pause between probes.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Default pause between two scans of `/dev/input`.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Scanner timing and filtering.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub scan_interval: Duration,
    pub configure_retries: u32,
    pub retry_interval: Duration,
    /// Name of the virtual keyboard, never treated as a controller.
    pub own_device_name: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            configure_retries: DEFAULT_CONFIGURE_RETRIES,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            own_device_name: crate::keys::sink::DEFAULT_DEVICE_NAME.to_string(),
        }
    }
}

/// Reads the key and absolute-axis capabilities of an open device.
pub fn capabilities(device: &Device) -> Capabilities {
    let mut caps = Capabilities::default();
    if let Some(keys) = device.supported_keys() {
        caps.keys.extend(keys.iter().map(|key| key.code()));
    }
    if let Some(axes) = device.supported_absolute_axes() {
        match device.get_abs_state() {
            Ok(state) => {
                for axis in axes.iter() {
                    if let Some(info) = state.get(usize::from(axis.0)) {
                        caps.axes
                            .insert(axis.0, AxisRange::new(info.minimum, info.maximum));
                    }
                }
            }
            Err(e) => debug!("Could not read axis ranges: {}", e),
        }
    }
    caps
}

/// Whether a node should be probed at all.
///
/// Keyboards and pointers never turn into controllers, so they are not
/// worth the retry schedule.
#[must_use]
pub fn is_candidate(name: &str, caps: &Capabilities, own_device_name: &str) -> bool {
    if name == own_device_name {
        return false;
    }
    let gamepad_like = caps.has_key(Key::BTN_SOUTH)
        || caps.has_key(Key::BTN_TRIGGER)
        || caps.has_key(Key::BTN_DPAD_UP);
    if gamepad_like {
        return true;
    }
    let keyboard = [Key::KEY_A, Key::KEY_Z, Key::KEY_SPACE, Key::KEY_ENTER]
        .iter()
        .all(|key| caps.has_key(*key));
    let pointer = caps.has_key(Key::BTN_LEFT)
        || caps.has_key(Key::BTN_TOUCH)
        || caps.has_key(Key::BTN_TOOL_FINGER);
    !keyboard && !pointer
}

/// Converts one evdev event into a raw report.
///
/// Key auto-repeat (value 2) and everything that is neither a key nor an
/// absolute axis are dropped.
#[must_use]
pub fn raw_input(event: &InputEvent) -> Option<RawInput> {
    match event.event_type() {
        EventType::KEY => match event.value() {
            0 => Some(RawInput::Button {
                code: event.code(),
                pressed: false,
            }),
            1 => Some(RawInput::Button {
                code: event.code(),
                pressed: true,
            }),
            _ => None,
        },
        EventType::ABSOLUTE => Some(RawInput::Axis {
            code: event.code(),
            value: event.value(),
        }),
        _ => None,
    }
}

/// Probes until a profile resolves or the retries run out.
///
/// `probe` returns the capabilities currently visible, or `None` when the
/// node cannot be read. One initial attempt plus `retries` re-probes.
pub async fn configure_with_retry<F>(
    mut probe: F,
    retries: u32,
    interval: Duration,
) -> Option<ControlProfile>
where
    F: FnMut() -> Option<Capabilities>,
{
    for attempt in 0..=retries {
        if let Some(profile) = probe().and_then(|caps| ControlProfile::resolve(&caps)) {
            if attempt > 0 {
                debug!("Configured after {} retries", attempt);
            }
            return Some(profile);
        }
        if attempt < retries {
            sleep(interval).await;
        }
    }
    None
}

/// Watches `/dev/input` and runs one reader task per controller.
#[derive(Debug)]
pub struct DeviceManager {
    settings: ScanSettings,
    tx: mpsc::Sender<BridgeEvent>,
    /// Nodes that are probing, connected, or left inert.
    known: Arc<Mutex<HashSet<PathBuf>>>,
    next_id: Arc<AtomicU64>,
}

impl DeviceManager {
    #[must_use]
    pub fn new(settings: ScanSettings, tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self {
            settings,
            tx,
            known: Arc::new(Mutex::new(HashSet::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Scans until the processing queue closes.
    pub async fn run(self) {
        info!(
            "Scanning for controllers every {:?}",
            self.settings.scan_interval
        );
        while !self.tx.is_closed() {
            self.scan();
            sleep(self.settings.scan_interval).await;
        }
        debug!("Processing queue closed; scanner stopped");
    }

    /// One pass over the event nodes.
    pub fn scan(&self) {
        let present: Vec<(PathBuf, Device)> = evdev::enumerate().collect();
        let present_paths: HashSet<PathBuf> =
            present.iter().map(|(path, _)| path.clone()).collect();

        let mut new_nodes = Vec::new();
        if let Ok(mut known) = self.known.lock() {
            // Forget nodes that went away so a replug is probed again
            known.retain(|path| present_paths.contains(path));
            for (path, device) in present {
                if known.contains(&path) {
                    continue;
                }
                let name = device.name().unwrap_or_default().to_string();
                let caps = capabilities(&device);
                if !is_candidate(&name, &caps, &self.settings.own_device_name) {
                    continue;
                }
                known.insert(path.clone());
                new_nodes.push((path, name));
            }
        }

        for (path, name) in new_nodes {
            debug!("Probing '{}' at {}", name, path.display());
            tokio::spawn(probe_and_read(
                path,
                self.settings.clone(),
                self.tx.clone(),
                Arc::clone(&self.known),
                Arc::clone(&self.next_id),
            ));
        }
    }
}

async fn probe_and_read(
    path: PathBuf,
    settings: ScanSettings,
    tx: mpsc::Sender<BridgeEvent>,
    known: Arc<Mutex<HashSet<PathBuf>>>,
    next_id: Arc<AtomicU64>,
) {
    let probe_path = path.clone();
    let profile = configure_with_retry(
        move || Device::open(&probe_path).ok().map(|device| capabilities(&device)),
        settings.configure_retries,
        settings.retry_interval,
    )
    .await;
    let Some(profile) = profile else {
        info!(
            "No usable controls on {} after {} retries; ignoring it",
            path.display(),
            settings.configure_retries
        );
        return;
    };

    let id = ControllerId(next_id.fetch_add(1, Ordering::Relaxed));
    if let Err(e) = read_device(id, &path, profile, &tx).await {
        warn!("Controller {} at {}: {}", id, path.display(), e);
    }
    if let Ok(mut known) = known.lock() {
        known.remove(&path);
    }
}

async fn read_device(
    id: ControllerId,
    path: &Path,
    profile: ControlProfile,
    tx: &mpsc::Sender<BridgeEvent>,
) -> std::io::Result<()> {
    let device = Device::open(path)?;
    let name = device.name().unwrap_or("unnamed controller").to_string();
    let mut stream = device.into_event_stream()?;

    let connected = BridgeEvent::Connected {
        id,
        name,
        path: Some(path.to_path_buf()),
        profile,
    };
    if tx.send(connected).await.is_err() {
        return Ok(());
    }

    let result = loop {
        match stream.next_event().await {
            Ok(event) => {
                let Some(input) = raw_input(&event) else {
                    continue;
                };
                if tx.send(BridgeEvent::Input { id, input }).await.is_err() {
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };

    // Best effort: the queue may already be closed on shutdown
    let _ = tx.send(BridgeEvent::Disconnected { id }).await;
    result
}
