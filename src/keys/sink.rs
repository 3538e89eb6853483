//! Trait abstraction for host key injection to enable testing

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};
use std::collections::BTreeSet;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::chord::{Modifier, ModifierMask};

/// Key transition direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Down,
    Up,
}

/// Where an event is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Ordinary path: one key transition per event.
    Session,
    /// Hardware-level path: the flag modifiers travel with the key in a
    /// single report.
    Hardware,
}

/// One low-level key event handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u16,
    pub direction: Direction,
    pub flags: ModifierMask,
    pub route: Route,
}

impl KeyEvent {
    #[must_use]
    pub fn down(code: u16, flags: ModifierMask) -> Self {
        Self {
            code,
            direction: Direction::Down,
            flags,
            route: Route::Session,
        }
    }

    #[must_use]
    pub fn up(code: u16, flags: ModifierMask) -> Self {
        Self {
            code,
            direction: Direction::Up,
            flags,
            route: Route::Session,
        }
    }

    #[must_use]
    pub fn on_hardware_route(mut self) -> Self {
        self.route = Route::Hardware;
        self
    }
}

/// Errors from a key sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The host refuses key injection until the user grants permission.
    #[error("key injection not authorized")]
    Unauthorized,

    /// The host could not build or post this event.
    #[error("failed to post key event: {0}")]
    Construction(String),
}

/// Host key-injection capability.
pub trait KeySink: Send {
    /// Whether the host currently allows injection.
    fn is_authorized(&mut self) -> bool;

    /// Asks the host to (re-)prompt the user for permission.
    fn request_authorization(&mut self);

    /// Posts a single event.
    fn post(&mut self, event: KeyEvent) -> Result<(), SinkError>;
}

/// Default name of the virtual keyboard.
pub const DEFAULT_DEVICE_NAME: &str = "padkeys virtual keyboard";

/// Key injection through a uinput virtual keyboard.
///
/// The device is created on first use so that a missing permission on
/// `/dev/uinput` only shows up as "not authorized".
pub struct UinputSink {
    name: String,
    device: Option<VirtualDevice>,
    /// Codes this sink has pressed and not yet released.
    down: BTreeSet<u16>,
}

impl std::fmt::Debug for UinputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UinputSink")
            .field("name", &self.name)
            .field("created", &self.device.is_some())
            .finish_non_exhaustive()
    }
}

/// Key codes advertised by the virtual keyboard.
///
/// Only `KEY_*` codes: any `BTN_*` code makes udev classify the device as a
/// mouse or joystick.
#[must_use]
pub fn keyboard_keys() -> AttributeSet<Key> {
    let mut keys = AttributeSet::<Key>::new();
    for code in (1..0x100_u16).chain(0x160..0x2c0) {
        keys.insert(Key::new(code));
    }
    keys
}

impl UinputSink {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            device: None,
            down: BTreeSet::new(),
        }
    }

    fn ensure_device(&mut self) -> io::Result<&mut VirtualDevice> {
        if self.device.is_none() {
            let keys = keyboard_keys();
            let device = VirtualDeviceBuilder::new()?
                .name(&self.name)
                .with_keys(&keys)?
                .build()?;
            info!("Created virtual keyboard '{}'", self.name);
            self.device = Some(device);
        }
        self.device
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "virtual keyboard missing"))
    }

    /// Builds the batch for one event.
    ///
    /// Hardware-route events carry their flag modifiers inside the same
    /// report: pressed before the key on Down, released after it on Up.
    fn frame(&self, event: &KeyEvent) -> Vec<InputEvent> {
        let value = match event.direction {
            Direction::Down => 1,
            Direction::Up => 0,
        };
        let key = InputEvent::new(EventType::KEY, event.code, value);

        let mut carried = Vec::new();
        if event.route == Route::Hardware {
            for modifier in event.flags.iter() {
                if modifier == Modifier::Function {
                    continue;
                }
                let physically_down = self.down.contains(&modifier.left_code())
                    || self.down.contains(&modifier.right_code());
                if !physically_down {
                    carried.push(InputEvent::new(EventType::KEY, modifier.left_code(), value));
                }
            }
        }

        let mut frame = Vec::with_capacity(carried.len() + 2);
        match event.direction {
            Direction::Down => {
                frame.extend(carried);
                frame.push(key);
            }
            Direction::Up => {
                frame.push(key);
                frame.extend(carried.into_iter().rev());
            }
        }
        // SYN event is required for the kernel to process the batch
        frame.push(InputEvent::new(EventType::SYNCHRONIZATION, 0, 0));
        frame
    }
}

impl KeySink for UinputSink {
    fn is_authorized(&mut self) -> bool {
        match self.ensure_device() {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => false,
            Err(e) => {
                // Not a permission problem; let post() report it per event
                debug!("Virtual keyboard unavailable: {}", e);
                true
            }
        }
    }

    fn request_authorization(&mut self) {
        warn!(
            "No permission to create a uinput device. Add your user to the 'input' group \
             or install a udev rule such as: KERNEL==\"uinput\", MODE=\"0660\", GROUP=\"input\""
        );
    }

    fn post(&mut self, event: KeyEvent) -> Result<(), SinkError> {
        let frame = self.frame(&event);
        let device = self.ensure_device().map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => SinkError::Unauthorized,
            _ => SinkError::Construction(e.to_string()),
        })?;
        device
            .emit(&frame)
            .map_err(|e| SinkError::Construction(e.to_string()))?;

        match event.direction {
            Direction::Down => {
                self.down.insert(event.code);
            }
            Direction::Up => {
                self.down.remove(&event.code);
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sink_with_down(codes: &[u16]) -> UinputSink {
        let mut sink = UinputSink::new("test");
        sink.down.extend(codes.iter().copied());
        sink
    }

    fn codes(frame: &[InputEvent]) -> Vec<(u16, i32)> {
        frame
            .iter()
            .filter(|event| event.event_type() == EventType::KEY)
            .map(|event| (event.code(), event.value()))
            .collect()
    }

    #[test]
    fn test_session_frame_is_single_key() {
        let sink = sink_with_down(&[]);
        let flags = ModifierMask::EMPTY.with(Modifier::Shift);
        let frame = sink.frame(&KeyEvent::down(Key::KEY_TAB.code(), flags));

        assert_eq!(codes(&frame), vec![(Key::KEY_TAB.code(), 1)]);
        assert_eq!(frame.last().unwrap().event_type(), EventType::SYNCHRONIZATION);
    }

    #[test]
    fn test_hardware_frame_carries_modifiers() {
        let sink = sink_with_down(&[]);
        let flags = ModifierMask::EMPTY.with(Modifier::Shift);

        let down = sink.frame(&KeyEvent::down(Key::KEY_TAB.code(), flags).on_hardware_route());
        assert_eq!(
            codes(&down),
            vec![(Key::KEY_LEFTSHIFT.code(), 1), (Key::KEY_TAB.code(), 1)]
        );

        let up = sink.frame(&KeyEvent::up(Key::KEY_TAB.code(), flags).on_hardware_route());
        assert_eq!(
            codes(&up),
            vec![(Key::KEY_TAB.code(), 0), (Key::KEY_LEFTSHIFT.code(), 0)]
        );
    }

    #[test]
    fn test_hardware_frame_skips_physically_held_modifier() {
        let sink = sink_with_down(&[Key::KEY_RIGHTSHIFT.code()]);
        let flags = ModifierMask::EMPTY.with(Modifier::Shift);

        let down = sink.frame(&KeyEvent::down(Key::KEY_TAB.code(), flags).on_hardware_route());
        assert_eq!(codes(&down), vec![(Key::KEY_TAB.code(), 1)]);
    }

    #[test]
    fn test_keyboard_keys_exclude_buttons() {
        let keys = keyboard_keys();

        for button in [
            Key::BTN_LEFT,
            Key::new(0x110), // BTN_MOUSE
            Key::BTN_TRIGGER,
            Key::new(0x120), // BTN_JOYSTICK
            Key::new(0x130), // BTN_GAMEPAD
            Key::BTN_SOUTH,
            Key::BTN_TOUCH,
            Key::BTN_DPAD_UP,
            Key::BTN_TRIGGER_HAPPY1,
        ] {
            assert!(!keys.contains(button), "{:?} advertised", button);
        }
        assert!(keys.iter().all(|key| !(0x100..0x160).contains(&key.code())));
        assert!(keys.iter().all(|key| key.code() < 0x2c0));
    }

    #[test]
    fn test_keyboard_keys_cover_chord_keys() {
        let keys = keyboard_keys();
        for key in [
            Key::KEY_A,
            Key::KEY_TAB,
            Key::KEY_LEFTSHIFT,
            Key::KEY_RIGHTMETA,
            Key::KEY_HOME,
            Key::KEY_DELETE,
            Key::KEY_FN,
            Key::KEY_F24,
        ] {
            assert!(keys.contains(key), "{:?} missing", key);
        }
    }

    #[test]
    fn test_mock_sink_records_and_fails_on_demand() {
        let mut sink = mocks::RecordingSink::new();
        sink.fail_at(1);

        assert!(sink.post(KeyEvent::down(30, ModifierMask::EMPTY)).is_ok());
        assert!(sink.post(KeyEvent::up(30, ModifierMask::EMPTY)).is_err());
        assert!(sink.post(KeyEvent::up(30, ModifierMask::EMPTY)).is_ok());
        assert_eq!(sink.events().len(), 2);
    }

    // Integration test - only runs with /dev/uinput access
    #[test]
    #[ignore]
    fn test_uinput_with_real_device() {
        let mut sink = UinputSink::new("padkeys test keyboard");
        assert!(sink.is_authorized());
        sink.post(KeyEvent::down(Key::KEY_F24.code(), ModifierMask::EMPTY)).unwrap();
        sink.post(KeyEvent::up(Key::KEY_F24.code(), ModifierMask::EMPTY)).unwrap();
    }
}
