//! Synthetic keyboard output
//!
//! [`KeyEmitter`] resolves a [`Direction`] through the [`KeyMap`] and taps the key:
//! press immediately followed by release. Injection is fire-and-forget; a failure is
//! returned to the caller to report, never retried.

use super::{Direction, KeyMap, KeySymbol, MappingError};
use tracing::{debug, info};

/// OS-level key injection surface
pub trait KeyInjector: Send {
    fn press(&mut self, key: &KeySymbol) -> Result<(), MappingError>;

    fn release(&mut self, key: &KeySymbol) -> Result<(), MappingError>;
}

/// Sends the configured key for each direction
pub struct KeyEmitter {
    key_map: KeyMap,
    injector: Box<dyn KeyInjector>,
}

impl KeyEmitter {
    pub fn new(key_map: KeyMap, injector: Box<dyn KeyInjector>) -> Self {
        Self { key_map, injector }
    }

    pub fn key_map(&self) -> &KeyMap {
        &self.key_map
    }

    /// Presses and releases the key bound to `direction`
    pub fn emit(&mut self, direction: Direction) -> Result<(), MappingError> {
        let key = self.key_map.key(direction);
        info!("{} -> {}", direction, key);
        self.injector.press(key)?;
        self.injector.release(key)?;
        debug!("Tapped key code {}", key.code());
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use uinput::UinputInjector;

#[cfg(target_os = "linux")]
mod uinput {
    use super::{KeyInjector, KeySymbol, MappingError};
    use crate::mapping::KeyMap;
    use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
    use evdev::{AttributeSet, EventType, InputEvent, Key};
    use tracing::info;

    const DEVICE_NAME: &str = "dial2key virtual keyboard";

    /// Virtual keyboard registered through `/dev/uinput`
    pub struct UinputInjector {
        device: VirtualDevice,
    }

    impl UinputInjector {
        /// Creates a virtual keyboard able to send every key in `key_map`
        pub fn create(key_map: &KeyMap) -> Result<Self, MappingError> {
            let mut keys = AttributeSet::<Key>::new();
            for code in key_map.codes() {
                keys.insert(Key::new(code));
            }

            let device = VirtualDeviceBuilder::new()
                .map_err(init_error)?
                .name(DEVICE_NAME)
                .with_keys(&keys)
                .map_err(init_error)?
                .build()
                .map_err(init_error)?;

            info!("Created uinput device: {}", DEVICE_NAME);
            Ok(Self { device })
        }

        fn send(&mut self, key: &KeySymbol, value: i32) -> Result<(), MappingError> {
            let event = InputEvent::new(EventType::KEY, key.code(), value);
            self.device
                .emit(&[event])
                .map_err(|e| MappingError::Injection(format!("{} ({}): {}", key, value, e)))
        }
    }

    impl KeyInjector for UinputInjector {
        fn press(&mut self, key: &KeySymbol) -> Result<(), MappingError> {
            self.send(key, 1)
        }

        fn release(&mut self, key: &KeySymbol) -> Result<(), MappingError> {
            self.send(key, 0)
        }
    }

    fn init_error(e: std::io::Error) -> MappingError {
        MappingError::InitializationError(format!("uinput: {}", e))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording injector used by the mapping and controller tests

    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Stroke {
        Press(String),
        Release(String),
    }

    #[derive(Clone, Default)]
    pub struct RecordingInjector {
        pub strokes: Arc<Mutex<Vec<Stroke>>>,
        pub fail_press: bool,
    }

    impl RecordingInjector {
        pub fn strokes(&self) -> Vec<Stroke> {
            self.strokes.lock().unwrap().clone()
        }
    }

    impl KeyInjector for RecordingInjector {
        fn press(&mut self, key: &KeySymbol) -> Result<(), MappingError> {
            if self.fail_press {
                return Err(MappingError::Injection("denied".into()));
            }
            self.strokes
                .lock()
                .unwrap()
                .push(Stroke::Press(key.name().to_string()));
            Ok(())
        }

        fn release(&mut self, key: &KeySymbol) -> Result<(), MappingError> {
            self.strokes
                .lock()
                .unwrap()
                .push(Stroke::Release(key.name().to_string()));
            Ok(())
        }
    }
}
