use crate::config::key::{parse_key, Modifier};
use evdev::{Device, EventType, KeyCode as Key};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const PRESS: i32 = 1;
const RELEASE: i32 = 0;

/// Broadcaster's switch for chat-driven output. Starts on.
#[derive(Debug, Clone)]
pub struct OutputSwitch(Arc<AtomicBool>);

impl OutputSwitch {
    pub fn new() -> Self {
        OutputSwitch(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }

    /// Flips the switch and returns the new state.
    pub fn toggle(&self) -> bool {
        let on = !self.0.fetch_xor(true, Ordering::SeqCst);
        info!("Turned {}", if on { "ON" } else { "OFF" });
        on
    }
}

impl Default for OutputSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// A key with the modifiers that must be held, e.g. `shift+backspace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    pub modifiers: Vec<Modifier>,
    pub key: Key,
}

impl Chord {
    pub fn parse(input: &str) -> Result<Chord, String> {
        let mut names: Vec<&str> = input.split('+').map(str::trim).collect();
        let key_name = names.pop().filter(|name| !name.is_empty()).ok_or("empty key chord")?;
        let modifiers = names
            .into_iter()
            .map(|name| Modifier::from_name(name).ok_or_else(|| format!("unknown modifier {name:?}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Chord {
            modifiers,
            key: parse_key(key_name)?,
        })
    }
}

/// Tracks held keys of one device and reports when the chord is pressed.
#[derive(Debug)]
pub struct ChordState {
    chord: Chord,
    held: HashSet<Key>,
}

impl ChordState {
    pub fn new(chord: Chord) -> Self {
        ChordState {
            chord,
            held: HashSet::new(),
        }
    }

    pub fn on_key(&mut self, key: Key, value: i32) -> bool {
        match value {
            PRESS => {
                self.held.insert(key);
                key == self.chord.key
                    && self
                        .chord
                        .modifiers
                        .iter()
                        .all(|modifier| modifier.keys().iter().any(|k| self.held.contains(k)))
            }
            RELEASE => {
                self.held.remove(&key);
                false
            }
            // repeat
            _ => false,
        }
    }
}

/// Watches every local keyboard that has the chord's key and flips `switch` on each press.
///
/// Returns how many devices are being watched.
pub fn spawn_listener(chord: Chord, switch: OutputSwitch) -> anyhow::Result<usize> {
    let devices: Vec<(String, Device)> = evdev::enumerate()
        .filter(|(_, device)| device.supported_keys().is_some_and(|keys| keys.contains(chord.key)))
        .map(|(path, device)| (path.display().to_string(), device))
        .collect();
    anyhow::ensure!(!devices.is_empty(), "no keyboard found for the output toggle");

    let count = devices.len();
    for (path, mut device) in devices {
        let mut state = ChordState::new(chord.clone());
        let switch = switch.clone();
        thread::Builder::new().name(format!("toggle {path}")).spawn(move || loop {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) => {
                    warn!("Stopped watching {path} for the output toggle: {e}");
                    return;
                }
            };
            for event in events {
                if event.event_type() == EventType::KEY && state.on_key(Key::new(event.code()), event.value()) {
                    switch.toggle();
                }
            }
        })?;
    }
    Ok(count)
}
