use super::{jitter, plan_move, Keyboard, Mouse, DEFAULT_CLICK_HOLD, DEFAULT_KEY_HOLD, DEFAULT_MOVE_TIME};
use crate::command::MouseButton;
use crate::config::key::parse_key;
use anyhow::anyhow;
use evdev::{uinput::VirtualDevice, AttributeSet, EventType, InputEvent, KeyCode as Key, RelativeAxisCode};
use log::debug;
use parking_lot::Mutex;
use std::thread;
use std::time::Duration;

const PRESS: i32 = 1;
const RELEASE: i32 = 0;

/// Emits input through a uinput virtual device that has every key, the three
/// main mouse buttons and relative X/Y axes.
pub struct UinputOutput {
    device: Mutex<VirtualDevice>,
}

impl UinputOutput {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in Key::KEY_ESC.code()..Key::KEY_MICMUTE.code() {
            keys.insert(Key::new(code));
        }
        for button in [Key::BTN_LEFT, Key::BTN_RIGHT, Key::BTN_MIDDLE] {
            keys.insert(button);
        }

        let mut axes = AttributeSet::<RelativeAxisCode>::new();
        axes.insert(RelativeAxisCode::REL_X);
        axes.insert(RelativeAxisCode::REL_Y);

        let device = VirtualDevice::builder()?
            .name(name)
            .with_keys(&keys)?
            .with_relative_axes(&axes)?
            .build()?;

        Ok(UinputOutput {
            device: Mutex::new(device),
        })
    }

    fn send_key(&self, key: Key, value: i32) -> std::io::Result<()> {
        debug!("{}: {:?}", value, key);
        let ev = InputEvent::new(EventType::KEY.0, key.code(), value);
        self.device.lock().emit(&[ev])
    }

    fn send_relative(&self, dx: i32, dy: i32) -> std::io::Result<()> {
        let batch = [
            InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_X.0, dx),
            InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_Y.0, dy),
        ];
        self.device.lock().emit(&batch)
    }

    // The device lock is only held per event, so other actions can interleave with the holds.
    fn press_release_key(&self, key: Key, hold: Duration, gap: Duration, repeats: u32) -> anyhow::Result<()> {
        for _ in 0..repeats.max(1) {
            self.send_key(key, PRESS)?;
            thread::sleep(hold);
            self.send_key(key, RELEASE)?;
            thread::sleep(gap);
        }
        Ok(())
    }
}

impl Keyboard for UinputOutput {
    fn press_release(&self, key: &str, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()> {
        let code = parse_key(key).map_err(|e| anyhow!(e))?;
        let duration = duration.unwrap_or(DEFAULT_KEY_HOLD);
        self.press_release_key(code, duration / 2, duration / 2, repeats)
    }
}

impl Mouse for UinputOutput {
    fn press_release(&self, button: MouseButton, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()> {
        let code = match button {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Middle => Key::BTN_MIDDLE,
            MouseButton::Right => Key::BTN_RIGHT,
        };
        let hold = duration.unwrap_or(DEFAULT_CLICK_HOLD);
        self.press_release_key(code, hold, Duration::ZERO, repeats)
    }

    fn move_by(&self, dx: i32, dy: i32, duration: Option<Duration>) -> anyhow::Result<()> {
        let (dx, dy) = (jitter(dx), jitter(dy));
        let plan = plan_move(dx, dy, duration.unwrap_or(DEFAULT_MOVE_TIME));
        debug!(
            "Move mouse by x={dx}, y={dy} ({} steps {:?} apart)",
            plan.steps.len(),
            plan.interval
        );
        for (x, y) in plan.steps {
            self.send_relative(x, y)?;
            thread::sleep(plan.interval);
        }
        Ok(())
    }
}
