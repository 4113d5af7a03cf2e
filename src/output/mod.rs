pub mod uinput;

pub use uinput::UinputOutput;

use crate::command::MouseButton;
use log::info;
use std::thread;
use std::time::Duration;

pub const DEFAULT_KEY_HOLD: Duration = Duration::from_millis(100);
pub const DEFAULT_CLICK_HOLD: Duration = Duration::from_millis(10);
pub const DEFAULT_MOVE_TIME: Duration = Duration::from_millis(500);

/// Emits key presses. Implementations block for the whole press/release sequence.
pub trait Keyboard: Send + Sync {
    fn press_release(&self, key: &str, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()>;
}

/// Emits mouse clicks and relative movement. Implementations block until done.
pub trait Mouse: Send + Sync {
    fn press_release(&self, button: MouseButton, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()>;
    fn move_by(&self, dx: i32, dy: i32, duration: Option<Duration>) -> anyhow::Result<()>;
}

/// A relative move split into small steps spread over its duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub steps: Vec<(i32, i32)>,
    pub interval: Duration,
}

const MAX_MOVE_STEPS: u32 = 1000;

/// Splits `(dx, dy)` into steps of about ten units, at most `MAX_MOVE_STEPS` of them.
/// The steps add up to exactly `(dx, dy)`.
pub fn plan_move(dx: i32, dy: i32, duration: Duration) -> MovePlan {
    let longest = dx.unsigned_abs().max(dy.unsigned_abs());
    let count = longest.div_ceil(10).clamp(1, MAX_MOVE_STEPS) as i64;
    let (dx, dy) = (dx as i64, dy as i64);
    let steps = (1..=count)
        .map(|i| {
            let x = dx * i / count - dx * (i - 1) / count;
            let y = dy * i / count - dy * (i - 1) / count;
            (x as i32, y as i32)
        })
        .collect();
    MovePlan {
        steps,
        interval: duration / count as u32,
    }
}

/// Picks a distance uniformly within half of `value` either side of it.
pub fn jitter(value: i32) -> i32 {
    if value == 0 {
        return 0;
    }
    let value = value as i64;
    let spread = value.abs() / 2;
    let low = (value - spread).max(i32::MIN as i64);
    let high = (value + spread).min(i32::MAX as i64);
    fastrand::i64(low..=high) as i32
}

/// Logs what would be emitted, keeping the same pacing as a real device.
#[derive(Debug, Default)]
pub struct LogOutput;

impl Keyboard for LogOutput {
    fn press_release(&self, key: &str, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()> {
        let duration = duration.unwrap_or(DEFAULT_KEY_HOLD);
        for _ in 0..repeats.max(1) {
            info!("Press keyboard {key} then wait {:.2}s", duration.as_secs_f64());
            thread::sleep(duration);
        }
        Ok(())
    }
}

impl Mouse for LogOutput {
    fn press_release(&self, button: MouseButton, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()> {
        let duration = duration.unwrap_or(DEFAULT_CLICK_HOLD);
        for _ in 0..repeats.max(1) {
            info!("Press mouse {button} for {:.2}s", duration.as_secs_f64());
            thread::sleep(duration);
        }
        Ok(())
    }

    fn move_by(&self, dx: i32, dy: i32, duration: Option<Duration>) -> anyhow::Result<()> {
        let duration = duration.unwrap_or(DEFAULT_MOVE_TIME);
        info!("Move mouse by x={dx}, y={dy} in {:.2}s", duration.as_secs_f64());
        thread::sleep(duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(plan: &MovePlan) -> (i32, i32) {
        plan.steps.iter().fold((0, 0), |(x, y), (dx, dy)| (x + dx, y + dy))
    }

    #[test]
    fn test_plan_move_adds_up() {
        let plan = plan_move(205, -33, Duration::from_millis(420));
        assert_eq!(plan.steps.len(), 21);
        assert_eq!(total(&plan), (205, -33));
        assert_eq!(plan.interval, Duration::from_millis(20));
        assert!(plan.steps.iter().all(|(x, _)| (9..=10).contains(x)));
    }

    #[test]
    fn test_plan_move_small_and_zero() {
        let plan = plan_move(3, 0, Duration::from_millis(100));
        assert_eq!(plan.steps, vec![(3, 0)]);
        assert_eq!(plan.interval, Duration::from_millis(100));

        let plan = plan_move(0, 0, Duration::from_millis(100));
        assert_eq!(plan.steps, vec![(0, 0)]);
    }

    #[test]
    fn test_jitter_stays_near() {
        for _ in 0..100 {
            let x = jitter(200);
            assert!((100..=300).contains(&x));
            let y = jitter(-40);
            assert!((-60..=-20).contains(&y));
        }
        assert_eq!(jitter(0), 0);
    }

    #[test]
    fn test_jitter_extremes_stay_in_range() {
        for _ in 0..100 {
            assert!(jitter(2_000_000_000) >= 1_000_000_000);
            assert!(jitter(i32::MAX) >= i32::MAX / 2);
            assert!(jitter(i32::MIN) <= i32::MIN / 2);
        }
    }

    #[test]
    fn test_plan_move_huge_distance_is_bounded() {
        let plan = plan_move(i32::MAX, i32::MIN, Duration::from_secs(1));
        assert_eq!(plan.steps.len(), MAX_MOVE_STEPS as usize);
        assert_eq!(total(&plan), (i32::MAX, i32::MIN));
        assert_eq!(plan.interval, Duration::from_millis(1));
    }
}
