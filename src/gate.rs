use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the uniform `[0, 100]` draw behind random chance gating.
pub trait Dice: Send + Sync {
    fn roll(&self) -> u8;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FastDice;

impl Dice for FastDice {
    fn roll(&self) -> u8 {
        fastrand::u8(0..=100)
    }
}

/// Why a command did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    AlreadyRunning,
    OnCooldown { remaining: Duration },
    FailedChance { chance: u8, roll: Option<u8> },
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::AlreadyRunning => write!(f, "is already running"),
            Refusal::OnCooldown { remaining } => {
                write!(f, "is on cooldown for another {:.1}s", remaining.as_secs_f64())
            }
            Refusal::FailedChance { chance, roll: Some(roll) } => {
                write!(f, "failed random chance of {chance}% (rolled {roll})")
            }
            Refusal::FailedChance { chance, roll: None } => write!(f, "has a random chance of {chance}%"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunState {
    /// Start of the last run that got past the gate.
    pub last_run: Option<Instant>,
    pub running: bool,
}

/// Cooldown and chance parameters plus the run state they are checked against.
#[derive(Debug, Default)]
pub struct Gate {
    cooldown: Option<Duration>,
    random_chance: Option<u8>,
    state: Arc<Mutex<RunState>>,
}

impl Gate {
    pub fn new(cooldown: Option<Duration>, random_chance: Option<u8>) -> Self {
        Gate {
            cooldown,
            random_chance,
            state: Arc::new(Mutex::new(RunState::default())),
        }
    }

    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    pub fn random_chance(&self) -> Option<u8> {
        self.random_chance
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn can_run(&self, dice: &dyn Dice) -> Result<(), Refusal> {
        self.can_run_at(Instant::now(), dice)
    }

    /// Decides eligibility without touching the run state.
    pub fn can_run_at(&self, now: Instant, dice: &dyn Dice) -> Result<(), Refusal> {
        let state = *self.state.lock();
        self.check(&state, now, dice)
    }

    pub fn try_acquire(&self, dice: &dyn Dice) -> Result<RunGuard, Refusal> {
        self.try_acquire_at(Instant::now(), dice)
    }

    /// Checks eligibility and claims the run in one critical section.
    ///
    /// On success the cooldown clock starts at `now` and the gate reports
    /// running until the returned guard is dropped.
    pub fn try_acquire_at(&self, now: Instant, dice: &dyn Dice) -> Result<RunGuard, Refusal> {
        let mut state = self.state.lock();
        self.check(&state, now, dice)?;
        state.running = true;
        state.last_run = Some(now);
        Ok(RunGuard {
            state: Arc::clone(&self.state),
        })
    }

    fn check(&self, state: &RunState, now: Instant, dice: &dyn Dice) -> Result<(), Refusal> {
        if state.running {
            return Err(Refusal::AlreadyRunning);
        }

        if let (Some(cooldown), Some(last_run)) = (self.cooldown, state.last_run) {
            let elapsed = now.saturating_duration_since(last_run);
            if elapsed < cooldown {
                return Err(Refusal::OnCooldown {
                    remaining: cooldown - elapsed,
                });
            }
        }

        match self.random_chance {
            None | Some(100..=u8::MAX) => Ok(()),
            Some(0) => Err(Refusal::FailedChance { chance: 0, roll: None }),
            Some(chance) => {
                let roll = dice.roll();
                if roll <= chance {
                    Ok(())
                } else {
                    Err(Refusal::FailedChance {
                        chance,
                        roll: Some(roll),
                    })
                }
            }
        }
    }
}

/// Proof of a claimed run. Dropping it, including during a panic, clears `running`.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<Mutex<RunState>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.lock().running = false;
    }
}
