use crate::config::Tags;
use crate::gate::Gate;
use log::warn;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lmb" | "left" => Ok(MouseButton::Left),
            "mmb" | "middle" => Ok(MouseButton::Middle),
            "rmb" | "right" => Ok(MouseButton::Right),
            other => Err(format!("unknown mouse button: {other:?}")),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        })
    }
}

/// What a simple command emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Key(String),
    MouseButton(MouseButton),
    MouseMove { dx: i32, dy: i32 },
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Key(key) => write!(f, "key {key}"),
            Output::MouseButton(button) => write!(f, "mouse {button}"),
            Output::MouseMove { dx, dy } => write!(f, "move {dx} {dy}"),
        }
    }
}

fn normalize_triggers(triggers: Vec<String>) -> Vec<String> {
    triggers
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn seconds(value: Option<f64>) -> Option<Duration> {
    value.map(Duration::from_secs_f64)
}

/// Returns the first trigger `message` starts with. `message` must already be normalized.
fn matched<'a>(triggers: &'a [String], message: &str) -> Option<&'a str> {
    triggers.iter().map(String::as_str).find(|t| message.starts_with(t))
}

/// One key press, mouse click or mouse move that chat can trigger.
#[derive(Debug)]
pub struct Command {
    triggers: Vec<String>,
    output: Output,
    duration: Option<Duration>,
    repeats: Option<u32>,
    privileged: bool,
    gate: Gate,
}

impl Command {
    pub fn new(triggers: Vec<String>, output: Output) -> Self {
        Command {
            triggers: normalize_triggers(triggers),
            output,
            duration: None,
            repeats: None,
            privileged: false,
            gate: Gate::default(),
        }
    }

    pub fn with_tags(mut self, tags: &Tags) -> Self {
        self.duration = seconds(tags.duration);
        self.repeats = tags.repeats;
        self.gate = Gate::new(seconds(tags.cooldown), tags.random_chance);
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Press/release cycles, defaulting to one.
    pub fn repeats(&self) -> u32 {
        self.repeats.unwrap_or(1)
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn matches(&self, message: &str) -> Option<&str> {
        matched(&self.triggers, message)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} => {}", self.triggers, self.output)?;
        if let Some(duration) = self.duration {
            write!(f, ", duration={:.2}s", duration.as_secs_f64())?;
        }
        if let Some(repeats) = self.repeats {
            write!(f, ", repeats={repeats}")?;
        }
        write_gate(f, &self.gate)
    }
}

fn write_gate(f: &mut fmt::Formatter<'_>, gate: &Gate) -> fmt::Result {
    if let Some(cooldown) = gate.cooldown() {
        write!(f, ", cooldown={:.1}s", cooldown.as_secs_f64())?;
    }
    write!(f, ", random_chance={}%", gate.random_chance().unwrap_or(100))
}

/// A command made of other commands, each launched through its own gate.
#[derive(Debug)]
pub struct Composite {
    triggers: Vec<String>,
    parts: Vec<Arc<Command>>,
    wait: bool,
    gate: Gate,
}

impl Composite {
    pub fn new(triggers: Vec<String>, parts: Vec<Arc<Command>>, tags: &Tags) -> Self {
        Composite {
            triggers: normalize_triggers(triggers),
            parts,
            wait: tags.wait.unwrap_or(false),
            gate: Gate::new(seconds(tags.cooldown), tags.random_chance),
        }
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn parts(&self) -> &[Arc<Command>] {
        &self.parts
    }

    /// Whether the composite stays running until every part has finished.
    pub fn waits(&self) -> bool {
        self.wait
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    pub fn matches(&self, message: &str) -> Option<&str> {
        matched(&self.triggers, message)
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| part.triggers().first().map(String::as_str))
            .collect();
        write!(f, "{:?} => {}, wait={}", self.triggers, parts.join(" + "), self.wait)?;
        write_gate(f, &self.gate)
    }
}

/// Administrative command. Always privileged.
#[derive(Debug)]
pub struct DevCommand {
    triggers: Vec<String>,
    subcommands: Vec<String>,
}

impl DevCommand {
    pub fn new(triggers: Vec<String>, subcommands: Vec<String>) -> Self {
        DevCommand {
            triggers: normalize_triggers(triggers),
            subcommands: normalize_triggers(subcommands),
        }
    }

    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn subcommands(&self) -> &[String] {
        &self.subcommands
    }

    pub fn allows(&self, verb: &str) -> bool {
        let verb = verb.to_lowercase();
        self.subcommands.iter().any(|s| *s == verb)
    }

    pub fn matches(&self, message: &str) -> Option<&str> {
        matched(&self.triggers, message)
    }

    /// The raw message text after the trigger, with the original casing kept.
    pub fn remainder<'a>(&self, raw: &'a str) -> &'a str {
        let raw = raw.trim();
        let normalized = raw.to_lowercase();
        let Some(trigger) = self.matches(&normalized) else {
            return raw;
        };

        // lowercasing can change byte lengths, so walk the raw chars
        let mut lowered = 0;
        for (index, c) in raw.char_indices() {
            if lowered == trigger.len() {
                return raw[index..].trim();
            }
            if lowered > trigger.len() {
                break;
            }
            lowered += c.to_lowercase().map(char::len_utf8).sum::<usize>();
        }
        if lowered == trigger.len() {
            return "";
        }
        warn!("Could not strip dev trigger {trigger:?} from {raw:?}");
        raw
    }
}

impl fmt::Display for DevCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} => subcommands={:?}", self.triggers, self.subcommands)
    }
}

/// One row of a keymap.
#[derive(Debug, Clone)]
pub enum Entry {
    Simple(Arc<Command>),
    Composite(Arc<Composite>),
    Dev(Arc<DevCommand>),
}

impl Entry {
    pub fn triggers(&self) -> &[String] {
        match self {
            Entry::Simple(command) => command.triggers(),
            Entry::Composite(composite) => composite.triggers(),
            Entry::Dev(dev) => dev.triggers(),
        }
    }

    pub fn is_privileged(&self) -> bool {
        match self {
            Entry::Simple(command) => command.is_privileged(),
            Entry::Composite(_) => false,
            Entry::Dev(_) => true,
        }
    }

    /// Gate of the entry, if it has run state.
    pub fn gate(&self) -> Option<&Gate> {
        match self {
            Entry::Simple(command) => Some(command.gate()),
            Entry::Composite(composite) => Some(composite.gate()),
            Entry::Dev(_) => None,
        }
    }

    pub fn matches(&self, message: &str) -> Option<&str> {
        match self {
            Entry::Simple(command) => command.matches(message),
            Entry::Composite(composite) => composite.matches(message),
            Entry::Dev(dev) => dev.matches(message),
        }
    }

    /// First trigger, used to name the entry in logs.
    pub fn name(&self) -> &str {
        self.triggers().first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Simple(command) => write!(f, "{command}"),
            Entry::Composite(composite) => write!(f, "{composite}"),
            Entry::Dev(dev) => write!(f, "{dev}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_triggers_are_normalized() {
        let command = Command::new(triggers(&[" Forward ", "FWD", ""]), Output::Key("w".into()));
        assert_eq!(command.triggers(), &["forward", "fwd"]);
        assert_eq!(command.matches("fwd please"), Some("fwd"));
        assert_eq!(command.matches("back"), None);
    }

    #[test]
    fn test_tags_apply() {
        let tags = Tags {
            cooldown: Some(2.5),
            duration: Some(0.5),
            repeats: None,
            random_chance: Some(20),
            wait: None,
        };
        let command = Command::new(triggers(&["jump"]), Output::Key("space".into())).with_tags(&tags);
        assert_eq!(command.duration(), Some(Duration::from_millis(500)));
        assert_eq!(command.repeats(), 1);
        assert_eq!(command.gate().cooldown(), Some(Duration::from_millis(2500)));
        assert_eq!(command.gate().random_chance(), Some(20));
    }

    #[test]
    fn test_dev_remainder_keeps_case() {
        let dev = DevCommand::new(triggers(&["!dev"]), triggers(&["edit", "undo"]));
        assert_eq!(dev.remainder("  !DEV edit Jump cd:5 "), "edit Jump cd:5");
        assert_eq!(dev.remainder("!dev"), "");
        assert!(dev.allows("EDIT"));
        assert!(!dev.allows("add"));
    }

    #[test]
    fn test_dev_remainder_when_lowercase_grows() {
        // 'İ' is two bytes but lowercases to three
        let dev = DevCommand::new(triggers(&["!İdev"]), triggers(&["edit"]));
        assert_eq!(dev.triggers(), &["!i\u{307}dev"]);
        assert_eq!(dev.remainder("!İDEV edit Jump cd:5"), "edit Jump cd:5");
        assert_eq!(dev.remainder("!İdev"), "");
    }

    #[test]
    fn test_mouse_button_names() {
        assert_eq!("lmb".parse::<MouseButton>(), Ok(MouseButton::Left));
        assert_eq!("RMB".parse::<MouseButton>(), Ok(MouseButton::Right));
        assert!("thumb".parse::<MouseButton>().is_err());
    }
}
