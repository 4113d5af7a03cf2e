use crate::command::{Command, Composite, DevCommand, Entry, MouseButton, Output};
use crate::config::key::parse_key;
use crate::config::{parse_action_spec, split_csv, CommandTable, Config, ConfigError, Section};
use log::debug;
use std::sync::Arc;

/// Ordered, immutable table of everything chat can trigger. The first matching entry wins.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    entries: Vec<Entry>,
}

impl Keymap {
    pub fn new(entries: Vec<Entry>) -> Self {
        Keymap { entries }
    }

    /// Builds the keymap in the order keyboard, mouse, composite, dev.
    ///
    /// The dev block is itself dev keyboard, dev mouse, then dev commands.
    pub fn from_config(config: &Config) -> Result<Keymap, ConfigError> {
        let keyboard = keyboard_commands(&config.keyboard, Section::Keyboard, false)?;
        let mouse = mouse_commands(&config.mouse, Section::Mouse, false)?;
        let dev_keyboard = keyboard_commands(&config.dev.keyboard, Section::DevKeyboard, true)?;
        let dev_mouse = mouse_commands(&config.dev.mouse, Section::DevMouse, true)?;

        let public: Vec<&Arc<Command>> = keyboard.iter().chain(&mouse).collect();
        let privileged: Vec<&Arc<Command>> = dev_keyboard.iter().chain(&dev_mouse).collect();
        let composites = composite_commands(&config.composite, &public, &privileged)?;
        let dev = dev_commands(&config.dev.commands);

        let entries = keyboard
            .into_iter()
            .chain(mouse)
            .map(Entry::Simple)
            .chain(composites.into_iter().map(Entry::Composite))
            .chain(dev_keyboard.into_iter().chain(dev_mouse).map(Entry::Simple))
            .chain(dev.into_iter().map(Entry::Dev))
            .collect();

        Ok(Keymap { entries })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by one of its exact triggers.
    pub fn get(&self, trigger: &str) -> Option<&Entry> {
        let trigger = trigger.trim().to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.triggers().iter().any(|t| *t == trigger))
    }

    /// Human readable listing, public commands first.
    pub fn describe(&self) -> String {
        let mut public = String::new();
        let mut dev = String::new();
        for entry in &self.entries {
            let out = if entry.is_privileged() { &mut dev } else { &mut public };
            out.push_str(&format!("{entry}\n"));
        }
        format!("Public Commands:\n{public}\nDev Commands:\n{dev}")
    }
}

fn keyboard_commands(table: &CommandTable, section: Section, privileged: bool) -> Result<Vec<Arc<Command>>, ConfigError> {
    table
        .iter()
        .map(|(key, value)| {
            let spec = parse_action_spec(value).map_err(|e| ConfigError::entry(section, key, e))?;
            parse_key(&spec.action).map_err(|e| ConfigError::entry(section, key, e))?;
            let command = Command::new(split_csv(key), Output::Key(spec.action.to_lowercase()))
                .with_tags(&spec.tags)
                .privileged(privileged);
            debug!("[{section}] {command}");
            Ok(Arc::new(command))
        })
        .collect()
}

fn mouse_commands(table: &CommandTable, section: Section, privileged: bool) -> Result<Vec<Arc<Command>>, ConfigError> {
    table
        .iter()
        .map(|(key, value)| {
            let spec = parse_action_spec(value).map_err(|e| ConfigError::entry(section, key, e))?;
            let output = parse_mouse_output(&spec.action).map_err(|e| ConfigError::entry(section, key, e))?;
            let command = Command::new(split_csv(key), output)
                .with_tags(&spec.tags)
                .privileged(privileged);
            debug!("[{section}] {command}");
            Ok(Arc::new(command))
        })
        .collect()
}

/// `lmb`, `mmb`, `rmb` or `move <dx> <dy>`.
fn parse_mouse_output(action: &str) -> Result<Output, String> {
    let words: Vec<&str> = action.split_whitespace().collect();
    match words.as_slice() {
        ["move", dx, dy] => {
            let dx = dx.parse().map_err(|_| format!("bad horizontal distance {dx:?}"))?;
            let dy = dy.parse().map_err(|_| format!("bad vertical distance {dy:?}"))?;
            Ok(Output::MouseMove { dx, dy })
        }
        ["move", ..] => Err(format!("expected \"move <dx> <dy>\", got {action:?}")),
        [button] => Ok(Output::MouseButton(button.parse::<MouseButton>()?)),
        _ => Err(format!("unknown mouse action {action:?}")),
    }
}

/// `<trigger> + <trigger> ...`, each part naming a public keyboard or mouse command.
///
/// Composites are public, so a part from the dev tables is rejected.
fn composite_commands(
    table: &CommandTable,
    public: &[&Arc<Command>],
    privileged: &[&Arc<Command>],
) -> Result<Vec<Arc<Composite>>, ConfigError> {
    table
        .iter()
        .map(|(key, value)| {
            let spec = parse_action_spec(value).map_err(|e| ConfigError::entry(Section::Composite, key, e))?;
            let parts = spec
                .action
                .split('+')
                .map(|part| {
                    let part = part.trim().to_lowercase();
                    if privileged.iter().any(|command| command.triggers().contains(&part)) {
                        return Err(ConfigError::entry(
                            Section::Composite,
                            key,
                            format!("{part:?} is a dev command and cannot be part of a composite"),
                        ));
                    }
                    public
                        .iter()
                        .find(|command| command.triggers().contains(&part))
                        .map(|command| Arc::clone(command))
                        .ok_or_else(|| ConfigError::entry(Section::Composite, key, format!("unknown command {part:?}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let composite = Composite::new(split_csv(key), parts, &spec.tags);
            debug!("[composite] {composite}");
            Ok(Arc::new(composite))
        })
        .collect()
}

fn dev_commands(table: &CommandTable) -> Vec<Arc<DevCommand>> {
    table
        .iter()
        .map(|(key, value)| Arc::new(DevCommand::new(split_csv(key), split_csv(value))))
        .collect()
}
