pub mod action_spec;
pub mod key;


extern crate serde_yaml;
extern crate toml;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub use action_spec::{parse_action_spec, split_csv, ActionSpec, Tags};

/// Config shipped with the binary, written out when no config file exists yet.
pub const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// `"<trigger csv>" = "<action spec csv>"`, in file order.
pub type CommandTable = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub twitch: TwitchSection,
    #[serde(default)]
    pub broadcaster: BroadcasterSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub keyboard: CommandTable,
    #[serde(default)]
    pub mouse: CommandTable,
    #[serde(default)]
    pub composite: CommandTable,
    #[serde(default)]
    pub dev: DevSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TwitchSection {
    #[serde(default)]
    pub channel: String,
    #[serde(default = "default_server")]
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BroadcasterSection {
    /// Key chord that turns chat-driven output on and off.
    #[serde(default = "default_toggle")]
    pub toggle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    #[serde(default = "default_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevSection {
    /// Usernames allowed to run privileged commands.
    #[serde(default)]
    pub users: Vec<String>,
    /// Dev command triggers mapped to the subcommands they accept.
    #[serde(default)]
    pub commands: CommandTable,
    #[serde(default)]
    pub keyboard: CommandTable,
    #[serde(default)]
    pub mouse: CommandTable,
}

impl Config {
    pub fn new() -> Self {
        Config {
            twitch: TwitchSection::default(),
            broadcaster: BroadcasterSection::default(),
            logging: LoggingSection::default(),
            keyboard: CommandTable::new(),
            mouse: CommandTable::new(),
            composite: CommandTable::new(),
            dev: DevSection::default(),
        }
    }

    pub fn table(&self, section: Section) -> &CommandTable {
        match section {
            Section::Keyboard => &self.keyboard,
            Section::Mouse => &self.mouse,
            Section::Composite => &self.composite,
            Section::DevKeyboard => &self.dev.keyboard,
            Section::DevMouse => &self.dev.mouse,
        }
    }

    pub fn table_mut(&mut self, section: Section) -> &mut CommandTable {
        match section {
            Section::Keyboard => &mut self.keyboard,
            Section::Mouse => &mut self.mouse,
            Section::Composite => &mut self.composite,
            Section::DevKeyboard => &mut self.dev.keyboard,
            Section::DevMouse => &mut self.dev.mouse,
        }
    }

    /// Finds the section and table key of the entry that lists `trigger`.
    pub fn find_entry(&self, trigger: &str) -> Option<(Section, String)> {
        let trigger = trigger.trim().to_lowercase();
        Section::ALL.into_iter().find_map(|section| {
            self.table(section)
                .keys()
                .find(|key| split_csv(key).iter().any(|t| t.to_lowercase() == trigger))
                .map(|key| (section, key.clone()))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TwitchSection {
    fn default() -> Self {
        TwitchSection {
            channel: String::new(),
            server: default_server(),
        }
    }
}

impl Default for BroadcasterSection {
    fn default() -> Self {
        BroadcasterSection {
            toggle: default_toggle(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection { level: default_level() }
    }
}

/// The command tables an entry can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Keyboard,
    Mouse,
    Composite,
    DevKeyboard,
    DevMouse,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Keyboard,
        Section::Mouse,
        Section::Composite,
        Section::DevKeyboard,
        Section::DevMouse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::Keyboard => "keyboard",
            Section::Mouse => "mouse",
            Section::Composite => "composite",
            Section::DevKeyboard => "dev.keyboard",
            Section::DevMouse => "dev.mouse",
        }
    }

    /// Sections whose action specs are interchangeable.
    pub fn is_compatible_with(self, other: Section) -> bool {
        use Section::*;
        matches!(
            (self, other),
            (Keyboard | DevKeyboard, Keyboard | DevKeyboard) | (Mouse | DevMouse, Mouse | DevMouse) | (Composite, Composite)
        )
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Section {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownSection(s.trim().to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialize config: {0}")]
    Serialize(String),
    #[error("[{section}] \"{key}\": {reason}")]
    Entry {
        section: String,
        key: String,
        reason: String,
    },
    #[error("unknown config section {0:?}")]
    UnknownSection(String),
}

impl ConfigError {
    pub(crate) fn entry(section: impl fmt::Display, key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Entry {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFiletype {
    Yaml,
    Toml,
}

pub fn get_file_ext(filename: &Path) -> ConfigFiletype {
    match filename.extension() {
        Some(f) => {
            let ext = f.to_str().unwrap_or("").to_lowercase();
            if ext == "yaml" || ext == "yml" {
                ConfigFiletype::Yaml
            } else {
                ConfigFiletype::Toml
            }
        }
        _ => ConfigFiletype::Toml,
    }
}

pub fn parse_config(contents: &str, filetype: ConfigFiletype, path: &Path) -> Result<Config, ConfigError> {
    let parsed = match filetype {
        ConfigFiletype::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
        ConfigFiletype::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

pub fn serialize_config(config: &Config, filetype: ConfigFiletype) -> Result<String, ConfigError> {
    match filetype {
        ConfigFiletype::Yaml => serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string())),
        ConfigFiletype::Toml => toml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string())),
    }
}

pub fn read_config_text(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_config_text(path: &Path, contents: &str) -> Result<(), ConfigError> {
    fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = read_config_text(path)?;
    parse_config(&contents, get_file_ext(path), path)
}

/// Writes the default config to `path` unless a file is already there.
///
/// Returns `true` when a new file was created.
pub fn ensure_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    let contents = match get_file_ext(path) {
        ConfigFiletype::Toml => DEFAULT_CONFIG.to_string(),
        ConfigFiletype::Yaml => {
            let config = parse_config(DEFAULT_CONFIG, ConfigFiletype::Toml, Path::new("default.toml"))?;
            serialize_config(&config, ConfigFiletype::Yaml)?
        }
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    write_config_text(path, &contents)?;
    Ok(true)
}

fn default_server() -> String {
    "irc.chat.twitch.tv:6667".to_string()
}

fn default_toggle() -> String {
    "shift+backspace".to_string()
}

fn default_level() -> String {
    "info".to_string()
}
