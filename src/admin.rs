//! Config editing from chat through the dev command verbs.
//!
//! Every change rewrites the config file, then rebuilds the keymap from it.
//! If the rebuilt keymap is invalid the previous file content is put back,
//! so the file on disk always loads.

use crate::config::action_spec::set_tags;
use crate::config::{
    get_file_ext, parse_config, read_config_text, serialize_config, split_csv, write_config_text, Config, Section,
};
use crate::keymap::Keymap;
use crate::launcher::DevHandler;
use crate::reload::Reloader;
use anyhow::{anyhow, bail, Context};
use log::info;
use parking_lot::Mutex;

const TAGS: [&str; 5] = ["cd", "d", "n", "r", "w"];

pub struct ConfigEditor {
    reloader: Reloader,
    /// File contents before each successful change, newest last.
    history: Mutex<Vec<String>>,
}

impl ConfigEditor {
    pub fn new(reloader: Reloader) -> Self {
        ConfigEditor {
            reloader,
            history: Mutex::new(Vec::new()),
        }
    }

    /// `edit <trigger> <tag>:<value>...`
    fn edit(&self, args: &str) -> anyhow::Result<Keymap> {
        let words: Vec<&str> = args.split_whitespace().collect();
        let split = words
            .iter()
            .position(|word| word.contains(':'))
            .ok_or_else(|| anyhow!("usage: edit <trigger> <tag>:<value>..."))?;
        let trigger = words[..split].join(" ");
        if trigger.is_empty() {
            bail!("usage: edit <trigger> <tag>:<value>...");
        }

        let mut updates = Vec::new();
        for word in &words[split..] {
            let (tag, value) = word
                .split_once(':')
                .ok_or_else(|| anyhow!("expected <tag>:<value>, got {word:?}"))?;
            let tag = tag.to_lowercase();
            if !TAGS.contains(&tag.as_str()) {
                bail!("unknown tag {tag:?}, expected one of {}", TAGS.join(", "));
            }
            updates.push((tag, value.to_string()));
        }

        self.change(|config| {
            let (section, key) = config
                .find_entry(&trigger)
                .ok_or_else(|| anyhow!("no command is triggered by {trigger:?}"))?;
            let table = config.table_mut(section);
            if let Some(spec) = table.get_mut(&key) {
                *spec = set_tags(spec, &updates);
                info!("[{section}] \"{key}\" = \"{spec}\"");
            }
            Ok(())
        })
    }

    /// `add <section> <triggers> = <action spec>`
    fn add(&self, args: &str) -> anyhow::Result<Keymap> {
        let usage = "usage: add <section> <triggers> = <action spec>";
        let (section, rest) = args.trim().split_once(char::is_whitespace).ok_or_else(|| anyhow!(usage))?;
        let section: Section = section.parse()?;
        let (triggers, spec) = rest.split_once('=').ok_or_else(|| anyhow!(usage))?;
        let triggers = split_csv(triggers);
        let (key, spec) = (triggers.join(", "), spec.trim().to_string());
        if triggers.iter().any(String::is_empty) || spec.is_empty() {
            bail!(usage);
        }

        self.change(|config| {
            if let Some(taken) = triggers.iter().find(|t| config.find_entry(t).is_some()) {
                bail!("{taken:?} is already a trigger");
            }
            info!("[{section}] \"{key}\" = \"{spec}\"");
            config.table_mut(section).insert(key, spec);
            Ok(())
        })
    }

    /// `move <trigger> <section>`
    fn move_entry(&self, args: &str) -> anyhow::Result<Keymap> {
        let (trigger, target) = args
            .trim()
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| anyhow!("usage: move <trigger> <section>"))?;
        let target: Section = target.parse()?;
        let trigger = trigger.trim().to_string();

        self.change(|config| {
            let (source, key) = config
                .find_entry(&trigger)
                .ok_or_else(|| anyhow!("no command is triggered by {trigger:?}"))?;
            if source == target {
                bail!("{trigger:?} is already in [{target}]");
            }
            if !source.is_compatible_with(target) {
                bail!("cannot move {trigger:?} from [{source}] to [{target}]");
            }
            let spec = config
                .table_mut(source)
                .shift_remove(&key)
                .ok_or_else(|| anyhow!("{key:?} vanished from [{source}]"))?;
            info!("Moved \"{key}\" from [{source}] to [{target}]");
            config.table_mut(target).insert(key, spec);
            Ok(())
        })
    }

    fn undo(&self) -> anyhow::Result<Keymap> {
        let mut history = self.history.lock();
        let previous = history.pop().ok_or_else(|| anyhow!("nothing to undo"))?;
        let path = self.reloader.path();
        write_config_text(path, &previous)?;
        match self.reloader.reload() {
            Ok(keymap) => {
                info!("Restored {}", path.display());
                Ok(keymap)
            }
            Err(e) => {
                history.push(previous);
                Err(e).context("restored config does not load")
            }
        }
    }

    /// Applies `edit` to the parsed config file, writes it back and rebuilds the keymap.
    fn change<F>(&self, edit: F) -> anyhow::Result<Keymap>
    where
        F: FnOnce(&mut Config) -> anyhow::Result<()>,
    {
        let path = self.reloader.path();
        let filetype = get_file_ext(path);
        let before = read_config_text(path)?;
        let mut config = parse_config(&before, filetype, path)?;
        edit(&mut config)?;
        write_config_text(path, &serialize_config(&config, filetype)?)?;

        match self.reloader.reload() {
            Ok(keymap) => {
                self.history.lock().push(before);
                Ok(keymap)
            }
            Err(e) => {
                write_config_text(path, &before)?;
                Err(e).context("change rejected, config left as it was")
            }
        }
    }
}

impl DevHandler for ConfigEditor {
    fn handle(&self, request: &str) -> anyhow::Result<Option<Keymap>> {
        let request = request.trim();
        let (verb, args) = request.split_once(char::is_whitespace).unwrap_or((request, ""));
        let keymap = match verb.to_lowercase().as_str() {
            "edit" => self.edit(args)?,
            "add" => self.add(args)?,
            "move" => self.move_entry(args)?,
            "undo" => self.undo()?,
            other => bail!("unknown dev subcommand {other:?}"),
        };
        Ok(Some(keymap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Entry;
    use crate::config::load_config;
    use indoc::indoc;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    const CONFIG: &str = indoc! {r#"
        [keyboard]
        "forward, fwd" = "w, d:1"
        "jump" = "space"

        [mouse]
        "shoot" = "lmb"

        [dev.keyboard]
        "!pause" = "esc"
    "#};

    fn editor(name: &str, contents: &str) -> (TempDir, ConfigEditor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        (dir, ConfigEditor::new(Reloader::new(path)))
    }

    fn path(editor: &ConfigEditor) -> &Path {
        editor.reloader.path()
    }

    fn handle(editor: &ConfigEditor, request: &str) -> Keymap {
        editor.handle(request).unwrap().unwrap()
    }

    #[test]
    fn test_edit_sets_tags() {
        let (_dir, editor) = editor("config.toml", CONFIG);
        let keymap = handle(&editor, "edit FWD cd:5 r:50");

        let Some(Entry::Simple(forward)) = keymap.get("forward") else {
            panic!("forward is missing");
        };
        assert_eq!(forward.gate().cooldown(), Some(Duration::from_secs(5)));
        assert_eq!(forward.gate().random_chance(), Some(50));
        assert_eq!(forward.duration(), Some(Duration::from_secs(1)));

        let config = load_config(path(&editor)).unwrap();
        assert_eq!(config.keyboard["forward, fwd"], "w, d:1, cd:5, r:50");
    }

    #[test]
    fn test_edit_rejects_bad_requests() {
        let (_dir, editor) = editor("config.toml", CONFIG);
        assert!(editor.handle("edit nothing cd:5").is_err());
        assert!(editor.handle("edit jump speed:5").is_err());
        assert!(editor.handle("edit jump").is_err());
        assert!(editor.handle("rename jump hop").is_err());
    }

    #[test]
    fn test_add_appends_entry() {
        let (_dir, editor) = editor("config.toml", CONFIG);
        let keymap = handle(&editor, "add keyboard crouch, duck = ctrl, d:0.5");
        assert!(keymap.get("duck").is_some());
        assert_eq!(
            load_config(path(&editor)).unwrap().keyboard.keys().collect::<Vec<_>>(),
            ["forward, fwd", "jump", "crouch, duck"]
        );
        assert!(editor.handle("add keyboard jump = space").is_err());
        assert!(editor.handle("add wheel spin = lmb").is_err());
    }

    #[test]
    fn test_move_between_compatible_sections() {
        let (_dir, editor) = editor("config.toml", CONFIG);
        let keymap = handle(&editor, "move jump dev.keyboard");
        assert!(keymap.get("jump").unwrap().is_privileged());

        let config = load_config(path(&editor)).unwrap();
        assert!(!config.keyboard.contains_key("jump"));
        assert_eq!(config.dev.keyboard["jump"], "space");

        assert!(editor.handle("move shoot keyboard").is_err());
        assert!(editor.handle("move shoot mouse").is_err());
    }

    #[test]
    fn test_move_into_dev_rejected_while_a_composite_uses_it() {
        let config = format!("{CONFIG}\n[composite]\n\"charge\" = \"forward + jump\"\n");
        let (_dir, editor) = editor("config.toml", &config);
        let err = editor.handle("move jump dev.keyboard").unwrap_err();
        assert!(format!("{err:#}").contains("dev command"));
        assert_eq!(fs::read_to_string(path(&editor)).unwrap(), config);
        assert!(!load_config(path(&editor)).unwrap().dev.keyboard.contains_key("jump"));
    }

    #[test]
    fn test_invalid_change_is_rolled_back() {
        let (_dir, editor) = editor("config.toml", CONFIG);
        assert!(editor.handle("add keyboard fly = hyperspace").is_err());
        assert!(editor.handle("edit jump r:250").is_err());
        assert_eq!(fs::read_to_string(path(&editor)).unwrap(), CONFIG);
        assert!(editor.handle("undo").is_err());
    }

    #[test]
    fn test_undo_restores_previous_file() {
        let (_dir, editor) = editor("config.toml", CONFIG);
        handle(&editor, "edit jump cd:3");
        handle(&editor, "move !pause keyboard");

        let keymap = handle(&editor, "undo");
        assert!(keymap.get("!pause").unwrap().is_privileged());

        handle(&editor, "undo");
        assert_eq!(fs::read_to_string(path(&editor)).unwrap(), CONFIG);
        assert!(editor.handle("undo").is_err());
    }

    #[test]
    fn test_yaml_config_stays_yaml() {
        let yaml = indoc! {r#"
            keyboard:
              "forward": "w"
        "#};
        let (_dir, editor) = editor("config.yaml", yaml);
        handle(&editor, "edit forward cd:2");
        let text = fs::read_to_string(path(&editor)).unwrap();
        assert!(text.contains("keyboard:"));
        assert_eq!(load_config(path(&editor)).unwrap().keyboard["forward"], "w, cd:2");
    }
}
