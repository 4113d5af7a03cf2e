use crate::command::{Command, Composite, DevCommand, Entry, Output};
use crate::gate::{Dice, FastDice, Refusal, RunGuard};
use crate::keymap::Keymap;
use crate::output::{Keyboard, Mouse};
use log::{debug, error, info};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Carries out dev subcommands such as `edit cmd1 cd:5`.
pub trait DevHandler: Send + Sync {
    /// Receives the message after the dev trigger. Returns a rebuilt keymap
    /// when the change needs to be installed.
    fn handle(&self, request: &str) -> anyhow::Result<Option<Keymap>>;
}

/// Handle to an action running on its own thread.
#[derive(Debug)]
pub struct ActionHandle(JoinHandle<()>);

impl ActionHandle {
    pub fn join(self) -> thread::Result<()> {
        self.0.join()
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

#[derive(Debug)]
pub enum Launch {
    Refused(Refusal),
    Started(ActionHandle),
    /// A dev command ran. `Some` carries a keymap the caller must install.
    Admin(Option<Arc<Keymap>>),
    /// The action thread could not be spawned.
    Failed(io::Error),
}

/// Starts matched entries. Cheap to clone; every clone shares the same outputs.
#[derive(Clone)]
pub struct Launcher {
    keyboard: Arc<dyn Keyboard>,
    mouse: Arc<dyn Mouse>,
    dev: Arc<dyn DevHandler>,
    dice: Arc<dyn Dice>,
}

impl Launcher {
    pub fn new(keyboard: Arc<dyn Keyboard>, mouse: Arc<dyn Mouse>, dev: Arc<dyn DevHandler>) -> Self {
        Launcher {
            keyboard,
            mouse,
            dev,
            dice: Arc::new(FastDice),
        }
    }

    pub fn with_dice(mut self, dice: Arc<dyn Dice>) -> Self {
        self.dice = dice;
        self
    }

    /// Runs `entry` for a chat message. Never blocks on the action itself.
    pub fn launch(&self, entry: &Entry, message: &str) -> Launch {
        match entry {
            Entry::Simple(command) => self.launch_command(command),
            Entry::Composite(composite) => self.launch_composite(composite),
            Entry::Dev(dev) => Launch::Admin(self.run_dev(dev, message)),
        }
    }

    fn launch_command(&self, command: &Arc<Command>) -> Launch {
        let name = command.triggers().first().cloned().unwrap_or_default();
        let guard = match command.gate().try_acquire(self.dice.as_ref()) {
            Ok(guard) => guard,
            Err(refusal) => return refused(&name, refusal),
        };
        debug!("Running {command}");

        let launcher = self.clone();
        let command = Arc::clone(command);
        spawn(&name, guard, move || {
            if let Err(e) = launcher.run_command(&command) {
                error!("Command {:?} failed: {e:#}", command.triggers());
            }
        })
    }

    fn launch_composite(&self, composite: &Arc<Composite>) -> Launch {
        let name = composite.triggers().first().cloned().unwrap_or_default();
        let guard = match composite.gate().try_acquire(self.dice.as_ref()) {
            Ok(guard) => guard,
            Err(refusal) => return refused(&name, refusal),
        };
        debug!("Running {composite}");

        let launcher = self.clone();
        let composite = Arc::clone(composite);
        spawn(&name, guard, move || {
            let handles: Vec<ActionHandle> = composite
                .parts()
                .iter()
                .filter_map(|part| match launcher.launch_command(part) {
                    Launch::Started(handle) => Some(handle),
                    _ => None,
                })
                .collect();
            if composite.waits() {
                for handle in handles {
                    if handle.join().is_err() {
                        error!("A part of {:?} panicked", composite.triggers());
                    }
                }
            }
        })
    }

    fn run_command(&self, command: &Command) -> anyhow::Result<()> {
        let duration = command.duration();
        match command.output() {
            Output::Key(key) => self.keyboard.press_release(key, duration, command.repeats()),
            Output::MouseButton(button) => self.mouse.press_release(*button, duration, command.repeats()),
            Output::MouseMove { dx, dy } => {
                for _ in 0..command.repeats() {
                    self.mouse.move_by(*dx, *dy, duration)?;
                }
                Ok(())
            }
        }
    }

    fn run_dev(&self, dev: &DevCommand, message: &str) -> Option<Arc<Keymap>> {
        let request = dev.remainder(message);
        let verb = request.split_whitespace().next().unwrap_or_default();
        if !dev.allows(verb) {
            info!("Dev command {:?} does not accept {verb:?}", dev.triggers());
            return None;
        }
        info!("Dev request: {request}");
        match self.dev.handle(request) {
            Ok(keymap) => keymap.map(Arc::new),
            Err(e) => {
                error!("Dev request {request:?} failed: {e:#}");
                None
            }
        }
    }
}

fn refused(name: &str, refusal: Refusal) -> Launch {
    info!("{name:?} {refusal}");
    Launch::Refused(refusal)
}

// The guard moves into the thread, so it is released when the action ends, panics,
// or the thread never starts.
fn spawn<F>(name: &str, guard: RunGuard, action: F) -> Launch
where
    F: FnOnce() + Send + 'static,
{
    let spawned = thread::Builder::new().name(format!("action {name}")).spawn(move || {
        let _guard = guard;
        action();
    });
    match spawned {
        Ok(handle) => Launch::Started(ActionHandle(handle)),
        Err(e) => {
            error!("Failed to start {name:?}: {e}");
            Launch::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MouseButton;
    use crate::config::Tags;
    use crate::dispatcher::{AuthorizedUsers, Dispatcher};
    use crate::gate::tests::FixedDice;
    use parking_lot::Mutex;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::time::Duration;

    /// Records every emitted action.
    #[derive(Default)]
    struct Recorder {
        actions: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn actions(&self) -> Vec<String> {
            self.actions.lock().clone()
        }
    }

    impl Keyboard for Recorder {
        fn press_release(&self, key: &str, duration: Option<Duration>, repeats: u32) -> anyhow::Result<()> {
            self.actions.lock().push(format!("key {key} {duration:?} x{repeats}"));
            Ok(())
        }
    }

    impl Mouse for Recorder {
        fn press_release(&self, button: MouseButton, _: Option<Duration>, repeats: u32) -> anyhow::Result<()> {
            self.actions.lock().push(format!("click {button} x{repeats}"));
            Ok(())
        }

        fn move_by(&self, dx: i32, dy: i32, _: Option<Duration>) -> anyhow::Result<()> {
            self.actions.lock().push(format!("move {dx} {dy}"));
            Ok(())
        }
    }

    /// Holds every key press until the test sends a release.
    struct BlockingKeyboard {
        release: Mutex<Receiver<()>>,
    }

    impl Keyboard for BlockingKeyboard {
        fn press_release(&self, _: &str, _: Option<Duration>, _: u32) -> anyhow::Result<()> {
            let _ = self.release.lock().recv();
            Ok(())
        }
    }

    struct PanickingKeyboard;

    impl Keyboard for PanickingKeyboard {
        fn press_release(&self, _: &str, _: Option<Duration>, _: u32) -> anyhow::Result<()> {
            panic!("device unplugged");
        }
    }

    #[derive(Default)]
    struct RecordingDev {
        requests: Mutex<Vec<String>>,
    }

    impl DevHandler for RecordingDev {
        fn handle(&self, request: &str) -> anyhow::Result<Option<Keymap>> {
            self.requests.lock().push(request.to_string());
            Ok(Some(Keymap::default()))
        }
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn key(trigger: &str, key: &str) -> Arc<Command> {
        Arc::new(Command::new(strings(&[trigger]), Output::Key(key.into())))
    }

    fn launcher_with(keyboard: Arc<dyn Keyboard>, dev: Arc<dyn DevHandler>) -> Launcher {
        let recorder = Arc::new(Recorder::default());
        Launcher::new(keyboard, recorder, dev).with_dice(Arc::new(FixedDice::new(0)))
    }

    fn blocking() -> (Arc<BlockingKeyboard>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let keyboard = BlockingKeyboard {
            release: Mutex::new(rx),
        };
        (Arc::new(keyboard), tx)
    }

    fn started(launch: Launch) -> ActionHandle {
        match launch {
            Launch::Started(handle) => handle,
            other => panic!("expected the action to start, got {other:?}"),
        }
    }

    #[test]
    fn test_outputs_follow_the_command() {
        let recorder = Arc::new(Recorder::default());
        let launcher = Launcher::new(recorder.clone(), recorder.clone(), Arc::new(RecordingDev::default()));
        let tags = Tags {
            duration: Some(0.5),
            repeats: Some(2),
            ..Tags::default()
        };
        let jump = Arc::new(Command::new(strings(&["jump"]), Output::Key("space".into())).with_tags(&tags));
        let shoot = Arc::new(Command::new(strings(&["shoot"]), Output::MouseButton(MouseButton::Left)));
        let look = Arc::new(Command::new(strings(&["look"]), Output::MouseMove { dx: 200, dy: 0 }).with_tags(&tags));

        for command in [jump, shoot, look] {
            started(launcher.launch(&Entry::Simple(command), "")).join().unwrap();
        }
        assert_eq!(
            recorder.actions(),
            ["key space Some(500ms) x2", "click left x1", "move 200 0", "move 200 0"]
        );
    }

    #[test]
    fn test_second_message_refused_while_running() {
        let (keyboard, release) = blocking();
        let launcher = launcher_with(keyboard, Arc::new(RecordingDev::default()));
        let dispatcher = Dispatcher::new(Keymap::new(vec![Entry::Simple(key("forward", "w"))]), AuthorizedUsers::default());

        let entry = dispatcher.dispatch("alice", "forward").unwrap();
        let gate = entry.gate().unwrap();
        let handle = started(launcher.launch(&entry, "forward"));
        assert!(gate.is_running());

        let again = dispatcher.dispatch("alice", "forward").unwrap();
        assert!(matches!(launcher.launch(&again, "forward"), Launch::Refused(Refusal::AlreadyRunning)));

        release.send(()).unwrap();
        handle.join().unwrap();
        assert!(!gate.is_running());
        assert!(matches!(launcher.launch(&again, "forward"), Launch::Started(_)));
        release.send(()).unwrap();
    }

    #[test]
    fn test_panicking_action_clears_running() {
        let launcher = launcher_with(Arc::new(PanickingKeyboard), Arc::new(RecordingDev::default()));
        let command = key("forward", "w");
        let handle = started(launcher.launch(&Entry::Simple(command.clone()), "forward"));
        assert!(handle.join().is_err());
        assert!(!command.gate().is_running());
    }

    #[test]
    fn test_dev_request_reaches_handler_for_authorized_users() {
        let handler = Arc::new(RecordingDev::default());
        let launcher = launcher_with(Arc::new(Recorder::default()), handler.clone());
        let dev = Arc::new(DevCommand::new(strings(&["!dev"]), strings(&["edit", "undo"])));
        let users: AuthorizedUsers = ["carol"].into_iter().collect();
        let dispatcher = Dispatcher::new(Keymap::new(vec![Entry::Dev(dev)]), users);

        let message = "!dev edit cmd1 cd:5";
        assert!(dispatcher.dispatch("bob", message).is_none());
        assert!(handler.requests.lock().is_empty());

        let entry = dispatcher.dispatch("Carol", message).unwrap();
        assert!(matches!(launcher.launch(&entry, message), Launch::Admin(Some(_))));
        assert_eq!(*handler.requests.lock(), ["edit cmd1 cd:5"]);

        // verbs the dev command does not list never reach the handler
        assert!(matches!(launcher.launch(&entry, "!dev add keyboard x = y"), Launch::Admin(None)));
        assert_eq!(handler.requests.lock().len(), 1);
    }

    #[test]
    fn test_waiting_composite_runs_until_parts_finish() {
        let (keyboard, release) = blocking();
        let launcher = launcher_with(keyboard, Arc::new(RecordingDev::default()));
        let forward = key("forward", "w");
        let sprint = key("sprint", "shift");
        let tags = Tags {
            wait: Some(true),
            ..Tags::default()
        };
        let charge = Arc::new(Composite::new(
            strings(&["charge"]),
            vec![forward.clone(), sprint.clone()],
            &tags,
        ));

        let handle = started(launcher.launch(&Entry::Composite(charge.clone()), "charge"));
        // parts are running before the composite finishes
        while !(forward.gate().is_running() && sprint.gate().is_running()) {
            thread::yield_now();
        }
        assert!(charge.gate().is_running());

        release.send(()).unwrap();
        release.send(()).unwrap();
        handle.join().unwrap();
        assert!(!charge.gate().is_running());
        assert!(!forward.gate().is_running());
        assert!(!sprint.gate().is_running());
    }

    #[test]
    fn test_composite_parts_keep_their_own_gates() {
        let (keyboard, release) = blocking();
        let launcher = launcher_with(keyboard, Arc::new(RecordingDev::default()));
        let forward = key("forward", "w");
        let charge = Arc::new(Composite::new(strings(&["charge"]), vec![forward.clone()], &Tags::default()));

        let part = started(launcher.launch(&Entry::Simple(forward.clone()), "forward"));
        // the only part is busy, so the composite finishes without starting it
        started(launcher.launch(&Entry::Composite(charge.clone()), "charge")).join().unwrap();
        assert!(!charge.gate().is_running());
        assert!(forward.gate().is_running());

        release.send(()).unwrap();
        part.join().unwrap();
    }
}
