use anyhow::Context;
use chatplays::admin::ConfigEditor;
use chatplays::chat::TwitchIrc;
use chatplays::config::{ensure_config, load_config};
use chatplays::dispatcher::{AuthorizedUsers, Dispatcher};
use chatplays::event_loop::EventLoop;
use chatplays::keymap::Keymap;
use chatplays::launcher::Launcher;
use chatplays::output::{Keyboard, LogOutput, Mouse, UinputOutput};
use chatplays::reload::Reloader;
use chatplays::toggle::{spawn_listener, Chord, OutputSwitch};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use log::{debug, info, warn};
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file, TOML or YAML by extension. Created from the default config if missing.
    #[arg(default_value = "config.toml")]
    config: PathBuf,
    /// Log the input chat would send instead of emitting it
    #[arg(long)]
    dry_run: bool,
    /// Don't watch local keyboards for the on/off chord
    #[arg(long)]
    no_toggle: bool,
    /// Generate shell completions
    ///
    /// You can use them by storing in your shells completion file or by running
    /// - in bash: eval "$(chatplays --completions bash)"
    /// - in fish: chatplays --completions fish | source
    #[arg(long, value_enum, value_name = "SHELL", verbatim_doc_comment)]
    completions: Option<Shell>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(shell) = args.completions {
        clap_complete::generate(shell, &mut Args::command(), "chatplays", &mut stdout());
        return Ok(());
    }

    if ensure_config(&args.config)? {
        println!("Wrote the default config to {}", args.config.display());
    }
    let config = load_config(&args.config)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str())).init();

    let keymap = Keymap::from_config(&config)?;
    let listing = keymap.describe();
    println!("Chat plays #{} through {}", config.twitch.channel, config.twitch.server);
    if !args.no_toggle {
        println!("Press {} to turn chat input on or off", config.broadcaster.toggle);
    }
    println!("{listing}");
    debug!("{listing}");

    let keyboard: Arc<dyn Keyboard>;
    let mouse: Arc<dyn Mouse>;
    if args.dry_run {
        let output = Arc::new(LogOutput);
        keyboard = output.clone();
        mouse = output;
    } else {
        let output = Arc::new(UinputOutput::new("chatplays").context("failed to create the uinput device")?);
        keyboard = output.clone();
        mouse = output;
    }

    let editor = ConfigEditor::new(Reloader::new(&args.config));
    let launcher = Launcher::new(keyboard, mouse, Arc::new(editor));

    let switch = OutputSwitch::new();
    if !args.no_toggle {
        let chord = Chord::parse(&config.broadcaster.toggle).map_err(anyhow::Error::msg)?;
        match spawn_listener(chord, switch.clone()) {
            Ok(count) => info!("Watching {count} keyboard(s) for {}", config.broadcaster.toggle),
            Err(e) => warn!("Output toggle disabled: {e:#}"),
        }
    }

    let users: AuthorizedUsers = config.dev.users.iter().collect();
    info!("{} user(s) may run dev commands", users.len());

    let chat = TwitchIrc::connect(&config.twitch.server, &config.twitch.channel)?;
    EventLoop::new(chat, Dispatcher::new(keymap, users), launcher, switch).run()
}
