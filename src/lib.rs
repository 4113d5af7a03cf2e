pub mod admin;
pub mod chat;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod event_loop;
pub mod gate;
pub mod keymap;
pub mod launcher;
pub mod output;
pub mod reload;
pub mod toggle;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use keymap::Keymap;
