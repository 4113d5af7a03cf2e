use crate::chat::{ChatMessage, ChatSource};
use crate::dispatcher::Dispatcher;
use crate::launcher::{Launch, Launcher};
use crate::toggle::OutputSwitch;
use log::{debug, info};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls chat and hands every message to the dispatcher, in arrival order.
pub struct EventLoop<S: ChatSource> {
    source: S,
    dispatcher: Dispatcher,
    launcher: Launcher,
    switch: OutputSwitch,
    poll_interval: Duration,
}

impl<S: ChatSource> EventLoop<S> {
    pub fn new(source: S, dispatcher: Dispatcher, launcher: Launcher, switch: OutputSwitch) -> Self {
        EventLoop {
            source,
            dispatcher,
            launcher,
            switch,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs until the chat source fails.
    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            if self.tick()? == 0 {
                thread::sleep(self.poll_interval);
            }
        }
    }

    /// Handles whatever arrived since the last poll. Returns the number of messages.
    pub fn tick(&mut self) -> anyhow::Result<usize> {
        let messages = self.source.poll()?;
        for message in &messages {
            self.on_message(message);
        }
        Ok(messages.len())
    }

    pub fn on_message(&self, message: &ChatMessage) -> Option<Launch> {
        info!("{}: {}", message.username, message.text);
        if !self.switch.is_on() {
            debug!("Output is off, ignoring {:?}", message.text);
            return None;
        }

        let entry = self.dispatcher.dispatch(&message.username, &message.text)?;
        let launch = self.launcher.launch(&entry, &message.text);
        if let Launch::Admin(Some(keymap)) = &launch {
            let listing = keymap.describe();
            debug!("{listing}");
            println!("{listing}");
            self.dispatcher.install(Arc::clone(keymap));
        }
        Some(launch)
    }
}
