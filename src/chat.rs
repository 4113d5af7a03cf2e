//! Read-only Twitch chat over plain IRC.
//!
//! Logs in anonymously with a `justinfanNNNN` nick, so no OAuth token is
//! needed. The socket is non-blocking: [`ChatSource::poll`] returns whatever
//! complete lines arrived since the last call, possibly nothing.

use anyhow::Context;
use log::{debug, info};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub username: String,
    pub channel: String,
    pub text: String,
}

/// Polled source of chat messages, oldest first.
pub trait ChatSource {
    fn poll(&mut self) -> anyhow::Result<Vec<ChatMessage>>;
}

/// Parse `:user!user@user.tmi.twitch.tv PRIVMSG #channel :text`, with or without IRCv3 tags.
pub fn parse_privmsg(line: &str) -> Option<ChatMessage> {
    let line = match line.strip_prefix('@') {
        Some(tagged) => tagged.split_once(' ')?.1,
        None => line,
    };
    let rest = line.strip_prefix(':')?;
    let (prefix, rest) = rest.split_once(' ')?;
    let username = prefix.split('!').next()?;
    let rest = rest.strip_prefix("PRIVMSG ")?;
    let (channel, text) = rest.split_once(' ')?;
    let channel = channel.strip_prefix('#')?;
    let text = text.strip_prefix(':').unwrap_or(text);
    if username.is_empty() || channel.is_empty() {
        return None;
    }
    Some(ChatMessage {
        username: username.to_string(),
        channel: channel.to_string(),
        text: text.to_string(),
    })
}

/// Payload of a `PING` line, if it is one.
pub fn parse_ping(line: &str) -> Option<&str> {
    line.strip_prefix("PING").map(|payload| payload.trim_start().trim_start_matches(':'))
}

pub struct TwitchIrc {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TwitchIrc {
    pub fn connect(server: &str, channel: &str) -> anyhow::Result<Self> {
        let channel = channel.trim().trim_start_matches('#').to_lowercase();
        anyhow::ensure!(!channel.is_empty(), "no twitch channel configured");

        let mut stream = TcpStream::connect(server).with_context(|| format!("failed to connect to {server}"))?;
        let nick = format!("justinfan{}", fastrand::u32(10_000..100_000));
        write!(stream, "NICK {nick}\r\nJOIN #{channel}\r\n")?;
        stream.set_nonblocking(true)?;
        info!("Connected to #{channel} on {server} as {nick}");

        Ok(TwitchIrc {
            stream,
            buffer: Vec::new(),
        })
    }

    fn read_available(&mut self) -> anyhow::Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => anyhow::bail!("chat server closed the connection"),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("failed to read from chat server"),
            }
        }
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&line).trim_end_matches(['\r', '\n']).to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

impl ChatSource for TwitchIrc {
    fn poll(&mut self) -> anyhow::Result<Vec<ChatMessage>> {
        self.read_available()?;
        let mut messages = Vec::new();
        for line in self.take_lines() {
            if let Some(payload) = parse_ping(&line) {
                write!(self.stream, "PONG :{payload}\r\n")?;
                continue;
            }
            match parse_privmsg(&line) {
                Some(message) => messages.push(message),
                None => debug!("irc: {line}"),
            }
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let message = parse_privmsg(":alice!alice@alice.tmi.twitch.tv PRIVMSG #streamer :forward please").unwrap();
        assert_eq!(
            message,
            ChatMessage {
                username: "alice".into(),
                channel: "streamer".into(),
                text: "forward please".into(),
            }
        );
    }

    #[test]
    fn test_parse_privmsg_with_tags() {
        let line = "@badge-info=;color=#FF0000;display-name=Bob :bob!bob@bob.tmi.twitch.tv PRIVMSG #streamer :!dev undo";
        let message = parse_privmsg(line).unwrap();
        assert_eq!(message.username, "bob");
        assert_eq!(message.text, "!dev undo");
    }

    #[test]
    fn test_parse_other_lines() {
        assert!(parse_privmsg(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!").is_none());
        assert!(parse_privmsg(":bob!bob@bob.tmi.twitch.tv JOIN #streamer").is_none());
        assert!(parse_privmsg("bob PRIVMSG #streamer :hi").is_none());
        assert_eq!(parse_ping("PING :tmi.twitch.tv"), Some("tmi.twitch.tv"));
        assert_eq!(parse_ping(":x PRIVMSG #y :PING"), None);
    }
}
