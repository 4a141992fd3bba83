//! STOMP text framing
//!
//! `COMMAND\nheader:value\n...\n\nBODY\0`

use std::fmt;
use std::str::FromStr;

use crate::error::CloudError;

const NULL: char = '\0';

/// Frame commands used by the delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Send,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SEND" => Ok(Command::Send),
            "DISCONNECT" => Ok(Command::Disconnect),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(CloudError::Frame(format!("unknown command {other:?}"))),
        }
    }
}

/// One protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self { command, headers: Vec::new(), body: String::new() }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Handshake frame
    pub fn connect(host: &str, port: u16) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", "1.0,1.1,1.2")
            .header("host", format!("{host}:{port}"))
    }

    /// JSON data frame
    pub fn send(destination: &str, body: String) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json; charset=utf-8")
            .header("content-length", body.len().to_string())
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NULL);
        out
    }

    /// Parse inbound text; `Ok(None)` for a heartbeat
    pub fn parse(text: &str) -> Result<Option<Self>, CloudError> {
        let text = text.trim_start_matches(['\r', '\n']);
        let text = text.strip_suffix(NULL).unwrap_or(text);
        if text.trim().is_empty() {
            return Ok(None);
        }

        let (head, body) = match text.find("\n\n") {
            Some(idx) => (&text[..idx], &text[idx + 2..]),
            None => (text, ""),
        };

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(str::trim)
            .ok_or_else(|| CloudError::Frame("empty frame".into()))?
            .parse::<Command>()?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CloudError::Frame(format!("bad header line {line:?}")))?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Some(Self { command, headers, body: body.to_string() }))
    }
}
