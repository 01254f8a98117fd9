//! Line protocol codec.
//!
//! Requests are single `\n`-terminated lines:
//!
//! ```text
//! CREATE <queue> <max_size> <ttl_seconds>
//! SEND   <queue> <body, rest of line>
//! OPEN   <queue>
//! ```
//!
//! Responses are exactly one of `OK`, `ERROR` or `INVALID COMMAND`. Anything
//! that does not match a request form parses to [`Command::Invalid`].

use std::fmt;

use crate::core::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        queue: String,
        capacity: i64,
        ttl_secs: i64,
    },
    Send {
        queue: String,
        body: String,
    },
    Open {
        queue: String,
    },
    Invalid,
}

pub fn new_create(queue: impl Into<String>, capacity: i64, ttl_secs: i64) -> Command {
    Command::Create {
        queue: queue.into(),
        capacity,
        ttl_secs,
    }
}

pub fn new_send(queue: impl Into<String>, body: impl Into<String>) -> Command {
    Command::Send {
        queue: queue.into(),
        body: body.into(),
    }
}

pub fn new_open(queue: impl Into<String>) -> Command {
    Command::Open {
        queue: queue.into(),
    }
}

/// Parses one request line. A trailing `\n` and `\r` are ignored.
pub fn parse_command(line: &str) -> Command {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let Some(split) = line.find(char::is_whitespace) else {
        return Command::Invalid;
    };
    let (keyword, rest) = line.split_at(split);

    let parsed = match keyword {
        "CREATE" => parse_create(rest),
        "SEND" => parse_send(rest),
        "OPEN" => parse_open(rest),
        _ => None,
    };
    parsed.unwrap_or(Command::Invalid)
}

fn parse_create(rest: &str) -> Option<Command> {
    let mut tokens = rest.split_whitespace();
    let queue = tokens.next()?;
    let capacity = tokens.next()?.parse::<i64>().ok()?;
    let ttl_secs = tokens.next()?.parse::<i64>().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(new_create(queue, capacity, ttl_secs))
}

fn parse_send(rest: &str) -> Option<Command> {
    let (queue, body) = next_token(rest)?;
    let body = body.trim_start();
    if body.is_empty() {
        return None;
    }
    Some(new_send(queue, body))
}

fn parse_open(rest: &str) -> Option<Command> {
    let (queue, tail) = next_token(rest)?;
    if !tail.trim().is_empty() {
        return None;
    }
    Some(new_open(queue))
}

/// Splits off the first whitespace-delimited token, returning it and the
/// untouched remainder.
fn next_token(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    Some(match s.find(char::is_whitespace) {
        Some(i) => s.split_at(i),
        None => (s, ""),
    })
}

/// Renders a request as a newline-terminated line (client side).
pub fn encode_command(cmd: &Command) -> String {
    match cmd {
        Command::Create {
            queue,
            capacity,
            ttl_secs,
        } => format!("CREATE {queue} {capacity} {ttl_secs}\n"),
        Command::Send { queue, body } => format!("SEND {queue} {body}\n"),
        Command::Open { queue } => format!("OPEN {queue}\n"),
        Command::Invalid => "\n".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Error,
    InvalidCommand,
}

impl Response {
    pub const fn as_line(&self) -> &'static str {
        match self {
            Response::Ok => "OK\n",
            Response::Error => "ERROR\n",
            Response::InvalidCommand => "INVALID COMMAND\n",
        }
    }

    /// Recognises a response line, with or without its terminator.
    pub fn parse(line: &str) -> Option<Response> {
        match line.trim_end_matches(['\n', '\r']) {
            "OK" => Some(Response::Ok),
            "ERROR" => Some(Response::Error),
            "INVALID COMMAND" => Some(Response::InvalidCommand),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_line().trim_end())
    }
}

impl<T> From<Result<T, StoreError>> for Response {
    fn from(res: Result<T, StoreError>) -> Self {
        match res {
            Ok(_) => Response::Ok,
            Err(_) => Response::Error,
        }
    }
}
