//! External events trace reader
//!
//! One event per line, whitespace separated:
//!
//! ```text
//! # comment
//! 12.5 CONN n3 n7 up
//! 40   CONN 3 7 down
//! 15   C M1 n3 n9 5000
//! ```
//!
//! Host and message references are matched on their trailing digits, so
//! `n3`, `p3` and `3` all name host 3.

use std::path::Path;

use ferry_core::{MessageId, NodeId, SimTime};
use thiserror::Error;

/// A trace line that could not be read
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("line {line}: time {time} is before the previous event")]
    OutOfOrder { line: usize, time: f64 },

    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
}

/// One timed event
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Connection {
        time: SimTime,
        a: NodeId,
        b: NodeId,
        up: bool,
    },
    Create {
        time: SimTime,
        id: MessageId,
        from: NodeId,
        to: NodeId,
        size: u64,
    },
}

impl TraceEvent {
    pub fn time(&self) -> SimTime {
        match self {
            Self::Connection { time, .. } | Self::Create { time, .. } => *time,
        }
    }
}

/// Trailing-digit id parse shared by hosts and messages
fn trailing_number(token: &str) -> Option<u64> {
    let prefix = token.trim_end_matches(|c: char| c.is_ascii_digit());
    token[prefix.len()..].parse().ok()
}

fn malformed(line: usize, reason: impl Into<String>) -> TraceError {
    TraceError::Malformed {
        line,
        reason: reason.into(),
    }
}

fn host(line: usize, token: &str) -> Result<NodeId, TraceError> {
    token
        .parse()
        .map_err(|_| malformed(line, format!("bad host reference {token:?}")))
}

/// Parse one line; blank lines and comments give `None`
pub fn parse_line(line: usize, text: &str) -> Result<Option<TraceEvent>, TraceError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = text.split_whitespace().collect();
    let time: f64 = fields[0]
        .parse()
        .map_err(|_| malformed(line, format!("bad time {:?}", fields[0])))?;
    let time = SimTime::from_secs(time);

    match fields.get(1).copied() {
        Some("CONN") => {
            let [_, _, a, b, state] = fields.as_slice() else {
                return Err(malformed(line, "expected: time CONN a b up|down"));
            };
            let up = match state.to_ascii_lowercase().as_str() {
                "up" => true,
                "down" => false,
                other => return Err(malformed(line, format!("bad link state {other:?}"))),
            };
            Ok(Some(TraceEvent::Connection {
                time,
                a: host(line, a)?,
                b: host(line, b)?,
                up,
            }))
        }
        Some("C") => {
            // A trailing response size is accepted and ignored
            let [_, _, id, from, to, size, ..] = fields.as_slice() else {
                return Err(malformed(line, "expected: time C id from to size"));
            };
            let id = trailing_number(id)
                .ok_or_else(|| malformed(line, format!("bad message id {id:?}")))?;
            let size = size
                .parse()
                .map_err(|_| malformed(line, format!("bad size {size:?}")))?;
            Ok(Some(TraceEvent::Create {
                time,
                id: MessageId(id),
                from: host(line, from)?,
                to: host(line, to)?,
                size,
            }))
        }
        Some(other) => Err(malformed(line, format!("unknown event {other:?}"))),
        None => Err(malformed(line, "missing event type")),
    }
}

/// Parse a whole trace, requiring non-decreasing times
pub fn parse(text: &str) -> Result<Vec<TraceEvent>, TraceError> {
    let mut events: Vec<TraceEvent> = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let Some(event) = parse_line(i + 1, raw)? else {
            continue;
        };
        if let Some(last) = events.last()
            && event.time() < last.time()
        {
            return Err(TraceError::OutOfOrder {
                line: i + 1,
                time: event.time().as_secs(),
            });
        }
        events.push(event);
    }
    Ok(events)
}

/// Read and parse a trace file
pub fn read(path: &Path) -> Result<Vec<TraceEvent>, TraceError> {
    parse(&std::fs::read_to_string(path)?)
}
