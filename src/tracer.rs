use crate::error::Error;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Traffic direction relative to the local side of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn arrow(self) -> &'static str {
        match self {
            Direction::Sent => "->",
            Direction::Received => "<-",
        }
    }
}

/// Append-only file tracer for handshake traffic.
///
/// Clones share the same file, lines from different channels never interleave.
#[derive(Clone)]
pub struct FileTracer {
    file: Arc<Mutex<File>>,
}

impl FileTracer {
    pub fn new(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn message(&self, channel: &str, direction: Direction, payload: &[u8]) {
        self.line(&format!(
            "[{channel}] {} {}",
            direction.arrow(),
            String::from_utf8_lossy(payload)
        ));
    }

    pub fn line(&self, text: &str) {
        if let Ok(mut file) = self.file.lock() {
            _ = writeln!(file, "{text}");
        }
    }
}
