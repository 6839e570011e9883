//! Handshake transport.
//! JSON messages with Content-Length framing over a TCP connection.

use crate::error::Error;
use crate::tracer::{Direction, FileTracer};
use serde::Serialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

/// Upper bound of a message body.
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;
/// Upper bound of a single header line, including line terminator.
const MAX_HEADER_LINE_LEN: usize = 1024;
/// Upper bound of header lines in one message.
const MAX_HEADERS: usize = 16;

/// Reading half of a transport.
pub struct MessageReader<R: BufRead> {
    reader: R,
    name: String,
    tracer: Option<FileTracer>,
}

impl<R: BufRead> MessageReader<R> {
    pub fn new(reader: R, name: impl Into<String>, tracer: Option<FileTracer>) -> Self {
        Self {
            reader,
            name: name.into(),
            tracer,
        }
    }

    /// Read a single message. Return `Ok(None)` if peer closed connection between messages.
    pub fn read_message(&mut self) -> Result<Option<Value>, Error> {
        let mut content_length: Option<usize> = None;
        for header_n in 0.. {
            if header_n > MAX_HEADERS {
                return Err(Error::MalformedMessage("too many headers".into()));
            }

            let mut line = String::new();
            let read_n = (&mut self.reader)
                .take(MAX_HEADER_LINE_LEN as u64)
                .read_line(&mut line)?;
            if read_n == 0 {
                if header_n == 0 {
                    return Ok(None);
                }
                return Err(Error::ConnectionLost);
            }
            if read_n == MAX_HEADER_LINE_LEN && !line.ends_with('\n') {
                return Err(Error::MalformedMessage("header line too long".into()));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(v) = line.strip_prefix("Content-Length:") {
                let len = v
                    .trim()
                    .parse()
                    .map_err(|_| Error::MalformedMessage(format!("bad header `{line}`")))?;
                content_length = Some(len);
            }
        }

        let len = content_length
            .ok_or_else(|| Error::MalformedMessage("missing Content-Length header".into()))?;
        if len > MAX_MESSAGE_LEN {
            return Err(Error::MalformedMessage(format!(
                "message of {len} bytes exceeds limit of {MAX_MESSAGE_LEN} bytes"
            )));
        }
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::ConnectionLost
            } else {
                Error::IO(e)
            }
        })?;
        if let Some(tracer) = &self.tracer {
            tracer.message(&self.name, Direction::Received, &buf);
        }

        let msg = serde_json::from_slice(&buf)?;
        Ok(Some(msg))
    }
}

/// Writing half of a transport.
pub struct MessageWriter<W: Write> {
    writer: W,
    name: String,
    tracer: Option<FileTracer>,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(writer: W, name: impl Into<String>, tracer: Option<FileTracer>) -> Self {
        Self {
            writer,
            name: name.into(),
            tracer,
        }
    }

    pub fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), Error> {
        let payload = serde_json::to_vec(message)?;
        if let Some(tracer) = &self.tracer {
            tracer.message(&self.name, Direction::Sent, &payload);
        }
        write!(self.writer, "Content-Length: {}\r\n\r\n", payload.len())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Split a connected socket into reading and writing halves.
pub fn split_tcp(
    stream: TcpStream,
    name: &str,
    tracer: Option<FileTracer>,
) -> Result<(MessageReader<BufReader<TcpStream>>, MessageWriter<TcpStream>), Error> {
    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    Ok((
        MessageReader::new(reader, name, tracer.clone()),
        MessageWriter::new(stream, name, tracer),
    ))
}
