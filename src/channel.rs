//! Request/response channel over a handshake connection.
//!
//! Client side ([`Channel`]) correlates responses with requests by sequence number,
//! a background thread reads incoming messages and hands each response to
//! the [`PendingResponse`] waiting for it. Server side ([`serve_requests`]) answers
//! requests one by one on the calling thread.

use crate::error::Error;
use crate::protocol::{Message, Request, Response};
use crate::tracer::FileTracer;
use crate::transport::{split_tcp, MessageReader, MessageWriter};
use crate::{sd_debug, sd_warn};
use serde_json::Value;
use std::collections::HashMap;
use std::io::BufRead;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct PendingRequests {
    closed: bool,
    waiters: HashMap<i64, mpsc::Sender<Response>>,
}

/// Client side of a handshake connection.
pub struct Channel {
    name: String,
    stream: TcpStream,
    writer: Arc<Mutex<MessageWriter<TcpStream>>>,
    seq: Arc<AtomicI64>,
    pending: Arc<Mutex<PendingRequests>>,
}

impl Channel {
    /// Connect to `addr` and start receiving responses.
    pub fn connect(
        addr: impl ToSocketAddrs,
        name: impl Into<String>,
        tracer: Option<FileTracer>,
    ) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)?;
        Self::start(stream, name, tracer)
    }

    /// Wrap an established connection and start receiving responses.
    pub fn start(
        stream: TcpStream,
        name: impl Into<String>,
        tracer: Option<FileTracer>,
    ) -> Result<Self, Error> {
        let name = name.into();
        let (reader, writer) = split_tcp(stream.try_clone()?, &name, tracer)?;

        let channel = Channel {
            name: name.clone(),
            stream,
            writer: Arc::new(Mutex::new(writer)),
            seq: Arc::new(AtomicI64::new(1)),
            pending: Arc::default(),
        };

        let pending = channel.pending.clone();
        let writer = channel.writer.clone();
        let seq = channel.seq.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || receive_loop(&name, reader, writer, seq, pending))?;

        Ok(channel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request. Response must be awaited with a returned [`PendingResponse`].
    pub fn send_request(
        &self,
        command: &str,
        arguments: Value,
    ) -> Result<PendingResponse, Error> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        {
            let mut pending = self.pending.lock().expect("pending requests lock poisoned");
            if pending.closed {
                return Err(Error::ConnectionLost);
            }
            pending.waiters.insert(seq, tx);
        }

        let request = Request::new(seq, command, arguments);
        let written = self
            .writer
            .lock()
            .expect("writer lock poisoned")
            .write_message(&request);
        if let Err(e) = written {
            self.pending
                .lock()
                .expect("pending requests lock poisoned")
                .waiters
                .remove(&seq);
            return Err(if e.is_connection_lost() {
                Error::ConnectionLost
            } else {
                e
            });
        }

        sd_debug!("{}: request {seq} `{command}` sent", self.name);
        Ok(PendingResponse {
            seq,
            command: command.to_string(),
            receiver: rx,
        })
    }

    /// Close connection, all pending requests fail with [`Error::ConnectionLost`].
    pub fn close(&self) {
        _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop<R: BufRead>(
    name: &str,
    mut reader: MessageReader<R>,
    writer: Arc<Mutex<MessageWriter<TcpStream>>>,
    seq: Arc<AtomicI64>,
    pending: Arc<Mutex<PendingRequests>>,
) {
    loop {
        let raw = match reader.read_message() {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(e) => {
                if !e.is_connection_lost() {
                    sd_warn!("{name}: receive failed: {e}");
                }
                break;
            }
        };

        match serde_json::from_value::<Message>(raw) {
            Ok(Message::Request {
                seq: req_seq,
                command,
                arguments,
            }) => {
                // client side doesn't serve requests
                let request = Request::new(req_seq, command, arguments);
                let response = Response::error(
                    seq.fetch_add(1, Ordering::SeqCst),
                    &request,
                    Error::UnsupportedRequest(request.command.clone()).to_string(),
                );
                let mut writer = writer.lock().expect("writer lock poisoned");
                if writer.write_message(&response).is_err() {
                    break;
                }
            }
            Ok(msg) => {
                let Some(response) = msg.into_response() else {
                    continue;
                };
                let waiter = pending
                    .lock()
                    .expect("pending requests lock poisoned")
                    .waiters
                    .remove(&response.request_seq);
                match waiter {
                    Some(waiter) => {
                        _ = waiter.send(response);
                    }
                    None => {
                        sd_warn!("{name}: unexpected response to request {}", response.request_seq)
                    }
                }
            }
            Err(e) => {
                sd_warn!("{name}: malformed message: {e}");
            }
        }
    }

    let mut pending = pending.lock().expect("pending requests lock poisoned");
    pending.closed = true;
    // dropping senders wakes up every waiter with a connection loss
    pending.waiters.clear();
    sd_debug!("{name}: connection closed");
}

/// Handle to a response that has not arrived yet.
pub struct PendingResponse {
    seq: i64,
    command: String,
    receiver: mpsc::Receiver<Response>,
}

impl PendingResponse {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    /// Block until response arrives or connection is dropped.
    pub fn wait_for_response(&self) -> Result<Value, Error> {
        let response = self.receiver.recv().map_err(|_| Error::ConnectionLost)?;
        self.unpack(response)
    }

    /// Like [`PendingResponse::wait_for_response`] but fails with [`Error::Timeout`]
    /// if response doesn't arrive in time. Waiting may be resumed after a timeout.
    pub fn wait_for_response_timeout(&self, timeout: Duration) -> Result<Value, Error> {
        let response = self.receiver.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => Error::Timeout(timeout),
            mpsc::RecvTimeoutError::Disconnected => Error::ConnectionLost,
        })?;
        self.unpack(response)
    }

    fn unpack(&self, response: Response) -> Result<Value, Error> {
        if response.success {
            return Ok(response.body.unwrap_or(Value::Null));
        }
        Err(Error::RequestFailed(response.message.unwrap_or_else(|| {
            format!("`{}` request failed", self.command)
        })))
    }
}

/// Answer requests arriving on `stream` until the peer disconnects.
///
/// `handler` runs on the calling thread and may block. Handler error is sent back
/// as an error response, connection stays alive.
pub fn serve_requests<F>(
    stream: TcpStream,
    name: &str,
    tracer: Option<FileTracer>,
    mut handler: F,
) -> Result<(), Error>
where
    F: FnMut(&Request) -> Result<Value, Error>,
{
    let (mut reader, mut writer) = split_tcp(stream, name, tracer)?;
    let mut seq = 1;

    while let Some(raw) = reader.read_message()? {
        let request = match serde_json::from_value::<Message>(raw) {
            Ok(msg) => match msg.into_request() {
                Some(request) => request,
                None => {
                    sd_warn!("{name}: unexpected response");
                    continue;
                }
            },
            Err(e) => {
                sd_warn!("{name}: malformed message: {e}");
                continue;
            }
        };

        let response = match handler(&request) {
            Ok(body) => Response::success(seq, &request, body),
            Err(e) => {
                sd_warn!("{name}: `{}` request failed: {e}", request.command);
                Response::error(seq, &request, e.to_string())
            }
        };
        seq += 1;
        writer.write_message(&response)?;
    }

    Ok(())
}
