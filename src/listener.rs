//! Root process listener for subprocess announcements.
//!
//! Every accepted connection is served on its own thread. An announcement is
//! enriched with the root process information, put into the [`AnnouncementQueue`]
//! and answered only after the queue consumer marks it done.

use crate::channel::serve_requests;
use crate::error::Error;
use crate::protocol::{
    Announcement, Request, SubprocessAnnouncement, SUBPROCESS_ANNOUNCEMENT,
};
use crate::queue::{AnnouncementQueue, PendingAnnouncement};
use crate::tracer::FileTracer;
use crate::{sd_debug, sd_info, sd_warn};
use nix::sys::socket::{shutdown, Shutdown};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

const THREAD_NAME: &str = "SubprocessListener";

/// Root side state shared by connection handlers.
struct RootContext {
    root_process_id: u32,
    root_start_request: RwLock<Value>,
    queue: Arc<AnnouncementQueue>,
    tracer: Option<FileTracer>,
}

impl RootContext {
    fn handle_request(&self, request: &Request) -> Result<Value, Error> {
        if request.command != SUBPROCESS_ANNOUNCEMENT {
            return Err(Error::UnsupportedRequest(request.command.clone()));
        }

        let subprocess: SubprocessAnnouncement =
            serde_json::from_value(request.arguments.clone())
                .map_err(Error::MalformedAnnouncement)?;
        // a descendant knows only about itself and its immediate parent
        let announcement = Announcement::enrich(
            subprocess,
            self.root_process_id,
            self.root_start_request
                .read()
                .expect("root start request lock poisoned")
                .clone(),
        );
        sd_debug!("subprocess announcement: {announcement:?}");

        let (item, completion) = PendingAnnouncement::new(announcement);
        self.queue.enqueue(item);
        let response = completion.wait()?;
        Ok(serde_json::to_value(response)?)
    }

    fn handle_connection(&self, stream: TcpStream, name: &str) {
        match serve_requests(stream, name, self.tracer.clone(), |req| {
            self.handle_request(req)
        }) {
            Ok(()) => sd_debug!("{name}: subprocess disconnected"),
            Err(e) if e.is_connection_lost() => {
                sd_debug!("{name}: subprocess connection lost")
            }
            Err(e) => sd_warn!("{name}: {e}"),
        }
    }
}

/// Listener of subprocess announcements, runs in the root process.
///
/// Stopped with [`SubprocessListener::stop`] or when dropped.
pub struct SubprocessListener {
    socket: TcpListener,
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    context: Arc<RootContext>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SubprocessListener {
    /// Bind a listener to an ephemeral localhost port and start accepting descendants.
    ///
    /// # Arguments
    ///
    /// * `queue`: destination of incoming announcements
    /// * `root_start_request`: request that started debugging of this process, passed verbatim
    /// * `tracer`: optional traffic tracer
    pub fn start(
        queue: Arc<AnnouncementQueue>,
        root_start_request: Value,
        tracer: Option<FileTracer>,
    ) -> Result<Self, Error> {
        let socket = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let addr = socket.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let context = Arc::new(RootContext {
            root_process_id: std::process::id(),
            root_start_request: RwLock::new(root_start_request),
            queue,
            tracer,
        });

        let accept_thread = thread::Builder::new().name(THREAD_NAME.to_string()).spawn({
            let socket = socket.try_clone()?;
            let running = running.clone();
            let context = context.clone();
            move || accept_loop(socket, running, context)
        })?;

        sd_info!("listening for subprocesses on {addr}");
        Ok(Self {
            socket,
            addr,
            running,
            context,
            accept_thread: Mutex::new(Some(accept_thread)),
        })
    }

    /// Return listener port, `None` if listener is stopped.
    pub fn port(&self) -> Option<u16> {
        self.is_running().then_some(self.addr.port())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Replace the request attached to announcements queued from now on.
    pub fn set_root_start_request(&self, request: Value) {
        *self
            .context
            .root_start_request
            .write()
            .expect("root start request lock poisoned") = request;
    }

    /// Stop accepting new descendants. Connections already accepted are served
    /// until they end. Calling more than once has no effect.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Err(e) = shutdown(self.socket.as_raw_fd(), Shutdown::Both) {
            sd_debug!("listener socket shutdown: {e}, wake up accept loop");
            _ = TcpStream::connect(self.addr);
        }

        let accept_thread = self
            .accept_thread
            .lock()
            .expect("accept thread lock poisoned")
            .take();
        if let Some(handle) = accept_thread {
            _ = handle.join();
        }
        sd_info!("stop listening for subprocesses on {}", self.addr);
    }
}

impl Drop for SubprocessListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(socket: TcpListener, running: Arc<AtomicBool>, context: Arc<RootContext>) {
    for n in 1.. {
        let stream = match socket.accept() {
            Ok((stream, peer)) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                sd_debug!("subprocess connected from {peer}");
                stream
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    sd_warn!("accept failed, listener stopped: {e}");
                }
                break;
            }
        };

        let name = format!("{THREAD_NAME}-{n}");
        let context = context.clone();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || context.handle_connection(stream, &name));
        if let Err(e) = spawned {
            sd_warn!("failed to start connection handler: {e}");
        }
    }
    running.store(false, Ordering::SeqCst);
}
