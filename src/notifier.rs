//! Subprocess side of the handshake.
//!
//! A debugged subprocess announces itself to the root process and blocks until
//! root decides whether a debugger will connect to it.

use crate::channel::Channel;
use crate::engine::DebugEngine;
use crate::error::Error;
use crate::options::Options;
use crate::protocol::{AnnouncementResponse, SubprocessAnnouncement, SUBPROCESS_ANNOUNCEMENT};
use crate::tracer::FileTracer;
use crate::{sd_debug, sd_error, sd_info};

/// Announce current process to the root process and wait for the decision.
///
/// If no incoming connection is expected, engine is released to run user code
/// as soon as it is initialized. Otherwise the connection acceptance path is
/// responsible for it.
///
/// # Arguments
///
/// * `options`: launch options, must contain parent id and root listener port
/// * `port`: port for an incoming debugger connection, [`crate::protocol::NO_INCOMING_PORT`] if none
/// * `engine`: local debugging engine
/// * `tracer`: optional traffic tracer
pub fn notify_root(
    options: &Options,
    port: u16,
    engine: &dyn DebugEngine,
    tracer: Option<FileTracer>,
) -> Result<AnnouncementResponse, Error> {
    let parent_process_id = options
        .subprocess_of
        .ok_or(Error::NotASubprocess("parent process id"))?;
    let notify_port = options
        .subprocess_notify
        .ok_or(Error::NotASubprocess("root notification port"))?;
    let process_id = std::process::id();

    sd_debug!("subprocess {process_id} notifying root process at port {notify_port}");
    let channel = Channel::connect(
        ("localhost", notify_port),
        format!("SubprocessNotify-{process_id}"),
        tracer,
    )?;

    let announcement = SubprocessAnnouncement {
        parent_process_id,
        process_id,
        port,
    };
    let pending = channel.send_request(SUBPROCESS_ANNOUNCEMENT, serde_json::to_value(announcement)?)?;
    let body = match options.handshake_timeout {
        Some(timeout) => pending.wait_for_response_timeout(timeout)?,
        None => pending.wait_for_response()?,
    };
    let response: AnnouncementResponse = serde_json::from_value(body)?;
    sd_debug!("root decision: {response:?}");

    if !response.incoming_connection {
        engine.wait_initialized();
        engine.set_ready_to_run();
        sd_info!("no incoming debugger connection expected, run user code");
    }

    Ok(response)
}

/// Like [`notify_root`] but any failure terminates current process with a zero
/// exit code, so the user program is never affected by a failed handshake.
pub fn notify_root_or_exit(
    options: &Options,
    port: u16,
    engine: &dyn DebugEngine,
    tracer: Option<FileTracer>,
) -> AnnouncementResponse {
    match notify_root(options, port, engine, tracer) {
        Ok(response) => response,
        Err(e) => {
            sd_error!("subprocess notification failed: {e}");
            eprintln!("Failed to send subprocess notification; exiting: {e}");
            std::process::exit(0);
        }
    }
}
