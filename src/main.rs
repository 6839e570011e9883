//! subdebug - multiprocess debugging helper.
//!
//! Runs either side of the subprocess handshake and patches interpreter command lines.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use subdebug::engine::EngineState;
use subdebug::launch::Launcher;
use subdebug::listener::SubprocessListener;
use subdebug::notifier::notify_root_or_exit;
use subdebug::options::{self, Options};
use subdebug::patch::PatchContext;
use subdebug::protocol::NO_INCOMING_PORT;
use subdebug::queue::AnnouncementQueue;
use subdebug::tracer::FileTracer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Debug spawned interpreter subprocesses too.
    #[clap(long, env = "SUBDEBUG_MULTIPROCESS")]
    multiprocess: bool,

    /// Id of the parent process (set for debugged subprocesses).
    #[clap(long, env = "SUBDEBUG_SUBPROCESS_OF")]
    subprocess_of: Option<u32>,

    /// Port of the root process announcement listener.
    #[clap(long, env = "SUBDEBUG_SUBPROCESS_NOTIFY")]
    subprocess_notify: Option<u16>,

    /// Limit for waiting on the root decision, in milliseconds.
    #[clap(long)]
    handshake_timeout_ms: Option<u64>,

    /// File receiving handshake traffic traces, written only with --trace.
    /// Diagnostics go to stderr, filtered with RUST_LOG.
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Trace handshake traffic into the log file.
    /// Requires --log-file.
    #[clap(long)]
    trace: bool,

    /// Silence handshake and listener logging.
    #[clap(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Listen for subprocess announcements and answer them.
    Root {
        /// Tell subprocesses to wait for an incoming debugger connection.
        #[clap(long)]
        expect_connection: bool,

        /// Request that started the debug session (JSON), attached to every announcement.
        #[clap(long)]
        start_request: Option<String>,
    },
    /// Announce current process to the root process.
    Notify {
        /// Port for an incoming debugger connection.
        #[clap(long, default_value_t = NO_INCOMING_PORT)]
        port: u16,
    },
    /// Print a patched interpreter command line.
    Patch {
        #[clap(last = true, required = true)]
        args: Vec<String>,
    },
    /// Spawn an interpreter with a patched command line.
    Spawn {
        #[clap(last = true, required = true)]
        args: Vec<String>,
    },
}

impl Args {
    fn options(&self) -> Options {
        Options {
            multiprocess: self.multiprocess,
            subprocess_of: self.subprocess_of,
            subprocess_notify: self.subprocess_notify,
            handshake_timeout: self.handshake_timeout_ms.map(Duration::from_millis),
        }
    }

    fn tracer(&self) -> anyhow::Result<Option<FileTracer>> {
        let tracer = match (&self.log_file, self.trace) {
            (Some(path), true) => Some(
                FileTracer::new(path)
                    .with_context(|| format!("open log file {}", path.display()))?,
            ),
            (None, true) => {
                warn!(target: subdebug::log::TARGET, "--trace requires --log-file; tracing disabled");
                None
            }
            _ => None,
        };
        Ok(tracer)
    }
}

fn main() -> anyhow::Result<()> {
    subdebug::log::init("info");

    let args = Args::parse();
    if args.quiet {
        subdebug::log::disable();
    }
    options::set(args.options())?;
    let options = options::current();
    let tracer = args.tracer()?;

    match args.command {
        Cmd::Root {
            expect_connection,
            start_request,
        } => {
            let start_request = match start_request {
                Some(raw) => serde_json::from_str(&raw).context("invalid start request")?,
                None => Value::Null,
            };
            run_root(start_request, expect_connection, tracer)
        }
        Cmd::Notify { port } => {
            if !options.is_subprocess() {
                bail!("--subprocess-of and --subprocess-notify are required");
            }
            let engine = EngineState::new();
            engine.initialized();
            let response = notify_root_or_exit(options, port, &engine, tracer);
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        Cmd::Patch { args } => {
            let launcher = Launcher::new(PatchContext::current(options, None));
            println!("{}", launcher.command_line(&args));
            Ok(())
        }
        Cmd::Spawn { args } => {
            let launcher = Launcher::new(PatchContext::current(options, None));
            let env: HashMap<String, String> = std::env::vars().collect();
            let status = launcher
                .spawn(&args, &env)
                .context("spawn subprocess")?
                .wait()?;
            std::process::exit(status.code().unwrap_or(1));
        }
    }
}

/// Minimal session manager: answer every announcement until Ctrl-C.
fn run_root(
    start_request: Value,
    expect_connection: bool,
    tracer: Option<FileTracer>,
) -> anyhow::Result<()> {
    let queue = Arc::new(AnnouncementQueue::new());
    let listener = SubprocessListener::start(queue.clone(), start_request, tracer)
        .context("start subprocess listener")?;
    let port = listener.port().context("listener stopped")?;
    println!("{port}");

    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let interrupted = interrupted.clone();
        move || interrupted.store(true, Ordering::SeqCst)
    })
    .context("set Ctrl-C handler")?;

    while !interrupted.load(Ordering::SeqCst) {
        let Some(mut item) = queue.dequeue_timeout(Duration::from_millis(200)) else {
            continue;
        };
        let announcement = &item.announcement;
        info!(
            target: subdebug::log::TARGET,
            "subprocess {} (parent {}, root {}) announced, port {}",
            announcement.subprocess.process_id,
            announcement.subprocess.parent_process_id,
            announcement.root_process_id,
            announcement.subprocess.port
        );
        item.response.incoming_connection =
            expect_connection && announcement.subprocess.port != NO_INCOMING_PORT;
        queue.mark_done(item);
    }

    listener.stop();
    Ok(())
}
