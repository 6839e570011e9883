//! Multiprocess debugging support.
//!
//! A root process runs a [`listener::SubprocessListener`], every debugged descendant
//! announces itself with [`notifier::notify_root`] and waits until a session manager
//! takes a decision from the [`queue::AnnouncementQueue`]. Before an interpreter
//! subprocess is spawned its command line is rewritten with [`patch::patch_args`]
//! so that it starts under the debugger too.

pub mod channel;
pub mod engine;
pub mod error;
pub mod launch;
pub mod listener;
pub mod log;
pub mod notifier;
pub mod options;
pub mod patch;
pub mod protocol;
pub mod queue;
pub mod quote;
pub mod tracer;
pub mod transport;

pub use error::Error;
