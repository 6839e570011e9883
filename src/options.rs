use crate::error::Error;
use std::sync::OnceLock;
use std::time::Duration;

/// Multiprocess launch configuration of the current process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Debug spawned interpreter subprocesses too.
    pub multiprocess: bool,
    /// Id of the parent process, set if this process is a debugged subprocess.
    pub subprocess_of: Option<u32>,
    /// Port of the root process announcement listener.
    pub subprocess_notify: Option<u16>,
    /// Limit for waiting on the root decision, wait forever if not set.
    pub handshake_timeout: Option<Duration>,
}

impl Options {
    /// Return true if this process must announce itself to the root process.
    pub fn is_subprocess(&self) -> bool {
        self.subprocess_of.is_some() && self.subprocess_notify.is_some()
    }
}

/// Read-only launch options (set only once, at process start).
static OPTIONS: OnceLock<Options> = OnceLock::new();

/// Set launch options, fails if options already set.
pub fn set(options: Options) -> Result<(), Error> {
    OPTIONS.set(options).map_err(|_| Error::OptionsAlreadySet)
}

/// Return launch options, default (non-multiprocess root) options if never set.
pub fn current() -> &'static Options {
    OPTIONS.get_or_init(Options::default)
}
