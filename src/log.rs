//! Library logging.
//!
//! Library code logs through `sd_*` macros so an embedding process that owns
//! stderr can silence it with [`disable`].

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

#[inline(always)]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst)
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst)
}

/// Log target of every handshake and listener record.
pub const TARGET: &str = "multiproc";

/// Install `env_logger` as a global logger, filtering is controlled with `RUST_LOG`.
pub fn init(default_filter: &str) {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_err()
    {
        crate::sd_debug!("logger already installed");
    }
}

/// Log a record under [`TARGET`] unless library logging is disabled.
#[macro_export]
macro_rules! sd_log {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::is_enabled() {
            ::log::log!(target: $crate::log::TARGET, $level, $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! sd_debug {
    ($($arg:tt)+) => { $crate::sd_log!(::log::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! sd_info {
    ($($arg:tt)+) => { $crate::sd_log!(::log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! sd_warn {
    ($($arg:tt)+) => { $crate::sd_log!(::log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! sd_error {
    ($($arg:tt)+) => { $crate::sd_log!(::log::Level::Error, $($arg)+) };
}
