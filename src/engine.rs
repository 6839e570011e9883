use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Interval of readiness polling for engines that can't signal readiness.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Local debugging engine as seen by the child notifier.
pub trait DebugEngine: Send + Sync {
    /// Return `None` while engine is not initialized, otherwise the state of
    /// the ready-to-run flag.
    fn is_ready(&self) -> Option<bool>;

    /// Let user code run without waiting for an incoming debugger connection.
    fn set_ready_to_run(&self);

    /// Block until engine is initialized.
    ///
    /// Default implementation polls [`DebugEngine::is_ready`] with
    /// [`READINESS_POLL_INTERVAL`].
    fn wait_initialized(&self) {
        while self.is_ready().is_none() {
            thread::sleep(READINESS_POLL_INTERVAL);
        }
    }
}

/// Engine state with explicit initialization signal.
#[derive(Default)]
pub struct EngineState {
    ready: Mutex<Option<bool>>,
    changed: Condvar,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark engine as initialized, user code is not allowed to run yet.
    pub fn initialized(&self) {
        let mut ready = self.ready.lock().expect("engine state lock poisoned");
        if ready.is_none() {
            *ready = Some(false);
        }
        self.changed.notify_all();
    }

    /// Block until user code is allowed to run or timeout expires.
    /// Return true if user code is allowed to run.
    pub fn wait_ready_to_run(&self, timeout: Duration) -> bool {
        let ready = self.ready.lock().expect("engine state lock poisoned");
        let (ready, _) = self
            .changed
            .wait_timeout_while(ready, timeout, |ready| *ready != Some(true))
            .expect("engine state lock poisoned");
        *ready == Some(true)
    }
}

impl DebugEngine for EngineState {
    fn is_ready(&self) -> Option<bool> {
        *self.ready.lock().expect("engine state lock poisoned")
    }

    fn set_ready_to_run(&self) {
        *self.ready.lock().expect("engine state lock poisoned") = Some(true);
        self.changed.notify_all();
    }

    fn wait_initialized(&self) {
        let ready = self.ready.lock().expect("engine state lock poisoned");
        let ready = self
            .changed
            .wait_while(ready, |ready| ready.is_none())
            .expect("engine state lock poisoned");
        drop(ready);
    }
}
