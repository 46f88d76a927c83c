//! Operator interrupt tracking.
//!
//! Termination signals are latched into a shared flag instead of killing the
//! process outright, so an in-flight orchestrator call can terminate and reap
//! its child before the run exits. A second SIGINT while the flag is already
//! raised terminates immediately.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};

/// Exit status used when a run is cut short by a signal.
pub const INTERRUPTED_EXIT_CODE: u8 = 130;

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared flag raised when the operator asks the run to stop.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Registers the termination signal set and returns the latched flag.
    pub fn install() -> Result<Self, io::Error> {
        let flag = Self::default();
        signal_hook::flag::register_conditional_shutdown(
            SIGINT,
            i32::from(INTERRUPTED_EXIT_CODE),
            Arc::clone(&flag.0),
        )?;
        for signal in [SIGINT, SIGTERM, SIGQUIT, SIGHUP] {
            signal_hook::flag::register(signal, Arc::clone(&flag.0))?;
        }
        Ok(flag)
    }

    /// Whether an interrupt has been received.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raises the flag programmatically.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Sleeps for `duration`, waking early on interrupt.
    ///
    /// Returns `false` when the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_raised() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
