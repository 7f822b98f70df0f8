//! Operator interrupt handling.
//!
//! An interrupt never tears down a backend call halfway: the first SIGINT,
//! SIGTERM or SIGHUP only sets a `CancelToken`, the in-flight attempt runs to
//! completion and the run stops before its next request. A second signal
//! exits immediately with `128 + signo`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Shared run-level cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; returns true if it was already requested
    pub fn cancel(&self) -> bool {
        self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Human-readable name for the signals we handle
fn signal_name(sig: i32) -> &'static str {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    match sig {
        SIGINT => "SIGINT",
        SIGTERM => "SIGTERM",
        SIGHUP => "SIGHUP",
        _ => "UNKNOWN",
    }
}

/// Initialize global signal handlers for graceful cancellation
/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGHUP
/// Call this once at program start
pub fn init_signal_handlers(token: CancelToken) -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            if token.cancel() {
                warn!("Received {} again, exiting immediately", signal_name(sig));
                std::process::exit(128 + sig);
            }
            info!(
                "Received {} signal, finishing the current attempt before stopping",
                signal_name(sig)
            );
        }
    });

    Ok(())
}
