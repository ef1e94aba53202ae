//! Polling-based interrupt handling (lock-free).
//!
//! Handlers only record that an interrupt arrived; the monitor loop checks
//! the flag between sleep slices and acts at iteration boundaries.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Signal number (Unix) or console control code + 1 (Windows); 0 = none.
static RECEIVED: AtomicUsize = AtomicUsize::new(0);

#[cfg(unix)]
pub fn install_handlers() -> std::io::Result<()> {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn handler(sig: i32) {
        RECEIVED.store(sig as usize, Ordering::SeqCst);
    }

    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        unsafe { signal::sigaction(sig, &action) }.map_err(|e| {
            std::io::Error::other(format!("failed to register {sig} handler: {e}"))
        })?;
    }
    Ok(())
}

#[cfg(windows)]
pub fn install_handlers() -> std::io::Result<()> {
    use ::windows::Win32::System::Console::SetConsoleCtrlHandler;
    use ::windows::core::BOOL;

    unsafe extern "system" fn handler(ctrl_type: u32) -> BOOL {
        RECEIVED.store(ctrl_type as usize + 1, Ordering::SeqCst);
        BOOL::from(true)
    }

    unsafe { SetConsoleCtrlHandler(Some(handler), true) }
        .map_err(|e| std::io::Error::other(format!("failed to register console handler: {e}")))
}

/// Non-blocking; stays `true` once an interrupt has arrived.
pub fn shutdown_requested() -> bool {
    RECEIVED.load(Ordering::Acquire) != 0
}

/// Human-readable name of the interrupt, for the exit log line.
pub fn describe() -> Option<String> {
    let val = RECEIVED.load(Ordering::Acquire);
    if val == 0 {
        return None;
    }
    #[cfg(unix)]
    {
        Some(match nix::sys::signal::Signal::try_from(val as i32) {
            Ok(sig) => sig.to_string(),
            Err(_) => format!("signal {val}"),
        })
    }
    #[cfg(windows)]
    {
        Some(format!("console control event {}", val - 1))
    }
}
