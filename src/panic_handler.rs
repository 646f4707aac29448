//! Panic hook that reports panics through `tracing`
//!
//! Installed at the start of `main` so a panic in the relay is logged with
//! its location next to the rest of the run's diagnostics.

use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

static PANIC_HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the panic hook. Repeated calls are ignored.
///
/// # Example
/// ```no_run
/// use kafka_relay::panic_handler;
///
/// fn main() {
///     panic_handler::install_panic_hook();
///     // ... rest of application
/// }
/// ```
pub fn install_panic_hook() {
    if PANIC_HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        warn!("Panic hook already installed, skipping");
        return;
    }

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        handle_panic(panic_info);
        default_hook(panic_info);
    }));

    tracing::debug!("Panic hook installed");
}

fn handle_panic(panic_info: &PanicHookInfo<'_>) {
    let location = panic_info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "unknown location".to_string());

    error!(
        "PANIC at {} on thread {:?}: {}",
        location,
        std::thread::current().name().unwrap_or("unnamed"),
        panic_message(panic_info.payload())
    );

    if std::env::var("RUST_BACKTRACE").is_err() {
        warn!("Backtrace not available - set RUST_BACKTRACE=1 for detailed traces");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic message".to_string()
    }
}

pub fn is_panic_hook_installed() -> bool {
    PANIC_HOOK_INSTALLED.load(Ordering::SeqCst)
}
