#![deny(missing_docs)]
//! Shared logging utilities for the convo workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! a per-thread worker label that prefixes every line, and a minimal test
//! initializer for the global logger.

use std::cell::RefCell;

thread_local! {
    /// Thread-local label of the worker that owns this thread, e.g. `shard 1/4`.
    static WORKER_LABEL: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Sets the worker label for the current thread.
/// Workers call this once at startup so their log lines can be told apart.
pub fn set_worker_label(label: impl Into<String>) {
    let label = label.into();
    WORKER_LABEL.with(|v| *v.borrow_mut() = Some(label));
}

/// Clears the worker label for the current thread.
pub fn clear_worker_label() {
    WORKER_LABEL.with(|v| *v.borrow_mut() = None);
}

/// Returns the log prefix for the current thread, `"[label] "` or an empty string.
pub fn worker_prefix() -> String {
    WORKER_LABEL.with(|v| match v.borrow().as_deref() {
        Some(label) => format!("[{label}] "),
        None => String::new(),
    })
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!("{}{}", $crate::worker_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!("{}{}", $crate::worker_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!("{}{}", $crate::worker_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!("{}{}", $crate::worker_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!("{}{}", $crate::worker_prefix(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
