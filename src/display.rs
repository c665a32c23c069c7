//! Verbosity-gated stderr notifications.
//!
//! The engine never prints unconditionally: all progress and status output
//! goes through [`display_level`], gated on a process-wide notification
//! level. 0 = silent, 1 = errors only, 2 = results + warnings, 3 = progress,
//! 4+ = verbose debugging. The binary sets the level from `-v` / `-q`.

use std::sync::atomic::{AtomicI32, Ordering};

/// Global notification level. Defaults to 2 (results + warnings).
pub static DISPLAY_LEVEL: AtomicI32 = AtomicI32::new(2);

/// Set the process-wide notification level.
pub fn set_notification_level(level: i32) {
    DISPLAY_LEVEL.store(level, Ordering::Relaxed);
}

/// Current notification level.
#[inline]
pub fn notification_level() -> i32 {
    DISPLAY_LEVEL.load(Ordering::Relaxed)
}

/// Write `msg` to stderr if the current notification level is ≥ `level`.
/// Flushes stderr at level ≥ 4 so interleaved progress lines stay readable.
#[inline]
pub fn display_level(level: i32, msg: &str) {
    if DISPLAY_LEVEL.load(Ordering::Relaxed) >= level {
        eprint!("{}", msg);
        if DISPLAY_LEVEL.load(Ordering::Relaxed) >= 4 {
            use std::io::Write;
            let _ = std::io::stderr().flush();
        }
    }
}

/// `display_level` with a trailing newline.
#[inline]
pub fn display_line(level: i32, msg: &str) {
    if DISPLAY_LEVEL.load(Ordering::Relaxed) >= level {
        eprintln!("{}", msg);
    }
}
