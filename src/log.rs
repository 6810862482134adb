//! Console logging for the simulator

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

use colored::Colorize;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Lowest level that still gets printed
pub fn set_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: LogLevel) -> bool {
    level as u8 >= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Emit one log line
pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let prefix = match level {
        LogLevel::Debug => "[DEBUG]".dimmed(),
        LogLevel::Info => "[INFO] ".green(),
        LogLevel::Warn => "[WARN] ".yellow(),
        LogLevel::Error => "[ERROR]".red().bold(),
    };

    // One write per line keeps lines from different cores whole
    let line = format!("{} {}\n", prefix, args);
    let _ = match level {
        LogLevel::Error => std::io::stderr().lock().write_all(line.as_bytes()),
        _ => std::io::stdout().lock().write_all(line.as_bytes()),
    };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {
        $crate::log::log($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {
        $crate::log::log($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {
        $crate::log::log($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {
        $crate::log::log($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}
