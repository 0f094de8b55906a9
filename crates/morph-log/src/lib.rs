//! Leveled logging for the `morph` type engine.
//!
//! Every message is tagged with the module path of the call site, filtered
//! against a single global level and written to stderr. The level and color
//! mode can be set programmatically or read from the environment:
//!
//! - `MORPH_LOG=trace|debug|info|warn|error` selects the minimum level
//! - `NO_COLOR` (any value) disables ANSI colors
//!
//! Structural misuse of the type engine is reported through [`fatal!`], which
//! always emits, regardless of the configured level, and then panics.
//!
//! # Example
//!
//! ```
//! use morph_log::{debug, info, warn, Level};
//!
//! morph_log::set_level(Level::Debug);
//!
//! let pools = 3;
//! info!("arena holds {} sub-pools", pools);
//! debug!("fragments: {:?}", (128, 64));
//! warn!("resolution depth exceeded");
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Environment variable holding the minimum log level.
pub const LEVEL_ENV: &str = "MORPH_LOG";

/// Environment variable that disables colored output when present.
pub const NO_COLOR_ENV: &str = "NO_COLOR";

/// Severity of a log message, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Failures, including fatal misuse reports.
    Error = 0,
    /// Recoverable anomalies.
    Warn = 1,
    /// Lifecycle milestones.
    Info = 2,
    /// Registry and allocator decisions.
    Debug = 3,
    /// Per-node events.
    Trace = 4,
}

impl Level {
    const ALL: [Level; 5] = [
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
        Level::Trace,
    ];

    const fn color_code(self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    fn from_u8(raw: u8) -> Self {
        Self::ALL.get(raw as usize).copied().unwrap_or(Level::Warn)
    }
}

/// Error returned when a string names no log level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl std::fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid log level: {:?}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring case.
    ///
    /// ```
    /// use morph_log::Level;
    ///
    /// assert_eq!("debug".parse::<Level>(), Ok(Level::Debug));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseLevelError { input: s.to_string() })
    }
}

/// Global logger state: minimum level and color mode.
pub struct Logger {
    level: AtomicU8,
    colored: AtomicBool,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            colored: AtomicBool::new(true),
        }
    }

    /// Sets the minimum level; less severe messages are dropped.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Returns the current minimum level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Enables or disables ANSI colors.
    pub fn set_colored(&self, colored: bool) {
        self.colored.store(colored, Ordering::Relaxed);
    }

    /// Returns whether ANSI colors are emitted.
    pub fn colored(&self) -> bool {
        self.colored.load(Ordering::Relaxed)
    }

    /// Checks whether a message at `level` passes the filter.
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the global logger, created at `Level::Warn` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(|| Logger::new(Level::Warn))
}

/// Sets the minimum level of the global logger.
pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the minimum level from a level name.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` names no level; the level is unchanged.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    set_level(s.parse()?);
    Ok(())
}

/// Configures the global logger from `MORPH_LOG` and `NO_COLOR`.
///
/// An unset or unparsable `MORPH_LOG` leaves the level untouched; the parse
/// failure is reported once at warn level.
pub fn init_from_env() {
    let logger = get_logger();

    if let Ok(raw) = std::env::var(LEVEL_ENV) {
        match raw.parse::<Level>() {
            Ok(level) => logger.set_level(level),
            Err(err) => __log_with_target(Level::Warn, module_path!(), format_args!("{err}")),
        }
    }

    if std::env::var_os(NO_COLOR_ENV).is_some() {
        logger.set_colored(false);
    }
}

fn emit(level: Level, target: &str, args: Arguments) {
    const RESET: &str = "\x1b[0m";

    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    // Logging never fails the caller.
    let _ = if get_logger().colored() {
        writeln!(out, "{}[{}]{RESET} {target}: {args}", level.color_code(), level.as_str())
    } else {
        writeln!(out, "[{}] {target}: {args}", level.as_str())
    };
}

#[doc(hidden)]
pub fn __log_with_target(level: Level, target: &str, args: Arguments) {
    if get_logger().enabled(level) {
        emit(level, target, args);
    }
}

#[doc(hidden)]
#[cold]
#[inline(never)]
pub fn __fatal(target: &str, args: Arguments) -> ! {
    let message = args.to_string();
    emit(Level::Error, target, format_args!("fatal: {message}"));

    #[cfg(feature = "fatal-backtrace")]
    emit(
        Level::Error,
        target,
        format_args!("backtrace:\n{:?}", backtrace::Backtrace::new()),
    );

    panic!("{target}: {message}");
}

/// Logs a message at an explicit level.
///
/// ```
/// use morph_log::{log, Level};
///
/// log!(level: Level::Info, "created {} nodes", 12);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__log_with_target(level, module_path!(), format_args!($($arg)*));
        }
    }};
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Error, $($arg)*)
    };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Warn, $($arg)*)
    };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Info, $($arg)*)
    };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Debug, $($arg)*)
    };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log!(level: $crate::Level::Trace, $($arg)*)
    };
}

/// Reports an unrecoverable internal error and panics.
///
/// Reserved for programmer errors in the code wiring the type engine, never
/// for conditions that depend on user data.
///
/// ```should_panic
/// use morph_log::fatal;
///
/// fatal!("type {} carries no combination list", "int*");
/// ```
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::__fatal(module_path!(), format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("error".parse::<Level>(), Ok(Level::Error));
        assert_eq!("WARN".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" Info ".parse::<Level>(), Ok(Level::Info));
        assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_parse_error_message() {
        let err = "verbose".parse::<Level>().unwrap_err();
        assert_eq!(err.to_string(), "invalid log level: \"verbose\"");
    }

    #[test]
    fn test_level_from_u8_fallback() {
        assert_eq!(Level::from_u8(3), Level::Debug);
        assert_eq!(Level::from_u8(200), Level::Warn);
    }

    #[test]
    fn test_logger_filtering() {
        let logger = Logger::new(Level::Info);

        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Info));
        assert!(!logger.enabled(Level::Debug));

        logger.set_level(Level::Trace);
        assert!(logger.enabled(Level::Trace));
        assert_eq!(logger.level(), Level::Trace);
    }

    #[test]
    fn test_logger_color_toggle() {
        let logger = Logger::new(Level::Info);
        assert!(logger.colored());
        logger.set_colored(false);
        assert!(!logger.colored());
    }

    #[test]
    fn test_set_level_from_str_rejects_garbage() {
        let before = get_logger().level();
        assert!(set_level_from_str("nope").is_err());
        assert_eq!(get_logger().level(), before);
    }

    #[test]
    fn test_macros_expand() {
        info!("info {}", 1);
        debug!("debug {:?}", [1, 2]);
        trace!("trace");
        warn!("warn");
        error!("error");
    }

    #[test]
    #[should_panic(expected = "no combination list")]
    fn test_fatal_panics() {
        fatal!("type {} has no combination list", "int*");
    }
}
