//! Pluggable logging for the store
//!
//! The store reports what it does through an optional [`Logger`]. Without
//! one it stays silent; logging never changes the outcome of an operation.

use std::fmt;

/// Severity of a store log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Fatal => "fatal",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging capability a store can be configured with
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn fatal(&self, message: &str) {
        self.log(LogLevel::Fatal, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }
}

/// Forwards store messages to `tracing`.
///
/// `tracing` has no fatal level, so fatal messages are emitted as errors
/// tagged with `fatal = true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Fatal => tracing::error!(fatal = true, "{}", message),
            LogLevel::Error => tracing::error!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Trace => tracing::trace!("{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(LogLevel, String)>>);

    impl Logger for Recorder {
        fn log(&self, level: LogLevel, message: &str) {
            self.0.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn level_helpers_route_through_log() {
        let recorder = Recorder::default();

        recorder.fatal("a");
        recorder.error("b");
        recorder.warning("c");
        recorder.info("d");
        recorder.debug("e");
        recorder.trace("f");

        let levels: Vec<LogLevel> = recorder.0.lock().unwrap().iter().map(|(l, _)| *l).collect();
        assert_eq!(
            levels,
            vec![
                LogLevel::Fatal,
                LogLevel::Error,
                LogLevel::Warning,
                LogLevel::Info,
                LogLevel::Debug,
                LogLevel::Trace,
            ]
        );
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Fatal < LogLevel::Warning);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(LogLevel::Warning.to_string(), "warning");
    }

    #[test]
    fn tracing_logger_without_subscriber_is_silent() {
        TracingLogger.fatal("nothing listens");
        TracingLogger.trace("still nothing");
    }
}
