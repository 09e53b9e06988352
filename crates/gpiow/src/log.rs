//! Log sink with a runtime-adjustable severity threshold.
//!
//! The library itself only emits `tracing` events. [`install`] is an optional
//! convenience that prints them to stderr; an application that wants a
//! different sink installs its own subscriber instead.

use core::str::FromStr;

use derive_more::{Display, Error};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, reload, Registry};

/// Severities, most to least severe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    #[display("error")]
    Error,
    #[display("warn")]
    Warn,
    #[display("info")]
    Info,
    #[display("debug")]
    Debug,
    /// Maps to `TRACE`.
    #[display("verbose")]
    Verbose,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Verbose => LevelFilter::TRACE,
        }
    }
}

impl LogLevel {
    const ALL: [Self; 5] =
        [Self::Error, Self::Warn, Self::Info, Self::Debug, Self::Verbose];

    fn from_filter(filter: LevelFilter) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|&level| LevelFilter::from(level) == filter)
    }
}

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
#[display("unknown log level {_0:?}")]
pub struct UnknownLogLevel(#[error(not(source))] String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" | "e" => Ok(Self::Error),
            "warn" | "warning" | "w" => Ok(Self::Warn),
            "info" | "i" => Ok(Self::Info),
            "debug" | "d" => Ok(Self::Debug),
            "verbose" | "trace" | "v" => Ok(Self::Verbose),
            _ => Err(UnknownLogLevel(s.to_owned())),
        }
    }
}

#[derive(Debug, Display, Error)]
#[display("a global tracing subscriber is already installed")]
pub struct LogInitError(#[error(source)] TryInitError);

/// Adjusts the threshold of the sink set up by [`install`].
#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<LevelFilter, Registry>,
}

impl LogControl {
    pub fn set_level(&self, level: LogLevel) {
        if let Err(err) = self.handle.modify(|filter| *filter = level.into()) {
            tracing::warn!(%err, "log level not changed");
        }
    }

    /// Current threshold, `None` if logging is switched off.
    pub fn level(&self) -> Option<LogLevel> {
        self.handle.clone_current().and_then(LogLevel::from_filter)
    }
}

/// Install a stderr sink showing events at `level` and above.
///
/// Fails if the process already has a global subscriber.
pub fn install(level: LogLevel) -> Result<LogControl, LogInitError> {
    let (filter, handle) = reload::Layer::new(LevelFilter::from(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(LogInitError)?;
    Ok(LogControl { handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("error".parse(), Ok(LogLevel::Error));
        assert_eq!("WARNING".parse(), Ok(LogLevel::Warn));
        assert_eq!("i".parse(), Ok(LogLevel::Info));
        assert_eq!("Debug".parse(), Ok(LogLevel::Debug));
        assert_eq!("trace".parse(), Ok(LogLevel::Verbose));
        assert!("loud".parse::<LogLevel>().is_err());
        for level in [LogLevel::Error, LogLevel::Verbose] {
            assert_eq!(level.to_string().parse(), Ok(level));
        }
    }

    #[test]
    fn severities_are_ordered() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Verbose);
        assert_eq!(LevelFilter::from(LogLevel::Verbose), LevelFilter::TRACE);
    }

    #[test]
    fn install_then_adjust() {
        let control = install(LogLevel::Warn).unwrap();
        assert_eq!(control.level(), Some(LogLevel::Warn));
        control.set_level(LogLevel::Debug);
        assert_eq!(control.level(), Some(LogLevel::Debug));
        assert!(install(LogLevel::Info).is_err());
    }
}
