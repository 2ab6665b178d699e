//! `-v`/`-q` flags controlling how much `throttle` logs.
//!
//! Warnings and errors are shown by default.
//! - `-q` only shows errors, `-qq` silences logging
//! - `-v` shows info, e.g. a summary of the run
//! - `-vv` shows debug, e.g. every cooldown installed or waited for
//! - `-vvv` shows trace
//!
//! In a config file the level is given by name: `verbose = "debug"`.

use log::LevelFilter;
use serde::Deserialize;

/// The default level when neither `-v` nor `-q` is given
const DEFAULT_LEVEL: i8 = 2;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More log output per occurrence
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    verbose: u8,

    /// Less log output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: u8,
}

impl Verbosity {
    /// The filter for log records of `throttle` itself
    pub(crate) const fn log_level_filter(&self) -> LevelFilter {
        match self.level() {
            i8::MIN..=0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn level(&self) -> i8 {
        DEFAULT_LEVEL
            .saturating_add(self.verbose as i8)
            .saturating_sub(self.quiet as i8)
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    #[allow(clippy::cast_sign_loss)]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        let level: i8 = match name.to_lowercase().as_str() {
            "off" => 0,
            "error" => 1,
            "warn" | "warning" => 2,
            "info" => 3,
            "debug" => 4,
            "trace" => 5,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{other}`"
                )));
            }
        };

        let offset = level - DEFAULT_LEVEL;
        Ok(Verbosity {
            verbose: offset.max(0) as u8,
            quiet: (-offset).max(0) as u8,
        })
    }
}
