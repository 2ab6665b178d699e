use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use http::StatusCode;
use serde::Deserialize;
use throttle_lib::ratelimit::ThrottleConfig;
use throttle_lib::{DEFAULT_MAX_CONCURRENCY, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use url::Url;

use crate::verbosity::Verbosity;

pub(crate) const THROTTLE_CONFIG_FILE: &str = "throttle.toml";

/// Lines starting with this marker in URL lists are ignored
const COMMENT_MARKER: &str = "#";

const HELP_MSG_CONFIG_FILE: &str =
    "Configuration file to use. Defaults to `throttle.toml` in the current directory, if present";

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    max_concurrency: usize = DEFAULT_MAX_CONCURRENCY;
    timeout: u64 = DEFAULT_TIMEOUT_SECS;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Fetch URLs concurrently while honoring per-host `Retry-After` cooldowns.
///
/// When a server answers with a throttling status and a `Retry-After`
/// header, further requests to that host wait until the cooldown is over
/// and the throttled request is sent again.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct ThrottleOptions {
    /// URLs to fetch
    #[arg(
        name = "urls",
        required_unless_present = "input",
        long_help = "URLs to fetch. More URLs can be read from a file with `--input`."
    )]
    raw_urls: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

impl ThrottleOptions {
    /// All URLs to fetch: the arguments first, then those from `--input`
    pub(crate) fn urls(&self) -> Result<Vec<Url>> {
        let mut raw = self.raw_urls.clone();

        if let Some(input) = &self.config.input {
            let lines = if input == Path::new("-") {
                read_lines(io::stdin().lock())
            } else {
                let file = fs::File::open(input)
                    .with_context(|| format!("Cannot open input file `{}`", input.display()))?;
                read_lines(BufReader::new(file))
            };
            raw.extend(lines.context("Cannot read URLs from --input")?);
        }

        raw.iter()
            .map(|url| Url::parse(url).with_context(|| format!("Cannot parse `{url}` as URL")))
            .collect()
    }
}

/// Read lines; ignore empty lines and comments
fn read_lines<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let lines: Vec<String> = reader.lines().collect::<Result<_, _>>()?;
    Ok(lines
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .collect())
}

/// The main configuration for throttle
#[derive(Parser, Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Read URLs from the given file or stdin (if path is '-').
    #[arg(
        short,
        long,
        value_name = "PATH",
        long_help = "Read URLs from the given file or stdin (if path is '-').

One URL per line. Lines starting with '#' and empty lines are ignored."
    )]
    #[serde(default)]
    pub(crate) input: Option<PathBuf>,

    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Maximum number of requests in flight at the same time
    #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Timeout of a single request in seconds
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS, value_name = "SECONDS")]
    #[serde(default = "timeout")]
    pub(crate) timeout: u64,

    /// User agent sent with every request
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Response status that installs a cooldown when it carries Retry-After.
    /// May be given multiple times. Defaults to 429 and 503.
    #[arg(long = "retry-status", value_name = "CODE", verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) retry_statuses: Vec<u16>,

    /// Time added on top of every cooldown the server asks for, e.g. "500ms".
    /// Defaults to 1s.
    #[arg(long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) safety_margin: Option<Duration>,
}

impl Config {
    /// Load and validate configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse configuration file")?;
        config.validate()?;
        Ok(config)
    }

    /// Merge the configuration from TOML into the CLI configuration.
    ///
    /// Values given on the command line win; the file only fills in what
    /// was left at its default.
    pub(crate) fn merge(&mut self, toml: Config) {
        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                input: None,
                verbose: Verbosity::default(),
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                timeout: DEFAULT_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT,
                retry_statuses: Vec::<u16>::new(),
                safety_margin: None,
            }
        }
    }

    /// Reject values that parse but make no sense
    pub(crate) fn validate(&self) -> Result<()> {
        for &status in &self.retry_statuses {
            if StatusCode::from_u16(status).is_err() {
                bail!("`{status}` is not a valid HTTP status code");
            }
        }
        Ok(())
    }

    /// Settings for the throttle coordinator
    pub(crate) fn throttle_config(&self) -> ThrottleConfig {
        ThrottleConfig::from_options(self.retry_statuses.clone(), self.safety_margin)
    }

    /// Timeout of a single request
    pub(crate) const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
