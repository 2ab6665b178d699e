//! `throttle` fetches URLs concurrently while honoring the cooldowns servers
//! ask for.
//!
//! When a server answers `429 Too Many Requests` or `503 Service Unavailable`
//! with a `Retry-After` header, requests to that host are held back until the
//! cooldown is over and the throttled request is sent again. Requests to
//! other hosts are not affected.
//!
//! Fetch a few URLs:
//! ```sh
//! throttle https://example.com/a https://example.com/b
//! ```
//!
//! Read URLs from a file, one per line:
//! ```sh
//! throttle --input urls.txt
//! ```
//!
//! Also back off on `500`, with a shorter safety margin:
//! ```sh
//! throttle --retry-status 429 --retry-status 503 --retry-status 500 \
//!     --safety-margin 250ms --input urls.txt
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Error, Result, bail};
use clap::Parser;
use log::{error, info, warn};
use throttle_lib::ratelimit::ThrottleCoordinator;
use throttle_lib::{Client, DispatcherBuilder, Request};

mod logging;
mod options;
mod verbosity;

use crate::logging::init_logging;
use crate::options::{Config, THROTTLE_CONFIG_FILE, ThrottleOptions};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator, e.g. an unparsable URL.
    #[allow(unused)]
    UnexpectedFailure = 1,
    RequestFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and command-line arguments.
///
/// Only config file errors are reported here; command-line values are
/// validated afterwards.
fn load_config() -> Result<ThrottleOptions> {
    let mut opts = ThrottleOptions::parse();

    init_logging(&opts.config.verbose);

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, use the default one if it exists.
        // An invalid default file is an error all the same.
        let default_config = PathBuf::from(THROTTLE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and call the throttle entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };
    opts.config.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(io::ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Fetch all URLs with the throttle coordinator installed
async fn run(opts: &ThrottleOptions) -> Result<i32> {
    let urls = opts.urls()?;
    if urls.is_empty() {
        warn!("No URLs to fetch");
        return Ok(ExitCode::Success as i32);
    }

    let dispatcher = DispatcherBuilder::builder()
        .max_concurrency(opts.config.max_concurrency)
        .timeout(opts.config.timeout())
        .user_agent(opts.config.user_agent.clone())
        .build()
        .dispatcher()
        .context("Cannot create HTTP client")?;
    let coordinator = ThrottleCoordinator::install(opts.config.throttle_config(), &dispatcher);

    let client = Client::new();
    client.register_handler(coordinator.handler());
    for url in urls {
        client.queue(Request::from(url), &dispatcher);
    }

    let responses = dispatcher.run().await;

    let mut stdout = io::stdout().lock();
    for response in &responses {
        writeln!(stdout, "{response}")?;
    }
    stdout.flush()?;

    let failed = responses.iter().filter(|r| !r.is_success()).count();
    let retried = responses.iter().filter(|r| r.request().attempt() > 1).count();
    info!(
        "{} fetched, {failed} failed, {retried} retried after a cooldown, {} hosts throttled",
        responses.len(),
        coordinator.host_count()
    );

    let exit_code = if failed == 0 {
        ExitCode::Success
    } else {
        ExitCode::RequestFailure
    };
    Ok(exit_code as i32)
}
