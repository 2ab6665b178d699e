use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

use crate::verbosity::Verbosity;

/// Initialize the logging system with the given verbosity level.
///
/// `RUST_LOG`, if set, takes precedence over the command line flags.
pub(crate) fn init_logging(verbose: &Verbosity) {
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    if std::env::var("RUST_LOG").is_err() {
        // Dependencies stay at `warn`; only our own crates follow `-v`/`-q`
        let level_filter = verbose.log_level_filter();
        builder
            .filter_level(LevelFilter::Warn.min(level_filter))
            .filter_module("throttle", level_filter)
            .filter_module("throttle_lib", level_filter);
    }

    builder.init();
}
