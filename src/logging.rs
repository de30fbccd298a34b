/*!
 * Logging setup for the patchbay binary and its member crates
 *
 * Filter precedence: `PATCHBAY_LOG`, then `RUST_LOG`, then the configured
 * level applied to every patchbay crate. Other crates (reqwest, hyper) stay
 * at `warn` unless a directive names them.
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::PatchConfig;
use crate::error::{PatchError, Result};

/// Environment variable read before `RUST_LOG`
pub const LOG_ENV: &str = "PATCHBAY_LOG";

/// Tracing targets of the crates in this workspace
const PATCHBAY_TARGETS: [&str; 3] = [
    "patchbay",
    "patchbay_core_manifest",
    "patchbay_core_resilience",
];

/// Resolve the effective level: `verbose` forces DEBUG
pub fn effective_level(config: &PatchConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directives used when no environment override is set, e.g.
/// `warn,patchbay=info,patchbay_core_manifest=info,patchbay_core_resilience=info`
pub fn default_directives(level: Level) -> String {
    let mut directives = String::from("warn");
    for target in PATCHBAY_TARGETS {
        directives.push_str(&format!(",{}={}", target, level));
    }
    directives
}

/// Pick the filter: the first non-empty override wins, else the defaults
fn build_filter(overrides: &[Option<String>], level: Level) -> Result<EnvFilter> {
    let directives = overrides
        .iter()
        .flatten()
        .find(|d| !d.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| default_directives(level));

    EnvFilter::try_new(&directives)
        .map_err(|e| PatchError::Config(format!("invalid log filter '{}': {}", directives, e)))
}

/// Install the global subscriber: compact stderr lines, or JSON when
/// `log_file` is set
pub fn init_logging(config: &PatchConfig) -> Result<()> {
    let level = effective_level(config);
    let overrides = [
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    ];
    let env_filter = build_filter(&overrides, level)?;

    match config.log_file {
        Some(ref log_path) => init_file_logging(log_path, env_filter),
        None => {
            init_stderr_logging(env_filter, config.verbose);
            Ok(())
        }
    }
}

// Progress bars own the terminal; plain runs keep log lines short
fn init_stderr_logging(env_filter: EnvFilter, verbose: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_span_events(FmtSpan::NONE)
        .compact();

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.without_time())
            .init();
    }
}

/// One JSON object per event, fields flattened to the top level
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path).map_err(|e| {
        PatchError::Config(format!("cannot create log file {}: {}", log_path.display(), e))
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .json()
        .flatten_event(true)
        .with_current_span(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directives(Level::DEBUG)));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_test_writer().with_target(false).compact())
            .try_init()
            .ok();
    });
}
