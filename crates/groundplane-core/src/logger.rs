//! Stderr logging for calibration runs.
//!
//! Records from the `groundplane` crates are printed at the requested level
//! and tagged with the component that emitted them, e.g.
//! `[  0.012s  INFO tilt] viewport calibrated ...`. Records from other crates
//! are held to `warn`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const CRATE_PREFIXES: [&str; 2] = ["groundplane_core", "groundplane"];

fn is_own_target(target: &str) -> bool {
    CRATE_PREFIXES.iter().any(|p| {
        target
            .strip_prefix(p)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Module path without the crate name: `groundplane_core::tilt` -> `tilt`.
fn component(target: &str) -> &str {
    for prefix in CRATE_PREFIXES {
        if let Some(rest) = target.strip_prefix(prefix) {
            if let Some(module) = rest.strip_prefix("::") {
                return module;
            }
            if rest.is_empty() {
                return target;
            }
        }
    }
    target
}

struct CalibrationLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for CalibrationLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        let limit = if is_own_target(metadata.target()) {
            self.level
        } else {
            self.level.min(LevelFilter::Warn)
        };
        metadata.level() <= limit
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            component(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<CalibrationLogger> = OnceLock::new();

/// Install the logger with the provided level filter.
///
/// Only the first call installs anything.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| CalibrationLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Map a `-v` count to a level: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn init_with_verbosity(verbosity: u8) -> Result<(), log::SetLoggerError> {
    init_with_level(level_for_verbosity(verbosity))
}

/// `EnvFilter` directive matching [`init_with_level`]: the `groundplane`
/// crates at `level`, everything else at most `warn`.
pub fn filter_directive(level: LevelFilter) -> String {
    let level = level.to_string().to_lowercase();
    let others = if level == "off" || level == "error" {
        level.as_str()
    } else {
        "warn"
    };
    let mut directive = others.to_string();
    for prefix in CRATE_PREFIXES {
        directive.push_str(&format!(",{prefix}={level}"));
    }
    directive
}

/// Install a `tracing` subscriber. `RUST_LOG` wins over `level` when set.
#[cfg(feature = "tracing")]
pub fn init_tracing(level: LevelFilter, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_increasing_levels() {
        assert_eq!(level_for_verbosity(0), LevelFilter::Warn);
        assert_eq!(level_for_verbosity(1), LevelFilter::Info);
        assert_eq!(level_for_verbosity(2), LevelFilter::Debug);
        assert_eq!(level_for_verbosity(9), LevelFilter::Trace);
    }

    #[test]
    fn components_drop_the_crate_name() {
        assert_eq!(component("groundplane_core::tilt"), "tilt");
        assert_eq!(component("groundplane::session"), "session");
        assert_eq!(component("groundplane"), "groundplane");
        assert_eq!(component("serde_json::de"), "serde_json::de");
    }

    #[test]
    fn foreign_targets_are_not_own() {
        assert!(is_own_target("groundplane_core::homography"));
        assert!(is_own_target("groundplane"));
        assert!(!is_own_target("groundplane_extras::x"));
        assert!(!is_own_target("nalgebra"));
    }

    #[test]
    fn directive_follows_requested_level() {
        assert_eq!(
            filter_directive(level_for_verbosity(2)),
            "warn,groundplane_core=debug,groundplane=debug"
        );
        assert_eq!(
            filter_directive(LevelFilter::Error),
            "error,groundplane_core=error,groundplane=error"
        );
    }

    #[test]
    fn repeated_initialization_is_harmless() {
        init_with_level(LevelFilter::Debug).unwrap();
        init_with_level(LevelFilter::Trace).unwrap();
        log::debug!("logger installed");
    }
}
