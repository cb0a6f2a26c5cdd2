//! Log output for extraction runs.
//!
//! What deskline reports at each level:
//! - `error`: a page GET failed for good, failing its (subdomain, object) assignment
//! - `warn`: a rate-limited GET is waiting to retry, or a stale `.tmp` output is removed
//! - `info`: run setup, per-assignment record counts and the closing summary
//! - `debug`: every page GET, and joined records left without a match
//!
//! `--debug` only opens the deskline crates to debug; reqwest and hyper stay
//! at warn. `RUST_LOG` overrides both flags.

use indicatif::MultiProgress;

const DESKLINE_TARGETS: [&str; 3] = ["deskline", "deskline_core", "deskline_zendesk"];

fn level_label(level: log::Level, color: bool) -> String {
    let (label, ansi) = match level {
        log::Level::Error => ("ERROR", "\x1b[31m"),
        log::Level::Warn => ("WARN ", "\x1b[33m"),
        log::Level::Info => ("INFO ", "\x1b[32m"),
        log::Level::Debug => ("DEBUG", "\x1b[36m"),
        log::Level::Trace => ("TRACE", "\x1b[35m"),
    };
    if color {
        format!("{ansi}{label}\x1b[0m")
    } else {
        label.to_string()
    }
}

/// `env_logger` filter for the CLI verbosity flags.
pub fn default_filter(quiet: bool, debug: bool) -> String {
    if debug {
        let mut filter = String::from("warn");
        for target in DESKLINE_TARGETS {
            filter.push_str(&format!(",{target}=debug"));
        }
        filter
    } else if quiet {
        "warn".to_string()
    } else {
        "info".to_string()
    }
}

/// Routes records through the progress display while bars are drawn.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}", level_label(record.level(), true), record.args());
        self.multi.suspend(|| eprintln!("{line}"));
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the process logger.
///
/// Interactive runs pass their `MultiProgress` and get colored levels;
/// piped runs get plain `[LEVEL] msg` lines. Only the first call installs.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let filter = default_filter(quiet, debug);
    let env = env_logger::Env::default().default_filter_or(filter);

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .build();
        let max_level = logger.filter();
        if log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        let _ = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(buf, "[{}] {}", level_label(record.level(), false), record.args())
            })
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_padded() {
        assert_eq!(level_label(log::Level::Warn, false), "WARN ");
        assert_eq!(level_label(log::Level::Error, false), "ERROR");
    }

    #[test]
    fn colored_label_resets() {
        let label = level_label(log::Level::Info, true);
        assert!(label.starts_with("\x1b[32m"));
        assert!(label.ends_with("\x1b[0m"));
    }

    #[test]
    fn verbosity_filters() {
        assert_eq!(default_filter(false, false), "info");
        assert_eq!(default_filter(true, false), "warn");
        assert_eq!(
            default_filter(true, true),
            "warn,deskline=debug,deskline_core=debug,deskline_zendesk=debug"
        );
    }

    #[test]
    fn init_twice_does_not_panic() {
        init_logging(true, false, None);
        init_logging(true, false, None);
    }
}
