//! Logger initialization.

use std::{fmt::Write, io::IsTerminal, str::FromStr, sync::Once};

use jiff::{Zoned, tz::TimeZone};
use logforth::{
    append::Stderr,
    filter::EnvFilter,
    layout::Layout,
};

static INIT: Once = Once::new();

/// Stderr layout with UTC timestamps.
#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();

        let now = Zoned::now().with_time_zone(TimeZone::UTC);
        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        };

        write!(output, "{level}  {}", record.args())?;

        Ok(output.into_bytes())
    }
}

/// Initializes the process logger. The filter string follows env_logger
/// conventions, e.g. "info" or "llm=debug,server=debug".
pub fn init(log_filter: &str) {
    let log_filter = log_filter.to_owned();

    INIT.call_once(move || {
        logforth::builder()
            .dispatch(move |dispatch| {
                let filter = EnvFilter::from_str(&log_filter)
                    .unwrap_or_else(|_| EnvFilter::from_str("info").expect("default filter should be valid"));

                let layout = UtcLayout {
                    no_color: !std::io::stderr().is_terminal(),
                };

                dispatch.filter(filter).append(Stderr::default().with_layout(layout))
            })
            .apply();
    });
}
