//! Ambient logging setup.
//!
//! The core does not choose a log sink on its own authority — that is an
//! external collaborator's job — but a runnable binary still needs
//! *something* wired up by default. This uses an `env_logger`-based
//! setup, minus the UDP tag-routing machinery that application doesn't
//! need here.

use std::io::Write;

use log::LevelFilter;

/// Parse the `log_level` config string into a [`LevelFilter`], defaulting to
/// `Info` for anything unrecognized rather than failing startup over it.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        other => {
            eprintln!("unrecognized log_level '{other}', defaulting to info");
            LevelFilter::Info
        }
    }
}

/// Install a stderr [`env_logger`] at the given level. Safe to call more
/// than once per process; later calls are no-ops.
pub fn init(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} [{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("unknown"), LevelFilter::Info);
    }
}
