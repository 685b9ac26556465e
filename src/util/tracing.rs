//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Maps CLI verbosity switches onto a default trace level.
pub(crate) fn trace_level(debug: bool, quiet: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    }
}

/// Initialises the global subscriber: `RUST_LOG` wins when set, otherwise
/// only this crate's events at the given level. Logs go to stderr so they
/// never mix with command output.
pub(crate) fn setup(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("uft={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::trace_level;

    #[test]
    fn verbosity_mapping() {
        assert_eq!(trace_level(true, false), "debug");
        assert_eq!(trace_level(true, true), "debug");
        assert_eq!(trace_level(false, true), "error");
        assert_eq!(trace_level(false, false), "info");
    }
}
