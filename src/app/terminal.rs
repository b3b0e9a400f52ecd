//! Terminal detection and tracing setup.

use std::io::{self, Write};

use indicatif::MultiProgress;

use crate::cli::Args;

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_use_progress(
    stderr_is_terminal: bool,
    quiet: bool,
    no_progress: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !no_progress && !dumb_terminal
}

/// Level used when `RUST_LOG` is not set.
///
/// Priority: quiet flag > verbose count > default. The default is `warn`
/// while progress bars own the terminal and `info` otherwise.
pub(crate) fn resolve_default_log_level(args: &Args, progress_active: bool) -> &'static str {
    if args.quiet {
        return "error";
    }
    match (args.verbose, progress_active) {
        (0, true) => "warn",
        (0, false) | (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    }
}

/// Writes log lines to stderr, hiding the progress bars while doing so.
struct SuspendingWriter {
    bars: Option<MultiProgress>,
}

impl Write for SuspendingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.bars {
            Some(bars) => bars.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

pub(crate) fn init_tracing(default_level: &str, ansi: bool, bars: Option<MultiProgress>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(move || SuspendingWriter { bars: bars.clone() })
        .with_ansi(ansi)
        .with_env_filter(filter)
        .try_init();
}
