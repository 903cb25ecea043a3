//! Tracing subscriber initialization for the spacesyncd binary.
//!
//! Priority chain for the effective filter, highest first:
//!
//! 1. `SPACESYNC_LOG` (per-target directives, e.g. `spacesync=debug,warn`)
//! 2. `RUST_LOG`
//! 3. CLI flags (`-v` → debug, `-q` → error)
//! 4. Default level: `info`

use tracing::Level;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Verbosity derived from CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// `--quiet`: only errors.
    Quiet,
    /// Default: info and above.
    Normal,
    /// `--verbose`: debug-level output.
    Verbose,
}

impl Verbosity {
    /// If both flags are set, verbose wins.
    #[must_use]
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    #[must_use]
    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

/// Initialize the global subscriber; call exactly once, before anything
/// that emits events.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed.
pub fn init_subscriber(verbosity: Verbosity, no_color: bool) {
    let filter = build_env_filter(verbosity);

    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let use_ansi = !no_color && stderr_is_tty;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_ansi)
        .with_target(true)
        .with_level(true);

    if verbosity == Verbosity::Verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.with_timer(fmt::time::uptime()))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.without_time().compact())
            .init();
    }
}

fn build_env_filter(verbosity: Verbosity) -> EnvFilter {
    if let Ok(directives) = std::env::var("SPACESYNC_LOG") {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(verbosity.default_level().as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_wins_over_quiet() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }

    #[test]
    fn default_levels() {
        assert_eq!(Verbosity::Quiet.default_level(), Level::ERROR);
        assert_eq!(Verbosity::Normal.default_level(), Level::INFO);
        assert_eq!(Verbosity::Verbose.default_level(), Level::DEBUG);
    }
}
