use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use spacesync_core::CancelToken;
use spacesync_engine::{init_subscriber, EngineConfig, SyncDaemon, Verbosity};
use tracing::{error, info};

const USAGE: &str = "\
spacesyncd — keep a Spaces mirror converged with an Archives store

USAGE:
    spacesyncd --archives <DIR> --spaces <DIR> [--config-dir <DIR>] [OPTIONS]

OPTIONS:
    --archives <DIR>      canonical long-term tree (required)
    --spaces <DIR>        working mirror tree (required)
    --config-dir <DIR>    catalog and .syncignore location [default: <spaces>/.spacesync]
    -v, --verbose         debug-level logging
    -q, --quiet           errors only
    --no-color            suppress ANSI colors
    -h, --help            print this help
";

#[derive(Debug)]
struct CliArgs {
    archives: PathBuf,
    spaces: PathBuf,
    config_dir: Option<PathBuf>,
    verbose: bool,
    quiet: bool,
    no_color: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<CliArgs, String> {
    let mut archives = None;
    let mut spaces = None;
    let mut config_dir = None;
    let mut verbose = false;
    let mut quiet = false;
    let mut no_color = false;

    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--archives" => {
                archives = Some(PathBuf::from(
                    args.next().ok_or("--archives requires a value")?,
                ));
            }
            "--spaces" => {
                spaces = Some(PathBuf::from(
                    args.next().ok_or("--spaces requires a value")?,
                ));
            }
            "--config-dir" => {
                config_dir = Some(PathBuf::from(
                    args.next().ok_or("--config-dir requires a value")?,
                ));
            }
            "-v" | "--verbose" => verbose = true,
            "-q" | "--quiet" => quiet = true,
            "--no-color" => no_color = true,
            "-h" | "--help" => return Err(String::new()),
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    Ok(CliArgs {
        archives: archives.ok_or("--archives is required")?,
        spaces: spaces.ok_or("--spaces is required")?,
        config_dir,
        verbose,
        quiet,
        no_color,
    })
}

fn main() -> ExitCode {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            if message.is_empty() {
                print!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            eprintln!("error: {message}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    init_subscriber(
        Verbosity::from_flags(args.verbose, args.quiet),
        args.no_color,
    );

    let config_dir = args
        .config_dir
        .unwrap_or_else(|| args.spaces.join(".spacesync"));
    if let Err(err) = std::fs::create_dir_all(&config_dir) {
        error!(%err, dir = %config_dir.display(), "cannot create config directory");
        return ExitCode::FAILURE;
    }

    let config = EngineConfig::new(args.archives, args.spaces, config_dir);
    let daemon = match SyncDaemon::open(config) {
        Ok(daemon) => daemon,
        Err(err) => {
            error!(%err, "failed to open catalog");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            error!(%err, "failed to register signal handlers");
            return ExitCode::FAILURE;
        }
    };
    thread::Builder::new()
        .name("spacesync-signals".to_owned())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "shutdown signal received");
                signal_cancel.cancel();
            }
        })
        .expect("signal listener thread spawns");

    daemon.run(&cancel);
    ExitCode::SUCCESS
}
