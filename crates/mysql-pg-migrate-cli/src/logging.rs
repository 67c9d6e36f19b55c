//! Log sinks: console, main log file and error log file.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use mysql_pg_migrate::config::RunConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

fn open_append(path: &str) -> io::Result<File> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber described by the `run` section.
///
/// File sinks sit behind a `Mutex<File>`; the fmt layer hands each formatted
/// event to the writer in a single `write_all`, so lines never interleave.
pub fn init(run: &RunConfig) -> io::Result<()> {
    let console = run.show_console_logs.then(|| {
        let default = if run.show_log_in_console { "debug" } else { "info" };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_filter(filter)
    });

    let main_log = if run.enable_file_logging {
        let file = open_append(&run.log_file_path)?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::DEBUG),
        )
    } else {
        None
    };

    let error_log = fmt::layer()
        .with_writer(Mutex::new(open_append(&run.error_log_path)?))
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(console)
        .with(main_log)
        .with(error_log)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}
