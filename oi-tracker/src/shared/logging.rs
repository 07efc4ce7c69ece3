/// Logging setup
///
/// The terminal UI owns stdout, so log lines go to a file instead.
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

/// Initialise the global `tracing` subscriber writing to `log_file`.
///
/// Filter comes from `RUST_LOG` (default: info). Returns false when logging stays
/// disabled (no file configured, or the file could not be opened).
pub fn init_logging(log_file: Option<&Path>) -> bool {
    let Some(path) = log_file else {
        return false;
    };

    let file = match open_log_file(path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok()
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
