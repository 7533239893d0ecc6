use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialise logging.
///
/// Without `debug` the level is forced to `info` even when `RUST_LOG` is set.
/// With `debug` the level defaults to `debug` and `RUST_LOG` may override it.
/// When `log_file` is given, output goes to that file through a non-blocking
/// writer that stays alive for the rest of the process.
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one keeps receiving events and `log_file` is not used.
pub fn init(debug: bool, log_file: Option<PathBuf>) -> bool {
    let level = if debug { "debug" } else { "info" };

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    let Some(path) = log_file else {
        let installed = tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok();
        if !installed {
            tracing::warn!("logging already initialised; keeping the existing subscriber");
        }
        return installed;
    };

    // The appender creates its file on construction.
    if tracing::dispatcher::has_been_set() {
        tracing::warn!(
            path = %path.display(),
            "logging already initialised; log file not attached"
        );
        return false;
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("remote_dashboard.log"));
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("cannot create log directory {}: {e}", dir.display());
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .is_ok();
    if installed {
        let _ = FILE_GUARD.set(guard);
    } else {
        tracing::warn!(
            path = %path.display(),
            "logging already initialised; log file not attached"
        );
    }
    installed
}
