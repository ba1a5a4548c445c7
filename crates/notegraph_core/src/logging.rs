//! Process-wide logging bootstrap for the graph engine.
//!
//! # Responsibility
//! - Start size-rotated file logs exactly once per process.
//! - Capture panics from detection workers as sanitized log events.
//!
//! # Invariants
//! - Re-initialization with identical level and directory is a no-op.
//! - Re-initialization with a different level or directory is rejected.
//! - Initialization never panics.
//! - Log records carry ids and counts only, never note content.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Overrides the level passed by the host when set.
pub const ENV_LOG_LEVEL: &str = "NOTEGRAPH_LOG";

const LOG_FILE_BASENAME: &str = "notegraph";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    log_dir: PathBuf,
    _logger: LoggerHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnsupportedLevel(String),
    InvalidDirectory(String),
    /// Logging already runs with a different `field` value.
    Conflict {
        field: &'static str,
        active: String,
        requested: String,
    },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::InvalidDirectory(message) => write!(f, "invalid log directory: {message}"),
            Self::Conflict {
                field,
                active,
                requested,
            } => write!(
                f,
                "logging already initialized with {field} `{active}`; refusing to switch to `{requested}`"
            ),
            Self::Backend(message) => write!(f, "failed to start logger: {message}"),
        }
    }
}

impl Error for LoggingError {}

/// Initializes file logging under `log_dir`.
///
/// `NOTEGRAPH_LOG`, when set to a valid level, wins over `level`.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), LoggingError> {
    let requested = std::env::var(ENV_LOG_LEVEL)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| level.to_string());
    let level = normalize_level(&requested)?;
    let log_dir = normalize_log_dir(log_dir)?;

    if let Some(state) = LOGGING_STATE.get() {
        return state.check_same(level, &log_dir);
    }

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(level, &log_dir))?;
    state.check_same(level, &log_dir)
}

impl LoggingState {
    fn check_same(&self, level: &'static str, log_dir: &Path) -> Result<(), LoggingError> {
        if self.log_dir != log_dir {
            return Err(LoggingError::Conflict {
                field: "directory",
                active: self.log_dir.display().to_string(),
                requested: log_dir.display().to_string(),
            });
        }
        if self.level != level {
            return Err(LoggingError::Conflict {
                field: "level",
                active: self.level.to_string(),
                requested: level.to_string(),
            });
        }
        Ok(())
    }
}

fn start_logger(level: &'static str, log_dir: &Path) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|err| {
        LoggingError::InvalidDirectory(format!("cannot create `{}`: {err}", log_dir.display()))
    })?;

    let logger = Logger::try_with_str(level)
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    install_panic_hook_once();

    info!(
        "event=logging_init module=logging status=ok level={} log_dir={} platform={} build_mode={} version={}",
        level,
        log_dir.display(),
        std::env::consts::OS,
        build_mode(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(LoggingState {
        level,
        log_dir: log_dir.to_path_buf(),
        _logger: logger,
    })
}

/// Active `(level, log_dir)`, or `None` before initialization.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, LoggingError> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err(LoggingError::InvalidDirectory(
            "path cannot be empty".to_string(),
        ));
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(LoggingError::InvalidDirectory(format!(
            "path must be absolute, got `{trimmed}`"
        )));
    }
    Ok(path.to_path_buf())
}

fn build_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        // Payload may quote note text.
        let payload = panic_payload_summary(panic_info);
        error!(
            "event=panic_captured module=logging status=error thread={} location={} payload={}",
            thread, location, payload
        );
        previous_hook(panic_info);
    }));
}

fn panic_payload_summary(info: &std::panic::PanicHookInfo<'_>) -> String {
    let payload = if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };

    sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, logging_status, normalize_level, normalize_log_dir, sanitize_message,
        LoggingError,
    };

    #[test]
    fn levels_are_normalized() {
        assert_eq!(normalize_level(" WARNING "), Ok("warn"));
        assert_eq!(normalize_level("Trace"), Ok("trace"));
        assert!(matches!(
            normalize_level("verbose"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn relative_and_empty_directories_are_rejected() {
        assert!(matches!(
            normalize_log_dir("logs/dev"),
            Err(LoggingError::InvalidDirectory(message)) if message.contains("absolute")
        ));
        assert!(normalize_log_dir("   ").is_err());
    }

    #[test]
    fn sanitize_strips_newlines_and_truncates() {
        let sanitized = sanitize_message("alice\nbob\rcarol", 8);
        assert!(!sanitized.contains('\n'));
        assert!(!sanitized.contains('\r'));
        assert!(sanitized.ends_with("..."));
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicts() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let first_dir = first.path().to_str().unwrap().to_string();
        let second_dir = second.path().to_str().unwrap().to_string();

        init_logging("info", &first_dir).unwrap();
        init_logging("info", &first_dir).unwrap();

        let (active_level, active_dir) = logging_status().unwrap();
        assert_eq!(active_dir, first.path());

        let other_level = if active_level == "debug" { "error" } else { "debug" };
        assert!(matches!(
            init_logging(other_level, &first_dir),
            Err(LoggingError::Conflict { field: "level", .. })
        ));
        assert!(matches!(
            init_logging(active_level, &second_dir),
            Err(LoggingError::Conflict { field: "directory", .. })
        ));
    }
}
