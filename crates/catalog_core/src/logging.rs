//! Catalog logging: rolling file backend plus named, runtime-tunable loggers.
//!
//! # Responsibility
//! - Start the `flexi_logger` backend once per process.
//! - Expose two named loggers whose levels can be read and changed while the
//!   catalog runs:
//!   - `request-logger`: the facade edge (`catalog_core::service`).
//!   - `records-logger`: record handling (`catalog_core::consistency`,
//!     `catalog_core::store`, `catalog_core::db`).
//!
//! # Invariants
//! - Every level change is applied as one complete module filter string, so changing
//!   one named logger never resets the other.
//! - Re-initialization with another directory or base level is rejected.
//! - Warnings and errors are duplicated to stderr.
//! - Log lines carry metadata only; panic payloads are sanitized first.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

const LOG_FILE_BASENAME: &str = "catalog";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Loggers whose level can be queried and changed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedLogger {
    /// Facade calls as they arrive from the request layer.
    Request,
    /// Consistency manager, store adapters and SQLite bootstrap.
    Records,
}

impl NamedLogger {
    pub const ALL: [NamedLogger; 2] = [NamedLogger::Request, NamedLogger::Records];

    pub fn name(self) -> &'static str {
        match self {
            Self::Request => "request-logger",
            Self::Records => "records-logger",
        }
    }

    /// Module path prefixes routed through this logger.
    pub fn targets(self) -> &'static [&'static str] {
        match self {
            Self::Request => &["catalog_core::service"],
            Self::Records => &[
                "catalog_core::consistency",
                "catalog_core::store",
                "catalog_core::db",
            ],
        }
    }
}

impl Display for NamedLogger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NamedLogger {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|logger| logger.name() == trimmed)
            .ok_or_else(|| format!("invalid logger name `{trimmed}`"))
    }
}

/// Base level plus one level per named logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoggerLevels {
    base: LevelFilter,
    request: LevelFilter,
    records: LevelFilter,
}

impl LoggerLevels {
    fn uniform(level: LevelFilter) -> Self {
        Self {
            base: level,
            request: level,
            records: level,
        }
    }

    fn get(&self, logger: NamedLogger) -> LevelFilter {
        match logger {
            NamedLogger::Request => self.request,
            NamedLogger::Records => self.records,
        }
    }

    fn set(&mut self, logger: NamedLogger, level: LevelFilter) {
        match logger {
            NamedLogger::Request => self.request = level,
            NamedLogger::Records => self.records = level,
        }
    }

    /// Renders a `flexi_logger` module filter, e.g. `info, catalog_core::service=debug`.
    fn to_spec(self) -> String {
        let mut spec = level_tag(self.base);
        for logger in NamedLogger::ALL {
            let level = level_tag(self.get(logger));
            for target in logger.targets() {
                spec.push_str(&format!(", {target}={level}"));
            }
        }
        spec
    }
}

struct LoggingState {
    levels: Mutex<LoggerLevels>,
    log_dir: PathBuf,
    handle: LoggerHandle,
}

impl LoggingState {
    fn levels(&self) -> LoggerLevels {
        *self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_matches(&self, base: LevelFilter, log_dir: &Path) -> Result<(), String> {
        if self.log_dir != log_dir {
            return Err(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                self.log_dir.display(),
                log_dir.display()
            ));
        }
        let active = self.levels().base;
        if active != base {
            return Err(format!(
                "logging already initialized with level `{}`; refusing to switch to `{}`; use set_log_level for named loggers",
                level_tag(active),
                level_tag(base)
            ));
        }
        Ok(())
    }
}

/// Starts file logging at `level` for every logger.
///
/// Repeating the call with the same arguments is a no-op.
///
/// # Errors
/// - Unsupported `level`, or a `log_dir` that is empty, relative or cannot be
///   created.
/// - A second call with a different directory or base level.
/// - Backend startup failure.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let base = parse_level(level)?;
    let log_dir = normalize_log_dir(log_dir)?;
    let state = LOGGING_STATE.get_or_try_init(|| start_backend(base, &log_dir))?;
    state.ensure_matches(base, &log_dir)
}

/// Current level of the logger called `name`.
///
/// # Errors
/// - Unknown logger name, or logging not initialized.
pub fn get_log_level(name: &str) -> Result<LevelFilter, String> {
    let logger: NamedLogger = name.parse()?;
    Ok(active_state()?.levels().get(logger))
}

/// Changes the level of the logger called `name` and returns the new level.
///
/// The other named logger keeps its level.
///
/// # Errors
/// - Unknown logger name or unsupported level.
/// - Logging not initialized, or the backend rejected the new filter.
pub fn set_log_level(name: &str, level: &str) -> Result<LevelFilter, String> {
    let logger: NamedLogger = name.parse()?;
    let level = parse_level(level)?;
    let state = active_state()?;

    let mut levels = state.levels.lock().unwrap_or_else(PoisonError::into_inner);
    let previous = levels.get(logger);
    levels.set(logger, level);
    if let Err(err) = state.handle.parse_new_spec(&levels.to_spec()) {
        levels.set(logger, previous);
        return Err(format!("failed to apply level for `{logger}`: {err}"));
    }
    drop(levels);

    info!(
        "event=log_level_change module=core status=ok logger={} from={} to={}",
        logger,
        level_tag(previous),
        level_tag(level)
    );
    Ok(level)
}

/// Base level and directory of the active backend, if any.
pub fn logging_status() -> Option<(LevelFilter, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.levels().base, state.log_dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn active_state() -> Result<&'static LoggingState, String> {
    LOGGING_STATE
        .get()
        .ok_or_else(|| "logging is not initialized".to_string())
}

fn start_backend(base: LevelFilter, log_dir: &Path) -> Result<LoggingState, String> {
    std::fs::create_dir_all(log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            log_dir.display()
        )
    })?;

    let levels = LoggerLevels::uniform(base);
    let spec = levels.to_spec();
    let handle = Logger::try_with_str(&spec)
        .map_err(|err| format!("invalid log filter `{spec}`: {err}"))?
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
        .duplicate_to_stderr(Duplicate::Warn)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook();
    info!(
        "event=logging_init module=core status=ok version={} level={} log_dir={}",
        env!("CARGO_PKG_VERSION"),
        level_tag(base),
        log_dir.display()
    );

    Ok(LoggingState {
        levels: Mutex::new(levels),
        log_dir: log_dir.to_path_buf(),
        handle,
    })
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    match level.trim().parse::<LevelFilter>() {
        Ok(LevelFilter::Off) | Err(_) => Err(format!(
            "unsupported log level `{}`; expected trace|debug|info|warn|error",
            level.trim()
        )),
        Ok(parsed) => Ok(parsed),
    }
}

fn level_tag(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let path = Path::new(log_dir.trim());
    if path.as_os_str().is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    if !path.is_absolute() {
        return Err(format!(
            "log_dir must be an absolute path, got `{}`",
            path.display()
        ));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |panic_info| {
            let location = panic_info
                .location()
                .map_or_else(
                    || "unknown".to_string(),
                    |loc| format!("{}:{}", loc.file(), loc.line()),
                );
            let payload = panic_info
                .payload()
                .downcast_ref::<&str>()
                .map(|message| (*message).to_string())
                .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            // Payload may carry record titles.
            error!(
                "event=panic_captured module=core status=error location={location} payload={}",
                sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
            );
            previous_hook(panic_info);
        }));
    });
}

fn sanitize_message(value: &str, max_chars: usize) -> String {
    let single_line = value.replace(['\n', '\r'], " ");
    let mut capped: String = single_line.chars().take(max_chars).collect();
    if single_line.chars().count() > max_chars {
        capped.push_str("...");
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::{
        get_log_level, init_logging, logging_status, normalize_log_dir, parse_level,
        sanitize_message, set_log_level, LoggerLevels, NamedLogger,
    };
    use log::LevelFilter;

    #[test]
    fn parse_level_is_case_insensitive_and_rejects_off() {
        assert_eq!(parse_level(" DEBUG ").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("warn").unwrap(), LevelFilter::Warn);
        assert!(parse_level("off").is_err());
        assert!(parse_level("loud").unwrap_err().contains("unsupported log level"));
    }

    #[test]
    fn logger_names_round_trip_and_reject_unknown() {
        for logger in NamedLogger::ALL {
            assert_eq!(logger.name().parse::<NamedLogger>().unwrap(), logger);
        }
        let err = "books-logger".parse::<NamedLogger>().unwrap_err();
        assert!(err.contains("invalid logger name"));
    }

    #[test]
    fn level_string_routes_each_target_to_its_logger_level() {
        let mut levels = LoggerLevels::uniform(LevelFilter::Info);
        levels.set(NamedLogger::Records, LevelFilter::Debug);
        assert_eq!(
            levels.to_spec(),
            "info, catalog_core::service=info, catalog_core::consistency=debug, \
             catalog_core::store=debug, catalog_core::db=debug"
        );
    }

    #[test]
    fn normalize_log_dir_rejects_blank_and_relative_paths() {
        assert!(normalize_log_dir("  ").unwrap_err().contains("empty"));
        assert!(normalize_log_dir("logs/dev").unwrap_err().contains("absolute"));
    }

    #[test]
    fn sanitize_message_removes_newlines_and_truncates() {
        let sanitized = sanitize_message("line1\nline2\rline3", 8);
        assert_eq!(sanitized, "line1 li...");
        assert_eq!(sanitize_message("short", 8), "short");
    }

    // The backend is process-wide, so every check that needs it lives here.
    #[test]
    fn named_levels_change_independently_after_init() {
        // Outlives the test: the backend keeps writing here until exit.
        let root = std::env::temp_dir().join(format!("catalog-logging-{}", std::process::id()));
        let log_dir = root.join("logs");
        let log_dir_str = log_dir.to_str().unwrap().to_string();
        let other_dir_str = root.join("other").to_str().unwrap().to_string();

        init_logging("info", &log_dir_str).unwrap();
        init_logging("INFO", &log_dir_str).unwrap();
        assert!(init_logging("debug", &log_dir_str)
            .unwrap_err()
            .contains("refusing to switch"));
        assert!(init_logging("info", &other_dir_str)
            .unwrap_err()
            .contains("refusing to switch"));
        assert_eq!(logging_status().unwrap(), (LevelFilter::Info, log_dir));

        assert_eq!(
            set_log_level("records-logger", "DEBUG").unwrap(),
            LevelFilter::Debug
        );
        assert_eq!(get_log_level("records-logger").unwrap(), LevelFilter::Debug);
        assert_eq!(get_log_level("request-logger").unwrap(), LevelFilter::Info);

        set_log_level("request-logger", "error").unwrap();
        assert_eq!(get_log_level("request-logger").unwrap(), LevelFilter::Error);
        assert_eq!(get_log_level("records-logger").unwrap(), LevelFilter::Debug);

        assert!(set_log_level("books-logger", "info")
            .unwrap_err()
            .contains("invalid logger name"));
        assert!(get_log_level("").is_err());
        assert!(set_log_level("request-logger", "loud").is_err());
        assert_eq!(get_log_level("request-logger").unwrap(), LevelFilter::Error);
    }
}
