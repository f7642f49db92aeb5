//! Structured logging for bubblescreener
//!
//! Colored console logging with per-module debug gating:
//! - Standard levels (Error/Warning/Info/Debug)
//! - Debug output per module via `--debug-<module>` flags, all via `--debug`
//!
//! Call [`init`] once at startup, then use the level functions:
//!
//! ```ignore
//! logger::info(LogTag::Cache, "snapshot refreshed: 100 records");
//! logger::debug(LogTag::Api, "GET token-boosts/top/v1");
//! ```

use chrono::Local;
use colored::*;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::RwLock;

const TAG_WIDTH: usize = 10;

/// Subsystem tag attached to every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Api,
    Aggregator,
    Enricher,
    Cache,
    Scheduler,
}

impl LogTag {
    pub fn label(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Api => "API",
            LogTag::Aggregator => "AGGREGATOR",
            LogTag::Enricher => "ENRICHER",
            LogTag::Cache => "CACHE",
            LogTag::Scheduler => "SCHEDULER",
        }
    }

    /// Key used in `--debug-<key>` command-line flags
    pub fn debug_key(&self) -> &'static str {
        match self {
            LogTag::System => "system",
            LogTag::Api => "api",
            LogTag::Aggregator => "aggregator",
            LogTag::Enricher => "enricher",
            LogTag::Cache => "cache",
            LogTag::Scheduler => "scheduler",
        }
    }

    fn colored_label(&self) -> ColoredString {
        let padded = format!("{:<width$}", self.label(), width = TAG_WIDTH);
        match self {
            LogTag::System => padded.bright_yellow().bold(),
            LogTag::Api => padded.bright_blue().bold(),
            LogTag::Aggregator => padded.bright_cyan().bold(),
            LogTag::Enricher => padded.bright_magenta().bold(),
            LogTag::Cache => padded.bright_green().bold(),
            LogTag::Scheduler => padded.bright_white().bold(),
        }
    }
}

/// Log levels ordered by severity (Error < Warning < Info < Debug)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

struct LoggerConfig {
    min_level: LogLevel,
    debug_all: bool,
    debug_tags: HashSet<&'static str>,
}

static CONFIG: Lazy<RwLock<LoggerConfig>> = Lazy::new(|| {
    RwLock::new(LoggerConfig {
        min_level: LogLevel::Info,
        debug_all: false,
        debug_tags: HashSet::new(),
    })
});

const ALL_TAGS: [LogTag; 6] = [
    LogTag::System,
    LogTag::Api,
    LogTag::Aggregator,
    LogTag::Enricher,
    LogTag::Cache,
    LogTag::Scheduler,
];

/// Initialize the logger from command-line arguments.
///
/// Scans for `--debug` (all modules), `--debug-<module>` and `--quiet`.
pub fn init() {
    let args = crate::arguments::get_cmd_args();
    let mut config = CONFIG.write().unwrap();
    config.debug_all = args.iter().any(|a| a == "--debug");
    if args.iter().any(|a| a == "--quiet") {
        config.min_level = LogLevel::Warning;
    }
    for tag in ALL_TAGS {
        if args.iter().any(|a| a == &format!("--debug-{}", tag.debug_key())) {
            config.debug_tags.insert(tag.debug_key());
        }
    }
}

fn should_log(tag: &LogTag, level: LogLevel) -> bool {
    let config = CONFIG.read().unwrap();
    // Errors always log
    if level == LogLevel::Error {
        return true;
    }
    if level == LogLevel::Debug {
        return config.debug_all || config.debug_tags.contains(tag.debug_key());
    }
    level <= config.min_level
}

fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    if !should_log(&tag, level) {
        return;
    }
    let time = Local::now().format("%H:%M:%S").to_string();
    let level_str = match level {
        LogLevel::Error => level.as_str().bright_red().bold(),
        LogLevel::Warning => level.as_str().yellow().bold(),
        LogLevel::Info => level.as_str().normal(),
        LogLevel::Debug => level.as_str().dimmed(),
    };
    println!(
        "{} [{}] [{}] {}",
        time.dimmed(),
        tag.colored_label(),
        level_str,
        message
    );
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (gated by `--debug` / `--debug-<module>`)
pub fn debug(tag: LogTag, message: &str) {
    log_internal(tag, LogLevel::Debug, message);
}
