/// Centralized command-line argument handling
///
/// Thread-safe storage of process arguments plus the flag-checking helpers
/// used by the logger and the main binary. Binaries and tests can override
/// the argument list via [`set_cmd_args`].
use once_cell::sync::Lazy;
use std::env;
use std::sync::Mutex;

/// Global command-line arguments storage
pub static CMD_ARGS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(env::args().collect()));

/// Override the stored argument list (used by tests)
pub fn set_cmd_args(args: Vec<String>) {
    if let Ok(mut cmd_args) = CMD_ARGS.lock() {
        *cmd_args = args;
    }
}

/// Get a copy of the current command-line arguments
pub fn get_cmd_args() -> Vec<String> {
    match CMD_ARGS.lock() {
        Ok(args) => args.clone(),
        Err(_) => env::args().collect(),
    }
}

/// Check if a specific argument is present
pub fn has_arg(arg: &str) -> bool {
    get_cmd_args().iter().any(|a| a == arg)
}

/// Get the value following a flag, e.g. `--config configs.json`
pub fn get_arg_value(flag: &str) -> Option<String> {
    let args = get_cmd_args();
    for (i, arg) in args.iter().enumerate() {
        if arg == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

/// Path to the configuration file (`--config <path>`, default `configs.json`)
pub fn config_path() -> String {
    get_arg_value("--config").unwrap_or_else(|| "configs.json".to_string())
}

/// Requested record count override (`--limit <n>`)
pub fn limit_override() -> Option<usize> {
    get_arg_value("--limit").and_then(|v| v.parse().ok())
}

/// Help requested via `--help` / `-h`
pub fn is_help_requested() -> bool {
    has_arg("--help") || has_arg("-h")
}

pub fn print_help() {
    println!("bubblescreener - trending token aggregation and caching engine");
    println!();
    println!("USAGE:");
    println!("  bubblescreener [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --config <path>        Configuration file (default: configs.json)");
    println!("  --limit <n>            Records per snapshot (default from config)");
    println!("  --quiet                Only warnings and errors");
    println!("  --debug                Debug output for all modules");
    println!("  --debug-<module>       Debug output for one module");
    println!("                         (system, api, aggregator, enricher, cache, scheduler)");
    println!("  --help, -h             Show this help");
}
