use std::{env, fmt::Display, str::FromStr};

use colored::Colorize;
use log::{Level, LevelFilter, SetLoggerError};

pub const LOG_LEVEL_KEY: &str = "CUEBOX_LOG_LEVEL";

/// Installs the colored stdout logger. Fails if a logger is already installed.
///
/// Engine and collab logs are shown down to `level`. Other crates only get to log
/// warnings and errors.
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_str(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_badge(record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(move |meta| is_shown(&Target::from_str(meta.target()), meta.level(), level))
        .chain(std::io::stdout())
        .apply()
}

/// Reads the local log level from the environment, falling back to info.
pub fn level_from_env() -> LevelFilter {
    parse_level(env::var(LOG_LEVEL_KEY).ok().as_deref())
}

fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

fn is_shown(target: &Target, level: Level, local_level: LevelFilter) -> bool {
    match target {
        Target::External(_) => level <= Level::Warn,
        _ => level <= local_level,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Target {
    External(String),
    Collab,
    Core,
}

impl Target {
    fn from_str(str: &str) -> Self {
        let module = str.split("::").next().unwrap_or_default();

        match module {
            "cuebox_core" => Self::Core,
            "cuebox_collab" => Self::Collab,
            other => Target::External(other.to_string()),
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Collab => "COLLAB".bright_purple(),
            Target::Core => "CORE".blue(),
        };

        Display::fmt(&result, f)
    }
}

fn level_badge(level: Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}
