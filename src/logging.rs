use std::{env, fmt::Display};

use colored::Colorize;
use log::{Level, LevelFilter, SetLoggerError};

/// Overrides how much the U-Do crates log, e.g. `UDO_LOG=debug`
const LOG_LEVEL_VAR: &str = "UDO_LOG";

pub fn init_logger() -> Result<(), SetLoggerError> {
    let local_level = local_level(env::var(LOG_LEVEL_VAR).ok().as_deref());

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let target = Target::from_str(record.target());
            let now = chrono::Local::now();

            out.finish(format_args!(
                "{:^5} {} {:^8} {}",
                level_to_string(&record.level()),
                now.format("%H:%M:%S").to_string().bright_black(),
                target,
                message
            ))
        })
        .filter(move |meta| meta.level() <= Target::from_str(meta.target()).max_level(local_level))
        .chain(std::io::stdout())
        .apply()
}

/// Falls back to info when unset or unreadable
fn local_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

#[derive(Debug, PartialEq)]
enum Target {
    External(String),
    Database,
    Http,
    Main,
    Server,
    Collab,
    Core,
}

impl Target {
    fn from_str(str: &str) -> Self {
        let module = str.split("::").next().unwrap_or_default();

        match module {
            "udo" => Self::Main,
            "udo_core" => Self::Core,
            "udo_server" => Self::Server,
            "udo_collab" => Self::Collab,
            "sqlx" => Self::Database,
            "axum" | "tower_http" | "hyper" => Self::Http,
            other => Target::External(other.to_string()),
        }
    }

    /// The most verbose level shown for this target
    fn max_level(&self, local: LevelFilter) -> LevelFilter {
        match self {
            Self::External(_) | Self::Http => LevelFilter::Warn,
            // Slow and failed statements are reported at warn
            Self::Database => local.min(LevelFilter::Warn),
            _ => local,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Target::External(x) => x.as_str().clear(),
            Target::Database => "SQL".cyan(),
            Target::Http => "HTTP".yellow(),
            Target::Main => "UDO".bright_white(),
            Target::Server => "SERVER".bright_green(),
            Target::Collab => "COLLAB".bright_purple(),
            Target::Core => "CORE".blue(),
        };

        Display::fmt(&result, f)
    }
}

fn level_to_string(level: &Level) -> String {
    match level {
        Level::Error => " ERR ".black().on_red().bold().to_string(),
        Level::Warn => " WRN ".black().on_yellow().bold().to_string(),
        Level::Info => " INF ".black().on_blue().bold().to_string(),
        Level::Debug => " DBG ".white().on_black().to_string(),
        Level::Trace => " TRC ".to_string(),
    }
}

#[cfg(test)]
mod test {
    use log::LevelFilter;

    use super::{local_level, Target};

    #[test]
    fn targets_are_grouped_by_crate() {
        assert_eq!(Target::from_str("udo_collab::friends"), Target::Collab);
        assert_eq!(Target::from_str("udo_server"), Target::Server);
        assert_eq!(Target::from_str("udo"), Target::Main);
        assert_eq!(Target::from_str("sqlx::query"), Target::Database);
        assert_eq!(Target::from_str("tower_http::cors"), Target::Http);
        assert_eq!(
            Target::from_str("argon2"),
            Target::External("argon2".to_string())
        );
    }

    #[test]
    fn only_local_targets_follow_the_configured_level() {
        let local = local_level(Some(" debug "));
        assert_eq!(local, LevelFilter::Debug);

        assert_eq!(Target::Collab.max_level(local), LevelFilter::Debug);
        assert_eq!(Target::Database.max_level(local), LevelFilter::Warn);
        assert_eq!(Target::Http.max_level(local), LevelFilter::Warn);

        let quiet = local_level(Some("error"));
        assert_eq!(Target::Database.max_level(quiet), LevelFilter::Error);
        assert_eq!(local_level(Some("loud")), LevelFilter::Info);
        assert_eq!(local_level(None), LevelFilter::Info);
    }
}
