use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

fn default_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::INFO)
}

// `level` only applies when `directives` is empty
fn env_filter(level: &str, directives: &str) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level(level).into())
        .parse_lossy(directives)
}

pub fn init(level: &str) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true),
        )
        .with(env_filter(level, &directives))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels() {
        assert_eq!(default_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(default_level("warn"), LevelFilter::WARN);
        assert_eq!(default_level(" error "), LevelFilter::ERROR);
        assert_eq!(default_level("trace"), LevelFilter::TRACE);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(default_level("loud"), LevelFilter::INFO);
        assert_eq!(default_level(""), LevelFilter::INFO);
    }

    #[test]
    fn rust_log_wins_over_configured_level() {
        let filter = env_filter("info", "debug").to_string();
        assert!(filter.contains("debug"), "{filter}");
        assert!(!filter.contains("info"), "{filter}");

        let filter = env_filter("warn", "roomrelay=trace").to_string();
        assert!(filter.contains("roomrelay=trace"), "{filter}");
    }

    #[test]
    fn configured_level_applies_without_rust_log() {
        let filter = env_filter("warn", "").to_string();
        assert!(filter.contains("warn"), "{filter}");
    }
}
