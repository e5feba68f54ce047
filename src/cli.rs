use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "feedpulse")]
#[command(version)]
#[command(about = "Consumes a push feed over a hub connection and reports lifecycle latency diagnostics")]
pub struct Args {
    /// Logging level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Feed domain
    #[arg(short = 'd', long)]
    pub feed_domain: String,

    /// API Key
    #[arg(short = 'k', long)]
    pub api_key: String,

    /// Channel name
    #[arg(short = 'c', long)]
    pub channel_name: String,

    /// Skip the NTP clock-skew probe at startup
    #[arg(long)]
    pub skip_ntp_check: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Starts consumption
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string accepted by the tracing env-filter.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from([
            "feedpulse",
            "-d",
            "feed.example.com",
            "-k",
            "key123",
            "-c",
            "live",
            "start",
        ]);
        assert_eq!(args.feed_domain, "feed.example.com");
        assert_eq!(args.api_key, "key123");
        assert_eq!(args.channel_name, "live");
        assert_eq!(args.log_level, LogLevel::Info);
        assert!(!args.skip_ntp_check);
        assert!(matches!(args.command, Command::Start));
    }

    #[test]
    fn test_args_parse_long_options() {
        let args = Args::parse_from([
            "feedpulse",
            "--feed-domain",
            "feed.example.com",
            "--api-key",
            "key123",
            "--channel-name",
            "live",
            "--log-level",
            "debug",
            "--skip-ntp-check",
            "start",
        ]);
        assert_eq!(args.log_level, LogLevel::Debug);
        assert!(args.skip_ntp_check);
    }

    #[test]
    fn test_args_missing_required_fails() {
        assert!(Args::try_parse_from(["feedpulse", "start"]).is_err());
        assert!(Args::try_parse_from(["feedpulse", "-d", "x", "-k", "y", "start"]).is_err());
    }

    #[test]
    fn test_args_missing_subcommand_fails() {
        assert!(Args::try_parse_from(["feedpulse", "-d", "x", "-k", "y", "-c", "z"]).is_err());
    }

    #[test]
    fn test_args_rejects_unknown_log_level() {
        assert!(Args::try_parse_from([
            "feedpulse",
            "-d",
            "x",
            "-k",
            "y",
            "-c",
            "z",
            "--log-level",
            "trace",
            "start",
        ])
        .is_err());
    }

    #[test]
    fn test_log_level_filters() {
        assert_eq!(LogLevel::Debug.as_filter(), "debug");
        assert_eq!(LogLevel::Info.as_filter(), "info");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::Error.as_filter(), "error");
    }
}
