use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum Strategy {
    Lowest,
    Highest,
    RateBased,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = "Plays an on-demand DASH presentation into a local segment cache.")]
pub struct Args {
    #[arg(short, long)]
    pub mpd_url: String,
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,
    #[arg(short, long, default_value = "rate-based")]
    pub strategy: Strategy,
    /// Directory for remuxed segments. A private temporary directory when omitted.
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
    /// JSON player configuration, see `PlayerConfig`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Overrides the used cache capacity of the configuration.
    #[arg(long)]
    pub cache_bytes: Option<u64>,
    /// Seek to this position (seconds) after opening.
    #[arg(long)]
    pub start_at: Option<f64>,
}

pub fn parse_args() -> Args {
    Args::parse()
}

pub fn get_log_level_filter(args: &Args) -> LevelFilter {
    match args.log_level {
        LogLevel::Trace => LevelFilter::TRACE,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let args = Args::try_parse_from(["dash_pipeline", "--mpd-url", "https://example.com/a.mpd"]).unwrap();
        assert_eq!(args.strategy, Strategy::RateBased);
        assert_eq!(get_log_level_filter(&args), LevelFilter::INFO);
        assert!(args.cache_dir.is_none());
    }

    #[test]
    fn test_parse_strategy() {
        let args = Args::try_parse_from([
            "dash_pipeline",
            "-m",
            "https://example.com/a.mpd",
            "-s",
            "highest",
            "-l",
            "trace",
            "--cache-bytes",
            "1024",
        ])
        .unwrap();
        assert_eq!(args.strategy, Strategy::Highest);
        assert_eq!(args.cache_bytes, Some(1024));
        assert_eq!(get_log_level_filter(&args), LevelFilter::TRACE);
    }
}
