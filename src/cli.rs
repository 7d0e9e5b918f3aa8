//! Minimal CLI parsing for one-shot scans.

use std::env;

/// Scan to queue at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupScan {
    All,
    Movies,
    Series,
    Overwrite,
}

impl StartupScan {
    pub fn from_arg(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "all" | "full" => Some(Self::All),
            "movie" | "movies" => Some(Self::Movies),
            "series" | "tv" => Some(Self::Series),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct CliOptions {
    pub scan: Option<StartupScan>,
    /// Exit once the queued scan drains instead of serving HTTP
    pub no_server: bool,
}

impl CliOptions {
    pub fn from_args() -> Self {
        Self::parse(env::args().skip(1))
    }

    pub fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut options = CliOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--no-server" => options.no_server = true,
                "--scan" => {
                    if let Some(value) = args.next() {
                        options.scan = StartupScan::from_arg(&value);
                    }
                }
                _ if arg.starts_with("--scan=") => {
                    if let Some(value) = arg.split_once('=').map(|(_, v)| v) {
                        options.scan = StartupScan::from_arg(value);
                    }
                }
                _ => {}
            }
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliOptions {
        CliOptions::parse(args.iter().map(|a| a.to_string()))
    }

    #[test]
    fn test_scan_flags() {
        assert_eq!(parse(&["--scan=movies"]).scan, Some(StartupScan::Movies));
        assert_eq!(parse(&["--scan", "overwrite"]).scan, Some(StartupScan::Overwrite));
        assert_eq!(parse(&["--scan=bogus"]).scan, None);

        let options = parse(&["--no-server", "--scan=all"]);
        assert!(options.no_server);
        assert_eq!(options.scan, Some(StartupScan::All));
    }
}
