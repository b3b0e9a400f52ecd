//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use albumdl_core::download::constants::DEFAULT_TIMEOUT_SECS;
use albumdl_core::{DEFAULT_CONCURRENCY, SocksProxy, Target};

/// Download albums from myzuka.
///
/// Give an album URL (containing `/Album/`) to download that album, or an
/// artist URL (containing `/Artist/`) to download all of the artist's albums.
/// Each album lands in an "Artist - Title (Year)" directory; interrupted
/// downloads resume where they stopped on the next run.
#[derive(Parser, Debug)]
#[command(name = "albumdl")]
#[command(author, version, about)]
pub struct Args {
    /// Album or artist page URL
    #[arg(value_parser = parse_target)]
    pub url: Target,

    /// Directory the album directories are created in
    #[arg(short, long, default_value = ".")]
    pub path: PathBuf,

    /// Route all traffic through a SOCKS5 proxy (HOST:PORT)
    #[arg(short, long, value_name = "HOST:PORT")]
    pub socks: Option<SocksProxy>,

    /// Connect and read timeout in seconds (1-600)
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout: u64,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'n', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_target(value: &str) -> Result<Target, String> {
    Target::parse(value)
        .ok_or_else(|| "unable to recognize url, it should contain '/Artist/' or '/Album/'".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALBUM: &str = "https://myzuka.club/Album/630746/The-6-Cello-Suites-Cd1-1994";

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["albumdl", ALBUM]).unwrap();
        assert_eq!(args.url, Target::Album(ALBUM.to_string()));
        assert_eq!(args.path, PathBuf::from("."));
        assert_eq!(args.socks, None);
        assert_eq!(args.timeout, 10);
        assert_eq!(args.concurrency, 3);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(!args.no_progress);
    }

    #[test]
    fn test_cli_artist_url_recognized() {
        let args =
            Args::try_parse_from(["albumdl", "https://myzuka.club/Artist/7110/Bach/Albums"])
                .unwrap();
        assert!(matches!(args.url, Target::Artist(_)));
    }

    #[test]
    fn test_cli_missing_url_rejected() {
        let err = Args::try_parse_from(["albumdl"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_unrecognized_url_rejected() {
        let err = Args::try_parse_from(["albumdl", "https://myzuka.club/Song/1/X"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["albumdl", "-vv", ALBUM]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["albumdl", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    // ==================== Path and Proxy Tests ====================

    #[test]
    fn test_cli_path_short_and_long() {
        let args = Args::try_parse_from(["albumdl", "-p", "/tmp/music", ALBUM]).unwrap();
        assert_eq!(args.path, PathBuf::from("/tmp/music"));
        let args = Args::try_parse_from(["albumdl", "--path", "out", ALBUM]).unwrap();
        assert_eq!(args.path, PathBuf::from("out"));
    }

    #[test]
    fn test_cli_socks_parsed() {
        let args = Args::try_parse_from(["albumdl", "-s", "127.0.0.1:9050", ALBUM]).unwrap();
        assert_eq!(args.socks, Some(SocksProxy::new("127.0.0.1", 9050)));
    }

    #[test]
    fn test_cli_socks_without_port_rejected() {
        let err = Args::try_parse_from(["albumdl", "--socks", "localhost", ALBUM]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    // ==================== Range Tests ====================

    #[test]
    fn test_cli_timeout_bounds() {
        let args = Args::try_parse_from(["albumdl", "-t", "600", ALBUM]).unwrap();
        assert_eq!(args.timeout, 600);
        let err = Args::try_parse_from(["albumdl", "-t", "0", ALBUM]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["albumdl", "-n", "100", ALBUM]).unwrap();
        assert_eq!(args.concurrency, 100);
        let err = Args::try_parse_from(["albumdl", "-n", "0", ALBUM]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let err = Args::try_parse_from(["albumdl", "--concurrency", "101", ALBUM]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
