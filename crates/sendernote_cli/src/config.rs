//! Command-line and environment configuration for the host.

use clap::Parser;
use sendernote_core::{core_version, DbSource, LogLevel};
use std::path::PathBuf;

const MEMORY_DB: &str = ":memory:";

#[derive(Debug, Parser)]
#[command(name = "sendernote")]
#[command(version = core_version(), about, long_about = None)]
pub struct Cli {
    /// JSON request; read from stdin when omitted
    #[arg(value_name = "REQUEST")]
    pub request: Option<String>,

    /// Database file, or `:memory:` for a throwaway store
    #[arg(long, env = "SENDERNOTE_DB", default_value = "sendernote.sqlite3")]
    pub db: String,

    /// trace|debug|info|warn|error (defaults to debug in debug builds, info otherwise)
    #[arg(long, env = "SENDERNOTE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Absolute directory for rolling log files; logging stays off when unset
    #[arg(long, env = "SENDERNOTE_LOG_DIR")]
    pub log_dir: Option<String>,
}

impl Cli {
    pub fn db_source(&self) -> DbSource {
        match self.db.trim() {
            MEMORY_DB => DbSource::Memory,
            path => DbSource::File(PathBuf::from(path)),
        }
    }

    pub fn log_level(&self) -> String {
        non_blank(self.log_level.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| LogLevel::build_default().as_str().to_string())
    }

    pub fn log_dir(&self) -> Option<&str> {
        non_blank(self.log_dir.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::error::ErrorKind;
    use clap::Parser;
    use sendernote_core::{DbSource, LogLevel};
    use std::path::PathBuf;

    #[test]
    fn request_is_the_optional_positional() {
        let cli = Cli::try_parse_from(["sendernote", r#"{"action":"getAllNotes"}"#]).unwrap();
        assert_eq!(cli.request.as_deref(), Some(r#"{"action":"getAllNotes"}"#));

        let cli = Cli::try_parse_from(["sendernote", "--db", "notes.sqlite3"]).unwrap();
        assert_eq!(cli.request, None);
    }

    #[test]
    fn memory_marker_selects_in_memory_database() {
        let cli = Cli::try_parse_from(["sendernote", "--db", ":memory:"]).unwrap();
        assert_eq!(cli.db_source(), DbSource::Memory);

        let cli = Cli::try_parse_from(["sendernote", "--db", "/tmp/notes.sqlite3"]).unwrap();
        assert_eq!(
            cli.db_source(),
            DbSource::File(PathBuf::from("/tmp/notes.sqlite3"))
        );
    }

    #[test]
    fn log_flags_fall_back_when_blank() {
        let cli = Cli::try_parse_from([
            "sendernote",
            "--log-level",
            " ",
            "--log-dir",
            "   ",
            "--db",
            ":memory:",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), LogLevel::build_default().as_str());
        assert_eq!(cli.log_dir(), None);

        let cli = Cli::try_parse_from([
            "sendernote",
            "--log-level",
            "warn",
            "--log-dir",
            "/var/log/sendernote",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), "warn");
        assert_eq!(cli.log_dir(), Some("/var/log/sendernote"));
    }

    #[test]
    fn version_flag_is_handled_by_the_parser() {
        let err = Cli::try_parse_from(["sendernote", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        let err = Cli::try_parse_from(["sendernote", "--frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }
}
