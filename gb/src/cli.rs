//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;
use crate::ipc::get_socket_path;

/// GiroBot - turn the office gyro light on from the command line
#[derive(Parser)]
#[command(
    name = "gb",
    about = "Drive the GiroBot gyro light over MQTT and wait for its acknowledgment",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the daemon in the foreground
    Serve {
        /// Use an in-memory bus with a simulated device instead of MQTT
        #[arg(long)]
        loopback: bool,
    },

    /// Turn the gyro on
    Gyro {
        /// Name reported in the daemon log
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Ping the gyro and report the round-trip latency
    Ping {
        /// Name reported in the daemon log
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show correlator status
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Stop the daemon
    Shutdown,

    /// Manage the reply texts sent when the gyro turns on
    Replies {
        #[command(subcommand)]
        command: RepliesCommand,
    },

    /// Show daemon logs
    Logs {
        /// Number of lines to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}

/// Reply text subcommands
#[derive(Debug, Subcommand)]
pub enum RepliesCommand {
    /// List replies with their index
    List,

    /// Add a reply
    Add {
        /// Reply text
        text: String,
    },

    /// Remove a reply by index
    Remove {
        /// Index as shown by `replies list`
        index: usize,
    },
}

/// Name used for commands when `--user` is absent
pub fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".to_string())
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("girobot")
        .join("logs")
        .join("girobot.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Find `--config`/`-c` in raw arguments before clap has parsed them
///
/// The after_help text is built before parsing, so it needs the config file
/// early to show the socket the daemon actually uses.
pub fn config_arg_from<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: Into<std::ffi::OsString>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut found = None;
    while let Some(arg) = args.next() {
        let Some(text) = arg.to_str() else {
            continue;
        };
        if text == "--" {
            break;
        }
        if text == "--config" || text == "-c" {
            found = args.next().map(PathBuf::from);
        } else if let Some(value) = text.strip_prefix("--config=") {
            found = Some(PathBuf::from(value));
        } else if let Some(value) = text.strip_prefix("-c").filter(|v| !v.is_empty()) {
            found = Some(PathBuf::from(value.strip_prefix('=').unwrap_or(value)));
        }
    }
    found
}

/// Socket path shown in the help text for the given `--config`
///
/// Falls back to the runtime-dir default when the config cannot be loaded.
pub fn help_socket_path(config_path: Option<&PathBuf>) -> PathBuf {
    match Config::load(config_path) {
        Ok(config) => config.ipc.socket_path(),
        Err(e) => {
            debug!(error = %e, "help_socket_path: config not loadable, using default socket");
            get_socket_path()
        }
    }
}

/// Generate the after_help text with daemon socket and log locations
pub fn generate_after_help(socket_path: &std::path::Path) -> String {
    debug!(?socket_path, "generate_after_help: called");
    let mut help = String::new();

    help.push_str("Daemon:\n");
    let (icon, state) = if socket_path.exists() {
        ("\u{2705}", "socket present")
    } else {
        ("\u{274C}", "not running")
    };
    help.push_str(&format!("  {} {} ({})\n", icon, state, socket_path.display()));

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Output format for the status command
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["gb"]).is_err());
    }

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from(["gb", "serve"]);
        assert!(matches!(cli.command, Command::Serve { loopback: false }));

        let cli = Cli::parse_from(["gb", "serve", "--loopback"]);
        assert!(matches!(cli.command, Command::Serve { loopback: true }));
    }

    #[test]
    fn test_cli_parse_gyro_with_user() {
        let cli = Cli::parse_from(["gb", "gyro", "--user", "alice"]);
        match cli.command {
            Command::Gyro { user } => assert_eq!(user.as_deref(), Some("alice")),
            other => panic!("Expected Gyro, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_ping_without_user() {
        let cli = Cli::parse_from(["gb", "ping"]);
        assert!(matches!(cli.command, Command::Ping { user: None }));
    }

    #[test]
    fn test_cli_parse_status_json() {
        let cli = Cli::parse_from(["gb", "status", "--format", "json"]);
        match cli.command {
            Command::Status { format } => assert_eq!(format, OutputFormat::Json),
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_replies() {
        let cli = Cli::parse_from(["gb", "replies", "add", "Lumos :mage:"]);
        match cli.command {
            Command::Replies {
                command: RepliesCommand::Add { text },
            } => assert_eq!(text, "Lumos :mage:"),
            other => panic!("Expected replies add, got {:?}", other),
        }

        let cli = Cli::parse_from(["gb", "replies", "remove", "2"]);
        assert!(matches!(
            cli.command,
            Command::Replies {
                command: RepliesCommand::Remove { index: 2 }
            }
        ));

        assert!(Cli::try_parse_from(["gb", "replies", "remove", "two"]).is_err());
    }

    #[test]
    fn test_cli_with_global_options() {
        let cli = Cli::parse_from(["gb", "shutdown", "-c", "/path/to/girobot.yml", "-l", "debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/girobot.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Shutdown));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path_location() {
        assert!(get_log_path().ends_with("girobot/logs/girobot.log"));
    }

    #[test]
    fn test_after_help_mentions_logs() {
        let help = generate_after_help(std::path::Path::new("/nonexistent/girobot.sock"));
        assert!(help.contains("not running"));
        assert!(help.contains("girobot.log"));
    }

    #[test]
    fn test_config_arg_from_forms() {
        assert_eq!(config_arg_from(["gb", "status"]), None);
        assert_eq!(
            config_arg_from(["gb", "status", "--config", "/etc/gb.yml"]),
            Some(PathBuf::from("/etc/gb.yml"))
        );
        assert_eq!(config_arg_from(["gb", "-c", "a.yml", "ping"]), Some(PathBuf::from("a.yml")));
        assert_eq!(config_arg_from(["gb", "--config=b.yml", "ping"]), Some(PathBuf::from("b.yml")));
        assert_eq!(config_arg_from(["gb", "-cc.yml", "ping"]), Some(PathBuf::from("c.yml")));
        assert_eq!(config_arg_from(["gb", "--", "--config", "x.yml"]), None);
        assert_eq!(config_arg_from(["gb", "--config"]), None);
    }

    #[test]
    fn test_help_socket_path_uses_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let config_path = temp.path().join("girobot.yml");
        let socket = temp.path().join("custom.sock");
        std::fs::write(&config_path, format!("ipc:\n  socket-path: {}\n", socket.display())).unwrap();

        assert_eq!(help_socket_path(Some(&config_path)), socket);
        assert_eq!(help_socket_path(Some(&temp.path().join("missing.yml"))), get_socket_path());

        let help = generate_after_help(&help_socket_path(Some(&config_path)));
        assert!(help.contains("custom.sock"));
    }
}
