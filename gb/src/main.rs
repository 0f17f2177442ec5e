//! GiroBot - gyro light command bridge
//!
//! CLI entry point for the daemon and its client commands.

use std::fs;
use std::io::{BufRead, BufReader};

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::debug;

use girobot::cli::{
    Cli, Command, OutputFormat, RepliesCommand, config_arg_from, default_user, generate_after_help, get_log_path,
    help_socket_path,
};
use girobot::config::Config;
use girobot::correlator::{CorrelatorStatus, Outcome, RequestKind};
use girobot::daemon::run_daemon;
use girobot::ipc::DaemonClient;
use girobot::logging;
use girobot::replies::ReplyStore;

#[tokio::main]
async fn main() -> Result<()> {
    let help_socket = help_socket_path(config_arg_from(std::env::args_os()).as_ref());
    let cmd = Cli::command().after_help(generate_after_help(&help_socket));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    logging::init(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Serve { loopback } => run_daemon(&config, loopback).await,
        Command::Gyro { user } => cmd_command(&config, RequestKind::TurnOn, user).await,
        Command::Ping { user } => cmd_command(&config, RequestKind::Ping, user).await,
        Command::Status { format } => cmd_status(&config, format).await,
        Command::Shutdown => cmd_shutdown(&config).await,
        Command::Replies { command } => cmd_replies(&config, command),
        Command::Logs { lines } => cmd_logs(lines),
    }
}

fn client_for(config: &Config) -> DaemonClient {
    DaemonClient::with_socket_path(config.ipc.socket_path()).for_correlator_timeout(config.correlator.timeout())
}

/// Send a device command through the daemon and print the rendered reply
async fn cmd_command(config: &Config, kind: RequestKind, user: Option<String>) -> Result<()> {
    let user = user.unwrap_or_else(default_user);
    debug!(%kind, %user, "cmd_command: called");

    let (text, outcome) = client_for(config)
        .command(kind, &user)
        .await
        .context("Is the daemon running? Start it with `gb serve`")?;

    let text = match outcome {
        Outcome::Acknowledged { .. } => text.green(),
        Outcome::TimedOut | Outcome::PublishFailed { .. } => text.red(),
        Outcome::Superseded => text.yellow(),
    };
    println!("{}", text);
    Ok(())
}

async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let (status, version) = client_for(config)
        .status()
        .await
        .context("Is the daemon running? Start it with `gb serve`")?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": version,
                "status": status,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => print_status(&status, &version),
    }
    Ok(())
}

fn print_status(status: &CorrelatorStatus, version: &str) {
    println!("GiroBot Status");
    println!("--------------");
    println!("Version: {}", version);
    match status.pending {
        Some(kind) => println!("Pending: {}", kind.to_string().yellow()),
        None => println!("Pending: none"),
    }
    match status.last_alive {
        Some(at) => println!("Last alive: {}", at.to_rfc3339().green()),
        None => println!("Last alive: {}", "never".red()),
    }
    match status.last_ack {
        Some(at) => println!("Last ack: {}", at.to_rfc3339()),
        None => println!("Last ack: never"),
    }
    println!();
    println!("Requests:     {}", status.requests_started);
    println!("Acknowledged: {}", status.acknowledged);
    println!("Timed out:    {}", status.timed_out);
    println!("Superseded:   {}", status.superseded);
    println!("Publish fail: {}", status.publish_failures);
    println!("Ignored msgs: {}", status.ignored_messages);
}

async fn cmd_shutdown(config: &Config) -> Result<()> {
    debug!("cmd_shutdown: called");
    let client = client_for(config);
    if !client.socket_exists() {
        println!("GiroBot daemon is not running");
        return Ok(());
    }
    client.shutdown().await?;
    println!("Shutdown requested");
    Ok(())
}

/// Edit the reply file directly; a running daemon picks changes up on SIGHUP
fn cmd_replies(config: &Config, command: RepliesCommand) -> Result<()> {
    debug!(?command, "cmd_replies: called");
    let mut store = ReplyStore::load_or_create(&config.replies.path)?;

    match command {
        RepliesCommand::List => {
            if store.list().is_empty() {
                println!("No replies configured ({})", store.path().display());
            }
            for (index, reply) in store.list().iter().enumerate() {
                println!("{:>3}  {}", index, reply);
            }
        }
        RepliesCommand::Add { text } => {
            store.add(&text)?;
            println!("Added reply #{}", store.list().len() - 1);
        }
        RepliesCommand::Remove { index } => {
            let removed = store.remove(index)?;
            println!("Removed: {}", removed);
        }
    }
    Ok(())
}

fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);

    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
