// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use crate::cli::{completion, convert, info};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Level and message only.
    #[default]
    Short,
    /// Include timestamps.
    Medium,
    /// Include timestamps, targets, and thread names.
    Long,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Convert(convert::ConvertCli),
    Info(info::InfoCli),
    Completion(completion::CompletionCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", value_enum, default_value_t)]
    pub log_level: LogLevel,

    /// Output format for log messages.
    #[arg(long, global = true, value_name = "FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,
}

/// Set up the global tracing subscriber. Log messages are written to stderr so
/// that they don't mix with command output.
pub fn init_logging(log_level: LogLevel, log_format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::from(log_level));

    match log_format {
        LogFormat::Short => builder.without_time().with_target(false).init(),
        LogFormat::Medium => builder.with_target(false).init(),
        LogFormat::Long => builder.with_thread_names(true).init(),
    }
}

pub fn main(logging_initialized: &AtomicBool, cancel_signal: &AtomicBool) -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level, cli.log_format);
    logging_initialized.store(true, Ordering::SeqCst);

    match cli.command {
        Command::Convert(c) => convert::convert_main(&c, cancel_signal),
        Command::Info(c) => info::info_main(&c),
        Command::Completion(c) => completion::completion_main(&c),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_log_options() {
        let cli = Cli::try_parse_from([
            "sdat2img",
            "info",
            "--log-level",
            "debug",
            "--log-format",
            "long",
        ])
        .unwrap();

        assert_eq!(cli.log_level, LogLevel::Debug);
        assert_eq!(cli.log_format, LogFormat::Long);
    }
}
