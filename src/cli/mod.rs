//! CLI command definitions for task-manager.
//!
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Parser, Subcommand};

/// Task manager server and administration tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Address to bind (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind (overrides config)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default if no subcommand given)
    Serve,

    /// Create a worker with superuser rights
    CreateSuperuser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        email: Option<String>,

        /// Position name; created if it does not exist
        #[arg(long, default_value = "Administrator")]
        position: String,
    },

    /// Grant or revoke the right to manage one entity kind
    Grant {
        #[arg(long)]
        username: String,

        /// Entity kind, e.g. position, task-type, tag, project, team, worker, task
        #[arg(long)]
        kind: String,

        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::parse_from(["task-manager"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn grant_parses_revoke_flag() {
        let cli = Cli::parse_from([
            "task-manager",
            "grant",
            "--username",
            "alice",
            "--kind",
            "task-type",
            "--revoke",
        ]);
        match cli.command {
            Some(Command::Grant { username, kind, revoke }) => {
                assert_eq!(username, "alice");
                assert_eq!(kind, "task-type");
                assert!(revoke);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::parse_from(["task-manager", "serve", "--port", "9000", "-v"]);
        assert_eq!(cli.port, Some(9000));
        assert!(cli.verbose);
    }
}
