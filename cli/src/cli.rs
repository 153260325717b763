use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "scrapectl", version, about = "Operator CLI for the marketplace scraping engine")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect and manage monitoring tasks.
    Tasks {
        #[clap(subcommand)]
        command: TaskCommand,
    },
    /// Inspect and manage the proxy pool.
    Proxies {
        #[clap(subcommand)]
        command: ProxyCommand,
    },
    /// Manage recorded matches.
    FoundItems {
        #[clap(subcommand)]
        command: FoundItemCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// List every monitoring task.
    List,
    /// Delete a task by id.
    Delete { id: i64 },
    /// Reset a task's next_check to now, so it is picked up on the next sweep.
    ResetNextCheck { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum ProxyCommand {
    /// List every proxy with its usage stats.
    List,
    /// Remove proxies whose normalized URL duplicates another entry, keeping the lowest id.
    Dedupe,
    /// Probe every active proxy and update its stats. Not idempotent.
    CheckAll,
}

#[derive(Debug, Subcommand)]
pub enum FoundItemCommand {
    /// Delete every recorded match.
    Purge,
}
