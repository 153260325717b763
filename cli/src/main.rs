pub mod cli;
pub mod commands;

use clap::Parser;

use cli::{Cli, Command, FoundItemCommand, ProxyCommand, TaskCommand};
use store::{Db, SqlxFoundItemRepository, SqlxProxyRepository, SqlxTaskRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://scrape_dev.db".to_string());

    let db = Db::connect(&database_url).await?;

    match cli.command {
        Command::Tasks { command } => {
            let repo = SqlxTaskRepository::new((*db.pool).clone());
            match command {
                TaskCommand::List => commands::tasks_list(&repo).await?,
                TaskCommand::Delete { id } => commands::tasks_delete(&repo, id).await?,
                TaskCommand::ResetNextCheck { id } => commands::tasks_reset_next_check(&repo, id).await?,
            }
        }
        Command::Proxies { command } => {
            let repo = SqlxProxyRepository::new((*db.pool).clone());
            match command {
                ProxyCommand::List => commands::proxies_list(&repo).await?,
                ProxyCommand::Dedupe => commands::proxies_dedupe(&repo).await?,
                ProxyCommand::CheckAll => commands::proxies_check_all(&repo).await?,
            }
        }
        Command::FoundItems { command } => {
            let repo = SqlxFoundItemRepository::new((*db.pool).clone());
            match command {
                FoundItemCommand::Purge => commands::found_items_purge(&repo).await?,
            }
        }
    }

    Ok(())
}
