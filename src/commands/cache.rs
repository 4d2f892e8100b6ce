use crate::cli::CacheCommand;
use crate::config::Config;
use crate::error::AppError;
use crate::slack::WorkspaceCache;

pub async fn run_cache_command(config: &Config, command: CacheCommand) -> Result<(), AppError> {
    match command {
        CacheCommand::Invalidate => {
            let cache = WorkspaceCache::new(&config.export_root);
            cache.invalidate().await?;
            tracing::info!("Cleared workspace cache in {}", cache.dir().display());
            println!("Workspace cache cleared.");
        }
    }
    Ok(())
}
