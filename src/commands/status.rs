//! `status` command: list cached series and their coverage.

use std::path::PathBuf;

use crate::error::Result;
use crate::services::cache::CacheStore;

pub fn run(cache_dir: Option<PathBuf>) -> Result<()> {
    let base_dir = match cache_dir {
        Some(dir) => dir,
        None => CacheStore::default_dir()?,
    };

    if !base_dir.exists() {
        println!("Cache directory {} does not exist yet", base_dir.display());
        return Ok(());
    }

    let store = CacheStore::new(base_dir)?;
    let keys = store.list_series()?;

    if keys.is_empty() {
        println!("No cached series in {}", store.base_dir().display());
        return Ok(());
    }

    println!("Cached series in {}:", store.base_dir().display());
    for key in keys {
        let rows = store.row_count(&key)?;
        match store.coverage(&key)? {
            Some(coverage) => println!(
                "  {:<20} {} .. {} ({} candles)",
                key.to_string(),
                coverage.first_open,
                coverage.last_open,
                rows
            ),
            None => println!("  {:<20} empty", key.to_string()),
        }
    }

    Ok(())
}
