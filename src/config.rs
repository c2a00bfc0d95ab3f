use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

pub const DB_ENV_VAR: &str = "CLASS_CATALOG_DB";

/// `--db`, then `$CLASS_CATALOG_DB`, then `<data dir>/class-catalog/db`.
pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(p) = cli.db.clone() {
        return Ok(p);
    }

    if let Ok(p) = env::var(DB_ENV_VAR)
        && !p.is_empty()
    {
        return Ok(PathBuf::from(p));
    }

    Ok(class_catalog_home()?.join("db"))
}

fn class_catalog_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("class-catalog"))
}

/// Remove the whole database directory. A missing directory is fine.
pub fn clear_db(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        std::fs::remove_dir_all(db_path)
            .with_context(|| format!("Failed to remove database: {}", db_path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn explicit_db_flag_wins() -> Result<()> {
        let cli = Cli::parse_from(["class-catalog", "--db", "/tmp/catalog", "stats"]);
        assert_eq!(resolve_db_path(&cli)?, PathBuf::from("/tmp/catalog"));
        Ok(())
    }

    #[test]
    fn clear_missing_db_is_ok() -> Result<()> {
        let path = std::env::temp_dir().join(format!("class_catalog_absent_{}", std::process::id()));
        clear_db(&path)?;
        assert!(!path.exists());
        Ok(())
    }
}
