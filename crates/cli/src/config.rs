//! Locations shared with the agent

use std::path::PathBuf;

/// Checkpoint database used by the agent when none is configured
pub fn default_db_path() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("activity-sync")
        .join("sync.db")
}
