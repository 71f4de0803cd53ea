//! Stores shared by the orchestrator and front ends.

mod accounts;
mod sync_state;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use accounts::{AccountStore, ProviderFactory};
pub use sync_state::SyncStateStore;

use crate::db::Database;

/// Database handle shared by the stores
pub type SharedDatabase = Arc<Mutex<Database>>;

pub fn share_database(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}
