pub mod disk;
pub mod memory;

use crate::core::cache::KeyValueCollection;
use crate::core::config::AppConfig;
use disk::DiskCollection;
use memory::MemoryCollection;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens the on-disk store under the configured data directory, falling back
/// to an in-memory store when that is not possible.
pub fn open_store(config: &AppConfig) -> Arc<dyn KeyValueCollection> {
    let opened = config
        .data_dir()
        .and_then(|path| DiskCollection::open(&path.join("store")));

    match opened {
        Ok(collection) => {
            debug!("Opened on-disk store");
            Arc::new(collection)
        }
        Err(e) => {
            warn!(error = %e, "Falling back to in-memory store");
            Arc::new(MemoryCollection::new())
        }
    }
}
