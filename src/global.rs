//! Process-Wide Instance
//!
//! Most code should construct a [`WriteBackCache`] and pass it around. For
//! callers that need a single shared cache, `init` wires the stores once;
//! later calls return the instance built by the first one.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::cache::{CacheSettings, WriteBackCache};
use crate::store::{CacheStore, DurableStore};

static INSTANCE: OnceLock<WriteBackCache> = OnceLock::new();

/// Initializes the process-wide cache. Only the first call has an effect.
pub fn init(cache: Arc<dyn CacheStore>, durable: Arc<dyn DurableStore>) -> &'static WriteBackCache {
    init_with_settings(cache, durable, CacheSettings::default())
}

pub fn init_with_settings(
    cache: Arc<dyn CacheStore>,
    durable: Arc<dyn DurableStore>,
    settings: CacheSettings,
) -> &'static WriteBackCache {
    let mut created = false;
    let instance = INSTANCE.get_or_init(|| {
        created = true;
        WriteBackCache::with_settings(cache, durable, settings)
    });
    if created {
        info!("process-wide cache initialized");
    } else {
        debug!("process-wide cache already initialized, ignoring new stores");
    }
    instance
}

/// Returns the process-wide cache, if `init` has run.
pub fn instance() -> Option<&'static WriteBackCache> {
    INSTANCE.get()
}
