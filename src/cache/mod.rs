pub mod lookup;

pub use lookup::LookupCache;

use crate::config::Config;

/// A fresh lookup cache sized from configuration. Create one per reconciliation run.
pub fn init_cache(config: &Config) -> LookupCache {
    LookupCache::new(config.cache_max_capacity, config.cache_ttl)
}
