//! Shared state handed to configure procedures, event handlers and converters.

use crate::config::Config;
use crate::store::Store;
use std::sync::Arc;

/// One per bridge process. Cheap to clone, clones share the store.
#[derive(Clone, Default)]
pub struct Context {
    pub store: Arc<Store>,
    pub config: Config,
}

impl Context {
    pub fn new(config: Config) -> Self {
        Self {
            store: Arc::new(Store::new()),
            config,
        }
    }
}
