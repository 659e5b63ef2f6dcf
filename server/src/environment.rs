use std::sync::Arc;

use log::Logger;

use crate::store::Store;
use crate::urls::Urls;

pub type SharedStore = dyn Store + Send + Sync;

/// Everything a request handler needs, constructed once in `main` and
/// cloned per route. The backend choice is baked into `store` at startup
/// and never changes for the life of the process.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub store: Arc<SharedStore>,
    pub urls: Arc<Urls>,
    pub config: Config,
}

impl Environment {
    pub fn new(logger: Arc<Logger>, store: Arc<SharedStore>, urls: Arc<Urls>, config: Config) -> Self {
        Self {
            logger,
            store,
            urls,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// In production mode 5xx responses carry no error detail.
    pub(crate) production: bool,
}

impl Config {
    pub fn new(production: bool) -> Self {
        Self { production }
    }
}
