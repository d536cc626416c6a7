//! HTTP API for Pollsmith
//!
//! Hosts the Telegram webhook and a JSON API over the same poll runtimes.

mod handlers;
mod types;
mod webhook;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::runtime::ProductionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ProductionManager>,
}

impl AppState {
    pub fn new(runtime: ProductionManager) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }
}
