//! HTTP API for chat turns

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::runtime::ProductionTurnService;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub turns: Arc<ProductionTurnService>,
}

impl AppState {
    pub fn new(turns: Arc<ProductionTurnService>) -> Self {
        Self { turns }
    }
}
