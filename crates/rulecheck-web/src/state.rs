use std::sync::Arc;

use rulecheck_core::Checker;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub checker: Arc<Checker>,
}
