//! Shared application state.

use std::sync::Arc;

use crate::completion::CompletionBackend;
use crate::settings::Settings;
use crate::ws::ConnectionTracker;

/// State shared by all handlers.
///
/// Everything in here is either immutable (settings, the completion client's
/// configuration) or internally synchronized (the connection tracker), so
/// sessions never contend with each other.
#[derive(Clone)]
pub struct AppState {
    pub completion: Arc<dyn CompletionBackend>,
    pub connections: Arc<ConnectionTracker>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(completion: Arc<dyn CompletionBackend>, settings: Settings) -> Self {
        Self {
            completion,
            connections: Arc::new(ConnectionTracker::new()),
            settings: Arc::new(settings),
        }
    }
}
