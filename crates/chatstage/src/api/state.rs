//! Application state shared across handlers.

use crate::app::ChatApp;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatApp,
}

impl AppState {
    pub fn new(chat: ChatApp) -> Self {
        Self { chat }
    }
}
