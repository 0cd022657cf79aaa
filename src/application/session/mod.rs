//! Chat sessions: per-chat state, the event dispatcher and reply rendering.

pub mod manager;
pub mod render;
pub mod service;

pub use manager::SessionManager;
pub use service::{SessionSettings, SignalService};

use crate::application::ml::retrain_controller::RetrainController;

/// Inbound user action, already separated from the transport's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    /// Free text naming a token to add to the tracked list.
    Track(String),
    Signal(String),
    Data(String),
    Clear,
}

impl SessionEvent {
    /// Maps chat text or a button payload to an event.
    ///
    /// `/start`, `/signal X`, `/data X`, `/clear`, `signal_X` and `clear` are
    /// commands; anything else is a token to track.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some(token) = text.strip_prefix("signal_") {
            return SessionEvent::Signal(token.to_string());
        }
        if text == "clear" {
            return SessionEvent::Clear;
        }

        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let arg = parts.collect::<Vec<_>>().join(" ");
        match command {
            "/start" => SessionEvent::Start,
            "/clear" => SessionEvent::Clear,
            "/signal" => SessionEvent::Signal(arg),
            "/data" => SessionEvent::Data(arg),
            _ => SessionEvent::Track(text.to_string()),
        }
    }
}

/// State owned by one chat. Never shared across chats.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub chat_id: i64,
    pub tracked: Vec<String>,
    pub retrain: RetrainController,
}

impl SessionContext {
    pub fn new(chat_id: i64, accuracy_alpha: f64, retrain_threshold: f64) -> Self {
        Self {
            chat_id,
            tracked: Vec::new(),
            retrain: RetrainController::new(accuracy_alpha, retrain_threshold),
        }
    }
}
