//! The museum guide chat: transcript, settings, and the completion call.

mod atomic_io;
pub mod client;
pub mod dispatcher;
pub mod session;
pub mod settings;
pub mod transcript;

pub use client::{
    reply_text_from_body, ChatError, CompletionBackend, CompletionBody, CompletionRequest,
    HttpCompletionBackend, EMPTY_REPLY_FALLBACK, TEMPERATURE,
};
pub use dispatcher::ChatDispatcher;
pub use session::{
    ChatSession, SubmitOutcome, MISSING_KEY_TEXT, SETTINGS_SAVED_TEXT, WELCOME_TEXT,
};
pub use settings::{
    build_api_key, resolve_api_key, ChatSettings, SettingsError, SettingsStore, DEFAULT_BASE_URL,
    DEFAULT_MODEL, SETTINGS_FILE_NAME,
};
pub use transcript::{Bubble, BubbleKind, ChatMessage, Role, Transcript, SYSTEM_PROMPT};
