use tracing::{info, warn};

use crate::client::{ChatError, CompletionBody, CompletionRequest, TEMPERATURE};
use crate::settings::{resolve_api_key, ChatSettings, SettingsStore};
use crate::transcript::{Bubble, Transcript};

pub const WELCOME_TEXT: &str = "你好！我是AI导览员。欢迎就辛亥革命相关主题提问。";
pub const MISSING_KEY_TEXT: &str = "请先在设置中粘贴 API Key。";
pub const SETTINGS_SAVED_TEXT: &str = "设置已保存，可以开始提问了。";

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Blank input.
    Ignored,
    /// A call is already in flight.
    Busy,
    /// No credential anywhere; the settings view was opened.
    MissingCredential,
    /// The user turn was recorded; the caller must run this request and
    /// hand the result back through [`ChatSession::complete`].
    Dispatch(CompletionRequest),
}

/// Conversation state behind the chat widget, independent of how the
/// request is carried out or how bubbles are drawn.
#[derive(Debug)]
pub struct ChatSession {
    transcript: Transcript,
    bubbles: Vec<Bubble>,
    fields: ChatSettings,
    saved: ChatSettings,
    store: Option<SettingsStore>,
    build_key: Option<String>,
    settings_open: bool,
    sending: bool,
    welcomed: bool,
}

impl ChatSession {
    pub fn new(store: Option<SettingsStore>, build_key: Option<&str>) -> Self {
        let saved = store
            .as_ref()
            .and_then(SettingsStore::load_or_warn)
            .unwrap_or_default();
        let fields = ChatSettings::prefilled().overlay_saved(&saved);
        Self {
            transcript: Transcript::seeded(),
            bubbles: Vec::new(),
            fields,
            saved,
            store,
            build_key: build_key.map(str::to_string),
            settings_open: false,
            sending: false,
            welcomed: false,
        }
    }

    /// Shows the welcome bubble the first time only.
    pub fn open(&mut self) {
        if !self.welcomed {
            self.welcomed = true;
            self.bubbles.push(Bubble::guide(WELCOME_TEXT));
        }
    }

    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }
        if self.sending {
            return SubmitOutcome::Busy;
        }

        let saved_key = Some(self.saved.api_key.as_str());
        let Some(api_key) = resolve_api_key(self.build_key.as_deref(), &self.fields.api_key, saved_key)
        else {
            self.settings_open = true;
            self.bubbles.push(Bubble::guide(MISSING_KEY_TEXT));
            info!("chat_missing_credential");
            return SubmitOutcome::MissingCredential;
        };

        self.bubbles.push(Bubble::visitor(text));
        self.transcript.push_user(text);
        self.sending = true;

        SubmitOutcome::Dispatch(CompletionRequest {
            endpoint: self.fields.effective_base_url().to_string(),
            api_key,
            body: CompletionBody {
                model: self.fields.effective_model().to_string(),
                messages: self.transcript.messages().to_vec(),
                temperature: TEMPERATURE,
            },
        })
    }

    /// Applies the result of the request produced by the last `Dispatch`.
    pub fn complete(&mut self, result: Result<String, ChatError>) {
        self.sending = false;
        match result {
            Ok(reply) => {
                self.bubbles.push(Bubble::guide(reply.clone()));
                self.transcript.push_assistant(reply);
            }
            Err(error) => {
                warn!(error = %error, "chat_request_failed");
                self.bubbles.push(Bubble::guide(format!("调用失败：{error}")));
            }
        }
    }

    pub fn toggle_settings(&mut self) {
        self.settings_open = !self.settings_open;
    }

    pub fn set_base_url(&mut self, value: &str) {
        self.fields.base_url = value.to_string();
    }

    pub fn set_model(&mut self, value: &str) {
        self.fields.model = value.to_string();
    }

    pub fn set_api_key(&mut self, value: &str) {
        self.fields.api_key = value.to_string();
    }

    /// Persists the trimmed fields. A failed write is logged; the values
    /// still apply for this run.
    pub fn save_settings(&mut self) {
        let trimmed = self.fields.trimmed();
        if let Some(store) = &self.store {
            if let Err(error) = store.save(&trimmed) {
                warn!(error = %error, "chat_settings_save_failed");
            }
        }
        self.saved = trimmed;
        self.settings_open = false;
        self.bubbles.push(Bubble::guide(SETTINGS_SAVED_TEXT));
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn fields(&self) -> &ChatSettings {
        &self.fields
    }

    pub fn is_settings_open(&self) -> bool {
        self.settings_open
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }
}
