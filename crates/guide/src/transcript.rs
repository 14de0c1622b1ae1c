use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str =
    "你是一名博物馆AI导览员，请用简体中文回答，主题围绕辛亥革命与中国近代史，保持准确、中立、易懂。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Turns sent to the completion endpoint. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn seeded() -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::System, SYSTEM_PROMPT)],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages
            .push(ChatMessage::new(Role::Assistant, content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::seeded()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    Visitor,
    Guide,
}

/// A line shown in the widget. Notices and errors live here only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub kind: BubbleKind,
    pub text: String,
}

impl Bubble {
    pub fn visitor(text: impl Into<String>) -> Self {
        Self {
            kind: BubbleKind::Visitor,
            text: text.into(),
        }
    }

    pub fn guide(text: impl Into<String>) -> Self {
        Self {
            kind: BubbleKind::Guide,
            text: text.into(),
        }
    }
}
