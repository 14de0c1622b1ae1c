use std::collections::VecDeque;

use engine::{BubbleStyle, ChatLineView, ChatPanelView, InputSnapshot, KeyPress};
use guide::{BubbleKind, ChatDispatcher, ChatSession, SubmitOutcome};
use tracing::{info, warn};

const MAX_HISTORY_LINES: usize = 32;
const MAX_INPUT_CHARS: usize = 200;
const COMMAND_HELP: &str = "/url <v>  /model <v>  /key <v>  /save  /settings";

/// The in-game chat widget: an input line with history on top of a
/// [`ChatSession`]. While open it consumes every key press.
pub(crate) struct ChatPanel {
    is_open: bool,
    current_line: String,
    history: VecDeque<String>,
    history_cursor: Option<usize>,
    history_draft: Option<String>,
    session: ChatSession,
    dispatcher: Option<ChatDispatcher>,
}

impl ChatPanel {
    /// Without a dispatcher submissions fail with a visible error bubble.
    pub(crate) fn new(session: ChatSession, dispatcher: Option<ChatDispatcher>) -> Self {
        Self {
            is_open: false,
            current_line: String::new(),
            history: VecDeque::new(),
            history_cursor: None,
            history_draft: None,
            session,
            dispatcher,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.is_open
    }

    pub(crate) fn toggle_open(&mut self) {
        if self.is_open {
            self.close();
        } else {
            self.is_open = true;
            self.session.open();
            info!("chat_opened");
        }
    }

    fn close(&mut self) {
        self.is_open = false;
        self.clear_input_line_state();
        info!("chat_closed");
    }

    /// Applies this tick's typed text and key presses. Returns the presses
    /// the panel did not consume, in order.
    pub(crate) fn handle_input(&mut self, input: &InputSnapshot) -> Vec<KeyPress> {
        if self.is_open {
            self.append_printable_text(input.typed_text());
        }

        let mut unconsumed = Vec::new();
        for key in input.key_presses() {
            match (*key, self.is_open) {
                (KeyPress::ToggleChat, _) => self.toggle_open(),
                (key, false) => unconsumed.push(key),
                (KeyPress::Escape, true) => self.close(),
                (KeyPress::Enter, true) => self.submit_current_line(),
                (KeyPress::Backspace, true) => {
                    self.current_line.pop();
                }
                (KeyPress::ArrowUp, true) => self.navigate_history_up(),
                (KeyPress::ArrowDown, true) => self.navigate_history_down(),
                (_, true) => {}
            }
        }
        unconsumed
    }

    /// Collects finished calls. Runs whether or not the panel is open.
    pub(crate) fn poll(&mut self) {
        let Some(dispatcher) = self.dispatcher.as_mut() else {
            return;
        };
        while let Some(result) = dispatcher.poll() {
            self.session.complete(result);
        }
    }

    pub(crate) fn view(&self) -> Option<ChatPanelView> {
        if !self.is_open {
            return None;
        }

        let lines = self
            .session
            .bubbles()
            .iter()
            .map(|bubble| ChatLineView {
                style: match bubble.kind {
                    BubbleKind::Visitor => BubbleStyle::Visitor,
                    BubbleKind::Guide => BubbleStyle::Guide,
                },
                text: bubble.text.clone(),
            })
            .collect();

        let settings_lines = if self.session.is_settings_open() {
            let fields = self.session.fields();
            let key_state = if fields.api_key.trim().is_empty() {
                "(not set)"
            } else {
                "(set)"
            };
            vec![
                format!("url: {}", fields.base_url),
                format!("model: {}", fields.model),
                format!("key: {key_state}"),
                COMMAND_HELP.to_string(),
            ]
        } else {
            Vec::new()
        };

        Some(ChatPanelView {
            lines,
            input_line: self.current_line.clone(),
            sending: self.session.is_sending(),
            settings_lines,
        })
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &ChatSession {
        &self.session
    }

    fn append_printable_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_control() {
                continue;
            }
            if self.current_line.chars().count() >= MAX_INPUT_CHARS {
                break;
            }
            self.current_line.push(ch);
        }
    }

    fn clear_input_line_state(&mut self) {
        self.current_line.clear();
        self.history_cursor = None;
        self.history_draft = None;
    }

    fn submit_current_line(&mut self) {
        let line = std::mem::take(&mut self.current_line);
        self.clear_input_line_state();
        if line.trim().is_empty() {
            return;
        }
        if self.history.len() == MAX_HISTORY_LINES {
            self.history.pop_front();
        }
        self.history.push_back(line.clone());

        if let Some(command) = line.trim_start().strip_prefix('/') {
            self.run_command(command);
            return;
        }

        match self.session.submit(&line) {
            SubmitOutcome::Dispatch(request) => {
                let result = match self.dispatcher.as_mut() {
                    Some(dispatcher) => dispatcher.dispatch(request),
                    None => Err(guide::ChatError::WorkerGone),
                };
                if let Err(error) = result {
                    self.session.complete(Err(error));
                }
            }
            SubmitOutcome::Busy => info!("chat_submit_rejected_busy"),
            SubmitOutcome::Ignored | SubmitOutcome::MissingCredential => {}
        }
    }

    fn run_command(&mut self, command: &str) {
        let (name, argument) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command.trim(), ""),
        };
        match name {
            "settings" => self.session.toggle_settings(),
            "url" => self.session.set_base_url(argument),
            "model" => self.session.set_model(argument),
            "key" => self.session.set_api_key(argument),
            "save" => self.session.save_settings(),
            other => warn!(command = other, "chat_unknown_command"),
        }
    }

    fn navigate_history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        if self.history_cursor.is_none() {
            self.history_draft = Some(self.current_line.clone());
        }

        let next_index = match self.history_cursor {
            Some(index) => index.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.history_cursor = Some(next_index);
        self.current_line = self.history[next_index].clone();
    }

    fn navigate_history_down(&mut self) {
        let Some(index) = self.history_cursor else {
            return;
        };

        if index + 1 < self.history.len() {
            self.history_cursor = Some(index + 1);
            self.current_line = self.history[index + 1].clone();
            return;
        }

        self.history_cursor = None;
        self.current_line = self.history_draft.take().unwrap_or_default();
    }
}
