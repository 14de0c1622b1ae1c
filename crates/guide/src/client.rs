use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::transcript::ChatMessage;

pub const TEMPERATURE: f32 = 0.7;
pub const EMPTY_REPLY_FALLBACK: &str = "抱歉，我没有获得可用的回复。";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Transport(#[source] reqwest::Error),
    #[error("请求失败：{status} {body}")]
    Status { status: u16, body: String },
    #[error("响应无法解析：{0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("chat worker is no longer running")]
    WorkerGone,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// One fully resolved call: where to send it, with which key, and what.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub endpoint: String,
    pub api_key: String,
    pub body: CompletionBody,
}

pub trait CompletionBackend: Send + Sync {
    /// Returns the trimmed reply text, or the fallback when the body has none.
    fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError>;
}

#[derive(Debug, Clone)]
pub struct HttpCompletionBackend {
    client: reqwest::blocking::Client,
}

impl HttpCompletionBackend {
    /// No request timeout; a call runs until the server answers or the
    /// connection drops.
    pub fn new() -> Result<Self, ChatError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(ChatError::ClientBuild)?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl CompletionBackend for HttpCompletionBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        debug!(
            endpoint = %request.endpoint,
            model = %request.body.model,
            messages = request.body.messages.len(),
            "chat_request_sent"
        );
        let response = self
            .client
            .post(&request.endpoint)
            .bearer_auth(&request.api_key)
            .json(&request.body)
            .send()
            .map_err(ChatError::Transport)?;

        let status = response.status();
        let text = response.text().map_err(ChatError::Transport)?;
        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(ChatError::Decode)?;
        Ok(reply_text_from_body(&body))
    }
}

/// Any non-empty string content is trimmed and kept, even when that leaves
/// it empty. Non-zero numbers and `true` are kept as their JSON text.
/// Missing, empty, zero, `false`, `null`, arrays and objects yield the
/// fallback.
pub fn reply_text_from_body(body: &Value) -> String {
    match body.pointer("/choices/0/message/content") {
        Some(Value::String(text)) if !text.is_empty() => text.trim().to_string(),
        Some(Value::Number(number)) if number.as_f64() != Some(0.0) => number.to_string(),
        Some(Value::Bool(true)) => true.to_string(),
        _ => EMPTY_REPLY_FALLBACK.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    pub(crate) struct CapturedRequest {
        pub head: String,
        pub body: String,
    }

    /// Serves exactly one HTTP response on a loopback port.
    pub(crate) fn serve_once(
        status_line: &'static str,
        response_body: &'static str,
    ) -> (String, JoinHandle<CapturedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let address = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header line");
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("content length");
                    }
                }
                head.push_str(&line);
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("read body");

            let mut stream = stream;
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response_body}",
                response_body.len()
            );
            stream.write_all(response.as_bytes()).expect("write response");
            stream.flush().expect("flush");

            CapturedRequest {
                head,
                body: String::from_utf8(body).expect("utf8 body"),
            }
        });
        (format!("http://{address}/v1/chat/completions"), handle)
    }
}
