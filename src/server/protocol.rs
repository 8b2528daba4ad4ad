//! OpenAI chat-completion wire format.
//!
//! Only the fields the relay actually consumes are modeled; everything else
//! in an inbound request is ignored rather than rejected, since the clients
//! in the wild send wildly different supersets.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

/// Completion id shared by every response; the relay holds no per-request
/// server state worth naming.
const COMPLETION_ID: &str = "chatcmpl-chatrelay";

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Model id advertised to clients.
pub fn model_id() -> String {
    format!("chatrelay-{}", env!("CARGO_PKG_VERSION"))
}

/// Body for `GET /models`.
pub fn model_list() -> Value {
    json!({
        "object": "list",
        "data": [{
            "id": model_id(),
            "object": "model",
            "created": Utc::now().timestamp_millis(),
        }]
    })
}

/// Non-streaming completion body carrying the final text.
pub fn completion_body(content: &str) -> Value {
    json!({
        "id": COMPLETION_ID,
        "object": "chat.completion",
        "created": Utc::now().timestamp_millis(),
        "model": model_id(),
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop",
        }]
    })
}

/// One streamed delta event body.
pub fn chunk_body(content: &str) -> Value {
    json!({
        "id": COMPLETION_ID,
        "object": "chat.completion.chunk",
        "created": Utc::now().timestamp_millis(),
        "model": model_id(),
        "choices": [{"index": 0, "delta": {"content": content}}]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_request_fields_are_ignored() {
        let parsed: CompletionRequest = serde_json::from_str(
            r#"{"messages":[{"role":"user","content":"hi"}],"stream":true,
                "model":"whatever","top_p":0.3,"logit_bias":{}}"#,
        )
        .expect("parse");
        assert!(parsed.stream);
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].content, "hi");
    }

    #[test]
    fn completion_body_carries_the_text() {
        let body = completion_body("final text");
        assert_eq!(
            body["choices"][0]["message"]["content"],
            Value::from("final text")
        );
        assert_eq!(body["choices"][0]["finish_reason"], Value::from("stop"));
    }

    #[test]
    fn chunk_body_is_a_delta() {
        let body = chunk_body("piece");
        assert_eq!(body["object"], Value::from("chat.completion.chunk"));
        assert_eq!(
            body["choices"][0]["delta"]["content"],
            Value::from("piece")
        );
    }
}
