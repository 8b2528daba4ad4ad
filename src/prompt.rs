//! Flattening of OpenAI-style message lists into one prompt string.
//!
//! The remote chat accepts a single text box, so the ordered message list
//! is rendered to `role: content` paragraphs with the role names rewritten
//! to the display names the client smuggles in via `DATA1`/`DATA2` markers.
//! Mode markers (`{{r1}}`, `[search]`, ...) are read off the most recent
//! user message and stripped from the rendered text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::server::protocol::{ChatMessage, CompletionRequest};

static DEEPTHINK_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\{\{r1\}\}|\[r1\]|\(r1\))").unwrap());
static SEARCH_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\{\{search\}\}|\[search\])").unwrap());
static CHARACTER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"DATA1:\s*"([^"]*)""#).unwrap());
static USER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"DATA2:\s*"([^"]*)""#).unwrap());
static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// The flattened prompt plus the mode flags extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedPrompt {
    pub text: String,
    pub deepthink: bool,
    pub search: bool,
}

/// Render the request's message list into the single prompt string the chat
/// composer receives. Returns `None` when there is nothing to send.
pub fn flatten(request: &CompletionRequest) -> Option<FlattenedPrompt> {
    if request.messages.is_empty() {
        return None;
    }
    let mut messages = request.messages.clone();

    // Some clients resend the system prompt as a trailing duplicate; keep
    // only the newer one.
    let n = messages.len();
    if n >= 2 && messages[n - 1].role == "system" && messages[n - 2].role == "system" {
        messages.remove(n - 2);
    }

    let deepthink = marker_in_latest_user_message(&messages, &DEEPTHINK_MARKER);
    let search = marker_in_latest_user_message(&messages, &SEARCH_MARKER);

    let joined = messages
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let character_name = CHARACTER_NAME
        .captures(&joined)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "Character".to_string());
    let user_name = USER_NAME
        .captures(&joined)
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "User".to_string());

    let text = DEEPTHINK_MARKER.replace_all(&joined, "");
    let text = SEARCH_MARKER.replace_all(&text, "");
    let text = CHARACTER_NAME.replace_all(&text, "");
    let text = USER_NAME.replace_all(&text, "");

    let text = text
        .replace("system: ", "")
        .replace("assistant:", &format!("{character_name}:"))
        .replace("user:", &format!("{user_name}:"))
        .replace(
            "{{temperature}}",
            &request.temperature.unwrap_or(1.0).to_string(),
        )
        .replace(
            "{{max_tokens}}",
            &request.max_tokens.unwrap_or(300).to_string(),
        );

    let text = NEWLINE_RUN.replace_all(&text, "\n\n");

    Some(FlattenedPrompt {
        text: format!("[Important Information]\n{}", text.trim()),
        deepthink,
        search,
    })
}

/// Mode markers ride on the second-to-last message when it is the user's
/// turn (the last message is typically the client's injected instruction).
fn marker_in_latest_user_message(messages: &[ChatMessage], marker: &Regex) -> bool {
    if messages.len() < 2 {
        return false;
    }
    let candidate = &messages[messages.len() - 2];
    candidate.role == "user" && marker.is_match(&candidate.content)
}
