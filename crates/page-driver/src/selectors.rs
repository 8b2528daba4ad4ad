//! DOM anchors for the DeepSeek chat page.
//!
//! The page ships hashed utility class names, so these are snapshots of the
//! live markup rather than stable semantics. Keeping every selector in one
//! table makes the inevitable re-verification against the real page a
//! single-file change.

/// Chat application origin.
pub const CHAT_URL: &str = "https://chat.deepseek.com";

/// Sign-in sub-path; a tab parked here is authenticated-out.
pub const SIGN_IN_URL: &str = "https://chat.deepseek.com/sign_in";

/// Conversation sidebar container.
pub const SIDEBAR: &str = "div.dc04ec1d";

/// Class present on the sidebar only while it is collapsed.
pub const SIDEBAR_COLLAPSED_CLASS: &str = "a02af2e6";

/// Button that collapses the sidebar.
pub const SIDEBAR_TOGGLE: &str = ".ds-icon-button";

/// "New chat" control.
pub const NEW_CHAT: &str = "div[class*='_217e214']";

/// Marker element present when the page has wedged itself and needs a
/// reload before it accepts input again.
pub const STUCK_MARKER: &str = "div.a4380d7b";

/// Composer mode toggles (deep-reasoning and web-search share this class;
/// the deep-reasoning one carries the text "R1").
pub const MODE_TOGGLE: &str = "div[role='button'][class*='_3172d9f']";

/// Text distinguishing the deep-reasoning toggle from the search toggle.
pub const DEEPTHINK_LABEL: &str = "R1";

/// Inline style fragment present while a toggle is active.
pub const TOGGLE_ACTIVE_STYLE: &str = "rgba(77, 107, 254, 0.40)";

/// Send/stop button. `aria-disabled="false"` doubles as the
/// generation-in-progress signal once a prompt has been submitted.
pub const SEND_BUTTON: &str = "div[role='button'][class*='_7436101']";

/// Spinner rendered inside the send button while a response is being
/// generated.
pub const GENERATING_SPINNER: &str =
    "div[role='button'][class*='_7436101'] div[class*='_480132b']";

/// Prompt composer input.
pub const CHAT_INPUT: &str = "#chat-input";

/// Hidden file input used for attachment delivery.
pub const FILE_INPUT: &str = "input[type='file']";

/// Rendered assistant message blocks, oldest first.
pub const MESSAGE_BLOCKS: &str = "div.ds-markdown.ds-markdown--block";

/// Sign-in form fields, used by optional auto-login.
pub const LOGIN_EMAIL: &str = "input[type='text']";
pub const LOGIN_PASSWORD: &str = "input[type='password']";
pub const LOGIN_SUBMIT: &str = "div[role='button'].ds-sign-up-form__register-button";
