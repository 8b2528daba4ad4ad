//! Browser-automation surface for the relay.
//!
//! The orchestration core never touches the DOM directly; everything it
//! needs from the remote chat page is expressed by the [`PageDriver`] trait
//! so the core stays testable against a scripted fake. The concrete
//! implementation, [`DeepSeekPage`], drives a real tab over the Chromium
//! DevTools Protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod deepseek;
mod launch;
pub mod selectors;

pub use deepseek::DeepSeekPage;
pub use launch::{BrowserSession, LaunchOptions};

/// Errors surfaced by page-driver operations.
///
/// Call sites in the orchestrator convert these to user-facing outcomes
/// locally; none of them are expected to propagate past it.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// The underlying browser tab or process is gone.
    #[error("browser session lost: {0}")]
    SessionGone(String),

    /// A required element was not present on the page.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A script evaluation or CDP command failed.
    #[error("page command failed: {0}")]
    Command(String),

    /// A bounded wait expired.
    #[error("wait timed out: {0}")]
    WaitTimeout(String),

    /// The browser could not be launched or attached to.
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Local filesystem failure (temp upload files).
    #[error("i/o error: {0}")]
    Io(String),
}

impl DriverError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::ElementNotFound(_) | DriverError::WaitTimeout(_) | DriverError::Command(_)
        )
    }
}

/// The two mode toggles the chat composer exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatToggle {
    /// Deep-reasoning mode ("R1").
    DeepThink,
    /// Web-search mode.
    Search,
}

/// Actions and state queries against the live chat page.
///
/// Mutating operations are best-effort in the sense the chat UI demands:
/// the page is a moving target, so implementations report failure through
/// `Result`/`bool` rather than guaranteeing postconditions.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// URL of the tab the driver controls.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Liveness probe. Must not error; a dead tab is simply `false`.
    async fn is_alive(&self) -> bool;

    /// Collapse the conversation sidebar when it is open.
    async fn close_sidebar_if_open(&self) -> Result<(), DriverError>;

    /// Start a fresh conversation, clearing prior context.
    async fn start_new_chat(&self) -> Result<(), DriverError>;

    /// Reload the page when the known stuck-state marker is present.
    async fn reload_if_stuck(&self) -> Result<(), DriverError>;

    /// Unconditional page reload.
    async fn refresh(&self) -> Result<(), DriverError>;

    /// Bring a composer toggle to the desired state. Idempotent: reads the
    /// rendered active state and clicks only on mismatch.
    async fn set_toggle(&self, toggle: ChatToggle, desired: bool) -> Result<(), DriverError>;

    /// One paste attempt: write the prompt into the composer, nudge the UI
    /// validation with a no-op keystroke, read the value back. `Ok(true)`
    /// when the read-back matches.
    async fn paste_and_verify(&self, text: &str) -> Result<bool, DriverError>;

    /// Attach a file to the composer's file input.
    async fn attach_file(&self, path: &Path) -> Result<(), DriverError>;

    /// Wait (bounded internally, ≤60s) for the send control to become
    /// enabled, then activate it. `Ok(false)` when it never enabled.
    async fn invoke_send(&self) -> Result<bool, DriverError>;

    /// Wait up to `timeout` for the page to show its generation-in-progress
    /// indicator.
    async fn await_generation_start(&self, timeout: Duration) -> Result<bool, DriverError>;

    /// Whether the page currently reports a response being generated.
    async fn is_generating(&self) -> bool;

    /// Raw markup of the newest assistant message, if any. Extraction
    /// problems yield `None`, never an error.
    async fn extract_last_message_markup(&self) -> Option<String>;

    /// Persist prompt text to a temp file for file-upload delivery. The
    /// driver owns the file until [`discard_temp_file`](Self::discard_temp_file)
    /// or the next `write_temp_file` call.
    async fn write_temp_file(&self, content: &str) -> Result<PathBuf, DriverError>;

    /// Drop the previously written temp file, if one exists.
    async fn discard_temp_file(&self);
}
