//! The per-request state machine that drives the chat tab.
//!
//! One orchestration owns one generation id and walks the tab through
//! check page → configure → send → await start → poll → finalize, emitting
//! text chunks into an mpsc channel the HTTP layer consumes. Supersession
//! by a newer request, loss of the driver, and the consumer dropping the
//! channel all funnel into the same cooperative abort: the guard is
//! re-checked before every externally visible step, and a failed `send`
//! means nobody is listening anymore.

use std::sync::Arc;
use std::time::Duration;

use page_driver::{ChatToggle, PageDriver};
use text_extract::{closing_symbol, normalize_markup};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::RelayFailure;
use crate::generation::{GenerationId, GenerationTracker};

/// One accepted chat-completion request, already flattened to a prompt.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub streaming: bool,
    pub deepthink: bool,
    pub search: bool,
    /// Deliver the prompt as an attached text file instead of pasting it.
    pub file_delivery: bool,
}

/// One unit of output. `last` is set on exactly one chunk per request.
#[derive(Debug, Clone)]
pub struct ResponseChunk {
    pub content: String,
    pub last: bool,
}

impl ResponseChunk {
    fn delta(content: String) -> Self {
        Self {
            content,
            last: false,
        }
    }

    fn terminal(content: String) -> Self {
        Self {
            content,
            last: true,
        }
    }
}

/// Timing knobs, injectable so the scripted-driver tests run fast.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Sleep between extraction polls.
    pub poll_interval: Duration,
    /// Safety net on the polling phase; expiry without any text behaves
    /// like no response at all.
    pub max_poll: Duration,
    /// Bound on waiting for the generation-in-progress indicator.
    pub await_start_timeout: Duration,
    /// Pause between failed paste attempts.
    pub send_retry_pause: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_poll: Duration::from_secs(180),
            await_start_timeout: Duration::from_secs(60),
            send_retry_pause: Duration::from_secs(1),
        }
    }
}

/// Why an orchestration stopped short of a successful FINALIZE.
enum Terminal {
    /// Superseded, driver lost, or consumer gone: deliver an empty payload.
    Aborted,
    /// Deliver the failure's user-facing message.
    Failed(RelayFailure),
}

/// Text accumulated over one polling phase. Owned exclusively by the
/// orchestration that created it; discarded on completion.
#[derive(Default)]
struct StreamState {
    /// First non-empty extraction; later extractions must extend it.
    initial_text: String,
    /// Most recent accepted extraction.
    last_text: String,
}

pub struct ResponseOrchestrator {
    driver: Arc<dyn PageDriver>,
    tracker: Arc<GenerationTracker>,
    settings: OrchestratorSettings,
}

impl ResponseOrchestrator {
    pub fn new(
        driver: Arc<dyn PageDriver>,
        tracker: Arc<GenerationTracker>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            driver,
            tracker,
            settings,
        }
    }

    /// Drive one request to its single terminal chunk. Infallible from the
    /// caller's perspective: every failure mode ends in a terminal emission
    /// (or in silence when the consumer is already gone).
    pub async fn run(
        &self,
        request: ChatRequest,
        generation: GenerationId,
        tx: mpsc::Sender<ResponseChunk>,
    ) {
        match self.drive(&request, generation, &tx).await {
            Ok(final_text) => {
                let closing = closing_symbol(&final_text);
                let payload = if request.streaming {
                    // The deltas are already out; only the balance marker
                    // remains.
                    closing.to_string()
                } else {
                    let mut body = final_text;
                    body.push_str(closing);
                    body
                };
                let _ = tx.send(ResponseChunk::terminal(payload)).await;
                info!(target: "orchestrator", generation, "response completed");
            }
            Err(Terminal::Aborted) => {
                self.courtesy_reset().await;
                let _ = tx.send(ResponseChunk::terminal(String::new())).await;
                debug!(target: "orchestrator", generation, "orchestration aborted");
            }
            Err(Terminal::Failed(failure)) => {
                self.courtesy_reset().await;
                let _ = tx
                    .send(ResponseChunk::terminal(failure.to_string()))
                    .await;
                warn!(target: "orchestrator", generation, %failure, "orchestration failed");
            }
        }
    }

    async fn drive(
        &self,
        request: &ChatRequest,
        generation: GenerationId,
        tx: &mpsc::Sender<ResponseChunk>,
    ) -> Result<String, Terminal> {
        self.guard(generation, tx)?;
        self.check_page().await?;

        self.guard(generation, tx)?;
        self.configure(request).await;

        self.guard(generation, tx)?;
        if !self.send_prompt(request).await {
            return Err(Terminal::Failed(RelayFailure::SendFailed));
        }

        self.guard(generation, tx)?;
        match self
            .driver
            .await_generation_start(self.settings.await_start_timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Err(Terminal::Failed(RelayFailure::NoResponse)),
            Err(err) => {
                warn!(target: "orchestrator", %err, "await-start probe failed");
                return Err(Terminal::Failed(RelayFailure::NoResponse));
            }
        }

        let final_text = self.poll(request, generation, tx).await?;

        if final_text.is_empty() {
            return Err(Terminal::Failed(RelayFailure::ReceiveFailed));
        }
        Ok(final_text)
    }

    /// CHECK_PAGE: the tab must be on the chat origin and past sign-in.
    async fn check_page(&self) -> Result<(), Terminal> {
        let url = match self.driver.current_url().await {
            Ok(url) => url,
            Err(err) => {
                warn!(target: "orchestrator", %err, "url probe failed");
                return Err(Terminal::Failed(RelayFailure::NotOnSite));
            }
        };
        if !url.starts_with(page_driver::selectors::CHAT_URL) {
            return Err(Terminal::Failed(RelayFailure::NotOnSite));
        }
        if url.starts_with(page_driver::selectors::SIGN_IN_URL) {
            return Err(Terminal::Failed(RelayFailure::NotLoggedIn));
        }
        Ok(())
    }

    /// CONFIGURE: reset the conversation and bring the toggles to the
    /// requested state. Each step is best-effort; a mispositioned sidebar
    /// must not kill the request.
    async fn configure(&self, request: &ChatRequest) {
        self.driver.discard_temp_file().await;

        if let Err(err) = self.driver.close_sidebar_if_open().await {
            warn!(target: "orchestrator", %err, "sidebar close failed");
        }
        if let Err(err) = self.driver.start_new_chat().await {
            warn!(target: "orchestrator", %err, "new-chat reset failed");
        }
        if let Err(err) = self.driver.reload_if_stuck().await {
            warn!(target: "orchestrator", %err, "stuck-page check failed");
        }
        if let Err(err) = self
            .driver
            .set_toggle(ChatToggle::DeepThink, request.deepthink)
            .await
        {
            warn!(target: "orchestrator", %err, "deep-reasoning toggle failed");
        }
        if let Err(err) = self
            .driver
            .set_toggle(ChatToggle::Search, request.search)
            .await
        {
            warn!(target: "orchestrator", %err, "web-search toggle failed");
        }
    }

    /// SEND: paste-and-verify with retries (or file attachment), then the
    /// send action itself.
    async fn send_prompt(&self, request: &ChatRequest) -> bool {
        if request.file_delivery {
            self.send_via_file(&request.prompt).await
        } else {
            self.send_via_paste(&request.prompt).await
        }
    }

    async fn send_via_file(&self, prompt: &str) -> bool {
        let path = match self.driver.write_temp_file(prompt).await {
            Ok(path) => path,
            Err(err) => {
                warn!(target: "orchestrator", %err, "temp file write failed");
                return false;
            }
        };
        if let Err(err) = self.driver.attach_file(&path).await {
            warn!(target: "orchestrator", %err, "file attach failed");
            return false;
        }
        self.driver.invoke_send().await.unwrap_or_else(|err| {
            warn!(target: "orchestrator", %err, "send action failed");
            false
        })
    }

    /// Three paste attempts, one page refresh, one final attempt. The send
    /// control is only ever activated after a verified paste.
    async fn send_via_paste(&self, prompt: &str) -> bool {
        for attempt in 1..=3 {
            if self.try_paste(prompt).await {
                return self.activate_send().await;
            }
            debug!(target: "orchestrator", attempt, "paste attempt failed");
            sleep(self.settings.send_retry_pause).await;
        }

        if let Err(err) = self.driver.refresh().await {
            warn!(target: "orchestrator", %err, "refresh before paste retry failed");
            return false;
        }

        if self.try_paste(prompt).await {
            return self.activate_send().await;
        }
        false
    }

    async fn try_paste(&self, prompt: &str) -> bool {
        match self.driver.paste_and_verify(prompt).await {
            Ok(verified) => verified,
            Err(err) => {
                warn!(target: "orchestrator", %err, "paste attempt errored");
                false
            }
        }
    }

    async fn activate_send(&self) -> bool {
        self.driver.invoke_send().await.unwrap_or_else(|err| {
            warn!(target: "orchestrator", %err, "send action failed");
            false
        })
    }

    /// POLLING: extract, normalize, diff and (when streaming) emit until the
    /// page stops generating or the request loses its claim.
    async fn poll(
        &self,
        request: &ChatRequest,
        generation: GenerationId,
        tx: &mpsc::Sender<ResponseChunk>,
    ) -> Result<String, Terminal> {
        let mut state = StreamState::default();
        let started = Instant::now();

        loop {
            self.guard(generation, tx)?;

            if !self.driver.is_generating().await {
                break;
            }

            if started.elapsed() >= self.settings.max_poll {
                if state.last_text.is_empty() {
                    return Err(Terminal::Failed(RelayFailure::ReceiveFailed));
                }
                warn!(
                    target: "orchestrator",
                    generation,
                    "polling safety net expired, finalizing accumulated text"
                );
                break;
            }

            if let Some(markup) = self.driver.extract_last_message_markup().await {
                let text = normalize_markup(&markup);
                if !text.is_empty() {
                    if state.initial_text.is_empty() {
                        state.initial_text = text.clone();
                    }
                    // The anchor guard: an extraction that does not extend
                    // the first one belongs to a different message slot
                    // (e.g. a regeneration) and is ignored outright.
                    if text.starts_with(&state.initial_text) && text != state.last_text {
                        let delta = text
                            .get(state.last_text.len()..)
                            .unwrap_or_default()
                            .to_string();
                        state.last_text = text;
                        if request.streaming && !delta.is_empty() {
                            self.guard(generation, tx)?;
                            if tx.send(ResponseChunk::delta(delta)).await.is_err() {
                                return Err(Terminal::Aborted);
                            }
                        }
                    }
                }
            }

            sleep(self.settings.poll_interval).await;
        }

        Ok(state.last_text)
    }

    /// The single cooperative check: current generation, live driver, and a
    /// consumer that is still listening.
    fn guard(
        &self,
        generation: GenerationId,
        tx: &mpsc::Sender<ResponseChunk>,
    ) -> Result<(), Terminal> {
        if !self.tracker.is_current(generation) || !self.tracker.driver_available() {
            return Err(Terminal::Aborted);
        }
        if tx.is_closed() {
            return Err(Terminal::Aborted);
        }
        Ok(())
    }

    /// Leave the remote session clean for whoever claims it next. Errors
    /// are ignored: the superseding request re-configures from scratch
    /// anyway.
    async fn courtesy_reset(&self) {
        let _ = self.driver.start_new_chat().await;
    }
}
