//! End-to-end orchestration scenarios against a scripted page driver.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use page_driver::{ChatToggle, DriverError, PageDriver};
use tokio::sync::mpsc;

use chatrelay::generation::GenerationTracker;
use chatrelay::monitor::spawn_session_monitor;
use chatrelay::orchestrator::{
    ChatRequest, OrchestratorSettings, ResponseChunk, ResponseOrchestrator,
};

const CHAT_URL: &str = "https://chat.deepseek.com";
const SIGN_IN_URL: &str = "https://chat.deepseek.com/sign_in";

/// A page driver whose observable behavior is fully scripted up front.
/// Every call is recorded so tests can assert on the action sequence.
struct ScriptedDriver {
    url: Mutex<String>,
    alive: AtomicBool,
    /// Markup fragments returned by successive extraction calls; the last
    /// entry repeats once the script runs out.
    extractions: Mutex<VecDeque<String>>,
    /// How many more times `is_generating` reports true.
    generating_polls: AtomicUsize,
    /// Scripted outcomes for paste attempts; defaults to verified once the
    /// script runs out.
    paste_results: Mutex<VecDeque<bool>>,
    /// Supersede the current generation on the n-th extraction (1-based).
    supersede_on_extraction: Option<(usize, Arc<GenerationTracker>)>,
    extraction_count: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    fn new(url: &str) -> Self {
        Self {
            url: Mutex::new(url.to_string()),
            alive: AtomicBool::new(true),
            extractions: Mutex::new(VecDeque::new()),
            generating_polls: AtomicUsize::new(0),
            paste_results: Mutex::new(VecDeque::new()),
            supersede_on_extraction: None,
            extraction_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_extractions(self, fragments: &[&str], generating_polls: usize) -> Self {
        *self.extractions.lock().unwrap() =
            fragments.iter().map(|s| s.to_string()).collect();
        self.generating_polls
            .store(generating_polls, Ordering::SeqCst);
        self
    }

    fn with_paste_results(self, results: &[bool]) -> Self {
        *self.paste_results.lock().unwrap() = results.iter().copied().collect();
        self
    }

    fn with_supersession(mut self, on_extraction: usize, tracker: Arc<GenerationTracker>) -> Self {
        self.supersede_on_extraction = Some((on_extraction, tracker));
        self
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close_sidebar_if_open(&self) -> Result<(), DriverError> {
        self.record("close_sidebar");
        Ok(())
    }

    async fn start_new_chat(&self) -> Result<(), DriverError> {
        self.record("start_new_chat");
        Ok(())
    }

    async fn reload_if_stuck(&self) -> Result<(), DriverError> {
        self.record("reload_if_stuck");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        self.record("refresh");
        Ok(())
    }

    async fn set_toggle(&self, toggle: ChatToggle, desired: bool) -> Result<(), DriverError> {
        self.record(&format!("set_toggle:{toggle:?}={desired}"));
        Ok(())
    }

    async fn paste_and_verify(&self, _text: &str) -> Result<bool, DriverError> {
        self.record("paste_and_verify");
        Ok(self.paste_results.lock().unwrap().pop_front().unwrap_or(true))
    }

    async fn attach_file(&self, _path: &Path) -> Result<(), DriverError> {
        self.record("attach_file");
        Ok(())
    }

    async fn invoke_send(&self) -> Result<bool, DriverError> {
        self.record("invoke_send");
        Ok(true)
    }

    async fn await_generation_start(&self, _timeout: Duration) -> Result<bool, DriverError> {
        self.record("await_generation_start");
        Ok(true)
    }

    async fn is_generating(&self) -> bool {
        let remaining = self.generating_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.generating_polls.store(remaining - 1, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn extract_last_message_markup(&self) -> Option<String> {
        let count = self.extraction_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((trigger, tracker)) = &self.supersede_on_extraction {
            if count == *trigger {
                tracker.begin_generation();
            }
        }
        let mut extractions = self.extractions.lock().unwrap();
        if extractions.len() > 1 {
            extractions.pop_front()
        } else {
            extractions.front().cloned()
        }
    }

    async fn write_temp_file(&self, _content: &str) -> Result<PathBuf, DriverError> {
        self.record("write_temp_file");
        Ok(PathBuf::from("/tmp/scripted-prompt.txt"))
    }

    async fn discard_temp_file(&self) {
        self.record("discard_temp_file");
    }
}

fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        poll_interval: Duration::from_millis(5),
        max_poll: Duration::from_secs(5),
        await_start_timeout: Duration::from_secs(1),
        send_retry_pause: Duration::from_millis(1),
    }
}

fn request(streaming: bool) -> ChatRequest {
    ChatRequest {
        prompt: "[Important Information]\nUser: hello".to_string(),
        streaming,
        deepthink: false,
        search: false,
        file_delivery: false,
    }
}

/// Run one orchestration to completion and return every emitted chunk.
async fn run_to_end(
    driver: Arc<ScriptedDriver>,
    tracker: Arc<GenerationTracker>,
    req: ChatRequest,
) -> Vec<ResponseChunk> {
    let generation = tracker.begin_generation();
    let orchestrator = ResponseOrchestrator::new(driver, tracker, fast_settings());
    let (tx, mut rx) = mpsc::channel(32);
    let producer = tokio::spawn(async move {
        orchestrator.run(req, generation, tx).await;
    });

    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    producer.await.expect("orchestrator task");
    chunks
}

#[tokio::test]
async fn buffered_response_delivers_final_text() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL)
            .with_extractions(&["<p>Hi</p>", "<p>Hi there</p>", "<p>Hi there!</p>"], 3),
    );

    let chunks = run_to_end(driver.clone(), tracker, request(false)).await;

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].last);
    // Ends with '!', so the closing-symbol resolver adds nothing.
    assert_eq!(chunks[0].content, "Hi there!");
    assert_eq!(driver.count("invoke_send"), 1);
    assert_eq!(driver.count("discard_temp_file"), 1);
}

#[tokio::test]
async fn streamed_deltas_reconstruct_the_final_text() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL)
            .with_extractions(&["<p>Hi</p>", "<p>Hi there</p>", "<p>Hi there!</p>"], 3),
    );

    let chunks = run_to_end(driver, tracker, request(true)).await;

    let (terminal, deltas) = chunks.split_last().expect("at least the terminal chunk");
    assert!(terminal.last);
    assert!(deltas.iter().all(|c| !c.last));
    let reconstructed: String = deltas.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(reconstructed, "Hi there!");
    assert_eq!(terminal.content, "");
}

#[tokio::test]
async fn truncated_quote_is_balanced_in_the_terminal_chunk() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL)
            .with_extractions(&["<p>He said \"hello</p>"], 1),
    );

    let chunks = run_to_end(driver, tracker, request(true)).await;

    let terminal = chunks.last().expect("terminal chunk");
    assert!(terminal.last);
    assert_eq!(terminal.content, "\"");
}

#[tokio::test]
async fn extraction_not_extending_the_anchor_is_ignored() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(ScriptedDriver::new(CHAT_URL).with_extractions(
        &["<p>Hello</p>", "<p>Something else</p>", "<p>Hello world</p>"],
        3,
    ));

    let chunks = run_to_end(driver, tracker, request(true)).await;

    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["Hello", " world", ""]);
}

#[tokio::test]
async fn superseded_orchestration_stops_with_an_empty_payload() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    // A newer request arrives while the second extraction is being read;
    // its delta must never be emitted.
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL)
            .with_extractions(&["<p>Hi</p>", "<p>Hi there</p>", "<p>Hi there!</p>"], 100)
            .with_supersession(2, tracker.clone()),
    );

    let chunks = run_to_end(driver.clone(), tracker, request(true)).await;

    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["Hi", ""]);
    assert!(chunks.last().expect("terminal").last);
    // The courtesy reset leaves the remote session clean for the
    // superseding request: one configure-phase reset plus one on abort.
    assert_eq!(driver.count("start_new_chat"), 2);
}

#[tokio::test]
async fn sign_in_page_short_circuits_before_any_page_action() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(ScriptedDriver::new(SIGN_IN_URL));

    let chunks = run_to_end(driver.clone(), tracker, request(false)).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "You must be logged into DeepSeek.");
    let calls = driver.calls();
    assert!(!calls.iter().any(|c| c.starts_with("set_toggle")));
    assert!(!calls.contains(&"close_sidebar".to_string()));
    assert!(!calls.contains(&"paste_and_verify".to_string()));
    assert!(!calls.contains(&"invoke_send".to_string()));
}

#[tokio::test]
async fn foreign_site_yields_the_not_on_site_message() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(ScriptedDriver::new("https://example.com/"));

    let chunks = run_to_end(driver, tracker, request(false)).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "You must be on the DeepSeek chat site.");
}

#[tokio::test]
async fn persistent_paste_failure_never_reaches_send() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL).with_paste_results(&[false, false, false, false]),
    );

    let chunks = run_to_end(driver.clone(), tracker, request(false)).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "Could not send prompt.");
    assert_eq!(driver.count("paste_and_verify"), 4);
    assert_eq!(driver.count("refresh"), 1);
    assert_eq!(driver.count("invoke_send"), 0);
}

#[tokio::test]
async fn paste_succeeding_after_refresh_still_sends() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL)
            .with_paste_results(&[false, false, false, true])
            .with_extractions(&["<p>ok</p>"], 1),
    );

    let chunks = run_to_end(driver.clone(), tracker, request(false)).await;

    assert_eq!(driver.count("refresh"), 1);
    assert_eq!(driver.count("invoke_send"), 1);
    assert_eq!(chunks[0].content, "ok");
}

#[tokio::test]
async fn file_delivery_attaches_instead_of_pasting() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(ScriptedDriver::new(CHAT_URL).with_extractions(&["<p>ok</p>"], 1));

    let mut req = request(false);
    req.file_delivery = true;
    let chunks = run_to_end(driver.clone(), tracker, req).await;

    assert_eq!(driver.count("write_temp_file"), 1);
    assert_eq!(driver.count("attach_file"), 1);
    assert_eq!(driver.count("invoke_send"), 1);
    assert_eq!(driver.count("paste_and_verify"), 0);
    assert_eq!(chunks[0].content, "ok");
}

#[tokio::test]
async fn no_extracted_text_yields_the_receive_error() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    // Generation runs for a few polls but the message slot stays empty.
    let driver = Arc::new(ScriptedDriver::new(CHAT_URL).with_extractions(&[], 3));

    let chunks = run_to_end(driver, tracker, request(false)).await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "Error receiving response.");
}

#[tokio::test]
async fn dropped_consumer_aborts_the_producer() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(
        ScriptedDriver::new(CHAT_URL).with_extractions(&["<p>Hi</p>"], usize::MAX),
    );

    let generation = tracker.begin_generation();
    let orchestrator =
        ResponseOrchestrator::new(driver.clone(), tracker, fast_settings());
    let (tx, mut rx) = mpsc::channel(32);
    let producer = tokio::spawn(async move {
        orchestrator.run(request(true), generation, tx).await;
    });

    // Take the first delta, then walk away mid-stream.
    let first = rx.recv().await.expect("first delta");
    assert_eq!(first.content, "Hi");
    drop(rx);

    tokio::time::timeout(Duration::from_secs(2), producer)
        .await
        .expect("producer must notice the dropped consumer")
        .expect("orchestrator task");
    assert!(driver.count("start_new_chat") >= 2);
}

#[tokio::test]
async fn monitor_invalidates_the_driver_when_the_session_dies() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(ScriptedDriver::new(CHAT_URL));
    let handle = spawn_session_monitor(
        tracker.clone(),
        driver.clone(),
        Duration::from_millis(5),
    );

    assert!(tracker.driver_available());
    driver.alive.store(false, Ordering::SeqCst);

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("monitor must stop after invalidating")
        .expect("monitor task");
    assert!(!tracker.driver_available());
}

#[tokio::test]
async fn monitor_for_a_stale_epoch_stops_without_side_effects() {
    let tracker = Arc::new(GenerationTracker::new());
    tracker.reinitialize();
    let driver = Arc::new(ScriptedDriver::new(CHAT_URL));
    let handle = spawn_session_monitor(
        tracker.clone(),
        driver.clone(),
        Duration::from_millis(5),
    );

    // A newer session supersedes the watched epoch; even a dead tab must
    // not be reported by the stale watcher.
    tracker.reinitialize();
    driver.alive.store(false, Ordering::SeqCst);

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("stale monitor must exit")
        .expect("monitor task");
    assert!(tracker.driver_available());
}
