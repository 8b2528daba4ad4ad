//! [`PageDriver`] implementation for the DeepSeek chat page.
//!
//! Every DOM interaction is expressed as a `Runtime.evaluate` script or a
//! CDP element call against the selector table in [`crate::selectors`]. The
//! page offers no stable automation hooks, so each operation reads whatever
//! state it needs at call time instead of caching element handles.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::Page;
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::selectors;
use crate::{ChatToggle, DriverError, PageDriver};

const ELEMENT_WAIT: Duration = Duration::from_secs(15);
const SEND_ENABLE_WAIT: Duration = Duration::from_secs(60);
const SPINNER_POLL: Duration = Duration::from_millis(250);

pub struct DeepSeekPage {
    page: Page,
    temp_file: Mutex<Option<NamedTempFile>>,
}

impl DeepSeekPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            temp_file: Mutex::new(None),
        }
    }

    /// Best-effort sign-in with stored credentials. Errors are logged and
    /// swallowed: the operator can always log in by hand in the live tab.
    pub async fn login(&self, email: &str, password: &str) {
        if email.is_empty() || password.is_empty() {
            return;
        }
        let result: Result<(), DriverError> = async {
            let email_input = self.wait_for_element(selectors::LOGIN_EMAIL, ELEMENT_WAIT).await?;
            email_input
                .type_str(email)
                .await
                .map_err(|err| DriverError::Command(err.to_string()))?;

            let password_input = self
                .wait_for_element(selectors::LOGIN_PASSWORD, ELEMENT_WAIT)
                .await?;
            password_input
                .type_str(password)
                .await
                .map_err(|err| DriverError::Command(err.to_string()))?;

            self.click_via_script(selectors::LOGIN_SUBMIT).await?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            warn!(target: "page-driver", %err, "auto-login failed");
        }
    }

    async fn eval(&self, script: String) -> Result<serde_json::Value, DriverError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|err| DriverError::Command(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn eval_bool(&self, script: String) -> Result<bool, DriverError> {
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    /// Click through the DOM rather than through input events; the page
    /// overlays intercept synthetic mouse coordinates on some layouts.
    async fn click_via_script(&self, selector: &str) -> Result<bool, DriverError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = js_string(selector),
        );
        self.eval_bool(script).await
    }

    async fn element_exists(&self, selector: &str) -> Result<bool, DriverError> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_string(selector)
        );
        self.eval_bool(script).await
    }

    async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<chromiumoxide::Element, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::WaitTimeout(format!(
                    "element {selector} not present within {}s",
                    timeout.as_secs()
                )));
            }
            sleep(SPINNER_POLL).await;
        }
    }

    async fn send_button_enabled(&self) -> Result<bool, DriverError> {
        let script = format!(
            r#"(() => {{
                const btn = document.querySelector({sel});
                if (!btn) return false;
                return btn.getAttribute('aria-disabled') === 'false';
            }})()"#,
            sel = js_string(selectors::SEND_BUTTON),
        );
        self.eval_bool(script).await
    }

    async fn read_composer_value(&self) -> Result<String, DriverError> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.value : null;
            }})()"#,
            sel = js_string(selectors::CHAT_INPUT),
        );
        Ok(self
            .eval(script)
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl PageDriver for DeepSeekPage {
    async fn current_url(&self) -> Result<String, DriverError> {
        self.page
            .url()
            .await
            .map_err(|err| DriverError::SessionGone(err.to_string()))?
            .ok_or_else(|| DriverError::SessionGone("tab reports no url".into()))
    }

    async fn is_alive(&self) -> bool {
        self.page.evaluate("document.title").await.is_ok()
    }

    async fn close_sidebar_if_open(&self) -> Result<(), DriverError> {
        let script = format!(
            r#"(() => {{
                const sidebar = document.querySelector({sidebar});
                if (!sidebar) return false;
                if (sidebar.className.includes({collapsed})) return false;
                const toggle = document.querySelector({toggle});
                if (!toggle) return false;
                toggle.click();
                return true;
            }})()"#,
            sidebar = js_string(selectors::SIDEBAR),
            collapsed = js_string(selectors::SIDEBAR_COLLAPSED_CLASS),
            toggle = js_string(selectors::SIDEBAR_TOGGLE),
        );
        if self.eval_bool(script).await? {
            sleep(Duration::from_secs(1)).await;
        }
        Ok(())
    }

    async fn start_new_chat(&self) -> Result<(), DriverError> {
        self.click_via_script(selectors::NEW_CHAT).await.map(|_| ())
    }

    async fn reload_if_stuck(&self) -> Result<(), DriverError> {
        if self.element_exists(selectors::STUCK_MARKER).await? {
            debug!(target: "page-driver", "stuck marker present, reloading page");
            self.refresh().await?;
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<(), DriverError> {
        self.page
            .reload()
            .await
            .map_err(|err| DriverError::Command(err.to_string()))?;
        sleep(Duration::from_secs(1)).await;
        Ok(())
    }

    async fn set_toggle(&self, toggle: ChatToggle, desired: bool) -> Result<(), DriverError> {
        let wants_label = matches!(toggle, ChatToggle::DeepThink);
        let script = format!(
            r#"(() => {{
                const buttons = Array.from(document.querySelectorAll({sel}));
                const btn = buttons.find(b =>
                    b.textContent.includes({label}) === {wants_label});
                if (!btn) return null;
                const active = (btn.getAttribute('style') || '').includes({style});
                if (active !== {desired}) {{
                    btn.click();
                    return true;
                }}
                return false;
            }})()"#,
            sel = js_string(selectors::MODE_TOGGLE),
            label = js_string(selectors::DEEPTHINK_LABEL),
            style = js_string(selectors::TOGGLE_ACTIVE_STYLE),
        );
        match self.eval(script).await? {
            serde_json::Value::Bool(true) => {
                sleep(Duration::from_millis(500)).await;
                Ok(())
            }
            serde_json::Value::Bool(false) => Ok(()),
            _ => Err(DriverError::ElementNotFound(format!(
                "{toggle:?} toggle not on page"
            ))),
        }
    }

    async fn paste_and_verify(&self, text: &str) -> Result<bool, DriverError> {
        let composer = self
            .wait_for_element(selectors::CHAT_INPUT, ELEMENT_WAIT)
            .await?;

        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {text};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selectors::CHAT_INPUT),
            text = js_string(text),
        );
        if !self.eval_bool(script).await? {
            return Ok(false);
        }

        // A no-op keystroke pair forces the composer's own validation to
        // acknowledge the programmatic value.
        composer
            .click()
            .await
            .map_err(|err| DriverError::Command(err.to_string()))?;
        composer
            .type_str(" ")
            .await
            .map_err(|err| DriverError::Command(err.to_string()))?;
        composer
            .press_key("Backspace")
            .await
            .map_err(|err| DriverError::Command(err.to_string()))?;

        Ok(self.read_composer_value().await? == text)
    }

    async fn attach_file(&self, path: &Path) -> Result<(), DriverError> {
        let input = self
            .wait_for_element(selectors::FILE_INPUT, Duration::from_secs(10))
            .await?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.display().to_string()])
            .backend_node_id(input.backend_node_id)
            .build()
            .map_err(DriverError::Command)?;
        self.page
            .execute(params)
            .await
            .map_err(|err| DriverError::Command(err.to_string()))?;
        Ok(())
    }

    async fn invoke_send(&self) -> Result<bool, DriverError> {
        self.wait_for_element(selectors::SEND_BUTTON, ELEMENT_WAIT)
            .await?;

        let deadline = Instant::now() + SEND_ENABLE_WAIT;
        while Instant::now() < deadline {
            if self.send_button_enabled().await? {
                return self.click_via_script(selectors::SEND_BUTTON).await;
            }
            sleep(Duration::from_secs(1)).await;
        }
        Ok(false)
    }

    async fn await_generation_start(&self, timeout: Duration) -> Result<bool, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.element_exists(selectors::GENERATING_SPINNER).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(SPINNER_POLL).await;
        }
    }

    async fn is_generating(&self) -> bool {
        self.send_button_enabled().await.unwrap_or(false)
    }

    async fn extract_last_message_markup(&self) -> Option<String> {
        let script = format!(
            r#"(() => {{
                const blocks = document.querySelectorAll({sel});
                if (!blocks.length) return null;
                return blocks[blocks.length - 1].innerHTML;
            }})()"#,
            sel = js_string(selectors::MESSAGE_BLOCKS),
        );
        match self.eval(script).await {
            Ok(serde_json::Value::String(markup)) => Some(markup),
            Ok(_) => None,
            Err(err) => {
                debug!(target: "page-driver", %err, "message extraction failed");
                None
            }
        }
    }

    async fn write_temp_file(&self, content: &str) -> Result<PathBuf, DriverError> {
        let mut file = tempfile::Builder::new()
            .prefix("chatrelay-prompt-")
            .suffix(".txt")
            .tempfile()
            .map_err(|err| DriverError::Io(err.to_string()))?;
        file.write_all(content.as_bytes())
            .map_err(|err| DriverError::Io(err.to_string()))?;
        let path = file.path().to_path_buf();
        *self.temp_file.lock() = Some(file);
        Ok(path)
    }

    async fn discard_temp_file(&self) {
        // Dropping the handle deletes the file.
        self.temp_file.lock().take();
    }
}

/// Embed a Rust string as a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}
