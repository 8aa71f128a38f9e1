//! CDP backend: a [`Driver`] over one eoka browser and page.

use super::js::{self, Reply, REF_ATTR};
use super::{Dialog, DialogKind, Driver, ElementRef, FrameTarget, Gesture};
use crate::keys::Key;
use crate::locator::Locator;
use crate::options::LaunchOptions;
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::cdp::transport::CdpMessage;
use eoka::cdp::MouseEventType;
use eoka::{Browser, Page};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Drives a real Chrome through eoka.
///
/// Element references are `data-eoka-ref` attributes stamped on located
/// nodes; each document gets a fresh token so references from a previous
/// page can never resolve against a new one.
///
/// Page dialogs stay native. A background task records every
/// `Page.javascriptDialogOpening` event; a command interrupted by a dialog
/// returns as soon as it opens, and until the dialog is accepted or
/// dismissed any command that needs the page fails with
/// [`Error::NotInteractable`].
pub struct EokaDriver {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    frames: Mutex<Vec<String>>,
    dialogs: Arc<Dialogs>,
    watcher: JoinHandle<()>,
}

#[derive(Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// Dialogs Chrome reported open, oldest first.
#[derive(Default)]
struct Dialogs {
    open: Mutex<VecDeque<OpenDialog>>,
    opened: Notify,
}

struct OpenDialog {
    dialog: Dialog,
    default_prompt: String,
}

impl Dialogs {
    fn queue(&self) -> MutexGuard<'_, VecDeque<OpenDialog>> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn front(&self) -> Option<Dialog> {
        self.queue().front().map(|d| d.dialog.clone())
    }
}

/// `Page.javascriptDialogOpening` parameters.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DialogOpening {
    message: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    default_prompt: String,
}

impl From<DialogOpening> for OpenDialog {
    fn from(event: DialogOpening) -> Self {
        let kind = match event.kind.as_str() {
            "alert" => DialogKind::Alert,
            "prompt" => DialogKind::Prompt,
            // confirm, beforeunload
            _ => DialogKind::Confirm,
        };
        OpenDialog {
            dialog: Dialog {
                kind,
                text: event.message,
            },
            default_prompt: event.default_prompt,
        }
    }
}

fn watch_dialogs(page: &Page, dialogs: Arc<Dialogs>) -> JoinHandle<()> {
    let transport = page.session().transport().clone();
    let session_id = page.session().session_id().to_string();
    tokio::spawn(async move {
        while let Some(message) = transport.recv_event().await {
            let CdpMessage::Event {
                method,
                params,
                session_id: from,
            } = message
            else {
                continue;
            };
            if method != "Page.javascriptDialogOpening"
                || from.as_deref().is_some_and(|id| id != session_id)
            {
                continue;
            }
            match serde_json::from_value::<DialogOpening>(params) {
                Ok(event) => {
                    debug!("dialog opened ({}): {}", event.kind, event.message);
                    dialogs.queue().push_back(event.into());
                    dialogs.opened.notify_waiters();
                }
                Err(e) => warn!("Unreadable dialog event: {}", e),
            }
        }
    })
}

fn dialog_open(dialog: &Dialog) -> Error {
    Error::NotInteractable(format!("a {} dialog is open: {}", dialog.kind, dialog.text))
}

/// At most `max` characters of `script`, for logging.
fn preview(script: &str, max: usize) -> &str {
    match script.char_indices().nth(max) {
        Some((end, _)) => &script[..end],
        None => script,
    }
}

impl EokaDriver {
    /// Launch a browser and open a blank page.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        debug!(
            "Launching browser (headless: {}, args: {:?})",
            options.headless,
            options.chrome_args()
        );
        let browser = Browser::launch_with_config(options.stealth_config()).await?;
        let page = browser.new_page("about:blank").await?;
        let dialogs = Arc::new(Dialogs::default());
        let watcher = watch_dialogs(&page, dialogs.clone());
        Ok(Self {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            frames: Mutex::new(Vec::new()),
            dialogs,
            watcher,
        })
    }

    /// The underlying eoka page, for anything this driver does not cover.
    pub fn page(&self) -> &Page {
        &self.page
    }

    fn frame_stack(&self) -> MutexGuard<'_, Vec<String>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn frames(&self) -> Vec<String> {
        self.frame_stack().clone()
    }

    fn selector(element: &ElementRef) -> String {
        format!("[{}=\"{}\"]", REF_ATTR, element.id())
    }

    /// Await a page command unless a dialog is, or becomes, open.
    ///
    /// `None` means a dialog opened while the command ran: Chrome only
    /// answers it once the dialog closes, so it is left behind.
    async fn guarded<T>(
        &self,
        command: impl Future<Output = eoka::Result<T>>,
    ) -> Result<Option<T>> {
        let opened = self.dialogs.opened.notified();
        tokio::pin!(opened);
        opened.as_mut().enable();
        if let Some(dialog) = self.dialogs.front() {
            return Err(dialog_open(&dialog));
        }
        tokio::select! {
            out = command => Ok(Some(out?)),
            _ = opened => Ok(None),
        }
    }

    /// A page command whose answer is needed.
    async fn query<T>(&self, command: impl Future<Output = eoka::Result<T>>) -> Result<T> {
        match self.guarded(command).await? {
            Some(value) => Ok(value),
            None => Err(self.interrupted()),
        }
    }

    fn interrupted(&self) -> Error {
        match self.dialogs.front() {
            Some(dialog) => dialog_open(&dialog),
            None => Error::NotInteractable("a dialog interrupted the command".into()),
        }
    }

    /// Evaluate a command body; `None` if a dialog opened before it answered.
    async fn attempt(&self, frames: &[String], body: &str, args: Value) -> Result<Option<Value>> {
        let program = js::program(body, frames, &args);
        let Some(raw) = self.guarded(self.page.evaluate::<String>(&program)).await? else {
            return Ok(None);
        };
        let reply: Reply = serde_json::from_str(&raw)?;
        if reply.status == "ok" {
            return Ok(Some(reply.value));
        }
        Err(reply_error(&reply.status, reply.message.unwrap_or_default()))
    }

    async fn run(&self, frames: &[String], body: &str, args: Value) -> Result<Value> {
        match self.attempt(frames, body, args).await? {
            Some(value) => Ok(value),
            None => Err(self.interrupted()),
        }
    }

    /// Run an element action in the element's own context. A dialog opening
    /// mid-action means the action took effect.
    async fn act_on(&self, element: &ElementRef, body: &str, mut args: Value) -> Result<Option<Value>> {
        let frames = self.frames();
        element.ensure_context(&frames)?;
        args["ref"] = json!(element.id());
        self.attempt(&frames, body, args).await
    }

    /// Run an element query in the element's own context.
    async fn on(&self, element: &ElementRef, body: &str, args: Value) -> Result<Value> {
        match self.act_on(element, body, args).await? {
            Some(value) => Ok(value),
            None => Err(self.interrupted()),
        }
    }

    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        element: &ElementRef,
        query: &str,
        name: Option<&str>,
    ) -> Result<T> {
        let value = self
            .on(element, js::READ, json!({ "query": query, "name": name }))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn move_pointer(&self, element: &ElementRef) -> Result<()> {
        let point: Point = serde_json::from_value(self.on(element, js::POINT, json!({})).await?)?;
        self.guarded(self.page.session().dispatch_mouse_event(
            MouseEventType::MouseMoved,
            point.x,
            point.y,
            None,
            None,
        ))
        .await?;
        Ok(())
    }

    fn reset_frames(&self) {
        self.frame_stack().clear();
    }
}

impl Drop for EokaDriver {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

fn reply_error(status: &str, message: String) -> Error {
    match status {
        "stale" => Error::StaleReference(message),
        "not_found" => Error::NotFound(message),
        "not_interactable" => Error::NotInteractable(message),
        "invalid_selector" => Error::InvalidSelector(message),
        "no_frame" => Error::NoSuchFrame(message),
        other => Error::Script(format!("{}: {}", other, message)),
    }
}

#[async_trait]
impl Driver for EokaDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        info!("goto: {}", url);
        self.reset_frames();
        self.guarded(self.page.goto(url)).await?;
        Ok(())
    }

    async fn back(&self) -> Result<()> {
        debug!("back");
        self.reset_frames();
        self.guarded(self.page.back()).await?;
        Ok(())
    }

    async fn forward(&self) -> Result<()> {
        debug!("forward");
        self.reset_frames();
        self.guarded(self.page.forward()).await?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        debug!("reload");
        self.reset_frames();
        self.guarded(self.page.reload()).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.query(self.page.url()).await
    }

    async fn title(&self) -> Result<String> {
        self.query(self.page.title()).await
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>> {
        let frames = self.frames();
        if let Some(scope) = scope {
            scope.ensure_context(&frames)?;
        }
        let args = json!({
            "by": locator.by.as_str(),
            "value": locator.value,
            "scope": scope.map(|s| s.id()),
        });
        let ids: Vec<String> = serde_json::from_value(self.run(&frames, js::FIND, args).await?)?;
        debug!("find {}: {} match(es)", locator, ids.len());
        Ok(ids
            .into_iter()
            .map(|id| ElementRef::new(id, frames.clone()))
            .collect())
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        // Real input events only reach the top-level document by selector.
        let native = element.frames().is_empty();
        let Some(mode) = self.act_on(element, js::CLICK, json!({ "native": native })).await? else {
            return Ok(());
        };
        if mode == "native" {
            self.guarded(self.page.click(&Self::selector(element))).await?;
        }
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        if self.act_on(element, js::FOCUS, json!({ "text": true })).await?.is_some() {
            self.guarded(self.page.type_text(text)).await?;
        }
        Ok(())
    }

    async fn press_key(&self, element: &ElementRef, key: Key) -> Result<()> {
        if self.act_on(element, js::FOCUS, json!({ "text": false })).await?.is_none() {
            return Ok(());
        }
        match key {
            Key::Space => self.guarded(self.page.type_text(" ")).await?,
            other => self.guarded(self.page.human().press_key(other.dom_key())).await?,
        };
        Ok(())
    }

    async fn clear(&self, element: &ElementRef) -> Result<()> {
        self.act_on(element, js::CLEAR, json!({})).await?;
        Ok(())
    }

    async fn gesture(&self, element: &ElementRef, gesture: Gesture) -> Result<()> {
        debug!("{}: {}", gesture, element);
        self.move_pointer(element).await?;
        let kind = match gesture {
            Gesture::Hover => return Ok(()),
            Gesture::ContextClick => "context",
            Gesture::DoubleClick => "double",
        };
        self.act_on(element, js::GESTURE, json!({ "gesture": kind }))
            .await?;
        Ok(())
    }

    async fn drag_and_drop(&self, source: &ElementRef, target: &ElementRef) -> Result<()> {
        let frames = self.frames();
        source.ensure_context(&frames)?;
        target.ensure_context(&frames)?;
        debug!("drag: {} -> {}", source, target);
        self.attempt(
            &frames,
            js::DRAG,
            json!({ "source": source.id(), "target": target.id() }),
        )
        .await?;
        Ok(())
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        self.read(element, "text", None).await
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        self.read(element, "attribute", Some(name)).await
    }

    async fn css_value(&self, element: &ElementRef, property: &str) -> Result<String> {
        self.read(element, "css", Some(property)).await
    }

    async fn tag_name(&self, element: &ElementRef) -> Result<String> {
        self.read(element, "tag", None).await
    }

    async fn is_selected(&self, element: &ElementRef) -> Result<bool> {
        self.read(element, "selected", None).await
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        self.read(element, "displayed", None).await
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
        self.read(element, "enabled", None).await
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        debug!("execute: {}...", preview(script, 50));
        let frames = self.frames();
        let value = self
            .attempt(&frames, js::SCRIPT, json!({ "script": script, "args": args }))
            .await?;
        Ok(value.unwrap_or(Value::Null))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.query(self.page.screenshot()).await
    }

    async fn switch_to_frame(&self, target: FrameTarget) -> Result<()> {
        let frames = self.frames();
        let args = match &target {
            FrameTarget::Index(index) => json!({ "index": index }),
            FrameTarget::Name(name) => json!({ "name": name }),
            FrameTarget::Element(element) => {
                element.ensure_context(&frames)?;
                json!({ "ref": element.id() })
            }
        };
        let id: String = serde_json::from_value(self.run(&frames, js::FRAME, args).await?)?;
        debug!("switch to frame {:?} ({})", target, id);
        self.frame_stack().push(id);
        Ok(())
    }

    async fn switch_to_parent_frame(&self) -> Result<()> {
        self.frame_stack().pop();
        Ok(())
    }

    async fn switch_to_default_content(&self) -> Result<()> {
        self.reset_frames();
        Ok(())
    }

    async fn dialog(&self) -> Result<Option<Dialog>> {
        Ok(self.dialogs.front())
    }

    async fn close_dialog(&self, accept: bool) -> Result<()> {
        let Some(open) = self.dialogs.queue().pop_front() else {
            return Err(Error::NoSuchAlert);
        };
        debug!("close {} dialog (accept: {})", open.dialog.kind, accept);
        if !accept {
            self.page.dismiss_dialog().await?;
        } else if open.dialog.kind == DialogKind::Prompt {
            self.page.accept_dialog(Some(&open.default_prompt)).await?;
        } else {
            self.page.accept_dialog(None).await?;
        }
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        let Some(browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        info!("Closing browser");
        self.watcher.abort();
        browser.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_targets_ref_attribute() {
        let r = ElementRef::new("k3v9-12", Vec::new());
        assert_eq!(EokaDriver::selector(&r), "[data-eoka-ref=\"k3v9-12\"]");
    }

    #[test]
    fn script_preview_stops_on_char_boundary() {
        let script = format!("{}é + 'ü'", "x".repeat(49));
        assert_eq!(preview(&script, 50), format!("{}é", "x".repeat(49)));
        assert_eq!(preview("return 1;", 50), "return 1;");
        assert_eq!(preview("ééé", 2), "éé");
    }

    #[test]
    fn dialog_events_map_to_kinds() {
        let event = |kind: &str| -> OpenDialog {
            serde_json::from_value::<DialogOpening>(json!({
                "url": "https://app.test/",
                "message": "Sure?",
                "type": kind,
                "hasBrowserHandler": false,
                "defaultPrompt": "guest",
            }))
            .unwrap()
            .into()
        };
        assert_eq!(event("alert").dialog.kind, DialogKind::Alert);
        assert_eq!(event("confirm").dialog.kind, DialogKind::Confirm);
        assert_eq!(event("beforeunload").dialog.kind, DialogKind::Confirm);
        let prompt = event("prompt");
        assert_eq!(prompt.dialog.kind, DialogKind::Prompt);
        assert_eq!(prompt.dialog.text, "Sure?");
        assert_eq!(prompt.default_prompt, "guest");
    }

    #[test]
    fn open_dialog_blocks_commands() {
        let err = dialog_open(&Dialog {
            kind: DialogKind::Confirm,
            text: "Delete?".into(),
        });
        assert!(matches!(err, Error::NotInteractable(ref m) if m == "a confirm dialog is open: Delete?"));
    }

    #[test]
    fn reply_statuses_map_to_errors() {
        assert!(matches!(
            reply_error("stale", "gone".into()),
            Error::StaleReference(_)
        ));
        assert!(matches!(
            reply_error("not_interactable", "hidden".into()),
            Error::NotInteractable(_)
        ));
        assert!(matches!(
            reply_error("invalid_selector", "bad".into()),
            Error::InvalidSelector(_)
        ));
        assert!(matches!(
            reply_error("script_error", "x is not defined".into()),
            Error::Script(m) if m.contains("x is not defined")
        ));
    }
}
