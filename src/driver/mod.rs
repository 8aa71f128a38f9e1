//! The primitive command set a browser backend provides.
//!
//! [`Session`](crate::Session), [`Element`](crate::Element) and the helpers
//! built on them only ever talk to a `dyn Driver`. [`EokaDriver`] drives a
//! real Chrome over CDP; `testing::FakeDriver`, behind the `testing` feature,
//! serves an in-memory DOM for tests.

mod cdp;
mod js;

pub use self::cdp::EokaDriver;

use crate::keys::Key;
use crate::locator::Locator;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Opaque reference to a DOM node, tagged with the frame context it was
/// resolved in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    id: String,
    frames: Vec<String>,
}

impl ElementRef {
    pub fn new(id: impl Into<String>, frames: Vec<String>) -> Self {
        Self {
            id: id.into(),
            frames,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Frame path (outermost first) active when the node was found.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// Fails with `StaleReference` unless `current` is the context this
    /// reference was resolved in.
    pub fn ensure_context(&self, current: &[String]) -> Result<()> {
        if self.frames == current {
            Ok(())
        } else {
            Err(Error::StaleReference(format!(
                "element {} belongs to another frame context",
                self.id
            )))
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Which frame to enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameTarget {
    /// Zero-based index among the active document's frames.
    Index(usize),
    /// Frame whose `name` or `id` attribute matches.
    Name(String),
    /// A previously located `<iframe>`/`<frame>` element.
    Element(ElementRef),
}

/// Single-element pointer gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Hover,
    ContextClick,
    DoubleClick,
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Gesture::Hover => "hover",
            Gesture::ContextClick => "context click",
            Gesture::DoubleClick => "double click",
        })
    }
}

/// A native dialog raised by the page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dialog {
    pub kind: DialogKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Alert,
    Confirm,
    Prompt,
}

impl fmt::Display for DialogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DialogKind::Alert => "alert",
            DialogKind::Confirm => "confirm",
            DialogKind::Prompt => "prompt",
        })
    }
}

/// Browser backend.
///
/// Element operations fail with [`Error::StaleReference`] when the reference
/// belongs to a replaced document, a removed node, or a frame context other
/// than the active one.
#[async_trait]
pub trait Driver: Send + Sync {
    // --- navigation ---
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn back(&self) -> Result<()>;
    async fn forward(&self) -> Result<()>;
    async fn refresh(&self) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn title(&self) -> Result<String>;

    // --- lookup ---
    /// All matches in document order, searched in the active frame or inside
    /// `scope` when given. Never waits.
    async fn find_elements(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>>;

    // --- interaction ---
    async fn click(&self, element: &ElementRef) -> Result<()>;
    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()>;
    async fn press_key(&self, element: &ElementRef, key: Key) -> Result<()>;
    async fn clear(&self, element: &ElementRef) -> Result<()>;
    async fn gesture(&self, element: &ElementRef, gesture: Gesture) -> Result<()>;
    async fn drag_and_drop(&self, source: &ElementRef, target: &ElementRef) -> Result<()>;

    // --- extraction ---
    async fn text(&self, element: &ElementRef) -> Result<String>;
    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>>;
    async fn css_value(&self, element: &ElementRef, property: &str) -> Result<String>;
    async fn tag_name(&self, element: &ElementRef) -> Result<String>;
    async fn is_selected(&self, element: &ElementRef) -> Result<bool>;
    async fn is_displayed(&self, element: &ElementRef) -> Result<bool>;
    async fn is_enabled(&self, element: &ElementRef) -> Result<bool>;

    // --- page ---
    /// Run `script` as a function body in the active frame; `args` are
    /// exposed as `arguments`.
    async fn execute_script(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value>;
    async fn screenshot(&self) -> Result<Vec<u8>>;

    // --- context ---
    async fn switch_to_frame(&self, target: FrameTarget) -> Result<()>;
    async fn switch_to_parent_frame(&self) -> Result<()>;
    async fn switch_to_default_content(&self) -> Result<()>;
    /// Oldest pending dialog, if any.
    async fn dialog(&self) -> Result<Option<Dialog>>;
    /// Close the oldest pending dialog, accepting or dismissing it.
    async fn close_dialog(&self, accept: bool) -> Result<()>;

    /// Tear the browser down.
    async fn quit(&self) -> Result<()>;
}
