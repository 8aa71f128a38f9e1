//! Frame and dialog context.

use crate::driver::{Dialog, DialogKind, FrameTarget};
use crate::element::Element;
use crate::session::Session;
use crate::{Error, Result};
use tracing::{debug, info};

/// Returned by [`Session::switch_to`].
///
/// Entering a frame makes every later lookup resolve inside it, and handles
/// found elsewhere go stale until the context is switched back. Navigation
/// resets the context to the top-level document.
#[derive(Debug, Clone)]
pub struct SwitchTo {
    session: Session,
}

impl SwitchTo {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Enter a located `<iframe>` or `<frame>`.
    pub async fn frame(&self, element: &Element) -> Result<()> {
        debug!("switch to frame {}", element);
        self.session
            .driver()?
            .switch_to_frame(FrameTarget::Element(element.reference().clone()))
            .await
    }

    /// Enter the `index`th frame of the active document.
    pub async fn frame_index(&self, index: usize) -> Result<()> {
        debug!("switch to frame #{}", index);
        self.session
            .driver()?
            .switch_to_frame(FrameTarget::Index(index))
            .await
    }

    /// Enter the frame whose `name` or `id` is `name`.
    pub async fn frame_name(&self, name: &str) -> Result<()> {
        debug!("switch to frame '{}'", name);
        self.session
            .driver()?
            .switch_to_frame(FrameTarget::Name(name.to_string()))
            .await
    }

    /// Leave one frame level. A no-op at the top.
    pub async fn parent_frame(&self) -> Result<()> {
        self.session.driver()?.switch_to_parent_frame().await
    }

    pub async fn default_content(&self) -> Result<()> {
        self.session.driver()?.switch_to_default_content().await
    }

    /// The oldest pending dialog.
    pub async fn alert(&self) -> Result<Alert> {
        let dialog = self
            .session
            .driver()?
            .dialog()
            .await?
            .ok_or(Error::NoSuchAlert)?;
        Ok(Alert::new(self.session.clone(), dialog))
    }
}

/// A pending `alert`, `confirm` or `prompt`.
#[derive(Debug, Clone)]
pub struct Alert {
    session: Session,
    dialog: Dialog,
}

impl Alert {
    pub(crate) fn new(session: Session, dialog: Dialog) -> Self {
        Self { session, dialog }
    }

    pub fn text(&self) -> &str {
        &self.dialog.text
    }

    pub fn kind(&self) -> DialogKind {
        self.dialog.kind
    }

    pub async fn accept(self) -> Result<()> {
        info!("accept {:?}: {}", self.dialog.kind, self.dialog.text);
        self.session.driver()?.close_dialog(true).await
    }

    pub async fn dismiss(self) -> Result<()> {
        info!("dismiss {:?}: {}", self.dialog.kind, self.dialog.text);
        self.session.driver()?.close_dialog(false).await
    }
}
