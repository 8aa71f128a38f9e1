//! Queued pointer and keyboard gestures.

use crate::element::Element;
use crate::keys::Key;
use crate::session::Session;
use crate::{Error, Result};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
enum Action {
    MoveTo(Element),
    Click(Option<Element>),
    ContextClick(Option<Element>),
    DoubleClick(Option<Element>),
    DragAndDrop(Element, Element),
    SendKeys(Option<Element>, String),
    Key(Option<Element>, Key),
    Pause(Duration),
}

/// Builder for a sequence of gestures, run in order by [`perform`].
///
/// Gestures without an explicit element apply to the element last moved to.
///
/// [`perform`]: ActionChain::perform
#[derive(Debug, Clone)]
pub struct ActionChain {
    session: Session,
    actions: Vec<Action>,
}

impl ActionChain {
    pub fn new(session: &Session) -> Self {
        Self {
            session: session.clone(),
            actions: Vec::new(),
        }
    }

    pub fn move_to(mut self, element: &Element) -> Self {
        self.actions.push(Action::MoveTo(element.clone()));
        self
    }

    pub fn click(mut self, element: Option<&Element>) -> Self {
        self.actions.push(Action::Click(element.cloned()));
        self
    }

    pub fn context_click(mut self, element: Option<&Element>) -> Self {
        self.actions.push(Action::ContextClick(element.cloned()));
        self
    }

    pub fn double_click(mut self, element: Option<&Element>) -> Self {
        self.actions.push(Action::DoubleClick(element.cloned()));
        self
    }

    pub fn drag_and_drop(mut self, source: &Element, target: &Element) -> Self {
        self.actions
            .push(Action::DragAndDrop(source.clone(), target.clone()));
        self
    }

    pub fn send_keys(mut self, element: Option<&Element>, text: impl Into<String>) -> Self {
        self.actions
            .push(Action::SendKeys(element.cloned(), text.into()));
        self
    }

    pub fn key(mut self, element: Option<&Element>, key: Key) -> Self {
        self.actions.push(Action::Key(element.cloned(), key));
        self
    }

    pub fn pause(mut self, duration: Duration) -> Self {
        self.actions.push(Action::Pause(duration));
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run the queue, stopping at the first failure.
    pub async fn perform(self) -> Result<()> {
        debug!("perform {} action(s)", self.actions.len());
        let mut pointer: Option<Element> = None;

        for action in self.actions {
            match action {
                Action::MoveTo(el) => {
                    el.hover().await?;
                    pointer = Some(el);
                }
                Action::Click(el) => target(el, &pointer)?.click().await?,
                Action::ContextClick(el) => target(el, &pointer)?.context_click().await?,
                Action::DoubleClick(el) => target(el, &pointer)?.double_click().await?,
                Action::DragAndDrop(src, dst) => {
                    src.drag_and_drop_to(&dst).await?;
                    pointer = Some(dst);
                }
                Action::SendKeys(el, text) => target(el, &pointer)?.send_keys(&text).await?,
                Action::Key(el, key) => target(el, &pointer)?.send_key(key).await?,
                Action::Pause(d) => self.session.pause(d).await,
            }
        }
        Ok(())
    }
}

fn target(explicit: Option<Element>, pointer: &Option<Element>) -> Result<Element> {
    explicit.or_else(|| pointer.clone()).ok_or_else(|| {
        Error::NotInteractable("no element under the pointer; call move_to first".into())
    })
}
