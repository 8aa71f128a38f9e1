//! Handles to located DOM nodes.

use crate::driver::{ElementRef, Gesture};
use crate::keys::Key;
use crate::locator::Locator;
use crate::session::Session;
use crate::Result;
use std::fmt;
use tracing::debug;

/// A located element.
///
/// The handle is bound to the document and frame context it was found in;
/// after navigation, removal of the node, or a frame switch every operation
/// fails with [`Error::StaleReference`](crate::Error::StaleReference).
#[derive(Clone)]
pub struct Element {
    session: Session,
    reference: ElementRef,
    description: String,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("reference", &self.reference)
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl Element {
    pub(crate) fn new(session: Session, reference: ElementRef, description: String) -> Self {
        Self {
            session,
            reference,
            description,
        }
    }

    pub fn reference(&self) -> &ElementRef {
        &self.reference
    }

    /// The locator this handle was found by.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // --- lookup within this element ---

    pub async fn find_element(&self, locator: Locator) -> Result<Element> {
        let found = self
            .session
            .lookup(Some(&self.reference), &locator, self.session.implicit_wait())
            .await?;
        self.session.first(found, locator)
    }

    pub async fn find_elements(&self, locator: Locator) -> Result<Vec<Element>> {
        let found = self
            .session
            .lookup(Some(&self.reference), &locator, self.session.implicit_wait())
            .await?;
        Ok(self.session.wrap(found, &locator))
    }

    // --- interaction ---

    pub async fn click(&self) -> Result<()> {
        debug!("click: {}", self);
        self.session.driver()?.click(&self.reference).await
    }

    /// Append `text` to the element's edit buffer.
    pub async fn send_keys(&self, text: &str) -> Result<()> {
        debug!("type into {}: {} chars", self, text.chars().count());
        self.session.driver()?.send_keys(&self.reference, text).await
    }

    pub async fn send_key(&self, key: Key) -> Result<()> {
        debug!("key {} on {}", key, self);
        self.session.driver()?.press_key(&self.reference, key).await
    }

    pub async fn clear(&self) -> Result<()> {
        debug!("clear: {}", self);
        self.session.driver()?.clear(&self.reference).await
    }

    pub async fn hover(&self) -> Result<()> {
        self.gesture(Gesture::Hover).await
    }

    pub async fn context_click(&self) -> Result<()> {
        self.gesture(Gesture::ContextClick).await
    }

    pub async fn double_click(&self) -> Result<()> {
        self.gesture(Gesture::DoubleClick).await
    }

    async fn gesture(&self, gesture: Gesture) -> Result<()> {
        debug!("{}: {}", gesture, self);
        self.session.driver()?.gesture(&self.reference, gesture).await
    }

    /// Drag this element onto `target`.
    pub async fn drag_and_drop_to(&self, target: &Element) -> Result<()> {
        debug!("drag {} onto {}", self, target);
        self.session
            .driver()?
            .drag_and_drop(&self.reference, &target.reference)
            .await
    }

    // --- extraction ---

    /// Rendered text; empty for hidden elements.
    pub async fn text(&self) -> Result<String> {
        self.session.driver()?.text(&self.reference).await
    }

    /// Live property when one exists (absolute `href`, current `value`),
    /// otherwise the markup attribute. `None` when neither is present.
    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.session.driver()?.attribute(&self.reference, name).await
    }

    pub async fn css_value(&self, property: &str) -> Result<String> {
        self.session.driver()?.css_value(&self.reference, property).await
    }

    /// Lowercase tag name.
    pub async fn tag_name(&self) -> Result<String> {
        self.session.driver()?.tag_name(&self.reference).await
    }

    pub async fn is_selected(&self) -> Result<bool> {
        self.session.driver()?.is_selected(&self.reference).await
    }

    pub async fn is_displayed(&self) -> Result<bool> {
        self.session.driver()?.is_displayed(&self.reference).await
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        self.session.driver()?.is_enabled(&self.reference).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{FakeDriver, FakeElement, FakePage};
    use crate::{By, Error, Key, Session};

    fn form() -> FakePage {
        FakePage::new("https://app.test/login", "Login")
            .child(
                FakeElement::new("form")
                    .attr("action", "/dashboard")
                    .child(FakeElement::new("input").attr("id", "username"))
                    .child(FakeElement::new("input").attr("id", "password").attr("type", "password"))
                    .child(FakeElement::new("input").attr("id", "ro").attr("readonly", ""))
                    .child(FakeElement::new("button").attr("type", "submit").text("Sign in")),
            )
            .child(FakeElement::new("input").attr("id", "agree").attr("type", "checkbox"))
            .child(FakeElement::new("button").attr("id", "off").attr("disabled", "").text("Off"))
            .child(FakeElement::new("div").attr("id", "ghost").hidden().text("boo"))
            .child(
                FakeElement::new("a")
                    .attr("href", "/docs")
                    .attr("class", "nav")
                    .text("Read the docs"),
            )
            .child(
                FakeElement::new("ul")
                    .attr("id", "list")
                    .child(FakeElement::new("li").text("one"))
                    .child(FakeElement::new("li").text("two")),
            )
    }

    async fn session() -> Session {
        let session = Session::new(FakeDriver::new().page(form()).page(FakePage::new(
            "https://app.test/dashboard",
            "Dashboard",
        )));
        session.goto("https://app.test/login").await.unwrap();
        session
    }

    #[tokio::test]
    async fn clear_then_type_replaces_value() {
        let session = session().await;
        let user = session.find_element(By::id("username")).await.unwrap();
        user.send_keys("old").await.unwrap();
        user.send_keys("er").await.unwrap();
        assert_eq!(user.attribute("value").await.unwrap().as_deref(), Some("older"));

        user.clear().await.unwrap();
        user.send_keys("alice").await.unwrap();
        assert_eq!(user.attribute("value").await.unwrap().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn typing_into_disabled_hidden_or_readonly_fails() {
        let session = session().await;
        for id in ["off", "ghost", "ro", "agree"] {
            let el = session.find_element(By::id(id)).await.unwrap();
            let err = el.send_keys("x").await.unwrap_err();
            assert!(matches!(err, Error::NotInteractable(_)), "{}: {}", id, err);
        }
    }

    #[tokio::test]
    async fn checkbox_click_toggles() {
        let session = session().await;
        let agree = session.find_element(By::id("agree")).await.unwrap();
        assert!(!agree.is_selected().await.unwrap());
        agree.click().await.unwrap();
        assert!(agree.is_selected().await.unwrap());
        agree.click().await.unwrap();
        assert!(!agree.is_selected().await.unwrap());
    }

    #[tokio::test]
    async fn state_queries() {
        let session = session().await;
        let off = session.find_element(By::id("off")).await.unwrap();
        assert!(!off.is_enabled().await.unwrap());
        assert!(off.is_displayed().await.unwrap());
        let ghost = session.find_element(By::id("ghost")).await.unwrap();
        assert!(!ghost.is_displayed().await.unwrap());
        assert_eq!(ghost.text().await.unwrap(), "");
        assert_eq!(ghost.css_value("display").await.unwrap(), "none");
    }

    #[tokio::test]
    async fn link_href_is_absolute() {
        let session = session().await;
        let link = session.find_element(By::link_text("Read the docs")).await.unwrap();
        assert_eq!(
            link.attribute("href").await.unwrap().as_deref(),
            Some("https://app.test/docs")
        );
        assert_eq!(link.attribute("data-missing").await.unwrap(), None);
        assert_eq!(link.tag_name().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn scoped_lookup_stays_inside() {
        let session = session().await;
        let list = session.find_element(By::id("list")).await.unwrap();
        let items = list.find_elements(By::tag_name("li")).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].text().await.unwrap(), "two");
        assert!(matches!(
            list.find_element(By::id("username")).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn enter_submits_and_stales_old_handles() {
        let session = session().await;
        let user = session.find_element(By::id("username")).await.unwrap();
        user.send_keys("alice").await.unwrap();
        user.send_key(Key::Enter).await.unwrap();

        assert_eq!(session.current_url().await.unwrap(), "https://app.test/dashboard");
        assert!(matches!(user.text().await, Err(Error::StaleReference(_))));
    }

    #[tokio::test]
    async fn submit_button_click_navigates_and_back_returns() {
        let session = session().await;
        let submit = session.find_element(By::css("button[type='submit']")).await.unwrap();
        submit.click().await.unwrap();
        assert_eq!(session.current_url().await.unwrap(), "https://app.test/dashboard");

        session.back().await.unwrap();
        assert_eq!(session.current_url().await.unwrap(), "https://app.test/login");
        assert!(matches!(submit.click().await, Err(Error::StaleReference(_))));
        let again = session.find_element(By::css("button[type='submit']")).await.unwrap();
        assert_eq!(again.text().await.unwrap(), "Sign in");
    }
}
