//! Explicit waits.
//!
//! ```rust,no_run
//! # use eoka_drive::{until, By, Session};
//! # use std::time::Duration;
//! # async fn demo(session: Session) -> eoka_drive::Result<()> {
//! let button = session
//!     .wait(Duration::from_secs(5))
//!     .poll_interval(Duration::from_millis(100))
//!     .until(until::element_clickable(By::id("submit")))
//!     .await?;
//! button.click().await?;
//! # Ok(())
//! # }
//! ```

use crate::session::Session;
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Polling interval when none is given.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Floor for the polling interval so a wait always yields to the runtime.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A predicate over page state.
///
/// `check` returns `Some(value)` once the condition holds. `NotFound` and
/// `StaleReference` errors count as "not yet"; any other error ends the wait.
#[async_trait]
pub trait Condition: Send + Sync {
    type Output: Send;

    async fn check(&self, session: &Session) -> Result<Option<Self::Output>>;

    /// Human-readable form used in timeout errors.
    fn describe(&self) -> String;
}

/// Wait for a [`Condition`] with a timeout.
#[derive(Debug, Clone)]
pub struct Wait {
    session: Session,
    timeout: Duration,
    interval: Duration,
    message: Option<String>,
}

impl Wait {
    pub fn new(session: Session, timeout: Duration) -> Self {
        Self {
            session,
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
            message: None,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the condition description in the timeout error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check now, then every interval, until the condition holds or the
    /// timeout passes. The last check happens at the deadline itself.
    pub async fn until<C: Condition>(&self, condition: C) -> Result<C::Output> {
        let interval = self.interval.max(MIN_POLL_INTERVAL);
        let start = Instant::now();
        let deadline = start + self.timeout;
        debug!(
            "wait up to {}ms for {}",
            self.timeout.as_millis(),
            condition.describe()
        );

        loop {
            match condition.check(&self.session).await {
                Ok(Some(value)) => {
                    debug!("{} after {}ms", condition.describe(), start.elapsed().as_millis());
                    return Ok(value);
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => trace!("not yet: {}", e),
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    condition: self.message.clone().unwrap_or_else(|| condition.describe()),
                    waited: now - start,
                });
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }
}

/// Ready-made conditions.
pub mod until {
    use super::Condition;
    use crate::element::Element;
    use crate::locator::Locator;
    use crate::session::Session;
    use crate::switch::Alert;
    use crate::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    async fn first(session: &Session, locator: &Locator) -> Result<Option<Element>> {
        let found = session.lookup(None, locator, Duration::ZERO).await?;
        Ok(session.first(found, locator.clone()).ok())
    }

    /// Attached to the DOM, visible or not.
    pub fn element_present(locator: Locator) -> ElementPresent {
        ElementPresent(locator)
    }

    /// Attached and displayed.
    pub fn element_visible(locator: Locator) -> ElementVisible {
        ElementVisible(locator)
    }

    /// Displayed and enabled.
    pub fn element_clickable(locator: Locator) -> ElementClickable {
        ElementClickable(locator)
    }

    pub fn url_contains(fragment: impl Into<String>) -> UrlContains {
        UrlContains(fragment.into())
    }

    pub fn title_contains(fragment: impl Into<String>) -> TitleContains {
        TitleContains(fragment.into())
    }

    /// A dialog is pending; yields it.
    pub fn alert_present() -> AlertPresent {
        AlertPresent
    }

    pub fn text_present_in_element(locator: Locator, text: impl Into<String>) -> TextInElement {
        TextInElement {
            locator,
            text: text.into(),
        }
    }

    #[derive(Debug, Clone)]
    pub struct ElementPresent(Locator);

    #[async_trait]
    impl Condition for ElementPresent {
        type Output = Element;

        async fn check(&self, session: &Session) -> Result<Option<Element>> {
            first(session, &self.0).await
        }

        fn describe(&self) -> String {
            format!("presence of {}", self.0)
        }
    }

    #[derive(Debug, Clone)]
    pub struct ElementVisible(Locator);

    #[async_trait]
    impl Condition for ElementVisible {
        type Output = Element;

        async fn check(&self, session: &Session) -> Result<Option<Element>> {
            match first(session, &self.0).await? {
                Some(el) if el.is_displayed().await? => Ok(Some(el)),
                _ => Ok(None),
            }
        }

        fn describe(&self) -> String {
            format!("visibility of {}", self.0)
        }
    }

    #[derive(Debug, Clone)]
    pub struct ElementClickable(Locator);

    #[async_trait]
    impl Condition for ElementClickable {
        type Output = Element;

        async fn check(&self, session: &Session) -> Result<Option<Element>> {
            match first(session, &self.0).await? {
                Some(el) if el.is_displayed().await? && el.is_enabled().await? => Ok(Some(el)),
                _ => Ok(None),
            }
        }

        fn describe(&self) -> String {
            format!("{} to be clickable", self.0)
        }
    }

    #[derive(Debug, Clone)]
    pub struct UrlContains(String);

    #[async_trait]
    impl Condition for UrlContains {
        type Output = String;

        async fn check(&self, session: &Session) -> Result<Option<String>> {
            let url = session.current_url().await?;
            Ok(url.contains(&self.0).then_some(url))
        }

        fn describe(&self) -> String {
            format!("url containing '{}'", self.0)
        }
    }

    #[derive(Debug, Clone)]
    pub struct TitleContains(String);

    #[async_trait]
    impl Condition for TitleContains {
        type Output = String;

        async fn check(&self, session: &Session) -> Result<Option<String>> {
            let title = session.title().await?;
            Ok(title.contains(&self.0).then_some(title))
        }

        fn describe(&self) -> String {
            format!("title containing '{}'", self.0)
        }
    }

    #[derive(Debug, Clone, Copy)]
    pub struct AlertPresent;

    #[async_trait]
    impl Condition for AlertPresent {
        type Output = Alert;

        async fn check(&self, session: &Session) -> Result<Option<Alert>> {
            let dialog = session.driver()?.dialog().await?;
            Ok(dialog.map(|d| Alert::new(session.clone(), d)))
        }

        fn describe(&self) -> String {
            "an alert".to_string()
        }
    }

    #[derive(Debug, Clone)]
    pub struct TextInElement {
        locator: Locator,
        text: String,
    }

    #[async_trait]
    impl Condition for TextInElement {
        type Output = Element;

        async fn check(&self, session: &Session) -> Result<Option<Element>> {
            match first(session, &self.locator).await? {
                Some(el) if el.text().await?.contains(&self.text) => Ok(Some(el)),
                _ => Ok(None),
            }
        }

        fn describe(&self) -> String {
            format!("text '{}' in {}", self.text, self.locator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, FakeElement, FakePage};
    use crate::By;

    async fn session_with(page: FakePage) -> Session {
        let url = page.url().to_string();
        let session = Session::new(FakeDriver::new().page(page));
        session.goto(&url).await.unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn holds_immediately() {
        let session =
            session_with(FakePage::new("https://a.test/", "A").child(FakeElement::new("p"))).await;
        let start = Instant::now();
        session
            .wait(Duration::from_secs(10))
            .until(until::element_present(By::tag_name("p")))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_within_one_interval_of_truth() {
        let page = FakePage::new("https://a.test/", "A").child(
            FakeElement::new("p")
                .attr("id", "late")
                .appears_after(Duration::from_millis(1200)),
        );
        let session = session_with(page).await;
        let start = Instant::now();
        session
            .wait(Duration::from_secs(10))
            .until(until::element_present(By::id("late")))
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1200));
        assert!(elapsed <= Duration::from_millis(1200) + DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_no_earlier_than_timeout() {
        let session = session_with(FakePage::new("https://a.test/", "A")).await;
        let start = Instant::now();
        let err = session
            .wait(Duration::from_millis(1300))
            .until(until::url_contains("/never"))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1300));
        assert!(elapsed <= Duration::from_millis(1300) + DEFAULT_POLL_INTERVAL);
        match err {
            Error::Timeout { condition, .. } => assert_eq!(condition, "url containing '/never'"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn custom_message_and_interval() {
        let session = session_with(FakePage::new("https://a.test/", "A")).await;
        let err = session
            .wait(Duration::from_millis(300))
            .poll_interval(Duration::from_millis(100))
            .with_message("dashboard to load")
            .until(until::title_contains("Dashboard"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("dashboard to load"));
    }

    #[tokio::test(start_paused = true)]
    async fn visible_waits_for_display() {
        let page = FakePage::new("https://a.test/", "A").child(
            FakeElement::new("div")
                .attr("id", "toast")
                .hidden()
                .shown_after(Duration::from_millis(700)),
        );
        let session = session_with(page).await;
        let start = Instant::now();
        let toast = session
            .wait(Duration::from_secs(5))
            .until(until::element_visible(By::id("toast")))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(700));
        assert!(toast.is_displayed().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn clickable_needs_enabled() {
        let page = FakePage::new("https://a.test/", "A")
            .child(FakeElement::new("button").attr("id", "go").attr("disabled", ""));
        let session = session_with(page).await;
        let err = session
            .wait(Duration::from_secs(1))
            .until(until::element_clickable(By::id("go")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_errors_end_the_wait() {
        let session = session_with(FakePage::new("https://a.test/", "A")).await;
        let start = Instant::now();
        let err = session
            .wait(Duration::from_secs(5))
            .until(until::element_present(By::xpath("//[")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSelector(_)));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn alert_and_text_conditions() {
        let page = FakePage::new("https://a.test/", "A")
            .child(
                FakeElement::new("p")
                    .attr("id", "status")
                    .text("Loading")
                    .text_after(Duration::from_millis(900), "Done"),
            )
            .dialog_after(Duration::from_secs(1), "Saved");
        let session = session_with(page).await;

        let status = session
            .wait(Duration::from_secs(3))
            .until(until::text_present_in_element(By::id("status"), "Done"))
            .await
            .unwrap();
        assert_eq!(status.text().await.unwrap(), "Done");

        let alert = session
            .wait(Duration::from_secs(3))
            .until(until::alert_present())
            .await
            .unwrap();
        assert_eq!(alert.text(), "Saved");
        alert.accept().await.unwrap();
    }
}
