//! One live browser session.

use crate::driver::{Driver, ElementRef, EokaDriver};
use crate::element::Element;
use crate::locator::Locator;
use crate::options::LaunchOptions;
use crate::switch::SwitchTo;
use crate::wait::Wait;
use crate::{Error, Result};
use base64::Engine;
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often an implicit wait re-runs a lookup.
const IMPLICIT_POLL: Duration = Duration::from_millis(50);

/// Handle to one browser.
///
/// Clones share the same driver; element handles keep a clone so they can
/// issue commands. The browser is torn down by [`Session::quit`] (at most
/// once) or automatically by [`Session::scoped`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    driver: Arc<dyn Driver>,
    implicit_wait_ms: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("implicit_wait", &self.implicit_wait())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Wrap an already running backend.
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_driver(Arc::new(driver))
    }

    pub fn from_driver(driver: Arc<dyn Driver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                implicit_wait_ms: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Launch Chrome through eoka.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        info!("Launching browser (headless: {})", options.headless);
        let driver = EokaDriver::launch(&options).await?;
        Ok(Self::new(driver))
    }

    /// Run `body` with this session and quit afterwards, whatever happens.
    ///
    /// A panic inside `body` resumes once the browser is gone. When both the
    /// body and teardown fail, the body's error wins and the teardown error
    /// is logged.
    pub async fn scoped<F, Fut, T>(session: Session, body: F) -> Result<T>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let outcome = tokio::spawn(body(session.clone())).await;
        let teardown = session.quit().await;

        match outcome {
            Ok(Ok(value)) => teardown.map(|_| value),
            Ok(Err(e)) => {
                if let Err(te) = teardown {
                    warn!("Teardown failed after error ({}): {}", e, te);
                }
                Err(e)
            }
            Err(join) => {
                if let Err(te) = teardown {
                    warn!("Teardown failed: {}", te);
                }
                if join.is_panic() {
                    std::panic::resume_unwind(join.into_panic());
                }
                Err(Error::SessionClosed)
            }
        }
    }

    /// The backend, unless the session has been quit.
    pub fn driver(&self) -> Result<&dyn Driver> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(self.inner.driver.as_ref())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub async fn goto(&self, url: &str) -> Result<()> {
        info!("goto: {}", url);
        self.driver()?.navigate(url).await
    }

    pub async fn back(&self) -> Result<()> {
        self.driver()?.back().await
    }

    pub async fn forward(&self) -> Result<()> {
        self.driver()?.forward().await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.driver()?.refresh().await
    }

    pub async fn current_url(&self) -> Result<String> {
        self.driver()?.current_url().await
    }

    pub async fn title(&self) -> Result<String> {
        self.driver()?.title().await
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// How long lookups keep retrying before reporting no match.
    pub fn implicit_wait(&self) -> Duration {
        Duration::from_millis(self.inner.implicit_wait_ms.load(Ordering::SeqCst))
    }

    pub fn set_implicit_wait(&self, wait: Duration) {
        debug!("implicit wait: {}ms", wait.as_millis());
        let ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self.inner.implicit_wait_ms.store(ms, Ordering::SeqCst);
    }

    /// First match in document order. Fails with `NotFound` only once the
    /// implicit wait has elapsed.
    pub async fn find_element(&self, locator: Locator) -> Result<Element> {
        let found = self.lookup(None, &locator, self.implicit_wait()).await?;
        self.first(found, locator)
    }

    /// Every match in document order, possibly none.
    pub async fn find_elements(&self, locator: Locator) -> Result<Vec<Element>> {
        let found = self.lookup(None, &locator, self.implicit_wait()).await?;
        Ok(self.wrap(found, &locator))
    }

    /// Poll `find_elements` until something matches or `window` elapses.
    /// A zero window runs the lookup exactly once.
    pub(crate) async fn lookup(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
        window: Duration,
    ) -> Result<Vec<ElementRef>> {
        locator.validate()?;
        let deadline = Instant::now() + window;
        loop {
            let found = self.driver()?.find_elements(scope, locator).await?;
            let now = Instant::now();
            if !found.is_empty() || now >= deadline {
                return Ok(found);
            }
            tokio::time::sleep(IMPLICIT_POLL.min(deadline - now)).await;
        }
    }

    pub(crate) fn first(&self, found: Vec<ElementRef>, locator: Locator) -> Result<Element> {
        match found.into_iter().next() {
            Some(reference) => Ok(Element::new(self.clone(), reference, locator.to_string())),
            None => Err(Error::NotFound(locator.to_string())),
        }
    }

    pub(crate) fn wrap(&self, found: Vec<ElementRef>, locator: &Locator) -> Vec<Element> {
        found
            .into_iter()
            .enumerate()
            .map(|(i, reference)| Element::new(self.clone(), reference, format!("{}[{}]", locator, i)))
            .collect()
    }

    // =========================================================================
    // Page
    // =========================================================================

    /// Run `script` as a function body in the active frame. `args` are
    /// available as `arguments`; an `undefined` result comes back as `null`.
    pub async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.driver()?.execute_script(script, args).await
    }

    pub async fn scroll_by(&self, x: i64, y: i64) -> Result<()> {
        debug!("scroll: ({}, {})", x, y);
        self.execute_script("window.scrollBy(arguments[0], arguments[1]);", vec![json!(x), json!(y)])
            .await?;
        Ok(())
    }

    /// PNG of the visible viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        self.driver()?.screenshot().await
    }

    pub async fn save_screenshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = self.screenshot().await?;
        std::fs::write(path, data)?;
        info!("Screenshot saved: {}", path.display());
        Ok(())
    }

    pub async fn screenshot_base64(&self) -> Result<String> {
        let data = self.screenshot().await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(data))
    }

    /// Deliberate pause, e.g. to watch a headed run.
    pub async fn pause(&self, duration: Duration) {
        info!("pause: {}ms", duration.as_millis());
        tokio::time::sleep(duration).await;
    }

    // =========================================================================
    // Context, waits, teardown
    // =========================================================================

    pub fn switch_to(&self) -> SwitchTo {
        SwitchTo::new(self.clone())
    }

    /// Explicit wait with the default 500ms polling interval.
    pub fn wait(&self, timeout: Duration) -> Wait {
        Wait::new(self.clone(), timeout)
    }

    /// Tear the browser down. Later calls are no-ops.
    pub async fn quit(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("quit: already closed");
            return Ok(());
        }
        info!("Quitting session");
        self.inner.driver.quit().await
    }
}
