//! # eoka-drive
//!
//! Selenium-style element interaction on top of eoka: locator strategies,
//! element handles, explicit and implicit waits, select helpers, action
//! chains, frame and dialog switching.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_drive::{until, By, Key, LaunchOptions, Session};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_drive::Result<()> {
//! let session = Session::launch(LaunchOptions::container()).await?;
//! Session::scoped(session, |session| async move {
//!     session.goto("https://www.google.com").await?;
//!     let search = session
//!         .wait(Duration::from_secs(10))
//!         .until(until::element_present(By::name("q")))
//!         .await?;
//!     search.send_keys("Selenium WebDriver").await?;
//!     search.send_key(Key::Enter).await?;
//!     session
//!         .wait(Duration::from_secs(10))
//!         .until(until::url_contains("/search"))
//!         .await?;
//!     Ok(())
//! })
//! .await
//! # }
//! ```

pub mod actions;
pub mod batch;
pub mod driver;
pub mod element;
pub mod keys;
pub mod locator;
pub mod options;
pub mod select;
pub mod session;
pub mod switch;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wait;

pub use actions::ActionChain;
pub use batch::{Batch, BatchReport, StepError, StepRecord};
pub use driver::{Dialog, DialogKind, Driver, ElementRef, EokaDriver, FrameTarget, Gesture};
pub use element::Element;
pub use keys::Key;
pub use locator::{By, Locator};
pub use options::{LaunchOptions, Viewport};
pub use select::Select;
pub use session::Session;
pub use switch::{Alert, SwitchTo};
pub use wait::{until, Condition, Wait};

use std::time::Duration;

/// Result type for eoka-drive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by sessions, element handles and waits.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no element matches {0}")]
    NotFound(String),

    #[error("timed out after {}ms waiting for {condition}", waited.as_millis())]
    Timeout { condition: String, waited: Duration },

    #[error("stale element reference: {0}")]
    StaleReference(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("unexpected tag: expected <{expected}>, found <{found}>")]
    UnexpectedTag { expected: String, found: String },

    #[error("no such frame: {0}")]
    NoSuchFrame(String),

    #[error("no dialog is open")]
    NoSuchAlert,

    #[error("script error: {0}")]
    Script(String),

    #[error("session already closed")]
    SessionClosed,

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`], used by step reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A locator matched nothing.
    NotFound,
    /// A wait predicate never held.
    Timeout,
    /// A handle outlived its document or frame context.
    StaleReference,
    /// The element, frame or dialog refused the operation.
    Interaction,
    /// Browser transport, IO or a closed session.
    Session,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::StaleReference(_) => ErrorKind::StaleReference,
            Self::NotInteractable(_)
            | Self::InvalidSelector(_)
            | Self::UnexpectedTag { .. }
            | Self::NoSuchFrame(_)
            | Self::NoSuchAlert
            | Self::Script(_) => ErrorKind::Interaction,
            Self::SessionClosed | Self::Browser(_) | Self::Io(_) | Self::Json(_) => {
                ErrorKind::Session
            }
        }
    }

    /// Whether a wait should treat this error as "condition not met yet".
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::StaleReference(_))
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not found",
            Self::Timeout => "timeout",
            Self::StaleReference => "stale reference",
            Self::Interaction => "interaction failed",
            Self::Session => "session error",
        })
    }
}
