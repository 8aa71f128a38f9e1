//! Best-effort step execution.
//!
//! A [`Batch`] runs independent steps one after another and records how each
//! went instead of stopping at the first failure:
//!
//! ```rust,no_run
//! # use eoka_drive::{Batch, By, Session};
//! # async fn demo(session: Session) {
//! let mut batch = Batch::new();
//! let heading = batch
//!     .step("read heading", async {
//!         session.find_element(By::tag_name("h1")).await?.text().await
//!     })
//!     .await;
//! batch
//!     .step("open docs", async {
//!         session.find_element(By::link_text("Docs")).await?.click().await
//!     })
//!     .await;
//! println!("{}", batch.report());
//! # let _ = heading;
//! # }
//! ```

use crate::{Error, ErrorKind, Result};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for StepError {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    #[serde(serialize_with = "outcome")]
    pub outcome: std::result::Result<(), StepError>,
    #[serde(serialize_with = "millis")]
    pub elapsed: Duration,
    /// Optional value worth showing (text read, URL reached).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn outcome<S: serde::Serializer>(
    outcome: &std::result::Result<(), StepError>,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    match outcome {
        Ok(()) => s.serialize_none(),
        Err(e) => s.serialize_some(e),
    }
}

fn millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl StepRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.outcome, &self.detail) {
            (Ok(()), Some(detail)) => write!(f, "✓ {}: {}", self.name, detail),
            (Ok(()), None) => write!(f, "✓ {}", self.name),
            (Err(e), _) => write!(f, "✗ {}: {}", self.name, e),
        }
    }
}

/// Collects step outcomes.
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<StepRecord>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await `step`, record the outcome, and hand back its value when it
    /// succeeded.
    pub async fn step<T, F>(&mut self, name: impl Into<String>, step: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.run(name.into(), step, |_| None).await
    }

    /// Like [`step`](Self::step), keeping the value's `Display` as detail.
    pub async fn step_shown<T, F>(&mut self, name: impl Into<String>, step: F) -> Option<T>
    where
        T: fmt::Display,
        F: Future<Output = Result<T>>,
    {
        self.run(name.into(), step, |v| Some(v.to_string())).await
    }

    async fn run<T, F>(
        &mut self,
        name: String,
        step: F,
        detail: impl FnOnce(&T) -> Option<String>,
    ) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = step.await;
        let elapsed = start.elapsed();

        let (record, value) = match result {
            Ok(value) => {
                let record = StepRecord {
                    name,
                    outcome: Ok(()),
                    elapsed,
                    detail: detail(&value),
                };
                info!("{}", record);
                (record, Some(value))
            }
            Err(e) => {
                let record = StepRecord {
                    name,
                    outcome: Err(StepError::from(&e)),
                    elapsed,
                    detail: None,
                };
                warn!("{}", record);
                (record, None)
            }
        };
        self.records.push(record);
        value
    }

    /// Append an externally produced record.
    pub fn record(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    pub fn report(&self) -> BatchReport {
        let failed = self.records.iter().filter(|r| !r.succeeded()).count();
        BatchReport {
            total: self.records.len(),
            succeeded: self.records.len() - failed,
            failed,
        }
    }
}

/// Summary counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} steps succeeded ({} failed)",
            self.succeeded, self.total, self.failed
        )
    }
}
