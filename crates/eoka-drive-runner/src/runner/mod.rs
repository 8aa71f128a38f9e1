mod executor;

pub use executor::ExecutionContext;

use crate::config::{Condition, OnError, Scenario};
use crate::{Error, Result};
use eoka_drive::{Batch, LaunchOptions, Session, StepError, StepRecord};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of running a scenario.
#[derive(Debug)]
pub struct RunResult {
    /// Whether the run succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Per-step outcomes of the last attempt.
    pub steps: Vec<StepRecord>,
    /// Number of steps run in the last attempt, failed ones included.
    pub actions_executed: usize,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    /// Number of retry attempts made.
    pub retries: u32,
}

impl RunResult {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.succeeded()).count()
    }
}

struct Attempt {
    steps: Vec<StepRecord>,
    /// Why the attempt failed, if it did.
    failure: Option<String>,
}

/// Executes scenarios against one browser session.
pub struct Runner {
    session: Session,
}

impl Runner {
    /// Launch a browser and open a session on it.
    pub async fn new(options: &LaunchOptions) -> Result<Self> {
        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            options.headless, options.proxy
        );
        let session = Session::launch(options.clone()).await?;
        Ok(Self { session })
    }

    /// Run on an existing session.
    pub fn with_session(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the scenario with retry support.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<RunResult> {
        self.run_with_base_path(scenario, ".").await
    }

    /// Run the scenario with a base path for resolving includes and
    /// relative screenshot paths.
    pub async fn run_with_base_path(
        &mut self,
        scenario: &Scenario,
        base_path: impl AsRef<Path>,
    ) -> Result<RunResult> {
        let ctx = ExecutionContext::new(base_path.as_ref());
        let start = Instant::now();
        let retry_config = scenario.on_failure.as_ref().and_then(|f| f.retry.as_ref());
        let max_attempts = retry_config.map(|r| r.attempts).unwrap_or(1);
        let retry_delay = retry_config.map(|r| r.delay_ms).unwrap_or(0);

        if let Some(ms) = scenario.implicit_wait_ms {
            self.session.set_implicit_wait(Duration::from_millis(ms));
        }

        let mut last = Attempt {
            steps: Vec::new(),
            failure: None,
        };
        let mut retries = 0;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                retries += 1;
                info!("Retry attempt {}/{}", attempt, max_attempts);
                if retry_delay > 0 {
                    tokio::time::sleep(Duration::from_millis(retry_delay)).await;
                }
            }

            let outcome = match scenario.timeout_ms {
                Some(ms) => tokio::time::timeout(
                    Duration::from_millis(ms),
                    self.run_once(scenario, &ctx),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(Error::Timeout(format!("attempt exceeded {}ms", ms)))
                }),
                None => self.run_once(scenario, &ctx).await,
            };

            last = match outcome {
                Ok(a) if a.failure.is_none() => {
                    return Ok(RunResult {
                        success: true,
                        error: None,
                        actions_executed: a.steps.len(),
                        steps: a.steps,
                        duration_ms: elapsed_ms(start),
                        retries,
                    });
                }
                Ok(a) => a,
                Err(e) => Attempt {
                    steps: Vec::new(),
                    failure: Some(e.to_string()),
                },
            };
            warn!(
                "Attempt {} failed: {}",
                attempt,
                last.failure.as_deref().unwrap_or_default()
            );
        }

        self.handle_failure(scenario, &ctx).await;

        Ok(RunResult {
            success: false,
            error: last.failure,
            actions_executed: last.steps.len(),
            steps: last.steps,
            duration_ms: elapsed_ms(start),
            retries,
        })
    }

    async fn handle_failure(&self, scenario: &Scenario, ctx: &ExecutionContext) {
        let Some(path) = scenario
            .on_failure
            .as_ref()
            .and_then(|f| f.screenshot.as_deref())
        else {
            return;
        };
        let path = ctx.resolve_path(&executor::stamp(path));
        info!("Saving failure screenshot to: {}", path.display());
        if let Err(e) = self.session.save_screenshot(&path).await {
            warn!("Failed to save screenshot: {}", e);
        }
    }

    async fn run_once(&mut self, scenario: &Scenario, ctx: &ExecutionContext) -> Result<Attempt> {
        info!("Navigating to: {}", scenario.target.url);
        self.session.switch_to().default_content().await?;
        self.session.goto(&scenario.target.url).await?;

        let mut batch = Batch::new();
        for (i, step) in scenario.steps.iter().enumerate() {
            let label = step.label();
            debug!("Executing step {}: {}", i + 1, label);
            let started = Instant::now();
            let result = executor::execute(&self.session, step, ctx).await;
            let elapsed = started.elapsed();

            match result {
                Ok(detail) => batch.record(StepRecord {
                    name: label,
                    outcome: Ok(()),
                    elapsed,
                    detail,
                }),
                Err(e) => {
                    warn!("step {} failed: {}", label, e);
                    let failure = format!("step {} ({}) failed: {}", i + 1, label, e);
                    batch.record(StepRecord {
                        name: label,
                        outcome: Err(e.step_error()),
                        elapsed,
                        detail: None,
                    });
                    if scenario.on_error == OnError::Abort {
                        return Ok(Attempt {
                            steps: batch.into_records(),
                            failure: Some(failure),
                        });
                    }
                }
            }
        }

        let success = self.check_success(scenario).await?;
        debug!("Success check: {}", success);

        Ok(Attempt {
            steps: batch.into_records(),
            failure: (!success).then(|| "success conditions not met".to_string()),
        })
    }

    async fn check_success(&self, scenario: &Scenario) -> Result<bool> {
        let Some(ref success) = scenario.success else {
            return Ok(true);
        };

        if let Some(ref any) = success.any {
            for cond in any {
                if self.check_condition(cond).await? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        if let Some(ref all) = success.all {
            for cond in all {
                if !self.check_condition(cond).await? {
                    debug!("condition not met: {}", cond);
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    async fn check_condition(&self, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::UrlContains(pattern) => {
                Ok(self.session.current_url().await?.contains(pattern))
            }
            Condition::TitleContains(pattern) => {
                Ok(self.session.title().await?.contains(pattern))
            }
            Condition::ElementPresent(spec) => {
                let found = self.session.find_elements(spec.locator()?).await?;
                Ok(!found.is_empty())
            }
        }
    }

    /// Quit the browser.
    pub async fn close(self) -> Result<()> {
        self.session.quit().await?;
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl Error {
    /// Classification used in step records.
    pub fn step_error(&self) -> StepError {
        match self {
            Self::Drive(e) => StepError::from(e),
            other => StepError {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}
