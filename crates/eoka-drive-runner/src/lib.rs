//! # eoka-drive-runner
//!
//! Scenario-based browser automation on eoka-drive. Describe locator-based
//! steps in YAML, run them against a session, get one record per step.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_drive_runner::{Runner, Scenario};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_drive_runner::Result<()> {
//! let scenario = Scenario::load("search.yaml")?;
//! let mut runner = Runner::new(&scenario.browser).await?;
//! let result = runner.run(&scenario).await?;
//! for step in &result.steps {
//!     println!("{}", step);
//! }
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod runner;

pub use config::steps;
pub use config::{
    Condition, LocatorSpec, OnError, OnFailure, ParamDef, Params, RetryConfig, Scenario, Step,
    SuccessCondition, TargetUrl,
};
pub use runner::{ExecutionContext, RunResult, Runner};

use eoka_drive::ErrorKind;

/// Result type for eoka-drive-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during scenario loading or execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Drive(#[from] eoka_drive::Error),

    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Drive(e) => e.kind(),
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::ActionFailed(_) | Self::AssertionFailed(_) => ErrorKind::Interaction,
            Self::Config(_) | Self::Yaml(_) | Self::Io(_) => ErrorKind::Session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_scenario() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
"#;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.target.url, "https://example.com");
        assert!(scenario.steps.is_empty());
        assert!(!scenario.browser.headless);
        assert_eq!(scenario.on_error, OnError::Abort);
        assert!(scenario.implicit_wait_ms.is_none());
    }

    #[test]
    fn test_parse_browser_options() {
        let yaml = r#"
name: "Test"
browser:
  headless: true
  sandbox: false
  use_dev_shm: false
  proxy: "http://localhost:8080"
  viewport:
    width: 1920
    height: 1080
target:
  url: "https://example.com"
"#;
        let scenario = Scenario::parse(yaml).unwrap();
        assert!(scenario.browser.headless);
        assert!(!scenario.browser.sandbox);
        assert!(!scenario.browser.use_dev_shm);
        assert_eq!(
            scenario.browser.proxy.as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(scenario.browser.viewport.map(|v| v.width), Some(1920));
    }

    #[test]
    fn test_parse_every_step_kind() {
        let yaml = r##"
name: "Tour"
target:
  url: "https://tour.test/"
implicit_wait_ms: 500
on_error: continue
steps:
  - goto:
      url: "https://tour.test/form"
  - back
  - forward
  - refresh
  - pause: {ms: 100}
  - find: {id: title}
  - find_all: {css: ".result h3", show: 5}
  - type: {name: q, value: "Selenium WebDriver", clear: true}
  - clear: {name: q}
  - press_key: {name: q, key: enter}
  - click: {xpath: "//button[@id='save']"}
  - context_click: {id: menu}
  - double_click: {id: card}
  - hover: {class: field}
  - drag: {from: {id: card}, to: {id: bin}}
  - select: {id: size, text: Large}
  - check: {id: terms}
  - uncheck: {id: terms}
  - read_text: {tag: h1}
  - read_attribute: {link_text: "Need help?", attribute: href}
  - read_css: {id: title, property: display}
  - wait_for: {url_contains: /search, timeout_ms: 5000}
  - frame: {name: inner}
  - parent_frame
  - default_content
  - accept_alert
  - dismiss_alert
  - execute: {js: "return arguments[0] * 2;", args: [21]}
  - scroll: {direction: down, amount: 3}
  - screenshot: {path: "tour-{timestamp}.png"}
  - log: {message: "done"}
  - assert_url: {contains: /form}
  - assert_text: {partial_link_text: help, contains: Need}
  - include: {path: flows/login.yaml, params: {user: ada}}
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        assert_eq!(scenario.on_error, OnError::Continue);
        assert_eq!(scenario.implicit_wait_ms, Some(500));
        let names: Vec<_> = scenario.steps.iter().map(Step::name).collect();
        assert_eq!(
            names,
            vec![
                "goto",
                "back",
                "forward",
                "refresh",
                "pause",
                "find",
                "find_all",
                "type",
                "clear",
                "press_key",
                "click",
                "context_click",
                "double_click",
                "hover",
                "drag",
                "select",
                "check",
                "uncheck",
                "read_text",
                "read_attribute",
                "read_css",
                "wait_for",
                "frame",
                "parent_frame",
                "default_content",
                "accept_alert",
                "dismiss_alert",
                "execute",
                "scroll",
                "screenshot",
                "log",
                "assert_url",
                "assert_text",
                "include",
            ]
        );

        if let Step::FindAll(s) = &scenario.steps[6] {
            assert_eq!(s.show, 5);
        } else {
            panic!("Expected FindAll step");
        }
        if let Step::Include(s) = &scenario.steps[33] {
            assert_eq!(s.params.get("user").map(String::as_str), Some("ada"));
        } else {
            panic!("Expected Include step");
        }
    }

    #[test]
    fn test_parse_success_conditions() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
success:
  all:
    - url_contains: "/dashboard"
    - title_contains: "Dashboard"
    - element_present: {css: "h1.welcome"}
"##;
        let scenario = Scenario::parse(yaml).unwrap();
        let success = scenario.success.unwrap();
        assert_eq!(success.len(), 3);
        assert!(matches!(
            success.all.as_deref(),
            Some([_, _, Condition::ElementPresent(_)])
        ));
    }

    #[test]
    fn test_parse_any_condition_from_single_key_map() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
success:
  any:
    - url_contains: /ok
    - element_present: {id: done}
"#;
        let scenario = Scenario::parse(yaml).unwrap();
        let any = scenario.success.unwrap().any.unwrap();
        assert!(matches!(&any[0], Condition::UrlContains(s) if s == "/ok"));
        assert_eq!(any[1].to_string(), "element id 'done'");
    }

    #[test]
    fn test_parse_rejects_bad_conditions() {
        let unknown = r#"
name: "Test"
target:
  url: "https://example.com"
success:
  all:
    - text_contains: Welcome
"#;
        let err = Scenario::parse(unknown).unwrap_err().to_string();
        assert!(err.contains("text_contains"), "{err}");

        let two_keys = r#"
name: "Test"
target:
  url: "https://example.com"
success:
  all:
    - url_contains: /ok
      title_contains: Done
"#;
        let err = Scenario::parse(two_keys).unwrap_err().to_string();
        assert!(err.contains("only key"), "{err}");
    }

    #[test]
    fn test_parse_on_failure() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
on_failure:
  screenshot: "error-{timestamp}.png"
  retry:
    attempts: 3
"#;
        let scenario = Scenario::parse(yaml).unwrap();
        let on_failure = scenario.on_failure.unwrap();
        assert_eq!(on_failure.screenshot.as_deref(), Some("error-{timestamp}.png"));
        let retry = on_failure.retry.unwrap();
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.delay_ms, 0);
    }

    #[test]
    fn test_validation_missing_name() {
        let yaml = r#"
target:
  url: "https://example.com"
"#;
        assert!(Scenario::parse(yaml).is_err());
    }

    #[test]
    fn test_validation_empty_url() {
        let yaml = r#"
name: "Test"
target:
  url: ""
"#;
        let err = Scenario::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("target.url"));
    }

    #[test]
    fn test_validation_locator_needs_one_strategy() {
        let yaml = r##"
name: "Test"
target:
  url: "https://example.com"
steps:
  - log: {message: ok}
  - click: {id: save, css: "#save"}
"##;
        let err = Scenario::parse(yaml).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("step 2"), "{msg}");
        assert!(msg.contains("exactly one"), "{msg}");
    }

    #[test]
    fn test_validation_both_any_and_all() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
success:
  any:
    - url_contains: "/success"
  all:
    - title_contains: "Done"
"#;
        let err = Scenario::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("either 'any' or 'all'"));
    }

    #[test]
    fn test_validation_zero_retry_attempts() {
        let yaml = r#"
name: "Test"
target:
  url: "https://example.com"
on_failure:
  retry:
    attempts: 0
"#;
        let err = Scenario::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_params_substitution() {
        let yaml = r##"
name: "Login"
params:
  user:
    required: true
  host:
    default: "app.test"
target:
  url: "https://${host}/login"
steps:
  - type: {id: username, value: "${user}"}
"##;
        let params = Params::new().set("user", "testuser");
        let scenario = Scenario::parse_with_params(yaml, &params).unwrap();
        assert_eq!(scenario.target.url, "https://app.test/login");
        if let Step::Type(s) = &scenario.steps[0] {
            assert_eq!(s.value, "testuser");
        } else {
            panic!("Expected Type step");
        }

        let err = Scenario::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_load_bundled_scenarios() {
        for file in ["configs/search.yaml", "configs/tour.yaml"] {
            let scenario = Scenario::load(file).unwrap_or_else(|e| panic!("{file}: {e}"));
            assert!(!scenario.steps.is_empty(), "{file}");
        }

        assert!(Scenario::load("configs/login.yaml").is_err());
        let params = Params::new().set("password", "SuperSecretPassword!");
        let login = Scenario::load_with_params("configs/login.yaml", &params).unwrap();
        assert_eq!(login.target.url, "https://the-internet.herokuapp.com/login");
        if let Step::Include(s) = &login.steps[0] {
            assert_eq!(
                s.params.get("password").map(String::as_str),
                Some("SuperSecretPassword!")
            );
        } else {
            panic!("Expected Include step");
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::Drive(eoka_drive::Error::NotFound("id 'x'".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::AssertionFailed("x".into()).kind(),
            ErrorKind::Interaction
        );
        assert_eq!(Error::Timeout("x".into()).kind(), ErrorKind::Timeout);
    }
}
