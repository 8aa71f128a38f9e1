use super::locator::LocatorSpec;
use super::params::{self, ParamDef, Params};
use super::Step;
use crate::{Error, Result};
use eoka_drive::LaunchOptions;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A YAML scenario: where to start, which steps to run, how to judge the run.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Name of this scenario.
    pub name: String,

    /// Parameter definitions (optional).
    #[serde(default)]
    pub params: HashMap<String, ParamDef>,

    /// Browser launch options.
    #[serde(default)]
    pub browser: LaunchOptions,

    /// Page opened before the first step.
    pub target: TargetUrl,

    /// Implicit wait applied to every lookup, in milliseconds.
    pub implicit_wait_ms: Option<u64>,

    /// Budget for one attempt, in milliseconds.
    pub timeout_ms: Option<u64>,

    /// What a failing step does to the rest of the run.
    #[serde(default)]
    pub on_error: OnError,

    /// Steps, run in order.
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Success conditions (optional).
    pub success: Option<SuccessCondition>,

    /// Failure handling (optional).
    pub on_failure: Option<OnFailure>,
}

impl Scenario {
    /// Load a scenario from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_params(path, &Params::new())
    }

    /// Load a scenario from a YAML file, binding `params`.
    pub fn load_with_params<P: AsRef<Path>>(path: P, params: &Params) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_with_params(&content, params)
    }

    /// Parse a scenario from a YAML string (no params).
    pub fn parse(yaml: &str) -> Result<Self> {
        Self::parse_with_params(yaml, &Params::new())
    }

    /// Parse a scenario, substituting `${name}` placeholders first.
    pub fn parse_with_params(yaml: &str, params: &Params) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        let defs: HashMap<String, ParamDef> = match value.get("params") {
            Some(v) => serde_yaml::from_value(v.clone())?,
            None => HashMap::new(),
        };

        params::substitute_value(&mut value, params, &defs)?;

        let scenario: Scenario = serde_yaml::from_value(value)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.target.url.is_empty() {
            return Err(Error::Config("target.url is required".into()));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate()
                .map_err(|e| Error::Config(format!("step {}: {}", i + 1, e)))?;
        }
        if let Some(ref success) = self.success {
            success.validate()?;
        }
        if let Some(ref on_failure) = self.on_failure {
            if let Some(ref retry) = on_failure.retry {
                if retry.attempts == 0 {
                    return Err(Error::Config(
                        "on_failure.retry.attempts must be at least 1".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Target URL configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetUrl {
    pub url: String,
}

/// Step failure policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Stop at the first failing step; the attempt fails.
    #[default]
    Abort,
    /// Record the failure and run the next step.
    Continue,
}

/// Success condition checking.
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessCondition {
    /// At least one must hold.
    pub any: Option<Vec<Condition>>,

    /// Every one must hold.
    pub all: Option<Vec<Condition>>,
}

impl SuccessCondition {
    fn validate(&self) -> Result<()> {
        if self.any.is_some() && self.all.is_some() {
            return Err(Error::Config(
                "success: specify either 'any' or 'all', not both".into(),
            ));
        }
        for cond in self.any.iter().chain(self.all.iter()).flatten() {
            if let Condition::ElementPresent(spec) = cond {
                spec.locator()
                    .map_err(|e| Error::Config(format!("success: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.any.as_ref().map_or(0, Vec::len) + self.all.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One success check, written as a single-key map.
#[derive(Debug, Clone)]
pub enum Condition {
    UrlContains(String),
    TitleContains(String),
    ElementPresent(LocatorSpec),
}

const CONDITION_NAMES: &[&str] = &["url_contains", "title_contains", "element_present"];

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ConditionVisitor)
    }
}

struct ConditionVisitor;

impl<'de> Visitor<'de> for ConditionVisitor {
    type Value = Condition;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a single-key map, one of {}", CONDITION_NAMES.join(", "))
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Condition, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("empty condition"))?;

        let condition = match key.as_str() {
            "url_contains" => Condition::UrlContains(map.next_value()?),
            "title_contains" => Condition::TitleContains(map.next_value()?),
            "element_present" => Condition::ElementPresent(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, CONDITION_NAMES)),
        };

        if let Some(extra) = map.next_key::<String>()? {
            return Err(de::Error::custom(format!(
                "condition '{}' must be the only key in its map, found '{}'",
                key, extra
            )));
        }
        Ok(condition)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlContains(s) => write!(f, "url containing '{}'", s),
            Self::TitleContains(s) => write!(f, "title containing '{}'", s),
            Self::ElementPresent(l) => write!(f, "element {}", l),
        }
    }
}

/// What to do once an attempt has failed.
#[derive(Debug, Clone, Deserialize)]
pub struct OnFailure {
    /// Where to save a screenshot of the failed page; `{timestamp}` is
    /// replaced at run time.
    pub screenshot: Option<String>,

    pub retry: Option<RetryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first included.
    pub attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}
