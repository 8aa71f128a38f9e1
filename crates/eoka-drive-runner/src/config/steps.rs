use super::locator::LocatorSpec;
use crate::{Error, Result};
use eoka_drive::Key;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;

/// One scenario step.
#[derive(Debug, Clone)]
pub enum Step {
    // Navigation
    Goto(GotoStep),
    Back,
    Forward,
    Refresh,
    Pause(PauseStep),

    // Lookup
    Find(LocatorSpec),
    FindAll(FindAllStep),

    // Keyboard
    Type(TypeStep),
    Clear(LocatorSpec),
    PressKey(PressKeyStep),

    // Pointer
    Click(LocatorSpec),
    ContextClick(LocatorSpec),
    DoubleClick(LocatorSpec),
    Hover(LocatorSpec),
    Drag(DragStep),

    // Form controls
    Select(SelectStep),
    Check(LocatorSpec),
    Uncheck(LocatorSpec),

    // Reads
    ReadText(LocatorSpec),
    ReadAttribute(ReadAttributeStep),
    ReadCss(ReadCssStep),

    // Waiting
    WaitFor(WaitForStep),

    // Frames and dialogs
    Frame(FrameStep),
    ParentFrame,
    DefaultContent,
    AcceptAlert,
    DismissAlert,

    // Page
    Execute(ExecuteStep),
    Scroll(ScrollStep),
    Screenshot(ScreenshotStep),

    // Debug
    Log(LogStep),
    AssertUrl(AssertUrlStep),
    AssertText(AssertTextStep),

    // Composition
    Include(IncludeStep),
}

impl Step {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Goto(_) => "goto",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Refresh => "refresh",
            Self::Pause(_) => "pause",
            Self::Find(_) => "find",
            Self::FindAll(_) => "find_all",
            Self::Type(_) => "type",
            Self::Clear(_) => "clear",
            Self::PressKey(_) => "press_key",
            Self::Click(_) => "click",
            Self::ContextClick(_) => "context_click",
            Self::DoubleClick(_) => "double_click",
            Self::Hover(_) => "hover",
            Self::Drag(_) => "drag",
            Self::Select(_) => "select",
            Self::Check(_) => "check",
            Self::Uncheck(_) => "uncheck",
            Self::ReadText(_) => "read_text",
            Self::ReadAttribute(_) => "read_attribute",
            Self::ReadCss(_) => "read_css",
            Self::WaitFor(_) => "wait_for",
            Self::Frame(_) => "frame",
            Self::ParentFrame => "parent_frame",
            Self::DefaultContent => "default_content",
            Self::AcceptAlert => "accept_alert",
            Self::DismissAlert => "dismiss_alert",
            Self::Execute(_) => "execute",
            Self::Scroll(_) => "scroll",
            Self::Screenshot(_) => "screenshot",
            Self::Log(_) => "log",
            Self::AssertUrl(_) => "assert_url",
            Self::AssertText(_) => "assert_text",
            Self::Include(_) => "include",
        }
    }

    /// One-line label for step reports, e.g. `click id 'save'`.
    pub fn label(&self) -> String {
        match self {
            Self::Goto(s) => format!("goto {}", s.url),
            Self::Pause(s) => format!("pause {}ms", s.ms),
            Self::Find(l)
            | Self::Clear(l)
            | Self::Click(l)
            | Self::ContextClick(l)
            | Self::DoubleClick(l)
            | Self::Hover(l)
            | Self::Check(l)
            | Self::Uncheck(l)
            | Self::ReadText(l) => format!("{} {}", self.name(), l),
            Self::FindAll(s) => format!("find_all {}", s.locator),
            Self::Type(s) => format!("type {}", s.locator),
            Self::PressKey(s) => format!("press_key {} on {}", s.key, s.locator),
            Self::Drag(s) => format!("drag {} to {}", s.from, s.to),
            Self::Select(s) => format!("select {}", s.locator),
            Self::ReadAttribute(s) => format!("read_attribute {} of {}", s.attribute, s.locator),
            Self::ReadCss(s) => format!("read_css {} of {}", s.property, s.locator),
            Self::WaitFor(s) => format!("wait_for {}", s.describe()),
            Self::Screenshot(s) => format!("screenshot {}", s.path),
            Self::Log(s) => format!("log {}", s.message),
            Self::Include(s) => format!("include {}", s.path),
            other => other.name().to_string(),
        }
    }

    /// Reject steps that parse but can never run.
    pub fn validate(&self) -> Result<()> {
        let in_step = |e: Error| Error::Config(format!("{}: {}", self.name(), e));
        match self {
            Self::Find(l)
            | Self::Clear(l)
            | Self::Click(l)
            | Self::ContextClick(l)
            | Self::DoubleClick(l)
            | Self::Hover(l)
            | Self::Check(l)
            | Self::Uncheck(l)
            | Self::ReadText(l) => l.locator().map(drop).map_err(in_step),
            Self::FindAll(s) => s.locator.locator().map(drop).map_err(in_step),
            Self::Type(s) => s.locator.locator().map(drop).map_err(in_step),
            Self::PressKey(s) => s.locator.locator().map(drop).map_err(in_step),
            Self::Drag(s) => {
                s.from.locator().map_err(in_step)?;
                s.to.locator().map(drop).map_err(in_step)
            }
            Self::Select(s) => {
                s.locator.locator().map_err(in_step)?;
                s.choice().map(drop).map_err(in_step)
            }
            Self::ReadAttribute(s) => s.locator.locator().map(drop).map_err(in_step),
            Self::ReadCss(s) => s.locator.locator().map(drop).map_err(in_step),
            Self::WaitFor(s) => s.condition().map(drop).map_err(in_step),
            Self::Frame(s) => s.target().map(drop).map_err(in_step),
            Self::AssertUrl(s) => s.check().map(drop).map_err(in_step),
            Self::AssertText(s) => {
                if !s.locator.is_empty() {
                    s.locator.locator().map_err(in_step)?;
                }
                s.check().map(drop).map_err(in_step)
            }
            _ => Ok(()),
        }
    }
}

const STEP_NAMES: &[&str] = &[
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
];

const UNIT_STEPS: &[&str] = &[
    "back",
    "forward",
    "refresh",
    "parent_frame",
    "default_content",
    "accept_alert",
    "dismiss_alert",
];

fn unit_step(name: &str) -> Option<Step> {
    Some(match name {
        "back" => Step::Back,
        "forward" => Step::Forward,
        "refresh" => Step::Refresh,
        "parent_frame" => Step::ParentFrame,
        "default_content" => Step::DefaultContent,
        "accept_alert" => Step::AcceptAlert,
        "dismiss_alert" => Step::DismissAlert,
        _ => return None,
    })
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StepVisitor)
    }
}

struct StepVisitor;

impl<'de> Visitor<'de> for StepVisitor {
    type Value = Step;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a step (bare name for unit steps, or map with a single key)")
    }

    fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
    where
        E: de::Error,
    {
        unit_step(value).ok_or_else(|| de::Error::unknown_variant(value, UNIT_STEPS))
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected step type key"))?;

        if let Some(step) = unit_step(&key) {
            let _: serde_yaml::Value = map.next_value()?;
            return Ok(step);
        }

        let step = match key.as_str() {
            "goto" => Step::Goto(map.next_value()?),
            "pause" => Step::Pause(map.next_value()?),
            "find" => Step::Find(map.next_value()?),
            "find_all" => Step::FindAll(map.next_value()?),
            "type" => Step::Type(map.next_value()?),
            "clear" => Step::Clear(map.next_value()?),
            "press_key" => Step::PressKey(map.next_value()?),
            "click" => Step::Click(map.next_value()?),
            "context_click" => Step::ContextClick(map.next_value()?),
            "double_click" => Step::DoubleClick(map.next_value()?),
            "hover" => Step::Hover(map.next_value()?),
            "drag" => Step::Drag(map.next_value()?),
            "select" => Step::Select(map.next_value()?),
            "check" => Step::Check(map.next_value()?),
            "uncheck" => Step::Uncheck(map.next_value()?),
            "read_text" => Step::ReadText(map.next_value()?),
            "read_attribute" => Step::ReadAttribute(map.next_value()?),
            "read_css" => Step::ReadCss(map.next_value()?),
            "wait_for" => Step::WaitFor(map.next_value()?),
            "frame" => Step::Frame(map.next_value()?),
            "execute" => Step::Execute(map.next_value()?),
            "scroll" => Step::Scroll(map.next_value()?),
            "screenshot" => Step::Screenshot(map.next_value()?),
            "log" => Step::Log(map.next_value()?),
            "assert_url" => Step::AssertUrl(map.next_value()?),
            "assert_text" => Step::AssertText(map.next_value()?),
            "include" => Step::Include(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, STEP_NAMES)),
        };

        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom(format!(
                "step '{}' must be the only key in its map",
                key
            )));
        }

        Ok(step)
    }
}

// --- Step payloads ---

fn default_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GotoStep {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PauseStep {
    pub ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FindAllStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    /// Log the text of the first `show` matches.
    #[serde(default)]
    pub show: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    pub value: String,
    /// Clear the field before typing.
    #[serde(default)]
    pub clear: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PressKeyStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    pub key: Key,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DragStep {
    pub from: LocatorSpec,
    pub to: LocatorSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    pub text: Option<String>,
    pub value: Option<String>,
    pub index: Option<usize>,
}

/// Which option a [`SelectStep`] picks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice<'a> {
    Text(&'a str),
    Value(&'a str),
    Index(usize),
}

impl SelectStep {
    pub fn choice(&self) -> Result<Choice<'_>> {
        match (&self.text, &self.value, self.index) {
            (Some(t), None, None) => Ok(Choice::Text(t)),
            (None, Some(v), None) => Ok(Choice::Value(v)),
            (None, None, Some(i)) => Ok(Choice::Index(i)),
            _ => Err(Error::Config(
                "select needs exactly one of text, value, index".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadAttributeStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    pub attribute: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadCssStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    pub property: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WaitForStep {
    pub present: Option<LocatorSpec>,
    pub visible: Option<LocatorSpec>,
    pub clickable: Option<LocatorSpec>,
    pub url_contains: Option<String>,
    pub title_contains: Option<String>,
    #[serde(default)]
    pub alert: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Poll interval; the library default when absent.
    pub interval_ms: Option<u64>,
}

/// What a [`WaitForStep`] waits on.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitTarget<'a> {
    Present(&'a LocatorSpec),
    Visible(&'a LocatorSpec),
    Clickable(&'a LocatorSpec),
    UrlContains(&'a str),
    TitleContains(&'a str),
    Alert,
}

impl WaitForStep {
    pub fn condition(&self) -> Result<WaitTarget<'_>> {
        let mut found = Vec::new();
        if let Some(l) = &self.present {
            found.push(WaitTarget::Present(l));
        }
        if let Some(l) = &self.visible {
            found.push(WaitTarget::Visible(l));
        }
        if let Some(l) = &self.clickable {
            found.push(WaitTarget::Clickable(l));
        }
        if let Some(s) = &self.url_contains {
            found.push(WaitTarget::UrlContains(s));
        }
        if let Some(s) = &self.title_contains {
            found.push(WaitTarget::TitleContains(s));
        }
        if self.alert {
            found.push(WaitTarget::Alert);
        }

        if found.len() != 1 {
            return Err(Error::Config(
                "wait_for needs exactly one of present, visible, clickable, url_contains, title_contains, alert"
                    .into(),
            ));
        }
        let target = found.remove(0);
        match target {
            WaitTarget::Present(l) | WaitTarget::Visible(l) | WaitTarget::Clickable(l) => {
                l.locator()?;
            }
            _ => {}
        }
        Ok(target)
    }

    fn describe(&self) -> String {
        match self.condition() {
            Ok(WaitTarget::Present(l)) => format!("present {}", l),
            Ok(WaitTarget::Visible(l)) => format!("visible {}", l),
            Ok(WaitTarget::Clickable(l)) => format!("clickable {}", l),
            Ok(WaitTarget::UrlContains(s)) => format!("url containing '{}'", s),
            Ok(WaitTarget::TitleContains(s)) => format!("title containing '{}'", s),
            Ok(WaitTarget::Alert) => "alert".to_string(),
            Err(_) => "invalid condition".to_string(),
        }
    }
}

/// Frame to enter: by position, by name or id, or by locating the iframe.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameStep {
    pub index: Option<usize>,
    #[serde(flatten)]
    pub locator: LocatorSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameTarget<'a> {
    Index(usize),
    /// `name` alone matches the frame's name or id attribute.
    NameOrId(&'a str),
    Element(&'a LocatorSpec),
}

impl FrameStep {
    pub fn target(&self) -> Result<FrameTarget<'_>> {
        match (self.index, self.locator.is_empty()) {
            (Some(i), true) => Ok(FrameTarget::Index(i)),
            (Some(_), false) => Err(Error::Config(
                "frame takes either index or a locator, not both".into(),
            )),
            (None, true) => Err(Error::Config("frame needs index or a locator".into())),
            (None, false) => {
                self.locator.locator()?;
                match &self.locator.name {
                    Some(name) => Ok(FrameTarget::NameOrId(name)),
                    None => Ok(FrameTarget::Element(&self.locator)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteStep {
    pub js: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

fn default_scroll_amount() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrollStep {
    pub direction: ScrollDirection,
    #[serde(default = "default_scroll_amount")]
    pub amount: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollStep {
    /// Pixel offset, 300px per unit.
    pub fn offset(&self) -> (i64, i64) {
        let d = i64::from(self.amount) * 300;
        match self.direction {
            ScrollDirection::Up => (0, -d),
            ScrollDirection::Down => (0, d),
            ScrollDirection::Left => (-d, 0),
            ScrollDirection::Right => (d, 0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenshotStep {
    /// Output path; `{timestamp}` is replaced at run time.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogStep {
    pub message: String,
}

/// Substring or regular expression check.
#[derive(Debug, Clone)]
pub enum TextCheck<'a> {
    Contains(&'a str),
    Matches(regex::Regex),
}

impl TextCheck<'_> {
    pub fn holds(&self, text: &str) -> bool {
        match self {
            Self::Contains(s) => text.contains(s),
            Self::Matches(re) => re.is_match(text),
        }
    }
}

impl fmt::Display for TextCheck<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contains(s) => write!(f, "contain '{}'", s),
            Self::Matches(re) => write!(f, "match /{}/", re.as_str()),
        }
    }
}

fn text_check<'a>(contains: &'a Option<String>, matches: &Option<String>) -> Result<TextCheck<'a>> {
    match (contains, matches) {
        (Some(s), None) => Ok(TextCheck::Contains(s)),
        (None, Some(pattern)) => regex::Regex::new(pattern)
            .map(TextCheck::Matches)
            .map_err(|e| Error::Config(format!("invalid pattern '{}': {}", pattern, e))),
        _ => Err(Error::Config(
            "needs exactly one of contains, matches".into(),
        )),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertUrlStep {
    pub contains: Option<String>,
    pub matches: Option<String>,
}

impl AssertUrlStep {
    pub fn check(&self) -> Result<TextCheck<'_>> {
        text_check(&self.contains, &self.matches)
    }
}

/// Check an element's text; the whole `body` when no locator is given.
#[derive(Debug, Clone, Deserialize)]
pub struct AssertTextStep {
    #[serde(flatten)]
    pub locator: LocatorSpec,
    pub contains: Option<String>,
    pub matches: Option<String>,
}

impl AssertTextStep {
    pub fn check(&self) -> Result<TextCheck<'_>> {
        text_check(&self.contains, &self.matches)
    }
}

/// Run another scenario's steps in place.
#[derive(Debug, Clone, Deserialize)]
pub struct IncludeStep {
    /// Path, relative to the including file.
    pub path: String,

    /// Parameters passed to the included scenario.
    #[serde(default)]
    pub params: HashMap<String, String>,
}
