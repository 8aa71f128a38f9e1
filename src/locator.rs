//! Locator strategies: how a `(strategy, value)` pair picks DOM nodes.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element lookup strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum By {
    /// `id` attribute, exact match.
    Id,
    /// `name` attribute, exact match.
    Name,
    /// A single class name.
    ClassName,
    /// CSS selector.
    Css,
    /// XPath expression.
    XPath,
    /// Anchor whose visible text equals the value.
    LinkText,
    /// Anchor whose visible text contains the value.
    PartialLinkText,
    /// Tag name, case-insensitive.
    TagName,
}

impl By {
    pub fn id(value: impl Into<String>) -> Locator {
        Locator::new(By::Id, value)
    }

    pub fn name(value: impl Into<String>) -> Locator {
        Locator::new(By::Name, value)
    }

    pub fn class_name(value: impl Into<String>) -> Locator {
        Locator::new(By::ClassName, value)
    }

    pub fn css(value: impl Into<String>) -> Locator {
        Locator::new(By::Css, value)
    }

    pub fn xpath(value: impl Into<String>) -> Locator {
        Locator::new(By::XPath, value)
    }

    pub fn link_text(value: impl Into<String>) -> Locator {
        Locator::new(By::LinkText, value)
    }

    pub fn partial_link_text(value: impl Into<String>) -> Locator {
        Locator::new(By::PartialLinkText, value)
    }

    pub fn tag_name(value: impl Into<String>) -> Locator {
        Locator::new(By::TagName, value)
    }

    /// Strategy key understood by the injected lookup script.
    pub fn as_str(&self) -> &'static str {
        match self {
            By::Id => "id",
            By::Name => "name",
            By::ClassName => "class",
            By::Css => "css",
            By::XPath => "xpath",
            By::LinkText => "link_text",
            By::PartialLinkText => "partial_link_text",
            By::TagName => "tag",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "id" => By::Id,
            "name" => By::Name,
            "class" => By::ClassName,
            "css" => By::Css,
            "xpath" => By::XPath,
            "link" | "link_text" => By::LinkText,
            "partial" | "partial_link_text" => By::PartialLinkText,
            "tag" => By::TagName,
            _ => return None,
        })
    }
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            By::Id => "id",
            By::Name => "name",
            By::ClassName => "class name",
            By::Css => "css selector",
            By::XPath => "xpath",
            By::LinkText => "link text",
            By::PartialLinkText => "partial link text",
            By::TagName => "tag name",
        })
    }
}

/// A strategy plus the value it matches against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub by: By,
    pub value: String,
}

impl Locator {
    pub fn new(by: By, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }

    /// Reject values the strategy can never match.
    pub fn validate(&self) -> Result<()> {
        if self.value.trim().is_empty() {
            return Err(Error::InvalidSelector(format!("empty {} value", self.by)));
        }
        if self.by == By::ClassName && self.value.trim().contains(char::is_whitespace) {
            return Err(Error::InvalidSelector(format!(
                "compound class names are not permitted: '{}'",
                self.value
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.by, self.value)
    }
}

/// Parse `strategy:value`. A string without a known prefix is a CSS selector.
impl FromStr for Locator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let locator = match s.split_once(':') {
            Some((prefix, value)) => match By::from_prefix(prefix) {
                Some(by) => Locator::new(by, value.trim()),
                // `a:hover`, `input:checked` ...
                None => Locator::new(By::Css, s),
            },
            None => Locator::new(By::Css, s),
        };
        locator.validate()?;
        Ok(locator)
    }
}

impl From<&Locator> for Locator {
    fn from(locator: &Locator) -> Self {
        locator.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_strategy() {
        assert_eq!(By::id("username"), Locator::new(By::Id, "username"));
        assert_eq!(By::name("q").by, By::Name);
        assert_eq!(By::class_name("submit-button").by, By::ClassName);
        assert_eq!(By::css("div > input").by, By::Css);
        assert_eq!(By::xpath("//button").by, By::XPath);
        assert_eq!(By::link_text("Click Here").by, By::LinkText);
        assert_eq!(By::partial_link_text("Click").by, By::PartialLinkText);
        assert_eq!(By::tag_name("h1").by, By::TagName);
    }

    #[test]
    fn parse_prefixed() {
        let l: Locator = "xpath://button[@id='submit']".parse().unwrap();
        assert_eq!(l, By::xpath("//button[@id='submit']"));

        let l: Locator = "link:Click Here".parse().unwrap();
        assert_eq!(l, By::link_text("Click Here"));

        let l: Locator = "partial_link_text:Click".parse().unwrap();
        assert_eq!(l, By::partial_link_text("Click"));

        let l: Locator = "  id: username ".parse().unwrap();
        assert_eq!(l, By::id("username"));
    }

    #[test]
    fn parse_defaults_to_css() {
        let l: Locator = "div.container > input[type='text']".parse().unwrap();
        assert_eq!(l, By::css("div.container > input[type='text']"));

        // pseudo-class colon is not a strategy prefix
        let l: Locator = "input:checked".parse().unwrap();
        assert_eq!(l, By::css("input:checked"));
    }

    #[test]
    fn compound_class_rejected() {
        let err = "class:btn primary".parse::<Locator>().unwrap_err();
        assert!(matches!(err, Error::InvalidSelector(_)));
        assert!(By::class_name("btn").validate().is_ok());
    }

    #[test]
    fn empty_value_rejected() {
        assert!("id:".parse::<Locator>().is_err());
        assert!(By::tag_name("  ").validate().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(By::id("username").to_string(), "id 'username'");
        assert_eq!(
            By::partial_link_text("Click").to_string(),
            "partial link text 'Click'"
        );
    }
}
