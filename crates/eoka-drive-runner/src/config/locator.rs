use crate::{Error, Result};
use eoka_drive::{By, Locator};
use serde::Deserialize;
use std::fmt;

/// How a step names its element: exactly one strategy key.
///
/// ```yaml
/// - click:
///     css: "button[type='submit']"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocatorSpec {
    pub id: Option<String>,
    pub name: Option<String>,
    pub class: Option<String>,
    pub css: Option<String>,
    pub xpath: Option<String>,
    pub link_text: Option<String>,
    pub partial_link_text: Option<String>,
    pub tag: Option<String>,
}

impl LocatorSpec {
    fn given(&self) -> Vec<(By, &str)> {
        [
            (By::Id, &self.id),
            (By::Name, &self.name),
            (By::ClassName, &self.class),
            (By::Css, &self.css),
            (By::XPath, &self.xpath),
            (By::LinkText, &self.link_text),
            (By::PartialLinkText, &self.partial_link_text),
            (By::TagName, &self.tag),
        ]
        .into_iter()
        .filter_map(|(by, v)| v.as_deref().map(|v| (by, v)))
        .collect()
    }

    /// True when no strategy key is present.
    pub fn is_empty(&self) -> bool {
        self.given().is_empty()
    }

    /// The single locator this spec names.
    pub fn locator(&self) -> Result<Locator> {
        match self.given().as_slice() {
            [(by, value)] => {
                let locator = Locator::new(*by, *value);
                locator
                    .validate()
                    .map_err(|e| Error::Config(e.to_string()))?;
                Ok(locator)
            }
            [] => Err(Error::Config(
                "locator needs one of id, name, class, css, xpath, link_text, partial_link_text, tag"
                    .into(),
            )),
            many => Err(Error::Config(format!(
                "locator names {} strategies, expected exactly one",
                many.len()
            ))),
        }
    }
}

/// Specs are equal when they name the same locator.
impl PartialEq for LocatorSpec {
    fn eq(&self, other: &Self) -> bool {
        self.locator().ok() == other.locator().ok()
    }
}

impl fmt::Display for LocatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.locator() {
            Ok(l) => write!(f, "{}", l),
            Err(_) => f.write_str("invalid locator"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_strategy() {
        let spec: LocatorSpec = serde_yaml::from_str("link_text: Docs").unwrap();
        assert_eq!(spec.locator().unwrap(), By::link_text("Docs"));
        assert_eq!(spec.to_string(), "link text 'Docs'");
    }

    #[test]
    fn test_zero_or_many_rejected() {
        let none = LocatorSpec::default();
        assert!(none.is_empty());
        assert!(none.locator().is_err());

        let two: LocatorSpec = serde_yaml::from_str("id: a\ncss: '#a'").unwrap();
        let err = two.locator().unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_compound_class_rejected() {
        let spec: LocatorSpec = serde_yaml::from_str("class: 'field wide'").unwrap();
        assert!(spec.locator().is_err());
    }
}
