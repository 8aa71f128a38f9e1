//! `<select>` helper.

use crate::element::Element;
use crate::locator::By;
use crate::{Error, Result};
use tracing::debug;

/// Selection on a `<select>` list, driven through option clicks so the page
/// sees the same `input`/`change` events a user would produce.
#[derive(Debug, Clone)]
pub struct Select {
    element: Element,
    multiple: bool,
}

impl Select {
    /// Fails with `UnexpectedTag` unless `element` is a `<select>`.
    pub async fn new(element: Element) -> Result<Self> {
        let tag = element.tag_name().await?;
        if !tag.eq_ignore_ascii_case("select") {
            return Err(Error::UnexpectedTag {
                expected: "select".to_string(),
                found: tag,
            });
        }
        let multiple = element.attribute("multiple").await?.is_some();
        Ok(Self { element, multiple })
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub async fn options(&self) -> Result<Vec<Element>> {
        self.element.find_elements(By::tag_name("option")).await
    }

    pub async fn all_selected_options(&self) -> Result<Vec<Element>> {
        let mut selected = Vec::new();
        for option in self.options().await? {
            if option.is_selected().await? {
                selected.push(option);
            }
        }
        Ok(selected)
    }

    pub async fn first_selected_option(&self) -> Result<Element> {
        for option in self.options().await? {
            if option.is_selected().await? {
                return Ok(option);
            }
        }
        Err(Error::NotFound(format!("selected option in {}", self.element)))
    }

    /// Select options whose trimmed text equals `text`. A single-select
    /// takes the first match; a multi-select takes all of them.
    pub async fn select_by_visible_text(&self, text: &str) -> Result<()> {
        debug!("select text '{}' in {}", text, self.element);
        let matches = self.matching(|o| o.text == text.trim()).await?;
        self.set(matches, true, || format!("option with text '{}'", text)).await
    }

    pub async fn select_by_value(&self, value: &str) -> Result<()> {
        debug!("select value '{}' in {}", value, self.element);
        let matches = self.matching(|o| o.value.as_deref() == Some(value)).await?;
        self.set(matches, true, || format!("option with value '{}'", value)).await
    }

    pub async fn select_by_index(&self, index: usize) -> Result<()> {
        debug!("select index {} in {}", index, self.element);
        let matches = self.matching(|o| o.index == index).await?;
        self.set(matches, true, || format!("option at index {}", index)).await
    }

    pub async fn deselect_all(&self) -> Result<()> {
        self.ensure_multiple()?;
        for option in self.all_selected_options().await? {
            option.click().await?;
        }
        Ok(())
    }

    pub async fn deselect_by_visible_text(&self, text: &str) -> Result<()> {
        self.ensure_multiple()?;
        let matches = self.matching(|o| o.text == text.trim()).await?;
        self.set(matches, false, || format!("option with text '{}'", text)).await
    }

    pub async fn deselect_by_value(&self, value: &str) -> Result<()> {
        self.ensure_multiple()?;
        let matches = self.matching(|o| o.value.as_deref() == Some(value)).await?;
        self.set(matches, false, || format!("option with value '{}'", value)).await
    }

    pub async fn deselect_by_index(&self, index: usize) -> Result<()> {
        self.ensure_multiple()?;
        let matches = self.matching(|o| o.index == index).await?;
        self.set(matches, false, || format!("option at index {}", index)).await
    }

    fn ensure_multiple(&self) -> Result<()> {
        if self.multiple {
            Ok(())
        } else {
            Err(Error::NotInteractable(format!(
                "{} is not a multi-select; options can only be deselected there",
                self.element
            )))
        }
    }

    async fn matching(&self, pred: impl Fn(&OptionInfo) -> bool) -> Result<Vec<Element>> {
        let mut found = Vec::new();
        for (index, option) in self.options().await?.into_iter().enumerate() {
            let info = OptionInfo {
                index,
                text: option.text().await?.trim().to_string(),
                value: option.attribute("value").await?,
            };
            if pred(&info) {
                found.push(option);
            }
        }
        Ok(found)
    }

    async fn set(
        &self,
        matches: Vec<Element>,
        selected: bool,
        describe: impl Fn() -> String,
    ) -> Result<()> {
        if matches.is_empty() {
            return Err(Error::NotFound(describe()));
        }
        let take = if selected && !self.multiple { 1 } else { matches.len() };
        for option in matches.into_iter().take(take) {
            if option.is_selected().await? != selected {
                option.click().await?;
            }
        }
        Ok(())
    }
}

struct OptionInfo {
    index: usize,
    text: String,
    value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, FakeElement, FakePage};
    use crate::Session;

    fn option(value: &str, text: &str) -> FakeElement {
        FakeElement::new("option").attr("value", value).text(text)
    }

    fn page() -> FakePage {
        FakePage::new("https://form.test/", "Form")
            .child(
                FakeElement::new("select")
                    .attr("id", "country")
                    .child(option("us", "United States"))
                    .child(option("uk", "United Kingdom"))
                    .child(option("ca", "Canada")),
            )
            .child(
                FakeElement::new("select")
                    .attr("id", "tags")
                    .attr("multiple", "")
                    .child(option("a", "Alpha"))
                    .child(option("b", "Beta"))
                    .child(option("c", "Gamma")),
            )
            .child(FakeElement::new("div").attr("id", "plain"))
    }

    async fn select(id: &str) -> Select {
        let session = Session::new(FakeDriver::new().page(page()));
        session.goto("https://form.test/").await.unwrap();
        let el = session.find_element(By::id(id)).await.unwrap();
        Select::new(el).await.unwrap()
    }

    async fn selected_value(select: &Select) -> String {
        select
            .first_selected_option()
            .await
            .unwrap()
            .attribute("value")
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn text_value_and_index_agree() {
        let by_text = select("country").await;
        by_text.select_by_visible_text("United Kingdom").await.unwrap();
        let by_value = select("country").await;
        by_value.select_by_value("uk").await.unwrap();
        let by_index = select("country").await;
        by_index.select_by_index(1).await.unwrap();

        assert_eq!(selected_value(&by_text).await, "uk");
        assert_eq!(selected_value(&by_value).await, "uk");
        assert_eq!(selected_value(&by_index).await, "uk");
        assert_eq!(by_text.all_selected_options().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_select_defaults_to_first() {
        let s = select("country").await;
        assert!(!s.is_multiple());
        assert_eq!(selected_value(&s).await, "us");
    }

    #[tokio::test]
    async fn multi_select_and_deselect() {
        let s = select("tags").await;
        assert!(s.is_multiple());
        s.select_by_value("a").await.unwrap();
        s.select_by_index(2).await.unwrap();
        assert_eq!(s.all_selected_options().await.unwrap().len(), 2);

        s.deselect_by_visible_text("Alpha").await.unwrap();
        assert_eq!(selected_value(&s).await, "c");
        s.deselect_all().await.unwrap();
        assert!(s.all_selected_options().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deselect_on_single_is_rejected() {
        let s = select("country").await;
        assert!(matches!(
            s.deselect_by_value("us").await,
            Err(Error::NotInteractable(_))
        ));
    }

    #[tokio::test]
    async fn missing_option_and_wrong_tag() {
        let s = select("country").await;
        assert!(matches!(
            s.select_by_visible_text("France").await,
            Err(Error::NotFound(_))
        ));

        let session = s.element().session().clone();
        let plain = session.find_element(By::id("plain")).await.unwrap();
        match Select::new(plain).await {
            Err(Error::UnexpectedTag { found, .. }) => assert_eq!(found, "div"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
