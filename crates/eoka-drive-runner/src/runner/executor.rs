use crate::config::steps::{Choice, FrameTarget, TextCheck, WaitTarget};
use crate::config::{LocatorSpec, Params, Scenario, Step};
use crate::{Error, Result};
use eoka_drive::{until, By, Element, Select, Session};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Maximum include depth to prevent infinite loops.
const MAX_INCLUDE_DEPTH: usize = 10;

/// Context for step execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Base path for resolving relative includes.
    pub base_path: PathBuf,
    /// Current include depth.
    pub include_depth: usize,
}

impl ExecutionContext {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            include_depth: 0,
        }
    }

    /// Context for the steps of an included file.
    pub fn child(&self, new_base: impl Into<PathBuf>) -> Result<Self> {
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(Error::Config(format!(
                "maximum include depth ({}) exceeded",
                MAX_INCLUDE_DEPTH
            )));
        }
        Ok(Self {
            base_path: new_base.into(),
            include_depth: self.include_depth + 1,
        })
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

/// Replace `{timestamp}` in an output path.
pub(crate) fn stamp(path: &str) -> String {
    let now = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    path.replace("{timestamp}", &now)
}

async fn find(session: &Session, spec: &LocatorSpec) -> Result<Element> {
    Ok(session.find_element(spec.locator()?).await?)
}

/// Run one step. The returned string, if any, is worth showing in the report.
pub async fn execute(
    session: &Session,
    step: &Step,
    ctx: &ExecutionContext,
) -> Result<Option<String>> {
    let detail = match step {
        Step::Goto(s) => {
            info!("goto: {}", s.url);
            session.goto(&s.url).await?;
            None
        }
        Step::Back => {
            session.back().await?;
            None
        }
        Step::Forward => {
            session.forward().await?;
            None
        }
        Step::Refresh => {
            session.refresh().await?;
            None
        }
        Step::Pause(s) => {
            debug!("pause: {}ms", s.ms);
            session.pause(Duration::from_millis(s.ms)).await;
            None
        }
        Step::Find(l) => {
            let el = find(session, l).await?;
            Some(el.description().to_string())
        }
        Step::FindAll(s) => {
            let found = session.find_elements(s.locator.locator()?).await?;
            let mut shown = Vec::new();
            for el in found.iter().take(s.show) {
                let text = el.text().await?;
                info!("  {}", text);
                shown.push(text);
            }
            if shown.is_empty() {
                Some(format!("{} found", found.len()))
            } else {
                Some(format!("{} found: {}", found.len(), shown.join(", ")))
            }
        }
        Step::Type(s) => {
            let el = find(session, &s.locator).await?;
            if s.clear {
                el.clear().await?;
            }
            el.send_keys(&s.value).await?;
            None
        }
        Step::Clear(l) => {
            find(session, l).await?.clear().await?;
            None
        }
        Step::PressKey(s) => {
            find(session, &s.locator).await?.send_key(s.key).await?;
            None
        }
        Step::Click(l) => {
            info!("click: {}", l);
            find(session, l).await?.click().await?;
            None
        }
        Step::ContextClick(l) => {
            find(session, l).await?.context_click().await?;
            None
        }
        Step::DoubleClick(l) => {
            find(session, l).await?.double_click().await?;
            None
        }
        Step::Hover(l) => {
            find(session, l).await?.hover().await?;
            None
        }
        Step::Drag(s) => {
            let from = find(session, &s.from).await?;
            let to = find(session, &s.to).await?;
            from.drag_and_drop_to(&to).await?;
            None
        }
        Step::Select(s) => {
            let select = Select::new(find(session, &s.locator).await?).await?;
            match s.choice()? {
                Choice::Text(t) => select.select_by_visible_text(t).await?,
                Choice::Value(v) => select.select_by_value(v).await?,
                Choice::Index(i) => select.select_by_index(i).await?,
            }
            Some(select.first_selected_option().await?.text().await?)
        }
        Step::Check(l) | Step::Uncheck(l) => {
            let want = matches!(step, Step::Check(_));
            let el = find(session, l).await?;
            if el.is_selected().await? != want {
                el.click().await?;
            }
            if el.is_selected().await? != want {
                return Err(Error::ActionFailed(format!(
                    "{} did not change state",
                    el.description()
                )));
            }
            None
        }
        Step::ReadText(l) => Some(find(session, l).await?.text().await?),
        Step::ReadAttribute(s) => {
            let value = find(session, &s.locator)
                .await?
                .attribute(&s.attribute)
                .await?;
            Some(value.unwrap_or_else(|| "(none)".to_string()))
        }
        Step::ReadCss(s) => Some(
            find(session, &s.locator)
                .await?
                .css_value(&s.property)
                .await?,
        ),
        Step::WaitFor(s) => {
            let mut wait = session.wait(Duration::from_millis(s.timeout_ms));
            if let Some(ms) = s.interval_ms {
                wait = wait.poll_interval(Duration::from_millis(ms));
            }
            match s.condition()? {
                WaitTarget::Present(l) => {
                    Some(wait.until(until::element_present(l.locator()?)).await?.to_string())
                }
                WaitTarget::Visible(l) => {
                    Some(wait.until(until::element_visible(l.locator()?)).await?.to_string())
                }
                WaitTarget::Clickable(l) => {
                    Some(wait.until(until::element_clickable(l.locator()?)).await?.to_string())
                }
                WaitTarget::UrlContains(f) => Some(wait.until(until::url_contains(f)).await?),
                WaitTarget::TitleContains(f) => Some(wait.until(until::title_contains(f)).await?),
                WaitTarget::Alert => Some(wait.until(until::alert_present()).await?.text().to_string()),
            }
        }
        Step::Frame(s) => {
            let switch = session.switch_to();
            match s.target()? {
                FrameTarget::Index(i) => switch.frame_index(i).await?,
                FrameTarget::NameOrId(n) => switch.frame_name(n).await?,
                FrameTarget::Element(l) => switch.frame(&find(session, l).await?).await?,
            }
            None
        }
        Step::ParentFrame => {
            session.switch_to().parent_frame().await?;
            None
        }
        Step::DefaultContent => {
            session.switch_to().default_content().await?;
            None
        }
        Step::AcceptAlert => {
            let alert = session.switch_to().alert().await?;
            let text = alert.text().to_string();
            alert.accept().await?;
            Some(text)
        }
        Step::DismissAlert => {
            let alert = session.switch_to().alert().await?;
            let text = alert.text().to_string();
            alert.dismiss().await?;
            Some(text)
        }
        Step::Execute(s) => {
            debug!("execute: {}...", s.js.chars().take(50).collect::<String>());
            let value = session.execute_script(&s.js, s.args.clone()).await?;
            (!value.is_null()).then(|| value.to_string())
        }
        Step::Scroll(s) => {
            let (x, y) = s.offset();
            session.scroll_by(x, y).await?;
            None
        }
        Step::Screenshot(s) => {
            let path = ctx.resolve_path(&stamp(&s.path));
            info!("screenshot: {}", path.display());
            session.save_screenshot(&path).await?;
            Some(path.display().to_string())
        }
        Step::Log(s) => {
            info!("[log] {}", s.message);
            None
        }
        Step::AssertUrl(s) => {
            let url = session.current_url().await?;
            assert_holds(&s.check()?, &url, "url")?;
            None
        }
        Step::AssertText(s) => {
            let el = if s.locator.is_empty() {
                session.find_element(By::tag_name("body")).await?
            } else {
                find(session, &s.locator).await?
            };
            let text = el.text().await?;
            assert_holds(&s.check()?, &text, "text")?;
            None
        }
        Step::Include(s) => {
            let path = ctx.resolve_path(&s.path);
            info!("include: {}", path.display());

            let params: Params = s.params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let included = Scenario::load_with_params(&path, &params).map_err(|e| {
                Error::Config(format!(
                    "failed to load include '{}': {}",
                    path.display(),
                    e
                ))
            })?;

            let child_base = path.parent().unwrap_or(Path::new("."));
            let child_ctx = ctx.child(child_base)?;

            for inner in &included.steps {
                debug!("include step: {}", inner.label());
                Box::pin(execute(session, inner, &child_ctx))
                    .await
                    .map_err(|e| Error::ActionFailed(format!("{}: {}", inner.label(), e)))?;
            }
            Some(format!("{} steps", included.steps.len()))
        }
    };
    Ok(detail)
}

fn assert_holds(check: &TextCheck<'_>, actual: &str, what: &str) -> Result<()> {
    if check.holds(actual) {
        return Ok(());
    }
    Err(Error::AssertionFailed(format!(
        "{} '{}' does not {}",
        what, actual, check
    )))
}
