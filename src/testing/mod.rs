//! In-memory backend for tests and dry runs.
//!
//! [`FakeDriver`] serves pages built from [`FakePage`] and [`FakeElement`]
//! trees and behaves like a browser where the crate's contracts care:
//! references go stale on navigation and frame switches, hidden or disabled
//! elements refuse input, forms submit, dialogs queue. Timed behaviour
//! (`appears_after`, delayed submissions) follows tokio's clock, so tests
//! run under `#[tokio::test(start_paused = true)]` are deterministic.
//!
//! ```rust
//! use eoka_drive::testing::{FakeDriver, FakeElement, FakePage};
//! use eoka_drive::{By, Session};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> eoka_drive::Result<()> {
//! let driver = FakeDriver::new().page(
//!     FakePage::new("https://example.test/", "Example")
//!         .child(FakeElement::new("h1").text("Hello")),
//! );
//! let session = Session::new(driver);
//! session.goto("https://example.test/").await?;
//! let h1 = session.find_element(By::tag_name("h1")).await?;
//! assert_eq!(h1.text().await?, "Hello");
//! # Ok(())
//! # }
//! ```

mod selector;

use self::selector::{Css, Dom, XPath};
use crate::driver::{Dialog, DialogKind, Driver, ElementRef, FrameTarget, Gesture};
use crate::keys::Key;
use crate::locator::{By, Locator};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// PNG signature plus an IHDR header; enough for anything that sniffs the
/// format.
const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x06\0\0\0";

// =============================================================================
// Page builders
// =============================================================================

/// One element in a [`FakePage`].
#[derive(Debug, Clone)]
pub struct FakeElement {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<FakeElement>,
    hidden: bool,
    appears_after: Option<Duration>,
    shown_after: Option<Duration>,
    text_after: Option<(Duration, String)>,
    submits_to: Option<(String, Duration)>,
    click_dialog: Option<Dialog>,
    answer_into: Option<String>,
    styles: Vec<(String, String)>,
}

impl FakeElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            hidden: false,
            appears_after: None,
            shown_after: None,
            text_after: None,
            submits_to: None,
            click_dialog: None,
            answer_into: None,
            styles: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Own text, rendered before the children's.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    /// `display: none`.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.push((property.into(), value.into()));
        self
    }

    /// Attach to the document only `delay` after the page loads.
    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = Some(delay);
        self
    }

    /// Hidden at load, displayed `delay` later.
    pub fn shown_after(mut self, delay: Duration) -> Self {
        self.hidden = true;
        self.shown_after = Some(delay);
        self
    }

    /// Replace the own text `delay` after load.
    pub fn text_after(mut self, delay: Duration, text: impl Into<String>) -> Self {
        self.text_after = Some((delay, text.into()));
        self
    }

    /// Submitting this element (or a form field inside it) navigates to
    /// `url` after `delay`, carrying the enclosing form's fields as a query.
    pub fn submits_to(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.submits_to = Some((url.into(), delay));
        self
    }

    /// Clicking raises a dialog.
    pub fn on_click_dialog(mut self, kind: DialogKind, text: impl Into<String>) -> Self {
        self.click_dialog = Some(Dialog {
            kind,
            text: text.into(),
        });
        self
    }

    /// Once the click dialog closes, the element with id `id` shows what
    /// the page's handler got back: `true` if accepted, `false` if dismissed.
    pub fn answer_into(mut self, id: impl Into<String>) -> Self {
        self.answer_into = Some(id.into());
        self
    }
}

/// A page served at one URL.
#[derive(Debug, Clone)]
pub struct FakePage {
    url: String,
    title: String,
    children: Vec<FakeElement>,
    dialogs: Vec<(Duration, String)>,
}

impl FakePage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            children: Vec::new(),
            dialogs: Vec::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn child(mut self, child: FakeElement) -> Self {
        self.children.push(child);
        self
    }

    /// Raise an `alert` `delay` after load.
    pub fn dialog_after(mut self, delay: Duration, text: impl Into<String>) -> Self {
        self.dialogs.push((delay, text.into()));
        self
    }
}

/// What the fake was asked to do, in order. Elements are named by their
/// `id`, else `name`, else tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate(String),
    Back,
    Forward,
    Refresh,
    Find(String),
    Click(String),
    SendKeys(String, String),
    Key(String, Key),
    Clear(String),
    Hover(String),
    ContextClick(String),
    DoubleClick(String),
    Drag(String, String),
    Script(String),
    Screenshot,
    Frame(String),
    CloseDialog(bool),
    Quit,
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    later_text: Option<(Instant, String)>,
    parent: Option<usize>,
    children: Vec<usize>,
    hidden: bool,
    shown_at: Option<Instant>,
    appears_at: Option<Instant>,
    value: String,
    checked: bool,
    submits_to: Option<(String, Duration)>,
    click_dialog: Option<Dialog>,
    answer_into: Option<String>,
    styles: Vec<(String, String)>,
}

impl Node {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn input_type(&self) -> String {
        self.attr("type").unwrap_or("text").to_ascii_lowercase()
    }

    fn is_frame(&self) -> bool {
        self.tag == "iframe" || self.tag == "frame"
    }
}

/// Nodes are stored in document order.
#[derive(Debug)]
struct Document {
    url: String,
    title: String,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    dialogs: Vec<(Instant, Dialog)>,
}

impl Document {
    fn blank(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: String::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
            dialogs: Vec::new(),
        }
    }

    fn build(page: &FakePage, url: &str, now: Instant) -> Self {
        let mut doc = Self::blank(url);
        doc.title = page.title.clone();
        doc.dialogs = page
            .dialogs
            .iter()
            .map(|(delay, text)| {
                (
                    now + *delay,
                    Dialog {
                        kind: DialogKind::Alert,
                        text: text.clone(),
                    },
                )
            })
            .collect();
        for child in &page.children {
            let id = doc.insert(child, None, now);
            doc.roots.push(id);
        }
        doc.default_selection();
        doc
    }

    fn insert(&mut self, el: &FakeElement, parent: Option<usize>, now: Instant) -> usize {
        let id = self.nodes.len();
        let has = |name: &str| el.attrs.iter().any(|(k, _)| k == name);
        let value = el
            .attrs
            .iter()
            .find(|(k, _)| k == "value")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.nodes.push(Node {
            tag: el.tag.clone(),
            attrs: el.attrs.clone(),
            text: el.text.clone(),
            later_text: el.text_after.as_ref().map(|(d, t)| (now + *d, t.clone())),
            parent,
            children: Vec::new(),
            hidden: el.hidden,
            shown_at: el.shown_after.map(|d| now + d),
            appears_at: el.appears_after.map(|d| now + d),
            value,
            checked: has("checked") || has("selected"),
            submits_to: el.submits_to.clone(),
            click_dialog: el.click_dialog.clone(),
            answer_into: el.answer_into.clone(),
            styles: el.styles.clone(),
        });
        for child in &el.children {
            let cid = self.insert(child, Some(id), now);
            self.nodes[id].children.push(cid);
        }
        id
    }

    /// A single-select with nothing marked selected shows its first option.
    fn default_selection(&mut self) {
        for n in 0..self.nodes.len() {
            if self.nodes[n].tag != "select" || self.nodes[n].attr("multiple").is_some() {
                continue;
            }
            let options = self.options(n);
            if !options.iter().any(|o| self.nodes[*o].checked) {
                if let Some(first) = options.first() {
                    self.nodes[*first].checked = true;
                }
            }
        }
    }

    fn subtree(&self, n: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.nodes[n].children.iter().rev().copied().collect();
        while let Some(c) = stack.pop() {
            out.push(c);
            stack.extend(self.nodes[c].children.iter().rev());
        }
        out
    }

    fn options(&self, select: usize) -> Vec<usize> {
        self.subtree(select)
            .into_iter()
            .filter(|o| self.nodes[*o].tag == "option")
            .collect()
    }

    fn ancestor(&self, n: usize, tag: &str) -> Option<usize> {
        let mut cur = self.nodes[n].parent;
        while let Some(p) = cur {
            if self.nodes[p].tag == tag {
                return Some(p);
            }
            cur = self.nodes[p].parent;
        }
        None
    }

    fn ancestors_or_self(&self, n: usize) -> Vec<usize> {
        let mut out = vec![n];
        let mut cur = self.nodes[n].parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.nodes[p].parent;
        }
        out
    }

    fn label(&self, n: usize) -> String {
        let node = &self.nodes[n];
        node.attr("id")
            .or_else(|| node.attr("name"))
            .unwrap_or(&node.tag)
            .to_string()
    }

    fn present(&self, n: usize, now: Instant) -> bool {
        self.ancestors_or_self(n)
            .into_iter()
            .all(|a| self.nodes[a].appears_at.map_or(true, |t| now >= t))
    }

    fn hidden_now(&self, n: usize, now: Instant) -> bool {
        let node = &self.nodes[n];
        node.hidden && node.shown_at.map_or(true, |t| now < t)
    }

    fn displayed(&self, n: usize, now: Instant) -> bool {
        let node = &self.nodes[n];
        if node.tag == "option" {
            return self.ancestor(n, "select").map_or(true, |s| self.displayed(s, now));
        }
        if node.tag == "input" && node.input_type() == "hidden" {
            return false;
        }
        self.present(n, now)
            && !self
                .ancestors_or_self(n)
                .into_iter()
                .any(|a| self.hidden_now(a, now))
    }

    fn disabled(&self, n: usize) -> bool {
        let node = &self.nodes[n];
        if node.attr("disabled").is_some() {
            return true;
        }
        node.tag == "option"
            && self
                .ancestor(n, "select")
                .is_some_and(|s| self.nodes[s].attr("disabled").is_some())
    }

    fn editable(&self, n: usize) -> bool {
        let node = &self.nodes[n];
        match node.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                node.input_type().as_str(),
                "checkbox"
                    | "radio"
                    | "button"
                    | "submit"
                    | "reset"
                    | "image"
                    | "file"
                    | "hidden"
                    | "range"
                    | "color"
            ),
            _ => false,
        }
    }

    fn interactable(&self, n: usize, now: Instant) -> Result<()> {
        if !self.displayed(n, now) {
            return Err(Error::NotInteractable(format!("{} is not displayed", self.label(n))));
        }
        if self.disabled(n) {
            return Err(Error::NotInteractable(format!("{} is disabled", self.label(n))));
        }
        Ok(())
    }

    fn own_text(&self, n: usize, now: Instant) -> String {
        let node = &self.nodes[n];
        match &node.later_text {
            Some((at, text)) if now >= *at => text.clone(),
            _ => node.text.clone(),
        }
    }

    /// Text as rendered: hidden parts contribute nothing, frames are opaque.
    fn rendered(&self, n: usize, now: Instant) -> String {
        if !self.displayed(n, now) {
            return String::new();
        }
        let mut parts = vec![self.own_text(n, now).trim().to_string()];
        if !self.nodes[n].is_frame() {
            for &c in &self.nodes[n].children {
                if self.present(c, now) {
                    parts.push(self.rendered(c, now));
                }
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }

    fn option_value(&self, n: usize, now: Instant) -> String {
        self.nodes[n]
            .attr("value")
            .map(str::to_string)
            .unwrap_or_else(|| self.own_text(n, now).trim().to_string())
    }

    fn form_query(&self, form: usize, now: Instant) -> String {
        let mut pairs = Vec::new();
        for n in self.subtree(form) {
            let node = &self.nodes[n];
            let Some(name) = node.attr("name") else {
                continue;
            };
            if !self.present(n, now) || self.disabled(n) {
                continue;
            }
            match node.tag.as_str() {
                "input" => match node.input_type().as_str() {
                    "submit" | "button" | "reset" | "image" | "file" => {}
                    "checkbox" | "radio" => {
                        if node.checked {
                            pairs.push((name, node.attr("value").unwrap_or("on").to_string()));
                        }
                    }
                    _ => pairs.push((name, node.value.clone())),
                },
                "textarea" => pairs.push((name, node.value.clone())),
                "select" => {
                    for o in self.options(n) {
                        if self.nodes[o].checked {
                            pairs.push((name, self.option_value(o, now)));
                        }
                    }
                }
                _ => {}
            }
        }
        pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(&v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// The active document as seen from one frame context.
struct View<'a> {
    doc: &'a Document,
    roots: Vec<usize>,
    now: Instant,
}

impl View<'_> {
    fn descendants(&self, scope: Option<usize>) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.children(scope).into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(Some(n)).into_iter().rev());
        }
        out
    }
}

impl Dom for View<'_> {
    fn tag(&self, node: usize) -> &str {
        &self.doc.nodes[node].tag
    }

    fn attr(&self, node: usize, name: &str) -> Option<&str> {
        self.doc.nodes[node].attr(name)
    }

    fn parent(&self, node: usize) -> Option<usize> {
        self.doc.nodes[node]
            .parent
            .filter(|p| !self.doc.nodes[*p].is_frame())
    }

    fn children(&self, node: Option<usize>) -> Vec<usize> {
        let list = match node {
            None => &self.roots,
            Some(n) if self.doc.nodes[n].is_frame() => return Vec::new(),
            Some(n) => &self.doc.nodes[n].children,
        };
        list.iter()
            .copied()
            .filter(|c| self.doc.present(*c, self.now))
            .collect()
    }

    fn own_text(&self, node: usize) -> String {
        self.doc.own_text(node, self.now)
    }

    fn string_value(&self, node: usize) -> String {
        let mut s = self.own_text(node);
        for c in self.children(Some(node)) {
            s.push_str(&self.string_value(c));
        }
        s
    }
}

// =============================================================================
// URLs
// =============================================================================

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

fn same_page(a: &str, b: &str) -> bool {
    strip_query(a).trim_end_matches('/') == strip_query(b).trim_end_matches('/')
}

/// Resolve `href` against `base` the way a browser does for the common
/// cases: absolute, root-relative, query-only, fragment-only, and relative.
pub(crate) fn resolve_url(base: &str, href: &str) -> String {
    if href.is_empty() {
        return base.to_string();
    }
    if href.contains("://") || href.starts_with("about:") || href.starts_with("data:") {
        return href.to_string();
    }
    let origin_end = base
        .find("://")
        .and_then(|i| base[i + 3..].find('/').map(|j| i + 3 + j))
        .unwrap_or(base.len());
    let origin = &base[..origin_end];
    if href.starts_with('/') {
        return format!("{}{}", origin, href);
    }
    if href.starts_with('?') {
        return format!("{}{}", strip_query(base), href);
    }
    if href.starts_with('#') {
        let end = base.find('#').unwrap_or(base.len());
        return format!("{}{}", &base[..end], href);
    }
    let path = strip_query(base);
    let dir = match path[origin_end..].rfind('/') {
        Some(i) => &path[..origin_end + i + 1],
        None => return format!("{}/{}", origin, href),
    };
    format!("{}{}", dir, href)
}

fn form_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

// =============================================================================
// Driver
// =============================================================================

/// In-memory [`Driver`]. Clones share state, so a test can keep one clone
/// to inspect [`commands`](FakeDriver::commands) after handing another to a
/// [`Session`](crate::Session).
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<State>>,
}

struct State {
    pages: Vec<FakePage>,
    scripts: Vec<(String, Value)>,
    doc: Document,
    generation: u64,
    history: Vec<String>,
    position: usize,
    frames: Vec<String>,
    /// Open dialogs, each with the node its answer is written to.
    dialogs: VecDeque<(Dialog, Option<usize>)>,
    pending: Option<(Instant, String)>,
    scroll: (i64, i64),
    commands: Vec<Command>,
    lookups: usize,
    quits: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            pages: Vec::new(),
            scripts: Vec::new(),
            doc: Document::blank("about:blank"),
            generation: 0,
            history: Vec::new(),
            position: 0,
            frames: Vec::new(),
            dialogs: VecDeque::new(),
            pending: None,
            scroll: (0, 0),
            commands: Vec::new(),
            lookups: 0,
            quits: 0,
        }
    }
}

impl std::fmt::Debug for FakeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeDriver")
            .field("url", &state.doc.url)
            .field("pages", &state.pages.len())
            .field("commands", &state.commands.len())
            .finish()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` at its URL. Queries and fragments are ignored when
    /// routing; unknown URLs load an empty document.
    pub fn page(self, page: FakePage) -> Self {
        self.lock().pages.push(page);
        self
    }

    /// Scripts containing `snippet` evaluate to `value`.
    pub fn script(self, snippet: impl Into<String>, value: Value) -> Self {
        self.lock().scripts.push((snippet.into(), value));
        self
    }

    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// How many times `find_elements` ran.
    pub fn lookups(&self) -> usize {
        self.lock().lookups
    }

    pub fn quit_count(&self) -> usize {
        self.lock().quits
    }

    pub fn scroll_position(&self) -> (i64, i64) {
        self.lock().scroll
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with<T>(&self, f: impl FnOnce(&mut State, Instant) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        let now = Instant::now();
        state.tick(now);
        f(&mut state, now)
    }
}

impl State {
    /// Apply whatever came due: delayed navigations and scheduled dialogs.
    fn tick(&mut self, now: Instant) {
        if self.pending.as_ref().is_some_and(|(at, _)| now >= *at) {
            if let Some((_, url)) = self.pending.take() {
                self.visit(&url, now);
            }
        }
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.doc.dialogs)
            .into_iter()
            .partition(|(at, _)| now >= *at);
        self.doc.dialogs = later;
        self.dialogs.extend(due.into_iter().map(|(_, d)| (d, None)));
    }

    fn load(&mut self, url: &str, now: Instant) {
        self.doc = match self.pages.iter().find(|p| same_page(&p.url, url)) {
            Some(page) => Document::build(page, url, now),
            None => Document::blank(url),
        };
        self.generation += 1;
        self.frames.clear();
        self.pending = None;
        self.dialogs.clear();
    }

    fn visit(&mut self, url: &str, now: Instant) {
        if !self.history.is_empty() {
            self.history.truncate(self.position + 1);
        }
        self.history.push(url.to_string());
        self.position = self.history.len() - 1;
        self.load(url, now);
    }

    fn reference(&self, n: usize) -> ElementRef {
        ElementRef::new(format!("{}-{}", self.generation, n), self.frames.clone())
    }

    fn node_of(&self, id: &str, now: Instant) -> Result<usize> {
        let stale = || Error::StaleReference(format!("element {} is no longer attached", id));
        let (generation, index) = id.split_once('-').ok_or_else(stale)?;
        let generation: u64 = generation.parse().map_err(|_| stale())?;
        let index: usize = index.parse().map_err(|_| stale())?;
        if generation != self.generation || index >= self.doc.nodes.len() {
            return Err(stale());
        }
        if !self.doc.present(index, now) {
            return Err(stale());
        }
        Ok(index)
    }

    fn resolve(&self, element: &ElementRef, now: Instant) -> Result<usize> {
        element.ensure_context(&self.frames)?;
        self.node_of(element.id(), now)
    }

    fn view(&self, now: Instant) -> Result<View<'_>> {
        let roots = match self.frames.last() {
            None => self.doc.roots.clone(),
            Some(frame) => {
                let n = self
                    .node_of(frame, now)
                    .map_err(|_| Error::NoSuchFrame(format!("frame {} is gone", frame)))?;
                self.doc.nodes[n].children.clone()
            }
        };
        Ok(View {
            doc: &self.doc,
            roots,
            now,
        })
    }

    fn find(&mut self, scope: Option<&ElementRef>, locator: &Locator, now: Instant) -> Result<Vec<ElementRef>> {
        self.lookups += 1;
        self.commands.push(Command::Find(locator.to_string()));
        let scope = scope.map(|s| self.resolve(s, now)).transpose()?;
        let view = self.view(now)?;
        let v = locator.value.as_str();
        let attr_is = |n: &usize, name: &str| view.attr(*n, name) == Some(v);

        let found: Vec<usize> = match locator.by {
            By::Id => view.descendants(scope).into_iter().filter(|n| attr_is(n, "id")).collect(),
            By::Name => view
                .descendants(scope)
                .into_iter()
                .filter(|n| attr_is(n, "name"))
                .collect(),
            By::ClassName => view
                .descendants(scope)
                .into_iter()
                .filter(|n| {
                    view.attr(*n, "class")
                        .is_some_and(|c| c.split_whitespace().any(|c| c == v))
                })
                .collect(),
            By::TagName => view
                .descendants(scope)
                .into_iter()
                .filter(|n| view.tag(*n).eq_ignore_ascii_case(v))
                .collect(),
            By::Css => {
                let css = Css::parse(v)?;
                view.descendants(scope)
                    .into_iter()
                    .filter(|n| css.matches(&view, *n))
                    .collect()
            }
            By::XPath => XPath::parse(v)?.evaluate(&view, scope),
            By::LinkText | By::PartialLinkText => view
                .descendants(scope)
                .into_iter()
                .filter(|n| view.tag(*n) == "a")
                .filter(|n| {
                    let text = self.doc.rendered(*n, now);
                    if locator.by == By::LinkText {
                        text == v
                    } else {
                        text.contains(v)
                    }
                })
                .collect(),
        };
        Ok(found.into_iter().map(|n| self.reference(n)).collect())
    }

    fn click(&mut self, element: &ElementRef, now: Instant) -> Result<()> {
        let n = self.resolve(element, now)?;
        self.commands.push(Command::Click(self.doc.label(n)));

        if self.doc.nodes[n].tag == "option" {
            if self.doc.disabled(n) {
                return Err(Error::NotInteractable(format!("{} is disabled", self.doc.label(n))));
            }
            let select = self.doc.ancestor(n, "select");
            let multiple = select.is_some_and(|s| self.doc.nodes[s].attr("multiple").is_some());
            if multiple {
                self.doc.nodes[n].checked = !self.doc.nodes[n].checked;
            } else {
                if let Some(s) = select {
                    for o in self.doc.options(s) {
                        self.doc.nodes[o].checked = false;
                    }
                }
                self.doc.nodes[n].checked = true;
            }
            return Ok(());
        }

        self.doc.interactable(n, now)?;
        if let Some(dialog) = self.doc.nodes[n].click_dialog.clone() {
            let answer = self.doc.nodes[n].answer_into.as_deref().and_then(|id| {
                self.doc
                    .nodes
                    .iter()
                    .position(|node| node.attr("id") == Some(id))
            });
            self.dialogs.push_back((dialog, answer));
        }

        let node = &self.doc.nodes[n];
        match (node.tag.as_str(), node.input_type().as_str()) {
            ("input", "checkbox") => self.doc.nodes[n].checked = !self.doc.nodes[n].checked,
            ("input", "radio") => {
                let name = node.attr("name").map(str::to_string);
                if let Some(name) = name {
                    for o in 0..self.doc.nodes.len() {
                        let other = &self.doc.nodes[o];
                        if other.tag == "input" && other.attr("name") == Some(name.as_str()) {
                            self.doc.nodes[o].checked = false;
                        }
                    }
                }
                self.doc.nodes[n].checked = true;
            }
            ("input", "submit") | ("input", "image") => self.submit(n, now),
            ("button", _) => {
                let kind = node.attr("type").unwrap_or("submit").to_ascii_lowercase();
                if kind == "submit" {
                    self.submit(n, now);
                }
            }
            ("a", _) => {
                if let Some(href) = node.attr("href") {
                    let url = resolve_url(&self.doc.url, href);
                    self.visit(&url, now);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Submit on behalf of `n`: the nearest `submits_to` target, else the
    /// enclosing form's `action`. Nothing happens outside a form.
    fn submit(&mut self, n: usize, now: Instant) {
        let chain = self.doc.ancestors_or_self(n);
        let form = chain.iter().copied().find(|a| self.doc.nodes[*a].tag == "form");
        let target = chain
            .iter()
            .find_map(|a| self.doc.nodes[*a].submits_to.clone());

        let (base, delay) = match (target, form) {
            (Some((url, delay)), _) => (resolve_url(&self.doc.url, &url), delay),
            (None, Some(f)) => {
                let action = self.doc.nodes[f].attr("action").unwrap_or("");
                (resolve_url(&self.doc.url, action), Duration::ZERO)
            }
            (None, None) => return,
        };
        let query = form.map(|f| self.doc.form_query(f, now)).unwrap_or_default();
        let url = if query.is_empty() {
            base
        } else {
            format!("{}?{}", strip_query(&base), query)
        };

        if delay.is_zero() {
            self.visit(&url, now);
        } else {
            self.pending = Some((now + delay, url));
        }
    }

    fn writable(&self, n: usize, now: Instant) -> Result<()> {
        self.doc.interactable(n, now)?;
        if !self.doc.editable(n) {
            return Err(Error::NotInteractable(format!(
                "{} does not accept text",
                self.doc.label(n)
            )));
        }
        if self.doc.nodes[n].attr("readonly").is_some() {
            return Err(Error::NotInteractable(format!("{} is read-only", self.doc.label(n))));
        }
        Ok(())
    }

    fn send_keys(&mut self, element: &ElementRef, text: &str, now: Instant) -> Result<()> {
        let n = self.resolve(element, now)?;
        self.commands
            .push(Command::SendKeys(self.doc.label(n), text.to_string()));
        self.writable(n, now)?;
        self.doc.nodes[n].value.push_str(text);
        Ok(())
    }

    fn press_key(&mut self, element: &ElementRef, key: Key, now: Instant) -> Result<()> {
        let n = self.resolve(element, now)?;
        self.commands.push(Command::Key(self.doc.label(n), key));
        self.doc.interactable(n, now)?;

        let editable = self.doc.editable(n) && self.doc.nodes[n].attr("readonly").is_none();
        let tag = self.doc.nodes[n].tag.clone();
        match key {
            k if k.submits() && editable && tag == "input" => self.submit(n, now),
            k if k.submits() && editable => self.doc.nodes[n].value.push('\n'),
            k if k.submits() && tag == "button" => self.click(element, now)?,
            Key::Backspace if editable => {
                self.doc.nodes[n].value.pop();
            }
            Key::Space if editable => self.doc.nodes[n].value.push(' '),
            Key::Space if self.doc.nodes[n].input_type() == "checkbox" && tag == "input" => {
                self.doc.nodes[n].checked = !self.doc.nodes[n].checked;
            }
            _ => {}
        }
        Ok(())
    }

    fn clear(&mut self, element: &ElementRef, now: Instant) -> Result<()> {
        let n = self.resolve(element, now)?;
        self.commands.push(Command::Clear(self.doc.label(n)));
        self.writable(n, now)?;
        self.doc.nodes[n].value.clear();
        Ok(())
    }

    fn attribute(&self, n: usize, name: &str, now: Instant) -> Option<String> {
        let node = &self.doc.nodes[n];
        match name.to_ascii_lowercase().as_str() {
            "checked" | "selected" => node.checked.then(|| "true".to_string()),
            lower @ ("disabled" | "readonly" | "multiple" | "required" | "hidden" | "autofocus") => {
                node.attr(lower).map(|_| "true".to_string())
            }
            "value" => match node.tag.as_str() {
                "input" | "textarea" => Some(node.value.clone()),
                "option" => Some(self.doc.option_value(n, now)),
                "select" => Some(
                    self.doc
                        .options(n)
                        .into_iter()
                        .find(|o| self.doc.nodes[*o].checked)
                        .map(|o| self.doc.option_value(o, now))
                        .unwrap_or_default(),
                ),
                _ => node.attr("value").map(str::to_string),
            },
            "href" | "src" => node.attr(name).map(|v| resolve_url(&self.doc.url, v)),
            _ => node.attr(name).map(str::to_string),
        }
    }

    fn css_value(&self, n: usize, property: &str, now: Instant) -> String {
        let node = &self.doc.nodes[n];
        if let Some((_, v)) = node.styles.iter().find(|(k, _)| k == property) {
            return v.clone();
        }
        match property {
            "display" if self.doc.hidden_now(n, now) => "none".into(),
            "display" if matches!(node.tag.as_str(), "a" | "span" | "b" | "i" | "em" | "strong" | "label") => {
                "inline".into()
            }
            "display" => "block".into(),
            "visibility" => "visible".into(),
            _ => String::new(),
        }
    }

    fn execute_script(&mut self, script: &str, args: &[Value]) -> Result<Value> {
        self.commands.push(Command::Script(script.to_string()));
        if let Some((_, v)) = self.scripts.iter().find(|(s, _)| script.contains(s.as_str())) {
            return Ok(v.clone());
        }
        let arg = |i: usize| args.get(i).and_then(Value::as_i64).unwrap_or(0);
        if script.contains("scrollBy") {
            self.scroll = (self.scroll.0 + arg(0), self.scroll.1 + arg(1));
        } else if script.contains("scrollTo") {
            self.scroll = (arg(0), arg(1));
        } else if script.contains("document.title") {
            return Ok(Value::String(self.doc.title.clone()));
        } else if script.contains("scrollY") || script.contains("pageYOffset") {
            return Ok(Value::from(self.scroll.1));
        } else if script.trim_start().starts_with("throw") {
            return Err(Error::Script(format!("uncaught exception in: {}", script)));
        }
        Ok(Value::Null)
    }

    fn switch_to_frame(&mut self, target: FrameTarget, now: Instant) -> Result<()> {
        let frames: Vec<usize> = {
            let view = self.view(now)?;
            view.descendants(None)
                .into_iter()
                .filter(|n| self.doc.nodes[*n].is_frame())
                .collect()
        };
        let found = match &target {
            FrameTarget::Index(i) => frames.get(*i).copied(),
            FrameTarget::Name(name) => frames.iter().copied().find(|f| {
                let node = &self.doc.nodes[*f];
                node.attr("name") == Some(name.as_str()) || node.attr("id") == Some(name.as_str())
            }),
            FrameTarget::Element(element) => {
                let n = self.resolve(element, now)?;
                self.doc.nodes[n].is_frame().then_some(n)
            }
        };
        let n = found.ok_or_else(|| Error::NoSuchFrame(format!("{:?}", target)))?;
        self.commands.push(Command::Frame(self.doc.label(n)));
        let id = self.reference(n).id().to_string();
        self.frames.push(id);
        Ok(())
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.with(|s, now| {
            s.commands.push(Command::Navigate(url.to_string()));
            s.visit(url, now);
            Ok(())
        })
    }

    async fn back(&self) -> Result<()> {
        self.with(|s, now| {
            s.commands.push(Command::Back);
            if s.position > 0 {
                s.position -= 1;
                let url = s.history[s.position].clone();
                s.load(&url, now);
            }
            Ok(())
        })
    }

    async fn forward(&self) -> Result<()> {
        self.with(|s, now| {
            s.commands.push(Command::Forward);
            if s.position + 1 < s.history.len() {
                s.position += 1;
                let url = s.history[s.position].clone();
                s.load(&url, now);
            }
            Ok(())
        })
    }

    async fn refresh(&self) -> Result<()> {
        self.with(|s, now| {
            s.commands.push(Command::Refresh);
            let url = s.doc.url.clone();
            s.load(&url, now);
            Ok(())
        })
    }

    async fn current_url(&self) -> Result<String> {
        self.with(|s, _| Ok(s.doc.url.clone()))
    }

    async fn title(&self) -> Result<String> {
        self.with(|s, _| Ok(s.doc.title.clone()))
    }

    async fn find_elements(
        &self,
        scope: Option<&ElementRef>,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>> {
        self.with(|s, now| s.find(scope, locator, now))
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.with(|s, now| s.click(element, now))
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<()> {
        self.with(|s, now| s.send_keys(element, text, now))
    }

    async fn press_key(&self, element: &ElementRef, key: Key) -> Result<()> {
        self.with(|s, now| s.press_key(element, key, now))
    }

    async fn clear(&self, element: &ElementRef) -> Result<()> {
        self.with(|s, now| s.clear(element, now))
    }

    async fn gesture(&self, element: &ElementRef, gesture: Gesture) -> Result<()> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            let label = s.doc.label(n);
            s.commands.push(match gesture {
                Gesture::Hover => Command::Hover(label),
                Gesture::ContextClick => Command::ContextClick(label),
                Gesture::DoubleClick => Command::DoubleClick(label),
            });
            s.doc.interactable(n, now)
        })
    }

    async fn drag_and_drop(&self, source: &ElementRef, target: &ElementRef) -> Result<()> {
        self.with(|s, now| {
            let a = s.resolve(source, now)?;
            let b = s.resolve(target, now)?;
            s.commands.push(Command::Drag(s.doc.label(a), s.doc.label(b)));
            s.doc.interactable(a, now)?;
            s.doc.interactable(b, now)
        })
    }

    async fn text(&self, element: &ElementRef) -> Result<String> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(s.doc.rendered(n, now))
        })
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> Result<Option<String>> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(s.attribute(n, name, now))
        })
    }

    async fn css_value(&self, element: &ElementRef, property: &str) -> Result<String> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(s.css_value(n, property, now))
        })
    }

    async fn tag_name(&self, element: &ElementRef) -> Result<String> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(s.doc.nodes[n].tag.clone())
        })
    }

    async fn is_selected(&self, element: &ElementRef) -> Result<bool> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(s.doc.nodes[n].checked)
        })
    }

    async fn is_displayed(&self, element: &ElementRef) -> Result<bool> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(s.doc.displayed(n, now))
        })
    }

    async fn is_enabled(&self, element: &ElementRef) -> Result<bool> {
        self.with(|s, now| {
            let n = s.resolve(element, now)?;
            Ok(!s.doc.disabled(n))
        })
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.with(|s, _| s.execute_script(script, &args))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with(|s, _| {
            s.commands.push(Command::Screenshot);
            Ok(FAKE_PNG.to_vec())
        })
    }

    async fn switch_to_frame(&self, target: FrameTarget) -> Result<()> {
        self.with(|s, now| s.switch_to_frame(target, now))
    }

    async fn switch_to_parent_frame(&self) -> Result<()> {
        self.with(|s, _| {
            s.frames.pop();
            Ok(())
        })
    }

    async fn switch_to_default_content(&self) -> Result<()> {
        self.with(|s, _| {
            s.frames.clear();
            Ok(())
        })
    }

    async fn dialog(&self) -> Result<Option<Dialog>> {
        self.with(|s, _| Ok(s.dialogs.front().map(|(d, _)| d.clone())))
    }

    async fn close_dialog(&self, accept: bool) -> Result<()> {
        self.with(|s, _| {
            let (_, answer) = s.dialogs.pop_front().ok_or(Error::NoSuchAlert)?;
            if let Some(n) = answer {
                s.doc.nodes[n].text = accept.to_string();
                s.doc.nodes[n].later_text = None;
            }
            s.commands.push(Command::CloseDialog(accept));
            Ok(())
        })
    }

    async fn quit(&self) -> Result<()> {
        self.with(|s, _| {
            s.quits += 1;
            s.commands.push(Command::Quit);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Session;

    #[test]
    fn url_resolution() {
        let base = "https://shop.test/catalog/list?page=2";
        assert_eq!(resolve_url(base, "/cart"), "https://shop.test/cart");
        assert_eq!(resolve_url(base, "item/7"), "https://shop.test/catalog/item/7");
        assert_eq!(resolve_url(base, "?page=3"), "https://shop.test/catalog/list?page=3");
        assert_eq!(resolve_url(base, "#top"), "https://shop.test/catalog/list?page=2#top");
        assert_eq!(resolve_url(base, "https://other.test/"), "https://other.test/");
        assert_eq!(resolve_url("https://shop.test", "a"), "https://shop.test/a");
    }

    #[test]
    fn form_encoding() {
        assert_eq!(form_encode("Selenium WebDriver"), "Selenium+WebDriver");
        assert_eq!(form_encode("a&b=c"), "a%26b%3Dc");
    }

    #[tokio::test]
    async fn unknown_url_is_empty_document() {
        let session = Session::new(FakeDriver::new());
        session.goto("https://nowhere.test/").await.unwrap();
        assert_eq!(session.title().await.unwrap(), "");
        assert!(session.find_elements(By::css("*")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_and_refresh() {
        let driver = FakeDriver::new()
            .page(FakePage::new("https://a.test/", "A").child(FakeElement::new("a").attr("href", "/b")))
            .page(FakePage::new("https://a.test/b", "B"));
        let session = Session::new(driver.clone());
        session.goto("https://a.test/").await.unwrap();
        session.find_element(By::tag_name("a")).await.unwrap().click().await.unwrap();
        assert_eq!(session.title().await.unwrap(), "B");
        session.back().await.unwrap();
        assert_eq!(session.title().await.unwrap(), "A");
        session.forward().await.unwrap();
        assert_eq!(session.current_url().await.unwrap(), "https://a.test/b");

        session.back().await.unwrap();
        let a = session.find_element(By::tag_name("a")).await.unwrap();
        session.refresh().await.unwrap();
        assert!(matches!(a.tag_name().await, Err(Error::StaleReference(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_submission_carries_form_fields() {
        let driver = FakeDriver::new().page(
            FakePage::new("https://s.test/", "Search").child(
                FakeElement::new("form")
                    .submits_to("/search", Duration::from_millis(800))
                    .child(FakeElement::new("input").attr("name", "q"))
                    .child(FakeElement::new("input").attr("name", "lang").attr("type", "hidden").attr("value", "en")),
            ),
        );
        let session = Session::new(driver);
        session.goto("https://s.test/").await.unwrap();
        let q = session.find_element(By::name("q")).await.unwrap();
        q.send_keys("rust async").await.unwrap();
        q.send_key(Key::Enter).await.unwrap();

        assert_eq!(session.current_url().await.unwrap(), "https://s.test/");
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(
            session.current_url().await.unwrap(),
            "https://s.test/search?q=rust+async&lang=en"
        );
    }

    #[tokio::test]
    async fn scripts_and_scroll() {
        let driver = FakeDriver::new()
            .page(FakePage::new("https://a.test/", "A"))
            .script("return 6 * 7", serde_json::json!(42));
        let session = Session::new(driver.clone());
        session.goto("https://a.test/").await.unwrap();
        assert_eq!(
            session.execute_script("return 6 * 7", vec![]).await.unwrap(),
            serde_json::json!(42)
        );
        session.scroll_by(0, 500).await.unwrap();
        session.scroll_by(0, 250).await.unwrap();
        assert_eq!(driver.scroll_position(), (0, 750));
        assert!(matches!(
            session.execute_script("throw new Error('x')", vec![]).await,
            Err(Error::Script(_))
        ));
    }
}
