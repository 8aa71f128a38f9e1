//! CSS and XPath matching over the in-memory DOM.
//!
//! Both grammars are subsets: enough for the selectors scenarios actually
//! use. Anything outside the subset is reported as `InvalidSelector` so a
//! test never silently matches nothing.

use crate::{Error, Result};

/// Read access to one document.
pub(crate) trait Dom {
    fn tag(&self, node: usize) -> &str;
    fn attr(&self, node: usize, name: &str) -> Option<&str>;
    /// `None` for document roots.
    fn parent(&self, node: usize) -> Option<usize>;
    /// Children of `node`, or the document roots for `None`.
    fn children(&self, node: Option<usize>) -> Vec<usize>;
    fn own_text(&self, node: usize) -> String;
    fn string_value(&self, node: usize) -> String;
}

fn invalid(input: &str, why: &str) -> Error {
    Error::InvalidSelector(format!("'{}': {}", input, why))
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

// =============================================================================
// CSS
// =============================================================================

/// Selector group: `a, b > c`, compounds of tag, `#id`, `.class`,
/// `[attr]`, `[attr=v]` (also `^=`, `$=`, `*=`, `~=`), `:first-child`,
/// `:last-child`, `:nth-child(n)`.
#[derive(Debug)]
pub(crate) struct Css(Vec<Vec<(Combinator, Compound)>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Default)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug)]
struct AttrTest {
    name: String,
    op: Option<(AttrOp, String)>,
}

#[derive(Debug, Clone, Copy)]
enum AttrOp {
    Equals,
    Prefix,
    Suffix,
    Substring,
    Word,
}

#[derive(Debug)]
enum Pseudo {
    FirstChild,
    LastChild,
    NthChild(usize),
}

struct Cursor<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn quoted(&mut self) -> Result<String> {
        let Some(quote) = self.peek().filter(|c| *c == '\'' || *c == '"') else {
            return Err(self.error("expected a quoted string"));
        };
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|c| c != quote) {
            self.pos += 1;
        }
        if self.at_end() {
            return Err(self.error("unterminated string"));
        }
        let value = self.chars[start..self.pos].iter().collect();
        self.pos += 1;
        Ok(value)
    }

    fn number(&mut self) -> Result<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits.parse().map_err(|_| self.error("expected a number"))
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if self.eat(s) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", s)))
        }
    }

    fn error(&self, why: &str) -> Error {
        invalid(self.input, &format!("{} at {}", why, self.pos))
    }
}

impl Css {
    pub(crate) fn parse(input: &str) -> Result<Self> {
        let mut cur = Cursor::new(input);
        let mut group = Vec::new();
        let mut complex = Vec::new();
        let mut combinator = Combinator::Descendant;
        let mut pending = false;

        cur.skip_ws();
        loop {
            if cur.at_end() || cur.peek() == Some(',') {
                if complex.is_empty() || pending {
                    return Err(cur.error("empty selector"));
                }
                group.push(std::mem::take(&mut complex));
                if cur.at_end() {
                    break;
                }
                cur.pos += 1;
                cur.skip_ws();
                combinator = Combinator::Descendant;
                continue;
            }
            if cur.eat(">") {
                if complex.is_empty() || pending {
                    return Err(cur.error("dangling '>'"));
                }
                combinator = Combinator::Child;
                pending = true;
                cur.skip_ws();
                continue;
            }
            let compound = parse_compound(&mut cur)?;
            complex.push((combinator, compound));
            combinator = Combinator::Descendant;
            pending = false;
            cur.skip_ws();
        }
        Ok(Self(group))
    }

    pub(crate) fn matches(&self, dom: &impl Dom, node: usize) -> bool {
        self.0.iter().any(|complex| matches_complex(complex, dom, node))
    }
}

fn parse_compound(cur: &mut Cursor<'_>) -> Result<Compound> {
    let mut c = Compound::default();
    let start = cur.pos;
    if !cur.eat("*") && cur.peek().is_some_and(is_ident) {
        c.tag = Some(cur.ident()?);
    }
    loop {
        match cur.peek() {
            Some('#') => {
                cur.pos += 1;
                c.ids.push(cur.ident()?);
            }
            Some('.') => {
                cur.pos += 1;
                c.classes.push(cur.ident()?);
            }
            Some('[') => {
                cur.pos += 1;
                c.attrs.push(parse_attr(cur)?);
            }
            Some(':') => {
                cur.pos += 1;
                c.pseudos.push(parse_pseudo(cur)?);
            }
            None | Some(',') | Some('>') => break,
            Some(ch) if ch.is_whitespace() => break,
            Some(_) => return Err(cur.error("unexpected character")),
        }
    }
    if cur.pos == start {
        return Err(cur.error("expected a selector"));
    }
    Ok(c)
}

fn parse_attr(cur: &mut Cursor<'_>) -> Result<AttrTest> {
    cur.skip_ws();
    let name = cur.ident()?;
    cur.skip_ws();
    if cur.eat("]") {
        return Ok(AttrTest { name, op: None });
    }
    let op = if cur.eat("=") {
        AttrOp::Equals
    } else if cur.eat("^=") {
        AttrOp::Prefix
    } else if cur.eat("$=") {
        AttrOp::Suffix
    } else if cur.eat("*=") {
        AttrOp::Substring
    } else if cur.eat("~=") {
        AttrOp::Word
    } else {
        return Err(cur.error("unknown attribute operator"));
    };
    cur.skip_ws();
    let value = match cur.peek() {
        Some('\'') | Some('"') => cur.quoted()?,
        _ => cur.ident()?,
    };
    cur.skip_ws();
    cur.expect("]")?;
    Ok(AttrTest {
        name,
        op: Some((op, value)),
    })
}

fn parse_pseudo(cur: &mut Cursor<'_>) -> Result<Pseudo> {
    match cur.ident()?.as_str() {
        "first-child" => Ok(Pseudo::FirstChild),
        "last-child" => Ok(Pseudo::LastChild),
        "nth-child" => {
            cur.expect("(")?;
            cur.skip_ws();
            let n = cur.number()?;
            cur.skip_ws();
            cur.expect(")")?;
            Ok(Pseudo::NthChild(n))
        }
        _ => Err(cur.error("unsupported pseudo-class")),
    }
}

fn matches_complex(parts: &[(Combinator, Compound)], dom: &impl Dom, node: usize) -> bool {
    let Some(((combinator, last), rest)) = parts.split_last() else {
        return false;
    };
    if !matches_compound(last, dom, node) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Combinator::Child => dom
            .parent(node)
            .is_some_and(|p| matches_complex(rest, dom, p)),
        Combinator::Descendant => {
            let mut cur = dom.parent(node);
            while let Some(p) = cur {
                if matches_complex(rest, dom, p) {
                    return true;
                }
                cur = dom.parent(p);
            }
            false
        }
    }
}

fn matches_compound(c: &Compound, dom: &impl Dom, node: usize) -> bool {
    if let Some(tag) = &c.tag {
        if !dom.tag(node).eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if !c.ids.iter().all(|id| dom.attr(node, "id") == Some(id.as_str())) {
        return false;
    }
    let classes = dom.attr(node, "class").unwrap_or("");
    if !c
        .classes
        .iter()
        .all(|class| classes.split_whitespace().any(|c| c == class))
    {
        return false;
    }
    for test in &c.attrs {
        let Some(value) = dom.attr(node, &test.name) else {
            return false;
        };
        let ok = match &test.op {
            None => true,
            Some((AttrOp::Equals, v)) => value == v,
            Some((AttrOp::Prefix, v)) => !v.is_empty() && value.starts_with(v.as_str()),
            Some((AttrOp::Suffix, v)) => !v.is_empty() && value.ends_with(v.as_str()),
            Some((AttrOp::Substring, v)) => !v.is_empty() && value.contains(v.as_str()),
            Some((AttrOp::Word, v)) => value.split_whitespace().any(|w| w == v),
        };
        if !ok {
            return false;
        }
    }
    if !c.pseudos.is_empty() {
        let siblings = dom.children(dom.parent(node));
        let Some(index) = siblings.iter().position(|s| *s == node) else {
            return false;
        };
        for pseudo in &c.pseudos {
            let ok = match pseudo {
                Pseudo::FirstChild => index == 0,
                Pseudo::LastChild => index + 1 == siblings.len(),
                Pseudo::NthChild(n) => index + 1 == *n,
            };
            if !ok {
                return false;
            }
        }
    }
    true
}

// =============================================================================
// XPath
// =============================================================================

/// Location paths with `/` and `//`, name tests, `*`, `.` and `..`, and
/// predicates: position, `last()`, `@attr`, `@attr='v'`, `text()='v'`,
/// `.='v'`, `contains(x, 'v')`, `starts-with(x, 'v')`.
#[derive(Debug)]
pub(crate) struct XPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug)]
struct Step {
    descend: bool,
    kind: StepKind,
    predicates: Vec<Predicate>,
}

#[derive(Debug)]
enum StepKind {
    Child(Option<String>),
    SelfNode,
    Parent,
}

#[derive(Debug)]
enum Operand {
    Attr(String),
    Text,
    Dot,
}

#[derive(Debug)]
enum Predicate {
    Position(usize),
    Last,
    Exists(String),
    Equals(Operand, String),
    Contains(Operand, String),
    StartsWith(Operand, String),
}

/// Node in a location path; `None` is the document root.
type Context = Option<usize>;

impl XPath {
    pub(crate) fn parse(input: &str) -> Result<Self> {
        let mut cur = Cursor::new(input.trim());
        if cur.at_end() {
            return Err(cur.error("empty expression"));
        }

        let (absolute, mut descend) = if cur.eat("//") {
            (true, true)
        } else if cur.eat("/") {
            (true, false)
        } else {
            (false, false)
        };

        let mut steps = Vec::new();
        loop {
            let kind = if cur.eat("..") {
                StepKind::Parent
            } else if cur.eat(".") {
                StepKind::SelfNode
            } else if cur.eat("*") {
                StepKind::Child(None)
            } else {
                StepKind::Child(Some(cur.ident()?))
            };

            let mut predicates = Vec::new();
            while cur.eat("[") {
                predicates.push(parse_predicate(&mut cur)?);
            }
            steps.push(Step {
                descend,
                kind,
                predicates,
            });

            if cur.at_end() {
                break;
            }
            descend = if cur.eat("//") {
                true
            } else if cur.eat("/") {
                false
            } else {
                return Err(cur.error("expected '/'"));
            };
            if cur.at_end() {
                return Err(cur.error("trailing '/'"));
            }
        }
        Ok(Self { absolute, steps })
    }

    /// Matching elements in document order.
    pub(crate) fn evaluate(&self, dom: &impl Dom, scope: Option<usize>) -> Vec<usize> {
        let mut context: Vec<Context> = vec![if self.absolute { None } else { scope }];

        for step in &self.steps {
            let mut next = Vec::new();
            for &ctx in &context {
                let bases = if step.descend {
                    descendants_or_self(dom, ctx)
                } else {
                    vec![ctx]
                };
                for base in bases {
                    let candidates: Vec<Context> = match &step.kind {
                        StepKind::Child(name) => dom
                            .children(base)
                            .into_iter()
                            .filter(|n| {
                                name.as_ref()
                                    .map_or(true, |name| dom.tag(*n).eq_ignore_ascii_case(name))
                            })
                            .map(Some)
                            .collect(),
                        StepKind::SelfNode => vec![base],
                        StepKind::Parent => base.map(|n| dom.parent(n)).into_iter().collect(),
                    };
                    next.extend(apply_predicates(dom, candidates, &step.predicates));
                }
            }
            next.sort();
            next.dedup();
            context = next;
        }
        context.into_iter().flatten().collect()
    }
}

fn descendants_or_self(dom: &impl Dom, ctx: Context) -> Vec<Context> {
    let mut out = vec![ctx];
    let mut stack: Vec<usize> = dom.children(ctx).into_iter().rev().collect();
    while let Some(n) = stack.pop() {
        out.push(Some(n));
        stack.extend(dom.children(Some(n)).into_iter().rev());
    }
    out
}

fn apply_predicates(dom: &impl Dom, mut nodes: Vec<Context>, predicates: &[Predicate]) -> Vec<Context> {
    for predicate in predicates {
        let total = nodes.len();
        nodes = nodes
            .into_iter()
            .enumerate()
            .filter(|(i, n)| match predicate {
                Predicate::Position(p) => i + 1 == *p,
                Predicate::Last => i + 1 == total,
                Predicate::Exists(name) => n.is_some_and(|n| dom.attr(n, name).is_some()),
                Predicate::Equals(op, v) => operand(dom, *n, op).is_some_and(|s| s == *v),
                Predicate::Contains(op, v) => operand(dom, *n, op).is_some_and(|s| s.contains(v.as_str())),
                Predicate::StartsWith(op, v) => {
                    operand(dom, *n, op).is_some_and(|s| s.starts_with(v.as_str()))
                }
            })
            .map(|(_, n)| n)
            .collect();
    }
    nodes
}

fn operand(dom: &impl Dom, node: Context, op: &Operand) -> Option<String> {
    let node = node?;
    match op {
        Operand::Attr(name) => dom.attr(node, name).map(str::to_string),
        Operand::Text => Some(dom.own_text(node)),
        Operand::Dot => Some(dom.string_value(node)),
    }
}

fn parse_operand(cur: &mut Cursor<'_>) -> Result<Operand> {
    cur.skip_ws();
    if cur.eat("@") {
        Ok(Operand::Attr(cur.ident()?))
    } else if cur.eat("text()") {
        Ok(Operand::Text)
    } else if cur.eat(".") {
        Ok(Operand::Dot)
    } else {
        Err(cur.error("expected @attr, text() or ."))
    }
}

fn parse_function(cur: &mut Cursor<'_>) -> Result<(Operand, String)> {
    let op = parse_operand(cur)?;
    cur.skip_ws();
    cur.expect(",")?;
    cur.skip_ws();
    let value = cur.quoted()?;
    cur.skip_ws();
    cur.expect(")")?;
    Ok((op, value))
}

fn parse_predicate(cur: &mut Cursor<'_>) -> Result<Predicate> {
    cur.skip_ws();
    let predicate = if cur.peek().is_some_and(|c| c.is_ascii_digit()) {
        let n = cur.number()?;
        if n == 0 {
            return Err(cur.error("positions start at 1"));
        }
        Predicate::Position(n)
    } else if cur.eat("last()") {
        Predicate::Last
    } else if cur.eat("contains(") {
        let (op, v) = parse_function(cur)?;
        Predicate::Contains(op, v)
    } else if cur.eat("starts-with(") {
        let (op, v) = parse_function(cur)?;
        Predicate::StartsWith(op, v)
    } else {
        let op = parse_operand(cur)?;
        cur.skip_ws();
        if cur.eat("=") {
            cur.skip_ws();
            Predicate::Equals(op, cur.quoted()?)
        } else {
            match op {
                Operand::Attr(name) => Predicate::Exists(name),
                _ => return Err(cur.error("expected '='")),
            }
        }
    };
    cur.skip_ws();
    cur.expect("]")?;
    Ok(predicate)
}
