//! XPath 1.0 subset evaluated over the HTML arena.
//!
//! Supported: absolute, relative and `//` location paths; the axes `child`,
//! `descendant`, `descendant-or-self`, `self`, `parent`, `ancestor`,
//! `ancestor-or-self`, `following-sibling`, `preceding-sibling` and
//! `attribute` with the usual abbreviations (`.`, `..`, `@`); node tests by
//! name, `*`, `text()` and `node()`; predicates built from paths, literals,
//! numbers, `= != < <= > >=`, `and`/`or` and the functions `last()`,
//! `position()`, `count()`, `contains()`, `starts-with()`, `not()`,
//! `normalize-space()` and `string-length()`; unions with `|`.
//!
//! Results come back in document order without duplicates.

use std::str::FromStr;

use super::dom::{Document, NodeData, NodeId};
use crate::error::{MailsinkError, Result};
use crate::model::html::HtmlNode;

// ── Syntax tree ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "attribute" => Self::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Lowercase element or attribute name.
    Name(String),
    /// `*`
    Any,
    /// `text()`
    Text,
    /// `node()`
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Last,
    Position,
    Count,
    Contains,
    StartsWith,
    Not,
    NormalizeSpace,
    StringLength,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "last" => Self::Last,
            "position" => Self::Position,
            "count" => Self::Count,
            "contains" => Self::Contains,
            "starts-with" => Self::StartsWith,
            "not" => Self::Not,
            "normalize-space" => Self::NormalizeSpace,
            "string-length" => Self::StringLength,
            _ => return None,
        })
    }

    /// Accepted argument counts (inclusive).
    fn arity(self) -> (usize, usize) {
        match self {
            Self::Last | Self::Position => (0, 0),
            Self::Count | Self::Not => (1, 1),
            Self::Contains | Self::StartsWith => (2, 2),
            Self::NormalizeSpace | Self::StringLength => (0, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(LocationPath),
    Literal(String),
    Number(f64),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

/// A parsed query: one or more location paths joined by `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    paths: Vec<LocationPath>,
}

impl FromStr for Query {
    type Err = MailsinkError;

    fn from_str(input: &str) -> Result<Self> {
        let tokens = lex(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        parser.query()
    }
}

fn invalid(message: impl Into<String>) -> MailsinkError {
    MailsinkError::InvalidQuery(message.into())
}

// ── Lexer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    Star,
    ColonColon,
    Op(CmpOp),
    Literal(String),
    Number(f64),
    Name(String),
}

fn lex(input: &str) -> Result<Vec<Tok>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let (tok, len) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => (Tok::DoubleSlash, 2),
            '/' => (Tok::Slash, 1),
            '[' => (Tok::LBracket, 1),
            ']' => (Tok::RBracket, 1),
            '(' => (Tok::LParen, 1),
            ')' => (Tok::RParen, 1),
            '@' => (Tok::At, 1),
            ',' => (Tok::Comma, 1),
            '|' => (Tok::Pipe, 1),
            '*' => (Tok::Star, 1),
            '.' if next == Some('.') => (Tok::DotDot, 2),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => lex_number(&chars[i..]),
            '.' => (Tok::Dot, 1),
            ':' if next == Some(':') => (Tok::ColonColon, 2),
            '=' => (Tok::Op(CmpOp::Eq), 1),
            '!' if next == Some('=') => (Tok::Op(CmpOp::Ne), 2),
            '<' if next == Some('=') => (Tok::Op(CmpOp::Le), 2),
            '<' => (Tok::Op(CmpOp::Lt), 1),
            '>' if next == Some('=') => (Tok::Op(CmpOp::Ge), 2),
            '>' => (Tok::Op(CmpOp::Gt), 1),
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| invalid(format!("unterminated string literal at {i}")))?;
                let value: String = chars[i + 1..i + 1 + end].iter().collect();
                (Tok::Literal(value), end + 2)
            }
            c if c.is_ascii_digit() => lex_number(&chars[i..]),
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|&&ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.'))
                    .count();
                (Tok::Name(chars[i..i + len].iter().collect()), len)
            }
            other => return Err(invalid(format!("unexpected character '{other}' at {i}"))),
        };
        tokens.push(tok);
        i += len;
    }

    Ok(tokens)
}

fn lex_number(chars: &[char]) -> (Tok, usize) {
    let mut len = chars.iter().take_while(|c| c.is_ascii_digit()).count();
    if chars.get(len) == Some(&'.') {
        len += 1;
        len += chars[len..].iter().take_while(|c| c.is_ascii_digit()).count();
    }
    let text: String = chars[..len].iter().collect();
    (Tok::Number(text.parse().unwrap_or(f64::NAN)), len)
}

// ── Parser ───────────────────────────────────────────────────────

/// Deepest nesting of predicates, parentheses, calls and chained operators.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> MailsinkError {
        match self.peek() {
            Some(tok) => invalid(format!("expected {expected}, found {tok:?}")),
            None => invalid(format!("expected {expected}, found end of query")),
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(invalid("expression nested too deeply"));
        }
        Ok(())
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Tok::Name(n)) if n == word)
    }

    fn query(&mut self) -> Result<Query> {
        let mut paths = vec![self.location_path()?];
        while self.eat(&Tok::Pipe) {
            paths.push(self.location_path()?);
        }
        if self.peek().is_some() {
            return Err(self.unexpected("end of query"));
        }
        Ok(Query { paths })
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(Tok::Dot | Tok::DotDot | Tok::At | Tok::Star | Tok::Name(_))
        )
    }

    fn location_path(&mut self) -> Result<LocationPath> {
        if self.eat(&Tok::Slash) {
            let steps = if self.at_step_start() {
                self.relative_steps()?
            } else {
                Vec::new()
            };
            return Ok(LocationPath {
                absolute: true,
                steps,
            });
        }

        if self.eat(&Tok::DoubleSlash) {
            let mut steps = vec![Step::new(Axis::DescendantOrSelf, NodeTest::Node)];
            steps.extend(self.relative_steps()?);
            return Ok(LocationPath {
                absolute: true,
                steps,
            });
        }

        Ok(LocationPath {
            absolute: false,
            steps: self.relative_steps()?,
        })
    }

    fn relative_steps(&mut self) -> Result<Vec<Step>> {
        let mut steps = vec![self.step()?];
        loop {
            if self.eat(&Tok::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Tok::DoubleSlash) {
                steps.push(Step::new(Axis::DescendantOrSelf, NodeTest::Node));
                steps.push(self.step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        if self.eat(&Tok::Dot) {
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&Tok::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&Tok::At) {
            Axis::Attribute
        } else if let (Some(Tok::Name(name)), Some(Tok::ColonColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name)
                .ok_or_else(|| invalid(format!("unknown axis '{name}'")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.node_test()?;
        let mut predicates = Vec::new();
        while self.eat(&Tok::LBracket) {
            predicates.push(self.expr()?);
            self.expect(Tok::RBracket, "']'")?;
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self) -> Result<NodeTest> {
        match self.peek().cloned() {
            Some(Tok::Star) => {
                self.pos += 1;
                Ok(NodeTest::Any)
            }
            Some(Tok::Name(name)) => {
                self.pos += 1;
                if !self.eat(&Tok::LParen) {
                    return Ok(NodeTest::Name(name.to_ascii_lowercase()));
                }
                let test = match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    other => return Err(invalid(format!("unknown node type '{other}()'"))),
                };
                self.expect(Tok::RParen, "')'")?;
                Ok(test)
            }
            _ => Err(self.unexpected("a node test")),
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let depth = self.depth;
        self.descend()?;
        let mut left = self.and_expr()?;
        while self.is_keyword("or") {
            self.pos += 1;
            self.descend()?;
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        self.depth = depth;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.comparison()?;
        while self.is_keyword("and") {
            self.pos += 1;
            self.descend()?;
            left = Expr::And(Box::new(left), Box::new(self.comparison()?));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut left = self.primary()?;
        while let Some(Tok::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            self.descend()?;
            left = Expr::Compare(op, Box::new(left), Box::new(self.primary()?));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Tok::Literal(value)) => {
                let value = value.clone();
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Tok::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Some(Tok::Name(name))
                if self.peek_at(1) == Some(&Tok::LParen) && name != "text" && name != "node" =>
            {
                let name = name.clone();
                self.pos += 2;
                self.call(&name)
            }
            Some(Tok::Slash | Tok::DoubleSlash) => Ok(Expr::Path(self.location_path()?)),
            _ if self.at_step_start() => Ok(Expr::Path(self.location_path()?)),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr> {
        let function =
            Function::from_name(name).ok_or_else(|| invalid(format!("unknown function '{name}()'")))?;

        let mut args = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                args.push(self.expr()?);
                if self.eat(&Tok::Comma) {
                    continue;
                }
                self.expect(Tok::RParen, "')'")?;
                break;
            }
        }

        let (min, max) = function.arity();
        if args.len() < min || args.len() > max {
            return Err(invalid(format!(
                "{name}() takes {min}..={max} arguments, got {}",
                args.len()
            )));
        }
        Ok(Expr::Call(function, args))
    }
}

// ── Evaluation ───────────────────────────────────────────────────

/// A selected node: an arena node or the n-th attribute of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item {
    Node(NodeId),
    Attribute(NodeId, usize),
}

#[derive(Debug, Clone)]
enum Value {
    Nodes(Vec<Item>),
    Str(String),
    Num(f64),
    Bool(bool),
}

struct Context {
    item: Item,
    position: usize,
    size: usize,
}

struct Evaluator<'d> {
    doc: &'d Document,
    ranks: Vec<usize>,
}

impl Query {
    /// Select items from `doc`, starting at the document node.
    pub fn select(&self, doc: &Document) -> Vec<Item> {
        let eval = Evaluator {
            doc,
            ranks: doc.document_order(),
        };
        let root = Item::Node(Document::ROOT);
        let items = self
            .paths
            .iter()
            .flat_map(|path| eval.path(path, root))
            .collect();
        eval.normalize(items)
    }

    /// Select and serialise. The document node expands to the whole tree,
    /// attributes become text nodes holding their value.
    pub fn evaluate(&self, doc: &Document) -> Vec<HtmlNode> {
        self.select(doc)
            .into_iter()
            .flat_map(|item| match item {
                Item::Node(id) => doc.to_html_nodes(id),
                Item::Attribute(id, idx) => doc
                    .attributes(id)
                    .get(idx)
                    .map(|(_, value)| HtmlNode::text(value.clone()))
                    .into_iter()
                    .collect(),
            })
            .collect()
    }
}

impl Evaluator<'_> {
    fn order_key(&self, item: Item) -> (usize, usize) {
        match item {
            Item::Node(id) => (self.ranks[id], 0),
            Item::Attribute(id, idx) => (self.ranks[id], idx + 1),
        }
    }

    fn normalize(&self, mut items: Vec<Item>) -> Vec<Item> {
        items.sort_by_key(|&item| self.order_key(item));
        items.dedup();
        items
    }

    fn path(&self, path: &LocationPath, context: Item) -> Vec<Item> {
        let start = if path.absolute {
            Item::Node(Document::ROOT)
        } else {
            context
        };
        let mut current = vec![start];

        for step in &path.steps {
            let mut next = Vec::new();
            for &item in &current {
                let candidates = self
                    .axis(step.axis, item)
                    .into_iter()
                    .filter(|&candidate| self.matches(step, candidate))
                    .collect();
                next.extend(self.filter(&step.predicates, candidates));
            }
            current = self.normalize(next);
        }
        current
    }

    /// Nodes along `axis` from `item`, in axis order (nearest first for the
    /// reverse axes).
    fn axis(&self, axis: Axis, item: Item) -> Vec<Item> {
        let id = match item {
            Item::Node(id) => id,
            Item::Attribute(owner, _) => {
                return match axis {
                    Axis::SelfAxis => vec![item],
                    Axis::Parent => vec![Item::Node(owner)],
                    Axis::Ancestor => self.ancestors(owner, true),
                    Axis::AncestorOrSelf => {
                        let mut out = vec![item];
                        out.extend(self.ancestors(owner, true));
                        out
                    }
                    _ => Vec::new(),
                };
            }
        };

        let node = self.doc.node(id);
        match axis {
            Axis::Child => node.children.iter().map(|&c| Item::Node(c)).collect(),
            Axis::Descendant => self.doc.descendants(id).into_iter().map(Item::Node).collect(),
            Axis::DescendantOrSelf => std::iter::once(id)
                .chain(self.doc.descendants(id))
                .map(Item::Node)
                .collect(),
            Axis::SelfAxis => vec![item],
            Axis::Parent => node.parent.map(Item::Node).into_iter().collect(),
            Axis::Ancestor => self.ancestors(id, false),
            Axis::AncestorOrSelf => self.ancestors(id, true),
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let Some(parent) = node.parent else {
                    return Vec::new();
                };
                let siblings = &self.doc.node(parent).children;
                let pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
                if axis == Axis::FollowingSibling {
                    siblings[pos + 1..].iter().map(|&s| Item::Node(s)).collect()
                } else {
                    siblings[..pos].iter().rev().map(|&s| Item::Node(s)).collect()
                }
            }
            Axis::Attribute => (0..self.doc.attributes(id).len())
                .map(|idx| Item::Attribute(id, idx))
                .collect(),
        }
    }

    fn ancestors(&self, id: NodeId, include_self: bool) -> Vec<Item> {
        let mut out = Vec::new();
        let mut current = if include_self {
            Some(id)
        } else {
            self.doc.node(id).parent
        };
        while let Some(node) = current {
            out.push(Item::Node(node));
            current = self.doc.node(node).parent;
        }
        out
    }

    fn matches(&self, step: &Step, item: Item) -> bool {
        match item {
            Item::Attribute(owner, idx) => match &step.test {
                NodeTest::Node => true,
                NodeTest::Any => step.axis == Axis::Attribute,
                NodeTest::Name(name) => {
                    step.axis == Axis::Attribute
                        && self
                            .doc
                            .attributes(owner)
                            .get(idx)
                            .is_some_and(|(n, _)| n == name)
                }
                NodeTest::Text => false,
            },
            Item::Node(id) => match (&self.doc.node(id).data, &step.test) {
                (_, NodeTest::Node) => true,
                (NodeData::Element { .. }, NodeTest::Any) => true,
                (NodeData::Element { name, .. }, NodeTest::Name(test)) => name == test,
                (NodeData::Text(_), NodeTest::Text) => true,
                _ => false,
            },
        }
    }

    fn filter(&self, predicates: &[Expr], mut items: Vec<Item>) -> Vec<Item> {
        for predicate in predicates {
            let size = items.len();
            items = items
                .into_iter()
                .enumerate()
                .filter(|&(idx, item)| {
                    let ctx = Context {
                        item,
                        position: idx + 1,
                        size,
                    };
                    match self.eval(predicate, &ctx) {
                        Value::Num(n) => n == ctx.position as f64,
                        other => truthy(&other),
                    }
                })
                .map(|(_, item)| item)
                .collect();
        }
        items
    }

    fn eval(&self, expr: &Expr, ctx: &Context) -> Value {
        match expr {
            Expr::Path(path) => Value::Nodes(self.path(path, ctx.item)),
            Expr::Literal(value) => Value::Str(value.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Or(a, b) => {
                Value::Bool(truthy(&self.eval(a, ctx)) || truthy(&self.eval(b, ctx)))
            }
            Expr::And(a, b) => {
                Value::Bool(truthy(&self.eval(a, ctx)) && truthy(&self.eval(b, ctx)))
            }
            Expr::Compare(op, a, b) => {
                let (a, b) = (self.eval(a, ctx), self.eval(b, ctx));
                Value::Bool(self.compare(*op, &a, &b))
            }
            Expr::Call(function, args) => self.call(*function, args, ctx),
        }
    }

    fn call(&self, function: Function, args: &[Expr], ctx: &Context) -> Value {
        let arg_string = |idx: usize| match args.get(idx) {
            Some(expr) => self.string(&self.eval(expr, ctx)),
            None => self.string_value(ctx.item),
        };

        match function {
            Function::Last => Value::Num(ctx.size as f64),
            Function::Position => Value::Num(ctx.position as f64),
            Function::Count => match args.first().map(|a| self.eval(a, ctx)) {
                Some(Value::Nodes(nodes)) => Value::Num(nodes.len() as f64),
                _ => Value::Num(f64::NAN),
            },
            Function::Contains => Value::Bool(arg_string(0).contains(&arg_string(1))),
            Function::StartsWith => Value::Bool(arg_string(0).starts_with(&arg_string(1))),
            Function::Not => Value::Bool(
                !args
                    .first()
                    .is_some_and(|a| truthy(&self.eval(a, ctx))),
            ),
            Function::NormalizeSpace => Value::Str(
                arg_string(0)
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Function::StringLength => Value::Num(arg_string(0).chars().count() as f64),
        }
    }

    fn compare(&self, op: CmpOp, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Nodes(left), Value::Nodes(right)) => left.iter().any(|&l| {
                let l = Value::Str(self.string_value(l));
                right
                    .iter()
                    .any(|&r| self.compare_atoms(op, &l, &Value::Str(self.string_value(r))))
            }),
            (Value::Nodes(nodes), Value::Bool(_)) => {
                self.compare_atoms(op, &Value::Bool(!nodes.is_empty()), b)
            }
            (Value::Bool(_), Value::Nodes(nodes)) => {
                self.compare_atoms(op, a, &Value::Bool(!nodes.is_empty()))
            }
            (Value::Nodes(nodes), atom) => nodes
                .iter()
                .any(|&n| self.compare_atoms(op, &Value::Str(self.string_value(n)), atom)),
            (atom, Value::Nodes(nodes)) => nodes
                .iter()
                .any(|&n| self.compare_atoms(op, atom, &Value::Str(self.string_value(n)))),
            _ => self.compare_atoms(op, a, b),
        }
    }

    fn compare_atoms(&self, op: CmpOp, a: &Value, b: &Value) -> bool {
        match op {
            CmpOp::Eq | CmpOp::Ne => {
                let equal = match (a, b) {
                    (Value::Bool(_), _) | (_, Value::Bool(_)) => truthy(a) == truthy(b),
                    (Value::Num(_), _) | (_, Value::Num(_)) => self.number(a) == self.number(b),
                    _ => self.string(a) == self.string(b),
                };
                equal == (op == CmpOp::Eq)
            }
            CmpOp::Lt => self.number(a) < self.number(b),
            CmpOp::Le => self.number(a) <= self.number(b),
            CmpOp::Gt => self.number(a) > self.number(b),
            CmpOp::Ge => self.number(a) >= self.number(b),
        }
    }

    fn string_value(&self, item: Item) -> String {
        match item {
            Item::Node(id) => self.doc.text_content(id),
            Item::Attribute(id, idx) => self
                .doc
                .attributes(id)
                .get(idx)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }

    fn string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&n| self.string_value(n))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => self.string(other).trim().parse().unwrap_or(f64::NAN),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Nodes(nodes) => !nodes.is_empty(),
        Value::Str(s) => !s.is_empty(),
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Bool(b) => *b,
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::builder::parse_html;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value as Json};

    const PAGE: &str = r#"<html><head><title>Report</title></head><body>
<div id="main" class="box wide"><p>first</p><p class="note">second</p>
<a href="cid:logo@x">logo</a><img src="cid:bg1@x" alt="bg"></div>
<ul><li>one</li><li>two</li><li>three</li></ul>
</body></html>"#;

    fn run(html: &str, xpath: &str) -> Json {
        let query: Query = xpath.parse().unwrap();
        serde_json::to_value(query.evaluate(&parse_html(html))).unwrap()
    }

    fn texts(xpath: &str) -> Vec<String> {
        let query: Query = xpath.parse().unwrap();
        let doc = parse_html(PAGE);
        query
            .evaluate(&doc)
            .into_iter()
            .map(|node| match node {
                HtmlNode::Text(t) => t,
                HtmlNode::Element { tag, .. } => format!("<{tag}>"),
            })
            .collect()
    }

    #[test]
    fn test_wildcard_returns_whole_tree() {
        assert_eq!(
            run("<div><p>p inner text", "*"),
            json!([{"html": {"children": [{"body": {"children": [
                {"div": {"children": [{"p": {"children": [{"text": "p inner text"}]}}]}}
            ]}}]}}])
        );
    }

    #[test]
    fn test_root_returns_whole_tree() {
        assert_eq!(run("<b>x</b>", "/"), run("<b>x</b>", "*"));
    }

    #[test]
    fn test_text_step() {
        assert_eq!(
            run("<div><p>p inner text", "//p/text()"),
            json!([{"text": "p inner text"}])
        );
    }

    #[test]
    fn test_positional_predicates() {
        assert_eq!(texts("//li[1]/text()"), vec!["one"]);
        assert_eq!(texts("//li[last()]/text()"), vec!["three"]);
        assert_eq!(texts("//li[position() > 1]/text()"), vec!["two", "three"]);
    }

    #[test]
    fn test_attribute_predicates_and_selection() {
        assert_eq!(texts("//p[@class='note']/text()"), vec!["second"]);
        assert_eq!(texts("//p[not(@class)]/text()"), vec!["first"]);
        assert_eq!(texts("//div[contains(@class, 'wide')]/@id"), vec!["main"]);
        assert_eq!(texts("//*[starts-with(@src, 'cid:')]/@alt"), vec!["bg"]);
        assert_eq!(texts("//img/@*"), vec!["cid:bg1@x", "bg"]);
    }

    #[test]
    fn test_value_predicates() {
        assert_eq!(texts("//div[p='second']/@id"), vec!["main"]);
        assert_eq!(texts("//p[text()='first']"), vec!["<p>"]);
        assert_eq!(texts("//ul[count(li) = 3]/li[2]/text()"), vec!["two"]);
    }

    #[test]
    fn test_axes() {
        assert_eq!(texts("//p[@class]/preceding-sibling::p/text()"), vec!["first"]);
        assert_eq!(texts("//li[1]/following-sibling::li/text()"), vec!["two", "three"]);
        assert_eq!(texts("//title/ancestor::*"), vec!["<html>", "<head>"]);
        assert_eq!(texts("//a/../@id"), vec!["main"]);
        assert_eq!(texts("/html/body/div/self::div/@class"), vec!["box wide"]);
        assert_eq!(texts("//a/child::text()"), vec!["logo"]);
    }

    #[test]
    fn test_union_is_in_document_order() {
        assert_eq!(texts("//li[3]/text() | //p[1]/text()"), vec!["first", "three"]);
        assert_eq!(texts("//p/text() | //p/text()"), vec!["first", "second"]);
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert_eq!(texts("//P[1]/text()"), vec!["first"]);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert_eq!(run(PAGE, "//table"), json!([]));
        assert_eq!(run(PAGE, "p"), json!([]));
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "//",
            "//p[",
            "//p[1",
            "p/",
            "///",
            "//p[@]",
            "foo()",
            "//p[unknown()]",
            "bogus::p",
            "//p ]",
            "//p[contains(@a)]",
            "'unterminated",
            "#",
            "(//li)[2]",
        ] {
            assert!(
                matches!(bad.parse::<Query>(), Err(MailsinkError::InvalidQuery(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_nesting_limit() {
        let nested = format!("//p[{}1{}]", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(matches!(
            nested.parse::<Query>(),
            Err(MailsinkError::InvalidQuery(_))
        ));
        let chained = format!("//p[{}]", vec!["1"; 10_000].join(" = "));
        assert!(matches!(
            chained.parse::<Query>(),
            Err(MailsinkError::InvalidQuery(_))
        ));
        assert_eq!(texts("//p[((1 = 1))]/text()"), vec!["first", "second"]);
    }

    #[test]
    fn test_wildcard_on_deep_nesting() {
        let html = "<div>".repeat(60_000);
        let result = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let query: Query = "*".parse().unwrap();
                serde_json::to_string(&query.evaluate(&parse_html(&html))).unwrap()
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(result.starts_with(r#"[{"html":{"children":[{"body":"#));
    }
}
