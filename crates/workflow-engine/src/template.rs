//! `{event.x}` / `{workflow.y}` placeholder templates.
//!
//! A string is parsed once into literal and placeholder segments.
//! [`VariableContext::resolve`] reports unknown paths as [`UnresolvedPath`];
//! [`VariableContext::render`] keeps the original placeholder text for them.
//! Rendering is a single pass: substituted values are never re-scanned.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Which context a placeholder reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The triggering event.
    Event,
    /// Values produced by earlier actions.
    Workflow,
}

impl Scope {
    fn as_str(&self) -> &'static str {
        match self {
            Scope::Event => "event",
            Scope::Workflow => "workflow",
        }
    }
}

/// A parsed `{scope.path.to.field}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub scope: Scope,
    pub path: Vec<String>,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}.{}}}", self.scope.as_str(), self.path.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Path that did not resolve against its context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved variable {0}")]
pub struct UnresolvedPath(pub String);

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a string. Braces that do not form a valid placeholder stay literal.
    pub fn parse(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            match after.find('}').and_then(|close| parse_placeholder(&after[..close]).map(|p| (close, p))) {
                Some((close, placeholder)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
    }

    /// The placeholder, when the whole template is exactly one.
    pub fn as_single_placeholder(&self) -> Option<&Placeholder> {
        match self.segments.as_slice() {
            [Segment::Placeholder(p)] => Some(p),
            _ => None,
        }
    }
}

fn parse_placeholder(inner: &str) -> Option<Placeholder> {
    let (scope, path) = inner.split_once('.')?;
    let scope = match scope {
        "event" => Scope::Event,
        "workflow" => Scope::Workflow,
        _ => return None,
    };

    let path: Vec<String> = path.split('.').map(str::to_string).collect();
    let valid = path.iter().all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    });
    valid.then_some(Placeholder { scope, path })
}

/// Values available to placeholders during one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableContext {
    event: Value,
    workflow: Map<String, Value>,
}

impl VariableContext {
    /// Build a context from the triggering event serialized as JSON.
    pub fn new(event: Value) -> Self {
        Self {
            event,
            workflow: Map::new(),
        }
    }

    /// Store a value for later `{workflow.key}` references.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.workflow.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.workflow.get(key)
    }

    pub fn event(&self) -> &Value {
        &self.event
    }

    pub fn workflow(&self) -> &Map<String, Value> {
        &self.workflow
    }

    pub fn into_workflow(self) -> Map<String, Value> {
        self.workflow
    }

    /// Look up a placeholder.
    pub fn resolve(&self, placeholder: &Placeholder) -> Result<Value, UnresolvedPath> {
        let found = match placeholder.scope {
            Scope::Event => lookup_event(&self.event, &placeholder.path),
            Scope::Workflow => lookup(self.workflow.get(&placeholder.path[0]), &placeholder.path[1..]),
        };
        found
            .cloned()
            .ok_or_else(|| UnresolvedPath(placeholder.to_string()))
    }

    /// Substitute every placeholder, leaving unknown ones untouched.
    pub fn render(&self, input: &str) -> String {
        let template = Template::parse(input);
        if !template.has_placeholders() {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => match self.resolve(p) {
                    Ok(value) => out.push_str(&stringify(&value)),
                    Err(_) => out.push_str(&p.to_string()),
                },
            }
        }
        out
    }

    /// Like [`render`](Self::render), but a string that is exactly one
    /// resolvable placeholder yields the referenced value with its type.
    pub fn resolve_value(&self, input: &str) -> Value {
        let template = Template::parse(input);
        if let Some(Ok(value)) = template.as_single_placeholder().map(|p| self.resolve(p)) {
            return value;
        }
        Value::String(self.render(input))
    }

    /// Resolve string leaves of an arbitrary JSON value.
    pub fn resolve_json(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.resolve_value(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Render a value for interpolation into text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn lookup<'a>(root: Option<&'a Value>, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root?, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Event fields resolve by camelCase or snake_case name, then under
/// `properties`, and finally as a bare property key.
fn lookup_event<'a>(event: &'a Value, path: &[String]) -> Option<&'a Value> {
    let head = path.first()?;
    let top = event
        .get(head.as_str())
        .or_else(|| event.get(snake_to_camel(head).as_str()));

    match top {
        Some(value) if !value.is_null() || path.len() == 1 => lookup(Some(value), &path[1..]),
        _ => lookup(event.get("properties"), path),
    }
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
