//! Template compiler
//!
//! A template is literal text with `${...}` variable references:
//!
//! ```text
//! ${date|format(f=HH:MM:ss)} [${level|align(s=right,w=5)}] ${proc.env(HOME)} ${msg}
//! ```
//!
//! The first pipe of a reference names the variable. Its optional argument
//! list is passed to the variable when it is callable. Every further pipe
//! is a formatter stage `name(key=value, ...)`; positional stage arguments
//! are keyed by their position.
//!
//! In literal text `\${`, `\{` and `\,` stand for `${`, `{` and `,`.
//! Inside a reference `\,` and `\}` stand for `,` and `}`.

use super::formatter::{ArgMap, Formatter, Formatters};
use crate::core::error::{LoggerError, Result};
use crate::core::scope::{ScopeChain, Value};
use std::fmt;
use std::sync::Arc;

/// Render function supplied directly instead of template text
pub type FormatFn = Arc<dyn Fn(&ScopeChain) -> String + Send + Sync>;

/// A named format ready to render
#[derive(Clone)]
pub enum CompiledFormat {
    Template(Arc<Template>),
    /// Used as given, never validated
    Function(FormatFn),
}

impl CompiledFormat {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&ScopeChain) -> String + Send + Sync + 'static,
    {
        CompiledFormat::Function(Arc::new(f))
    }

    pub fn render(&self, chain: &ScopeChain) -> String {
        match self {
            CompiledFormat::Template(template) => template.render(chain),
            CompiledFormat::Function(f) => f(chain),
        }
    }
}

impl fmt::Debug for CompiledFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledFormat::Template(t) => f.debug_tuple("Template").field(&t.source()).finish(),
            CompiledFormat::Function(_) => f.write_str("Function"),
        }
    }
}

struct Stage {
    name: String,
    args: ArgMap,
    formatter: Option<Arc<dyn Formatter>>,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("known", &self.formatter.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct VariableChunk {
    name: String,
    call_args: Vec<String>,
    stages: Vec<Stage>,
}

impl VariableChunk {
    fn evaluate(&self, chain: &ScopeChain) -> Option<Value> {
        let mut value = chain.resolve(&self.name)?.call(&self.call_args)?;
        for stage in &self.stages {
            match &stage.formatter {
                Some(formatter) => value = formatter.apply(value, &stage.args)?,
                None => return None,
            }
        }
        Some(value)
    }
}

#[derive(Debug)]
enum Segment {
    Literal(String),
    Variable(VariableChunk),
}

/// A compiled template
#[derive(Debug)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse and compile template text.
    ///
    /// Formatter stages are bound to `formatters` now; a stage naming an
    /// unknown formatter compiles but renders its variable as empty text.
    pub fn compile(source: &str, formatters: &Formatters) -> Result<Self> {
        let segments = Parser::new(source).parse(formatters)?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template has no variable references
    pub fn is_constant(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Names of the variables referenced, in order of appearance
    pub fn variables(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Variable(chunk) => Some(chunk.name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn render(&self, chain: &ScopeChain) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(chunk) => {
                    if let Some(value) = chunk.evaluate(chain) {
                        out.push_str(&value.to_string());
                    }
                }
            }
        }
        out
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> LoggerError {
        LoggerError::compile("template", self.source, message)
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn parse(mut self, formatters: &Formatters) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek(0) {
            match (c, self.peek(1), self.peek(2)) {
                ('\\', Some('$'), Some('{')) => {
                    literal.push_str("${");
                    self.pos += 3;
                }
                ('\\', Some(next @ ('{' | ',')), _) => {
                    literal.push(next);
                    self.pos += 2;
                }
                ('$', Some('{'), _) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    self.pos += 2;
                    let body = self.variable_body()?;
                    segments.push(Segment::Variable(self.variable(&body, formatters)?));
                }
                _ => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(segments)
    }

    /// Raw text up to the closing brace; escapes are kept for the argument splitter
    fn variable_body(&mut self) -> Result<String> {
        let mut body = String::new();
        loop {
            match (self.peek(0), self.peek(1)) {
                (None, _) => return Err(self.error("unterminated '${'")),
                (Some('\\'), Some('}')) => {
                    body.push_str("\\}");
                    self.pos += 2;
                }
                (Some('}'), _) => {
                    self.pos += 1;
                    return Ok(body);
                }
                (Some(c), _) => {
                    body.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn variable(&self, body: &str, formatters: &Formatters) -> Result<VariableChunk> {
        let mut pipes = body.trim().split('|');
        let (name, call_args) = self.pipe(pipes.next().unwrap_or_default())?;

        let mut stages = Vec::new();
        for pipe in pipes {
            let (stage_name, args) = self.pipe(pipe)?;
            let formatter = formatters.get(&stage_name);
            let args = match &formatter {
                Some(f) => f.prepare(args)?,
                None => args,
            };
            stages.push(Stage {
                name: stage_name,
                args,
                formatter,
            });
        }

        Ok(VariableChunk {
            name,
            call_args: call_args.values(),
            stages,
        })
    }

    /// `name` or `name(arg, key=value, ...)`
    fn pipe(&self, pipe: &str) -> Result<(String, ArgMap)> {
        let pipe = pipe.trim();
        let (name, args) = match pipe.find('(') {
            Some(open) => {
                let rest = &pipe[open..];
                if !rest.ends_with(')') {
                    return Err(self.error(format!("missing ')' in '{}'", pipe)));
                }
                (&pipe[..open], split_args(&rest[1..rest.len() - 1]))
            }
            None if pipe.contains(')') => {
                return Err(self.error(format!("unexpected ')' in '{}'", pipe)));
            }
            None => (pipe, ArgMap::new()),
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(self.error("empty name in variable reference"));
        }
        Ok((name.to_string(), args))
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("\\,", ",").replace("\\}", "}")
}

fn split_args(raw: &str) -> ArgMap {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push_str("\\,");
                chars.next();
            }
            ',' => pieces.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    pieces.push(current);

    let mut args = ArgMap::new();
    for (idx, piece) in pieces.iter().filter(|p| !p.trim().is_empty()).enumerate() {
        match piece.split_once('=') {
            Some((key, value)) => args.insert(key.trim(), unescape(value.trim())),
            None => args.insert(idx.to_string(), unescape(piece.trim())),
        }
    }
    args
}
