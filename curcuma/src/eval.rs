//! Runtime values and program execution
//!
//! Evaluates the compiled program against a render context. Expressions
//! evaluate to [`Value`]s; write statements turn them into text. The
//! dotted-lookup resolver lives here too: it is called by the realized
//! rendering routine, never by the compiler.

use crate::code::{Fragment, Stmt};
use crate::error::{LookupError, TemplateSource, TypeError, UndefinedError};
use crate::expr::ExprCode;
use miette::{Result, SourceSpan};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A callable context value: pipe filters and zero-argument callables.
///
/// Filters receive exactly one argument, the piped value. Zero-argument
/// callables met during dotted lookup are invoked with an empty slice.
/// Errors returned here propagate out of `render` unmodified.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Attribute access for arbitrary host values.
///
/// Implement this to let dotted lookup navigate a host type's fields.
/// Returning `None` makes the lookup fail; there is no silent default.
pub trait Object: fmt::Debug + Send + Sync {
    /// Look up one attribute by name.
    fn attr(&self, name: &str) -> Option<Value>;
}

/// A runtime value in the template
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Dict(HashMap<String, Value>),
    /// An arbitrary host value exposing attributes
    Object(Arc<dyn Object>),
    /// A filter or zero-argument callable
    Func(NativeFn),
}

impl Value {
    /// Wrap a native function (a filter, or a zero-argument callable).
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Value::Func(Arc::new(f))
    }

    /// Wrap a host value exposing attributes.
    pub fn object<O: Object + 'static>(o: O) -> Self {
        Value::Object(Arc::new(o))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Object(_) | Value::Func(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Object(_) => "object",
            Value::Func(_) => "function",
        }
    }

    pub fn render_to_string(&self) -> String {
        match self {
            Value::None => "".to_string(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::List(l) => {
                let items: Vec<_> = l.iter().map(|v| v.render_to_string()).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Dict(_) => "[object]".to_string(),
            Value::Object(_) => "[object]".to_string(),
            Value::Func(_) => "[function]".to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "{b:?}"),
            Value::Int(i) => write!(f, "{i:?}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::List(l) => f.debug_list().entries(l).finish(),
            Value::Dict(d) => f.debug_map().entries(d).finish(),
            Value::Object(o) => write!(f, "{o:?}"),
            Value::Func(_) => f.write_str("<function>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Self {
        Value::Dict(map)
    }
}

/// Render context: a flat mapping from name to value.
///
/// Filters are ordinary context values (wrapped with [`Value::func`]).
#[derive(Debug, Clone, Default)]
pub struct Context {
    vars: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Get a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Merge `other` over `self`; `other`'s values win on collision.
    pub fn merge(&mut self, other: &Context) {
        for (name, value) in &other.vars {
            self.vars.insert(name.clone(), value.clone());
        }
    }

    pub(crate) fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Context::new();
        for (name, value) in iter {
            ctx.set(name, value);
        }
        ctx
    }
}

/// Evaluate dotted access at render time.
///
/// For each path segment in order: attribute access on objects, falling
/// back to keyed access on dicts and indexed access on lists; if the step
/// lands on a callable it is invoked with zero arguments before moving
/// on. A step on a value that supports none of these is a lookup error,
/// as is a missing attribute, key, or index.
pub(crate) fn resolve_dots(
    value: Value,
    path: &[String],
    span: SourceSpan,
    source: &TemplateSource,
) -> Result<Value> {
    let mut current = value;
    for segment in path {
        let next = match &current {
            Value::Object(obj) => obj.attr(segment),
            Value::Dict(map) => map.get(segment).cloned(),
            Value::List(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i).cloned()),
            _ => None,
        };
        let Some(next) = next else {
            return Err(LookupError {
                base_type: current.type_name().to_string(),
                segment: segment.clone(),
                span,
                src: source.named_source(),
            }
            .into());
        };
        current = match next {
            Value::Func(f) => f(&[])?,
            other => other,
        };
    }
    Ok(current)
}

/// Run a compiled program against a merged render context.
pub(crate) fn execute(
    program: &[Stmt],
    context: &HashMap<String, Value>,
    source: &TemplateSource,
) -> Result<String> {
    let mut vm = Evaluator {
        locals: HashMap::new(),
        context,
        source,
        out: String::new(),
    };
    vm.run_block(program)?;
    Ok(vm.out)
}

/// Program executor: local slots plus the growing output string.
struct Evaluator<'a> {
    locals: HashMap<String, Value>,
    context: &'a HashMap<String, Value>,
    source: &'a TemplateSource,
    out: String,
}

impl Evaluator<'_> {
    fn run_block(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            match stmt {
                Stmt::Write(fragments) => {
                    for fragment in fragments {
                        match fragment {
                            Fragment::Literal(text) => self.out.push_str(text),
                            Fragment::Expr(code) => {
                                let value = self.eval(code)?;
                                self.out.push_str(&value.render_to_string());
                            }
                        }
                    }
                }
                Stmt::Bind { name, span } => {
                    let value = self.context.get(name).cloned().ok_or_else(|| {
                        self.undefined(name, *span, self.context.keys())
                    })?;
                    self.locals.insert(name.clone(), value);
                }
                Stmt::If { cond, body } => {
                    if self.eval(cond)?.is_truthy() {
                        self.run_block(body)?;
                    }
                }
                Stmt::For {
                    var,
                    iter,
                    body,
                    span,
                } => {
                    let iterable = self.eval(iter)?;
                    for item in self.iterate(iterable, *span)? {
                        self.locals.insert(var.clone(), item);
                        self.run_block(body)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval(&self, code: &ExprCode) -> Result<Value> {
        match code {
            ExprCode::Load { name, span } => self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| self.undefined(name, *span, self.locals.keys())),
            ExprCode::Dots { base, path, span } => {
                let base = self.eval(base)?;
                resolve_dots(base, path, *span, self.source)
            }
            ExprCode::Apply {
                filter,
                input,
                span,
            } => {
                let input = self.eval(input)?;
                let func = self
                    .locals
                    .get(filter)
                    .cloned()
                    .ok_or_else(|| self.undefined(filter, *span, self.locals.keys()))?;
                match func {
                    Value::Func(f) => f(&[input]),
                    other => Err(TypeError {
                        expected: "a callable filter".to_string(),
                        found: other.type_name().to_string(),
                        context: format!("piped into `{filter}`"),
                        span: *span,
                        src: self.source.named_source(),
                    }
                    .into()),
                }
            }
        }
    }

    fn iterate(&self, value: Value, span: SourceSpan) -> Result<Vec<Value>> {
        match value {
            Value::List(items) => Ok(items),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            other => Err(TypeError {
                expected: "an iterable".to_string(),
                found: other.type_name().to_string(),
                context: "loop source".to_string(),
                span,
                src: self.source.named_source(),
            }
            .into()),
        }
    }

    fn undefined<'k>(
        &self,
        name: &str,
        span: SourceSpan,
        known: impl Iterator<Item = &'k String>,
    ) -> miette::Report {
        let mut available: Vec<String> = known.cloned().collect();
        available.sort();
        UndefinedError {
            name: name.to_string(),
            available,
            span,
            src: self.source.named_source(),
        }
        .into()
    }
}
