//! Expression compiler
//!
//! Turns a single template expression — `name`, `a.b.c`, `value | filter`,
//! or a mix — into a compiled fragment, recording every bare variable name
//! it references so the template compiler can extract exactly the right
//! set from the render context.
//!
//! The grammar splits on `|` first, so the operand left of each pipe stage
//! is itself dot-resolved: `a.b|f` pipes the resolved `a.b` into `f`.

use crate::error::{SyntaxError, TemplateSource};
use miette::SourceSpan;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Compiled form of a single template expression.
///
/// Evaluated against the routine's local slots at render time; `Load` is
/// the leaf, the other two wrap an inner expression.
#[derive(Debug)]
pub(crate) enum ExprCode {
    /// A reference to a local slot (context-extracted or loop-bound).
    Load { name: String, span: SourceSpan },
    /// Dotted access, resolved left to right at render time.
    Dots {
        base: Box<ExprCode>,
        path: Vec<String>,
        span: SourceSpan,
    },
    /// One pipe stage: the named filter applied to the input value.
    Apply {
        filter: String,
        input: Box<ExprCode>,
        span: SourceSpan,
    },
}

/// Which registry a recorded name lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarKind {
    /// Referenced anywhere in the template
    Referenced,
    /// Introduced by an enclosing `for`
    LoopBound,
}

/// The two variable registries, each mapping a name to the span of its
/// first appearance. Names bound by a loop are populated by the loop
/// itself and must not be pulled from the render context.
#[derive(Debug, Default)]
pub(crate) struct VarSets {
    pub referenced: HashMap<String, SourceSpan>,
    pub loop_bound: HashMap<String, SourceSpan>,
}

impl VarSets {
    /// Names to extract from the render context (referenced − loop-bound),
    /// sorted so the generated prelude is deterministic.
    pub fn extraction_set(&self) -> Vec<(String, SourceSpan)> {
        let mut names: Vec<_> = self
            .referenced
            .iter()
            .filter(|(name, _)| !self.loop_bound.contains_key(*name))
            .map(|(name, span)| (name.clone(), *span))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }
}

/// Compiles expressions on behalf of the template compiler.
pub(crate) struct ExprCompiler<'c> {
    pub vars: &'c mut VarSets,
    pub source: &'c TemplateSource,
}

impl ExprCompiler<'_> {
    /// Compile one trimmed expression string from `{{ }}`, an `if`
    /// condition, or the iterable slot of a `for`.
    pub fn compile(&mut self, expr: &str, span: SourceSpan) -> Result<ExprCode, SyntaxError> {
        if expr.contains('|') {
            let mut stages = expr.split('|').map(str::trim);
            // `split` yields at least one item, the pipe's left operand
            let mut code = match stages.next() {
                Some(base) => self.compile(base, span)?,
                None => return Err(self.invalid_name("", span)),
            };
            for filter in stages {
                self.variable(filter, span, VarKind::Referenced)?;
                code = ExprCode::Apply {
                    filter: filter.to_string(),
                    input: Box::new(code),
                    span,
                };
            }
            Ok(code)
        } else if expr.contains('.') {
            let segments: Vec<&str> = expr.split('.').map(str::trim).collect();
            let base = self.compile(segments[0], span)?;
            let mut path = Vec::with_capacity(segments.len() - 1);
            for segment in &segments[1..] {
                if !IDENT.is_match(segment) {
                    return Err(self.invalid_name(segment, span));
                }
                path.push((*segment).to_string());
            }
            Ok(ExprCode::Dots {
                base: Box::new(base),
                path,
                span,
            })
        } else {
            self.variable(expr, span, VarKind::Referenced)?;
            Ok(ExprCode::Load {
                name: expr.to_string(),
                span,
            })
        }
    }

    /// Validate `name` against the identifier pattern and record it.
    pub fn variable(
        &mut self,
        name: &str,
        span: SourceSpan,
        kind: VarKind,
    ) -> Result<(), SyntaxError> {
        if !IDENT.is_match(name) {
            return Err(self.invalid_name(name, span));
        }
        let registry = match kind {
            VarKind::Referenced => &mut self.vars.referenced,
            VarKind::LoopBound => &mut self.vars.loop_bound,
        };
        registry.entry(name.to_string()).or_insert(span);
        Ok(())
    }

    fn invalid_name(&self, name: &str, span: SourceSpan) -> SyntaxError {
        SyntaxError {
            message: "Not a valid name".to_string(),
            fragment: name.to_string(),
            span,
            src: self.source.named_source(),
        }
    }
}
