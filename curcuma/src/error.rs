//! Rich error types with intent for IDE-grade diagnostics
//!
//! Error types carry structured information, not just text: every error
//! labels the offending spot in the template source via miette.

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// A template source for error reporting
#[derive(Debug, Clone)]
pub struct TemplateSource {
    /// Name of the template (usually filename)
    pub name: String,
    /// The full source text
    pub source: Arc<String>,
}

impl TemplateSource {
    /// Wrap a named template text.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Arc::new(source.into()),
        }
    }

    /// Create a NamedSource for miette
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, (*self.source).clone())
    }
}

/// Syntax error during compilation.
///
/// The single compile-time error kind: malformed `if`/`for`/`end` tags,
/// unknown tag keywords, invalid identifiers, and broken block nesting all
/// surface here, before any rendering can happen.
#[derive(Error, Debug, Diagnostic)]
#[error("{message}: {fragment}")]
#[diagnostic(code(curcuma::syntax))]
pub struct SyntaxError {
    /// What went wrong
    pub message: String,
    /// The offending bit of template text
    pub fragment: String,
    /// Location in source
    #[label("here")]
    pub span: SourceSpan,
    /// The source code
    #[source_code]
    pub src: NamedSource<String>,
}

/// Undefined variable at render time
#[derive(Error, Debug, Diagnostic)]
#[error("Variable `{name}` is not defined")]
#[diagnostic(
    code(curcuma::undefined),
    help("Available variables: {}", available.join(", "))
)]
pub struct UndefinedError {
    /// The undefined variable name
    pub name: String,
    /// Variables that are available in the render context
    pub available: Vec<String>,
    /// Location of the first reference
    #[label("not found in the render context")]
    pub span: SourceSpan,
    /// The source code
    #[source_code]
    pub src: NamedSource<String>,
}

/// A dotted-access step that resolved to nothing
#[derive(Error, Debug, Diagnostic)]
#[error("`{base_type}` value has no member `{segment}`")]
#[diagnostic(code(curcuma::lookup))]
pub struct LookupError {
    /// Type name of the value being navigated
    pub base_type: String,
    /// The dot segment that failed
    pub segment: String,
    /// Location of the expression
    #[label("lookup failed here")]
    pub span: SourceSpan,
    /// The source code
    #[source_code]
    pub src: NamedSource<String>,
}

/// Type error (e.g., piping into a non-callable, looping a non-iterable)
#[derive(Error, Debug, Diagnostic)]
#[error("Expected {expected}, found {found}")]
#[diagnostic(code(curcuma::type_error))]
pub struct TypeError {
    /// What was expected
    pub expected: String,
    /// What type was found
    pub found: String,
    /// Context for the error
    pub context: String,
    /// Location
    #[label("{context}")]
    pub span: SourceSpan,
    /// The source code
    #[source_code]
    pub src: NamedSource<String>,
}
