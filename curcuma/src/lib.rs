//! curcuma - a tiny compiled template engine
//!
//! A deliberately small template language featuring:
//! - Parse once, run many times (compiled templates)
//! - Rich diagnostics via miette
//! - Pipe filters and dotted access over dynamic values
//!
//! # Syntax Overview
//!
//! ```text
//! {{ expr }}              - Expression interpolation
//! {% if cond %}...{% endif %}     - Conditionals
//! {% for item in items %}...{% endfor %}  - Loops
//! {{ value | filter }}    - Filters
//! {{ object.field }}      - Attribute access
//! {# ... #}               - Comments (may span lines)
//! ```
//!
//! Expressions are names, dotted chains, and pipes: `product.price|usd`.
//! Filters are ordinary context values, so callers bring their own.
//!
//! # Example
//!
//! ```
//! use curcuma::{Context, Template};
//!
//! let template = Template::parse("hello.html", "Hello, {{ name }}!")?;
//!
//! let mut ctx = Context::new();
//! ctx.set("name", "World");
//! assert_eq!(template.render(&ctx)?, "Hello, World!");
//! # Ok::<(), miette::Report>(())
//! ```

mod code;
mod compiler;
mod error;
mod eval;
mod expr;
mod lexer;
mod render;

pub use error::{LookupError, SyntaxError, TemplateSource, TypeError, UndefinedError};
pub use eval::{Context, NativeFn, Object, Value};
pub use render::Template;
