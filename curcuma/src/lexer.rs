//! Template tokenizer
//!
//! Splits raw template text on the three delimiter pairs. Everything
//! between matches is literal text; ordering is preserved so the compiler
//! can make a single pass over the result.

use miette::SourceSpan;
use regex::Regex;
use std::sync::LazyLock;

/// The three markup forms, non-greedy, matching across newlines.
static MARKUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}|\{#.*?#\}").unwrap());

/// What a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Literal text, emitted verbatim
    Text,
    /// `{{ expr }}` output expression
    Expr,
    /// `{% tag %}` control tag
    Tag,
    /// `{# ... #}` comment, dropped before compilation
    Comment,
}

/// A classified slice of template text.
#[derive(Debug, Clone)]
pub(crate) struct Token<'s> {
    pub kind: TokenKind,
    /// Trimmed content between the delimiters; the raw text for `Text`.
    pub content: &'s str,
    /// The full slice as it appears in the template.
    pub raw: &'s str,
    /// Byte range in the template, for diagnostics.
    pub span: SourceSpan,
}

/// Split `source` into an ordered token stream.
///
/// Unpaired delimiters never match the markup pattern and fall through as
/// literal text, same as any other character.
pub(crate) fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for m in MARKUP.find_iter(source) {
        if m.start() > last {
            tokens.push(text_token(source, last, m.start()));
        }
        let raw = m.as_str();
        let kind = match &raw[..2] {
            "{{" => TokenKind::Expr,
            "{%" => TokenKind::Tag,
            _ => TokenKind::Comment,
        };
        tokens.push(Token {
            kind,
            content: raw[2..raw.len() - 2].trim(),
            raw,
            span: (m.start(), raw.len()).into(),
        });
        last = m.end();
    }
    if last < source.len() {
        tokens.push(text_token(source, last, source.len()));
    }
    tokens
}

fn text_token(source: &str, start: usize, end: usize) -> Token<'_> {
    let raw = &source[start..end];
    Token {
        kind: TokenKind::Text,
        content: raw,
        raw,
        span: (start, end - start).into(),
    }
}
