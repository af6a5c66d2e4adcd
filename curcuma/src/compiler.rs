//! Template compiler
//!
//! Walks the token stream once, checking control-block nesting with a
//! stack, batching literal and expression output between control tags,
//! and assembling the rendering program. The context-extraction prelude
//! is written into a section reserved before the body, once the full set
//! of referenced names is known.

use crate::code::{Fragment, Header, Program, ProgramBuilder, Stmt};
use crate::error::{SyntaxError, TemplateSource};
use crate::expr::{ExprCompiler, VarKind, VarSets};
use crate::lexer::{self, Token, TokenKind};
use miette::SourceSpan;

/// Kinds of control block, for the nesting stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    For,
}

impl BlockKind {
    fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::For => "for",
        }
    }
}

/// Compile template text into the program for one rendering routine.
pub(crate) fn compile(source: &TemplateSource) -> Result<Program, SyntaxError> {
    Compiler {
        source,
        vars: VarSets::default(),
        builder: ProgramBuilder::new(),
        buffered: Vec::new(),
        stack: Vec::new(),
    }
    .run()
}

struct Compiler<'c> {
    source: &'c TemplateSource,
    vars: VarSets,
    builder: ProgramBuilder,
    buffered: Vec<Fragment>,
    /// Open blocks, innermost last, with the span of the opening tag.
    stack: Vec<(BlockKind, SourceSpan)>,
}

impl<'c> Compiler<'c> {
    fn run(mut self) -> Result<Program, SyntaxError> {
        let prelude = self.builder.section();
        let text: &'c str = self.source.source.as_str();
        for token in lexer::tokenize(text) {
            match token.kind {
                TokenKind::Comment => {}
                TokenKind::Expr => {
                    let code = self.exprs().compile(token.content, token.span)?;
                    self.buffered.push(Fragment::Expr(code));
                }
                TokenKind::Text => {
                    if !token.raw.is_empty() {
                        self.buffered.push(Fragment::Literal(token.raw.to_string()));
                    }
                }
                TokenKind::Tag => self.control_tag(&token)?,
            }
        }
        if let Some((kind, span)) = self.stack.pop() {
            return Err(self.error("Unmatched action tag", kind.name(), span));
        }
        self.flush();
        for (name, span) in self.vars.extraction_set() {
            self.builder.push_section(prelude, Stmt::Bind { name, span });
        }
        Ok(self.builder.finish())
    }

    /// Dispatch one `{% ... %}` tag. The output buffer is flushed first:
    /// batching never crosses a control-tag boundary.
    fn control_tag(&mut self, token: &Token<'_>) -> Result<(), SyntaxError> {
        self.flush();
        let words: Vec<&str> = token.content.split_whitespace().collect();
        match words.first().copied() {
            Some("if") => {
                if words.len() != 2 {
                    return Err(self.error("Don't understand if", token.raw, token.span));
                }
                let cond = self.exprs().compile(words[1], token.span)?;
                self.stack.push((BlockKind::If, token.span));
                self.builder.open_block(Header::If { cond });
            }
            Some("for") => {
                if words.len() != 4 || words[2] != "in" {
                    return Err(self.error("Don't understand for", token.raw, token.span));
                }
                self.exprs()
                    .variable(words[1], token.span, VarKind::LoopBound)?;
                let iter = self.exprs().compile(words[3], token.span)?;
                self.stack.push((BlockKind::For, token.span));
                self.builder.open_block(Header::For {
                    var: words[1].to_string(),
                    iter,
                    span: token.span,
                });
            }
            Some(word) if word.starts_with("end") => {
                if words.len() != 1 {
                    return Err(self.error("Don't understand end", token.raw, token.span));
                }
                let end_what = &word[3..];
                let Some((opened, _)) = self.stack.pop() else {
                    return Err(self.error("Too many ends", token.raw, token.span));
                };
                if opened.name() != end_what {
                    return Err(self.error("Mismatched end tag", end_what, token.span));
                }
                self.builder.close_block();
            }
            first => {
                return Err(self.error(
                    "Don't understand tag",
                    first.unwrap_or_default(),
                    token.span,
                ));
            }
        }
        Ok(())
    }

    /// Translate the buffered fragments into one write statement.
    fn flush(&mut self) {
        if !self.buffered.is_empty() {
            let fragments = std::mem::take(&mut self.buffered);
            self.builder.push(Stmt::Write(fragments));
        }
    }

    fn exprs(&mut self) -> ExprCompiler<'_> {
        ExprCompiler {
            vars: &mut self.vars,
            source: self.source,
        }
    }

    fn error(&self, message: &str, fragment: &str, span: SourceSpan) -> SyntaxError {
        SyntaxError {
            message: message.to_string(),
            fragment: fragment.to_string(),
            span,
            src: self.source.named_source(),
        }
    }
}
