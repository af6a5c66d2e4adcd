//! Program assembly
//!
//! The generated rendering routine is built as a structured statement
//! list rather than source text: blocks nest, and one placeholder section
//! reserved at the top receives the context-extraction prelude only after
//! the whole template body has been scanned.
//!
//! Balance violations (closing a block that is not open, finishing with
//! blocks still open) are bugs in the compiler, not user errors, and
//! panic.

use crate::expr::ExprCode;
use miette::SourceSpan;

/// One pending piece of batched output.
#[derive(Debug)]
pub(crate) enum Fragment {
    /// Literal template text, appended verbatim
    Literal(String),
    /// A compiled expression, stringified at render time
    Expr(ExprCode),
}

/// One statement of the generated rendering routine.
#[derive(Debug)]
pub(crate) enum Stmt {
    /// Append the rendered fragments to the output.
    Write(Vec<Fragment>),
    /// Pull one name out of the render context into its local slot.
    Bind { name: String, span: SourceSpan },
    /// Conditional block.
    If { cond: ExprCode, body: Vec<Stmt> },
    /// Loop block, binding each element of the iterable in turn.
    For {
        var: String,
        iter: ExprCode,
        body: Vec<Stmt>,
        span: SourceSpan,
    },
}

/// Header for a block about to be opened.
#[derive(Debug)]
pub(crate) enum Header {
    If {
        cond: ExprCode,
    },
    For {
        var: String,
        iter: ExprCode,
        span: SourceSpan,
    },
}

/// Handle to a reserved placeholder section.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SectionId(usize);

/// The flattened body of one rendering routine.
pub(crate) type Program = Vec<Stmt>;

enum Entry {
    Stmt(Stmt),
    Section(SectionId),
}

struct Frame {
    header: Option<Header>,
    entries: Vec<Entry>,
}

/// Nesting-aware accumulator for the generated program.
pub(crate) struct ProgramBuilder {
    frames: Vec<Frame>,
    sections: Vec<Vec<Stmt>>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                header: None,
                entries: Vec::new(),
            }],
            sections: Vec::new(),
        }
    }

    fn current(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("the root frame is never popped")
    }

    /// Append one statement at the current nesting position.
    pub fn push(&mut self, stmt: Stmt) {
        self.current().entries.push(Entry::Stmt(stmt));
    }

    /// Reserve a placeholder at the current position. Statements pushed to
    /// it later are spliced in here when the program is finished, which is
    /// how extraction code ends up ahead of the body that determined it.
    ///
    /// Sections can only be reserved at the top level.
    pub fn section(&mut self) -> SectionId {
        assert!(
            self.frames.len() == 1,
            "sections can only be reserved at the top level"
        );
        let id = SectionId(self.sections.len());
        self.sections.push(Vec::new());
        self.current().entries.push(Entry::Section(id));
        id
    }

    /// Append a statement to a reserved section.
    pub fn push_section(&mut self, id: SectionId, stmt: Stmt) {
        self.sections[id.0].push(stmt);
    }

    /// Begin a nested block; subsequent statements land in its body.
    pub fn open_block(&mut self, header: Header) {
        self.frames.push(Frame {
            header: Some(header),
            entries: Vec::new(),
        });
    }

    /// Close the innermost block, attaching its body to its header.
    pub fn close_block(&mut self) {
        let frame = match self.frames.pop() {
            Some(frame) if !self.frames.is_empty() => frame,
            _ => panic!("close_block called with no open block"),
        };
        let body = into_stmts(frame.entries);
        let stmt = match frame.header {
            Some(Header::If { cond }) => Stmt::If { cond, body },
            Some(Header::For { var, iter, span }) => Stmt::For {
                var,
                iter,
                body,
                span,
            },
            None => unreachable!("the root frame has no header"),
        };
        self.push(stmt);
    }

    /// Check that every opened block was closed, splice reserved sections
    /// into place, and return the flattened program.
    pub fn finish(mut self) -> Program {
        assert!(
            self.frames.len() == 1,
            "finish called with unclosed blocks"
        );
        let root = self.frames.pop().expect("the root frame is never popped");
        let mut program = Vec::new();
        for entry in root.entries {
            match entry {
                Entry::Stmt(stmt) => program.push(stmt),
                Entry::Section(id) => program.append(&mut self.sections[id.0]),
            }
        }
        program
    }
}

fn into_stmts(entries: Vec<Entry>) -> Vec<Stmt> {
    entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Stmt(stmt) => stmt,
            Entry::Section(_) => unreachable!("sections are top-level only"),
        })
        .collect()
}
