pub mod expr;

use std::ops::Range;
use std::rc::Rc;

pub use expr::{
    BinaryOperator, CompareOperator, Expr, ExprKind, FStringPart, LogicalOperator, UnaryOperator,
};

/// A statement and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluation (result discarded).
    Expression(Expr),
    Assignment {
        target: Target,
        value: Expr,
    },
    AugmentedAssignment {
        target: Target,
        operator: BinaryOperator,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef(Rc<FunctionDef>),
    Return(Option<Expr>),
    /// `import a [as b], ...`
    Import(Vec<ImportName>),
    /// `from module import a [as b], ...`
    ImportFrom {
        module: String,
        names: Vec<ImportName>,
    },
    Assert {
        test: Expr,
        message: Option<Expr>,
    },
    /// An assert after instrumentation; see [`crate::rewrite`].
    CheckedAssert(Box<AssertCheck>),
    /// `raise` or `raise expr`
    Raise(Option<Expr>),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        finalbody: Vec<Stmt>,
    },
    Pass,
    Break,
    Continue,
}

/// Left-hand side of an assignment or loop variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Subscript { value: Expr, index: Expr },
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportName {
    /// The name the import binds in the importing namespace.
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Exception kinds this handler catches; empty catches everything.
    pub kinds: Vec<String>,
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
}

/// An instrumented assertion: the original test plus what is needed to
/// explain a failure without re-parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertCheck {
    pub test: Expr,
    pub message: Option<Expr>,
    /// Literal source text of `test`.
    pub text: String,
    /// Present when `test` is a single binary comparison.
    pub comparison: Option<AssertComparison>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssertComparison {
    pub operator: CompareOperator,
    pub left: Expr,
    pub right: Expr,
    pub left_text: String,
    pub right_text: String,
}
