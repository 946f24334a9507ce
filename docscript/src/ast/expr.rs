use std::ops::Range;

use crate::ast::Target;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    /// Arithmetic negation: -x
    Negation,
    /// Unary plus: +x
    Identity,
    /// Logical not: not x
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    FloorDivision,
    Modulo,
    Power,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Addition => "+",
            BinaryOperator::Subtraction => "-",
            BinaryOperator::Multiplication => "*",
            BinaryOperator::Division => "/",
            BinaryOperator::FloorDivision => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOperator {
    Equality,
    Inequality,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Equality => "==",
            CompareOperator::Inequality => "!=",
            CompareOperator::LessThan => "<",
            CompareOperator::LessThanOrEqual => "<=",
            CompareOperator::GreaterThan => ">",
            CompareOperator::GreaterThanOrEqual => ">=",
            CompareOperator::In => "in",
            CompareOperator::NotIn => "not in",
            CompareOperator::Is => "is",
            CompareOperator::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// One piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    /// `{expr}` or `{expr!r}`; the flag is true for the repr conversion.
    Expression(Expr, bool),
}

/// An expression node together with the byte span it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Range<usize>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Range<usize>) -> Self {
        Expr { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    NoneLiteral,
    BooleanLiteral(bool),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    FString(Vec<FStringPart>),

    // Containers
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `[element for target in iter if condition]`
    ListComprehension {
        element: Box<Expr>,
        target: Box<Target>,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },

    // References
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    /// `lower:upper`, only valid inside a subscript.
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
    },

    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(String, Expr)>,
    },

    // Operations
    UnaryOperation {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Comparison {
        operator: CompareOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `body if test else orelse`
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
}
