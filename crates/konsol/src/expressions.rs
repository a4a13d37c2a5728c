use std::str::FromStr;

use crate::parse::Span;

/// A literal value known at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    /// A string literal with no interpolation segments.
    Str(String),
}

/// One segment of a double-quoted string literal.
///
/// `"#{expr}"` segments are parsed into full expressions so evaluation can
/// splice their display form between the surrounding text runs.
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Text(String),
    Interp(ExprLoc),
}

/// Builtin functions callable from snippets.
///
/// The set is closed; an identifier matching one of these names is resolved
/// to a builtin call at parse time and cannot be rebound as a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Builtin {
    Puts,
    Print,
    P,
    Warn,
    Raise,
}

impl Builtin {
    /// Resolves an identifier to a builtin, if it names one.
    pub(crate) fn resolve(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CmpOperator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Double-quoted string with at least one `#{...}` segment.
    StrInterp(Vec<StrPart>),
    /// A variable reference, resolved against the session bindings at runtime.
    Name(String),
    /// Plain assignment; evaluates to the assigned value.
    Assign {
        name: String,
        value: Box<ExprLoc>,
    },
    /// Compound assignment (`+=`, `-=`, `*=`, `/=`).
    OpAssign {
        name: String,
        op: Operator,
        value: Box<ExprLoc>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    Op {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    CmpOp {
        left: Box<ExprLoc>,
        op: CmpOperator,
        right: Box<ExprLoc>,
    },
    /// Short-circuit `&&`.
    And {
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    /// Short-circuit `||`.
    Or {
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    Array(Vec<ExprLoc>),
    /// Subscript access (`arr[0]`, `"abc"[1]`).
    Index {
        object: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    /// Builtin call, with or without parentheses (`puts "hi"` / `puts("hi")`).
    Call {
        builtin: Builtin,
        args: Vec<ExprLoc>,
    },
}

/// An expression together with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprLoc {
    pub expr: Expr,
    pub span: Span,
}

impl ExprLoc {
    pub(crate) fn new(expr: Expr, span: Span) -> Self {
        Self { expr, span }
    }
}

/// A parsed snippet: a sequence of expression statements.
///
/// The value of a snippet is the value of its last statement; an empty
/// snippet evaluates to nil.
pub type Program = Vec<ExprLoc>;
