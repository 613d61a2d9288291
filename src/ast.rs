//! Syntax tree of a script. Every child node carries the span it was parsed from.
use crate::error::Span;
use crate::grammar::lexer::Source;

#[derive(Debug, Default)]
pub struct Program<'source> {
    pub structs: Vec<StructDecl<'source>>,
    pub functions: Vec<Function<'source>>,
    pub statics: Vec<StaticDecl<'source>>,
    /// Statements written outside of any function, run in order at startup.
    pub body: Vec<(Statement<'source>, Span)>,
}

/// A type as written in the source: a base name followed by `&`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeName<'source> {
    pub name: &'source str,
    pub references: usize,
    pub span: Span,
}

#[derive(Debug)]
pub struct StructDecl<'source> {
    pub name: Source<'source>,
    pub fields: Vec<(TypeName<'source>, Source<'source>)>,
    pub methods: Vec<Function<'source>>,
}

#[derive(Debug)]
pub struct Function<'source> {
    pub name: Source<'source>,
    pub return_type: TypeName<'source>,
    pub params: Vec<(TypeName<'source>, Source<'source>)>,
    pub body: Block<'source>,
}

#[derive(Debug)]
pub struct StaticDecl<'source> {
    pub ty: TypeName<'source>,
    pub name: Source<'source>,
    pub init: Option<(Expr<'source>, Span)>,
}

#[derive(Debug)]
pub struct Block<'source> {
    pub statements: Vec<(Statement<'source>, Span)>,
}

#[derive(Debug)]
pub enum Statement<'source> {
    Return(Option<(Expr<'source>, Span)>),
    SingleExpr((Expr<'source>, Span)),
    DeclareVar {
        ty: TypeName<'source>,
        name: Source<'source>,
        init: Option<(Expr<'source>, Span)>,
    },
    Block(Vec<(Statement<'source>, Span)>),
    If {
        condition: (Expr<'source>, Span),
        true_branch: (Box<Statement<'source>>, Span),
        false_branch: Option<(Box<Statement<'source>>, Span)>,
    },
    While {
        condition: (Expr<'source>, Span),
        body: (Box<Statement<'source>>, Span),
    },
}

#[derive(Debug, PartialEq)]
pub enum Expr<'source> {
    Integer(i32),
    Float(f32),
    String(&'source str),
    Variable(&'source str),
    Call {
        /// Either a variable naming a free function or a field access naming a method
        function: (Box<Expr<'source>>, Span),
        args: Vec<(Expr<'source>, Span)>,
    },
    Binary {
        operator: BinaryOp,
        lhs: (Box<Expr<'source>>, Span),
        rhs: (Box<Expr<'source>>, Span),
    },
    Unary {
        operator: UnaryOp,
        expr: (Box<Expr<'source>>, Span),
    },
    Assign {
        /// `None` for plain `=`, the arithmetic for compound assignments
        operator: Option<ArithmeticOp>,
        destination: (Box<Expr<'source>>, Span),
        value: (Box<Expr<'source>>, Span),
    },
    Field {
        base: (Box<Expr<'source>>, Span),
        field: Source<'source>,
    },
    AddressOf((Box<Expr<'source>>, Span)),
    Dereference((Box<Expr<'source>>, Span)),
    SizeOf((Box<Expr<'source>>, Span)),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-a`
    Negate,
    /// `!a`, 1 when `a` is 0 and 0 otherwise
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Relational(RelationalOp),
    Logic(LogicOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalOp {
    Equals,
    NotEquals,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

/// Short-circuiting logic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// Binding strength of operators, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

impl BinaryOp {
    pub const fn precedence(self) -> Precedence {
        match self {
            Self::Logic(LogicOp::Or) => Precedence::Or,
            Self::Logic(LogicOp::And) => Precedence::And,
            Self::Relational(RelationalOp::Equals | RelationalOp::NotEquals) => {
                Precedence::Equality
            }
            Self::Relational(_) => Precedence::Comparison,
            Self::Arithmetic(ArithmeticOp::Add | ArithmeticOp::Sub) => Precedence::Term,
            Self::Arithmetic(ArithmeticOp::Mul | ArithmeticOp::Div) => Precedence::Factor,
        }
    }
}

impl Precedence {
    /// The next tighter level.
    pub const fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary | Self::Call => Self::Call,
        }
    }
}

impl Statement<'_> {
    /// Whether every path through the statement ends in a `return`.
    pub fn always_returns(&self) -> bool {
        match self {
            Self::Return(_) => true,
            Self::Block(statements) => statements.iter().any(|(stmt, _)| stmt.always_returns()),
            Self::If {
                true_branch,
                false_branch: Some(false_branch),
                ..
            } => true_branch.0.always_returns() && false_branch.0.always_returns(),
            Self::If { .. } | Self::While { .. } | Self::SingleExpr(_) | Self::DeclareVar { .. } => {
                false
            }
        }
    }
}
