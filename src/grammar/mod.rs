use std::collections::HashSet;

use crate::error::*;

mod block;
mod expr;
mod function;
mod identifier;
pub mod lexer;
mod program;
mod statement;
mod type_name;

use lexer::*;

/// Words that can't be used as names.
pub const KEYWORDS: &[&str] = &[
    "struct", "func", "static", "return", "if", "else", "while", "sizeof", "and", "or",
];

/// Names of the types every script knows about.
pub const BUILTIN_TYPES: &[&str] = &["int", "float", "ptr", "void"];

pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current_tok: Option<Token<'source>>,
    /// Every name that starts a type: builtins plus the structs declared so far.
    type_names: HashSet<&'source str>,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source SourceMetadata<'source>) -> Self {
        Self {
            lexer: Lexer::new(source),
            current_tok: None,
            type_names: BUILTIN_TYPES.iter().copied().collect(),
        }
    }

    pub fn peek_token(&mut self) -> ParseRes<Option<TokenKind>> {
        if self.current_tok.is_none() {
            let next_tok_opt = self
                .lexer
                .next_token()
                .map_err(|e| e.map_kind(ParseErrorKind::LexError))?;
            self.current_tok = next_tok_opt;
        }
        Ok(self.current_tok.as_ref().map(|x| x.kind))
    }
    /// Span of the current token, or of the end of input when there is none.
    pub fn current_token_span(&self) -> Span {
        self.current_tok.as_ref().map_or_else(
            || Span::new(self.lexer.get_metadata().input().len()),
            |x| x.source.span,
        )
    }
    pub fn current_token_source(&self) -> &'source str {
        self.current_tok.as_ref().map_or("", |x| x.source.source)
    }
    pub fn current_source(&self) -> Option<Source<'source>> {
        self.current_tok.as_ref().map(|x| x.source)
    }
    pub fn accept_current(&mut self) {
        self.current_tok = None;
    }
    pub fn emit_error_at<T>(&self, span: Span, kind: ParseErrorKind) -> ParseRes<T> {
        Err(ParseError::new(kind).with_source(span, self.lexer.get_metadata()))
    }
    pub fn expect_a_token(&mut self, wanted: Option<WantedSpec<TokenKind>>) -> ParseRes<TokenKind> {
        let span = self.lexer.current_span();
        self.peek_token()?.map_or_else(
            || self.emit_error_at(span, ParseErrorKind::UnexpectedEOF { wanted }),
            Ok,
        )
    }
    pub fn reject_current_token<T>(&self, reason: ParseErrorKind) -> ParseRes<T> {
        let span = self.current_token_span();
        self.emit_error_at(span, reason)
    }
    pub fn expect_token(&mut self, kind: TokenKind) -> ParseRes<()> {
        self.expect_a_token(Some(WantedSpec::Specific(kind)))
            .and_then(|tok| {
                if tok != kind {
                    self.reject_current_token(ParseErrorKind::Expected {
                        wanted: WantedSpec::Specific(kind),
                        found: tok,
                    })
                } else {
                    Ok(())
                }
            })
    }
    pub fn expect_symbol(&mut self, symbol: Symbol) -> ParseRes<()> {
        self.expect_token(TokenKind::Symbol(symbol))
    }
    /// Expects `symbol` and consumes it, returning its span.
    pub fn accept_symbol(&mut self, symbol: Symbol) -> ParseRes<Span> {
        self.expect_symbol(symbol)?;
        let span = self.current_token_span();
        self.accept_current();
        Ok(span)
    }
    pub fn keyword(&mut self, kw: &'static str) -> ParseRes<()> {
        self.expect_token(TokenKind::Identifier)
            .map_err(|e| e.add_context("parsing keyword"))?;
        let src = self.current_token_source();
        if src != kw {
            self.reject_current_token(ParseErrorKind::Expected {
                wanted: WantedSpec::Description(kw),
                found: TokenKind::Identifier,
            })
        } else {
            self.accept_current();
            Ok(())
        }
    }
    /// Whether the next token is the identifier `kw`. Nothing is consumed.
    pub fn peek_keyword(&mut self, kw: &str) -> ParseRes<bool> {
        Ok(self.peek_token()? == Some(TokenKind::Identifier) && self.current_token_source() == kw)
    }
    pub fn peek_symbol(&mut self, symbol: Symbol) -> ParseRes<bool> {
        Ok(self.peek_token()? == Some(TokenKind::Symbol(symbol)))
    }
    /// Whether the next token names a type, which starts a declaration.
    pub fn peek_type_name(&mut self) -> ParseRes<bool> {
        Ok(self.peek_token()? == Some(TokenKind::Identifier)
            && self.type_names.contains(self.current_token_source()))
    }
    pub fn declare_type(&mut self, name: &'source str) {
        self.type_names.insert(name);
    }
    pub fn parse<T>(&mut self) -> ParseRes<T>
    where
        T: Parse<'source>,
    {
        T::parse(self)
    }
    pub fn with_context<F, T>(&mut self, context: &'static str, mut cont: F) -> ParseRes<T>
    where
        F: FnMut(&mut Self) -> ParseRes<T>,
    {
        cont(self).map_err(|x| x.add_context(context))
    }
}

pub type ParseRes<T> = Result<T, ParseError>;
pub type ParseError = Error<ParseErrorKind>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    LexError(LexErrorKind),
    Expected {
        wanted: WantedSpec<TokenKind>,
        found: TokenKind,
    },
    UnexpectedEOF {
        wanted: Option<WantedSpec<TokenKind>>,
    },
    ReservedName(String),
}

pub trait Parse<'source>: Sized {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self>;
}

use std::error;
impl error::Error for ParseErrorKind {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        if let Self::LexError(err) = self {
            Some(err)
        } else {
            None
        }
    }
}

use std::fmt;
impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LexError(err) => write!(f, "error while lexing source: {}", err),
            Self::UnexpectedEOF { wanted } => {
                write!(f, "unexpected end of input")?;
                if let Some(wanted) = wanted {
                    write!(f, ", expected {}", wanted)
                } else {
                    Ok(())
                }
            }
            Self::Expected { wanted, found } => {
                write!(f, "expected {}, but found instead {}", wanted, found)
            }
            Self::ReservedName(name) => {
                write!(f, "{:?} is reserved and can't be used as a name", name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn parse_program(source: &'static str) -> ParseRes<Program<'static>> {
        let meta: &'static SourceMetadata = Box::leak(Box::new(SourceMetadata::new(source)));
        Parser::new(meta).parse()
    }

    fn returned_expr<'a>(program: &'a Program<'static>) -> &'a Expr<'static> {
        match program.body.last() {
            Some((Statement::Return(Some((expr, _))), _)) => expr,
            other => panic!("expected a return statement, found {other:?}"),
        }
    }

    fn binary<'a, 's>(expr: &'a Expr<'s>) -> (BinaryOp, &'a Expr<'s>, &'a Expr<'s>) {
        match expr {
            Expr::Binary { operator, lhs, rhs } => (*operator, &*lhs.0, &*rhs.0),
            other => panic!("expected a binary expression, found {other:?}"),
        }
    }

    #[test]
    fn factor_binds_tighter_than_term() -> anyhow::Result<()> {
        let program = parse_program("return a - b * c + d;")?;
        // (a - (b * c)) + d
        let (op, lhs, rhs) = binary(returned_expr(&program));
        assert_eq!(op, BinaryOp::Arithmetic(ArithmeticOp::Add));
        assert_eq!(rhs, &Expr::Variable("d"));
        let (op, a, product) = binary(lhs);
        assert_eq!(op, BinaryOp::Arithmetic(ArithmeticOp::Sub));
        assert_eq!(a, &Expr::Variable("a"));
        let (op, _, _) = binary(product);
        assert_eq!(op, BinaryOp::Arithmetic(ArithmeticOp::Mul));
        Ok(())
    }

    #[test]
    fn comparison_and_logic_levels() -> anyhow::Result<()> {
        let program = parse_program("return a < b and c == d or e;")?;
        let (op, lhs, _) = binary(returned_expr(&program));
        assert_eq!(op, BinaryOp::Logic(LogicOp::Or));
        let (op, lt, eq) = binary(lhs);
        assert_eq!(op, BinaryOp::Logic(LogicOp::And));
        assert_eq!(binary(lt).0, BinaryOp::Relational(RelationalOp::Less));
        assert_eq!(binary(eq).0, BinaryOp::Relational(RelationalOp::Equals));
        Ok(())
    }

    #[test]
    fn assignment_is_right_associative() -> anyhow::Result<()> {
        let program = parse_program("int a; int b; a = b = 3;")?;
        let expr = match program.body.last() {
            Some((Statement::SingleExpr((expr, _)), _)) => expr,
            other => panic!("unexpected {other:?}"),
        };
        match expr {
            Expr::Assign {
                operator: None,
                destination,
                value,
            } => {
                assert_eq!(*destination.0, Expr::Variable("a"));
                assert!(matches!(*value.0, Expr::Assign { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn postfix_chain() -> anyhow::Result<()> {
        let program = parse_program("return -p@.next.value(1, 2)&;")?;
        let expr = returned_expr(&program);
        let inner = match expr {
            Expr::Unary {
                operator: UnaryOp::Negate,
                expr,
            } => &expr.0,
            other => panic!("unexpected {other:?}"),
        };
        let call = match &**inner {
            Expr::AddressOf(call) => &call.0,
            other => panic!("unexpected {other:?}"),
        };
        match &**call {
            Expr::Call { function, args } => {
                assert_eq!(args.len(), 2);
                assert!(
                    matches!(&*function.0, Expr::Field { field, .. } if field.source == "value")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn declarations_need_known_types() -> anyhow::Result<()> {
        let program = parse_program(
            "struct Point { int x; int y; func int sum() { return this@.x + this@.y; } }
             Point p;
             Point& q = p&;
             static int counter = 0;
             func void bump() { counter += 1; }",
        )?;
        assert_eq!(program.structs.len(), 1);
        assert_eq!(program.structs[0].fields.len(), 2);
        assert_eq!(program.structs[0].methods.len(), 1);
        assert_eq!(program.statics.len(), 1);
        assert_eq!(program.functions.len(), 1);
        assert!(matches!(
            &program.body[1].0,
            Statement::DeclareVar { ty, .. } if ty.name == "Point" && ty.references == 1
        ));
        Ok(())
    }

    #[test]
    fn if_else_and_while() -> anyhow::Result<()> {
        let program = parse_program(
            "int i = 0; while (i < 10) { if (i == 3) i = 7; else { i += 1; } } return i;",
        )?;
        assert_eq!(program.body.len(), 3);
        match &program.body[1].0 {
            Statement::While { body, .. } => match &*body.0 {
                Statement::Block(statements) => assert!(matches!(
                    statements[0].0,
                    Statement::If {
                        false_branch: Some(_),
                        ..
                    }
                )),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_semicolon_reports_position_and_context() {
        let err = parse_program("int a = 1;\nreturn a\n").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnexpectedEOF { .. }));
        assert_eq!(err.position().map(|p| p.line), Some(3));
        assert!(err.contexts().contains(&"parsing statement"));
    }

    #[test]
    fn unexpected_token() {
        let err = parse_program("return (1 + ;").unwrap_err();
        assert!(matches!(
            err.kind,
            ParseErrorKind::Expected {
                found: TokenKind::Symbol(Symbol::Semicolon),
                ..
            }
        ));
        assert_eq!(
            err.position(),
            Some(Position { line: 1, col: 13 })
        );
    }

    #[test]
    fn keywords_are_not_names() {
        let err = parse_program("int while = 3;").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ReservedName("while".to_string()));
    }

    #[test]
    fn lex_errors_surface_through_the_parser() {
        let err = parse_program("return 'abc;").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::LexError(LexErrorKind::UnterminatedString)
        );
    }
}
