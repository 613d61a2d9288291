use super::lexer::{Source, Symbol, TokenKind};
use super::{Parse, ParseErrorKind, ParseRes, Parser, WantedSpec, KEYWORDS};
use crate::ast::{
    ArithmeticOp, Associativity, BinaryOp, Expr, LogicOp, Precedence, RelationalOp, UnaryOp,
};
use crate::error::Span;
use crate::grammar::lexer::LexErrorKind;

impl<'source> Parse<'source> for (Expr<'source>, Span) {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parse_unary(parser)
            .and_then(|lhs| {
                parse_binary_expression(parser, lhs, Precedence::Assignment)
                    .map_err(|e| e.add_context("parsing binary expression"))
            })
            .map_err(|x| x.add_context("parsing expression"))
    }
}

// prefix operators, then a postfix chain
fn parse_unary<'source>(parser: &mut Parser<'source>) -> ParseRes<(Expr<'source>, Span)> {
    let mut ops = Vec::new();
    while let Some(op) = parser
        .peek_token()?
        .and_then(TokenKind::as_symbol)
        .and_then(unary_operator)
    {
        ops.push((op, parser.current_token_span()));
        parser.accept_current();
    }
    let mut expr = parse_postfix(parser)?;
    for (operator, op_span) in ops.into_iter().rev() {
        let span = op_span.to(expr.1);
        expr = (
            Expr::Unary {
                operator,
                expr: (Box::new(expr.0), expr.1),
            },
            span,
        );
    }
    Ok(expr)
}

const fn unary_operator(symbol: Symbol) -> Option<UnaryOp> {
    match symbol {
        Symbol::Minus => Some(UnaryOp::Negate),
        Symbol::Bang => Some(UnaryOp::Not),
        _ => None,
    }
}

fn parse_postfix<'source>(parser: &mut Parser<'source>) -> ParseRes<(Expr<'source>, Span)> {
    let mut expr = parse_primary(parser)?;
    loop {
        let symbol = parser.peek_token()?.and_then(TokenKind::as_symbol);
        expr = match symbol {
            Some(Symbol::OpenParen) => {
                parser.accept_current();
                let args = parser.with_context("parsing call arguments", parse_arguments)?;
                let end = parser.accept_symbol(Symbol::CloseParen)?;
                let span = expr.1.to(end);
                (
                    Expr::Call {
                        function: (Box::new(expr.0), expr.1),
                        args,
                    },
                    span,
                )
            }
            Some(Symbol::Dot) => {
                parser.accept_current();
                let field: Source = parser.parse()?;
                let span = expr.1.to(field.span);
                (
                    Expr::Field {
                        base: (Box::new(expr.0), expr.1),
                        field,
                    },
                    span,
                )
            }
            Some(Symbol::Ampersand) => {
                let span = expr.1.to(parser.current_token_span());
                parser.accept_current();
                (Expr::AddressOf((Box::new(expr.0), expr.1)), span)
            }
            Some(Symbol::At) => {
                let span = expr.1.to(parser.current_token_span());
                parser.accept_current();
                (Expr::Dereference((Box::new(expr.0), expr.1)), span)
            }
            _ => break,
        };
    }
    Ok(expr)
}

fn parse_arguments<'source>(parser: &mut Parser<'source>) -> ParseRes<Vec<(Expr<'source>, Span)>> {
    let mut args = Vec::new();
    if parser.peek_symbol(Symbol::CloseParen)? {
        return Ok(args);
    }
    loop {
        args.push(parser.parse()?);
        if parser.peek_symbol(Symbol::Comma)? {
            parser.accept_current();
        } else {
            return Ok(args);
        }
    }
}

// literals, names, `sizeof` and parenthesis
fn parse_primary<'source>(parser: &mut Parser<'source>) -> ParseRes<(Expr<'source>, Span)> {
    parser.with_context("parsing primary expression", |parser| {
        match parser.expect_a_token(Some(WantedSpec::Description("expression")))? {
            TokenKind::Symbol(Symbol::OpenParen) => {
                let start = parser.current_token_span();
                parser.accept_current();
                let (e, _) = parser.parse()?;
                let end = parser
                    .accept_symbol(Symbol::CloseParen)
                    .map_err(|x| x.add_context("as the end of the expression"))?;
                Ok((e, start.to(end)))
            }
            TokenKind::Integer => {
                let span = parser.current_token_span();
                let num = match parser.current_token_source().parse() {
                    Ok(num) => num,
                    Err(_) => {
                        return parser.reject_current_token(ParseErrorKind::LexError(
                            LexErrorKind::IntegerOutOfRange,
                        ))
                    }
                };
                parser.accept_current();
                Ok((Expr::Integer(num), span))
            }
            TokenKind::Float => {
                let span = parser.current_token_span();
                let num = match parser.current_token_source().parse() {
                    Ok(num) => num,
                    Err(_) => {
                        return parser
                            .reject_current_token(ParseErrorKind::LexError(LexErrorKind::InvalidFloat))
                    }
                };
                parser.accept_current();
                Ok((Expr::Float(num), span))
            }
            TokenKind::String => {
                let span = parser.current_token_span();
                let content = parser.current_token_source();
                parser.accept_current();
                Ok((Expr::String(content), span))
            }
            TokenKind::Identifier => {
                let source = parser.current_token_source();
                let start = parser.current_token_span();
                if source == "sizeof" {
                    parser.accept_current();
                    parser.expect_symbol(Symbol::OpenParen)?;
                    parser.accept_current();
                    let (inner, inner_span) = parser.parse()?;
                    let end = parser.accept_symbol(Symbol::CloseParen)?;
                    return Ok((
                        Expr::SizeOf((Box::new(inner), inner_span)),
                        start.to(end),
                    ));
                }
                if KEYWORDS.contains(&source) {
                    return parser.reject_current_token(ParseErrorKind::ReservedName(
                        source.to_string(),
                    ));
                }
                parser.accept_current();
                Ok((Expr::Variable(source), start))
            }
            tok => parser.reject_current_token(ParseErrorKind::Expected {
                found: tok,
                wanted: WantedSpec::Description("open paren, identifier or literal"),
            }),
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Binary(BinaryOp),
    /// `=` or one of the compound assignments
    Assign(Option<ArithmeticOp>),
}

impl Operator {
    const fn precedence(self) -> Precedence {
        match self {
            Self::Binary(op) => op.precedence(),
            Self::Assign(_) => Precedence::Assignment,
        }
    }

    const fn associativity(self) -> Associativity {
        match self {
            Self::Binary(_) => Associativity::Left,
            Self::Assign(_) => Associativity::Right,
        }
    }

    fn build<'code>(
        self,
        (lhs_expr, lhs_span): (Expr<'code>, Span),
        (rhs_expr, rhs_span): (Expr<'code>, Span),
    ) -> Expr<'code> {
        match self {
            Self::Binary(operator) => Expr::Binary {
                operator,
                lhs: (Box::new(lhs_expr), lhs_span),
                rhs: (Box::new(rhs_expr), rhs_span),
            },
            Self::Assign(operator) => Expr::Assign {
                operator,
                destination: (Box::new(lhs_expr), lhs_span),
                value: (Box::new(rhs_expr), rhs_span),
            },
        }
    }
}

fn peek_operator(parser: &mut Parser) -> ParseRes<Option<Operator>> {
    use ArithmeticOp::*;
    use RelationalOp::*;
    Ok(match parser.peek_token()? {
        Some(TokenKind::Symbol(symbol)) => match symbol {
            Symbol::Plus => Some(Operator::Binary(BinaryOp::Arithmetic(Add))),
            Symbol::Minus => Some(Operator::Binary(BinaryOp::Arithmetic(Sub))),
            Symbol::Star => Some(Operator::Binary(BinaryOp::Arithmetic(Mul))),
            Symbol::Slash => Some(Operator::Binary(BinaryOp::Arithmetic(Div))),
            Symbol::DoubleEquals => Some(Operator::Binary(BinaryOp::Relational(Equals))),
            Symbol::NotEquals => Some(Operator::Binary(BinaryOp::Relational(NotEquals))),
            Symbol::Greater => Some(Operator::Binary(BinaryOp::Relational(Greater))),
            Symbol::Less => Some(Operator::Binary(BinaryOp::Relational(Less))),
            Symbol::GreaterEquals => Some(Operator::Binary(BinaryOp::Relational(GreaterEqual))),
            Symbol::LessEquals => Some(Operator::Binary(BinaryOp::Relational(LessEqual))),
            Symbol::Equals => Some(Operator::Assign(None)),
            Symbol::PlusEquals => Some(Operator::Assign(Some(Add))),
            Symbol::MinusEquals => Some(Operator::Assign(Some(Sub))),
            Symbol::StarEquals => Some(Operator::Assign(Some(Mul))),
            Symbol::SlashEquals => Some(Operator::Assign(Some(Div))),
            _ => None,
        },
        Some(TokenKind::Identifier) => match parser.current_token_source() {
            "and" => Some(Operator::Binary(BinaryOp::Logic(LogicOp::And))),
            "or" => Some(Operator::Binary(BinaryOp::Logic(LogicOp::Or))),
            _ => None,
        },
        _ => None,
    })
}

fn parse_binary_expression<'source>(
    parser: &mut Parser<'source>,
    mut lhs: (Expr<'source>, Span),
    min_precedence: Precedence,
) -> ParseRes<(Expr<'source>, Span)> {
    while let Some(op) = peek_operator(parser)?.filter(|op| op.precedence() >= min_precedence) {
        parser.accept_current();
        let mut rhs = parse_unary(parser)?;
        let this_precedence = op.precedence();
        while let Some(next) = peek_operator(parser)?.filter(|next| {
            let other_precedence = next.precedence();
            other_precedence > this_precedence
                || (next.associativity() == Associativity::Right
                    && other_precedence == this_precedence)
        }) {
            let next_min = if next.precedence() > this_precedence {
                this_precedence.next()
            } else {
                this_precedence
            };
            rhs = parse_binary_expression(parser, rhs, next_min)?;
        }
        let span = lhs.1.to(rhs.1);
        lhs = (op.build(lhs, rhs), span);
    }
    Ok(lhs)
}
