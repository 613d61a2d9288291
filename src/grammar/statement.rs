use super::{
    lexer::{Source, Symbol, TokenKind},
    Parse, ParseRes, Parser, WantedSpec,
};
use crate::{
    ast::{Block, Expr, Statement, TypeName},
    error::Span,
};

impl<'source> Parse<'source> for (Statement<'source>, Span) {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parser.with_context("parsing statement", |parser| {
            Ok(
                match parser.expect_a_token(Some(WantedSpec::Description("statement")))? {
                    TokenKind::Identifier => {
                        let start = parser.current_token_span();
                        match parser.current_token_source() {
                            "if" => {
                                parser.accept_current();
                                if_statement(parser, start)?
                            }
                            "while" => {
                                parser.accept_current();
                                while_statement(parser, start)?
                            }
                            "return" => {
                                parser.accept_current();
                                let return_expr = if parser.peek_symbol(Symbol::Semicolon)? {
                                    None
                                } else {
                                    Some(parser.parse()?)
                                };
                                let end = parser.accept_symbol(Symbol::Semicolon)?;
                                (Statement::Return(return_expr), start.to(end))
                            }
                            _ if parser.peek_type_name()? => {
                                let (ty, name, init, span) = variable_declaration(parser)?;
                                (Statement::DeclareVar { ty, name, init }, span)
                            }
                            _ => single_expr(parser)?,
                        }
                    }
                    TokenKind::Symbol(Symbol::OpenBrace) => {
                        parser.parse().map(|(Block { statements }, block_span)| {
                            (Statement::Block(statements), block_span)
                        })?
                    }
                    _ => single_expr(parser)?,
                },
            )
        })
    }
}

/// `type name [= init];`, shared by locals and statics.
pub(super) fn variable_declaration<'source>(
    parser: &mut Parser<'source>,
) -> ParseRes<(
    TypeName<'source>,
    Source<'source>,
    Option<(Expr<'source>, Span)>,
    Span,
)> {
    parser.with_context("parsing variable declaration", |parser| {
        let ty: TypeName = parser.parse()?;
        let name: Source = parser.parse()?;
        let init = if parser.peek_symbol(Symbol::Equals)? {
            parser.accept_current();
            Some(parser.parse()?)
        } else {
            None
        };
        let end = parser.accept_symbol(Symbol::Semicolon)?;
        Ok((ty, name, init, ty.span.to(end)))
    })
}

fn single_expr<'source>(parser: &mut Parser<'source>) -> ParseRes<(Statement<'source>, Span)> {
    let expr: (Expr, Span) = parser.parse()?;
    let end = parser.accept_symbol(Symbol::Semicolon)?;
    let span = expr.1.to(end);
    Ok((Statement::SingleExpr(expr), span))
}

fn parenthesized_condition<'code>(parser: &mut Parser<'code>) -> ParseRes<(Expr<'code>, Span)> {
    parser.expect_symbol(Symbol::OpenParen)?;
    parser.accept_current();
    let condition = parser.parse()?;
    parser.expect_symbol(Symbol::CloseParen)?;
    parser.accept_current();
    Ok(condition)
}

fn if_statement<'code>(parser: &mut Parser<'code>, start: Span) -> ParseRes<(Statement<'code>, Span)> {
    let condition = parser.with_context(
        "parsing if statement's condition",
        parenthesized_condition,
    )?;

    let (true_branch, true_branch_span): (_, Span) = parser.parse()?;
    let mut end = true_branch_span;
    let false_branch = if parser.peek_keyword("else")? {
        parser.accept_current();
        let (stmt, span): (Statement, Span) = parser.parse()?;
        end = span;
        Some((Box::new(stmt), span))
    } else {
        None
    };

    Ok((
        Statement::If {
            condition,
            true_branch: (Box::new(true_branch), true_branch_span),
            false_branch,
        },
        start.to(end),
    ))
}

fn while_statement<'code>(
    parser: &mut Parser<'code>,
    start: Span,
) -> ParseRes<(Statement<'code>, Span)> {
    let condition = parser.with_context(
        "parsing while statement's condition",
        parenthesized_condition,
    )?;
    let (body, body_span): (Statement, Span) = parser.parse()?;
    Ok((
        Statement::While {
            condition,
            body: (Box::new(body), body_span),
        },
        start.to(body_span),
    ))
}
