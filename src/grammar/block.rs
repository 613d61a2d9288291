use super::{lexer::Symbol, lexer::TokenKind, Parse, ParseRes, Parser};
use crate::{ast::Block, error::Span};

impl<'source> Parse<'source> for (Block<'source>, Span) {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parser.with_context("parsing statement block", |parser| {
            let start = parser.accept_symbol(Symbol::OpenBrace)?;

            let mut statements = Vec::new();

            while parser.peek_token()? != Some(TokenKind::Symbol(Symbol::CloseBrace)) {
                statements.push(parser.parse()?);
            }

            let end = parser.accept_symbol(Symbol::CloseBrace)?;

            Ok((Block { statements }, start.to(end)))
        })
    }
}
