use super::{
    lexer::{Source, Symbol},
    Parse, ParseRes, Parser,
};
use crate::ast::{Block, Function, TypeName};
use crate::error::Span;

/// `func <type> name(<type> param, ...) { ... }`
impl<'source> Parse<'source> for Function<'source> {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parser.with_context("parsing function", |parser| {
            parser.keyword("func")?;
            let return_type: TypeName = parser.parse()?;
            let name: Source = parser.parse()?;
            parser.accept_symbol(Symbol::OpenParen)?;

            let mut params = Vec::new();
            if !parser.peek_symbol(Symbol::CloseParen)? {
                loop {
                    let ty: TypeName = parser.parse()?;
                    let param: Source = parser.parse()?;
                    params.push((ty, param));
                    if parser.peek_symbol(Symbol::Comma)? {
                        parser.accept_current();
                    } else {
                        break;
                    }
                }
            }

            parser.accept_symbol(Symbol::CloseParen)?;

            let (body, _): (Block, Span) = parser.parse()?;

            Ok(Self {
                name,
                return_type,
                params,
                body,
            })
        })
    }
}
