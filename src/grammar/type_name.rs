use super::{lexer::Symbol, Parse, ParseErrorKind, ParseRes, Parser, WantedSpec};
use crate::ast::TypeName;

impl<'source> Parse<'source> for TypeName<'source> {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parser.with_context("parsing type", |parser| {
            if !parser.peek_type_name()? {
                let found = parser.expect_a_token(Some(WantedSpec::Description("type name")))?;
                return parser.reject_current_token(ParseErrorKind::Expected {
                    wanted: WantedSpec::Description("type name"),
                    found,
                });
            }
            let name = parser.current_token_source();
            let mut span = parser.current_token_span();
            parser.accept_current();
            let mut references = 0;
            while parser.peek_symbol(Symbol::Ampersand)? {
                span = span.to(parser.current_token_span());
                parser.accept_current();
                references += 1;
            }
            Ok(TypeName {
                name,
                references,
                span,
            })
        })
    }
}
