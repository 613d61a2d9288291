use super::{lexer::Source, lexer::TokenKind, Parse, ParseErrorKind, ParseRes, Parser};
use super::{BUILTIN_TYPES, KEYWORDS};

/// A name being declared: a variable, parameter, field, function or struct.
impl<'source> Parse<'source> for Source<'source> {
    fn parse(parser: &mut Parser<'source>) -> ParseRes<Self> {
        parser.with_context("parsing identifier", |parser| {
            parser.expect_token(TokenKind::Identifier)?;
            let src = parser.current_token_source();
            if KEYWORDS.contains(&src) || BUILTIN_TYPES.contains(&src) {
                return parser.reject_current_token(ParseErrorKind::ReservedName(src.to_string()));
            }
            match parser.current_source() {
                Some(source) => {
                    parser.accept_current();
                    Ok(source)
                }
                None => parser.reject_current_token(ParseErrorKind::UnexpectedEOF { wanted: None }),
            }
        })
    }
}
