use crate::error::{self, Position, SourceMetadata, Span, WantedSpec};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    #[error("unexpected {found:?}, expected {wanted}")]
    Expected {
        wanted: WantedSpec<char>,
        found: char,
    },
    #[error("unexpected {0:?}")]
    UnexpectedChar(char),
    #[error("non-terminated string")]
    UnterminatedString,
    #[error("integer literal out of range")]
    IntegerOutOfRange,
    #[error("malformed float literal")]
    InvalidFloat,
}

pub type LexError = error::Error<LexErrorKind>;

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Identifier => write!(f, "identifier"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Symbol(symbol) => write!(f, "`{}`", symbol),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct LexerIter<'a> {
    lexer: Lexer<'a>,
    eof: bool,
}

impl<'a> Iterator for LexerIter<'a> {
    type Item = Result<Token<'a>, LexError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.eof {
            None
        } else {
            let next = self.lexer.next_token();
            if matches!(next, Ok(None) | Err(_)) {
                self.eof = true;
            }
            next.transpose()
        }
    }
}

impl<'a> std::iter::FusedIterator for LexerIter<'a> {}

impl<'a> IntoIterator for Lexer<'a> {
    type IntoIter = LexerIter<'a>;
    type Item = <Self::IntoIter as Iterator>::Item;
    fn into_iter(self) -> Self::IntoIter {
        LexerIter {
            lexer: self,
            eof: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub source: Source<'a>,
}

impl<'a> Token<'a> {
    pub const fn new(kind: TokenKind, source: Source<'a>) -> Self {
        Self { kind, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    Float,
    /// The source of a string token is its content, without the delimiters.
    String,
    Symbol(Symbol),
}

impl TokenKind {
    pub const fn as_symbol(self) -> Option<Symbol> {
        if let TokenKind::Symbol(symbol) = self {
            Some(symbol)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Plus,
    Minus,
    Star,
    Slash,
    Equals,
    Semicolon,
    Less,
    Greater,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Dot,
    Comma,
    /// Postfix address-of
    Ampersand,
    /// Postfix dereference
    At,
    Bang,
    PlusEquals,
    PlusPlus,
    MinusEquals,
    MinusMinus,
    StarEquals,
    StarStar,
    SlashEquals,
    SlashSlash,
    GreaterEquals,
    ShiftRight,
    LessEquals,
    ShiftLeft,
    DoubleEquals,
    NotEquals,
}

impl Symbol {
    fn single(ch: char) -> Option<Self> {
        Some(match ch {
            '+' => Self::Plus,
            '-' => Self::Minus,
            '*' => Self::Star,
            '/' => Self::Slash,
            '=' => Self::Equals,
            ';' => Self::Semicolon,
            '<' => Self::Less,
            '>' => Self::Greater,
            '[' => Self::OpenBracket,
            ']' => Self::CloseBracket,
            '{' => Self::OpenBrace,
            '}' => Self::CloseBrace,
            '(' => Self::OpenParen,
            ')' => Self::CloseParen,
            '.' => Self::Dot,
            ',' => Self::Comma,
            '&' => Self::Ampersand,
            '@' => Self::At,
            '!' => Self::Bang,
            _ => return None,
        })
    }

    /// The two-character symbol formed by `self` followed by `next`, if any.
    fn follow(self, next: char) -> Option<Self> {
        Some(match (self, next) {
            (Self::Plus, '=') => Self::PlusEquals,
            (Self::Plus, '+') => Self::PlusPlus,
            (Self::Minus, '=') => Self::MinusEquals,
            (Self::Minus, '-') => Self::MinusMinus,
            (Self::Star, '=') => Self::StarEquals,
            (Self::Star, '*') => Self::StarStar,
            (Self::Slash, '=') => Self::SlashEquals,
            (Self::Slash, '/') => Self::SlashSlash,
            (Self::Greater, '=') => Self::GreaterEquals,
            (Self::Greater, '>') => Self::ShiftRight,
            (Self::Less, '=') => Self::LessEquals,
            (Self::Less, '<') => Self::ShiftLeft,
            (Self::Equals, '=') => Self::DoubleEquals,
            (Self::Bang, '=') => Self::NotEquals,
            _ => return None,
        })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Equals => "=",
            Self::Semicolon => ";",
            Self::Less => "<",
            Self::Greater => ">",
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::OpenBrace => "{",
            Self::CloseBrace => "}",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::Dot => ".",
            Self::Comma => ",",
            Self::Ampersand => "&",
            Self::At => "@",
            Self::Bang => "!",
            Self::PlusEquals => "+=",
            Self::PlusPlus => "++",
            Self::MinusEquals => "-=",
            Self::MinusMinus => "--",
            Self::StarEquals => "*=",
            Self::StarStar => "**",
            Self::SlashEquals => "/=",
            Self::SlashSlash => "//",
            Self::GreaterEquals => ">=",
            Self::ShiftRight => ">>",
            Self::LessEquals => "<=",
            Self::ShiftLeft => "<<",
            Self::DoubleEquals => "==",
            Self::NotEquals => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source<'source> {
    pub span: Span,
    pub position: Position,
    pub source: &'source str,
}

impl From<Source<'_>> for Span {
    fn from(s: Source<'_>) -> Self {
        s.span
    }
}

pub struct Lexer<'a> {
    input: std::iter::Peekable<std::str::CharIndices<'a>>,
    metadata: &'a SourceMetadata<'a>,
    position: Position,
}

impl<'source> Lexer<'source> {
    pub fn new(input: &'source SourceMetadata<'source>) -> Self {
        Self {
            input: input.input().char_indices().peekable(),
            metadata: input,
            position: Position::default(),
        }
    }

    /// Produces the next token, `None` at the end of the input.
    pub fn next_token(&mut self) -> Result<Option<Token<'source>>, LexError> {
        self.skip_trivia();
        let (start, ch) = match self.input.peek().copied() {
            None => return Ok(None),
            Some(next) => next,
        };
        let position = self.position;
        if ch == '\'' || ch == '"' {
            return self.string(start, ch, position).map(Some);
        }
        if ch.is_ascii_alphabetic() {
            self.skip_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let source = self.source_until_current(start, position);
            return Ok(Some(Token::new(TokenKind::Identifier, source)));
        }
        if ch.is_ascii_digit() {
            return self
                .number(start, position)
                .map(Some)
                .map_err(|e| e.add_context("number"));
        }
        if let Some(symbol) = Symbol::single(ch) {
            self.advance();
            let symbol = match self.input.peek().and_then(|&(_, next)| symbol.follow(next)) {
                Some(long) => {
                    self.advance();
                    long
                }
                None => symbol,
            };
            let source = self.source_until_current(start, position);
            return Ok(Some(Token::new(TokenKind::Symbol(symbol), source)));
        }
        Err(self.error(start, LexErrorKind::UnexpectedChar(ch)))
    }

    fn string(
        &mut self,
        start: usize,
        delimiter: char,
        position: Position,
    ) -> Result<Token<'source>, LexError> {
        self.advance();
        let content_start = self.current_offset();
        loop {
            match self.advance() {
                None => return Err(self.error(start, LexErrorKind::UnterminatedString)),
                Some((end, ch)) if ch == delimiter => {
                    let source = Source {
                        span: Span {
                            offset: start,
                            len: end + 1 - start,
                        },
                        position,
                        source: &self.metadata.input()[content_start..end],
                    };
                    return Ok(Token::new(TokenKind::String, source));
                }
                Some(_) => {}
            }
        }
    }

    fn number(&mut self, start: usize, position: Position) -> Result<Token<'source>, LexError> {
        self.skip_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::Integer;
        if let Some((dot, '.')) = self.input.peek().copied() {
            let fraction = &self.metadata.input()[dot + 1..];
            if fraction.starts_with(|c: char| c.is_ascii_digit()) {
                self.advance();
                self.skip_while(|c| c.is_ascii_digit());
                kind = TokenKind::Float;
            }
        }
        if let Some((pos, ch)) = self
            .input
            .peek()
            .filter(|(_, ch)| !is_delimeter(*ch))
            .copied()
        {
            return Err(self.error(
                pos,
                LexErrorKind::Expected {
                    wanted: WantedSpec::Description("delimeter or space after number"),
                    found: ch,
                },
            ));
        }
        let source = self.source_until_current(start, position);
        match kind {
            TokenKind::Integer if source.source.parse::<i32>().is_err() => {
                Err(self.error(start, LexErrorKind::IntegerOutOfRange))
            }
            TokenKind::Float if source.source.parse::<f32>().is_err() => {
                Err(self.error(start, LexErrorKind::InvalidFloat))
            }
            _ => Ok(Token::new(kind, source)),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.input.peek().map(|&(_, ch)| ch) {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('#') => self.skip_while(|c| c != '\n'),
                _ => break,
            }
        }
    }

    fn skip_while<F>(&mut self, filter: F)
    where
        F: Fn(char) -> bool,
    {
        while self.input.peek().filter(|(_, ch)| filter(*ch)).is_some() {
            self.advance();
        }
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        let next = self.input.next();
        if let Some((_, ch)) = next {
            if ch == '\n' {
                self.position.line += 1;
                self.position.col = 1;
            } else {
                self.position.col += 1;
            }
        }
        next
    }

    fn source_until_current(&mut self, start: usize, position: Position) -> Source<'source> {
        let end = self.current_offset();
        Source {
            span: Span {
                offset: start,
                len: end - start,
            },
            position,
            source: &self.metadata.input()[start..end],
        }
    }

    fn error(&self, position: usize, kind: LexErrorKind) -> LexError {
        LexError::new(kind).with_source(Span::new(position), self.metadata)
    }

    pub fn current_span(&mut self) -> Span {
        Span::new(self.current_offset())
    }

    pub const fn get_metadata(&self) -> &'source SourceMetadata<'source> {
        self.metadata
    }

    fn current_offset(&mut self) -> usize {
        self.input
            .peek()
            .map(|(x, _)| *x)
            .unwrap_or_else(|| self.metadata.input().len())
    }
}

#[inline]
fn is_delimeter(ch: char) -> bool {
    ch.is_whitespace() || ch.is_ascii_punctuation()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> anyhow::Result<Vec<TokenKind>> {
        let meta = SourceMetadata::new(source);
        let tokens: Result<Vec<_>, _> = Lexer::new(&meta).into_iter().collect();
        Ok(tokens?.into_iter().map(|tok| tok.kind).collect())
    }

    #[test]
    fn declaration_tokens() -> anyhow::Result<()> {
        use TokenKind::*;
        assert_eq!(
            kinds("int x = 42;")?,
            vec![
                Identifier,
                Identifier,
                Symbol(super::Symbol::Equals),
                Integer,
                Symbol(super::Symbol::Semicolon)
            ]
        );
        Ok(())
    }

    #[test]
    fn two_character_symbols() -> anyhow::Result<()> {
        let found = kinds("+= ++ -= -- *= ** /= // >= >> <= << == != < > = !")?;
        let symbols: Vec<_> = found.into_iter().filter_map(TokenKind::as_symbol).collect();
        assert_eq!(
            symbols,
            vec![
                Symbol::PlusEquals,
                Symbol::PlusPlus,
                Symbol::MinusEquals,
                Symbol::MinusMinus,
                Symbol::StarEquals,
                Symbol::StarStar,
                Symbol::SlashEquals,
                Symbol::SlashSlash,
                Symbol::GreaterEquals,
                Symbol::ShiftRight,
                Symbol::LessEquals,
                Symbol::ShiftLeft,
                Symbol::DoubleEquals,
                Symbol::NotEquals,
                Symbol::Less,
                Symbol::Greater,
                Symbol::Equals,
                Symbol::Bang,
            ]
        );
        Ok(())
    }

    #[test]
    fn comments_are_skipped() -> anyhow::Result<()> {
        assert_eq!(
            kinds("# a comment\nfoo # trailing\n# last")?,
            vec![TokenKind::Identifier]
        );
        Ok(())
    }

    #[test]
    fn tokens_carry_line_and_column() -> anyhow::Result<()> {
        let meta = SourceMetadata::new("a\n  bb\tc");
        let tokens: Vec<_> = Lexer::new(&meta).into_iter().collect::<Result<_, _>>()?;
        let positions: Vec<_> = tokens
            .iter()
            .map(|tok| (tok.source.source, tok.source.position))
            .collect();
        assert_eq!(
            positions,
            vec![
                ("a", Position { line: 1, col: 1 }),
                ("bb", Position { line: 2, col: 3 }),
                ("c", Position { line: 2, col: 6 }),
            ]
        );
        Ok(())
    }

    #[test]
    fn strings_hold_their_content() -> anyhow::Result<()> {
        let meta = SourceMetadata::new("'hi there' \"it's\"");
        let tokens: Vec<_> = Lexer::new(&meta).into_iter().collect::<Result<_, _>>()?;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].source.source, "hi there");
        assert_eq!(tokens[0].source.span.len, 10);
        assert_eq!(tokens[1].source.source, "it's");
        Ok(())
    }

    #[test]
    fn unterminated_string_reports_where_it_began() {
        let meta = SourceMetadata::new("int a;\n  'oops\nmore text");
        let err = Lexer::new(&meta)
            .into_iter()
            .find_map(Result::err)
            .expect("lexing must fail");
        assert_eq!(err.kind, LexErrorKind::UnterminatedString);
        assert_eq!(err.position(), Some(Position { line: 2, col: 3 }));
    }

    #[test]
    fn numbers() -> anyhow::Result<()> {
        assert_eq!(
            kinds("12 3.25 4.x")?,
            vec![
                TokenKind::Integer,
                TokenKind::Float,
                TokenKind::Integer,
                TokenKind::Symbol(Symbol::Dot),
                TokenKind::Identifier
            ]
        );
        Ok(())
    }

    #[test]
    fn integer_out_of_range() {
        let meta = SourceMetadata::new("2147483647 2147483648");
        let results: Vec<_> = Lexer::new(&meta).into_iter().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(err) if err.kind == LexErrorKind::IntegerOutOfRange
        ));
    }

    #[test]
    fn unexpected_character_stops_the_stream() {
        let meta = SourceMetadata::new("a $ b");
        let results: Vec<_> = Lexer::new(&meta).into_iter().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[1],
            Err(err) if err.kind == LexErrorKind::UnexpectedChar('$')
        ));
    }
}
