use std::error;
use std::fmt;
use std::path::PathBuf;

/// An error produced while processing some source text, optionally pointing
/// at the place in the text that caused it.
#[derive(Debug, Clone)]
pub struct Error<T> {
    pub kind: T,
    file: Option<PathBuf>,
    snippet: Option<Snippet>,
    contexts: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub const fn new(offset: usize) -> Self {
        Self { offset, len: 1 }
    }
    pub const fn as_range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        let start = self.offset.min(other.offset);
        let end = (self.offset + self.len).max(other.offset + other.len);
        Span {
            offset: start,
            len: end - start,
        }
    }
    pub fn snippet_from_source(&self, source: &SourceMetadata) -> Option<Snippet> {
        let mut offset = 0;
        for (i, line) in source.input().split('\n').enumerate() {
            let next_offset = offset + line.len() + 1;
            if next_offset > self.offset {
                let in_line = self.offset - offset;
                let col = line.get(..in_line).map_or(in_line, |s| s.chars().count());
                return Some(Snippet {
                    position: Position {
                        line: i + 1,
                        col: col + 1,
                    },
                    line: line.to_string(),
                });
            }
            offset = next_offset;
        }
        None
    }
}

#[derive(Debug)]
pub struct SourceMetadata<'a> {
    file: Option<PathBuf>,
    source: &'a str,
}

impl<'a> SourceMetadata<'a> {
    pub const fn input(&self) -> &'a str {
        self.source
    }
    pub const fn new(source: &'a str) -> Self {
        Self { file: None, source }
    }
    #[must_use]
    pub fn with_file(mut self, file: PathBuf) -> Self {
        self.file = Some(file);
        self
    }
}

impl<T> Error<T> {
    pub const fn new(kind: T) -> Self {
        Self {
            kind,
            snippet: None,
            file: None,
            contexts: Vec::new(),
        }
    }
    pub fn map_kind<F, U>(self, mapper: F) -> Error<U>
    where
        F: Fn(T) -> U,
    {
        Error {
            kind: mapper(self.kind),
            snippet: self.snippet,
            file: self.file,
            contexts: self.contexts,
        }
    }
    /// The source given is only applied if there was no location yet
    #[must_use]
    pub fn with_backup_source(self, span: Span, source: &SourceMetadata) -> Self {
        if self.snippet.is_some() {
            self
        } else {
            self.with_source(span, source)
        }
    }
    #[must_use]
    pub fn with_source(mut self, span: Span, source: &SourceMetadata) -> Self {
        self.file = source.file.clone();
        self.snippet = span.snippet_from_source(source);
        self
    }
    #[must_use]
    pub fn add_context(mut self, ctx: &'static str) -> Self {
        self.contexts.push(ctx);
        self
    }
    /// 1-based line and column of the error, if known.
    pub fn position(&self) -> Option<Position> {
        self.snippet.as_ref().map(|snippet| snippet.position)
    }
    pub fn contexts(&self) -> &[&'static str] {
        &self.contexts
    }
}

#[derive(Debug, Clone)]
pub struct Snippet {
    position: Position,
    line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WantedSpec<T> {
    Specific(T),
    Description(&'static str),
}

impl<T: fmt::Display> fmt::Display for WantedSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Description(desc) => f.write_str(desc),
            Self::Specific(t) => write!(f, "{}", t),
        }
    }
}

/// Line and column, both starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Default for Position {
    fn default() -> Self {
        Self { line: 1, col: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl<T: error::Error + 'static> error::Error for Error<T> {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl<T: fmt::Display> fmt::Display for Error<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let whiles = self
            .contexts
            .iter()
            .copied()
            .fold(String::new(), |acc, next| acc + "\nwhile " + next);
        let snippet = if let Some(snip) = &self.snippet {
            snip
        } else {
            return write!(f, "{}(no location info){}", self.kind, whiles);
        };
        let file = self
            .file
            .as_ref()
            .and_then(|x| x.to_str())
            .unwrap_or("<unknown source>");

        write!(
            f,
            "\
{kind}
   --> {file}:{line}:{col}
    |
{line:3} | {snippet}
    | {marker:>0$}{whiles}",
            snippet.position.col,
            marker = '^',
            line = snippet.position.line,
            col = snippet.position.col,
            file = file,
            kind = self.kind,
            snippet = snippet.line,
            whiles = whiles,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_positions_are_one_based() {
        let meta = SourceMetadata::new("int a = 1;\nreturn a;\n");
        let first = Span::new(0).snippet_from_source(&meta).unwrap();
        assert_eq!(first.position, Position { line: 1, col: 1 });
        let ret = Span::new(11).snippet_from_source(&meta).unwrap();
        assert_eq!(ret.position, Position { line: 2, col: 1 });
        assert_eq!(ret.line, "return a;");
        let semi = Span::new(19).snippet_from_source(&meta).unwrap();
        assert_eq!(semi.position, Position { line: 2, col: 9 });
    }

    #[test]
    fn end_of_input_has_a_position() {
        let meta = SourceMetadata::new("a\nb");
        let snippet = Span::new(3).snippet_from_source(&meta).unwrap();
        assert_eq!(snippet.position, Position { line: 2, col: 2 });
    }

    #[test]
    fn display_includes_file_and_contexts() {
        let meta = SourceMetadata::new("x y").with_file("script.sc".into());
        let err = Error::new("bad token")
            .with_source(Span::new(2), &meta)
            .add_context("parsing statement");
        let shown = err.to_string();
        assert!(shown.contains("script.sc:1:3"), "{shown}");
        assert!(shown.ends_with("while parsing statement"), "{shown}");
        assert_eq!(err.position(), Some(Position { line: 1, col: 3 }));
    }

    #[test]
    fn backup_source_does_not_override() {
        let meta = SourceMetadata::new("abc\ndef");
        let err = Error::new(())
            .with_source(Span::new(5), &meta)
            .with_backup_source(Span::new(0), &meta);
        assert_eq!(err.position(), Some(Position { line: 2, col: 2 }));
    }
}
