//! Two-token-lookahead tokenizer with annotation collection.
//!
//! The parser never sees whitespace, comments, or annotations: annotation
//! blocks (`(@name ...)`) are collected whole into a side list as they are
//! encountered, and the token stream the parser observes is the plain
//! program text. Two tokens of lookahead are enough to distinguish every
//! construct in the grammar (`(` followed by a keyword decides a form).

use super::lexer::Lexer;
use super::token::{Span, Token, TokenKind};
use crate::error::Error;

/// A collected annotation block.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// The name after `(@`.
    pub name: String,
    /// Span of the opener.
    pub span: Span,
    /// Every token between the opener and its matching `)`.
    pub tokens: Vec<Token>,
}

/// Token stream over a [`Lexer`], with two tokens of lookahead.
pub struct Tokenizer<'a> {
    lexer: Lexer<'a>,
    lookahead: [Option<Token>; 2],
    count: usize,
    annotations: Vec<Annotation>,
    last_end: usize,
    last_line: u32,
    last_column: u32,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Tokenizer {
            lexer: Lexer::new(source),
            lookahead: [None, None],
            count: 0,
            annotations: Vec::new(),
            last_end: 0,
            last_line: 1,
            last_column: 1,
        }
    }

    /// Annotations collected so far, in source order.
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Takes ownership of the collected annotations.
    pub fn take_annotations(&mut self) -> Vec<Annotation> {
        std::mem::take(&mut self.annotations)
    }

    fn eof_token(&self) -> Token {
        Token::new(
            TokenKind::Eof,
            Span::new(self.last_end, self.last_end, self.last_line, self.last_column),
        )
    }

    /// Produces the next non-annotation token from the lexer.
    fn lex_next(&mut self) -> Result<Token, Error> {
        loop {
            match self.lexer.next() {
                None => return Ok(self.eof_token()),
                Some(Err(e)) => return Err(e),
                Some(Ok(token)) => {
                    self.last_end = token.span.end;
                    self.last_line = token.span.line;
                    self.last_column = token.span.column;
                    if let TokenKind::LparAnn(name) = token.kind {
                        self.collect_annotation(name, token.span)?;
                        continue;
                    }
                    return Ok(token);
                }
            }
        }
    }

    /// Collects all tokens of an annotation block, including nested
    /// parenthesised groups, up to the matching `)`.
    fn collect_annotation(&mut self, name: String, span: Span) -> Result<(), Error> {
        let mut tokens = Vec::new();
        let mut depth = 1usize;
        loop {
            match self.lexer.next() {
                None => {
                    return Err(Error::syntax(span.start, "unterminated annotation"));
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(token)) => {
                    match token.kind {
                        TokenKind::LeftParen | TokenKind::LparAnn(_) => depth += 1,
                        TokenKind::RightParen => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    tokens.push(token);
                }
            }
        }
        self.annotations.push(Annotation { name, span, tokens });
        Ok(())
    }

    fn fill(&mut self, upto: usize) -> Result<(), Error> {
        while self.count <= upto {
            let token = self.lex_next()?;
            self.lookahead[self.count] = Some(token);
            self.count += 1;
        }
        Ok(())
    }

    /// Looks at the token `at` positions ahead (0 or 1) without consuming.
    pub fn peek(&mut self, at: usize) -> Result<&Token, Error> {
        debug_assert!(at < 2);
        self.fill(at)?;
        Ok(self.lookahead[at].as_ref().unwrap_or_else(|| {
            // fill() guarantees the slot is populated
            unreachable!()
        }))
    }

    /// Consumes and returns the next token.
    pub fn read(&mut self) -> Result<Token, Error> {
        self.fill(0)?;
        let token = self.lookahead[0].take();
        self.lookahead.swap(0, 1);
        self.count -= 1;
        match token {
            Some(token) => Ok(token),
            None => Ok(self.eof_token()),
        }
    }

    /// Consumes the next token if it is `(`.
    pub fn match_lparen(&mut self) -> Result<Option<Span>, Error> {
        if self.peek(0)?.kind == TokenKind::LeftParen {
            return Ok(Some(self.read()?.span));
        }
        Ok(None)
    }

    /// Consumes the next token if it is `)`.
    pub fn match_rparen(&mut self) -> Result<Option<Span>, Error> {
        if self.peek(0)?.kind == TokenKind::RightParen {
            return Ok(Some(self.read()?.span));
        }
        Ok(None)
    }

    /// Consumes the next token if it is the given keyword.
    pub fn match_keyword(&mut self, keyword: &str) -> Result<Option<Span>, Error> {
        if self.peek(0)?.keyword() == Some(keyword) {
            return Ok(Some(self.read()?.span));
        }
        Ok(None)
    }

    /// Atomically consumes `(` followed by the given keyword.
    ///
    /// This is the two-token-lookahead operation that decides which form a
    /// parenthesised expression is without committing to it.
    pub fn match_lpar(&mut self, keyword: &str) -> Result<Option<Span>, Error> {
        if self.peek(0)?.kind == TokenKind::LeftParen && self.peek(1)?.keyword() == Some(keyword) {
            let span = self.read()?.span;
            self.read()?;
            return Ok(Some(span));
        }
        Ok(None)
    }

    /// Consumes the next token if it is an identifier.
    pub fn match_id(&mut self) -> Result<Option<(String, Span)>, Error> {
        if matches!(self.peek(0)?.kind, TokenKind::Id(_)) {
            let token = self.read()?;
            if let TokenKind::Id(name) = token.kind {
                return Ok(Some((name, token.span)));
            }
        }
        Ok(None)
    }

    /// Whether the next token is the end of input.
    pub fn at_eof(&mut self) -> Result<bool, Error> {
        Ok(self.peek(0)?.kind == TokenKind::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_and_peek() {
        let mut tok = Tokenizer::new("(module)");
        assert_eq!(tok.peek(0).unwrap().kind, TokenKind::LeftParen);
        assert_eq!(tok.peek(1).unwrap().kind, TokenKind::Keyword("module".into()));
        assert_eq!(tok.read().unwrap().kind, TokenKind::LeftParen);
        assert_eq!(tok.peek(0).unwrap().kind, TokenKind::Keyword("module".into()));
        assert_eq!(tok.read().unwrap().kind, TokenKind::Keyword("module".into()));
        assert_eq!(tok.read().unwrap().kind, TokenKind::RightParen);
        assert_eq!(tok.read().unwrap().kind, TokenKind::Eof);
        // Eof repeats forever.
        assert_eq!(tok.read().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn match_lpar_consumes_both_or_neither() {
        let mut tok = Tokenizer::new("(func (param i32))");
        assert_eq!(tok.match_lpar("module").unwrap(), None);
        assert!(tok.match_lpar("func").unwrap().is_some());
        assert!(tok.match_lpar("param").unwrap().is_some());
        assert_eq!(tok.match_keyword("i64").unwrap(), None);
        assert!(tok.match_keyword("i32").unwrap().is_some());
        assert!(tok.match_rparen().unwrap().is_some());
        assert!(tok.match_rparen().unwrap().is_some());
        assert!(tok.at_eof().unwrap());
    }

    #[test]
    fn annotations_are_invisible() {
        let mut tok = Tokenizer::new("(module (@custom \"x\" \"\\00\") (func))");
        let mut kinds = Vec::new();
        loop {
            let token = tok.read().unwrap();
            if token.kind == TokenKind::Eof {
                break;
            }
            kinds.push(token.kind);
        }
        assert_eq!(
            kinds,
            vec![
                TokenKind::LeftParen,
                TokenKind::Keyword("module".into()),
                TokenKind::LeftParen,
                TokenKind::Keyword("func".into()),
                TokenKind::RightParen,
                TokenKind::RightParen,
            ]
        );
        let annotations = tok.take_annotations();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].name, "custom");
        assert_eq!(annotations[0].tokens.len(), 2);
    }

    #[test]
    fn nested_parens_inside_annotation() {
        let mut tok = Tokenizer::new("(@meta (a (b)) end) done");
        assert_eq!(tok.read().unwrap().kind, TokenKind::Keyword("done".into()));
        let annotations = tok.annotations();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].name, "meta");
        // ( a ( b ) ) end
        assert_eq!(annotations[0].tokens.len(), 7);
    }

    #[test]
    fn unterminated_annotation_is_an_error() {
        let mut tok = Tokenizer::new("(@custom \"x\"");
        assert!(tok.read().is_err());
    }

    #[test]
    fn match_id() {
        let mut tok = Tokenizer::new("$a b");
        assert_eq!(
            tok.match_id().unwrap().map(|(name, _)| name),
            Some("a".to_string())
        );
        assert_eq!(tok.match_id().unwrap(), None);
    }
}
