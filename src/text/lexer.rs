//! Lexer for the WebAssembly text format.
//!
//! Produces tokens lazily via the `Iterator` trait. Comments and whitespace
//! are skipped; annotation openers `(@name` become [`TokenKind::LparAnn`]
//! tokens for the tokenizer layer to collect. Malformed input produces an
//! error and iteration stops.

use super::token::{FloatLit, IntLit, NanPayload, Span, Token, TokenKind};
use crate::error::Error;

// ===========================================================================
// Character cursor
// ===========================================================================

/// A saved position in source text.
#[derive(Debug, Clone, Copy)]
struct Position {
    offset: usize,
    line: u32,
    column: u32,
}

impl Position {
    fn span_to(self, end: &Position) -> Span {
        Span::new(self.offset, end.offset, self.line, self.column)
    }

    fn span_here(self) -> Span {
        Span::new(self.offset, self.offset, self.line, self.column)
    }
}

/// Character-level navigation with line/column tracking.
struct Cursor<'a> {
    source: &'a str,
    remaining: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Cursor {
            source,
            remaining: source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn is_eof(&self) -> bool {
        self.remaining.is_empty()
    }

    fn peek(&self) -> Option<char> {
        self.remaining.chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.remaining.chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.remaining.chars().next()?;
        let len = c.len_utf8();
        self.remaining = &self.remaining[len..];
        self.offset += len;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
        }
    }

    /// Consumes characters matching the predicate and returns them.
    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset;
        self.skip_while(predicate);
        &self.source[start..self.offset]
    }

    fn slice_from(&self, start: &Position) -> &'a str {
        &self.source[start.offset..self.offset]
    }
}

// ===========================================================================
// Lexer
// ===========================================================================

/// Lexer for the text format.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            cursor: Cursor::new(source),
        }
    }

    /// Tokenises the entire source, returning all tokens or the first error.
    pub fn tokenise(source: &str) -> Result<Vec<Token>, Error> {
        Lexer::new(source).collect()
    }

    fn error(&self, message: impl Into<String>, pos: Position) -> Error {
        Error::syntax(pos.offset, message)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.skip_whitespace_and_comments() {
            return Some(Err(e));
        }
        if self.cursor.is_eof() {
            return None;
        }

        let start = self.cursor.position();
        let kind = match self.lex_token() {
            Ok(kind) => kind,
            Err(e) => return Some(Err(e)),
        };
        let span = start.span_to(&self.cursor.position());
        Some(Ok(Token::new(kind, span)))
    }
}

impl<'a> Lexer<'a> {
    fn lex_token(&mut self) -> Result<TokenKind, Error> {
        let start = self.cursor.position();

        match self.cursor.peek().unwrap_or('\0') {
            '(' => {
                if self.cursor.peek_second() == Some('@') {
                    return self.lex_annotation_opener();
                }
                self.cursor.advance();
                Ok(TokenKind::LeftParen)
            }
            ')' => {
                self.cursor.advance();
                Ok(TokenKind::RightParen)
            }
            '"' => {
                let kind = self.lex_string()?;
                Ok(self.finish_token(kind, start))
            }
            '$' => {
                let kind = self.lex_id(start)?;
                Ok(self.finish_token(kind, start))
            }
            '+' | '-' => {
                let kind = self.lex_signed_number_or_keyword()?;
                Ok(self.finish_token(kind, start))
            }
            c if c.is_ascii_digit() => {
                let kind = self.lex_number(false, false)?;
                Ok(self.finish_token(kind, start))
            }
            c if is_idchar(c) => {
                let kind = self.lex_keyword_or_special_float();
                Ok(self.finish_token(kind, start))
            }
            c => {
                self.cursor.advance();
                Err(self.error(format!("unexpected character: {:?}", c), start))
            }
        }
    }

    /// Demotes a token to `Reserved` if it runs into further id-characters
    /// instead of a token boundary, e.g. `0$x` or `1.5f`.
    fn finish_token(&mut self, kind: TokenKind, start: Position) -> TokenKind {
        match self.cursor.peek() {
            Some(c) if is_idchar(c) || c == '"' => {
                self.cursor.skip_while(|c| is_idchar(c) || c == '"');
                TokenKind::Reserved(self.cursor.slice_from(&start).to_string())
            }
            _ => kind,
        }
    }

    fn lex_annotation_opener(&mut self) -> Result<TokenKind, Error> {
        let start = self.cursor.position();
        self.cursor.advance(); // '('
        self.cursor.advance(); // '@'
        let name = self.cursor.take_while(is_idchar);
        if name.is_empty() {
            return Err(self.error("expected annotation name after '(@'", start));
        }
        Ok(TokenKind::LparAnn(name.to_string()))
    }

    fn lex_keyword_or_special_float(&mut self) -> TokenKind {
        let text = self.cursor.take_while(is_idchar);
        if let Some(float) = parse_special_float(text, false) {
            return TokenKind::Float(float);
        }
        TokenKind::Keyword(text.to_string())
    }

    /// `+` or `-` prefix: a signed number, a signed special float, or a
    /// keyword-shaped operator.
    fn lex_signed_number_or_keyword(&mut self) -> Result<TokenKind, Error> {
        let second = self.cursor.peek_second();
        let is_number =
            matches!(second, Some(c) if c.is_ascii_digit() || c == '.' || c == 'i' || c == 'n');

        if is_number {
            let negative = self.cursor.advance() == Some('-');
            self.lex_number(negative, true)
        } else {
            Ok(self.lex_keyword_or_special_float())
        }
    }
}

// ===========================================================================
// Whitespace and comments
// ===========================================================================

impl<'a> Lexer<'a> {
    fn skip_whitespace_and_comments(&mut self) -> Result<(), Error> {
        loop {
            self.cursor.skip_while(|c| c.is_ascii_whitespace());
            if self.cursor.is_eof() {
                return Ok(());
            }
            match (self.cursor.peek(), self.cursor.peek_second()) {
                (Some(';'), Some(';')) => {
                    self.cursor.skip_while(|c| c != '\n' && c != '\r');
                }
                (Some('('), Some(';')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), Error> {
        let start = self.cursor.position();
        self.cursor.advance();
        self.cursor.advance();
        let mut depth = 1;
        while depth > 0 {
            match (self.cursor.peek(), self.cursor.peek_second()) {
                (None, _) => return Err(self.error("unterminated block comment", start)),
                (Some('('), Some(';')) => {
                    self.cursor.advance();
                    self.cursor.advance();
                    depth += 1;
                }
                (Some(';'), Some(')')) => {
                    self.cursor.advance();
                    self.cursor.advance();
                    depth -= 1;
                }
                _ => {
                    self.cursor.advance();
                }
            }
        }
        Ok(())
    }
}

// ===========================================================================
// Identifiers and strings
// ===========================================================================

impl<'a> Lexer<'a> {
    fn lex_id(&mut self, start: Position) -> Result<TokenKind, Error> {
        self.cursor.advance(); // '$'
        let name = self.cursor.take_while(is_idchar);
        if name.is_empty() {
            return Err(self.error("expected identifier after '$'", start));
        }
        Ok(TokenKind::Id(name.to_string()))
    }

    fn lex_string(&mut self) -> Result<TokenKind, Error> {
        let start = self.cursor.position();
        self.cursor.advance(); // opening quote

        let mut bytes = Vec::new();
        loop {
            match self.cursor.peek() {
                None => return Err(self.error("unterminated string literal", start)),
                Some('"') => {
                    self.cursor.advance();
                    break;
                }
                Some('\\') => {
                    self.cursor.advance();
                    self.lex_escape(&mut bytes)?;
                }
                Some(c) if (c as u32) < 0x20 => {
                    return Err(self.error("control character in string literal", start));
                }
                Some(c) => {
                    self.cursor.advance();
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        Ok(TokenKind::String(bytes))
    }

    fn lex_escape(&mut self, bytes: &mut Vec<u8>) -> Result<(), Error> {
        let pos = self.cursor.position();
        let c = self
            .cursor
            .advance()
            .ok_or_else(|| self.error("unterminated escape sequence", pos))?;

        match c {
            't' => bytes.push(0x09),
            'n' => bytes.push(0x0a),
            'r' => bytes.push(0x0d),
            '"' => bytes.push(0x22),
            '\'' => bytes.push(0x27),
            '\\' => bytes.push(0x5c),
            'u' => self.lex_unicode_escape(bytes)?,
            c if c.is_ascii_hexdigit() => {
                let high = c.to_digit(16).unwrap_or(0) as u8;
                let low_pos = self.cursor.position();
                let low_char = self
                    .cursor
                    .advance()
                    .ok_or_else(|| self.error("unterminated hex escape", low_pos))?;
                let low = low_char
                    .to_digit(16)
                    .ok_or_else(|| self.error(format!("invalid hex digit: {:?}", low_char), low_pos))?
                    as u8;
                bytes.push((high << 4) | low);
            }
            _ => return Err(self.error(format!("invalid escape sequence: \\{}", c), pos)),
        }
        Ok(())
    }

    fn lex_unicode_escape(&mut self, bytes: &mut Vec<u8>) -> Result<(), Error> {
        let pos = self.cursor.position();
        match self.cursor.advance() {
            Some('{') => {}
            Some(c) => return Err(self.error(format!("expected '{{' after \\u, got {:?}", c), pos)),
            None => return Err(self.error("unterminated unicode escape", pos)),
        }

        let digits_start = self.cursor.position();
        let digits = self.cursor.take_while(|c| c.is_ascii_hexdigit());
        if digits.is_empty() {
            return Err(self.error("empty unicode escape", digits_start));
        }
        let code_point = u32::from_str_radix(digits, 16)
            .map_err(|_| self.error("unicode escape value too large", digits_start))?;

        let close_pos = self.cursor.position();
        match self.cursor.advance() {
            Some('}') => {}
            Some(c) => {
                return Err(self.error(format!("expected '}}' in unicode escape, got {:?}", c), close_pos))
            }
            None => return Err(self.error("unterminated unicode escape", close_pos)),
        }

        let c = char::from_u32(code_point).ok_or_else(|| {
            self.error(format!("invalid unicode code point: U+{:X}", code_point), digits_start)
        })?;
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

// ===========================================================================
// Number literals
// ===========================================================================

impl<'a> Lexer<'a> {
    /// Lexes a number; sign has already been consumed if present.
    fn lex_number(&mut self, negative: bool, has_sign: bool) -> Result<TokenKind, Error> {
        if matches!(self.cursor.peek(), Some('i') | Some('n')) {
            return self.lex_special_float(negative);
        }

        let is_hex = self.cursor.peek() == Some('0')
            && matches!(self.cursor.peek_second(), Some('x') | Some('X'));

        if is_hex {
            self.cursor.advance();
            self.cursor.advance();
            self.lex_hex_number(negative, has_sign)
        } else {
            self.lex_decimal_number(negative, has_sign)
        }
    }

    fn lex_hex_number(&mut self, negative: bool, has_sign: bool) -> Result<TokenKind, Error> {
        let start = self.cursor.position();
        let digits = self.cursor.take_while(|c| c.is_ascii_hexdigit() || c == '_');

        if matches!(self.cursor.peek(), Some('.') | Some('p') | Some('P')) {
            return self.lex_float(negative, start, true);
        }

        if digits.is_empty() || !validate_num_underscores(digits, true) {
            return Err(self.error("expected hex digits after '0x'", start));
        }

        let clean: String = digits.chars().filter(|&c| c != '_').collect();
        match u64::from_str_radix(&clean, 16) {
            Ok(value) => Ok(TokenKind::Integer(if has_sign {
                IntLit::signed(value, negative)
            } else {
                IntLit::unsigned(value)
            })),
            // Overflow: keep as a hex float; large hex integers are only
            // valid in float contexts.
            Err(_) => Ok(TokenKind::Float(FloatLit::Hex {
                negative,
                text: format!("0x{}", clean),
            })),
        }
    }

    fn lex_decimal_number(&mut self, negative: bool, has_sign: bool) -> Result<TokenKind, Error> {
        let start = self.cursor.position();
        let digits = self.cursor.take_while(|c| c.is_ascii_digit() || c == '_');

        if matches!(self.cursor.peek(), Some('.') | Some('e') | Some('E')) {
            return self.lex_float(negative, start, false);
        }

        if digits.is_empty() || !validate_num_underscores(digits, false) {
            return Err(self.error("expected decimal digits", start));
        }

        let clean: String = digits.chars().filter(|&c| c != '_').collect();
        match clean.parse::<u64>() {
            Ok(value) => Ok(TokenKind::Integer(if has_sign {
                IntLit::signed(value, negative)
            } else {
                IntLit::unsigned(value)
            })),
            Err(_) => Ok(TokenKind::Float(FloatLit::Decimal {
                negative,
                text: clean,
            })),
        }
    }

    /// Lexes the rest of a float literal. `start` is the position of the
    /// first digit (after any `0x` prefix).
    fn lex_float(&mut self, negative: bool, start: Position, hex: bool) -> Result<TokenKind, Error> {
        if self.cursor.peek() == Some('.') {
            self.cursor.advance();
            if hex {
                self.cursor.skip_while(|c| c.is_ascii_hexdigit() || c == '_');
            } else {
                self.cursor.skip_while(|c| c.is_ascii_digit() || c == '_');
            }
        }

        let has_exp = if hex {
            matches!(self.cursor.peek(), Some('p' | 'P'))
        } else {
            matches!(self.cursor.peek(), Some('e' | 'E'))
        };
        if has_exp {
            self.cursor.advance();
            if matches!(self.cursor.peek(), Some('+' | '-')) {
                self.cursor.advance();
            }
            let exp_digits = self.cursor.take_while(|c| c.is_ascii_digit() || c == '_');
            if !exp_digits.contains(|c: char| c.is_ascii_digit()) {
                return Err(self.error("expected exponent digits", start));
            }
        }

        let text = self.cursor.slice_from(&start);
        if !validate_num_underscores(text, hex) {
            return Err(self.error("misplaced underscore in number", start));
        }
        let clean: String = text.chars().filter(|&c| c != '_').collect();

        if hex {
            if !clean.chars().any(|c| c.is_ascii_hexdigit()) {
                return Err(self.error("invalid hex float", start));
            }
            Ok(TokenKind::Float(FloatLit::Hex {
                negative,
                text: format!("0x{}", clean),
            }))
        } else {
            clean
                .parse::<f64>()
                .map_err(|_| self.error("invalid float literal", start))?;
            Ok(TokenKind::Float(FloatLit::Decimal {
                negative,
                text: clean,
            }))
        }
    }

    /// Lexes `inf`, `nan`, `nan:0x...`, `nan:canonical`, `nan:arithmetic`
    /// after any sign has been consumed.
    fn lex_special_float(&mut self, negative: bool) -> Result<TokenKind, Error> {
        let start = self.cursor.position();
        let text = self
            .cursor
            .take_while(|c| c.is_ascii_alphanumeric() || c == ':' || c == '_');
        parse_special_float(text, negative)
            .map(TokenKind::Float)
            .ok_or_else(|| self.error(format!("invalid number: {}", text), start))
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

/// Underscores in numeric literals may only sit between two digits.
fn validate_num_underscores(s: &str, is_hex: bool) -> bool {
    let bytes = s.as_bytes();
    let mut in_exponent = false;

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'_' {
            if i == 0 || i == bytes.len() - 1 {
                return false;
            }
            let digit = |b: u8| {
                if is_hex && !in_exponent {
                    b.is_ascii_hexdigit()
                } else {
                    b.is_ascii_digit()
                }
            };
            if !digit(bytes[i - 1]) || !digit(bytes[i + 1]) {
                return false;
            }
        } else if b == b'p' || b == b'P' || (!is_hex && (b == b'e' || b == b'E')) {
            in_exponent = true;
        }
    }
    true
}

/// Whether a character may appear in an identifier or keyword.
fn is_idchar(c: char) -> bool {
    matches!(
        c,
        '0'..='9'
            | 'a'..='z'
            | 'A'..='Z'
            | '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '/'
            | ':' | '<' | '=' | '>' | '?' | '@' | '\\' | '^' | '_' | '`' | '|' | '~'
    )
}

fn parse_special_float(text: &str, negative: bool) -> Option<FloatLit> {
    match text {
        "inf" => Some(FloatLit::Inf { negative }),
        "nan" => Some(FloatLit::Nan {
            negative,
            payload: NanPayload::None,
        }),
        "nan:canonical" => Some(FloatLit::Nan {
            negative,
            payload: NanPayload::Canonical,
        }),
        "nan:arithmetic" => Some(FloatLit::Nan {
            negative,
            payload: NanPayload::Arithmetic,
        }),
        _ => {
            let payload_hex = text.strip_prefix("nan:0x")?;
            if payload_hex.is_empty() || !validate_num_underscores(payload_hex, true) {
                return None;
            }
            let clean: String = payload_hex.chars().filter(|&c| c != '_').collect();
            let payload = u64::from_str_radix(&clean, 16).ok()?;
            Some(FloatLit::Nan {
                negative,
                payload: NanPayload::Bits(payload),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::tokenise(source)
            .expect("tokenise failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn expect_error(source: &str, substring: &str) {
        let err = Lexer::tokenise(source).expect_err("expected error");
        let message = format!("{}", err);
        assert!(
            message.contains(substring),
            "expected error containing {:?}, got {:?}",
            substring,
            message
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(kinds(""), vec![]);
    }

    #[test]
    fn parens_and_keywords() {
        assert_eq!(
            kinds("(module (func))"),
            vec![
                TokenKind::LeftParen,
                TokenKind::Keyword("module".into()),
                TokenKind::LeftParen,
                TokenKind::Keyword("func".into()),
                TokenKind::RightParen,
                TokenKind::RightParen,
            ]
        );
    }

    #[test]
    fn identifiers() {
        assert_eq!(
            kinds("$foo $a.b/c"),
            vec![TokenKind::Id("foo".into()), TokenKind::Id("a.b/c".into())]
        );
        expect_error("$", "expected identifier");
    }

    #[test]
    fn annotation_opener() {
        assert_eq!(
            kinds("(@custom \"x\")"),
            vec![
                TokenKind::LparAnn("custom".into()),
                TokenKind::String(b"x".to_vec()),
                TokenKind::RightParen,
            ]
        );
    }

    #[test]
    fn comments_skipped() {
        assert_eq!(
            kinds(";; line\n( (; block (; nested ;) ;) )"),
            vec![TokenKind::LeftParen, TokenKind::RightParen]
        );
        expect_error("(; never closed", "unterminated block comment");
    }

    #[test]
    fn integers() {
        assert_eq!(kinds("42"), vec![TokenKind::Integer(IntLit::unsigned(42))]);
        assert_eq!(
            kinds("-42 +7"),
            vec![
                TokenKind::Integer(IntLit::signed(42, true)),
                TokenKind::Integer(IntLit::signed(7, false)),
            ]
        );
        assert_eq!(
            kinds("0xff 1_000"),
            vec![
                TokenKind::Integer(IntLit::unsigned(255)),
                TokenKind::Integer(IntLit::unsigned(1000)),
            ]
        );
    }

    #[test]
    fn underscore_rules() {
        expect_error("1__0", "expected decimal digits");
        expect_error("1_", "expected decimal digits");
    }

    #[test]
    fn floats() {
        assert_eq!(
            kinds("1.5"),
            vec![TokenKind::Float(FloatLit::Decimal {
                negative: false,
                text: "1.5".into()
            })]
        );
        assert_eq!(
            kinds("-0x1.8p3"),
            vec![TokenKind::Float(FloatLit::Hex {
                negative: true,
                text: "0x1.8p3".into()
            })]
        );
        assert_eq!(
            kinds("1e10"),
            vec![TokenKind::Float(FloatLit::Decimal {
                negative: false,
                text: "1e10".into()
            })]
        );
    }

    #[test]
    fn special_floats() {
        assert_eq!(
            kinds("inf -inf nan"),
            vec![
                TokenKind::Float(FloatLit::Inf { negative: false }),
                TokenKind::Float(FloatLit::Inf { negative: true }),
                TokenKind::Float(FloatLit::Nan {
                    negative: false,
                    payload: NanPayload::None
                }),
            ]
        );
        assert_eq!(
            kinds("nan:0x4000 nan:canonical nan:arithmetic"),
            vec![
                TokenKind::Float(FloatLit::Nan {
                    negative: false,
                    payload: NanPayload::Bits(0x4000)
                }),
                TokenKind::Float(FloatLit::Nan {
                    negative: false,
                    payload: NanPayload::Canonical
                }),
                TokenKind::Float(FloatLit::Nan {
                    negative: false,
                    payload: NanPayload::Arithmetic
                }),
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            kinds(r#""a\n\t\\\"b""#),
            vec![TokenKind::String(b"a\n\t\\\"b".to_vec())]
        );
        assert_eq!(kinds(r#""\00\ff""#), vec![TokenKind::String(vec![0x00, 0xff])]);
        assert_eq!(
            kinds(r#""\u{1F600}""#),
            vec![TokenKind::String("\u{1F600}".as_bytes().to_vec())]
        );
        expect_error("\"open", "unterminated string");
        expect_error(r#""\q""#, "invalid escape");
    }

    #[test]
    fn reserved_tokens() {
        assert_eq!(
            kinds("0$x"),
            vec![TokenKind::Reserved("0$x".into())]
        );
        assert_eq!(
            kinds("1.5f"),
            vec![TokenKind::Reserved("1.5f".into())]
        );
    }

    #[test]
    fn keyword_with_equals() {
        assert_eq!(
            kinds("offset=8 align=4"),
            vec![
                TokenKind::Keyword("offset=8".into()),
                TokenKind::Keyword("align=4".into()),
            ]
        );
    }

    #[test]
    fn spans_track_positions() {
        let tokens = Lexer::tokenise("(module\n  $x)").unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 1, 1, 1));
        assert_eq!(tokens[1].span, Span::new(1, 7, 1, 2));
        assert_eq!(tokens[2].span.line, 2);
        assert_eq!(tokens[2].span.column, 3);
    }
}
