//! Token types for the text format lexer.

use fhex::FromHex;
use std::fmt;

/// A location in source text.
///
/// Spans track byte offsets (for slicing and the error channel) and
/// line/column (for display). Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Byte offset where this span starts.
    pub start: usize,
    /// Byte offset just past the end of this span.
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

impl Span {
    pub const ZERO: Span = Span {
        start: 0,
        end: 0,
        line: 1,
        column: 1,
    };

    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl Default for Span {
    fn default() -> Self {
        Span::ZERO
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical token with its location in source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// The keyword text, if this token is a keyword.
    pub fn keyword(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Keyword(s) => Some(s),
            _ => None,
        }
    }
}

/// The kind of token, with associated data where relevant.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Opening parenthesis `(`.
    LeftParen,

    /// Closing parenthesis `)`.
    RightParen,

    /// A bare word: `module`, `func`, `i32.add`, `offset=8`.
    Keyword(String),

    /// An identifier like `$name`. The stored string excludes the `$`.
    Id(String),

    /// A token made of id-characters that is neither a keyword shape nor a
    /// number, e.g. `0$x`. The parser reports these as syntax errors.
    Reserved(String),

    /// A string literal with escape sequences already decoded to bytes.
    String(Vec<u8>),

    /// An integer literal.
    Integer(IntLit),

    /// A floating-point literal.
    Float(FloatLit),

    /// An annotation opener `(@name`. The stored string is the name.
    LparAnn(String),

    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Keyword(s) => write!(f, "{}", s),
            TokenKind::Id(s) => write!(f, "${}", s),
            TokenKind::Reserved(s) => write!(f, "{}", s),
            TokenKind::String(bytes) => {
                write!(f, "\"")?;
                for &b in bytes {
                    if b.is_ascii_graphic() || b == b' ' {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "\\{:02x}", b)?;
                    }
                }
                write!(f, "\"")
            }
            TokenKind::Integer(lit) => {
                if lit.negative {
                    write!(f, "-{}", lit.value)
                } else {
                    write!(f, "{}", lit.value)
                }
            }
            TokenKind::Float(lit) => write!(f, "{}", lit),
            TokenKind::LparAnn(name) => write!(f, "(@{}", name),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// An integer literal: magnitude, sign, and whether a sign was written.
///
/// Magnitude and sign are kept separate so both the full u64 range and the
/// full i64 range are representable, and `-0` stays distinct from `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLit {
    pub value: u64,
    pub negative: bool,
    pub has_sign: bool,
}

impl IntLit {
    /// A bare literal without a written sign.
    pub fn unsigned(value: u64) -> Self {
        IntLit {
            value,
            negative: false,
            has_sign: false,
        }
    }

    /// An explicitly signed literal (`+N` or `-N`).
    pub fn signed(value: u64, negative: bool) -> Self {
        IntLit {
            value,
            negative,
            has_sign: true,
        }
    }

    /// Converts to u64; negative values (other than `-0`) are out of range.
    #[must_use]
    pub fn to_u64(self) -> Option<u64> {
        if self.negative && self.value != 0 {
            None
        } else {
            Some(self.value)
        }
    }

    /// Converts to u32.
    #[must_use]
    pub fn to_u32(self) -> Option<u32> {
        self.to_u64().and_then(|v| u32::try_from(v).ok())
    }

    /// Converts to i64, accepting the full signed range.
    #[must_use]
    pub fn to_i64(self) -> Option<i64> {
        if self.negative {
            if self.value == 0 {
                Some(0)
            } else if self.value == i64::MAX as u64 + 1 {
                Some(i64::MIN)
            } else if self.value <= i64::MAX as u64 {
                Some(-(self.value as i64))
            } else {
                None
            }
        } else if self.value <= i64::MAX as u64 {
            Some(self.value as i64)
        } else {
            None
        }
    }

    /// Converts to the i32 constant range: `-2^31 ..= u32::MAX`, with
    /// unsigned values above `i32::MAX` wrapping, as the text format allows.
    #[must_use]
    pub fn to_i32_const(self) -> Option<i32> {
        if self.negative {
            if self.value == 0 {
                Some(0)
            } else if self.value <= i32::MAX as u64 + 1 {
                Some((self.value as i64).wrapping_neg() as i32)
            } else {
                None
            }
        } else if self.value <= u32::MAX as u64 {
            Some(self.value as u32 as i32)
        } else {
            None
        }
    }

    /// Converts to the i64 constant range: `-2^63 ..= u64::MAX`.
    #[must_use]
    pub fn to_i64_const(self) -> Option<i64> {
        if self.negative {
            self.to_i64()
        } else {
            Some(self.value as i64)
        }
    }
}

/// The NaN payload variants the text format can spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanPayload {
    /// Plain `nan`.
    None,
    /// `nan:canonical` (assertion scripts only).
    Canonical,
    /// `nan:arithmetic` (assertion scripts only).
    Arithmetic,
    /// `nan:0x...` with explicit significand bits.
    Bits(u64),
}

/// A floating-point literal.
///
/// Decimal and hex forms keep their source text (sign and underscores
/// stripped) so f32 and f64 conversions each round exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum FloatLit {
    Decimal { negative: bool, text: String },
    Hex { negative: bool, text: String },
    Inf { negative: bool },
    Nan { negative: bool, payload: NanPayload },
}

impl FloatLit {
    /// Converts to f32. Returns `None` for values a `f32.const` cannot hold:
    /// overflowing finite literals, zero or oversized NaN payloads, and the
    /// `nan:canonical` / `nan:arithmetic` assertion forms.
    #[must_use]
    pub fn to_f32(&self) -> Option<f32> {
        match self {
            FloatLit::Decimal { negative, text } => {
                let v: f32 = text.parse().ok()?;
                if v.is_infinite() {
                    return None;
                }
                Some(if *negative { -v } else { v })
            }
            FloatLit::Hex { negative, text } => {
                let v = f32::from_hex(text)?;
                if v.is_infinite() {
                    return None;
                }
                Some(if *negative { -v } else { v })
            }
            FloatLit::Inf { negative } => Some(if *negative {
                f32::NEG_INFINITY
            } else {
                f32::INFINITY
            }),
            FloatLit::Nan { negative, payload } => {
                let mut bits: u32 = match payload {
                    NanPayload::None => 0x7fc0_0000,
                    NanPayload::Bits(p) => {
                        if *p == 0 || *p > 0x7f_ffff {
                            return None;
                        }
                        0x7f80_0000 | (*p as u32)
                    }
                    NanPayload::Canonical | NanPayload::Arithmetic => return None,
                };
                if *negative {
                    bits |= 0x8000_0000;
                }
                Some(f32::from_bits(bits))
            }
        }
    }

    /// Converts to f64; see [`FloatLit::to_f32`] for the `None` cases.
    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            FloatLit::Decimal { negative, text } => {
                let v: f64 = text.parse().ok()?;
                if v.is_infinite() {
                    return None;
                }
                Some(if *negative { -v } else { v })
            }
            FloatLit::Hex { negative, text } => {
                let v = f64::from_hex(text)?;
                if v.is_infinite() {
                    return None;
                }
                Some(if *negative { -v } else { v })
            }
            FloatLit::Inf { negative } => Some(if *negative {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            }),
            FloatLit::Nan { negative, payload } => {
                let mut bits: u64 = match payload {
                    NanPayload::None => 0x7ff8_0000_0000_0000,
                    NanPayload::Bits(p) => {
                        if *p == 0 || *p > 0xf_ffff_ffff_ffff {
                            return None;
                        }
                        0x7ff0_0000_0000_0000 | p
                    }
                    NanPayload::Canonical | NanPayload::Arithmetic => return None,
                };
                if *negative {
                    bits |= 0x8000_0000_0000_0000;
                }
                Some(f64::from_bits(bits))
            }
        }
    }
}

impl fmt::Display for FloatLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = |negative: bool| if negative { "-" } else { "" };
        match self {
            FloatLit::Decimal { negative, text } | FloatLit::Hex { negative, text } => {
                write!(f, "{}{}", sign(*negative), text)
            }
            FloatLit::Inf { negative } => write!(f, "{}inf", sign(*negative)),
            FloatLit::Nan { negative, payload } => match payload {
                NanPayload::None => write!(f, "{}nan", sign(*negative)),
                NanPayload::Canonical => write!(f, "{}nan:canonical", sign(*negative)),
                NanPayload::Arithmetic => write!(f, "{}nan:arithmetic", sign(*negative)),
                NanPayload::Bits(p) => write!(f, "{}nan:0x{:x}", sign(*negative), p),
            },
        }
    }
}
