//! The lexer.
//!
//! Tokenizes CEL source: identifiers, numeric literals (decimal and hex,
//! with the `u`/`U` suffix for uints), the string literal family
//! (single/double/triple quoted, `r`/`R` raw, `b`/`B` bytes, combinable),
//! punctuation and operators, and `// ...` line comments. Every token
//! carries its byte range for diagnostics.

use std::sync::Arc;

use crate::{ast::CodeRange, error::ParseError};

/// A lexical token kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(Arc<str>),
    /// Integer literal magnitude. The sign is applied by the parser so that
    /// `-9223372036854775808` round-trips; a bare literal above `i64::MAX`
    /// is rejected there.
    Int(u64),
    /// `u`/`U`-suffixed integer literal.
    Uint(u64),
    Double(f64),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
    /// `?.`
    DotQuestion,
    /// `[?`
    LBracketQuestion,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    /// The membership operator keyword.
    In,
}

impl TokenKind {
    /// Short description used in "expected X, found Y" parse errors.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Int(_) | Self::Uint(_) => "integer literal".to_owned(),
            Self::Double(_) => "double literal".to_owned(),
            Self::Str(_) => "string literal".to_owned(),
            Self::Bytes(_) => "bytes literal".to_owned(),
            Self::True => "'true'".to_owned(),
            Self::False => "'false'".to_owned(),
            Self::Null => "'null'".to_owned(),
            Self::LParen => "'('".to_owned(),
            Self::RParen => "')'".to_owned(),
            Self::LBracket => "'['".to_owned(),
            Self::RBracket => "']'".to_owned(),
            Self::LBrace => "'{'".to_owned(),
            Self::RBrace => "'}'".to_owned(),
            Self::Comma => "','".to_owned(),
            Self::Dot => "'.'".to_owned(),
            Self::Colon => "':'".to_owned(),
            Self::Question => "'?'".to_owned(),
            Self::DotQuestion => "'?.'".to_owned(),
            Self::LBracketQuestion => "'[?'".to_owned(),
            Self::Plus => "'+'".to_owned(),
            Self::Minus => "'-'".to_owned(),
            Self::Star => "'*'".to_owned(),
            Self::Slash => "'/'".to_owned(),
            Self::Percent => "'%'".to_owned(),
            Self::Bang => "'!'".to_owned(),
            Self::Lt => "'<'".to_owned(),
            Self::Le => "'<='".to_owned(),
            Self::Gt => "'>'".to_owned(),
            Self::Ge => "'>='".to_owned(),
            Self::EqEq => "'=='".to_owned(),
            Self::Ne => "'!='".to_owned(),
            Self::AndAnd => "'&&'".to_owned(),
            Self::OrOr => "'||'".to_owned(),
            Self::In => "'in'".to_owned(),
        }
    }
}

/// A token with its byte range in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub range: CodeRange,
}

/// Identifiers reserved by the language. They may appear as member names and
/// map/string keys, but a bare reference to one is rejected at evaluation.
pub const RESERVED_WORDS: &[&str] = &[
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
    "__proto__",
    "prototype",
];

/// Whether `name` is a reserved identifier.
#[must_use]
pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Tokenizes `source`, or fails with a positioned [`ParseError`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
    }
    .run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Lexer<'_> {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(byte) = self.peek() else {
                break;
            };
            let kind = match byte {
                b'0'..=b'9' => self.lex_number()?,
                b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.lex_number()?,
                b'\'' | b'"' => self.lex_string(false, false)?,
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    if let Some(kind) = self.try_lex_prefixed_string()? {
                        kind
                    } else {
                        self.lex_ident()
                    }
                }
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'[' => {
                    self.pos += 1;
                    if self.peek() == Some(b'?') {
                        self.pos += 1;
                        TokenKind::LBracketQuestion
                    } else {
                        TokenKind::LBracket
                    }
                }
                b']' => self.single(TokenKind::RBracket),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b',' => self.single(TokenKind::Comma),
                b'.' => {
                    self.pos += 1;
                    if self.peek() == Some(b'?') {
                        self.pos += 1;
                        TokenKind::DotQuestion
                    } else {
                        TokenKind::Dot
                    }
                }
                b':' => self.single(TokenKind::Colon),
                b'?' => self.single(TokenKind::Question),
                b'+' => self.single(TokenKind::Plus),
                b'-' => self.single(TokenKind::Minus),
                b'*' => self.single(TokenKind::Star),
                b'/' => self.single(TokenKind::Slash),
                b'%' => self.single(TokenKind::Percent),
                b'!' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokenKind::Ne
                    } else {
                        TokenKind::Bang
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                b'=' => {
                    if self.peek_at(1) == Some(b'=') {
                        self.pos += 2;
                        TokenKind::EqEq
                    } else {
                        return Err(self.error("unexpected character '='", start));
                    }
                }
                b'&' => {
                    if self.peek_at(1) == Some(b'&') {
                        self.pos += 2;
                        TokenKind::AndAnd
                    } else {
                        return Err(self.error("unexpected character '&'", start));
                    }
                }
                b'|' => {
                    if self.peek_at(1) == Some(b'|') {
                        self.pos += 2;
                        TokenKind::OrOr
                    } else {
                        return Err(self.error("unexpected character '|'", start));
                    }
                }
                _ => {
                    let ch = self.source[start..].chars().next().unwrap_or('\u{fffd}');
                    return Err(self.error(format!("unexpected character '{ch}'"), start));
                }
            };
            tokens.push(Token {
                kind,
                range: CodeRange::new(start as u32, self.pos as u32),
            });
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        ParseError::new(message, offset)
    }

    /// Skips whitespace and `// ...` line comments. Comments terminate at a
    /// newline and are never recognized inside string literals (strings are
    /// consumed whole by `lex_string`).
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => self.pos += 1,
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name = &self.source[start..self.pos];
        match name {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "in" => TokenKind::In,
            _ => TokenKind::Ident(Arc::from(name)),
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            if self.pos == digits_start {
                return Err(self.error("expected hex digits after '0x'", start));
            }
            let value = u64::from_str_radix(&self.source[digits_start..self.pos], 16)
                .map_err(|_| self.error("integer literal out of range", start))?;
            return Ok(if self.eat_uint_suffix() {
                TokenKind::Uint(value)
            } else {
                TokenKind::Int(value)
            });
        }

        let mut is_double = false;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut lookahead = self.pos + 1;
            if matches!(self.bytes.get(lookahead), Some(b'+' | b'-')) {
                lookahead += 1;
            }
            if self.bytes.get(lookahead).is_some_and(u8::is_ascii_digit) {
                is_double = true;
                self.pos = lookahead;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.source[start..self.pos];
        if is_double {
            if matches!(self.peek(), Some(b'u' | b'U')) {
                return Err(self.error("'u' suffix is not allowed on a floating literal", self.pos));
            }
            let value: f64 = text
                .parse()
                .map_err(|_| self.error("malformed double literal", start))?;
            Ok(TokenKind::Double(value))
        } else {
            let value: u64 = text
                .parse()
                .map_err(|_| self.error("integer literal out of range", start))?;
            Ok(if self.eat_uint_suffix() {
                TokenKind::Uint(value)
            } else {
                TokenKind::Int(value)
            })
        }
    }

    fn eat_uint_suffix(&mut self) -> bool {
        if matches!(self.peek(), Some(b'u' | b'U')) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Recognizes `r`/`R` and `b`/`B` string prefixes, in either order,
    /// directly before a quote. Returns `None` when the characters are an
    /// ordinary identifier.
    fn try_lex_prefixed_string(&mut self) -> Result<Option<TokenKind>, ParseError> {
        let mut raw = false;
        let mut bytes = false;
        let mut offset = 0;
        loop {
            match self.peek_at(offset) {
                Some(b'r' | b'R') if !raw => raw = true,
                Some(b'b' | b'B') if !bytes => bytes = true,
                Some(b'\'' | b'"') if offset > 0 => {
                    self.pos += offset;
                    return self.lex_string(raw, bytes).map(Some);
                }
                _ => return Ok(None),
            }
            offset += 1;
        }
    }

    fn lex_string(&mut self, raw: bool, bytes: bool) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        let quote = self.peek().expect("caller checked the quote");
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated string literal", start));
            };
            if b == quote {
                if triple {
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                    out.push(b);
                    continue;
                }
                self.pos += 1;
                break;
            }
            if b == b'\n' && !triple {
                return Err(self.error("string literal cannot contain a raw newline", self.pos));
            }
            if b == b'\\' && !raw {
                self.lex_escape(&mut out, bytes)?;
                continue;
            }
            // Consume one whole UTF-8 character so multi-byte content is
            // never split by the quote scan.
            let ch_len = self.source[self.pos..].chars().next().map_or(1, char::len_utf8);
            out.extend_from_slice(&self.bytes[self.pos..self.pos + ch_len]);
            self.pos += ch_len;
        }

        if bytes {
            Ok(TokenKind::Bytes(out.into()))
        } else {
            let text = String::from_utf8(out)
                .map_err(|_| self.error("string literal is not valid UTF-8", start))?;
            Ok(TokenKind::Str(text.into()))
        }
    }

    fn lex_escape(&mut self, out: &mut Vec<u8>, bytes: bool) -> Result<(), ParseError> {
        let escape_start = self.pos;
        self.pos += 1; // backslash
        let Some(b) = self.peek() else {
            return Err(self.error("unterminated escape sequence", escape_start));
        };
        self.pos += 1;
        match b {
            b'\\' => out.push(b'\\'),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'x' => {
                let value = self.hex_digits(2, escape_start)?;
                if bytes {
                    out.push(value as u8);
                } else {
                    self.push_code_point(out, value, escape_start)?;
                }
            }
            b'u' => {
                let value = self.hex_digits(4, escape_start)?;
                self.push_code_point(out, value, escape_start)?;
            }
            b'U' => {
                if bytes {
                    return Err(self.error("\\U escapes are not allowed in bytes literals", escape_start));
                }
                let value = self.hex_digits(8, escape_start)?;
                self.push_code_point(out, value, escape_start)?;
            }
            other => {
                return Err(self.error(
                    format!("invalid escape sequence '\\{}'", char::from(other)),
                    escape_start,
                ));
            }
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize, escape_start: usize) -> Result<u32, ParseError> {
        let mut value: u32 = 0;
        for _ in 0..count {
            let Some(b) = self.peek() else {
                return Err(self.error("unterminated escape sequence", escape_start));
            };
            let digit = char::from(b)
                .to_digit(16)
                .ok_or_else(|| self.error("invalid hex digit in escape sequence", self.pos))?;
            value = value * 16 + digit;
            self.pos += 1;
        }
        Ok(value)
    }

    /// Validates and appends a code point escape. Surrogates (D800–DFFF) and
    /// values above U+10FFFF are rejected.
    fn push_code_point(&self, out: &mut Vec<u8>, value: u32, escape_start: usize) -> Result<(), ParseError> {
        let ch = char::from_u32(value)
            .ok_or_else(|| self.error(format!("invalid code point U+{value:X} in escape sequence"), escape_start))?;
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Int(42)]);
        assert_eq!(kinds("42u"), vec![TokenKind::Uint(42)]);
        assert_eq!(kinds("0x2A 0x2AU"), vec![TokenKind::Int(42), TokenKind::Uint(42)]);
        assert_eq!(kinds("1.5"), vec![TokenKind::Double(1.5)]);
        assert_eq!(kinds(".5"), vec![TokenKind::Double(0.5)]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Double(1000.0)]);
        assert_eq!(kinds("2.5e-1"), vec![TokenKind::Double(0.25)]);
    }

    #[test]
    fn no_uint_suffix_on_double() {
        let err = tokenize("1.5u").unwrap_err();
        assert!(err.message().contains("floating literal"));
    }

    #[test]
    fn dot_not_followed_by_a_digit_is_member_access() {
        assert_eq!(
            kinds("x.size"),
            vec![TokenKind::Ident("x".into()), TokenKind::Dot, TokenKind::Ident("size".into())]
        );
    }

    #[test]
    fn string_forms() {
        assert_eq!(kinds(r#""hi""#), vec![TokenKind::Str("hi".into())]);
        assert_eq!(kinds(r"'hi'"), vec![TokenKind::Str("hi".into())]);
        assert_eq!(kinds("'''a\nb'''"), vec![TokenKind::Str("a\nb".into())]);
        assert_eq!(kinds(r#"r"a\nb""#), vec![TokenKind::Str(r"a\nb".into())]);
        assert_eq!(kinds(r#"b"\x00\xff""#), vec![TokenKind::Bytes(vec![0, 255].into())]);
        assert_eq!(kinds(r#"rb"\x00""#), vec![TokenKind::Bytes(br"\x00".to_vec().into())]);
    }

    #[test]
    fn escapes() {
        assert_eq!(kinds(r#""é""#), vec![TokenKind::Str("é".into())]);
        assert_eq!(kinds(r#""\U0001F604""#), vec![TokenKind::Str("😄".into())]);
        assert!(tokenize(r#""\ud800""#).is_err(), "surrogate must be rejected");
        assert!(tokenize(r#""\U00110000""#).is_err(), "above U+10FFFF must be rejected");
        assert!(tokenize(r#"b"\U0001F604""#).is_err(), "\\U is rejected in bytes");
        assert!(tokenize(r#""\q""#).is_err(), "unknown escape");
    }

    #[test]
    fn raw_newline_rejected_outside_triple_quotes() {
        assert!(tokenize("'a\nb'").is_err());
        assert!(tokenize("\"a\nb\"").is_err());
        assert!(tokenize("'''a\nb'''").is_ok());
    }

    #[test]
    fn comments_end_at_newline() {
        assert_eq!(kinds("1 // two\n+ 2"), vec![TokenKind::Int(1), TokenKind::Plus, TokenKind::Int(2)]);
        // A comment marker inside a string literal is content, not a comment.
        assert_eq!(kinds(r#""http://x""#), vec![TokenKind::Str("http://x".into())]);
    }

    #[test]
    fn optional_tokens() {
        assert_eq!(
            kinds("a.?b[?0]"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::DotQuestion,
                TokenKind::Ident("b".into()),
                TokenKind::LBracketQuestion,
                TokenKind::Int(0),
                TokenKind::RBracket,
            ]
        );
    }

    #[test]
    fn reserved_words_lex_as_identifiers() {
        assert_eq!(kinds("while"), vec![TokenKind::Ident("while".into())]);
        assert!(is_reserved_word("while"));
        assert!(!is_reserved_word("whilex"));
    }
}
