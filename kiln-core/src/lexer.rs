//! Lexer for the kiln statement language.
//!
//! The lexer works one statement at a time: `lex_statement` pulls tokens
//! until it sees a terminator (`;` or a line feed) and then appends an
//! explicit `Eof`. Several statements on one line are lexed by calling it
//! repeatedly on the same `Lexer`.

use crate::error::CoreError;
use crate::span::Span;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Special
    Eof,
    Newline,

    // Identifiers and literals
    Ident,
    Number,
    Str,
    Char,

    // Keywords
    Fn,
    Struct,
    If,
    For,
    Switch,
    Case,
    Break,
    Else,
    True,
    False,

    // Single-character punctuation
    Semi,      // ;
    Colon,     // :
    Comma,     // ,
    Dot,       // .
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Equals,    // =
    Less,      // <
    Greater,   // >
    Bang,      // !
    Amp,       // &
    Pipe,      // |
    Caret,     // ^
    Tilde,     // ~
    /// Any other punctuation character, carrying its own character code.
    Punct(u8),

    // Compound operators
    Arrow,      // ->
    PlusPlus,   // ++
    MinusMinus, // --
    OrOr,       // ||
    EqEq,       // ==
    NotEq,      // !=
    AndAnd,     // &&
    Shl,        // <<
    Shr,        // >>
    GreaterEq,  // >=
    LessEq,     // <=
    PlusEq,     // +=
    MinusEq,    // -=
    StarEq,     // *=
    SlashEq,    // /=
    PercentEq,  // %=
    AmpEq,      // &=
    CaretEq,    // ^=
    PipeEq,     // |=
    ShlEq,      // <<=
    ShrEq,      // >>=
}

impl TokenKind {
    /// Human-readable name used in "expected X, got Y" diagnostics.
    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Eof => "end of file",
            Newline => "newline",
            Ident => "identifier",
            Number => "number",
            Str => "constant string",
            Char => "char",
            Fn => "function",
            Struct => "structure",
            If => "if",
            For => "for",
            Switch => "switch",
            Case => "case",
            Break => "break",
            Else => "else",
            True => "true",
            False => "false",
            Semi => "semicolon",
            Colon => "colon",
            Comma => "comma",
            Dot => "dot",
            LParen => "left parenthesis",
            RParen => "right parenthesis",
            LBrace => "left brace",
            RBrace => "right brace",
            LBracket => "left bracket",
            RBracket => "right bracket",
            Plus => "plus",
            Minus => "minus",
            Star => "star",
            Slash => "slash",
            Percent => "percent",
            Equals => "equals",
            Less => "logical less than",
            Greater => "logical greater than",
            Bang => "not",
            Amp => "bitwise and",
            Pipe => "bitwise or",
            Caret => "bitwise xor",
            Tilde => "bitwise not",
            Punct(_) => "punctuation",
            Arrow => "arrow",
            PlusPlus => "increment",
            MinusMinus => "decrement",
            OrOr => "logical or",
            EqEq => "logical is",
            NotEq => "logical is not",
            AndAnd => "logical and",
            Shl => "left shift",
            Shr => "right shift",
            GreaterEq => "logical greater than or equal",
            LessEq => "logical less than or equal",
            PlusEq => "plus equals",
            MinusEq => "minus equals",
            StarEq => "multiply equals",
            SlashEq => "divide equals",
            PercentEq => "modulo equals",
            AmpEq => "and equals",
            CaretEq => "xor equals",
            PipeEq => "or equals",
            ShlEq => "left shift equals",
            ShrEq => "right shift equals",
        }
    }

    /// True for the tokens that end a statement.
    pub fn is_terminator(self) -> bool {
        matches!(self, TokenKind::Semi | TokenKind::Newline)
    }
}

/// Keywords and multi-character operators, looked up by exact text.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("fn", TokenKind::Fn),
    ("struct", TokenKind::Struct),
    ("if", TokenKind::If),
    ("for", TokenKind::For),
    ("switch", TokenKind::Switch),
    ("case", TokenKind::Case),
    ("break", TokenKind::Break),
    ("else", TokenKind::Else),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("->", TokenKind::Arrow),
    ("--", TokenKind::MinusMinus),
    ("++", TokenKind::PlusPlus),
    ("||", TokenKind::OrOr),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::NotEq),
    ("&&", TokenKind::AndAnd),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    (">=", TokenKind::GreaterEq),
    ("<=", TokenKind::LessEq),
    ("+=", TokenKind::PlusEq),
    ("-=", TokenKind::MinusEq),
    ("*=", TokenKind::StarEq),
    ("/=", TokenKind::SlashEq),
    ("%=", TokenKind::PercentEq),
    ("&=", TokenKind::AmpEq),
    ("^=", TokenKind::CaretEq),
    ("|=", TokenKind::PipeEq),
    ("<<=", TokenKind::ShlEq),
    (">>=", TokenKind::ShrEq),
];

pub fn lookup_keyword(text: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(key, _)| *key == text)
        .map(|(_, kind)| *kind)
}

fn single_punct(ch: u8) -> TokenKind {
    match ch {
        b';' => TokenKind::Semi,
        b':' => TokenKind::Colon,
        b',' => TokenKind::Comma,
        b'.' => TokenKind::Dot,
        b'(' => TokenKind::LParen,
        b')' => TokenKind::RParen,
        b'{' => TokenKind::LBrace,
        b'}' => TokenKind::RBrace,
        b'[' => TokenKind::LBracket,
        b']' => TokenKind::RBracket,
        b'+' => TokenKind::Plus,
        b'-' => TokenKind::Minus,
        b'*' => TokenKind::Star,
        b'/' => TokenKind::Slash,
        b'%' => TokenKind::Percent,
        b'=' => TokenKind::Equals,
        b'<' => TokenKind::Less,
        b'>' => TokenKind::Greater,
        b'!' => TokenKind::Bang,
        b'&' => TokenKind::Amp,
        b'|' => TokenKind::Pipe,
        b'^' => TokenKind::Caret,
        b'~' => TokenKind::Tilde,
        other => TokenKind::Punct(other),
    }
}

/// A single token.
///
/// Identifiers, numbers, strings and chars own their text; everything else
/// is fully described by its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: Option<String>,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token {
            kind,
            text: None,
            span,
        }
    }

    pub fn with_text(kind: TokenKind, text: String, span: Span) -> Self {
        Token {
            kind,
            text: Some(text),
            span,
        }
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Length of the owned payload, zero for payload-less tokens.
    pub fn len(&self) -> usize {
        self.text().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lex the first statement of `source`.
pub fn lex_statement(source: &str) -> Result<Vec<Token>, CoreError> {
    Lexer::new(source).lex_statement()
}

pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            index: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.index
    }

    /// True once only skippable whitespace (or nothing) is left.
    pub fn is_exhausted(&self) -> bool {
        self.bytes[self.index..]
            .iter()
            .all(|&ch| is_blank(ch) || ch == b'\n')
    }

    /// Pull tokens up to and including the next terminator, then append `Eof`.
    pub fn lex_statement(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind.is_terminator();
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens.push(Token::new(TokenKind::Eof, Span::point(self.index as u32)));
        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token, CoreError> {
        while self.peek().is_some_and(is_blank) {
            self.bump();
        }

        let start = self.index;
        let Some(ch) = self.peek() else {
            return Err(CoreError::lex(
                Span::point(start as u32),
                "unexpected end of input, expected `;` or end of line",
            ));
        };

        match ch {
            b'\n' => {
                self.bump();
                Ok(Token::new(TokenKind::Newline, self.span_from(start)))
            }
            b'0'..=b'9' => self.lex_number(start),
            b'"' => self.lex_string(start),
            b'\'' => self.lex_char(start),
            _ if is_ident_start(ch) => Ok(self.lex_ident_or_keyword(start)),
            _ if ch.is_ascii_punctuation() => Ok(self.lex_punct(start)),
            _ => {
                let bad = self.source[start..].chars().next().unwrap_or('\u{fffd}');
                self.index += bad.len_utf8();
                Err(CoreError::lex(
                    self.span_from(start),
                    format!("unexpected character `{}`", bad.escape_default()),
                ))
            }
        }
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, CoreError> {
        let mut numeral = String::new();
        let mut seen_dot = false;
        while let Some(ch) = self.peek() {
            match ch {
                b'0'..=b'9' => numeral.push(ch as char),
                b'_' => {}
                b'.' if seen_dot => {
                    return Err(CoreError::lex(
                        Span::new(start as u32, self.index as u32 + 1),
                        "number has an extra decimal point",
                    ));
                }
                b'.' => {
                    seen_dot = true;
                    numeral.push('.');
                }
                _ => break,
            }
            self.bump();
        }
        Ok(Token::with_text(
            TokenKind::Number,
            numeral,
            self.span_from(start),
        ))
    }

    fn lex_string(&mut self, start: usize) -> Result<Token, CoreError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            let Some(ch) = self.peek_char() else {
                return Err(CoreError::lex(
                    self.span_from(start),
                    "expected string literal end, got end of input",
                ));
            };
            self.index += ch.len_utf8();
            match ch {
                '"' => break,
                '\\' => {
                    let escape_start = self.index - 1;
                    let Some(code) = self.peek_char() else {
                        return Err(CoreError::lex(
                            self.span_from(start),
                            "expected string literal end, got end of input",
                        ));
                    };
                    self.index += code.len_utf8();
                    match unescape(code) {
                        Some(resolved) => value.push(resolved),
                        None => {
                            return Err(CoreError::lex(
                                self.span_from(escape_start),
                                format!("unknown escape sequence `\\{code}`"),
                            ));
                        }
                    }
                }
                _ => value.push(ch),
            }
        }
        Ok(Token::with_text(TokenKind::Str, value, self.span_from(start)))
    }

    fn lex_char(&mut self, start: usize) -> Result<Token, CoreError> {
        self.bump(); // opening quote
        let Some(ch) = self.peek_char() else {
            return Err(CoreError::lex(
                self.span_from(start),
                "expected character literal, got end of input",
            ));
        };
        self.index += ch.len_utf8();
        if self.peek() != Some(b'\'') {
            return Err(CoreError::lex(
                self.span_from(start),
                "character literal contains more than 1 character",
            ));
        }
        self.bump(); // closing quote
        if !ch.is_ascii() {
            return Err(CoreError::lex(
                self.span_from(start),
                format!("character literal `{ch}` does not fit in 8 bits"),
            ));
        }
        Ok(Token::with_text(
            TokenKind::Char,
            ch.to_string(),
            self.span_from(start),
        ))
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> Token {
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        let text = &self.source[start..self.index];
        let span = self.span_from(start);
        match lookup_keyword(text) {
            Some(kind) => Token::new(kind, span),
            None => Token::with_text(TokenKind::Ident, text.to_string(), span),
        }
    }

    /// Longest match over the operator table, falling back to one character.
    fn lex_punct(&mut self, start: usize) -> Token {
        for width in [3, 2] {
            let Some(candidate) = self.bytes.get(start..start + width) else {
                continue;
            };
            if !candidate.iter().all(u8::is_ascii_punctuation) {
                continue;
            }
            let text = &self.source[start..start + width];
            if let Some(kind) = lookup_keyword(text) {
                self.index += width;
                return Token::new(kind, self.span_from(start));
            }
        }
        let ch = self.bytes[start];
        self.bump();
        Token::new(single_punct(ch), self.span_from(start))
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start as u32, self.index as u32)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    fn bump(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
        }
    }
}

fn unescape(code: char) -> Option<char> {
    Some(match code {
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\x0b',
        '\\' => '\\',
        '\'' => '\'',
        '"' => '"',
        '?' => '?',
        '0' => '\0',
        _ => return None,
    })
}

/// Whitespace skipped between tokens. Line feed is not blank: it ends a statement.
fn is_blank(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}
