//! Lexer for Geode sources.

use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::span::{FileId, Span};

/// Kind of a token produced by the lexer.
///
/// Operators are not split into individual kinds: the parser looks
/// them up by spelling in its precedence table, so every operator
/// comes out as `Operator` and its text carries the meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,
    BoolLiteral, // true / false

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Semi,     // ;
    Colon,    // :
    Dot,      // .
    Ellipsis, // ...
    Question, // ?
    Arrow,    // ->

    Operator,

    // Keywords
    Is,
    Include,
    Link,
    Func,
    Pure, // pure / λ
    Class,
    Return,
    If,
    Else,
    While,
    For,
    Let,
    As,
    Nil,
    Sizeof,
    Info,
}

impl TokenKind {
    /// Human readable name used in syntax errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of input",
            TokenKind::Ident => "identifier",
            TokenKind::IntLiteral => "integer literal",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::CharLiteral => "character literal",
            TokenKind::BoolLiteral => "boolean literal",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Dot => "`.`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::Question => "`?`",
            TokenKind::Arrow => "`->`",
            TokenKind::Operator => "operator",
            TokenKind::Is => "`is`",
            TokenKind::Include => "`include`",
            TokenKind::Link => "`link`",
            TokenKind::Func => "`func`",
            TokenKind::Pure => "`pure`",
            TokenKind::Class => "`class`",
            TokenKind::Return => "`return`",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::For => "`for`",
            TokenKind::Let => "`let`",
            TokenKind::As => "`as`",
            TokenKind::Nil => "`nil`",
            TokenKind::Sizeof => "`sizeof`",
            TokenKind::Info => "`info`",
        }
    }
}

/// A single token with its kind and span.
///
/// The `text_start` / `text_end` fields are byte offsets into the
/// original source string. For string and character literals they
/// cover the contents without the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub text_start: u32,
    pub text_end: u32,
}

impl Token {
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        source
            .get(self.text_start as usize..self.text_end as usize)
            .unwrap_or("")
    }
}

/// Result of lexing a source file.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LexResult {
    /// Fail on the first lex diagnostic.
    pub fn into_tokens(self) -> Result<Vec<Token>, CoreError> {
        match self.diagnostics.into_iter().next() {
            Some(diag) => Err(CoreError::Lex {
                message: diag.message,
                span: diag.span,
            }),
            None => Ok(self.tokens),
        }
    }
}

/// Multi-character operators, longest first.
const COMPOUND_OPERATORS: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=", ":=",
];

/// Lex a source string into tokens. The stream always ends with `Eof`.
pub fn lex(file_id: FileId, source: &str) -> LexResult {
    let mut lexer = Lexer {
        file_id,
        source,
        chars: source.as_bytes(),
        len: source.len(),
        index: 0,
        line: 1,
        line_start: 0,
        token_line: 1,
        token_column: 1,
        diagnostics: Vec::new(),
    };
    lexer.run()
}

struct Lexer<'src> {
    file_id: FileId,
    source: &'src str,
    chars: &'src [u8],
    len: usize,
    index: usize,
    line: u32,
    line_start: usize,
    token_line: u32,
    token_column: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> LexResult {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }
            if ch == b'#' {
                self.skip_line_comment();
                continue;
            }
            if ch == b'{' && self.peek_next() == Some(b'-') {
                self.skip_block_comment();
                continue;
            }

            self.mark_token_start();
            let start = self.index as u32;
            let token = match ch {
                b'(' => self.single(TokenKind::LParen, start),
                b')' => self.single(TokenKind::RParen, start),
                b'{' => self.single(TokenKind::LBrace, start),
                b'}' => self.single(TokenKind::RBrace, start),
                b'[' => self.single(TokenKind::LBracket, start),
                b']' => self.single(TokenKind::RBracket, start),
                b',' => self.single(TokenKind::Comma, start),
                b';' => self.single(TokenKind::Semi, start),
                b'?' => self.single(TokenKind::Question, start),
                b'.' => {
                    if self.peek_next() == Some(b'.') && self.chars.get(self.index + 2) == Some(&b'.')
                    {
                        self.consume_char();
                        self.consume_char();
                        self.single(TokenKind::Ellipsis, start)
                    } else {
                        self.single(TokenKind::Dot, start)
                    }
                }
                b'-' if self.peek_next() == Some(b'>') => {
                    self.consume_char(); // '-'
                    self.single(TokenKind::Arrow, start)
                }
                b':' if self.peek_next() != Some(b'=') => self.single(TokenKind::Colon, start),
                // `λ` is U+03BB, two bytes in UTF-8.
                0xCE if self.peek_next() == Some(0xBB) => {
                    self.consume_char();
                    self.single(TokenKind::Pure, start)
                }
                b'"' => self.lex_string(start),
                b'\'' => self.lex_char(start),
                b'0'..=b'9' => self.lex_number(start),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => self.lex_operator(start),
            };

            if let Some(tok) = token {
                tokens.push(tok);
            }
        }

        self.mark_token_start();
        let eof_span = self.span_from(self.len as u32);
        tokens.push(Token {
            kind: TokenKind::Eof,
            span: eof_span,
            text_start: self.len as u32,
            text_end: self.len as u32,
        });

        LexResult {
            tokens,
            diagnostics: core::mem::take(&mut self.diagnostics),
        }
    }

    fn mark_token_start(&mut self) {
        self.token_line = self.line;
        self.token_column = (self.index - self.line_start) as u32 + 1;
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(self.file_id, start, self.index as u32).at(self.token_line, self.token_column)
    }

    /// Consume one byte and produce a token of `kind` for it.
    fn single(&mut self, kind: TokenKind, start: u32) -> Option<Token> {
        self.consume_char();
        self.simple_token(kind, start)
    }

    fn simple_token(&self, kind: TokenKind, start: u32) -> Option<Token> {
        Some(Token {
            kind,
            span: self.span_from(start),
            text_start: start,
            text_end: self.index as u32,
        })
    }

    fn error(&mut self, message: &str, code: &'static str, start: u32) -> Option<Token> {
        let diag = Diagnostic::error(message, self.span_from(start)).with_code(code);
        self.diagnostics.push(diag);
        None
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn skip_block_comment(&mut self) {
        self.mark_token_start();
        let start = self.index as u32;
        self.consume_char(); // '{'
        self.consume_char(); // '-'
        while let Some(ch) = self.peek_char() {
            if ch == b'-' && self.peek_next() == Some(b'}') {
                self.consume_char();
                self.consume_char();
                return;
            }
            self.consume_char();
        }
        self.error("unterminated block comment", "E0003", start);
    }

    fn lex_operator(&mut self, start: u32) -> Option<Token> {
        let rest = &self.chars[self.index..];
        if let Some(op) = COMPOUND_OPERATORS
            .iter()
            .find(|op| rest.starts_with(op.as_bytes()))
        {
            for _ in 0..op.len() {
                self.consume_char();
            }
            return self.simple_token(TokenKind::Operator, start);
        }
        match rest.first().copied() {
            Some(b'+' | b'-' | b'*' | b'/' | b'%' | b'^' | b'=' | b'<' | b'>' | b'!' | b'&' | b'|') => {
                self.single(TokenKind::Operator, start)
            }
            _ => {
                self.consume_char();
                self.error("unexpected character", "E0001", start)
            }
        }
    }

    fn lex_string(&mut self, start: u32) -> Option<Token> {
        self.consume_char(); // opening quote

        let content_start = self.index;
        while let Some(ch) = self.peek_char() {
            match ch {
                b'"' => {
                    let content_end = self.index;
                    self.consume_char(); // closing quote
                    return Some(Token {
                        kind: TokenKind::StringLiteral,
                        span: self.span_from(start),
                        text_start: content_start as u32,
                        text_end: content_end as u32,
                    });
                }
                b'\\' => {
                    self.consume_char();
                    if self.peek_char().is_some() {
                        self.consume_char();
                    }
                }
                _ => self.consume_char(),
            }
        }

        self.error("unterminated string literal", "E0002", start)
    }

    fn lex_char(&mut self, start: u32) -> Option<Token> {
        self.consume_char(); // opening quote
        let content_start = self.index;
        if self.peek_char() == Some(b'\\') {
            self.consume_char();
        }
        if self.peek_char().is_some() {
            self.consume_char();
        }
        let content_end = self.index;
        if self.peek_char() != Some(b'\'') {
            return self.error("unterminated character literal", "E0002", start);
        }
        self.consume_char(); // closing quote
        Some(Token {
            kind: TokenKind::CharLiteral,
            span: self.span_from(start),
            text_start: content_start as u32,
            text_end: content_end as u32,
        })
    }

    fn lex_number(&mut self, start: u32) -> Option<Token> {
        // integer or float: digits [ '.' digits ]?
        self.consume_digits();

        let mut is_float = false;
        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.consume_char(); // '.'
            self.consume_digits();
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        self.simple_token(kind, start)
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn lex_ident_or_keyword(&mut self, start: u32) -> Option<Token> {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        let text = &self.source[start as usize..self.index];
        let kind = match text {
            "is" => TokenKind::Is,
            "include" => TokenKind::Include,
            "link" => TokenKind::Link,
            "func" => TokenKind::Func,
            "pure" => TokenKind::Pure,
            "class" => TokenKind::Class,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "let" => TokenKind::Let,
            "as" => TokenKind::As,
            "nil" => TokenKind::Nil,
            "sizeof" => TokenKind::Sizeof,
            "info" => TokenKind::Info,
            "true" | "false" => TokenKind::BoolLiteral,
            _ => TokenKind::Ident,
        };
        self.simple_token(kind, start)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.len {
            if self.chars[self.index] == b'\n' {
                self.line += 1;
                self.line_start = self.index + 1;
            }
            self.index += 1;
        }
    }
}

/// Resolve backslash escapes in the raw contents of a string or
/// character literal.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
