//! Scanner for Cinder source text.
//!
//! The scanner is a hand-rolled state machine over a byte cursor. It is run
//! eagerly: [`tokenize`] produces the complete token array for a file before
//! parsing starts, and the array is retained so the parser can look ahead,
//! look behind, and re-parse token ranges (generic instantiation replays a
//! function body's tokens once per concrete type).
//!
//! String interpolation is the one place the scanner is stateful across
//! `scan` calls: on `$name` or `${expr}` inside a quoted run it emits the
//! literal piece seen so far as [`TokKind::StrInter`], switches itself into
//! expression mode so the embedded tokens come out as ordinary tokens, and
//! resumes string mode afterwards. Block comments nest; `/* /* */ */` scans
//! as one comment.
//!
//! Every failure here is a fatal [`CoreError::Lex`] rendered with full
//! source context; lexing is never recoverable.

use crate::diag::{Diagnostic, Severity};
use crate::error::CoreError;

/// Kind of a token produced by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokKind {
    Eof,

    // Identifiers and literals
    Name,
    Number,
    /// A complete string literal with no interpolation remaining.
    Str,
    /// A string piece that is followed by an interpolated expression. The
    /// tokens of that expression follow in the stream, then another
    /// `StrInter` or the closing `Str` piece.
    StrInter,
    CharLit,
    /// A `#...` line passed through to the C backend verbatim.
    Hash,

    // Punctuation
    LPar,
    RPar,
    LCbr,
    RCbr,
    LSbr,
    RSbr,
    Comma,
    Semicolon,
    Colon,
    Dot,
    DotDot,
    Question,
    Arrow,

    // Operators
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Xor,
    Pipe,
    Amp,
    BitNot,
    Lsh,
    Rsh,
    Not,
    AndAnd,
    OrOr,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Assign,
    DeclAssign,
    PlusAssign,
    MinusAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    LshAssign,
    RshAssign,

    // Keywords
    KeyModule,
    KeyImport,
    KeyConst,
    KeyStruct,
    KeyEnum,
    KeyInterface,
    KeyType,
    KeyFn,
    KeyMut,
    KeyPub,
    KeyIf,
    KeyElse,
    KeyFor,
    KeyIn,
    KeyMatch,
    /// Deprecated spelling of `match`; accepted with a warning.
    KeySwitch,
    KeyReturn,
    KeyBreak,
    KeyContinue,
    KeyDefer,
    KeyOr,
    KeyNone,
    KeyTrue,
    KeyFalse,
    KeyAs,
}

impl TokKind {
    /// Returns true for kinds that begin a string piece.
    pub fn is_string_piece(self) -> bool {
        matches!(self, TokKind::Str | TokKind::StrInter)
    }

    pub fn is_assign_op(self) -> bool {
        matches!(
            self,
            TokKind::Assign
                | TokKind::PlusAssign
                | TokKind::MinusAssign
                | TokKind::MulAssign
                | TokKind::DivAssign
                | TokKind::ModAssign
                | TokKind::AndAssign
                | TokKind::OrAssign
                | TokKind::XorAssign
                | TokKind::LshAssign
                | TokKind::RshAssign
        )
    }

    /// The C spelling of an operator token, used during emission.
    pub fn c_op(self) -> &'static str {
        match self {
            TokKind::Plus => "+",
            TokKind::Minus => "-",
            TokKind::Mul => "*",
            TokKind::Div => "/",
            TokKind::Mod => "%",
            TokKind::Xor => "^",
            TokKind::Pipe => "|",
            TokKind::Amp => "&",
            TokKind::Lsh => "<<",
            TokKind::Rsh => ">>",
            TokKind::AndAnd => "&&",
            TokKind::OrOr => "||",
            TokKind::Eq => "==",
            TokKind::Ne => "!=",
            TokKind::Gt => ">",
            TokKind::Lt => "<",
            TokKind::Ge => ">=",
            TokKind::Le => "<=",
            TokKind::Assign => "=",
            TokKind::PlusAssign => "+=",
            TokKind::MinusAssign => "-=",
            TokKind::MulAssign => "*=",
            TokKind::DivAssign => "/=",
            TokKind::ModAssign => "%=",
            TokKind::AndAssign => "&=",
            TokKind::OrAssign => "|=",
            TokKind::XorAssign => "^=",
            TokKind::LshAssign => "<<=",
            TokKind::RshAssign => ">>=",
            _ => "",
        }
    }
}

/// A single token with its literal text and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokKind,
    pub lit: String,
    /// 1-based source line.
    pub line: u32,
    /// 1-based column.
    pub col: u32,
    /// Index of this token within the produced stream.
    pub index: usize,
}

impl Token {
    pub fn is_key(&self) -> bool {
        matches!(
            self.kind,
            TokKind::KeyModule
                | TokKind::KeyImport
                | TokKind::KeyConst
                | TokKind::KeyStruct
                | TokKind::KeyEnum
                | TokKind::KeyInterface
                | TokKind::KeyType
                | TokKind::KeyFn
                | TokKind::KeyMut
                | TokKind::KeyPub
                | TokKind::KeyIf
                | TokKind::KeyElse
                | TokKind::KeyFor
                | TokKind::KeyIn
                | TokKind::KeyMatch
                | TokKind::KeySwitch
                | TokKind::KeyReturn
                | TokKind::KeyBreak
                | TokKind::KeyContinue
                | TokKind::KeyDefer
                | TokKind::KeyOr
                | TokKind::KeyNone
                | TokKind::KeyTrue
                | TokKind::KeyFalse
                | TokKind::KeyAs
        )
    }
}

/// A restartable cursor into the scanner.
///
/// Saving and restoring positions is how lookahead and string-interpolation
/// rewinds work; outside of explicit restores the byte cursor only moves
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerPos {
    pub pos: usize,
    pub line: u32,
    /// Byte offset just past the most recent newline.
    pub last_nl: usize,
}

/// Scans `source` into the complete token stream for one file.
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Token>, CoreError> {
    let mut scanner = Scanner::new(file, source);
    let mut tokens = Vec::new();
    loop {
        let mut token = scanner.scan()?;
        token.index = tokens.len();
        let done = token.kind == TokKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[derive(Debug)]
pub struct Scanner<'src> {
    file: &'src str,
    source: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    last_nl: usize,
    // String-interpolation state.
    /// End of a `$name` span; tokens are produced normally until the cursor
    /// reaches it, then string mode resumes.
    dollar_end: Option<usize>,
    /// Brace depth inside a `${expr}` interpolation; zero when not inside.
    inter_depth: usize,
    inter_quote: u8,
}

impl<'src> Scanner<'src> {
    pub fn new(file: &'src str, source: &'src str) -> Scanner<'src> {
        // Strip an optional UTF-8 BOM.
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Scanner {
            file,
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            last_nl: 0,
            dollar_end: None,
            inter_depth: 0,
            inter_quote: 0,
        }
    }

    /// Current cursor, for save/restore lookahead.
    pub fn get_pos(&self) -> ScannerPos {
        ScannerPos {
            pos: self.pos,
            line: self.line,
            last_nl: self.last_nl,
        }
    }

    pub fn goto_pos(&mut self, pos: ScannerPos) {
        self.pos = pos.pos;
        self.line = pos.line;
        self.last_nl = pos.last_nl;
    }

    fn col(&self, start: usize) -> u32 {
        (start - self.last_nl) as u32 + 1
    }

    fn peek_char(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn consume_char(&mut self) {
        if let Some(b'\n') = self.peek_char() {
            self.line += 1;
            self.last_nl = self.pos + 1;
        }
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>, start: usize, line: u32) -> CoreError {
        let col = if start >= self.last_nl && line == self.line {
            self.col(start)
        } else {
            1
        };
        let diag = Diagnostic::new(Severity::Lex, message, self.file, self.source, line, col);
        CoreError::Lex {
            message: diag.rendered(),
        }
    }

    fn token(&self, kind: TokKind, lit: impl Into<String>, start: usize, line: u32) -> Token {
        Token {
            kind,
            lit: lit.into(),
            line,
            col: self.col(start),
            index: 0,
        }
    }

    /// Produces the next token, advancing the byte cursor.
    pub fn scan(&mut self) -> Result<Token, CoreError> {
        // Resume a string whose literal run was interrupted by `$name`.
        if self.dollar_end == Some(self.pos) {
            self.dollar_end = None;
            let quote = self.inter_quote;
            return self.scan_string_body(quote, false, self.pos, self.line);
        }

        self.skip_whitespace_and_comments()?;

        let start = self.pos;
        let line = self.line;
        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(self.token(TokKind::Eof, "", start, line)),
        };

        match ch {
            b'\'' | b'"' => {
                self.consume_char();
                self.scan_string_body(ch, false, start, line)
            }
            b'r' if matches!(self.peek_next(), Some(b'\'') | Some(b'"')) => {
                self.consume_char();
                let quote = self.peek_char().unwrap_or(b'\'');
                self.consume_char();
                self.scan_string_body(quote, true, start, line)
            }
            b'`' => self.scan_char_literal(start, line),
            b'0'..=b'9' => self.scan_number(start, line),
            b'#' => {
                // C passthrough line: consume to end of line.
                while let Some(ch) = self.peek_char() {
                    if ch == b'\n' {
                        break;
                    }
                    self.consume_char();
                }
                let lit = &self.source[start..self.pos];
                Ok(self.token(TokKind::Hash, lit, start, line))
            }
            _ if is_name_start(ch) => self.scan_name(start, line),
            _ => self.scan_punct(start, line),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CoreError> {
        loop {
            match self.peek_char() {
                Some(ch) if ch.is_ascii_whitespace() => self.consume_char(),
                Some(b'/') if self.peek_next() == Some(b'/') => {
                    while let Some(ch) = self.peek_char() {
                        if ch == b'\n' {
                            break;
                        }
                        self.consume_char();
                    }
                }
                Some(b'/') if self.peek_next() == Some(b'*') => {
                    let start = self.pos;
                    let start_line = self.line;
                    self.consume_char();
                    self.consume_char();
                    // Block comments nest.
                    let mut depth = 1usize;
                    loop {
                        match (self.peek_char(), self.peek_next()) {
                            (Some(b'/'), Some(b'*')) => {
                                depth += 1;
                                self.consume_char();
                                self.consume_char();
                            }
                            (Some(b'*'), Some(b'/')) => {
                                depth -= 1;
                                self.consume_char();
                                self.consume_char();
                                if depth == 0 {
                                    break;
                                }
                            }
                            (Some(_), _) => self.consume_char(),
                            (None, _) => {
                                return Err(self.error(
                                    "unterminated block comment",
                                    start,
                                    start_line,
                                ));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Scans string content starting at the cursor (just past the opening
    /// quote, or at a resume point). Returns `Str` for a final piece and
    /// `StrInter` for a piece followed by an interpolated expression.
    fn scan_string_body(
        &mut self,
        quote: u8,
        raw: bool,
        start: usize,
        start_line: u32,
    ) -> Result<Token, CoreError> {
        let mut lit = String::new();
        loop {
            let ch = match self.peek_char() {
                Some(ch) => ch,
                None => {
                    return Err(self.error("unterminated string literal", start, start_line));
                }
            };
            if ch == quote {
                self.consume_char();
                return Ok(self.token(TokKind::Str, lit, start, start_line));
            }
            match ch {
                b'\\' if !raw => {
                    // Keep the escape sequence verbatim for the C literal,
                    // except `\$` which suppresses interpolation.
                    self.consume_char();
                    match self.peek_char() {
                        Some(b'$') => {
                            lit.push('$');
                            self.consume_char();
                        }
                        Some(esc) => {
                            lit.push('\\');
                            lit.push(esc as char);
                            self.consume_char();
                        }
                        None => {
                            return Err(self.error(
                                "unterminated string literal",
                                start,
                                start_line,
                            ));
                        }
                    }
                }
                b'$' if !raw && self.peek_next() == Some(b'{') => {
                    self.consume_char();
                    self.consume_char();
                    self.inter_depth = 1;
                    self.inter_quote = quote;
                    return Ok(self.token(TokKind::StrInter, lit, start, start_line));
                }
                b'$' if !raw && self.peek_next().is_some_and(is_name_start) => {
                    self.consume_char();
                    // Pre-scan the `name(.name)*` span; the tokens inside it
                    // come out of `scan` normally, then string mode resumes.
                    let mut end = self.pos;
                    while end < self.bytes.len() && is_name_char(self.bytes[end]) {
                        end += 1;
                    }
                    while end + 1 < self.bytes.len()
                        && self.bytes[end] == b'.'
                        && is_name_start(self.bytes[end + 1])
                    {
                        end += 1;
                        while end < self.bytes.len() && is_name_char(self.bytes[end]) {
                            end += 1;
                        }
                    }
                    self.dollar_end = Some(end);
                    self.inter_quote = quote;
                    return Ok(self.token(TokKind::StrInter, lit, start, start_line));
                }
                _ => {
                    if ch == b'"' && quote == b'\'' {
                        // Double quote inside a single-quoted string must be
                        // escaped in the C output.
                        lit.push('\\');
                    }
                    lit.push(ch as char);
                    self.consume_char();
                }
            }
        }
    }

    fn scan_char_literal(&mut self, start: usize, line: u32) -> Result<Token, CoreError> {
        self.consume_char(); // opening backtick
        let mut lit = String::new();
        loop {
            match self.peek_char() {
                Some(b'`') => {
                    self.consume_char();
                    break;
                }
                Some(b'\\') => {
                    lit.push('\\');
                    self.consume_char();
                    if let Some(esc) = self.peek_char() {
                        lit.push(esc as char);
                        self.consume_char();
                    }
                }
                Some(b'\n') | None => {
                    return Err(self.error("unterminated character literal", start, line));
                }
                Some(ch) => {
                    lit.push(ch as char);
                    self.consume_char();
                }
            }
        }
        if lit.is_empty() {
            return Err(self.error("empty character literal", start, line));
        }
        Ok(self.token(TokKind::CharLit, lit, start, line))
    }

    fn scan_number(&mut self, start: usize, line: u32) -> Result<Token, CoreError> {
        if self.peek_char() == Some(b'0') {
            match self.peek_next() {
                Some(b'x') | Some(b'X') => {
                    return self.scan_radix(start, line, 16, "hexadecimal");
                }
                Some(b'o') | Some(b'O') => {
                    return self.scan_radix(start, line, 8, "octal");
                }
                Some(b'b') | Some(b'B') => {
                    return self.scan_radix(start, line, 2, "binary");
                }
                Some(b'0'..=b'9') => {
                    // Old-style leading-zero octal: every digit must be 0-7.
                    while let Some(ch @ b'0'..=b'9') = self.peek_char() {
                        if ch > b'7' {
                            return Err(self.error(
                                format!("malformed octal literal: digit `{}`", ch as char),
                                start,
                                line,
                            ));
                        }
                        self.consume_char();
                    }
                    let lit = &self.source[start..self.pos];
                    return Ok(self.token(TokKind::Number, lit, start, line));
                }
                _ => {}
            }
        }
        self.scan_decimal_or_float(start, line)
    }

    fn scan_radix(
        &mut self,
        start: usize,
        line: u32,
        radix: u32,
        what: &str,
    ) -> Result<Token, CoreError> {
        self.consume_char(); // 0
        self.consume_char(); // x / o / b
        let digits_start = self.pos;
        while let Some(ch) = self.peek_char() {
            if (ch as char).is_digit(radix) {
                self.consume_char();
            } else {
                break;
            }
        }
        if self.pos == digits_start {
            return Err(self.error(format!("{what} literal has no digits"), start, line));
        }
        if self.peek_char().is_some_and(is_name_char) {
            return Err(self.error(format!("malformed {what} literal"), start, line));
        }
        let lit = &self.source[start..self.pos];
        Ok(self.token(TokKind::Number, lit, start, line))
    }

    /// Shared decimal/float scanner: rejects a second decimal point and an
    /// empty exponent.
    fn scan_decimal_or_float(&mut self, start: usize, line: u32) -> Result<Token, CoreError> {
        while let Some(b'0'..=b'9') = self.peek_char() {
            self.consume_char();
        }
        let mut is_float = false;
        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.consume_char();
            while let Some(b'0'..=b'9') = self.peek_char() {
                self.consume_char();
            }
        }
        if is_float
            && self.peek_char() == Some(b'.')
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            return Err(self.error("too many decimal points in number", start, line));
        }
        if matches!(self.peek_char(), Some(b'e') | Some(b'E')) {
            self.consume_char();
            if matches!(self.peek_char(), Some(b'+') | Some(b'-')) {
                self.consume_char();
            }
            let exp_start = self.pos;
            while let Some(b'0'..=b'9') = self.peek_char() {
                self.consume_char();
            }
            if self.pos == exp_start {
                return Err(self.error("exponent has no digits", start, line));
            }
        }
        let lit = &self.source[start..self.pos];
        Ok(self.token(TokKind::Number, lit, start, line))
    }

    fn scan_name(&mut self, start: usize, line: u32) -> Result<Token, CoreError> {
        while self.peek_char().is_some_and(is_name_char) {
            self.consume_char();
        }
        let lit = &self.source[start..self.pos];
        let kind = match lit {
            "module" => TokKind::KeyModule,
            "import" => TokKind::KeyImport,
            "const" => TokKind::KeyConst,
            "struct" => TokKind::KeyStruct,
            "enum" => TokKind::KeyEnum,
            "interface" => TokKind::KeyInterface,
            "type" => TokKind::KeyType,
            "fn" => TokKind::KeyFn,
            "mut" => TokKind::KeyMut,
            "pub" => TokKind::KeyPub,
            "if" => TokKind::KeyIf,
            "else" => TokKind::KeyElse,
            "for" => TokKind::KeyFor,
            "in" => TokKind::KeyIn,
            "match" => TokKind::KeyMatch,
            "switch" => TokKind::KeySwitch,
            "return" => TokKind::KeyReturn,
            "break" => TokKind::KeyBreak,
            "continue" => TokKind::KeyContinue,
            "defer" => TokKind::KeyDefer,
            "or" => TokKind::KeyOr,
            "none" => TokKind::KeyNone,
            "true" => TokKind::KeyTrue,
            "false" => TokKind::KeyFalse,
            "as" => TokKind::KeyAs,
            _ => TokKind::Name,
        };
        Ok(self.token(kind, lit, start, line))
    }

    fn scan_punct(&mut self, start: usize, line: u32) -> Result<Token, CoreError> {
        let ch = self.peek_char().unwrap_or(0);
        let next = self.peek_next();
        let (kind, len): (TokKind, usize) = match (ch, next) {
            (b'(', _) => (TokKind::LPar, 1),
            (b')', _) => (TokKind::RPar, 1),
            (b'{', _) => {
                if self.inter_depth > 0 {
                    self.inter_depth += 1;
                }
                (TokKind::LCbr, 1)
            }
            (b'}', _) => {
                if self.inter_depth > 1 {
                    self.inter_depth -= 1;
                    (TokKind::RCbr, 1)
                } else if self.inter_depth == 1 {
                    // End of `${expr}`: swallow the brace and resume the
                    // surrounding string.
                    self.inter_depth = 0;
                    self.consume_char();
                    let quote = self.inter_quote;
                    return self.scan_string_body(quote, false, self.pos, self.line);
                } else {
                    (TokKind::RCbr, 1)
                }
            }
            (b'[', _) => (TokKind::LSbr, 1),
            (b']', _) => (TokKind::RSbr, 1),
            (b',', _) => (TokKind::Comma, 1),
            (b';', _) => (TokKind::Semicolon, 1),
            (b':', Some(b'=')) => (TokKind::DeclAssign, 2),
            (b':', _) => (TokKind::Colon, 1),
            (b'.', Some(b'.')) => (TokKind::DotDot, 2),
            (b'.', _) => (TokKind::Dot, 1),
            (b'?', _) => (TokKind::Question, 1),
            (b'+', Some(b'=')) => (TokKind::PlusAssign, 2),
            (b'+', _) => (TokKind::Plus, 1),
            (b'-', Some(b'=')) => (TokKind::MinusAssign, 2),
            (b'-', _) => (TokKind::Minus, 1),
            (b'*', Some(b'=')) => (TokKind::MulAssign, 2),
            (b'*', _) => (TokKind::Mul, 1),
            (b'/', Some(b'=')) => (TokKind::DivAssign, 2),
            (b'/', _) => (TokKind::Div, 1),
            (b'%', Some(b'=')) => (TokKind::ModAssign, 2),
            (b'%', _) => (TokKind::Mod, 1),
            (b'^', Some(b'=')) => (TokKind::XorAssign, 2),
            (b'^', _) => (TokKind::Xor, 1),
            (b'~', _) => (TokKind::BitNot, 1),
            (b'&', Some(b'&')) => (TokKind::AndAnd, 2),
            (b'&', Some(b'=')) => (TokKind::AndAssign, 2),
            (b'&', _) => (TokKind::Amp, 1),
            (b'|', Some(b'|')) => (TokKind::OrOr, 2),
            (b'|', Some(b'=')) => (TokKind::OrAssign, 2),
            (b'|', _) => (TokKind::Pipe, 1),
            (b'=', Some(b'=')) => (TokKind::Eq, 2),
            (b'=', Some(b'>')) => (TokKind::Arrow, 2),
            (b'=', _) => (TokKind::Assign, 1),
            (b'!', Some(b'=')) => (TokKind::Ne, 2),
            (b'!', _) => (TokKind::Not, 1),
            (b'>', Some(b'=')) => (TokKind::Ge, 2),
            (b'>', Some(b'>')) => {
                if self.bytes.get(self.pos + 2) == Some(&b'=') {
                    (TokKind::RshAssign, 3)
                } else {
                    (TokKind::Rsh, 2)
                }
            }
            (b'>', _) => (TokKind::Gt, 1),
            (b'<', Some(b'=')) => (TokKind::Le, 2),
            (b'<', Some(b'<')) => {
                if self.bytes.get(self.pos + 2) == Some(&b'=') {
                    (TokKind::LshAssign, 3)
                } else {
                    (TokKind::Lsh, 2)
                }
            }
            (b'<', _) => (TokKind::Lt, 1),
            _ => {
                return Err(self.error(
                    format!("invalid byte `0x{ch:02x}` in source"),
                    start,
                    line,
                ));
            }
        };
        let lit = &self.source[start..start + len];
        for _ in 0..len {
            self.consume_char();
        }
        Ok(self.token(kind, lit, start, line))
    }
}

fn is_name_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_name_char(ch: u8) -> bool {
    is_name_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokKind> {
        tokenize("test.cdr", source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lits(source: &str) -> Vec<String> {
        tokenize("test.cdr", source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.lit)
            .collect()
    }

    #[test]
    fn scans_declaration_statement() {
        assert_eq!(
            kinds("x := 1 + 2"),
            vec![
                TokKind::Name,
                TokKind::DeclAssign,
                TokKind::Number,
                TokKind::Plus,
                TokKind::Number,
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn arrow_is_a_single_token() {
        assert_eq!(
            kinds("a => b"),
            vec![TokKind::Name, TokKind::Arrow, TokKind::Name, TokKind::Eof]
        );
        // Not to be confused with the one-byte forms on either side.
        assert_eq!(kinds("= >")[..2], [TokKind::Assign, TokKind::Gt]);
    }

    #[test]
    fn byte_cursor_is_monotonic() {
        let source = "fn main() { x := foo(1, 'two') }";
        let mut scanner = Scanner::new("test.cdr", source);
        let mut prev = scanner.get_pos().pos;
        loop {
            let tok = scanner.scan().expect("scan");
            let here = scanner.get_pos().pos;
            assert!(here >= prev, "cursor moved backwards: {here} < {prev}");
            prev = here;
            if tok.kind == TokKind::Eof {
                break;
            }
        }
    }

    #[test]
    fn save_restore_rewinds_cursor() {
        let mut scanner = Scanner::new("test.cdr", "a b c");
        scanner.scan().unwrap();
        let saved = scanner.get_pos();
        let b1 = scanner.scan().unwrap();
        scanner.goto_pos(saved);
        let b2 = scanner.scan().unwrap();
        assert_eq!(b1, b2);
    }

    #[test]
    fn records_lines_and_columns() {
        let tokens = tokenize("test.cdr", "fn main() {\n\tx := 1\n}").unwrap();
        let x = tokens.iter().find(|t| t.lit == "x").unwrap();
        assert_eq!((x.line, x.col), (2, 2));
        let one = tokens.iter().find(|t| t.lit == "1").unwrap();
        assert_eq!(one.line, 2);
    }

    #[test]
    fn strips_byte_order_mark() {
        let tokens = tokenize("test.cdr", "\u{feff}fn").unwrap();
        assert_eq!(tokens[0].kind, TokKind::KeyFn);
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
    }

    #[test]
    fn nested_block_comments_scan_as_one() {
        assert_eq!(
            kinds("a /* outer /* inner */ still comment */ b"),
            vec![TokKind::Name, TokKind::Name, TokKind::Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        let err = tokenize("test.cdr", "/* /* */").unwrap_err();
        assert!(matches!(err, CoreError::Lex { .. }));
        assert!(err.to_string().contains("unterminated block comment"));
    }

    #[test]
    fn number_literal_prefixes() {
        assert_eq!(
            lits("0xff 0o17 0b101 077 1.5 2e10 1.5e-3")[..7],
            ["0xff", "0o17", "0b101", "077", "1.5", "2e10", "1.5e-3"]
        );
    }

    #[test]
    fn malformed_octal_is_fatal() {
        let err = tokenize("test.cdr", "x := 078").unwrap_err();
        assert!(err.to_string().contains("malformed octal"));
    }

    #[test]
    fn double_decimal_point_is_fatal() {
        let err = tokenize("test.cdr", "1.2.3").unwrap_err();
        assert!(err.to_string().contains("too many decimal points"));
    }

    #[test]
    fn empty_exponent_is_fatal() {
        let err = tokenize("test.cdr", "1e").unwrap_err();
        assert!(err.to_string().contains("exponent has no digits"));
    }

    #[test]
    fn plain_string_literal() {
        let tokens = tokenize("test.cdr", "s := 'hello'").unwrap();
        assert_eq!(tokens[2].kind, TokKind::Str);
        assert_eq!(tokens[2].lit, "hello");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = tokenize("test.cdr", "s := 'oops").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn dollar_name_interpolation() {
        assert_eq!(
            kinds("'a $b c'"),
            vec![TokKind::StrInter, TokKind::Name, TokKind::Str, TokKind::Eof]
        );
        assert_eq!(lits("'a $b c'"), vec!["a ", "b", " c", ""]);
    }

    #[test]
    fn dollar_name_with_field_access() {
        assert_eq!(
            kinds("'v=$p.x!'"),
            vec![
                TokKind::StrInter,
                TokKind::Name,
                TokKind::Dot,
                TokKind::Name,
                TokKind::Str,
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn braced_expression_interpolation() {
        assert_eq!(
            kinds("'n=${a + 1}'"),
            vec![
                TokKind::StrInter,
                TokKind::Name,
                TokKind::Plus,
                TokKind::Number,
                TokKind::Str,
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn escaped_dollar_is_literal() {
        let tokens = tokenize("test.cdr", r"'cost \$5'").unwrap();
        assert_eq!(tokens[0].kind, TokKind::Str);
        assert_eq!(tokens[0].lit, "cost $5");
    }

    #[test]
    fn raw_string_skips_interpolation() {
        let tokens = tokenize("test.cdr", r"r'no $subst here'").unwrap();
        assert_eq!(tokens[0].kind, TokKind::Str);
        assert_eq!(tokens[0].lit, "no $subst here");
    }

    #[test]
    fn char_literal_and_escape() {
        let tokens = tokenize("test.cdr", r"`a` `\n`").unwrap();
        assert_eq!(tokens[0].kind, TokKind::CharLit);
        assert_eq!(tokens[0].lit, "a");
        assert_eq!(tokens[1].lit, "\\n");
    }

    #[test]
    fn hash_line_passes_through() {
        let tokens = tokenize("test.cdr", "#include <math.h>\nfn").unwrap();
        assert_eq!(tokens[0].kind, TokKind::Hash);
        assert_eq!(tokens[0].lit, "#include <math.h>");
        assert_eq!(tokens[1].kind, TokKind::KeyFn);
    }

    #[test]
    fn invalid_byte_is_fatal() {
        let err = tokenize("test.cdr", "x := @").unwrap_err();
        assert!(err.to_string().contains("invalid byte"));
    }

    #[test]
    fn compound_operators() {
        assert_eq!(
            kinds("a <<= b >>= c .. d"),
            vec![
                TokKind::Name,
                TokKind::LshAssign,
                TokKind::Name,
                TokKind::RshAssign,
                TokKind::Name,
                TokKind::DotDot,
                TokKind::Name,
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn deprecated_switch_keyword_scans() {
        assert_eq!(kinds("switch")[0], TokKind::KeySwitch);
    }

    #[test]
    fn error_message_carries_position_and_context() {
        let err = tokenize("main.cdr", "fn main() {\n\ts := 'bad\n}").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("main.cdr:2:"), "missing position: {msg}");
        assert!(msg.contains("s := 'bad"), "missing context line: {msg}");
    }
}
