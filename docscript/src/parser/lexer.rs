use std::ops::Range;

use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Token types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    // Literals
    Integer(i64),
    Float(f64),
    Str(String),
    /// f-string body (escapes processed) and the byte offset where the body starts.
    FString(String, usize),
    Name(String),

    // Keywords
    Def,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Not,
    And,
    Or,
    Is,
    Import,
    From,
    As,
    Assert,
    Raise,
    Try,
    Except,
    Finally,
    Pass,
    Break,
    Continue,
    True,
    False,
    None,

    // Operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Arrow,

    // Grouping
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,

    // Layout
    Newline,
    Indent,
    Dedent,
    EndOfFile,
}

impl Token {
    /// Human-readable description used in syntax error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Integer(n) => format!("number {}", n),
            Token::Float(f) => format!("number {}", f),
            Token::Str(_) | Token::FString(..) => "string literal".to_string(),
            Token::Name(name) => format!("name '{}'", name),
            Token::Newline => "end of line".to_string(),
            Token::Indent => "indent".to_string(),
            Token::Dedent => "dedent".to_string(),
            Token::EndOfFile => "end of input".to_string(),
            other => format!("'{}'", other.text()),
        }
    }

    fn text(&self) -> &'static str {
        match self {
            Token::Def => "def",
            Token::Return => "return",
            Token::If => "if",
            Token::Elif => "elif",
            Token::Else => "else",
            Token::While => "while",
            Token::For => "for",
            Token::In => "in",
            Token::Not => "not",
            Token::And => "and",
            Token::Or => "or",
            Token::Is => "is",
            Token::Import => "import",
            Token::From => "from",
            Token::As => "as",
            Token::Assert => "assert",
            Token::Raise => "raise",
            Token::Try => "try",
            Token::Except => "except",
            Token::Finally => "finally",
            Token::Pass => "pass",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::True => "True",
            Token::False => "False",
            Token::None => "None",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::DoubleStar => "**",
            Token::Slash => "/",
            Token::DoubleSlash => "//",
            Token::Percent => "%",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::LtEq => "<=",
            Token::GtEq => ">=",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::Arrow => "->",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Dot => ".",
            Token::Semicolon => ";",
            _ => "?",
        }
    }
}

fn keyword(ident: &str) -> Option<Token> {
    let token = match ident {
        "def" => Token::Def,
        "return" => Token::Return,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "while" => Token::While,
        "for" => Token::For,
        "in" => Token::In,
        "not" => Token::Not,
        "and" => Token::And,
        "or" => Token::Or,
        "is" => Token::Is,
        "import" => Token::Import,
        "from" => Token::From,
        "as" => Token::As,
        "assert" => Token::Assert,
        "raise" => Token::Raise,
        "try" => Token::Try,
        "except" => Token::Except,
        "finally" => Token::Finally,
        "pass" => Token::Pass,
        "break" => Token::Break,
        "continue" => Token::Continue,
        "True" => Token::True,
        "False" => Token::False,
        "None" => Token::None,
        _ => return None,
    };
    Some(token)
}

/// A token with its byte span and the 1-based line it starts on.
#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// Lexer: source text → Token stream with layout tokens
// ---------------------------------------------------------------------------

pub(crate) struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    file_id: usize,
    /// Added to every reported offset (non-zero for embedded fragments).
    base: usize,
    /// Fragments (f-string fields) carry no layout tokens.
    fragment: bool,
    tokens: Vec<Spanned>,
    indents: Vec<usize>,
    /// Bracket nesting; newlines and indentation are insignificant inside brackets.
    depth: usize,
    at_line_start: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file_id: usize) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            line: 1,
            file_id,
            base: 0,
            fragment: false,
            tokens: Vec::new(),
            indents: vec![0],
            depth: 0,
            at_line_start: true,
        }
    }

    /// Lexer for an expression embedded in a larger source (f-string fields).
    pub fn fragment(source: &'a str, base: usize, line: usize, file_id: usize) -> Self {
        Lexer {
            base,
            line,
            fragment: true,
            at_line_start: false,
            ..Lexer::new(source, file_id)
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        while self.pos < self.chars.len() {
            if self.at_line_start && self.layout_active() && !self.begin_line()? {
                continue;
            }
            let Some(c) = self.current() else { break };
            match c {
                '\n' => {
                    let start = self.pos;
                    self.pos += 1;
                    if self.layout_active() {
                        self.push(Token::Newline, start);
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '\\' if self.peek_char(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => self.skip_comment(),
                '"' | '\'' => self.lex_string(self.pos, false, false)?,
                'f' | 'F' | 'r' | 'R' if matches!(self.peek_char(1), Some('"' | '\'')) => {
                    let start = self.pos;
                    let raw = matches!(c, 'r' | 'R');
                    self.pos += 1;
                    self.lex_string(start, raw, !raw)?;
                }
                '0'..='9' => self.lex_number()?,
                '.' if matches!(self.peek_char(1), Some('0'..='9')) => self.lex_number()?,
                c if c == '_' || c.is_alphabetic() => self.lex_name(),
                _ => self.lex_operator()?,
            }
        }
        self.finish()
    }

    fn layout_active(&self) -> bool {
        !self.fragment && self.depth == 0
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_char(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    /// Byte offset (relative to the enclosing source) of the char at `idx`.
    fn offset(&self, idx: usize) -> usize {
        self.base
            + self
                .chars
                .get(idx)
                .map(|&(o, _)| o)
                .unwrap_or(self.source.len())
    }

    fn push(&mut self, token: Token, start_idx: usize) {
        let span = self.offset(start_idx)..self.offset(self.pos);
        self.tokens.push(Spanned {
            token,
            span,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>, start_idx: usize) -> ParseError {
        let span = self.offset(start_idx)..self.offset(self.pos.max(start_idx + 1));
        ParseError::error(message, span, self.line, self.file_id)
    }

    /// Measure indentation at the start of a logical line. Returns false when
    /// the line is blank or comment-only and was skipped.
    fn begin_line(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        let mut idx = self.pos;
        while let Some(&(_, c)) = self.chars.get(idx) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' => width = 0,
                _ => break,
            }
            idx += 1;
        }

        match self.chars.get(idx).map(|&(_, c)| c) {
            None | Some('\r') => {
                self.pos = idx + usize::from(idx < self.chars.len());
                return Ok(false);
            }
            Some('\n') => {
                self.pos = idx + 1;
                self.line += 1;
                return Ok(false);
            }
            Some('#') => {
                self.pos = idx;
                self.skip_comment();
                return Ok(false);
            }
            _ => {}
        }

        self.pos = idx;
        self.at_line_start = false;
        self.apply_indent(width)?;
        Ok(true)
    }

    fn apply_indent(&mut self, width: usize) -> Result<(), ParseError> {
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Token::Indent, self.pos);
            return Ok(());
        }
        while width < self.indents.last().copied().unwrap_or(0) {
            self.indents.pop();
            self.push(Token::Dedent, self.pos);
        }
        if width != self.indents.last().copied().unwrap_or(0) {
            return Err(self.error(
                "unindent does not match any outer indentation level",
                self.pos,
            ));
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn lex_string(&mut self, start: usize, raw: bool, fstring: bool) -> Result<(), ParseError> {
        let quote = self.current().unwrap_or('"');
        let triple = self.peek_char(1) == Some(quote) && self.peek_char(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        let start_line = self.line;
        let body_start = self.offset(self.pos);
        let mut value = String::new();

        loop {
            let Some(c) = self.current() else {
                return Err(self.error("unterminated string literal", start));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_char(1) == Some(quote) && self.peek_char(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
                value.push(c);
                self.pos += 1;
                continue;
            }
            match c {
                '\n' if !triple => {
                    return Err(self.error("unterminated string literal", start));
                }
                '\n' => {
                    self.line += 1;
                    value.push(c);
                    self.pos += 1;
                }
                '\\' => {
                    self.pos += 1;
                    let Some(escaped) = self.current() else {
                        return Err(self.error("unterminated string literal", start));
                    };
                    self.pos += 1;
                    if escaped == '\n' {
                        self.line += 1;
                    }
                    if raw {
                        value.push('\\');
                        value.push(escaped);
                        continue;
                    }
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        '\n' => {}
                        'u' => {
                            let digits: String = (0..4).filter_map(|i| self.peek_char(i)).collect();
                            let decoded = u32::from_str_radix(&digits, 16)
                                .ok()
                                .filter(|_| digits.len() == 4)
                                .and_then(char::from_u32)
                                .ok_or_else(|| self.error("invalid \\u escape", start))?;
                            value.push(decoded);
                            self.pos += 4;
                        }
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                _ => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }

        let token = if fstring {
            Token::FString(value, body_start)
        } else {
            Token::Str(value)
        };
        let span = self.offset(start)..self.offset(self.pos);
        self.tokens.push(Spanned {
            token,
            span,
            line: start_line,
        });
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), ParseError> {
        let start = self.pos;

        if self.current() == Some('0') && matches!(self.peek_char(1), Some('x' | 'X')) {
            self.pos += 2;
            while matches!(self.current(), Some(c) if c.is_ascii_hexdigit() || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[start + 2..self.pos]
                .iter()
                .map(|&(_, c)| c)
                .filter(|c| *c != '_')
                .collect();
            let value = i64::from_str_radix(&digits, 16)
                .map_err(|_| self.error("invalid hexadecimal literal", start))?;
            self.push(Token::Integer(value), start);
            return Ok(());
        }

        let mut is_float = false;
        self.eat_digits();
        if self.current() == Some('.') {
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.current(), Some('e' | 'E')) {
            let signed = matches!(self.peek_char(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if matches!(self.peek_char(digit_at), Some('0'..='9')) {
                is_float = true;
                self.pos += digit_at;
                self.eat_digits();
            }
        }
        if matches!(self.current(), Some(c) if c.is_alphabetic() || c == '_') {
            return Err(self.error("invalid decimal literal", start));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .map(|&(_, c)| c)
            .filter(|c| *c != '_')
            .collect();
        let token = if is_float {
            Token::Float(
                text.parse::<f64>()
                    .map_err(|_| self.error("invalid float literal", start))?,
            )
        } else {
            Token::Integer(
                text.parse::<i64>()
                    .map_err(|_| self.error("integer literal is too large", start))?,
            )
        };
        self.push(token, start);
        Ok(())
    }

    fn eat_digits(&mut self) {
        while matches!(self.current(), Some(c) if c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn lex_name(&mut self) {
        let start = self.pos;
        while matches!(self.current(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let ident: String = self.chars[start..self.pos].iter().map(|&(_, c)| c).collect();
        let token = keyword(&ident).unwrap_or(Token::Name(ident));
        self.push(token, start);
    }

    fn lex_operator(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        let Some(c) = self.current() else {
            return Ok(());
        };
        let next = self.peek_char(1);

        let (token, len) = match (c, next) {
            ('*', Some('*')) => (Token::DoubleStar, 2),
            ('*', Some('=')) => (Token::StarAssign, 2),
            ('*', _) => (Token::Star, 1),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('/', Some('=')) => (Token::SlashAssign, 2),
            ('/', _) => (Token::Slash, 1),
            ('+', Some('=')) => (Token::PlusAssign, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', Some('=')) => (Token::MinusAssign, 2),
            ('-', Some('>')) => (Token::Arrow, 2),
            ('-', _) => (Token::Minus, 1),
            ('%', _) => (Token::Percent, 1),
            ('=', Some('=')) => (Token::EqEq, 2),
            ('=', _) => (Token::Assign, 1),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('>', _) => (Token::Gt, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('.', _) => (Token::Dot, 1),
            (';', _) => (Token::Semicolon, 1),
            _ => {
                self.pos += 1;
                return Err(self.error(format!("invalid character '{}'", c), start));
            }
        };

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => self.depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => {
                self.depth = self.depth.saturating_sub(1)
            }
            _ => {}
        }

        self.pos += len;
        self.push(token, start);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Spanned>, ParseError> {
        if !self.fragment {
            if self.depth > 0 {
                return Err(self.error("unexpected end of input: unclosed bracket", self.pos));
            }
            if !matches!(
                self.tokens.last().map(|t| &t.token),
                None | Some(Token::Newline)
            ) {
                self.push(Token::Newline, self.pos);
            }
            while self.indents.len() > 1 {
                self.indents.pop();
                self.push(Token::Dedent, self.pos);
            }
        }
        self.push(Token::EndOfFile, self.pos);
        Ok(self.tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Lexer::new(source, 0)
            .tokenize()
            .expect("lex failed")
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn indentation_produces_layout_tokens() {
        let tokens = kinds("if x:\n    y\nz\n");
        assert_eq!(
            tokens,
            vec![
                Token::If,
                Token::Name("x".into()),
                Token::Colon,
                Token::Newline,
                Token::Indent,
                Token::Name("y".into()),
                Token::Newline,
                Token::Dedent,
                Token::Name("z".into()),
                Token::Newline,
                Token::EndOfFile,
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let tokens = kinds("# comment\n\npass\n");
        assert_eq!(tokens, vec![Token::Pass, Token::Newline, Token::EndOfFile]);
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let tokens = kinds("f(1,\n  2)\n");
        assert!(!tokens[..tokens.len() - 2].contains(&Token::Newline));
    }

    #[test]
    fn string_escapes_and_quotes() {
        let tokens = kinds(r#"'it\'s' "a\nb""#);
        assert_eq!(tokens[0], Token::Str("it's".into()));
        assert_eq!(tokens[1], Token::Str("a\nb".into()));
    }

    #[test]
    fn lines_are_tracked() {
        let tokens = Lexer::new("a\n\nb\n", 0).tokenize().unwrap();
        let b = tokens
            .iter()
            .find(|t| t.token == Token::Name("b".into()))
            .unwrap();
        assert_eq!(b.line, 3);
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = Lexer::new("if x:\n    y\n  z\n", 0).tokenize().unwrap_err();
        assert!(err.message.contains("unindent"));
        assert_eq!(err.line, 3);
    }
}
