use std::rc::Rc;

use crate::ast::{
    BinaryOperator, ExceptHandler, Expr, ExprKind, FunctionDef, ImportName, Parameter, Stmt,
    StmtKind, Target,
};
use crate::parser::error::ParseError;
use crate::parser::lexer::{Spanned, Token};

/// Recursive-descent parser over the layout-aware token stream. Statement
/// rules live here; expression rules are in `expression.rs`.
pub(crate) struct StatementParser {
    pub(super) tokens: Vec<Spanned>,
    pub(super) pos: usize,
    pub(super) file_id: usize,
    /// Open expression and block nesting, bounded by [`MAX_NESTING`].
    pub(super) nesting: usize,
}

/// Deepest expression or block nesting accepted before parsing fails.
pub(super) const MAX_NESTING: usize = 64;

impl StatementParser {
    /// `tokens` must end with `Token::EndOfFile`.
    pub fn new(tokens: Vec<Spanned>, file_id: usize) -> Self {
        StatementParser {
            tokens,
            pos: 0,
            file_id,
            nesting: 0,
        }
    }

    /// Enter one level of nesting for the duration of `parse`.
    pub(super) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error_here("too many nested parentheses or blocks"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    pub(super) fn current(&self) -> &Spanned {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    pub(super) fn peek(&self) -> &Token {
        &self.current().token
    }

    pub(super) fn peek_at(&self, ahead: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + ahead).min(last)].token
    }

    pub(super) fn advance(&mut self) -> Spanned {
        let spanned = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        spanned
    }

    pub(super) fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, token: &Token, what: &str) -> Result<Spanned, ParseError> {
        if self.peek() == token {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!(
                "expected {}, found {}",
                what,
                self.peek().describe()
            )))
        }
    }

    pub(super) fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Name(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!(
                "expected identifier, found {}",
                other.describe()
            ))),
        }
    }

    /// End offset of the most recently consumed token.
    pub(super) fn prev_end(&self) -> usize {
        match self.pos.checked_sub(1).and_then(|p| self.tokens.get(p)) {
            Some(t) => t.span.end,
            None => 0,
        }
    }

    pub(super) fn error_here(&self, message: impl Into<String>) -> ParseError {
        let t = self.current();
        ParseError::error(message, t.span.clone(), t.line, self.file_id)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.peek(),
            Token::Newline | Token::Semicolon | Token::EndOfFile
        )
    }

    // ------------------------------------------------------------------
    // Program & statements
    // ------------------------------------------------------------------

    pub fn parse_program(mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::EndOfFile => break,
                Token::Newline => {
                    self.advance();
                }
                Token::Indent => return Err(self.error_here("unexpected indent")),
                _ => self.parse_statement(&mut body)?,
            }
        }
        Ok(body)
    }

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        match self.peek() {
            Token::If => out.push(self.parse_if()?),
            Token::While => out.push(self.parse_while()?),
            Token::For => out.push(self.parse_for()?),
            Token::Def => out.push(self.parse_def()?),
            Token::Try => out.push(self.parse_try()?),
            Token::Elif | Token::Else | Token::Except | Token::Finally => {
                return Err(self.error_here(format!(
                    "invalid syntax: {} without a matching block",
                    self.peek().describe()
                )));
            }
            _ => self.parse_simple_statements(out)?,
        }
        Ok(())
    }

    /// `small (';' small)* NEWLINE`
    fn parse_simple_statements(&mut self, out: &mut Vec<Stmt>) -> Result<(), ParseError> {
        loop {
            out.push(self.parse_small_statement()?);
            if self.eat(&Token::Semicolon) {
                if matches!(self.peek(), Token::Newline | Token::EndOfFile) {
                    break;
                }
                continue;
            }
            break;
        }
        match self.peek() {
            Token::Newline => {
                self.advance();
                Ok(())
            }
            Token::EndOfFile => Ok(()),
            other => Err(self.error_here(format!(
                "invalid syntax: unexpected {}",
                other.describe()
            ))),
        }
    }

    fn parse_small_statement(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current().span.start;
        let line = self.current().line;

        let kind = match self.peek() {
            Token::Pass => {
                self.advance();
                StmtKind::Pass
            }
            Token::Break => {
                self.advance();
                StmtKind::Break
            }
            Token::Continue => {
                self.advance();
                StmtKind::Continue
            }
            Token::Return => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_expression_list()?))
                }
            }
            Token::Raise => {
                self.advance();
                if self.at_statement_end() {
                    StmtKind::Raise(None)
                } else {
                    StmtKind::Raise(Some(self.parse_expr(0)?))
                }
            }
            Token::Import => self.parse_import()?,
            Token::From => self.parse_import_from()?,
            Token::Assert => {
                self.advance();
                let test = self.parse_expr(0)?;
                let message = if self.eat(&Token::Comma) {
                    Some(self.parse_expr(0)?)
                } else {
                    None
                };
                StmtKind::Assert { test, message }
            }
            _ => self.parse_expression_statement()?,
        };

        Ok(Stmt {
            kind,
            line,
            span: start..self.prev_end(),
        })
    }

    fn parse_expression_statement(&mut self) -> Result<StmtKind, ParseError> {
        let expr = self.parse_expression_list()?;

        let augmented = match self.peek() {
            Token::PlusAssign => Some(BinaryOperator::Addition),
            Token::MinusAssign => Some(BinaryOperator::Subtraction),
            Token::StarAssign => Some(BinaryOperator::Multiplication),
            Token::SlashAssign => Some(BinaryOperator::Division),
            _ => None,
        };
        if let Some(operator) = augmented {
            self.advance();
            let target = self.to_target(expr)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error_here(
                    "illegal expression for augmented assignment",
                ));
            }
            let value = self.parse_expression_list()?;
            return Ok(StmtKind::AugmentedAssignment {
                target,
                operator,
                value,
            });
        }

        match self.peek() {
            Token::Assign => {
                self.advance();
                let target = self.to_target(expr)?;
                let value = self.parse_expression_list()?;
                if matches!(self.peek(), Token::Assign) {
                    return Err(self.error_here("chained assignment is not supported"));
                }
                Ok(StmtKind::Assignment { target, value })
            }
            // Annotated assignment; the annotation is parsed and dropped.
            Token::Colon => {
                self.advance();
                self.parse_expr(0)?;
                let target = self.to_target(expr)?;
                if self.eat(&Token::Assign) {
                    let value = self.parse_expression_list()?;
                    Ok(StmtKind::Assignment { target, value })
                } else {
                    Ok(StmtKind::Pass)
                }
            }
            _ => Ok(StmtKind::Expression(expr)),
        }
    }

    pub(super) fn to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        match expr.kind {
            ExprKind::Name(name) => Ok(Target::Name(name)),
            ExprKind::Subscript { value, index } => Ok(Target::Subscript {
                value: *value,
                index: *index,
            }),
            ExprKind::Tuple(items) | ExprKind::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<Result<_, _>>()?,
            )),
            ExprKind::Attribute { attr, .. } => Err(self.error_here(format!(
                "cannot assign to attribute '{}'",
                attr
            ))),
            _ => Err(self.error_here("cannot assign to expression")),
        }
    }

    /// `expr (',' expr)* [',']`, producing a tuple when a comma is present.
    pub(super) fn parse_expression_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_expr(0)?;
        if !matches!(self.peek(), Token::Comma) {
            return Ok(first);
        }
        let start = first.span.start;
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if !self.starts_expression() {
                break;
            }
            items.push(self.parse_expr(0)?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), start..self.prev_end()))
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.peek(),
            Token::Integer(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::FString(..)
                | Token::Name(_)
                | Token::True
                | Token::False
                | Token::None
                | Token::LParen
                | Token::LBracket
                | Token::LBrace
                | Token::Minus
                | Token::Plus
                | Token::Not
        )
    }

    // ------------------------------------------------------------------
    // Compound statements
    // ------------------------------------------------------------------

    /// `':' simple_statements | ':' NEWLINE INDENT statement+ DEDENT`
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.nested(Self::parse_suite_body)
    }

    fn parse_suite_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&Token::Colon, "':'")?;
        let mut body = Vec::new();
        if self.eat(&Token::Newline) {
            self.expect(&Token::Indent, "an indented block")?;
            while !matches!(self.peek(), Token::Dedent | Token::EndOfFile) {
                if self.eat(&Token::Newline) {
                    continue;
                }
                self.parse_statement(&mut body)?;
            }
            self.eat(&Token::Dedent);
        } else {
            self.parse_simple_statements(&mut body)?;
        }
        Ok(body)
    }

    /// Handles both `if` and `elif` (the leading keyword is consumed either way).
    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let head = self.advance();
        let test = self.parse_expr(0)?;
        let body = self.parse_suite()?;
        let orelse = match self.peek() {
            Token::Elif => vec![self.parse_if()?],
            Token::Else => {
                self.advance();
                self.parse_suite()?
            }
            _ => Vec::new(),
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            line: head.line,
            span: head.span.start..self.prev_end(),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let head = self.advance();
        let test = self.parse_expr(0)?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            kind: StmtKind::While { test, body },
            line: head.line,
            span: head.span.start..self.prev_end(),
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let head = self.advance();
        let target = self.parse_target_list()?;
        let target = self.to_target(target)?;
        self.expect(&Token::In, "'in'")?;
        let iter = self.parse_expression_list()?;
        let body = self.parse_suite()?;
        Ok(Stmt {
            kind: StmtKind::For { target, iter, body },
            line: head.line,
            span: head.span.start..self.prev_end(),
        })
    }

    fn parse_def(&mut self) -> Result<Stmt, ParseError> {
        let head = self.advance();
        let name = self.expect_name()?;
        self.expect(&Token::LParen, "'('")?;

        let mut parameters: Vec<Parameter> = Vec::new();
        while !matches!(self.peek(), Token::RParen) {
            let param = self.expect_name()?;
            if self.eat(&Token::Colon) {
                self.parse_expr(0)?;
            }
            let default = if self.eat(&Token::Assign) {
                Some(self.parse_expr(0)?)
            } else {
                None
            };
            if default.is_none() && parameters.iter().any(|p| p.default.is_some()) {
                return Err(self.error_here("non-default argument follows default argument"));
            }
            parameters.push(Parameter {
                name: param,
                default,
            });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        if self.eat(&Token::Arrow) {
            self.parse_expr(0)?;
        }
        let body = self.parse_suite()?;

        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef {
                name,
                parameters,
                body,
            })),
            line: head.line,
            span: head.span.start..self.prev_end(),
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let head = self.advance();
        let body = self.parse_suite()?;

        let mut handlers = Vec::new();
        while self.eat(&Token::Except) {
            let kinds = if matches!(self.peek(), Token::Colon) {
                Vec::new()
            } else {
                let kinds_expr = self.parse_expr(0)?;
                self.exception_kinds(kinds_expr)?
            };
            let binding = if self.eat(&Token::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            let body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                kinds,
                binding,
                body,
            });
        }

        let finalbody = if self.eat(&Token::Finally) {
            self.parse_suite()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error_here("expected 'except' or 'finally' block"));
        }

        Ok(Stmt {
            kind: StmtKind::Try {
                body,
                handlers,
                finalbody,
            },
            line: head.line,
            span: head.span.start..self.prev_end(),
        })
    }

    fn exception_kinds(&self, expr: Expr) -> Result<Vec<String>, ParseError> {
        match expr.kind {
            ExprKind::Name(name) => Ok(vec![name]),
            ExprKind::Tuple(items) => items
                .into_iter()
                .map(|item| match item.kind {
                    ExprKind::Name(name) => Ok(name),
                    _ => Err(self.error_here("expected an exception name")),
                })
                .collect(),
            _ => Err(self.error_here("expected an exception name")),
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn parse_dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_name()?;
        while self.eat(&Token::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let alias = if self.eat(&Token::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_import_from(&mut self) -> Result<StmtKind, ParseError> {
        self.advance();
        let module = self.parse_dotted_name()?;
        self.expect(&Token::Import, "'import'")?;
        if matches!(self.peek(), Token::Star) {
            return Err(self.error_here("wildcard imports are not supported"));
        }
        let parenthesized = self.eat(&Token::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let alias = if self.eat(&Token::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(ImportName { name, alias });
            if !self.eat(&Token::Comma) {
                break;
            }
            if parenthesized && matches!(self.peek(), Token::RParen) {
                break;
            }
        }
        if parenthesized {
            self.expect(&Token::RParen, "')'")?;
        }
        Ok(StmtKind::ImportFrom { module, names })
    }
}
