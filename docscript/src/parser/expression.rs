use std::ops::Range;

use crate::ast::{
    BinaryOperator, CompareOperator, Expr, ExprKind, FStringPart, LogicalOperator, UnaryOperator,
};
use crate::parser::error::ParseError;
use crate::parser::lexer::{Lexer, Token};
use crate::parser::statement::StatementParser;

// Binding powers (precedence). Higher = tighter binding.
// Left bp, right bp. For left-assoc: right = left + 1. For right-assoc: right = left - 1.
const BP_CONDITIONAL: u8 = 2; // x if c else y
const BP_OR: u8 = 4; // or
const BP_AND: u8 = 6; // and
const BP_NOT: u8 = 8; // not
const BP_COMPARISON: u8 = 10; // == != < > <= >= in not in is is not
const BP_ADDITIVE: u8 = 12; // + -
const BP_MULTIPLICATIVE: u8 = 14; // * / // %
const BP_UNARY: u8 = 16; // -x +x
const BP_POWER: u8 = 18; // **

fn infix_bp(token: &Token, next: &Token) -> Option<(u8, u8)> {
    match token {
        Token::If => Some((BP_CONDITIONAL, BP_CONDITIONAL)),
        Token::Or => Some((BP_OR, BP_OR + 1)),
        Token::And => Some((BP_AND, BP_AND + 1)),
        Token::EqEq
        | Token::NotEq
        | Token::Lt
        | Token::Gt
        | Token::LtEq
        | Token::GtEq
        | Token::In
        | Token::Is => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        Token::Not if matches!(next, Token::In) => Some((BP_COMPARISON, BP_COMPARISON + 1)),
        Token::Plus | Token::Minus => Some((BP_ADDITIVE, BP_ADDITIVE + 1)),
        Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent => {
            Some((BP_MULTIPLICATIVE, BP_MULTIPLICATIVE + 1))
        }
        Token::DoubleStar => Some((BP_POWER, BP_POWER - 1)),
        _ => None,
    }
}

fn binary(operator: BinaryOperator, left: Expr, right: Expr) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::BinaryOperation {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn comparison(operator: CompareOperator, left: Expr, right: Expr) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::Comparison {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn logical(operator: LogicalOperator, left: Expr, right: Expr) -> Expr {
    let span = left.span.start..right.span.end;
    Expr::new(
        ExprKind::Logical {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

// ---------------------------------------------------------------------------
// Pratt parser
// ---------------------------------------------------------------------------

impl StatementParser {
    pub(super) fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        self.nested(|parser| parser.parse_expr_at(min_bp))
    }

    fn parse_expr_at(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut left = self.parse_prefix()?;
        // Right operand of the previous comparison, for `a < b < c` chains.
        let mut chain_right: Option<Expr> = None;

        loop {
            let Some((l_bp, r_bp)) = infix_bp(self.peek(), self.peek_at(1)) else {
                break;
            };
            if l_bp < min_bp {
                break;
            }

            // Special case: conditional expression
            if matches!(self.peek(), Token::If) {
                self.advance();
                let test = self.parse_expr(BP_OR)?;
                self.expect(&Token::Else, "'else'")?;
                let orelse = self.parse_expr(BP_CONDITIONAL)?;
                let span = left.span.start..orelse.span.end;
                left = Expr::new(
                    ExprKind::Conditional {
                        test: Box::new(test),
                        body: Box::new(left),
                        orelse: Box::new(orelse),
                    },
                    span,
                );
                chain_right = None;
                continue;
            }

            let op = self.advance().token;

            let compare = match op {
                Token::EqEq => Some(CompareOperator::Equality),
                Token::NotEq => Some(CompareOperator::Inequality),
                Token::Lt => Some(CompareOperator::LessThan),
                Token::LtEq => Some(CompareOperator::LessThanOrEqual),
                Token::Gt => Some(CompareOperator::GreaterThan),
                Token::GtEq => Some(CompareOperator::GreaterThanOrEqual),
                Token::In => Some(CompareOperator::In),
                Token::Not => {
                    self.expect(&Token::In, "'in'")?;
                    Some(CompareOperator::NotIn)
                }
                Token::Is => Some(if self.eat(&Token::Not) {
                    CompareOperator::IsNot
                } else {
                    CompareOperator::Is
                }),
                _ => None,
            };

            if let Some(operator) = compare {
                let right = self.parse_expr(r_bp)?;
                left = match chain_right.take() {
                    None => comparison(operator, left, right.clone()),
                    Some(previous) => {
                        let link = comparison(operator, previous, right.clone());
                        logical(LogicalOperator::And, left, link)
                    }
                };
                chain_right = Some(right);
                continue;
            }

            chain_right = None;
            let right = self.parse_expr(r_bp)?;
            left = match op {
                Token::Or => logical(LogicalOperator::Or, left, right),
                Token::And => logical(LogicalOperator::And, left, right),
                Token::Plus => binary(BinaryOperator::Addition, left, right),
                Token::Minus => binary(BinaryOperator::Subtraction, left, right),
                Token::Star => binary(BinaryOperator::Multiplication, left, right),
                Token::Slash => binary(BinaryOperator::Division, left, right),
                Token::DoubleSlash => binary(BinaryOperator::FloorDivision, left, right),
                Token::Percent => binary(BinaryOperator::Modulo, left, right),
                Token::DoubleStar => binary(BinaryOperator::Power, left, right),
                _ => return Err(self.error_here("unexpected infix operator")),
            };
        }

        Ok(left)
    }

    /// A loop or comprehension target: binds tighter than `in`.
    pub(super) fn parse_target_list(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_expr(BP_COMPARISON + 1)?;
        if !matches!(self.peek(), Token::Comma) {
            return Ok(first);
        }
        let start = first.span.start;
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if matches!(self.peek(), Token::In) {
                break;
            }
            items.push(self.parse_expr(BP_COMPARISON + 1)?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), start..self.prev_end()))
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        let start = token.span.start;

        let atom = match token.token {
            // Literals
            Token::Integer(n) => Expr::new(ExprKind::IntegerLiteral(n), token.span),
            Token::Float(f) => Expr::new(ExprKind::FloatLiteral(f), token.span),
            Token::Str(s) => {
                // Adjacent literals concatenate: "a" "b"
                let mut value = s;
                while let Token::Str(next) = self.peek().clone() {
                    value.push_str(&next);
                    self.advance();
                }
                Expr::new(ExprKind::StringLiteral(value), start..self.prev_end())
            }
            Token::FString(body, body_offset) => {
                self.parse_fstring(&body, body_offset, token.span, token.line)?
            }
            Token::True => Expr::new(ExprKind::BooleanLiteral(true), token.span),
            Token::False => Expr::new(ExprKind::BooleanLiteral(false), token.span),
            Token::None => Expr::new(ExprKind::NoneLiteral, token.span),

            // References
            Token::Name(name) => Expr::new(ExprKind::Name(name), token.span),

            // Unary operators
            Token::Minus | Token::Plus | Token::Not => {
                let (operator, bp) = match token.token {
                    Token::Minus => (UnaryOperator::Negation, BP_UNARY),
                    Token::Plus => (UnaryOperator::Identity, BP_UNARY),
                    _ => (UnaryOperator::LogicalNot, BP_NOT),
                };
                let operand = self.parse_expr(bp)?;
                let span = start..operand.span.end;
                return Ok(Expr::new(
                    ExprKind::UnaryOperation {
                        operator,
                        operand: Box::new(operand),
                    },
                    span,
                ));
            }

            // Grouping and displays
            Token::LParen => self.parse_parenthesized(start)?,
            Token::LBracket => self.parse_list_display(start)?,
            Token::LBrace => self.parse_dict_display(start)?,

            other => {
                return Err(ParseError::error(
                    format!("invalid syntax: unexpected {}", other.describe()),
                    token.span,
                    token.line,
                    self.file_id,
                ));
            }
        };

        self.parse_trailers(atom)
    }

    /// Calls, subscripts and attribute access after an atom.
    fn parse_trailers(&mut self, mut expr: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.peek() {
                Token::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    let span = expr.span.start..self.prev_end();
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        span,
                    );
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_subscript_index()?;
                    self.expect(&Token::RBracket, "']'")?;
                    let span = expr.span.start..self.prev_end();
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                Token::Dot => {
                    self.advance();
                    let attr = self.expect_name()?;
                    let span = expr.span.start..self.prev_end();
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Arguments after the opening parenthesis, consuming the closing one.
    fn parse_call_arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        loop {
            if self.eat(&Token::RParen) {
                break;
            }
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Name(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                keywords.push((name, self.parse_expr(0)?));
            } else {
                if !keywords.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                args.push(self.parse_expr(0)?);
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen, "')'")?;
                break;
            }
        }
        Ok((args, keywords))
    }

    fn parse_subscript_index(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().span.start;
        let lower = if matches!(self.peek(), Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr(0)?))
        };
        if !self.eat(&Token::Colon) {
            return match lower {
                Some(index) => Ok(*index),
                None => Err(self.error_here("expected subscript")),
            };
        }
        let upper = if matches!(self.peek(), Token::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_expr(0)?))
        };
        Ok(Expr::new(
            ExprKind::Slice { lower, upper },
            start..self.prev_end(),
        ))
    }

    /// `()`, `(expr)` or a tuple display; the `(` is already consumed.
    fn parse_parenthesized(&mut self, start: usize) -> Result<Expr, ParseError> {
        if self.eat(&Token::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), start..self.prev_end()));
        }
        let first = self.parse_expr(0)?;
        if self.eat(&Token::RParen) {
            return Ok(first);
        }
        if !matches!(self.peek(), Token::Comma) {
            self.expect(&Token::RParen, "')'")?;
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if matches!(self.peek(), Token::RParen) {
                break;
            }
            items.push(self.parse_expr(0)?);
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(Expr::new(ExprKind::Tuple(items), start..self.prev_end()))
    }

    /// List display or list comprehension; the `[` is already consumed.
    fn parse_list_display(&mut self, start: usize) -> Result<Expr, ParseError> {
        if self.eat(&Token::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), start..self.prev_end()));
        }
        let first = self.parse_expr(0)?;

        if self.eat(&Token::For) {
            let target = self.parse_target_list()?;
            let target = self.to_target(target)?;
            self.expect(&Token::In, "'in'")?;
            let iter = self.parse_expr(BP_OR)?;
            let condition = if self.eat(&Token::If) {
                Some(Box::new(self.parse_expr(BP_OR)?))
            } else {
                None
            };
            self.expect(&Token::RBracket, "']'")?;
            return Ok(Expr::new(
                ExprKind::ListComprehension {
                    element: Box::new(first),
                    target: Box::new(target),
                    iter: Box::new(iter),
                    condition,
                },
                start..self.prev_end(),
            ));
        }

        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if matches!(self.peek(), Token::RBracket) {
                break;
            }
            items.push(self.parse_expr(0)?);
        }
        self.expect(&Token::RBracket, "']'")?;
        Ok(Expr::new(ExprKind::List(items), start..self.prev_end()))
    }

    /// Dict display; the `{` is already consumed.
    fn parse_dict_display(&mut self, start: usize) -> Result<Expr, ParseError> {
        let mut entries = Vec::new();
        while !matches!(self.peek(), Token::RBrace) {
            let key = self.parse_expr(0)?;
            if !self.eat(&Token::Colon) {
                return Err(self.error_here("expected ':' (set displays are not supported)"));
            }
            let value = self.parse_expr(0)?;
            entries.push((key, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(Expr::new(ExprKind::Dict(entries), start..self.prev_end()))
    }

    /// Split an f-string body into literal text and `{expr}` fields.
    fn parse_fstring(
        &self,
        body: &str,
        body_offset: usize,
        span: Range<usize>,
        line: usize,
    ) -> Result<Expr, ParseError> {
        let chars: Vec<(usize, char)> = body.char_indices().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < chars.len() {
            let (idx, c) = chars[i];
            let next = chars.get(i + 1).map(|&(_, n)| n);
            match c {
                '{' if next == Some('{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if next == Some('}') => {
                    literal.push('}');
                    i += 2;
                }
                '{' => {
                    let mut depth = 0usize;
                    let mut j = i + 1;
                    while j < chars.len() {
                        match chars[j].1 {
                            '{' | '(' | '[' => depth += 1,
                            '}' if depth == 0 => break,
                            '}' | ')' | ']' => depth = depth.saturating_sub(1),
                            _ => {}
                        }
                        j += 1;
                    }
                    if j == chars.len() {
                        return Err(ParseError::error(
                            "f-string: expecting '}'",
                            span,
                            line,
                            self.file_id,
                        ));
                    }

                    let field = idx + 1..chars[j].0;
                    let mut text = &body[field.clone()];
                    let repr = match text.trim_end().strip_suffix("!r") {
                        Some(stripped) => {
                            text = stripped;
                            true
                        }
                        None => false,
                    };

                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    let tokens =
                        Lexer::fragment(text, body_offset + field.start, line, self.file_id)
                            .tokenize()?;
                    let expr = StatementParser::new(tokens, self.file_id).parse_fragment()?;
                    parts.push(FStringPart::Expression(expr, repr));
                    i = j + 1;
                }
                '}' => {
                    return Err(ParseError::error(
                        "f-string: single '}' is not allowed",
                        span,
                        line,
                        self.file_id,
                    )
                    .with_note("write '}}' for a literal brace"));
                }
                _ => {
                    literal.push(c);
                    i += 1;
                }
            }
        }

        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        Ok(Expr::new(ExprKind::FString(parts), span))
    }

    /// A complete standalone expression (f-string field).
    fn parse_fragment(mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr(0)?;
        if !matches!(self.peek(), Token::EndOfFile) {
            return Err(self.error_here(format!(
                "f-string: unexpected {}",
                self.peek().describe()
            )));
        }
        Ok(expr)
    }
}
