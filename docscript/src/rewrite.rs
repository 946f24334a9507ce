//! Assertion instrumentation.
//!
//! A plain `assert` only knows its test was falsy. The rewriter turns every
//! assert into a [`StmtKind::CheckedAssert`] that carries the literal test
//! text and, for a single comparison, both operand expressions so the
//! interpreter can explain the mismatch (`assert 'A' == 'B'`, `- B`, `+ A`).

use std::rc::Rc;

use crate::Program;
use crate::ast::{AssertCheck, AssertComparison, ExceptHandler, ExprKind, FunctionDef, Stmt, StmtKind};

/// A transformation applied to a parsed program before it is executed.
pub trait Instrument {
    fn instrument(&self, program: Program) -> Program;
}

/// Rewrites `assert` statements so failures carry an explanation.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssertionRewriter;

/// Leaves the program untouched. Failed asserts report only their message.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainAsserts;

impl Instrument for PlainAsserts {
    fn instrument(&self, program: Program) -> Program {
        program
    }
}

impl Instrument for AssertionRewriter {
    fn instrument(&self, program: Program) -> Program {
        let Program {
            body,
            source,
            source_id,
        } = program;
        let mut count = 0usize;
        let body = rewrite_block(body, &source, &mut count);
        log::trace!("rewrote {count} assert statement(s) in source {source_id}");
        Program {
            body,
            source,
            source_id,
        }
    }
}

fn rewrite_block(body: Vec<Stmt>, source: &str, count: &mut usize) -> Vec<Stmt> {
    body.into_iter()
        .map(|stmt| rewrite_stmt(stmt, source, count))
        .collect()
}

fn rewrite_stmt(stmt: Stmt, source: &str, count: &mut usize) -> Stmt {
    let Stmt { kind, line, span } = stmt;
    let kind = match kind {
        StmtKind::Assert { test, message } => {
            *count += 1;
            let text = slice(source, &test.span);
            let comparison = match &test.kind {
                ExprKind::Comparison {
                    operator,
                    left,
                    right,
                } => Some(AssertComparison {
                    operator: *operator,
                    left_text: slice(source, &left.span),
                    right_text: slice(source, &right.span),
                    left: (**left).clone(),
                    right: (**right).clone(),
                }),
                _ => None,
            };
            StmtKind::CheckedAssert(Box::new(AssertCheck {
                test,
                message,
                text,
                comparison,
            }))
        }
        StmtKind::If { test, body, orelse } => StmtKind::If {
            test,
            body: rewrite_block(body, source, count),
            orelse: rewrite_block(orelse, source, count),
        },
        StmtKind::While { test, body } => StmtKind::While {
            test,
            body: rewrite_block(body, source, count),
        },
        StmtKind::For { target, iter, body } => StmtKind::For {
            target,
            iter,
            body: rewrite_block(body, source, count),
        },
        StmtKind::FunctionDef(def) => {
            let FunctionDef {
                name,
                parameters,
                body,
            } = Rc::unwrap_or_clone(def);
            StmtKind::FunctionDef(Rc::new(FunctionDef {
                name,
                parameters,
                body: rewrite_block(body, source, count),
            }))
        }
        StmtKind::Try {
            body,
            handlers,
            finalbody,
        } => StmtKind::Try {
            body: rewrite_block(body, source, count),
            handlers: handlers
                .into_iter()
                .map(|handler| ExceptHandler {
                    body: rewrite_block(handler.body, source, count),
                    ..handler
                })
                .collect(),
            finalbody: rewrite_block(finalbody, source, count),
        },
        other => other,
    };
    Stmt { kind, line, span }
}

fn slice(source: &str, span: &std::ops::Range<usize>) -> String {
    source.get(span.clone()).unwrap_or("").to_string()
}
