use std::rc::Rc;

use docscript::ast::{
    BinaryOperator, CompareOperator, Expr, ExprKind, FStringPart, LogicalOperator, UnaryOperator,
};

use crate::builtins;
use crate::error::{DiagnosticError, RuntimeError};
use crate::executor::Interpreter;
use crate::methods;
use crate::namespace::Namespace;
use crate::runtime_value::{BoundMethod, Dict, ExceptionValue, RuntimeValue};

/// Name resolution context: locals, then enclosing function locals
/// (innermost first), then globals, then builtins.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    pub locals: Namespace,
    /// Outermost first.
    pub enclosing: Vec<Namespace>,
    pub globals: Namespace,
}

impl Scope {
    pub fn module(namespace: Namespace) -> Self {
        Scope {
            locals: namespace.clone(),
            enclosing: Vec::new(),
            globals: namespace,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<RuntimeValue> {
        self.locals
            .get(name)
            .or_else(|| self.enclosing.iter().rev().find_map(|ns| ns.get(name)))
            .or_else(|| self.globals.get(name))
            .or_else(|| builtins::lookup(name))
    }

    /// Namespaces captured by a function or comprehension defined here.
    pub fn closure(&self) -> Vec<Namespace> {
        let mut enclosing = self.enclosing.clone();
        if !self.locals.ptr_eq(&self.globals) {
            enclosing.push(self.locals.clone());
        }
        enclosing
    }
}

impl Interpreter<'_> {
    /// Evaluate an expression to produce a RuntimeValue.
    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Scope) -> Result<RuntimeValue, DiagnosticError> {
        match &expr.kind {
            // --- Literals ---
            ExprKind::NoneLiteral => Ok(RuntimeValue::None),
            ExprKind::BooleanLiteral(b) => Ok(RuntimeValue::Bool(*b)),
            ExprKind::IntegerLiteral(n) => Ok(RuntimeValue::Int(*n)),
            ExprKind::FloatLiteral(f) => Ok(RuntimeValue::Float(*f)),
            ExprKind::StringLiteral(s) => Ok(RuntimeValue::str(s.clone())),
            ExprKind::FString(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(s) => text.push_str(s),
                        FStringPart::Expression(e, repr) => {
                            let value = self.eval(e, scope)?;
                            if *repr {
                                text.push_str(&value.repr());
                            } else {
                                text.push_str(&value.to_string());
                            }
                        }
                    }
                }
                Ok(RuntimeValue::Str(text))
            }
            ExprKind::List(items) => Ok(RuntimeValue::list(self.eval_all(items, scope)?)),
            ExprKind::Tuple(items) => Ok(RuntimeValue::tuple(self.eval_all(items, scope)?)),
            ExprKind::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    dict.insert(key, value)?;
                }
                Ok(RuntimeValue::dict(dict))
            }
            ExprKind::ListComprehension {
                element,
                target,
                iter,
                condition,
            } => {
                let iterable = self.eval(iter, scope)?;
                let inner = Scope {
                    locals: Namespace::new(),
                    enclosing: {
                        let mut enclosing = scope.enclosing.clone();
                        enclosing.push(scope.locals.clone());
                        enclosing
                    },
                    globals: scope.globals.clone(),
                };
                let mut out = Vec::new();
                for item in iterate(&iterable)? {
                    self.assign(target, item, &inner)?;
                    if let Some(condition) = condition {
                        if !self.eval(condition, &inner)?.is_truthy() {
                            continue;
                        }
                    }
                    out.push(self.eval(element, &inner)?);
                }
                Ok(RuntimeValue::list(out))
            }

            // --- References ---
            ExprKind::Name(name) => scope
                .lookup(name)
                .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone()).into()),
            ExprKind::Attribute { value, attr } => {
                let value = self.eval(value, scope)?;
                Ok(get_attribute(value, attr)?)
            }
            ExprKind::Subscript { value, index } => {
                let value = self.eval(value, scope)?;
                if let ExprKind::Slice { lower, upper } = &index.kind {
                    let lower = self.eval_bound(lower.as_deref(), scope)?;
                    let upper = self.eval_bound(upper.as_deref(), scope)?;
                    return Ok(slice(&value, lower, upper)?);
                }
                let index = self.eval(index, scope)?;
                Ok(get_item(&value, &index)?)
            }
            ExprKind::Slice { .. } => {
                Err(RuntimeError::Custom("slice outside of a subscript".into()).into())
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let callee = self.eval(func, scope)?;
                let args = self.eval_all(args, scope)?;
                let keywords = keywords
                    .iter()
                    .map(|(name, value)| self.eval(value, scope).map(|v| (name.clone(), v)))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args, keywords)
            }

            // --- Operations ---
            ExprKind::UnaryOperation { operator, operand } => {
                let value = self.eval(operand, scope)?;
                Ok(unary_operation(*operator, &value)?)
            }
            ExprKind::BinaryOperation {
                operator,
                left,
                right,
            } => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                Ok(binary_operation(*operator, &l, &r)?)
            }
            ExprKind::Comparison {
                operator,
                left,
                right,
            } => {
                let l = self.eval(left, scope)?;
                let r = self.eval(right, scope)?;
                Ok(RuntimeValue::Bool(compare(*operator, &l, &r)?))
            }
            ExprKind::Logical {
                operator,
                left,
                right,
            } => {
                let l = self.eval(left, scope)?;
                let short_circuit = match operator {
                    LogicalOperator::And => !l.is_truthy(),
                    LogicalOperator::Or => l.is_truthy(),
                };
                if short_circuit {
                    Ok(l)
                } else {
                    self.eval(right, scope)
                }
            }
            ExprKind::Conditional { test, body, orelse } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr], scope: &Scope) -> Result<Vec<RuntimeValue>, DiagnosticError> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    fn eval_bound(&mut self, expr: Option<&Expr>, scope: &Scope) -> Result<Option<i64>, DiagnosticError> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval(expr, scope)? {
            RuntimeValue::None => Ok(None),
            value => value.as_int().map(Some).ok_or_else(|| {
                RuntimeError::TypeError(
                    "slice indices must be integers or None".to_string(),
                )
                .into()
            }),
        }
    }

    /// Invoke any callable value.
    pub(crate) fn call(
        &mut self,
        callee: RuntimeValue,
        args: Vec<RuntimeValue>,
        keywords: Vec<(String, RuntimeValue)>,
    ) -> Result<RuntimeValue, DiagnosticError> {
        match callee {
            RuntimeValue::Function(function) => self.call_function(&function, args, keywords),
            RuntimeValue::Builtin(builtin) => builtins::call(self, builtin, args, keywords),
            RuntimeValue::Method(method) => {
                Ok(methods::call_method(&method.receiver, &method.name, args, keywords)?)
            }
            RuntimeValue::ExceptionType(kind) => {
                let message = match args.as_slice() {
                    [] => String::new(),
                    [single] => single.to_string(),
                    many => RuntimeValue::tuple(many.to_vec()).repr(),
                };
                Ok(RuntimeValue::Exception(Rc::new(ExceptionValue { kind, message })))
            }
            other => Err(RuntimeError::TypeError(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
        }
    }
}

fn get_attribute(value: RuntimeValue, attr: &str) -> Result<RuntimeValue, RuntimeError> {
    let property = match &value {
        RuntimeValue::Module(module) => {
            return module.namespace.get(attr).ok_or_else(|| {
                RuntimeError::AttributeError(format!(
                    "module '{}' has no attribute '{}'",
                    module.name, attr
                ))
            });
        }
        RuntimeValue::Exception(e) if attr == "args" => Some(RuntimeValue::tuple(vec![
            RuntimeValue::str(e.message.clone()),
        ])),
        RuntimeValue::Path(path) => methods::path_property(path, attr),
        _ => None,
    };
    match property {
        Some(property) => Ok(property),
        None => bind_method(value, attr),
    }
}

fn bind_method(receiver: RuntimeValue, name: &str) -> Result<RuntimeValue, RuntimeError> {
    if methods::has_method(&receiver, name) {
        Ok(RuntimeValue::Method(Rc::new(BoundMethod {
            receiver,
            name: name.to_string(),
        })))
    } else {
        Err(RuntimeError::AttributeError(format!(
            "'{}' object has no attribute '{}'",
            receiver.type_name(),
            name
        )))
    }
}

pub(crate) fn unary_operation(
    operator: UnaryOperator,
    value: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    match (operator, value) {
        (UnaryOperator::LogicalNot, v) => Ok(RuntimeValue::Bool(!v.is_truthy())),
        (UnaryOperator::Negation, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(-f)),
        (UnaryOperator::Identity, RuntimeValue::Float(f)) => Ok(RuntimeValue::Float(*f)),
        (operator, v) => {
            let n = v.as_int().ok_or_else(|| {
                RuntimeError::TypeError(format!(
                    "bad operand type for unary {}: '{}'",
                    if operator == UnaryOperator::Negation { "-" } else { "+" },
                    v.type_name()
                ))
            })?;
            match operator {
                UnaryOperator::Negation => n.checked_neg().map(RuntimeValue::Int).ok_or(RuntimeError::Overflow),
                _ => Ok(RuntimeValue::Int(n)),
            }
        }
    }
}

pub(crate) fn binary_operation(
    operator: BinaryOperator,
    l: &RuntimeValue,
    r: &RuntimeValue,
) -> Result<RuntimeValue, RuntimeError> {
    use BinaryOperator::*;

    let unsupported = || {
        RuntimeError::TypeError(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            operator.symbol(),
            l.type_name(),
            r.type_name()
        ))
    };

    // Integer arithmetic (bools participate as 0/1).
    if let (Some(a), Some(b)) = (l.as_int(), r.as_int()) {
        return match operator {
            Addition => a.checked_add(b).map(RuntimeValue::Int).ok_or(RuntimeError::Overflow),
            Subtraction => a.checked_sub(b).map(RuntimeValue::Int).ok_or(RuntimeError::Overflow),
            Multiplication => a.checked_mul(b).map(RuntimeValue::Int).ok_or(RuntimeError::Overflow),
            Division if b == 0 => Err(RuntimeError::DivisionByZero),
            Division => Ok(RuntimeValue::Float(a as f64 / b as f64)),
            FloorDivision | Modulo if b == 0 => Err(RuntimeError::DivisionByZero),
            FloorDivision => floor_div(a, b).map(RuntimeValue::Int),
            Modulo => Ok(RuntimeValue::Int(modulo(a, b))),
            Power if b < 0 => Ok(RuntimeValue::Float((a as f64).powf(b as f64))),
            Power => u32::try_from(b)
                .ok()
                .and_then(|b| a.checked_pow(b))
                .map(RuntimeValue::Int)
                .ok_or(RuntimeError::Overflow),
        };
    }

    if let (Some(a), Some(b)) = (l.as_float(), r.as_float()) {
        return match operator {
            Addition => Ok(RuntimeValue::Float(a + b)),
            Subtraction => Ok(RuntimeValue::Float(a - b)),
            Multiplication => Ok(RuntimeValue::Float(a * b)),
            Division | FloorDivision | Modulo if b == 0.0 => Err(RuntimeError::DivisionByZero),
            Division => Ok(RuntimeValue::Float(a / b)),
            FloorDivision => Ok(RuntimeValue::Float((a / b).floor())),
            Modulo => Ok(RuntimeValue::Float(a - b * (a / b).floor())),
            Power => Ok(RuntimeValue::Float(a.powf(b))),
        };
    }

    match (operator, l, r) {
        (Addition, RuntimeValue::Str(a), RuntimeValue::Str(b)) => {
            Ok(RuntimeValue::Str(format!("{}{}", a, b)))
        }
        (Addition, RuntimeValue::List(a), RuntimeValue::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(RuntimeValue::list(items))
        }
        (Addition, RuntimeValue::Tuple(a), RuntimeValue::Tuple(b)) => {
            Ok(RuntimeValue::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (Multiplication, RuntimeValue::Str(s), n) | (Multiplication, n, RuntimeValue::Str(s)) => {
            let n = repeat_count(n.as_int().ok_or_else(unsupported)?, s.len())?;
            Ok(RuntimeValue::Str(s.repeat(n)))
        }
        (Multiplication, RuntimeValue::List(items), n)
        | (Multiplication, n, RuntimeValue::List(items)) => {
            let items = items.borrow();
            let n = repeat_count(n.as_int().ok_or_else(unsupported)?, items.len())?;
            let repeated = (0..n).flat_map(|_| items.iter().cloned()).collect();
            Ok(RuntimeValue::list(repeated))
        }
        (Division, RuntimeValue::Path(base), RuntimeValue::Str(part)) => {
            Ok(RuntimeValue::Path(base.join(part)))
        }
        (Division, RuntimeValue::Path(base), RuntimeValue::Path(part)) => {
            Ok(RuntimeValue::Path(base.join(part)))
        }
        _ => Err(unsupported()),
    }
}

/// Floor division; `b` is non-zero. `i64::MIN // -1` has no i64 result.
fn floor_div(a: i64, b: i64) -> Result<i64, RuntimeError> {
    let q = a.checked_div(b).ok_or(RuntimeError::Overflow)?;
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Remainder with the sign of the divisor; `b` is non-zero.
fn modulo(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}

/// Largest sequence a repetition may build.
const MAX_REPEAT_LEN: usize = 1 << 28;

/// Validate a `*` repeat count against the length it would produce.
fn repeat_count(n: i64, len: usize) -> Result<usize, RuntimeError> {
    let n = usize::try_from(n.max(0)).map_err(|_| RuntimeError::Overflow)?;
    match len.checked_mul(n) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(n),
        _ => Err(RuntimeError::Overflow),
    }
}

/// Evaluate a single comparison.
pub(crate) fn compare(
    operator: CompareOperator,
    l: &RuntimeValue,
    r: &RuntimeValue,
) -> Result<bool, RuntimeError> {
    use std::cmp::Ordering::*;

    let ordering = || {
        l.compare(r).ok_or_else(|| {
            RuntimeError::TypeError(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                operator.symbol(),
                l.type_name(),
                r.type_name()
            ))
        })
    };

    Ok(match operator {
        CompareOperator::Equality => l == r,
        CompareOperator::Inequality => l != r,
        CompareOperator::LessThan => ordering()? == Less,
        CompareOperator::LessThanOrEqual => ordering()? != Greater,
        CompareOperator::GreaterThan => ordering()? == Greater,
        CompareOperator::GreaterThanOrEqual => ordering()? != Less,
        CompareOperator::In => contains(r, l)?,
        CompareOperator::NotIn => !contains(r, l)?,
        CompareOperator::Is => l.is_identical(r),
        CompareOperator::IsNot => !l.is_identical(r),
    })
}

fn contains(container: &RuntimeValue, item: &RuntimeValue) -> Result<bool, RuntimeError> {
    match container {
        RuntimeValue::Str(haystack) => match item {
            RuntimeValue::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(RuntimeError::TypeError(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        RuntimeValue::List(items) => Ok(items.borrow().contains(item)),
        RuntimeValue::Tuple(items) => Ok(items.contains(item)),
        RuntimeValue::Dict(dict) => Ok(dict.borrow().contains_key(item)),
        other => Err(RuntimeError::TypeError(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

/// Materialise the items of an iterable value.
pub(crate) fn iterate(value: &RuntimeValue) -> Result<Vec<RuntimeValue>, RuntimeError> {
    match value {
        RuntimeValue::List(items) => Ok(items.borrow().clone()),
        RuntimeValue::Tuple(items) => Ok(items.to_vec()),
        RuntimeValue::Str(s) => Ok(s.chars().map(|c| RuntimeValue::Str(c.to_string())).collect()),
        RuntimeValue::Dict(dict) => Ok(dict.borrow().keys()),
        other => Err(RuntimeError::TypeError(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

/// Resolve a possibly negative index against a sequence length.
fn normalize_index(index: &RuntimeValue, len: usize, what: &str) -> Result<usize, RuntimeError> {
    let i = index.as_int().ok_or_else(|| {
        RuntimeError::TypeError(format!(
            "{} indices must be integers, not {}",
            what,
            index.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(RuntimeError::IndexError(format!("{} index out of range", what)));
    }
    Ok(resolved as usize)
}

pub(crate) fn get_item(value: &RuntimeValue, index: &RuntimeValue) -> Result<RuntimeValue, RuntimeError> {
    match value {
        RuntimeValue::List(items) => {
            let items = items.borrow();
            Ok(items[normalize_index(index, items.len(), "list")?].clone())
        }
        RuntimeValue::Tuple(items) => Ok(items[normalize_index(index, items.len(), "tuple")?].clone()),
        RuntimeValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index, chars.len(), "string")?;
            Ok(RuntimeValue::Str(chars[i].to_string()))
        }
        RuntimeValue::Dict(dict) => {
            index.check_hashable()?;
            dict.borrow()
                .get(index)
                .cloned()
                .ok_or_else(|| RuntimeError::KeyError(index.repr()))
        }
        other => Err(RuntimeError::TypeError(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

pub(crate) fn set_item(
    container: &RuntimeValue,
    index: RuntimeValue,
    value: RuntimeValue,
) -> Result<(), RuntimeError> {
    match container {
        RuntimeValue::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(&index, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        RuntimeValue::Dict(dict) => dict.borrow_mut().insert(index, value),
        other => Err(RuntimeError::TypeError(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice(value: &RuntimeValue, lower: Option<i64>, upper: Option<i64>) -> Result<RuntimeValue, RuntimeError> {
    let bounds = |len: usize| {
        let clamp = |i: i64| {
            let i = if i < 0 { i + len as i64 } else { i };
            i.clamp(0, len as i64) as usize
        };
        let start = lower.map_or(0, clamp);
        let end = upper.map_or(len, clamp);
        (start, end.max(start))
    };
    match value {
        RuntimeValue::List(items) => {
            let items = items.borrow();
            let (start, end) = bounds(items.len());
            Ok(RuntimeValue::list(items[start..end].to_vec()))
        }
        RuntimeValue::Tuple(items) => {
            let (start, end) = bounds(items.len());
            Ok(RuntimeValue::tuple(items[start..end].to_vec()))
        }
        RuntimeValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = bounds(chars.len());
            Ok(RuntimeValue::Str(chars[start..end].iter().collect()))
        }
        other => Err(RuntimeError::TypeError(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2), Ok(3));
        assert_eq!(floor_div(-7, 2), Ok(-4));
        assert_eq!(floor_div(7, -2), Ok(-4));
        assert_eq!(floor_div(i64::MIN, -1), Err(RuntimeError::Overflow));
        assert_eq!(modulo(7, -2), -1);
        assert_eq!(modulo(i64::MIN, -1), 0);
        let r = binary_operation(BinaryOperator::Modulo, &RuntimeValue::Int(-7), &RuntimeValue::Int(3));
        assert_eq!(r.unwrap(), RuntimeValue::Int(2));
    }

    #[test]
    fn mixed_operands_are_type_errors() {
        let err = binary_operation(
            BinaryOperator::Addition,
            &RuntimeValue::Int(1),
            &RuntimeValue::str("a"),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn negative_indices_and_slices() {
        let list = RuntimeValue::list(vec![
            RuntimeValue::Int(1),
            RuntimeValue::Int(2),
            RuntimeValue::Int(3),
        ]);
        assert_eq!(get_item(&list, &RuntimeValue::Int(-1)).unwrap(), RuntimeValue::Int(3));
        assert_eq!(
            slice(&list, Some(1), None).unwrap(),
            RuntimeValue::list(vec![RuntimeValue::Int(2), RuntimeValue::Int(3)])
        );
        assert!(matches!(
            get_item(&list, &RuntimeValue::Int(3)),
            Err(RuntimeError::IndexError(_))
        ));
    }
}
