use std::cmp::Ordering;
use std::path::PathBuf;

use crate::error::{DiagnosticError, EXCEPTION_KINDS, RuntimeError};
use crate::evaluator::iterate;
use crate::executor::Interpreter;
use crate::runtime_value::{Builtin, Dict, RuntimeValue};

/// Longest list `range()` materializes.
const MAX_RANGE_LEN: i128 = 1 << 24;

/// Resolve a name against the builtin scope.
pub fn lookup(name: &str) -> Option<RuntimeValue> {
    let builtin = match name {
        "print" => Builtin::Print,
        "len" => Builtin::Len,
        "str" => Builtin::Str,
        "repr" => Builtin::Repr,
        "int" => Builtin::Int,
        "float" => Builtin::Float,
        "bool" => Builtin::Bool,
        "range" => Builtin::Range,
        "list" => Builtin::List,
        "tuple" => Builtin::Tuple,
        "dict" => Builtin::Dict,
        "sorted" => Builtin::Sorted,
        "min" => Builtin::Min,
        "max" => Builtin::Max,
        "sum" => Builtin::Sum,
        "abs" => Builtin::Abs,
        "enumerate" => Builtin::Enumerate,
        "zip" => Builtin::Zip,
        kind if EXCEPTION_KINDS.contains(&kind) => {
            return Some(RuntimeValue::ExceptionType(kind.to_string()));
        }
        _ => return None,
    };
    Some(RuntimeValue::Builtin(builtin))
}

/// Call arguments being consumed by a builtin.
pub(crate) struct Arguments {
    function: String,
    positional: Vec<RuntimeValue>,
    keywords: Vec<(String, RuntimeValue)>,
}

impl Arguments {
    pub fn new(
        function: impl Into<String>,
        positional: Vec<RuntimeValue>,
        keywords: Vec<(String, RuntimeValue)>,
    ) -> Self {
        Arguments {
            function: function.into(),
            positional,
            keywords,
        }
    }

    /// Remove and return a keyword argument.
    pub fn keyword(&mut self, name: &str) -> Option<RuntimeValue> {
        let index = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(index).1)
    }

    /// Remove all remaining keyword arguments (for `**kwargs`-style builtins).
    pub fn take_keywords(&mut self) -> Vec<(String, RuntimeValue)> {
        std::mem::take(&mut self.keywords)
    }

    /// Positional arguments, checked against `min..=max`. Any keyword not
    /// consumed by now is rejected.
    pub fn positional(self, min: usize, max: usize) -> Result<Vec<RuntimeValue>, RuntimeError> {
        if let Some((name, _)) = self.keywords.first() {
            return Err(RuntimeError::TypeError(format!(
                "{}() got an unexpected keyword argument '{}'",
                self.function, name
            )));
        }
        let given = self.positional.len();
        if given < min || given > max {
            let (bound, count) = if min == max {
                ("exactly", min)
            } else if given < min {
                ("at least", min)
            } else {
                ("at most", max)
            };
            return Err(RuntimeError::TypeError(format!(
                "{}() takes {} {} argument{} ({} given)",
                self.function,
                bound,
                count,
                if count == 1 { "" } else { "s" },
                given
            )));
        }
        Ok(self.positional)
    }
}

pub(crate) fn expect_str<'a>(value: &'a RuntimeValue, what: &str) -> Result<&'a str, RuntimeError> {
    match value {
        RuntimeValue::Str(s) => Ok(s),
        other => Err(RuntimeError::TypeError(format!(
            "{} must be str, not {}",
            what,
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_int(value: &RuntimeValue, what: &str) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::TypeError(format!(
            "{} must be int, not {}",
            what,
            value.type_name()
        ))
    })
}

/// Sort values in place, failing on the first incomparable pair.
pub(crate) fn sort_values(items: &mut [RuntimeValue], reverse: bool) -> Result<(), RuntimeError> {
    let mut failure = None;
    items.sort_by(|a, b| {
        a.compare(b).unwrap_or_else(|| {
            failure.get_or_insert_with(|| {
                RuntimeError::TypeError(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                ))
            });
            Ordering::Equal
        })
    });
    if let Some(err) = failure {
        return Err(err);
    }
    if reverse {
        items.reverse();
    }
    Ok(())
}

pub(crate) fn call(
    interpreter: &mut Interpreter<'_>,
    builtin: Builtin,
    args: Vec<RuntimeValue>,
    keywords: Vec<(String, RuntimeValue)>,
) -> Result<RuntimeValue, DiagnosticError> {
    let mut args = Arguments::new(builtin.name(), args, keywords);
    let value = match builtin {
        Builtin::Print => {
            let sep = match args.keyword("sep") {
                None | Some(RuntimeValue::None) => " ".to_string(),
                Some(v) => expect_str(&v, "sep")?.to_string(),
            };
            let end = match args.keyword("end") {
                None | Some(RuntimeValue::None) => "\n".to_string(),
                Some(v) => expect_str(&v, "end")?.to_string(),
            };
            let values = args.positional(0, usize::MAX)?;
            let text: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            write!(interpreter.output, "{}{}", text.join(&sep), end)
                .map_err(|e| RuntimeError::IoError(e.to_string()))?;
            RuntimeValue::None
        }
        Builtin::Len => {
            let [value] = one(args.positional(1, 1)?);
            let len = match &value {
                RuntimeValue::Str(s) => s.chars().count(),
                RuntimeValue::List(items) => items.borrow().len(),
                RuntimeValue::Tuple(items) => items.len(),
                RuntimeValue::Dict(dict) => dict.borrow().len(),
                other => {
                    return Err(RuntimeError::TypeError(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    ))
                    .into());
                }
            };
            RuntimeValue::Int(len as i64)
        }
        Builtin::Str => match args.positional(0, 1)?.pop() {
            Some(value) => RuntimeValue::Str(value.to_string()),
            None => RuntimeValue::str(""),
        },
        Builtin::Repr => {
            let [value] = one(args.positional(1, 1)?);
            RuntimeValue::Str(value.repr())
        }
        Builtin::Int => match args.positional(0, 1)?.pop() {
            None => RuntimeValue::Int(0),
            Some(RuntimeValue::Float(f)) if f.is_finite() => RuntimeValue::Int(f.trunc() as i64),
            Some(RuntimeValue::Str(s)) => {
                let parsed = s.trim().replace('_', "").parse::<i64>();
                parsed.map(RuntimeValue::Int).map_err(|_| {
                    RuntimeError::ValueError(format!(
                        "invalid literal for int() with base 10: {}",
                        RuntimeValue::Str(s.clone()).repr()
                    ))
                })?
            }
            Some(other) => RuntimeValue::Int(other.as_int().ok_or_else(|| {
                RuntimeError::TypeError(format!(
                    "int() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))
            })?),
        },
        Builtin::Float => match args.positional(0, 1)?.pop() {
            None => RuntimeValue::Float(0.0),
            Some(RuntimeValue::Str(s)) => {
                let parsed = match s.trim().to_ascii_lowercase().as_str() {
                    "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                    "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                    "nan" => Ok(f64::NAN),
                    other => other.parse::<f64>(),
                };
                parsed.map(RuntimeValue::Float).map_err(|_| {
                    RuntimeError::ValueError(format!(
                        "could not convert string to float: {}",
                        RuntimeValue::Str(s.clone()).repr()
                    ))
                })?
            }
            Some(other) => RuntimeValue::Float(other.as_float().ok_or_else(|| {
                RuntimeError::TypeError(format!(
                    "float() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))
            })?),
        },
        Builtin::Bool => RuntimeValue::Bool(
            args.positional(0, 1)?
                .pop()
                .is_some_and(|v| v.is_truthy()),
        ),
        Builtin::Range => {
            let bounds = args.positional(1, 3)?;
            let ints = bounds
                .iter()
                .map(|v| expect_int(v, "range() argument"))
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints[..] {
                [stop] => (0, stop, 1),
                [start, stop] => (start, stop, 1),
                [start, stop, step] => (start, stop, step),
                _ => (0, 0, 1),
            };
            if step == 0 {
                return Err(RuntimeError::ValueError("range() arg 3 must not be zero".into()).into());
            }
            let (span, stride) = (i128::from(stop) - i128::from(start), i128::from(step));
            let len = if span.signum() == stride.signum() {
                (span + stride - stride.signum()) / stride
            } else {
                0
            };
            if len > MAX_RANGE_LEN {
                return Err(RuntimeError::Overflow.into());
            }
            let items = (0..len)
                .map(|k| RuntimeValue::Int((i128::from(start) + k * stride) as i64))
                .collect();
            RuntimeValue::list(items)
        }
        Builtin::List => match args.positional(0, 1)?.pop() {
            Some(value) => RuntimeValue::list(iterate(&value)?),
            None => RuntimeValue::list(Vec::new()),
        },
        Builtin::Tuple => match args.positional(0, 1)?.pop() {
            Some(value) => RuntimeValue::tuple(iterate(&value)?),
            None => RuntimeValue::tuple(Vec::new()),
        },
        Builtin::Dict => {
            let keywords = args.take_keywords();
            let mut dict = Dict::new();
            if let Some(source) = args.positional(0, 1)?.pop() {
                for pair in iterate(&source)? {
                    let items = iterate(&pair)?;
                    let [key, value] = <[RuntimeValue; 2]>::try_from(items).map_err(|_| {
                        RuntimeError::ValueError(
                            "dictionary update sequence element has wrong length".into(),
                        )
                    })?;
                    dict.insert(key, value)?;
                }
            }
            for (key, value) in keywords {
                dict.insert(RuntimeValue::Str(key), value)?;
            }
            RuntimeValue::dict(dict)
        }
        Builtin::Sorted => {
            let reverse = args.keyword("reverse").is_some_and(|v| v.is_truthy());
            let [value] = one(args.positional(1, 1)?);
            let mut items = iterate(&value)?;
            sort_values(&mut items, reverse)?;
            RuntimeValue::list(items)
        }
        Builtin::Min | Builtin::Max => {
            let default = args.keyword("default");
            let values = args.positional(1, usize::MAX)?;
            let items = match values.as_slice() {
                [single] => iterate(single)?,
                _ => values,
            };
            let wanted = if builtin == Builtin::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<RuntimeValue> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => match item.compare(&current) {
                        Some(ordering) if ordering == wanted => item,
                        Some(_) => current,
                        None => {
                            return Err(RuntimeError::TypeError(format!(
                                "'{}' not supported between instances of '{}' and '{}'",
                                if wanted == Ordering::Less { "<" } else { ">" },
                                item.type_name(),
                                current.type_name()
                            ))
                            .into());
                        }
                    },
                });
            }
            match best.or(default) {
                Some(value) => value,
                None => {
                    return Err(RuntimeError::ValueError(format!(
                        "{}() arg is an empty sequence",
                        builtin.name()
                    ))
                    .into());
                }
            }
        }
        Builtin::Sum => {
            let start = args.keyword("start");
            let mut values = args.positional(1, 2)?;
            let mut total = match (values.len(), start) {
                (2, _) => values.remove(1),
                (_, Some(start)) => start,
                _ => RuntimeValue::Int(0),
            };
            for item in iterate(&values[0])? {
                total = crate::evaluator::binary_operation(
                    docscript::ast::BinaryOperator::Addition,
                    &total,
                    &item,
                )?;
            }
            total
        }
        Builtin::Abs => {
            let [value] = one(args.positional(1, 1)?);
            match value {
                RuntimeValue::Float(f) => RuntimeValue::Float(f.abs()),
                other => {
                    let n = other.as_int().ok_or_else(|| {
                        RuntimeError::TypeError(format!(
                            "bad operand type for abs(): '{}'",
                            other.type_name()
                        ))
                    })?;
                    RuntimeValue::Int(n.checked_abs().ok_or(RuntimeError::Overflow)?)
                }
            }
        }
        Builtin::Enumerate => {
            let start = match args.keyword("start") {
                Some(v) => expect_int(&v, "start")?,
                None => 0,
            };
            let [value] = one(args.positional(1, 1)?);
            let items = iterate(&value)?
                .into_iter()
                .zip(start..)
                .map(|(item, i)| RuntimeValue::tuple(vec![RuntimeValue::Int(i), item]))
                .collect();
            RuntimeValue::list(items)
        }
        Builtin::Zip => {
            let sources = args
                .positional(0, usize::MAX)?
                .iter()
                .map(iterate)
                .collect::<Result<Vec<_>, _>>()?;
            let len = sources.iter().map(Vec::len).min().unwrap_or(0);
            let rows = (0..len)
                .map(|i| RuntimeValue::tuple(sources.iter().map(|s| s[i].clone()).collect()))
                .collect();
            RuntimeValue::list(rows)
        }
        Builtin::Path => {
            let parts = args.positional(0, usize::MAX)?;
            let mut path = PathBuf::new();
            for part in &parts {
                match part {
                    RuntimeValue::Path(p) => path.push(p),
                    other => path.push(expect_str(other, "Path() argument")?),
                }
            }
            if parts.is_empty() {
                path.push(".");
            }
            RuntimeValue::Path(path)
        }
        Builtin::Getenv => {
            let mut values = args.positional(1, 2)?;
            let default = if values.len() == 2 {
                values.remove(1)
            } else {
                RuntimeValue::None
            };
            let name = expect_str(&values[0], "getenv() argument")?;
            match std::env::var(name) {
                Ok(value) => RuntimeValue::Str(value),
                Err(_) => default,
            }
        }
        Builtin::Getcwd => {
            args.positional(0, 0)?;
            let cwd = std::env::current_dir().map_err(|e| RuntimeError::IoError(e.to_string()))?;
            RuntimeValue::Str(cwd.display().to_string())
        }
    };
    Ok(value)
}

/// Destructure a vector already checked to hold exactly one element.
fn one(mut values: Vec<RuntimeValue>) -> [RuntimeValue; 1] {
    [values.pop().unwrap_or(RuntimeValue::None)]
}
