use std::path::Path;

use crate::builtins::{Arguments, expect_int, expect_str, sort_values};
use crate::error::RuntimeError;
use crate::evaluator::iterate;
use crate::runtime_value::RuntimeValue;

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "splitlines",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "count",
    "isdigit",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "setdefault",
    "update",
    "copy",
    "clear",
];

const PATH_METHODS: &[&str] = &[
    "exists",
    "is_dir",
    "is_file",
    "mkdir",
    "read_text",
    "write_text",
    "joinpath",
    "iterdir",
    "unlink",
];

pub(crate) fn has_method(receiver: &RuntimeValue, name: &str) -> bool {
    let table = match receiver {
        RuntimeValue::Str(_) => STR_METHODS,
        RuntimeValue::List(_) => LIST_METHODS,
        RuntimeValue::Dict(_) => DICT_METHODS,
        RuntimeValue::Path(_) => PATH_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

/// Read-only attributes of a path.
pub(crate) fn path_property(path: &Path, attr: &str) -> Option<RuntimeValue> {
    let os_str = |s: Option<&std::ffi::OsStr>| {
        RuntimeValue::Str(s.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default())
    };
    match attr {
        "name" => Some(os_str(path.file_name())),
        "stem" => Some(os_str(path.file_stem())),
        "suffix" => Some(RuntimeValue::Str(
            path.extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        )),
        "parent" => Some(RuntimeValue::Path(
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| path.to_path_buf()),
        )),
        _ => None,
    }
}

pub(crate) fn call_method(
    receiver: &RuntimeValue,
    name: &str,
    args: Vec<RuntimeValue>,
    keywords: Vec<(String, RuntimeValue)>,
) -> Result<RuntimeValue, RuntimeError> {
    let args = Arguments::new(name, args, keywords);
    match receiver {
        RuntimeValue::Str(s) => str_method(s, name, args),
        RuntimeValue::List(_) => list_method(receiver, name, args),
        RuntimeValue::Dict(_) => dict_method(receiver, name, args),
        RuntimeValue::Path(path) => path_method(path, name, args),
        other => Err(RuntimeError::AttributeError(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn str_method(s: &str, name: &str, args: Arguments) -> Result<RuntimeValue, RuntimeError> {
    let strip_chars = |args: Arguments| -> Result<Option<Vec<char>>, RuntimeError> {
        match args.positional(0, 1)?.pop() {
            None | Some(RuntimeValue::None) => Ok(None),
            Some(v) => Ok(Some(expect_str(&v, "strip arg")?.chars().collect())),
        }
    };
    let value = match name {
        "upper" => {
            args.positional(0, 0)?;
            RuntimeValue::Str(s.to_uppercase())
        }
        "lower" => {
            args.positional(0, 0)?;
            RuntimeValue::Str(s.to_lowercase())
        }
        "strip" => RuntimeValue::Str(match strip_chars(args)? {
            None => s.trim().to_string(),
            Some(chars) => s.trim_matches(chars.as_slice()).to_string(),
        }),
        "lstrip" => RuntimeValue::Str(match strip_chars(args)? {
            None => s.trim_start().to_string(),
            Some(chars) => s.trim_start_matches(chars.as_slice()).to_string(),
        }),
        "rstrip" => RuntimeValue::Str(match strip_chars(args)? {
            None => s.trim_end().to_string(),
            Some(chars) => s.trim_end_matches(chars.as_slice()).to_string(),
        }),
        "split" => {
            let parts: Vec<RuntimeValue> = match args.positional(0, 1)?.pop() {
                None | Some(RuntimeValue::None) => {
                    s.split_whitespace().map(RuntimeValue::str).collect()
                }
                Some(sep) => {
                    let sep = expect_str(&sep, "separator")?;
                    if sep.is_empty() {
                        return Err(RuntimeError::ValueError("empty separator".into()));
                    }
                    s.split(sep).map(RuntimeValue::str).collect()
                }
            };
            RuntimeValue::list(parts)
        }
        "splitlines" => {
            args.positional(0, 0)?;
            RuntimeValue::list(s.lines().map(RuntimeValue::str).collect())
        }
        "join" => {
            let [iterable] = single(args)?;
            let pieces = iterate(&iterable)?
                .iter()
                .map(|item| expect_str(item, "sequence item").map(str::to_string))
                .collect::<Result<Vec<_>, _>>()?;
            RuntimeValue::Str(pieces.join(s))
        }
        "replace" => {
            let values = args.positional(2, 2)?;
            let old = expect_str(&values[0], "replace() argument 1")?;
            let new = expect_str(&values[1], "replace() argument 2")?;
            RuntimeValue::Str(s.replace(old, new))
        }
        "startswith" | "endswith" => {
            let [prefix] = single(args)?;
            let candidates = match &prefix {
                RuntimeValue::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            let mut matched = false;
            for candidate in &candidates {
                let candidate = expect_str(candidate, name)?;
                matched |= if name == "startswith" {
                    s.starts_with(candidate)
                } else {
                    s.ends_with(candidate)
                };
            }
            RuntimeValue::Bool(matched)
        }
        "find" => {
            let [needle] = single(args)?;
            let needle = expect_str(&needle, "find() argument")?;
            RuntimeValue::Int(
                s.find(needle)
                    .map_or(-1, |byte| s[..byte].chars().count() as i64),
            )
        }
        "count" => {
            let [needle] = single(args)?;
            let needle = expect_str(&needle, "count() argument")?;
            RuntimeValue::Int(if needle.is_empty() {
                s.chars().count() as i64 + 1
            } else {
                s.matches(needle).count() as i64
            })
        }
        "isdigit" => {
            args.positional(0, 0)?;
            RuntimeValue::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        }
        _ => return Err(no_attribute("str", name)),
    };
    Ok(value)
}

fn list_method(receiver: &RuntimeValue, name: &str, args: Arguments) -> Result<RuntimeValue, RuntimeError> {
    let RuntimeValue::List(items) = receiver else {
        return Err(no_attribute(receiver.type_name(), name));
    };
    let value = match name {
        "append" => {
            let [item] = single(args)?;
            items.borrow_mut().push(item);
            RuntimeValue::None
        }
        "extend" => {
            let [iterable] = single(args)?;
            let extra = iterate(&iterable)?;
            items.borrow_mut().extend(extra);
            RuntimeValue::None
        }
        "pop" => {
            let index = args.positional(0, 1)?.pop();
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(RuntimeError::IndexError("pop from empty list".into()));
            }
            let len = items.len() as i64;
            let i = match index {
                Some(v) => expect_int(&v, "pop index")?,
                None => -1,
            };
            let resolved = if i < 0 { i + len } else { i };
            if resolved < 0 || resolved >= len {
                return Err(RuntimeError::IndexError("pop index out of range".into()));
            }
            items.remove(resolved as usize)
        }
        "insert" => {
            let mut values = args.positional(2, 2)?;
            let item = values.remove(1);
            let i = expect_int(&values[0], "insert index")?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let at = if i < 0 { (i + len).max(0) } else { i.min(len) };
            items.insert(at as usize, item);
            RuntimeValue::None
        }
        "remove" => {
            let [item] = single(args)?;
            let mut items = items.borrow_mut();
            let position = items
                .iter()
                .position(|x| *x == item)
                .ok_or_else(|| RuntimeError::ValueError("list.remove(x): x not in list".into()))?;
            items.remove(position);
            RuntimeValue::None
        }
        "index" => {
            let [item] = single(args)?;
            let position = items
                .borrow()
                .iter()
                .position(|x| *x == item)
                .ok_or_else(|| RuntimeError::ValueError(format!("{} is not in list", item.repr())))?;
            RuntimeValue::Int(position as i64)
        }
        "count" => {
            let [item] = single(args)?;
            RuntimeValue::Int(items.borrow().iter().filter(|x| **x == item).count() as i64)
        }
        "sort" => {
            let mut args = args;
            let reverse = args.keyword("reverse").is_some_and(|v| v.is_truthy());
            args.positional(0, 0)?;
            sort_values(&mut items.borrow_mut(), reverse)?;
            RuntimeValue::None
        }
        "reverse" => {
            args.positional(0, 0)?;
            items.borrow_mut().reverse();
            RuntimeValue::None
        }
        "copy" => {
            args.positional(0, 0)?;
            RuntimeValue::list(items.borrow().clone())
        }
        "clear" => {
            args.positional(0, 0)?;
            items.borrow_mut().clear();
            RuntimeValue::None
        }
        _ => return Err(no_attribute("list", name)),
    };
    Ok(value)
}

fn dict_method(receiver: &RuntimeValue, name: &str, args: Arguments) -> Result<RuntimeValue, RuntimeError> {
    let RuntimeValue::Dict(dict) = receiver else {
        return Err(no_attribute(receiver.type_name(), name));
    };
    let value = match name {
        "get" => {
            let mut values = args.positional(1, 2)?;
            let default = if values.len() == 2 {
                values.remove(1)
            } else {
                RuntimeValue::None
            };
            dict.borrow().get(&values[0]).cloned().unwrap_or(default)
        }
        "keys" => {
            args.positional(0, 0)?;
            RuntimeValue::list(dict.borrow().keys())
        }
        "values" => {
            args.positional(0, 0)?;
            RuntimeValue::list(dict.borrow().values())
        }
        "items" => {
            args.positional(0, 0)?;
            RuntimeValue::list(
                dict.borrow()
                    .iter()
                    .map(|(k, v)| RuntimeValue::tuple(vec![k.clone(), v.clone()]))
                    .collect(),
            )
        }
        "pop" => {
            let mut values = args.positional(1, 2)?;
            let default = (values.len() == 2).then(|| values.remove(1));
            let key = &values[0];
            match dict.borrow_mut().remove(key) {
                Some(value) => value,
                None => default.ok_or_else(|| RuntimeError::KeyError(key.repr()))?,
            }
        }
        "setdefault" => {
            let mut values = args.positional(1, 2)?;
            let default = if values.len() == 2 {
                values.remove(1)
            } else {
                RuntimeValue::None
            };
            let key = values.remove(0);
            let existing = dict.borrow().get(&key).cloned();
            match existing {
                Some(value) => value,
                None => {
                    dict.borrow_mut().insert(key, default.clone())?;
                    default
                }
            }
        }
        "update" => {
            let mut args = args;
            let keywords = args.take_keywords();
            let source = args.positional(0, 1)?.pop();
            let mut pairs = Vec::new();
            match source {
                Some(RuntimeValue::Dict(other)) => {
                    pairs.extend(other.borrow().iter().cloned());
                }
                Some(other) => {
                    for pair in iterate(&other)? {
                        let [key, value] = <[RuntimeValue; 2]>::try_from(iterate(&pair)?)
                            .map_err(|_| {
                                RuntimeError::ValueError(
                                    "dictionary update sequence element has wrong length".into(),
                                )
                            })?;
                        pairs.push((key, value));
                    }
                }
                None => {}
            }
            pairs.extend(keywords.into_iter().map(|(k, v)| (RuntimeValue::Str(k), v)));
            let mut dict = dict.borrow_mut();
            for (key, value) in pairs {
                dict.insert(key, value)?;
            }
            RuntimeValue::None
        }
        "copy" => {
            args.positional(0, 0)?;
            RuntimeValue::dict(dict.borrow().clone())
        }
        "clear" => {
            args.positional(0, 0)?;
            dict.borrow_mut().clear();
            RuntimeValue::None
        }
        _ => return Err(no_attribute("dict", name)),
    };
    Ok(value)
}

fn path_method(path: &Path, name: &str, args: Arguments) -> Result<RuntimeValue, RuntimeError> {
    let io_error = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::NotFound => RuntimeError::FileNotFound(path.display().to_string()),
        _ => RuntimeError::IoError(format!("{}: '{}'", e, path.display())),
    };
    let value = match name {
        "exists" => {
            args.positional(0, 0)?;
            RuntimeValue::Bool(path.exists())
        }
        "is_dir" => {
            args.positional(0, 0)?;
            RuntimeValue::Bool(path.is_dir())
        }
        "is_file" => {
            args.positional(0, 0)?;
            RuntimeValue::Bool(path.is_file())
        }
        "mkdir" => {
            let mut args = args;
            let parents = args.keyword("parents").is_some_and(|v| v.is_truthy());
            let exist_ok = args.keyword("exist_ok").is_some_and(|v| v.is_truthy());
            args.positional(0, 0)?;
            if path.exists() {
                if !exist_ok {
                    return Err(RuntimeError::Raised(crate::runtime_value::ExceptionValue {
                        kind: "FileExistsError".into(),
                        message: format!("[Errno 17] File exists: '{}'", path.display()),
                    }));
                }
            } else if parents {
                std::fs::create_dir_all(path).map_err(io_error)?;
            } else {
                std::fs::create_dir(path).map_err(io_error)?;
            }
            RuntimeValue::None
        }
        "read_text" => {
            let mut args = args;
            args.keyword("encoding");
            args.positional(0, 1)?;
            RuntimeValue::Str(std::fs::read_to_string(path).map_err(io_error)?)
        }
        "write_text" => {
            let mut args = args;
            args.keyword("encoding");
            let [data] = single(args)?;
            let data = expect_str(&data, "data")?;
            std::fs::write(path, data).map_err(io_error)?;
            RuntimeValue::Int(data.chars().count() as i64)
        }
        "joinpath" => {
            let mut joined = path.to_path_buf();
            for part in args.positional(0, usize::MAX)? {
                match part {
                    RuntimeValue::Path(p) => joined.push(p),
                    other => joined.push(expect_str(&other, "joinpath() argument")?),
                }
            }
            RuntimeValue::Path(joined)
        }
        "iterdir" => {
            args.positional(0, 0)?;
            let mut entries = std::fs::read_dir(path)
                .map_err(io_error)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(io_error)?;
            entries.sort();
            RuntimeValue::list(entries.into_iter().map(RuntimeValue::Path).collect())
        }
        "unlink" => {
            args.positional(0, 0)?;
            std::fs::remove_file(path).map_err(io_error)?;
            RuntimeValue::None
        }
        _ => return Err(no_attribute("PosixPath", name)),
    };
    Ok(value)
}

fn single(args: Arguments) -> Result<[RuntimeValue; 1], RuntimeError> {
    let mut values = args.positional(1, 1)?;
    Ok([values.pop().unwrap_or(RuntimeValue::None)])
}

fn no_attribute(type_name: &str, name: &str) -> RuntimeError {
    RuntimeError::AttributeError(format!(
        "'{}' object has no attribute '{}'",
        type_name, name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: &RuntimeValue, name: &str, args: Vec<RuntimeValue>) -> RuntimeValue {
        call_method(receiver, name, args, Vec::new()).unwrap()
    }

    #[test]
    fn string_methods() {
        let s = RuntimeValue::str("  a,b  ");
        assert_eq!(call(&s, "strip", vec![]), RuntimeValue::str("a,b"));
        let parts = call(&RuntimeValue::str("a,b"), "split", vec![RuntimeValue::str(",")]);
        assert_eq!(
            parts,
            RuntimeValue::list(vec![RuntimeValue::str("a"), RuntimeValue::str("b")])
        );
        assert_eq!(
            call(&RuntimeValue::str("-"), "join", vec![parts]),
            RuntimeValue::str("a-b")
        );
    }

    #[test]
    fn list_mutation_is_shared() {
        let list = RuntimeValue::list(vec![RuntimeValue::Int(3), RuntimeValue::Int(1)]);
        let alias = list.clone();
        call(&list, "append", vec![RuntimeValue::Int(2)]);
        call(&list, "sort", vec![]);
        assert_eq!(alias.repr(), "[1, 2, 3]");
    }

    #[test]
    fn missing_dict_key_on_pop() {
        let dict = RuntimeValue::dict(Default::default());
        let err = call_method(&dict, "pop", vec![RuntimeValue::str("k")], Vec::new()).unwrap_err();
        assert_eq!(err, RuntimeError::KeyError("'k'".into()));
    }

    #[test]
    fn path_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = RuntimeValue::Path(dir.path().join("out.txt"));
        call(&file, "write_text", vec![RuntimeValue::str("hello")]);
        assert_eq!(call(&file, "exists", vec![]), RuntimeValue::Bool(true));
        assert_eq!(call(&file, "read_text", vec![]), RuntimeValue::str("hello"));
        assert_eq!(
            path_property(&dir.path().join("out.txt"), "suffix"),
            Some(RuntimeValue::str(".txt"))
        );
    }
}
