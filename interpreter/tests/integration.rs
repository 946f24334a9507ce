use std::path::Path;
use std::rc::Rc;

use docscript::rewrite::{AssertionRewriter, PlainAsserts};
use interpreter::{Code, DiagnosticError, Interpreter, Namespace, RuntimeError, RuntimeValue};
use pretty_assertions::assert_eq;

fn exec_at(
    source: &str,
    path: &Path,
    namespace: &Namespace,
    search_paths: Vec<std::path::PathBuf>,
) -> (String, Result<(), DiagnosticError>) {
    let code = Rc::new(Code::compile(source, path, &AssertionRewriter).expect("parse failed"));
    let mut output = Vec::new();
    let result = Interpreter::new(&mut output)
        .with_search_paths(search_paths)
        .exec(code, namespace);
    (String::from_utf8(output).unwrap(), result)
}

fn run(source: &str) -> String {
    let (output, result) = exec_at(source, Path::new("doc.md"), &Namespace::new(), Vec::new());
    result.expect("execution failed");
    output
}

fn run_err(source: &str) -> DiagnosticError {
    let (_, result) = exec_at(source, Path::new("doc.md"), &Namespace::new(), Vec::new());
    result.expect_err("execution unexpectedly succeeded")
}

#[test]
fn arithmetic() {
    assert_eq!(run("print(2 + 3)"), "5\n");
    assert_eq!(run("print(10 - 4, 3 * 7)"), "6 21\n");
    assert_eq!(run("print(15 / 3)"), "5.0\n");
    assert_eq!(run("print(7 // 2, -7 // 2, 10 % 3)"), "3 -4 1\n");
    assert_eq!(run("print(2 ** 10)"), "1024\n");
    assert_eq!(run("print(2 + 3 * 4, (2 + 3) * 4)"), "14 20\n");
}

#[test]
fn strings_and_fstrings() {
    assert_eq!(run("name = 'docs'\nprint(f'hello {name}!')"), "hello docs!\n");
    assert_eq!(run("print(f'{[1, 2]!r} {1 + 1}')"), "[1, 2] 2\n");
    assert_eq!(run("print('a' + 'b' * 3)"), "abbb\n");
    assert_eq!(run("print(repr('x'), str(1.5))"), "'x' 1.5\n");
    assert_eq!(run("print(' a b '.strip().upper())"), "A B\n");
    assert_eq!(run("print(', '.join(['x', 'y']))"), "x, y\n");
}

#[test]
fn print_keywords() {
    assert_eq!(run("print('a', 'b', sep='-', end='!')"), "a-b!");
}

#[test]
fn control_flow() {
    let source = "\
total = 0
for i in range(10):
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
print(total)
n = 3
while n:
    n -= 1
print(n)
";
    assert_eq!(run(source), "16\n0\n");
}

#[test]
fn functions_with_defaults_and_keywords() {
    let source = "\
def greet(name, punctuation='!'):
    return 'hi ' + name + punctuation

print(greet('ann'))
print(greet('bob', punctuation='?'))
";
    assert_eq!(run(source), "hi ann!\nhi bob?\n");
}

#[test]
fn closures_see_enclosing_locals() {
    let source = "\
def outer(x):
    def inner(y):
        return x + y
    return inner(1)
print(outer(41))
";
    assert_eq!(run(source), "42\n");
}

#[test]
fn containers() {
    let source = "\
items = [3, 1, 2]
items.append(0)
print(sorted(items), len(items))
d = {'a': 1}
d['b'] = 2
print(d, d.get('c', 'none'), 'a' in d)
a, b = (1, 2)
print(a, b, items[-1], items[1:3])
print([x * x for x in range(4) if x])
";
    assert_eq!(
        run(source),
        "[0, 1, 2, 3] 4\n{'a': 1, 'b': 2} none True\n1 2 0 [1, 2]\n[1, 4, 9]\n"
    );
}

#[test]
fn namespace_persists_between_executions() {
    let namespace = Namespace::new();
    let (_, first) = exec_at("value = 1", Path::new("doc.md"), &namespace, Vec::new());
    first.unwrap();
    let (output, second) = exec_at(
        "assert value == 1\nprint(value + 1)",
        Path::new("doc.md"),
        &namespace,
        Vec::new(),
    );
    second.unwrap();
    assert_eq!(output, "2\n");
    assert_eq!(namespace.get("value"), Some(RuntimeValue::Int(1)));
}

#[test]
fn undefined_name_is_a_name_error() {
    let err = run_err("print(value)");
    assert_eq!(err.headline(), "NameError: name 'value' is not defined");
    assert_eq!(err.traceback.len(), 1);
    assert_eq!(err.traceback[0].line, 1);
    assert_eq!(err.traceback[0].name, "<module>");
}

#[test]
fn assertion_with_message_and_diff() {
    let err = run_err("x = 1\nassert 'A' == 'B', 'message'");
    assert_eq!(err.headline(), "AssertionError: message");
    assert_eq!(
        err.error.explanation(),
        ["assert 'A' == 'B'", "  - B", "  + A"]
    );
    assert_eq!(err.traceback[0].line, 2);
}

#[test]
fn assertion_shows_evaluated_operands() {
    let err = run_err("items = [1, 2]\nassert items == [1, 3]");
    assert_eq!(err.headline(), "AssertionError");
    assert_eq!(
        err.error.explanation(),
        [
            "assert items == [1, 3]",
            "assert [1, 2] == [1, 3]",
            "    1",
            "  - 3",
            "  + 2",
        ]
    );
}

#[test]
fn plain_asserts_carry_no_explanation() {
    let code = Rc::new(Code::compile("assert 1 == 2", "doc.md", &PlainAsserts).unwrap());
    let mut output = Vec::new();
    let err = Interpreter::new(&mut output)
        .exec(code, &Namespace::new())
        .unwrap_err();
    assert_eq!(err.headline(), "AssertionError");
    assert!(err.error.explanation().is_empty());
}

#[test]
fn try_except_finally() {
    let source = "\
try:
    {}['missing']
except LookupError as e:
    print('caught', repr(str(e)))
finally:
    print('done')
try:
    raise ValueError('bad')
except (TypeError, ValueError) as e:
    print(e)
";
    assert_eq!(run(source), "caught \"'missing'\"\ndone\nbad\n");
}

#[test]
fn unhandled_exception_propagates_through_finally() {
    let err = run_err("try:\n    1 / 0\nfinally:\n    print('cleanup')");
    assert_eq!(err.headline(), "ZeroDivisionError: division by zero");
    assert_eq!(err.traceback[0].line, 2);
}

#[test]
fn bare_raise_reraises_current_exception() {
    let err = run_err("try:\n    raise KeyError('k')\nexcept KeyError:\n    raise");
    assert!(matches!(err.error, RuntimeError::Raised(ref e) if e.kind == "KeyError"));
    assert_eq!(err.traceback[0].line, 2);
}

#[test]
fn recursion_limit() {
    let err = run_err("def f(n):\n    return f(n + 1)\nf(0)");
    assert_eq!(err.error, RuntimeError::StackOverflow);
    assert_eq!(err.error.kind(), "RecursionError");
}

#[test]
fn traceback_crosses_into_imported_module() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("module.py"),
        "def fn():\n    raise Exception('e')\n",
    )
    .unwrap();
    let doc = dir.path().join("doc.md");
    let (_, result) = exec_at(
        "import module\nmodule.fn()\n",
        &doc,
        &Namespace::new(),
        vec![dir.path().to_path_buf()],
    );
    let err = result.unwrap_err();
    assert_eq!(err.headline(), "Exception: e");
    let frames: Vec<(String, usize, String, Option<String>)> = err
        .traceback
        .iter()
        .map(|f| {
            (
                f.path.file_name().unwrap().to_string_lossy().into_owned(),
                f.line,
                f.name.clone(),
                f.source_line.clone(),
            )
        })
        .collect();
    assert_eq!(
        frames,
        vec![
            ("doc.md".into(), 2, "<module>".into(), Some("module.fn()".into())),
            ("module.py".into(), 2, "fn".into(), Some("raise Exception('e')".into())),
        ]
    );
}

#[test]
fn from_import_and_module_cache() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("helpers.py"),
        "print('loading')\ndef double(x):\n    return x * 2\n",
    )
    .unwrap();
    let code = |source: &str| {
        Rc::new(Code::compile(source, dir.path().join("doc.md"), &AssertionRewriter).unwrap())
    };
    let mut output = Vec::new();
    {
        let mut interpreter =
            Interpreter::new(&mut output).with_search_paths(vec![dir.path().to_path_buf()]);
        let namespace = Namespace::new();
        interpreter
            .exec(code("from helpers import double\nprint(double(2))"), &namespace)
            .unwrap();
        interpreter
            .exec(code("import helpers as h\nprint(h.double(5))"), &namespace)
            .unwrap();
    }
    assert_eq!(String::from_utf8(output).unwrap(), "loading\n4\n10\n");
}

#[test]
fn missing_module() {
    let err = run_err("import nowhere");
    assert_eq!(err.headline(), "ModuleNotFoundError: No module named 'nowhere'");
}

#[test]
fn builtin_modules() {
    let dir = tempfile::tempdir().unwrap();
    let namespace = Namespace::new();
    namespace.set("tmp_path", RuntimeValue::Path(dir.path().to_path_buf()));
    let source = "\
import os
from pathlib import Path
target = tmp_path / 'notes.txt'
target.write_text('hi')
print(target.read_text(), target.name, Path(str(tmp_path)).is_dir())
print(type_check if False else 'ok')
";
    let (output, result) = exec_at(source, Path::new("doc.md"), &namespace, Vec::new());
    result.unwrap();
    assert_eq!(output, "hi notes.txt True\nok\n");
    assert!(dir.path().join("notes.txt").exists());
}

#[test]
fn integer_edge_cases_raise_instead_of_aborting() {
    let err = run_err("x = -9223372036854775807 - 1\nprint(x // -1)");
    assert_eq!(err.headline(), "OverflowError: integer overflow");
    assert_eq!(err.traceback[0].line, 2);
    assert_eq!(run("x = -9223372036854775807 - 1\nprint(x % -1)"), "0\n");
}

#[test]
fn range_stays_bounded() {
    assert_eq!(
        run("print(range(9223372036854775806, 9223372036854775807, 5))"),
        "[9223372036854775806]\n"
    );
    assert_eq!(run("print(range(5, 0, -2))"), "[5, 3, 1]\n");
    assert_eq!(run_err("range(10 ** 18)").error, RuntimeError::Overflow);
}

#[test]
fn oversized_repetition_is_an_overflow_error() {
    let err = run_err("s = 'ab' * 4611686018427387904");
    assert_eq!(err.headline(), "OverflowError: integer overflow");
    let err = run_err("items = [1, 2] * 9223372036854775807");
    assert_eq!(err.error, RuntimeError::Overflow);
    assert_eq!(run("print('ab' * 3, [0] * 2, 'x' * -1)"), "ababab [0, 0] \n");
}

#[test]
fn type_errors_are_reported() {
    let err = run_err("1 + 'a'");
    assert_eq!(
        err.headline(),
        "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
    );
}
