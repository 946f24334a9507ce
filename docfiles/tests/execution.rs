use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use docfiles::host::execute;
use docfiles::{
    Config, FileCollector, MarkdownCollector, Outcome, Phase, Report, ResolutionError, RunFlags,
    ValueResolver,
};
use interpreter::RuntimeValue;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Resolves from a fixed table, plus a fresh `tmp_path` under the test dir.
struct Fixtures {
    root: PathBuf,
    values: HashMap<String, RuntimeValue>,
    made: usize,
}

impl ValueResolver for Fixtures {
    fn resolve(&mut self, name: &str) -> Result<RuntimeValue, ResolutionError> {
        if name == "tmp_path" {
            self.made += 1;
            let dir = self.root.join(format!("tmp{}", self.made));
            std::fs::create_dir_all(&dir).map_err(|e| ResolutionError::Failed {
                name: name.into(),
                message: e.to_string(),
            })?;
            return Ok(RuntimeValue::Path(dir));
        }
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::Unknown(name.into()))
    }
}

struct Run {
    dir: TempDir,
    results: Vec<(String, Outcome, String)>,
}

impl Run {
    fn doc(&self) -> PathBuf {
        self.dir.path().join("doc.md")
    }

    fn outcomes(&self) -> Vec<&Outcome> {
        self.results.iter().map(|(_, outcome, _)| outcome).collect()
    }

    fn report(&self, index: usize) -> &Report {
        match &self.results[index].1 {
            Outcome::Failed(report) => report,
            other => panic!("item {index} did not fail: {other:?}"),
        }
    }
}

fn run_doc(markdown: &str) -> Run {
    run_doc_with(markdown, &[], Config::default(), HashMap::new())
}

fn run_doc_with(
    markdown: &str,
    files: &[(&str, &str)],
    config: Config,
    values: HashMap<String, RuntimeValue>,
) -> Run {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    let doc = dir.path().join("doc.md");
    std::fs::write(&doc, markdown).unwrap();

    let collector = MarkdownCollector::new(Rc::new(config));
    let items = collector
        .try_collect(&doc, &RunFlags { docfiles: true })
        .expect("doc.md declined")
        .collect()
        .expect("collection failed");

    let mut fixtures = Fixtures {
        root: dir.path().to_path_buf(),
        values,
        made: 0,
    };
    let mut results = Vec::new();
    for mut item in items {
        let mut output = Vec::new();
        let outcome = execute(item.as_mut(), &mut fixtures, &mut output);
        results.push((
            item.name().to_string(),
            outcome,
            String::from_utf8(output).unwrap(),
        ));
    }
    Run { dir, results }
}

fn joined(lines: &[&str]) -> String {
    lines.join("\n")
}

#[test]
fn pass_with_output() {
    let run = run_doc("```python\nprint('test-output', end='')\n```");
    assert_eq!(run.outcomes(), [&Outcome::Passed]);
    assert_eq!(run.results[0].2, "test-output");
}

#[test]
fn rewrite_assertion() {
    let run = run_doc(&joined(&["```python\nassert 'A' == 'B', 'message'", "```"]));
    let report = run.report(0);
    assert_eq!(report.phase, Phase::Run);
    let rendered = report.to_string();
    let tail: Vec<&str> = rendered.lines().skip(2).collect();
    assert_eq!(
        tail,
        [
            "E   AssertionError: message",
            "E   assert 'A' == 'B'",
            "E     - B",
            "E     + A",
        ]
    );
}

#[test]
fn plain_asserts_when_rewriting_is_off() {
    let config = Config {
        rewrite_asserts: false,
        ..Config::default()
    };
    let run = run_doc_with("```python\nassert 1 == 2\n```", &[], config, HashMap::new());
    let report = run.report(0);
    assert_eq!(report.headline, "AssertionError");
    assert!(report.explanation.is_empty());
}

#[test]
fn rewrite_stacktrace() {
    let run = run_doc_with(
        &joined(&["# heading", "```python", "import module", "module.fn()", "```"]),
        &[("module.py", joined(&["def fn():", "    raise Exception('e')"]).as_str())],
        Config::default(),
        HashMap::new(),
    );
    let doc = run.doc();
    let module = run.dir.path().join("module.py");
    assert_eq!(
        run.report(0).to_string(),
        joined(&[
            format!("{}:4: in section <python-section-0>", doc.display()).as_str(),
            "    module.fn()",
            format!("{}:2: in fn", module.display()).as_str(),
            "    raise Exception('e')",
            "E   Exception: e",
        ])
    );
}

#[test]
fn line_attribution_ignores_preceding_blocks() {
    let markdown = joined(&[
        "```python",
        "x = 1",
        "```",
        "",
        "```python {\"name\": \"later\"}",
        "y = 2",
        "z = missing",
        "```",
    ]);
    let run = run_doc(&markdown);
    let frame = &run.report(1).frames[0];
    assert_eq!(frame.line, 7);
    assert_eq!(frame.name, "section <later>");
    assert_eq!(frame.source_line.as_deref(), Some("z = missing"));
    assert_eq!(run.report(1).headline, "NameError: name 'missing' is not defined");
}

#[test]
fn frames_inside_block_functions_are_remapped() {
    let markdown = joined(&[
        "intro",
        "```python",
        "def check(n):",
        "    assert n > 1",
        "check(0)",
        "```",
    ]);
    let run = run_doc(&markdown);
    let lines: Vec<(usize, &str)> = run
        .report(0)
        .frames
        .iter()
        .map(|f| (f.line, f.name.as_str()))
        .collect();
    assert_eq!(
        lines,
        [(5, "section <python-section-0>"), (4, "section <python-section-0>")]
    );
    assert_eq!(run.report(0).explanation, ["assert n > 1", "assert 0 > 1"]);
}

#[test]
fn syntax_error_is_a_run_failure_at_the_file_line() {
    let run = run_doc(&joined(&["text", "```python", "x = 1", "x = )", "```"]));
    let report = run.report(0);
    assert_eq!(report.phase, Phase::Run);
    assert!(report.headline.starts_with("SyntaxError: "));
    assert_eq!(report.frames.len(), 1);
    assert_eq!(report.frames[0].line, 4);
    assert_eq!(report.frames[0].source_line.as_deref(), Some("x = )"));
}

#[test]
fn scopes_share_bindings() {
    let run = run_doc(&joined(&[
        "```python {\"scope\": \"scope\"}",
        "value = 1",
        "```",
        "```python {\"scope\": \"scope\"}",
        "assert value == 1",
        "```",
    ]));
    assert_eq!(run.outcomes(), [&Outcome::Passed, &Outcome::Passed]);
}

#[test]
fn unscoped_blocks_are_isolated() {
    let run = run_doc(&joined(&[
        "```python",
        "value = 1",
        "```",
        "```python",
        "assert value == 1",
        "```",
    ]));
    assert_eq!(run.results[0].1, Outcome::Passed);
    assert_eq!(run.report(1).headline, "NameError: name 'value' is not defined");
}

#[test]
fn different_scopes_are_isolated() {
    let run = run_doc(&joined(&[
        "```python {\"scope\": \"a\"}",
        "value = 1",
        "```",
        "```python {\"scope\": \"b\"}",
        "print(value)",
        "```",
    ]));
    assert!(matches!(run.results[1].1, Outcome::Failed(_)));
}

#[test]
fn failure_does_not_stop_later_blocks() {
    let run = run_doc(&joined(&[
        "```python {\"scope\": \"s\"}",
        "value = 1",
        "raise ValueError('boom')",
        "```",
        "```python {\"scope\": \"s\"}",
        "assert value == 1",
        "```",
    ]));
    assert!(matches!(run.results[0].1, Outcome::Failed(_)));
    assert_eq!(run.results[1].1, Outcome::Passed);
}

#[test]
fn skip() {
    let run = run_doc(&joined(&[
        "```python {\"skip\": true}",
        "raise RuntimeError('should not run')",
        "```",
    ]));
    assert!(matches!(run.results[0].1, Outcome::Skipped(_)));
    assert_eq!(run.results[0].2, "");
}

#[test]
fn skipped_blocks_never_touch_the_namespace() {
    let run = run_doc(&joined(&[
        "```python {\"scope\": \"s\", \"skip\": true}",
        "value = 1",
        "```",
        "```python {\"scope\": \"s\"}",
        "print(value)",
        "```",
    ]));
    assert!(matches!(run.results[0].1, Outcome::Skipped(_)));
    assert_eq!(run.report(1).headline, "NameError: name 'value' is not defined");
}

#[test]
fn inject_tmp_path() {
    let run = run_doc(&joined(&[
        "```python {\"fixtures\": [\"tmp_path\"]}",
        "assert tmp_path.exists()",
        "(tmp_path / 'out.txt').write_text('data')",
        "```",
    ]));
    assert_eq!(run.outcomes(), [&Outcome::Passed]);
    assert!(run.dir.path().join("tmp1").join("out.txt").exists());
}

#[test]
fn explicit_fixture() {
    let values = HashMap::from([("answer".to_string(), RuntimeValue::Int(42))]);
    let run = run_doc_with(
        &joined(&["```python {\"fixtures\": [\"answer\"]}", "assert answer == 42", "```"]),
        &[],
        Config::default(),
        values,
    );
    assert_eq!(run.outcomes(), [&Outcome::Passed]);
}

#[test]
fn unknown_fixture_is_a_setup_failure() {
    let run = run_doc(&joined(&["```python {\"fixtures\": [\"db\"]}", "print('ran')", "```"]));
    let report = run.report(0);
    assert_eq!(report.phase, Phase::Setup);
    assert_eq!(report.headline, "fixture 'db' not found");
    assert_eq!(run.results[0].2, "");
}

#[test]
fn pythonpath_extends_imports() {
    let lib = tempfile::tempdir().unwrap();
    std::fs::write(lib.path().join("helpers.py"), "GREETING = 'hello'\n").unwrap();
    let config = Config {
        pythonpath: vec![lib.path().to_path_buf()],
        ..Config::default()
    };
    let run = run_doc_with(
        "```python\nfrom helpers import GREETING\nprint(GREETING)\n```",
        &[],
        config,
        HashMap::new(),
    );
    assert_eq!(run.outcomes(), [&Outcome::Passed]);
    assert_eq!(run.results[0].2, "hello\n");
}

#[test]
fn docs_without_the_flag_are_declined() {
    let collector = MarkdownCollector::new(Rc::new(Config::default()));
    assert!(
        collector
            .try_collect(Path::new("doc.md"), &RunFlags { docfiles: false })
            .is_none()
    );
}
