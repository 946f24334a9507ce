//! Discovery, collection and the run loop.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use docfiles::host::execute;
use docfiles::{
    CollectionError, CollectionNode, Config, FileCollector, Item, MarkdownCollector, Outcome,
    Phase, Report, RunFlags,
};

use crate::fixtures::FixtureResolver;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("file or directory not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("{}: not a recognized collection root", .0.display())]
    NotCollectable(PathBuf),
}

/// Options of `docfiles test` that shape the run loop.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only run items whose id contains this substring.
    pub filter: Option<String>,
    /// Let blocks print straight to stdout instead of capturing.
    pub no_capture: bool,
    pub no_color: bool,
}

pub struct Collected {
    pub items: Vec<Box<dyn Item>>,
    pub errors: Vec<CollectionError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deselected: usize,
    pub errors: usize,
}

impl Summary {
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.errors == 0 {
            EXIT_OK
        } else {
            EXIT_FAILED
        }
    }
}

pub struct Session {
    collectors: Vec<Box<dyn FileCollector>>,
    flags: RunFlags,
    config: Rc<Config>,
}

impl Session {
    pub fn new(config: Rc<Config>, flags: RunFlags) -> Self {
        Session {
            collectors: vec![Box::new(MarkdownCollector::new(Rc::clone(&config)))],
            flags,
            config,
        }
    }

    fn offer(&self, path: &Path) -> Option<Box<dyn CollectionNode>> {
        self.collectors
            .iter()
            .find_map(|collector| collector.try_collect(path, &self.flags))
    }

    /// Nodes for every accepted file under `roots`, in sorted order per root.
    /// An explicitly named file nobody accepts is a usage error.
    pub fn discover(&self, roots: &[PathBuf]) -> Result<Vec<Box<dyn CollectionNode>>, UsageError> {
        let mut nodes = Vec::new();
        for root in roots {
            let root = normalize(root);
            if root.is_dir() {
                self.walk(&root, &mut nodes);
            } else if root.is_file() {
                match self.offer(&root) {
                    Some(node) => nodes.push(node),
                    None => return Err(UsageError::NotCollectable(root)),
                }
            } else {
                return Err(UsageError::NotFound(root));
            }
        }
        Ok(nodes)
    }

    fn walk(&self, dir: &Path, nodes: &mut Vec<Box<dyn CollectionNode>>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn!("cannot read directory {}: {err}", dir.display());
                return;
            }
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| normalize(&entry.path())).collect();
        paths.sort();
        for path in paths {
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with('.'));
            if hidden {
                continue;
            }
            if path.is_dir() {
                self.walk(&path, nodes);
            } else if let Some(node) = self.offer(&path) {
                nodes.push(node);
            }
        }
    }

    pub fn collect(&self, roots: &[PathBuf]) -> Result<Collected, UsageError> {
        let mut collected = Collected {
            items: Vec::new(),
            errors: Vec::new(),
        };
        for node in self.discover(roots)? {
            match node.collect() {
                Ok(items) => collected.items.extend(items),
                Err(err) => collected.errors.push(err),
            }
        }
        log::debug!(
            "collected {} item(s), {} error(s)",
            collected.items.len(),
            collected.errors.len()
        );
        Ok(collected)
    }

    /// Run items in order, reporting to `out`.
    pub fn run(
        &self,
        collected: Collected,
        options: &RunOptions,
        out: &mut dyn Write,
    ) -> io::Result<Summary> {
        let mut summary = Summary {
            errors: collected.errors.len(),
            ..Summary::default()
        };
        for error in &collected.errors {
            emit_collection_error(error, options.no_color);
        }

        let mut failures: Vec<(String, Report, String)> = Vec::new();
        for mut item in collected.items {
            let id = item_id(item.as_ref());
            if let Some(filter) = &options.filter {
                if !id.contains(filter.as_str()) {
                    summary.deselected += 1;
                    continue;
                }
            }

            let path = item.location().0.to_path_buf();
            let mut resolver = FixtureResolver::new(&path, &self.config.fixtures);
            let mut captured = Vec::new();
            let outcome = if options.no_capture {
                execute(item.as_mut(), &mut resolver, &mut io::stdout())
            } else {
                execute(item.as_mut(), &mut resolver, &mut captured)
            };
            drop(resolver);

            match outcome {
                Outcome::Passed => {
                    summary.passed += 1;
                    writeln!(out, "  {}  {}", pass_label(options.no_color), id)?;
                }
                Outcome::Skipped(reason) => {
                    summary.skipped += 1;
                    writeln!(out, "  {}  {} ({})", skip_label(options.no_color), id, reason)?;
                }
                Outcome::Failed(report) => {
                    summary.failed += 1;
                    writeln!(out, "  {}  {}", fail_label(options.no_color), id)?;
                    failures.push((id, report, String::from_utf8_lossy(&captured).into_owned()));
                }
            }
        }

        if !failures.is_empty() {
            writeln!(out)?;
            writeln!(out, "failures:")?;
            for (id, report, stdout) in &failures {
                writeln!(out)?;
                let phase = match report.phase {
                    Phase::Setup => " (setup)",
                    Phase::Run => "",
                };
                writeln!(out, "  --- {id}{phase} ---")?;
                for line in report.to_string().lines() {
                    writeln!(out, "  {line}")?;
                }
                if !stdout.is_empty() {
                    writeln!(out)?;
                    writeln!(out, "  captured stdout:")?;
                    for line in stdout.lines() {
                        writeln!(out, "  {line}")?;
                    }
                }
            }
        }

        writeln!(out)?;
        write_summary(out, &summary, options.no_color)?;
        Ok(summary)
    }
}

/// Write the `path::name @ line` listing of collected items.
pub fn write_listing(collected: &Collected, out: &mut dyn Write) -> io::Result<()> {
    for item in &collected.items {
        writeln!(out, "{} @ {}", item_id(item.as_ref()), item.location().1)?;
    }
    Ok(())
}

/// `path::name`, the id `-k` filters on.
fn item_id(item: &dyn Item) -> String {
    format!("{}::{}", item.location().0.display(), item.name())
}

fn normalize(path: &Path) -> PathBuf {
    match path.strip_prefix(".") {
        Ok(rest) if !rest.as_os_str().is_empty() => rest.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

fn write_summary(out: &mut dyn Write, summary: &Summary, no_color: bool) -> io::Result<()> {
    let status = match (summary.exit_code() == EXIT_OK, no_color) {
        (true, true) => "ok",
        (true, false) => "\x1b[32mok\x1b[0m",
        (false, true) => "FAILED",
        (false, false) => "\x1b[31mFAILED\x1b[0m",
    };
    write!(
        out,
        "test result: {status}. {} passed, {} failed, {} skipped",
        summary.passed, summary.failed, summary.skipped
    )?;
    if summary.deselected > 0 {
        write!(out, "; {} deselected", summary.deselected)?;
    }
    if summary.errors > 0 {
        write!(out, "; {} collection error(s)", summary.errors)?;
    }
    writeln!(out)
}

/// Render a collection error, as a source diagnostic when it points into the file.
pub fn emit_collection_error(error: &CollectionError, no_color: bool) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let mut files = SimpleFiles::new();
    let source = std::fs::read_to_string(error.path()).unwrap_or_default();
    let file_id = files.add(error.path().display().to_string(), source);
    match error.to_diagnostic(file_id) {
        Some(diagnostic) => {
            let writer = StandardStream::stderr(color_choice);
            let config = term::Config::default();
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
        }
        None => eprintln!("error: {error}"),
    }
}

fn pass_label(no_color: bool) -> &'static str {
    if no_color { "PASS" } else { "\x1b[32mPASS\x1b[0m" }
}

fn fail_label(no_color: bool) -> &'static str {
    if no_color { "FAIL" } else { "\x1b[31mFAIL\x1b[0m" }
}

fn skip_label(no_color: bool) -> &'static str {
    if no_color { "SKIP" } else { "\x1b[33mSKIP\x1b[0m" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENABLED: RunFlags = RunFlags { docfiles: true };

    fn plain() -> RunOptions {
        RunOptions {
            no_color: true,
            ..RunOptions::default()
        }
    }

    fn session(flags: RunFlags) -> Session {
        Session::new(Rc::new(Config::default()), flags)
    }

    fn run_dir(dir: &Path, options: &RunOptions) -> (Summary, String) {
        let session = session(ENABLED);
        let collected = session.collect(&[dir.to_path_buf()]).unwrap();
        let mut out = Vec::new();
        let summary = session.run(collected, options, &mut out).unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    #[test]
    fn walks_directories_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        for name in ["b.md", "a.md", "sub/c.md", ".hidden/d.md", "notes.txt"] {
            std::fs::write(dir.path().join(name), "```python\npass\n```\n").unwrap();
        }
        let nodes = session(ENABLED).discover(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<PathBuf> = nodes
            .iter()
            .map(|node| node.path().strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            [PathBuf::from("a.md"), PathBuf::from("b.md"), PathBuf::from("sub/c.md")]
        );
    }

    #[test]
    fn explicit_file_needs_a_collector() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.md");
        std::fs::write(&doc, "").unwrap();
        let err = session(RunFlags::default())
            .discover(&[doc.clone()])
            .err()
            .unwrap();
        assert!(matches!(err, UsageError::NotCollectable(_)));

        let other = dir.path().join("doc.nonmd");
        std::fs::write(&other, "").unwrap();
        assert!(matches!(
            session(ENABLED).discover(&[other]),
            Err(UsageError::NotCollectable(_))
        ));
        assert_eq!(session(ENABLED).discover(&[doc]).unwrap().len(), 1);
    }

    #[test]
    fn missing_path() {
        assert!(matches!(
            session(ENABLED).discover(&[PathBuf::from("no/such/dir")]),
            Err(UsageError::NotFound(_))
        ));
    }

    #[test]
    fn disabled_flag_collects_nothing_from_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc.md"), "```python\npass\n```\n").unwrap();
        let collected = session(RunFlags::default())
            .collect(&[dir.path().to_path_buf()])
            .unwrap();
        assert!(collected.items.is_empty());
    }

    #[test]
    fn report_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "```python\nprint('ok')\n```\n\
             ```python {\"name\": \"broken\"}\nprint('before')\nassert 1 == 2\n```\n\
             ```python {\"skip\": true}\n```\n",
        )
        .unwrap();
        let (summary, out) = run_dir(dir.path(), &plain());
        assert_eq!(
            summary,
            Summary {
                passed: 1,
                failed: 1,
                skipped: 1,
                ..Summary::default()
            }
        );
        assert_eq!(summary.exit_code(), EXIT_FAILED);

        let doc = dir.path().join("doc.md");
        let expected = format!(
            "  PASS  {doc}::python-section-0\n\
             \x20 FAIL  {doc}::broken\n\
             \x20 SKIP  {doc}::python-section-2 (skipped by block annotation)\n\
             \n\
             failures:\n\
             \n\
             \x20 --- {doc}::broken ---\n\
             \x20 {doc}:6: in section <broken>\n\
             \x20     assert 1 == 2\n\
             \x20 E   AssertionError\n\
             \x20 E   assert 1 == 2\n\
             \n\
             \x20 captured stdout:\n\
             \x20 before\n\
             \n\
             test result: FAILED. 1 passed, 1 failed, 1 skipped\n",
            doc = doc.display()
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn filter_deselects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "```python {\"name\": \"keep\"}\n```\n```python {\"name\": \"drop\"}\nraise ValueError()\n```\n",
        )
        .unwrap();
        let options = RunOptions {
            filter: Some("::keep".into()),
            ..plain()
        };
        let (summary, out) = run_dir(dir.path(), &options);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.deselected, 1);
        assert_eq!(summary.exit_code(), EXIT_OK);
        assert!(out.ends_with("test result: ok. 1 passed, 0 failed, 0 skipped; 1 deselected\n"));
    }

    #[test]
    fn collection_errors_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.md"), "```python {oops}\n```\n").unwrap();
        std::fs::write(dir.path().join("good.md"), "```python\npass\n```\n").unwrap();
        let (summary, _) = run_dir(dir.path(), &plain());
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.exit_code(), EXIT_FAILED);
    }

    #[test]
    fn setup_failures_are_labelled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "```python {\"fixtures\": [\"db\"]}\n```\n",
        )
        .unwrap();
        let (summary, out) = run_dir(dir.path(), &plain());
        assert_eq!(summary.failed, 1);
        assert!(out.contains("::python-section-0 (setup) ---\n  E   fixture 'db' not found\n"));
    }

    #[test]
    fn listing_shows_ids_and_first_content_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "# title\n\n```python\nx = 1\n```\n\n```python {\"name\": \"custom\"}\npass\n```\n",
        )
        .unwrap();
        let collected = session(ENABLED).collect(&[dir.path().to_path_buf()]).unwrap();
        let mut out = Vec::new();
        write_listing(&collected, &mut out).unwrap();
        let doc = dir.path().join("doc.md");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!(
                "{doc}::python-section-0 @ 4\n{doc}::custom @ 8\n",
                doc = doc.display()
            )
        );
    }

    #[test]
    fn uncaptured_output_is_not_repeated_in_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("doc.md"),
            "```python\nprint('visible')\nraise ValueError('boom')\n```\n",
        )
        .unwrap();
        let options = RunOptions {
            no_capture: true,
            ..plain()
        };
        let (summary, out) = run_dir(dir.path(), &options);
        assert_eq!(summary.failed, 1);
        assert!(out.contains("  E   ValueError: boom\n"));
        assert!(!out.contains("captured stdout"));
        assert!(!out.contains("visible"));
    }

    #[test]
    fn normalize_strips_leading_dot() {
        assert_eq!(normalize(Path::new("./doc.md")), PathBuf::from("doc.md"));
        assert_eq!(normalize(Path::new(".")), PathBuf::from("."));
        assert_eq!(normalize(Path::new("docs")), PathBuf::from("docs"));
    }
}
