use std::path::{Path, PathBuf};
use std::rc::Rc;

use docfiles::{
    CodeSection, CollectionError, CollectionNode, Config, FileCollector, Item, MarkdownCollector,
    MarkdownFile, RunFlags, TagMatch,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

const ENABLED: RunFlags = RunFlags { docfiles: true };

fn sections(markdown: &str) -> Vec<CodeSection> {
    sections_with(markdown, Config::default())
}

fn sections_with(markdown: &str, config: Config) -> Vec<CodeSection> {
    MarkdownFile::new("doc.md", Rc::new(config))
        .collect_source(markdown)
        .expect("collection failed")
}

fn names(sections: &[CodeSection]) -> Vec<&str> {
    sections.iter().map(|s| s.name()).collect()
}

#[test]
fn collect_nothing() {
    assert!(sections("# only header").is_empty());
}

#[test]
fn collect_and_parse_code_section() {
    let found = sections("first\nsecond\n```python\n# comment\npass\n```");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name(), "python-section-0");
    assert_eq!(found[0].lineno(), 4);
    assert_eq!(found[0].source(), "# comment\npass\n");
    assert_eq!(found[0].location(), (Path::new("doc.md"), 4));
}

#[test]
fn dont_collect_non_python_code_section() {
    assert!(sections("```non-python\n```").is_empty());
    assert!(sections("```\nprint(1)\n```").is_empty());
}

#[test]
fn n_tagged_blocks_give_n_items_in_order() {
    let markdown = "\
# Guide

```python
a = 1
```

```rust
fn main() {}
```

Some prose.

```python {\"name\": \"second\"}
b = 2
```

```python
c = 3
```
";
    let found = sections(markdown);
    assert_eq!(names(&found), ["python-section-0", "second", "python-section-2"]);
    let lines: Vec<usize> = found.iter().map(CodeSection::lineno).collect();
    assert_eq!(lines, [4, 14, 18]);
    assert_eq!(found[2].source(), "c = 3\n");
}

#[test]
fn custom_name_is_used_verbatim() {
    let found = sections("```python {\"name\": \"custom\"}\npass\n```");
    assert_eq!(names(&found), ["custom"]);
}

#[test]
fn skip_flag_is_reported_as_skip_reason() {
    let found = sections("```python {\"skip\": true}\nraise RuntimeError('x')\n```\n```python\n```");
    assert!(found[0].skip_reason().is_some());
    assert!(found[1].skip_reason().is_none());
}

#[test]
fn scopes_bind_shared_namespaces() {
    let markdown = "\
```python {\"scope\": \"s\"}
```
```python {\"scope\": \"s\"}
```
```python {\"scope\": \"t\"}
```
```python
```
```python
```
";
    let found = sections(markdown);
    assert!(found[0].namespace().ptr_eq(found[1].namespace()));
    assert!(!found[0].namespace().ptr_eq(found[2].namespace()));
    assert!(!found[3].namespace().ptr_eq(found[4].namespace()));
    assert!(!found[0].namespace().ptr_eq(found[3].namespace()));
}

#[test]
fn scopes_are_not_shared_across_files() {
    let config = Rc::new(Config::default());
    let markdown = "```python {\"scope\": \"s\"}\n```";
    let a = MarkdownFile::new("a.md", Rc::clone(&config))
        .collect_source(markdown)
        .unwrap();
    let b = MarkdownFile::new("b.md", config).collect_source(markdown).unwrap();
    assert!(!a[0].namespace().ptr_eq(b[0].namespace()));
}

#[test]
fn autouse_and_explicit_fixtures_are_requested_once() {
    let found = sections("```python {\"fixtures\": [\"env\", \"tmp_path\"]}\n```");
    assert_eq!(found[0].requested_fixtures(), ["tmp_path", "env"]);
}

#[rstest]
#[case::prefix(TagMatch::Prefix)]
#[case::exact(TagMatch::Exact)]
fn annotated_and_bare_tags_match_in_both_modes(#[case] tag_match: TagMatch) {
    let config = Config {
        tag_match,
        ..Config::default()
    };
    let found = sections_with("```python\n```\n```python {}\n```\n```python{}\n```\n", config);
    assert_eq!(found.len(), 3);
}

#[test]
fn exact_mode_ignores_longer_tags() {
    let config = Config {
        tag_match: TagMatch::Exact,
        ..Config::default()
    };
    let found = sections_with("```python3\nx\n```\n```python\ny\n```\n", config);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].source(), "y\n");
}

#[test]
fn prefix_mode_reads_the_rest_of_a_longer_tag_as_annotation() {
    let result = MarkdownFile::new("doc.md", Rc::new(Config::default()))
        .collect_source("```python3\nx\n```\n");
    assert!(matches!(result, Err(CollectionError::Annotation { .. })));
}

#[test]
fn malformed_annotation_fails_the_file() {
    let err = MarkdownFile::new("doc.md", Rc::new(Config::default()))
        .collect_source("text\n\n```python {name: 1}\npass\n```\n")
        .unwrap_err();
    match err {
        CollectionError::Annotation { path, line, span, .. } => {
            assert_eq!(path, PathBuf::from("doc.md"));
            assert_eq!(line, 3);
            assert_eq!(span, 6..25);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn collector_is_gated_by_the_flag() {
    let collector = MarkdownCollector::new(Rc::new(Config::default()));
    assert!(collector.try_collect(Path::new("doc.md"), &RunFlags::default()).is_none());
    let node = collector.try_collect(Path::new("doc.md"), &ENABLED).unwrap();
    assert_eq!(node.path(), Path::new("doc.md"));
}

#[test]
fn collector_declines_other_extensions() {
    let collector = MarkdownCollector::new(Rc::new(Config::default()));
    assert!(collector.try_collect(Path::new("doc.nonmd"), &ENABLED).is_none());
    assert!(collector.try_collect(Path::new("module.py"), &ENABLED).is_none());
}

#[test]
fn collecting_reads_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.md");
    std::fs::write(&path, "```python\npass\n```\n").unwrap();
    let collector = MarkdownCollector::new(Rc::new(Config::default()));
    let items = collector.try_collect(&path, &ENABLED).unwrap().collect().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].location(), (path.as_path(), 2));
}

#[test]
fn unreadable_file_is_a_collection_error() {
    let collector = MarkdownCollector::new(Rc::new(Config::default()));
    let node = collector
        .try_collect(Path::new("does/not/exist.md"), &ENABLED)
        .unwrap();
    assert!(matches!(node.collect(), Err(CollectionError::Read { .. })));
}
