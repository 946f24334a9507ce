//! Fenced code blocks pulled out of markdown text.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, OffsetIter, Options, Parser, Tag, TagEnd};
use serde::Deserialize;

/// How a fence's info string is compared against the language tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    /// The info string starts with the tag (`python`, `python {...}`, `python3`).
    #[default]
    Prefix,
    /// The first word of the info string is the tag, optionally followed by
    /// whitespace or an annotation.
    Exact,
}

impl TagMatch {
    pub fn matches(self, info: &str, tag: &str) -> bool {
        match self {
            TagMatch::Prefix => info.starts_with(tag),
            TagMatch::Exact => info.strip_prefix(tag).is_some_and(|rest| {
                rest.is_empty() || rest.starts_with(char::is_whitespace) || rest.starts_with('{')
            }),
        }
    }
}

/// One fenced code block whose info string matched the language tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockToken {
    /// Content between the fences, including the trailing newline.
    pub text: String,
    /// 1-based line of the first content line.
    pub line: usize,
    /// Full info string of the opening fence.
    pub info: String,
    /// Byte range of the opening fence line.
    pub fence: Range<usize>,
}

impl CodeBlockToken {
    /// The info string with the language tag stripped and surrounding
    /// whitespace removed.
    pub fn annotation(&self, tag: &str) -> &str {
        self.info.get(tag.len()..).unwrap_or("").trim()
    }
}

/// Lazily scans markdown for fenced blocks tagged with a language.
pub struct CodeBlocks<'a> {
    source: &'a str,
    events: OffsetIter<'a>,
    tag: &'a str,
    tag_match: TagMatch,
    /// Line number at `cursor`, both advanced monotonically.
    line: usize,
    cursor: usize,
}

impl<'a> CodeBlocks<'a> {
    pub fn new(source: &'a str, tag: &'a str, tag_match: TagMatch) -> Self {
        CodeBlocks {
            source,
            events: Parser::new_ext(source, Options::empty()).into_offset_iter(),
            tag,
            tag_match,
            line: 1,
            cursor: 0,
        }
    }

    fn line_at(&mut self, offset: usize) -> usize {
        let offset = offset.min(self.source.len());
        if offset > self.cursor {
            self.line += self.source.as_bytes()[self.cursor..offset]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
            self.cursor = offset;
        }
        self.line
    }

    fn fence_span(&self, start: usize) -> Range<usize> {
        let end = self.source[start..]
            .find('\n')
            .map_or(self.source.len(), |n| start + n);
        start..end
    }
}

impl Iterator for CodeBlocks<'_> {
    type Item = CodeBlockToken;

    fn next(&mut self) -> Option<CodeBlockToken> {
        loop {
            let (event, range) = self.events.next()?;
            let Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) = event else {
                continue;
            };
            if !self.tag_match.matches(&info, self.tag) {
                continue;
            }

            let mut text = String::new();
            for (event, _) in self.events.by_ref() {
                match event {
                    Event::Text(chunk) => text.push_str(&chunk),
                    Event::End(TagEnd::CodeBlock) => break,
                    _ => {}
                }
            }

            let fence_line = self.line_at(range.start);
            return Some(CodeBlockToken {
                text,
                line: fence_line + 1,
                info: info.to_string(),
                fence: self.fence_span(range.start),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn first_content_line_and_text() {
        let source = "first\nsecond\n```python\n# comment\npass\n```\n";
        let tokens: Vec<_> = CodeBlocks::new(source, "python", TagMatch::Prefix).collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].line, 4);
        assert_eq!(tokens[0].text, "# comment\npass\n");
        assert_eq!(&source[tokens[0].fence.clone()], "```python");
    }

    #[test]
    fn skips_other_languages_and_indented_blocks() {
        let source = "```non-python\nx\n```\n\n    indented\n\n```python\ny = 1\n```\n";
        let tokens: Vec<_> = CodeBlocks::new(source, "python", TagMatch::Prefix).collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].line, 8);
    }

    #[test]
    fn line_numbers_stay_absolute_across_blocks() {
        let source = "```python\na\n```\ntext\n\n```python\nb\nc\n```\n```python\n```\n";
        let lines: Vec<usize> = CodeBlocks::new(source, "python", TagMatch::Prefix)
            .map(|t| t.line)
            .collect();
        assert_eq!(lines, vec![2, 7, 11]);
    }

    #[test]
    fn tilde_fences_and_annotations() {
        let source = "~~~python {\"name\": \"custom\"}\npass\n~~~\n";
        let token = CodeBlocks::new(source, "python", TagMatch::Prefix).next().unwrap();
        assert_eq!(token.annotation("python"), "{\"name\": \"custom\"}");
    }

    #[rstest]
    #[case::bare("python", TagMatch::Prefix, true)]
    #[case::bare_exact("python", TagMatch::Exact, true)]
    #[case::annotated_exact("python {\"skip\": true}", TagMatch::Exact, true)]
    #[case::glued_annotation("python{}", TagMatch::Exact, true)]
    #[case::longer_word_prefix("python3", TagMatch::Prefix, true)]
    #[case::longer_word_exact("python3", TagMatch::Exact, false)]
    #[case::other("rust", TagMatch::Prefix, false)]
    fn tag_matching(#[case] info: &str, #[case] mode: TagMatch, #[case] expected: bool) {
        assert_eq!(mode.matches(info, "python"), expected);
    }
}
