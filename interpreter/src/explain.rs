//! Failure explanations for instrumented assertions.

use docscript::ast::{AssertCheck, CompareOperator};

use crate::runtime_value::RuntimeValue;

/// Explanation lines for a failed assert whose operands were evaluated
/// separately (`left`, `right` are `None` for non-comparison tests).
pub fn explain(check: &AssertCheck, operands: Option<(&RuntimeValue, &RuntimeValue)>) -> Vec<String> {
    let mut lines = vec![format!("assert {}", check.text)];
    let (Some(comparison), Some((left, right))) = (&check.comparison, operands) else {
        return lines;
    };

    let evaluated = format!(
        "assert {} {} {}",
        left.repr(),
        comparison.operator.symbol(),
        right.repr()
    );
    if evaluated != lines[0] {
        lines.push(evaluated);
    }

    if comparison.operator == CompareOperator::Equality {
        if let (Some(left_lines), Some(right_lines)) = (diff_lines(left), diff_lines(right)) {
            lines.extend(
                diff(&right_lines, &left_lines)
                    .into_iter()
                    .map(|line| format!("  {}", line)),
            );
        }
    }
    lines
}

/// Lines a value is compared by, or `None` if it has no line view.
fn diff_lines(value: &RuntimeValue) -> Option<Vec<String>> {
    match value {
        RuntimeValue::Str(s) if s.is_empty() => Some(vec![String::new()]),
        RuntimeValue::Str(s) => Some(s.lines().map(str::to_string).collect()),
        RuntimeValue::List(items) => Some(items.borrow().iter().map(RuntimeValue::repr).collect()),
        RuntimeValue::Tuple(items) => Some(items.iter().map(RuntimeValue::repr).collect()),
        RuntimeValue::Dict(dict) => Some(
            dict.borrow()
                .iter()
                .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                .collect(),
        ),
        _ => None,
    }
}

/// Longest-common-subsequence line diff from `old` to `new`: lines only in
/// `old` are prefixed `- `, lines only in `new` `+ `, shared lines two spaces.
pub fn diff(old: &[String], new: &[String]) -> Vec<String> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            out.push(format!("  {}", old[i]));
            i += 1;
            j += 1;
        } else if i < n && (j == m || lcs[i + 1][j] >= lcs[i][j + 1]) {
            out.push(format!("- {}", old[i]));
            i += 1;
        } else {
            out.push(format!("+ {}", new[j]));
            j += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn replaced_line_shows_removal_first() {
        assert_eq!(diff(&lines(&["B"]), &lines(&["A"])), lines(&["- B", "+ A"]));
    }

    #[test]
    fn common_lines_are_kept() {
        assert_eq!(
            diff(&lines(&["a", "b", "c"]), &lines(&["a", "x", "c"])),
            lines(&["  a", "- b", "+ x", "  c"])
        );
    }

    #[test]
    fn insertion_and_deletion() {
        assert_eq!(
            diff(&lines(&["a", "b"]), &lines(&["b", "c"])),
            lines(&["- a", "  b", "+ c"])
        );
    }
}
