//! Mapping interpreter frames back onto the documentation file.

use std::path::Path;

use interpreter::Frame;

/// Whether two paths name the same file, compared as absolute paths.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (std::path::absolute(a), std::path::absolute(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Rewrite frames executed from a block of `document`.
///
/// Frames before the first one in `document` belong to the caller and are
/// dropped. Frames in `document` get `first_line - 1` added to their line
/// and are named `section <section>`. Frames from other files pass
/// through unchanged.
pub fn remap(frames: &[Frame], document: &Path, first_line: usize, section: &str) -> Vec<Frame> {
    let offset = first_line.saturating_sub(1);
    let start = frames
        .iter()
        .position(|frame| same_file(&frame.path, document))
        .unwrap_or(0);
    frames[start..]
        .iter()
        .map(|frame| {
            if same_file(&frame.path, document) {
                Frame {
                    path: frame.path.clone(),
                    line: frame.line + offset,
                    name: section_name(section),
                    source_line: frame.source_line.clone(),
                }
            } else {
                frame.clone()
            }
        })
        .collect()
}

pub fn section_name(section: &str) -> String {
    format!("section <{section}>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn frame(path: &str, line: usize, name: &str) -> Frame {
        Frame {
            path: PathBuf::from(path),
            line,
            name: name.into(),
            source_line: None,
        }
    }

    #[test]
    fn document_frames_are_shifted_and_renamed() {
        let frames = vec![frame("doc.md", 2, "<module>"), frame("module.py", 2, "fn")];
        let remapped = remap(&frames, Path::new("doc.md"), 3, "python-section-0");
        assert_eq!(
            remapped,
            vec![
                frame("doc.md", 4, "section <python-section-0>"),
                frame("module.py", 2, "fn"),
            ]
        );
    }

    #[test]
    fn leading_foreign_frames_are_dropped() {
        let frames = vec![
            frame("runner.rs", 10, "execute"),
            frame("doc.md", 1, "<module>"),
            frame("doc.md", 5, "helper"),
        ];
        let remapped = remap(&frames, Path::new("doc.md"), 10, "s");
        assert_eq!(
            remapped,
            vec![frame("doc.md", 10, "section <s>"), frame("doc.md", 14, "section <s>")]
        );
    }

    #[test]
    fn relative_and_absolute_paths_match() {
        let absolute = std::path::absolute("doc.md").unwrap();
        assert!(same_file(&absolute, Path::new("doc.md")));
        assert!(same_file(Path::new("./doc.md"), Path::new("doc.md")));
        assert!(!same_file(Path::new("other.md"), Path::new("doc.md")));
    }

    #[test]
    fn no_document_frames_keeps_everything() {
        let frames = vec![frame("module.py", 2, "fn")];
        assert_eq!(remap(&frames, Path::new("doc.md"), 3, "s"), frames);
    }
}
