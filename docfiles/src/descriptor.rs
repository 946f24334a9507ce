use serde::Deserialize;

/// Execution options attached to a fence as a JSON object after the tag,
/// e.g. `python {"name": "setup", "scope": "tour", "fixtures": ["env"]}`.
/// Unrecognised keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BlockOptions {
    pub name: Option<String>,
    pub scope: Option<String>,
    pub fixtures: Vec<String>,
    pub skip: bool,
}

impl BlockOptions {
    /// Parse an annotation with the language tag already stripped. An empty
    /// annotation yields the defaults.
    pub fn parse(annotation: &str) -> Result<Self, serde_json::Error> {
        let annotation = annotation.trim();
        if annotation.is_empty() {
            return Ok(BlockOptions::default());
        }
        serde_json::from_str(annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_annotation_is_default() {
        assert_eq!(BlockOptions::parse("  ").unwrap(), BlockOptions::default());
    }

    #[test]
    fn recognised_keys() {
        let options =
            BlockOptions::parse(r#"{"name": "n", "scope": "s", "fixtures": ["a", "b"], "skip": true}"#)
                .unwrap();
        assert_eq!(
            options,
            BlockOptions {
                name: Some("n".into()),
                scope: Some("s".into()),
                fixtures: vec!["a".into(), "b".into()],
                skip: true,
            }
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let options = BlockOptions::parse(r#"{"timeout": 3, "scope": "s"}"#).unwrap();
        assert_eq!(options.scope.as_deref(), Some("s"));
    }

    #[test]
    fn malformed_annotation() {
        assert!(BlockOptions::parse("{name: }").is_err());
        assert!(BlockOptions::parse(r#"{"skip": "yes"}"#).is_err());
        assert!(BlockOptions::parse("3").is_err());
    }
}
