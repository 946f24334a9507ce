use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use interpreter::RuntimeValue;
use interpreter::runtime_value::Dict;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::tokens::TagMatch;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "docfiles.toml";

/// Settings read from `docfiles.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Collect documentation files without `--docfiles`.
    pub docfiles: bool,
    /// File extensions treated as documentation, without the dot.
    pub extensions: Vec<String>,
    /// Fence tag of executable blocks.
    pub language: String,
    pub tag_match: TagMatch,
    /// Fixtures injected into every block that is not skipped.
    pub autouse: Vec<String>,
    pub rewrite_asserts: bool,
    /// Extra directories searched by `import`, after the file's own directory.
    pub pythonpath: Vec<PathBuf>,
    /// Static fixtures.
    pub fixtures: BTreeMap<String, toml::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            docfiles: false,
            extensions: vec!["md".to_string()],
            language: "python".to_string(),
            tag_match: TagMatch::Prefix,
            autouse: vec!["tmp_path".to_string()],
            rewrite_asserts: true,
            pythonpath: Vec::new(),
            fixtures: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str, path: &Path) -> Result<Config, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a config file. Relative `pythonpath` entries are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Config::from_toml(&text, path)?;
        if let Some(base) = path.parent() {
            for dir in &mut config.pythonpath {
                if dir.is_relative() {
                    *dir = base.join(&*dir);
                }
            }
        }
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `docfiles.toml` from `dir` if it exists, else the defaults.
    pub fn discover(dir: &Path) -> Result<Config, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Config::load(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Whether `path` has one of the documentation extensions.
    pub fn is_documentation(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|candidate| candidate.trim_start_matches('.') == ext)
            })
    }
}

/// Convert a TOML value into the runtime value a block sees.
pub fn to_runtime(value: &toml::Value) -> RuntimeValue {
    match value {
        toml::Value::Integer(n) => RuntimeValue::Int(*n),
        toml::Value::Float(f) => RuntimeValue::Float(*f),
        toml::Value::Boolean(b) => RuntimeValue::Bool(*b),
        toml::Value::String(s) => RuntimeValue::str(s.clone()),
        toml::Value::Datetime(d) => RuntimeValue::str(d.to_string()),
        toml::Value::Array(items) => RuntimeValue::list(items.iter().map(to_runtime).collect()),
        toml::Value::Table(table) => {
            let mut dict = Dict::new();
            for (key, value) in table {
                // String keys always hash.
                let _ = dict.insert(RuntimeValue::str(key.clone()), to_runtime(value));
            }
            RuntimeValue::dict(dict)
        }
    }
}
