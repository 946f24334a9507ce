use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use docfiles::config::to_runtime;
use docfiles::{ResolutionError, ValueResolver};
use interpreter::RuntimeValue;
use tempfile::TempDir;

/// Resolves fixtures for one item.
///
/// Built-ins are `tmp_path`, `env` and `docfile`; anything else must be a
/// static fixture from the config. Temporary directories live as long as
/// the resolver, so create one per item.
pub struct FixtureResolver<'a> {
    docfile: PathBuf,
    statics: &'a BTreeMap<String, toml::Value>,
    tmp_dirs: Vec<TempDir>,
}

impl<'a> FixtureResolver<'a> {
    pub fn new(docfile: &Path, statics: &'a BTreeMap<String, toml::Value>) -> Self {
        FixtureResolver {
            docfile: docfile.to_path_buf(),
            statics,
            tmp_dirs: Vec::new(),
        }
    }

    fn tmp_path(&mut self) -> Result<RuntimeValue, ResolutionError> {
        let dir = tempfile::Builder::new()
            .prefix("docfiles-")
            .tempdir()
            .map_err(|err| ResolutionError::Failed {
                name: "tmp_path".to_string(),
                message: err.to_string(),
            })?;
        let path = dir.path().to_path_buf();
        self.tmp_dirs.push(dir);
        Ok(RuntimeValue::Path(path))
    }
}

impl ValueResolver for FixtureResolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<RuntimeValue, ResolutionError> {
        let value = match name {
            "tmp_path" => self.tmp_path()?,
            "env" => interpreter::modules::environ(),
            "docfile" => RuntimeValue::Path(self.docfile.clone()),
            _ => match self.statics.get(name) {
                Some(value) => to_runtime(value),
                None => return Err(ResolutionError::Unknown(name.to_string())),
            },
        };
        log::trace!("resolved fixture '{name}'");
        Ok(value)
    }
}
