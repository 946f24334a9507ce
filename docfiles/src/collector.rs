use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::Config;
use crate::descriptor::BlockOptions;
use crate::error::CollectionError;
use crate::host::{CollectionNode, FileCollector, Item, RunFlags};
use crate::item::{CodeSection, SectionSettings};
use crate::registry::ScopeRegistry;
use crate::tokens::CodeBlocks;

/// Accepts documentation files when `--docfiles` is on.
#[derive(Debug, Clone)]
pub struct MarkdownCollector {
    config: Rc<Config>,
}

impl MarkdownCollector {
    pub fn new(config: Rc<Config>) -> Self {
        MarkdownCollector { config }
    }
}

impl FileCollector for MarkdownCollector {
    fn try_collect(&self, path: &Path, flags: &RunFlags) -> Option<Box<dyn CollectionNode>> {
        if !flags.docfiles {
            log::trace!("docfiles disabled, declining {}", path.display());
            return None;
        }
        if !self.config.is_documentation(path) {
            return None;
        }
        Some(Box::new(MarkdownFile {
            path: path.to_path_buf(),
            config: Rc::clone(&self.config),
        }))
    }
}

/// One documentation file. Collecting it yields a [`CodeSection`] per block.
#[derive(Debug)]
pub struct MarkdownFile {
    path: PathBuf,
    config: Rc<Config>,
}

impl MarkdownFile {
    pub fn new(path: impl Into<PathBuf>, config: Rc<Config>) -> Self {
        MarkdownFile {
            path: path.into(),
            config,
        }
    }

    /// Collect from already-read text.
    pub fn collect_source(&self, text: &str) -> Result<Vec<CodeSection>, CollectionError> {
        let language = self.config.language.as_str();
        let settings = Rc::new(self.settings());
        let mut registry = ScopeRegistry::new();
        let mut sections = Vec::new();

        for (ordinal, token) in CodeBlocks::new(text, language, self.config.tag_match).enumerate() {
            let options = BlockOptions::parse(token.annotation(language)).map_err(|err| {
                CollectionError::Annotation {
                    path: self.path.clone(),
                    line: token.line - 1,
                    span: token.fence.clone(),
                    message: err.to_string(),
                }
            })?;
            let name = options
                .name
                .unwrap_or_else(|| format!("{language}-section-{ordinal}"));
            let namespace = registry.get_or_create(options.scope.as_deref());
            sections.push(CodeSection::new(
                name,
                self.path.clone(),
                token.text,
                token.line,
                namespace,
                options.fixtures,
                options.skip,
                Rc::clone(&settings),
            ));
        }

        log::debug!(
            "collected {} section(s) in {} scope(s) from {}",
            sections.len(),
            registry.len(),
            self.path.display()
        );
        Ok(sections)
    }

    fn settings(&self) -> SectionSettings {
        let document_dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut search_paths = vec![document_dir];
        search_paths.extend(self.config.pythonpath.iter().cloned());
        SectionSettings {
            autouse: self.config.autouse.clone(),
            rewrite_asserts: self.config.rewrite_asserts,
            search_paths,
        }
    }
}

impl CollectionNode for MarkdownFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn collect(&self) -> Result<Vec<Box<dyn Item>>, CollectionError> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| {
            log::warn!("cannot read {}: {source}", self.path.display());
            CollectionError::Read {
                path: self.path.clone(),
                source,
            }
        })?;
        Ok(self
            .collect_source(&text)?
            .into_iter()
            .map(|section| Box::new(section) as Box<dyn Item>)
            .collect())
    }
}
