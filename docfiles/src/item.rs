//! The executable unit built from one fenced block.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use docscript::rewrite::{AssertionRewriter, Instrument, PlainAsserts};
use interpreter::{Code, Frame, Interpreter, Namespace, RuntimeValue};

use crate::error::{RunFailure, SetupError};
use crate::host::{Item, Phase, Report, ValueResolver};
use crate::traceback;

/// Settings shared by every section collected from one file.
#[derive(Debug, Clone)]
pub struct SectionSettings {
    /// Fixtures requested by every block in addition to its own.
    pub autouse: Vec<String>,
    pub rewrite_asserts: bool,
    /// Import search path: the file's directory, then configured directories.
    pub search_paths: Vec<PathBuf>,
}

/// A code block scheduled as a test item.
#[derive(Debug)]
pub struct CodeSection {
    name: String,
    path: PathBuf,
    source: String,
    /// 1-based line of the block's first content line.
    lineno: usize,
    namespace: Namespace,
    fixtures: Vec<String>,
    skip: bool,
    settings: Rc<SectionSettings>,
    resolved: Vec<(String, RuntimeValue)>,
}

impl CodeSection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        path: PathBuf,
        source: String,
        lineno: usize,
        namespace: Namespace,
        fixtures: Vec<String>,
        skip: bool,
        settings: Rc<SectionSettings>,
    ) -> Self {
        CodeSection {
            name,
            path,
            source,
            lineno,
            namespace,
            fixtures,
            skip,
            settings,
            resolved: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn lineno(&self) -> usize {
        self.lineno
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Autouse fixtures followed by the block's own, without repeats.
    pub fn requested_fixtures(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.settings.autouse.iter().chain(&self.fixtures) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    fn instrument(&self) -> &'static dyn Instrument {
        if self.settings.rewrite_asserts {
            &AssertionRewriter
        } else {
            &PlainAsserts
        }
    }

    fn block_line(&self, line: usize) -> Option<String> {
        let text = self.source.lines().nth(line.checked_sub(1)?)?.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

impl Item for CodeSection {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> (&Path, usize) {
        (&self.path, self.lineno)
    }

    fn skip_reason(&self) -> Option<&str> {
        self.skip.then_some("skipped by block annotation")
    }

    fn setup(&mut self, resolver: &mut dyn ValueResolver) -> Result<(), SetupError> {
        let mut resolved = Vec::new();
        for name in self.requested_fixtures() {
            let value = resolver.resolve(name)?;
            resolved.push((name.to_string(), value));
        }
        self.resolved = resolved;
        Ok(())
    }

    fn run(&mut self, output: &mut dyn Write) -> Result<(), RunFailure> {
        if self.skip {
            return Ok(());
        }
        let code = Code::compile(&self.source, &self.path, self.instrument())
            .map_err(RunFailure::Syntax)?;

        for (name, value) in self.resolved.drain(..) {
            log::trace!("injecting '{name}' into {}", self.name);
            self.namespace.set(&name, value);
        }

        log::debug!("running {} ({}:{})", self.name, self.path.display(), self.lineno);
        Interpreter::new(output)
            .with_search_paths(self.settings.search_paths.clone())
            .exec(Rc::new(code), &self.namespace)
            .map_err(RunFailure::Raised)
    }

    fn report_failure(&self, failure: &RunFailure) -> Report {
        match failure {
            RunFailure::Syntax(error) => Report {
                phase: Phase::Run,
                headline: format!("SyntaxError: {}", error.message),
                explanation: error.notes.clone(),
                frames: vec![Frame {
                    path: self.path.clone(),
                    line: self.lineno + error.line.saturating_sub(1),
                    name: traceback::section_name(&self.name),
                    source_line: self.block_line(error.line),
                }],
            },
            RunFailure::Raised(error) => Report {
                phase: Phase::Run,
                headline: error.headline(),
                explanation: error.error.explanation().to_vec(),
                frames: traceback::remap(&error.traceback, &self.path, self.lineno, &self.name),
            },
        }
    }
}
