//! Contracts between documentation items and the runner that schedules them.
//!
//! A runner offers every candidate file to its [`FileCollector`]s. Accepted
//! files become [`CollectionNode`]s, which enumerate [`Item`]s. Each item is
//! then driven through [`execute`]: skip check, setup against a
//! [`ValueResolver`], run, and on failure a [`Report`].

use std::fmt;
use std::io::Write;
use std::path::Path;

use interpreter::{Frame, RuntimeValue};

use crate::error::{CollectionError, ResolutionError, RunFailure, SetupError};

/// Switches set on the runner's command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// Documentation files take part in collection.
    pub docfiles: bool,
}

pub trait FileCollector {
    /// A node for `path`, or `None` to leave the file to other collectors.
    fn try_collect(&self, path: &Path, flags: &RunFlags) -> Option<Box<dyn CollectionNode>>;
}

pub trait CollectionNode {
    fn path(&self) -> &Path;

    /// Items in the order they must run.
    fn collect(&self) -> Result<Vec<Box<dyn Item>>, CollectionError>;
}

/// Supplies named external values during setup.
pub trait ValueResolver {
    fn resolve(&mut self, name: &str) -> Result<RuntimeValue, ResolutionError>;
}

pub trait Item {
    fn name(&self) -> &str;

    /// File and 1-based line the item starts at.
    fn location(&self) -> (&Path, usize);

    /// `Some(reason)` when the item must not run.
    fn skip_reason(&self) -> Option<&str>;

    fn setup(&mut self, resolver: &mut dyn ValueResolver) -> Result<(), SetupError>;

    /// Execute, writing anything the item prints to `output`.
    fn run(&mut self, output: &mut dyn Write) -> Result<(), RunFailure>;

    fn report_failure(&self, failure: &RunFailure) -> Report;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Run,
}

/// A rendered failure: traceback frames followed by `E   ` lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub phase: Phase,
    pub headline: String,
    pub explanation: Vec<String>,
    pub frames: Vec<Frame>,
}

impl Report {
    pub fn setup(error: &SetupError) -> Report {
        Report {
            phase: Phase::Setup,
            headline: error.to_string(),
            explanation: Vec::new(),
            frames: Vec::new(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{frame}")?;
        }
        write!(f, "E   {}", self.headline)?;
        for line in &self.explanation {
            write!(f, "\nE   {line}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    Skipped(String),
    Failed(Report),
}

/// Drive one item through its lifecycle.
pub fn execute(
    item: &mut dyn Item,
    resolver: &mut dyn ValueResolver,
    output: &mut dyn Write,
) -> Outcome {
    if let Some(reason) = item.skip_reason() {
        return Outcome::Skipped(reason.to_string());
    }
    if let Err(error) = item.setup(resolver) {
        log::debug!("setup of {} failed: {error}", item.name());
        return Outcome::Failed(Report::setup(&error));
    }
    match item.run(output) {
        Ok(()) => Outcome::Passed,
        Err(failure) => Outcome::Failed(item.report_failure(&failure)),
    }
}
