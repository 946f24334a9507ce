//! Runs fenced code blocks in documentation files as test items.
//!
//! [`MarkdownCollector`] accepts documentation files, [`MarkdownFile`] turns
//! each matching fence into a [`CodeSection`], and the [`host`] contracts
//! let any runner schedule them.

pub mod collector;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod item;
pub mod registry;
pub mod tokens;
pub mod traceback;

pub use collector::{MarkdownCollector, MarkdownFile};
pub use config::Config;
pub use descriptor::BlockOptions;
pub use error::{CollectionError, ConfigError, ResolutionError, RunFailure, SetupError};
pub use host::{CollectionNode, FileCollector, Item, Outcome, Phase, Report, RunFlags, ValueResolver};
pub use item::CodeSection;
pub use registry::ScopeRegistry;
pub use tokens::{CodeBlockToken, CodeBlocks, TagMatch};
