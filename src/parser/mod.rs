//! Field parsing
//!
//! Splits a decoded frame into its ordered field list. Two strategies exist:
//! - [`SeparatorParser`] splits on every occurrence of the separator
//! - [`ScriptParser`] calls the `parse(frame, separator)` function of a loaded
//!   Rhai script
//!
//! The frame builder only sees the [`FieldParser`] trait; which strategy is
//! active follows from the project (see [`parser_for`]).

mod script;
mod separator;

pub use script::ScriptParser;
pub use separator::SeparatorParser;

use crate::config::ProjectFile;
use crate::error::Result;
use crate::scripting::ScriptLoader;

/// Strategy implemented by a [`FieldParser`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Separator,
    Script,
}

/// Turns decoded frame text into an ordered list of fields
#[cfg_attr(test, mockall::automock)]
pub trait FieldParser: Send + Sync {
    /// Split `frame` into fields
    fn parse(&self, frame: &str, separator: &str) -> Result<Vec<String>>;

    /// Which strategy this parser implements
    fn kind(&self) -> ParserKind;
}

/// Choose the parser for a project
///
/// Projects carrying parser code use the loader's active script parser. A
/// project whose script never loaded falls back to the separator split.
pub fn parser_for(project: &ProjectFile, loader: &ScriptLoader) -> Box<dyn FieldParser> {
    if project.frame_parser_code.is_some() {
        if let Some(parser) = loader.parser() {
            return Box::new(parser.clone());
        }
        tracing::warn!(
            "Project '{}' has parser code but no script is ready, using separator split",
            project.title
        );
    }
    Box::new(SeparatorParser)
}
