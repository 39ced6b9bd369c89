use super::{FieldParser, ParserKind};
use crate::error::Result;
use crate::scripting::{CompiledParser, ScriptEngine};
use std::sync::Arc;

/// Fields produced by a loaded script's `parse(frame, separator)`
#[derive(Debug, Clone)]
pub struct ScriptParser {
    engine: Arc<ScriptEngine>,
    script: CompiledParser,
}

impl ScriptParser {
    pub(crate) fn new(engine: Arc<ScriptEngine>, script: CompiledParser) -> Self {
        Self { engine, script }
    }

    /// Source of the script backing this parser
    pub fn source(&self) -> &str {
        self.script.source()
    }
}

impl FieldParser for ScriptParser {
    fn parse(&self, frame: &str, separator: &str) -> Result<Vec<String>> {
        self.engine.call_parse(&self.script, frame, separator)
    }

    fn kind(&self) -> ParserKind {
        ParserKind::Script
    }
}
