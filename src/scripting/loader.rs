//! Script loader state machine
//!
//! ```text
//! Unloaded --load--> Validating --ok--> Ready
//!                         |
//!                         +----err----> Error(reason)
//! ```
//!
//! The active parser only changes on a successful load. A failed load moves
//! the loader to `Error` while the previously working parser stays in use.

use crate::error::{Result, ResultExt, SerialVisError};
use crate::parser::ScriptParser;
use crate::scripting::{builtins, ScriptEngine};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Lifecycle state of the parser script
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoaderState {
    /// No script has been loaded
    #[default]
    Unloaded,
    /// A script is being compiled and checked
    Validating,
    /// The last load succeeded
    Ready,
    /// The last load failed
    Error(String),
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderState::Unloaded => write!(f, "Unloaded"),
            LoaderState::Validating => write!(f, "Validating"),
            LoaderState::Ready => write!(f, "Ready"),
            LoaderState::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

/// Validates parser scripts and holds the active one
#[derive(Debug)]
pub struct ScriptLoader {
    engine: Arc<ScriptEngine>,
    state: LoaderState,
    active: Option<ScriptParser>,
}

impl ScriptLoader {
    pub fn new(engine: Arc<ScriptEngine>) -> Self {
        Self {
            engine,
            state: LoaderState::Unloaded,
            active: None,
        }
    }

    pub fn state(&self) -> &LoaderState {
        &self.state
    }

    /// Parser installed by the last successful load
    pub fn parser(&self) -> Option<&ScriptParser> {
        self.active.as_ref()
    }

    /// Source of the active script
    pub fn source(&self) -> Option<&str> {
        self.active.as_ref().map(ScriptParser::source)
    }

    /// Load a script, installing it only if it validates
    pub fn load(&mut self, source: &str) -> Result<()> {
        self.state = LoaderState::Validating;

        let result = match self.validate(source) {
            Ok(parser) => {
                tracing::info!("Frame parser script loaded");
                self.active = Some(parser);
                self.state = LoaderState::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Frame parser script rejected ({}), keeping previous parser: {}",
                    if self.active.is_some() { "active" } else { "none" },
                    e
                );
                self.state = LoaderState::Error(e.to_string());
                Err(e)
            }
        };

        // Edited sources are never reused once replaced
        if let Err(e) = self.engine.retain_cached(self.source()) {
            tracing::warn!("Failed to trim script cache: {}", e);
        }
        result
    }

    /// Apply edited source, reporting whether it was installed
    pub fn apply(&mut self, source: &str) -> Result<()> {
        self.load(source)
    }

    /// Apply edited source and write it to `path` once it validates
    pub fn save(&mut self, source: &str, path: impl AsRef<Path>) -> Result<()> {
        self.load(source)?;
        let path = path.as_ref();
        std::fs::write(path, source).map_err(|e| {
            SerialVisError::Config(format!("Failed to write script {:?}: {}", path, e))
        })
    }

    /// Load a script from a file
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            SerialVisError::Config(format!("Failed to read script {:?}: {}", path, e))
        })?;
        self.load(&source)
    }

    /// Install the built-in default template
    pub fn reload_default(&mut self) -> Result<()> {
        self.load(builtins::DEFAULT)
    }

    fn validate(&self, source: &str) -> Result<ScriptParser> {
        let script = self.engine.compile("frame parser", source)?;
        self.engine.run_top_level(&script)?;

        if !self.engine.has_parse_function(&script) {
            return Err(SerialVisError::Script(
                "Script must define parse(frame, separator)".to_string(),
            ));
        }

        self.engine
            .call_parse(&script, "", ",")
            .context("Script must accept an empty frame")?;
        Ok(ScriptParser::new(self.engine.clone(), script))
    }
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new(Arc::new(ScriptEngine::new()))
    }
}
