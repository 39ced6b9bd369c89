//! Rhai Scripting Engine for Frame Parsers
//!
//! This module lets users replace the fixed-separator field split with a
//! script. A parser script defines one function:
//!
//! ```rhai
//! fn parse(frame, separator) {
//!     frame.split(separator)
//! }
//! ```
//!
//! `frame` is the decoded payload text and `separator` the project separator.
//! The function returns an array; every element becomes one field (strings
//! verbatim, other values via their display form).
//!
//! ## Loading
//!
//! Scripts go through the [`ScriptLoader`] state machine:
//! `Unloaded -> Validating -> Ready | Error`. Validation compiles the script,
//! runs its top-level statements, checks that `parse(frame, separator)` exists
//! and calls `parse` once with `("", ",")`. A script that fails any step never
//! replaces a working parser.
//!
//! ## Example Scripts
//!
//! Key/value telemetry (`t=21.5;h=40`):
//! ```rhai
//! fn parse(frame, separator) {
//!     let fields = [];
//!     for pair in frame.split(separator) {
//!         let parts = pair.split("=");
//!         if parts.len() == 2 {
//!             fields.push(parts[1]);
//!         }
//!     }
//!     fields
//! }
//! ```
//!
//! Checksummed frames (`1,2,3*5A`), dropping frames whose checksum is wrong.
//! The load-time check passes an empty frame, which must not throw:
//! ```rhai
//! fn parse(frame, separator) {
//!     if frame == "" { return []; }
//!     let parts = frame.split("*");
//!     if parts.len() != 2 || xor_checksum(parts[0]) != hex_to_int(parts[1]) {
//!         throw "checksum mismatch";
//!     }
//!     parts[0].split(separator)
//! }
//! ```
//!
//! Top-level statements run once at load time. `parse` is called without
//! re-running them.

mod engine;
mod loader;

pub use engine::{ScriptEngine, PARSE_FUNCTION};
pub use loader::{LoaderState, ScriptLoader};

use crate::error::{Result, SerialVisError};
use rhai::{Engine, AST};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A compiled parser script
#[derive(Clone)]
pub struct CompiledParser {
    /// The compiled AST
    ast: Arc<AST>,
    /// The original source code
    source: String,
    /// Name/identifier for this script
    name: String,
}

impl CompiledParser {
    /// Get the source code of this script
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the name of this script
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ast(&self) -> &AST {
        &self.ast
    }
}

impl std::fmt::Debug for CompiledParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledParser")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

/// Cache for compiled scripts to avoid recompilation
#[derive(Default)]
pub struct ScriptCache {
    /// Map from script source to compiled script
    cache: HashMap<String, CompiledParser>,
}

impl ScriptCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Get a cached script or compile and cache it
    pub fn get_or_compile(
        &mut self,
        engine: &Engine,
        name: &str,
        source: &str,
    ) -> Result<CompiledParser> {
        if let Some(parser) = self.cache.get(source) {
            return Ok(parser.clone());
        }

        let ast = engine
            .compile(source)
            .map_err(|e| SerialVisError::Script(format!("Compilation error: {}", e)))?;

        let parser = CompiledParser {
            ast: Arc::new(ast),
            source: source.to_string(),
            name: name.to_string(),
        };

        self.cache.insert(source.to_string(), parser.clone());
        Ok(parser)
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Drop every entry except the one compiled from `source`
    pub fn retain_only(&mut self, source: Option<&str>) {
        self.cache.retain(|cached, _| Some(cached.as_str()) == source);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Thread-safe script cache wrapper
pub type SharedScriptCache = Arc<RwLock<ScriptCache>>;

/// Built-in parser templates
pub mod builtins {
    /// Split on the separator, same result as the fixed-separator parser
    pub const DEFAULT: &str = r#"
// Split the frame on every occurrence of the separator
fn parse(frame, separator) {
    frame.split(separator)
}
"#;

    /// Split on the separator and trim whitespace around each field
    pub const TRIMMED: &str = r#"
fn parse(frame, separator) {
    let fields = [];
    for field in frame.split(separator) {
        field.trim();
        fields.push(field);
    }
    fields
}
"#;

    /// `key=value` pairs, keeping the values in order
    pub const KEY_VALUE: &str = r#"
// "t=21.5,h=40" -> ["21.5", "40"]
fn parse(frame, separator) {
    let fields = [];
    for pair in frame.split(separator) {
        let parts = pair.split("=");
        if parts.len() == 2 {
            fields.push(parts[1]);
        }
    }
    fields
}
"#;

    /// Hex byte string, one decimal field per byte
    pub const HEX_BYTES: &str = r#"
// "0A1BFF" -> ["10", "27", "255"]
fn parse(frame, separator) {
    let fields = [];
    let i = 0;
    while i + 1 < frame.len() {
        fields.push(hex_to_int(frame.sub_string(i, 2)).to_string());
        i += 2;
    }
    fields
}
"#;

    /// List of all built-in templates with names
    pub fn all() -> Vec<(&'static str, &'static str)> {
        vec![
            ("Default (split)", DEFAULT),
            ("Trimmed split", TRIMMED),
            ("Key/value pairs", KEY_VALUE),
            ("Hex bytes", HEX_BYTES),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_cache() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();

        let script = "fn parse(frame, separator) { [] }";
        let first = cache.get_or_compile(&engine, "test", script).unwrap();
        let second = cache.get_or_compile(&engine, "other", script).unwrap();

        assert_eq!(first.source(), second.source());
        assert_eq!(second.name(), "test");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_rejects_syntax_errors() {
        let engine = Engine::new();
        let mut cache = ScriptCache::new();
        assert!(cache.get_or_compile(&engine, "bad", "fn parse(").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_builtin_templates() {
        let engine = ScriptEngine::new();
        for (name, source) in builtins::all() {
            let parser = engine.compile(name, source).unwrap();
            assert!(engine.has_parse_function(&parser), "'{}' lacks parse()", name);
            assert!(
                engine.call_parse(&parser, "", ",").is_ok(),
                "'{}' failed on an empty frame",
                name
            );
        }
    }

    #[test]
    fn test_builtin_outputs() {
        let engine = ScriptEngine::new();
        let run = |source: &str, frame: &str| {
            let parser = engine.compile("t", source).unwrap();
            engine.call_parse(&parser, frame, ",").unwrap()
        };

        assert_eq!(run(builtins::DEFAULT, "a,,b"), vec!["a", "", "b"]);
        assert_eq!(run(builtins::TRIMMED, " 1 , 2 "), vec!["1", "2"]);
        assert_eq!(run(builtins::KEY_VALUE, "t=21.5,h=40,bad"), vec!["21.5", "40"]);
        assert_eq!(run(builtins::HEX_BYTES, "0A1BFF"), vec!["10", "27", "255"]);
    }
}
