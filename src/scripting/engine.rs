//! Rhai Script Engine Implementation
//!
//! This module provides the sandboxed engine that runs user frame parsers.
//!
//! ## Safety Limits
//!
//! Scripts run synchronously on the pipeline worker, so the engine caps
//! expression depth, call depth, operation count and the size of strings,
//! arrays and maps. A runaway script fails with an error instead of stalling
//! the session forever.
//!
//! ## Helper Functions
//!
//! - `hex_to_int(text)` - Parse a hexadecimal string (optional `0x` prefix)
//! - `xor_checksum(text)` - XOR of all bytes of a string
//! - `sum_checksum(text)` - Sum of all bytes of a string, modulo 256
//! - `to_fixed(value, decimals)` - Format a float with fixed decimals
//! - `clamp(x, min, max)`, `lerp(a, b, t)`, `map_range(x, in_min, in_max, out_min, out_max)`

use crate::error::{Result, ResultExt, SerialVisError};
use crate::scripting::{CompiledParser, ScriptCache, SharedScriptCache};
use rhai::{Array, CallFnOptions, Dynamic, Engine, EvalAltResult, Scope};
use std::sync::{Arc, RwLock};

/// Name of the function every parser script must define
pub const PARSE_FUNCTION: &str = "parse";

/// The script engine shared by the script loader and script parsers
pub struct ScriptEngine {
    /// The Rhai engine instance
    engine: Engine,
    /// Cache of compiled scripts
    cache: SharedScriptCache,
}

impl ScriptEngine {
    /// Create a new script engine with default configuration
    pub fn new() -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine);

        Self {
            engine,
            cache: Arc::new(RwLock::new(ScriptCache::new())),
        }
    }

    /// Configure the Rhai engine with helper functions and safety limits
    fn configure_engine(engine: &mut Engine) {
        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(100_000);
        engine.set_max_string_size(1 << 20);
        engine.set_max_array_size(4_096);
        engine.set_max_map_size(1_000);

        // ===== Frame Helpers =====

        engine.register_fn(
            "hex_to_int",
            |text: &str| -> std::result::Result<i64, Box<EvalAltResult>> {
                let trimmed = text.trim();
                let digits = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                i64::from_str_radix(digits, 16)
                    .map_err(|e| format!("hex_to_int('{}'): {}", text, e).into())
            },
        );

        engine.register_fn("xor_checksum", |text: &str| -> i64 {
            text.bytes().fold(0u8, |acc, b| acc ^ b) as i64
        });

        engine.register_fn("sum_checksum", |text: &str| -> i64 {
            text.bytes().fold(0u8, |acc, b| acc.wrapping_add(b)) as i64
        });

        engine.register_fn("to_fixed", |value: f64, decimals: i64| -> String {
            format!("{:.*}", decimals.clamp(0, 12) as usize, value)
        });

        engine.register_fn("to_fixed", |value: i64, decimals: i64| -> String {
            format!("{:.*}", decimals.clamp(0, 12) as usize, value as f64)
        });

        // ===== Mathematical Functions =====

        engine.register_fn("clamp", |x: f64, min: f64, max: f64| x.clamp(min, max));
        engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
        engine.register_fn(
            "map_range",
            |x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64| {
                (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
            },
        );
    }

    /// Compile a script and cache it
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledParser> {
        let mut cache = self.cache.write().map_err(|e| {
            SerialVisError::Script(format!("Failed to acquire cache lock: {}", e))
        })?;

        cache.get_or_compile(&self.engine, name, source)
    }

    /// Run the top-level statements of a compiled script
    pub fn run_top_level(&self, parser: &CompiledParser) -> Result<()> {
        self.engine
            .run_ast_with_scope(&mut Scope::new(), parser.ast())
            .with_context(|| format!("Top-level statements of '{}' failed", parser.name()))
    }

    /// Whether the script defines `parse(frame, separator)`
    pub fn has_parse_function(&self, parser: &CompiledParser) -> bool {
        parser
            .ast()
            .iter_functions()
            .any(|f| f.name == PARSE_FUNCTION && f.params.len() == 2)
    }

    /// Call the script's `parse(frame, separator)` and collect the fields
    pub fn call_parse(
        &self,
        parser: &CompiledParser,
        frame: &str,
        separator: &str,
    ) -> Result<Vec<String>> {
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(
                options,
                &mut Scope::new(),
                parser.ast(),
                PARSE_FUNCTION,
                (frame.to_string(), separator.to_string()),
            )
            .context("parse() failed")?;

        Self::into_fields(result)
    }

    /// Convert the value returned by `parse` into a field list
    fn into_fields(value: Dynamic) -> Result<Vec<String>> {
        let type_name = value.type_name();
        let array = value.try_cast::<Array>().ok_or_else(|| {
            SerialVisError::Script(format!(
                "parse() must return an array of strings, got {}",
                type_name
            ))
        })?;

        Ok(array.into_iter().map(|item| item.to_string()).collect())
    }

    /// Validate a script without executing it
    pub fn validate(&self, source: &str) -> Result<()> {
        self.engine
            .compile(source)
            .map(|_| ())
            .map_err(|e| SerialVisError::Script(format!("Validation error: {}", e)))
    }

    /// Clear the script cache
    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self.cache.write().map_err(|e| {
            SerialVisError::Script(format!("Failed to acquire cache lock: {}", e))
        })?;
        cache.clear();
        Ok(())
    }

    /// Keep only the compiled script for `source` in the cache
    pub fn retain_cached(&self, source: Option<&str>) -> Result<()> {
        let mut cache = self.cache.write().map_err(|e| {
            SerialVisError::Script(format!("Failed to acquire cache lock: {}", e))
        })?;
        cache.retain_only(source);
        Ok(())
    }

    /// Number of compiled scripts held by the cache
    pub fn cached_scripts(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("cache_size", &self.cached_scripts())
            .finish()
    }
}
