//! Configuration module for SerialVis-RS
//!
//! This module handles the two configuration layers of a capture session:
//! - Project files (JSON) describing the frame format and the group/dataset
//!   schema that parsed fields are bound to
//! - Session settings (TOML) controlling the operation mode, the pipeline
//!   queue and the plugin server, see [`settings`]
//!
//! # App Data Location
//!
//! Session settings are stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.serialvis.serialvis-rs/`
//! - **macOS**: `~/Library/Application Support/dev.serialvis.serialvis-rs/`
//! - **Windows**: `%APPDATA%\dev.serialvis.serialvis-rs\`
//!
//! # Project Leniency
//!
//! A project file is loaded once per session and treated as immutable.
//! Missing keys fall back to defaults. Groups and datasets that violate the
//! schema invariants (empty title, no datasets, index below 1, duplicated
//! index) are dropped with a warning rather than failing the whole load.
//!
//! # Example
//!
//! ```ignore
//! use serialvis_rs::config::{ProjectFile, SessionSettings};
//!
//! let settings = SessionSettings::load_or_default();
//! let project = ProjectFile::load("telemetry.json")?;
//! println!("{} groups, separator {:?}", project.groups.len(), project.separator);
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, SerialVisError};
use crate::types::Group;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.serialvis.serialvis-rs";

/// Session settings filename
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default field separator
pub const DEFAULT_SEPARATOR: &str = ",";

/// Default start-of-frame delimiter
pub const DEFAULT_FRAME_START: &str = "/*";

/// Default end-of-frame delimiter
pub const DEFAULT_FRAME_END: &str = "*/";

/// Default cap on the detector's pending buffer (1 MiB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        SerialVisError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            SerialVisError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the session settings file
pub fn settings_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(SETTINGS_FILE))
}

// ==================== Session Enums ====================

/// Read an enum stored either by name or by its integer position
fn variant_index(value: &Value, names: &[&str], kind: &str) -> std::result::Result<usize, String> {
    match value {
        Value::String(s) => names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown {} '{}'", kind, s)),
        Value::Number(n) => n
            .as_u64()
            .map(|i| i as usize)
            .filter(|i| *i < names.len())
            .ok_or_else(|| format!("{} index {} out of range", kind, n)),
        other => Err(format!("invalid {} value: {}", kind, other)),
    }
}

/// Strategy used to find frame boundaries in the byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "String")]
pub enum FrameDetection {
    /// Frames end with the end delimiter
    #[default]
    EndDelimiterOnly,
    /// Frames are enclosed by the start and end delimiters
    StartAndEndDelimiter,
    /// Every chunk of received bytes is one frame
    NoDelimiters,
}

impl FrameDetection {
    const NAMES: [&'static str; 3] = ["endOnly", "startAndEnd", "none"];
    const ALL: [FrameDetection; 3] = [
        FrameDetection::EndDelimiterOnly,
        FrameDetection::StartAndEndDelimiter,
        FrameDetection::NoDelimiters,
    ];

    /// Identifier used in project files
    pub fn id(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }
}

impl TryFrom<Value> for FrameDetection {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        variant_index(&value, &Self::NAMES, "frame detection").map(|i| Self::ALL[i])
    }
}

impl From<FrameDetection> for String {
    fn from(value: FrameDetection) -> Self {
        value.id().to_string()
    }
}

impl fmt::Display for FrameDetection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDetection::EndDelimiterOnly => write!(f, "End Delimiter Only"),
            FrameDetection::StartAndEndDelimiter => write!(f, "Start + End Delimiter"),
            FrameDetection::NoDelimiters => write!(f, "No Delimiters"),
        }
    }
}

/// Encoding of frame payloads on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "String")]
pub enum DecoderMethod {
    #[default]
    PlainText,
    Hexadecimal,
    Base64,
}

impl DecoderMethod {
    const NAMES: [&'static str; 3] = ["plainText", "hex", "base64"];
    const ALL: [DecoderMethod; 3] = [
        DecoderMethod::PlainText,
        DecoderMethod::Hexadecimal,
        DecoderMethod::Base64,
    ];

    /// Identifier used in project files
    pub fn id(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }
}

impl TryFrom<Value> for DecoderMethod {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        variant_index(&value, &Self::NAMES, "decoder").map(|i| Self::ALL[i])
    }
}

impl From<DecoderMethod> for String {
    fn from(value: DecoderMethod) -> Self {
        value.id().to_string()
    }
}

impl fmt::Display for DecoderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderMethod::PlainText => write!(f, "Plain Text"),
            DecoderMethod::Hexadecimal => write!(f, "Hexadecimal"),
            DecoderMethod::Base64 => write!(f, "Base64"),
        }
    }
}

/// How payloads are turned into frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "String")]
pub enum OperationMode {
    /// Fields are bound to the groups of a project file
    ProjectFile,
    /// Every payload is a self-describing JSON frame
    DeviceSendsJson,
    /// Comma-separated values, one plot channel per field
    #[default]
    QuickPlot,
}

impl OperationMode {
    const NAMES: [&'static str; 3] = ["projectFile", "deviceSendsJson", "quickPlot"];
    const ALL: [OperationMode; 3] = [
        OperationMode::ProjectFile,
        OperationMode::DeviceSendsJson,
        OperationMode::QuickPlot,
    ];

    pub fn id(&self) -> &'static str {
        Self::NAMES[*self as usize]
    }
}

impl TryFrom<Value> for OperationMode {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        variant_index(&value, &Self::NAMES, "operation mode").map(|i| Self::ALL[i])
    }
}

impl From<OperationMode> for String {
    fn from(value: OperationMode) -> Self {
        value.id().to_string()
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::ProjectFile => write!(f, "Project File"),
            OperationMode::DeviceSendsJson => write!(f, "Device Sends JSON"),
            OperationMode::QuickPlot => write!(f, "Quick Plot"),
        }
    }
}

// ==================== Escape Sequences ====================

/// Resolve C-style escape sequences in a delimiter string
///
/// Supports `\n`, `\r`, `\t`, `\0`, `\\` and `\xNN`. Unknown escapes are kept
/// verbatim.
pub fn resolve_escape_sequences(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes[i + 1] {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'0' => out.push(0),
            b'\\' => out.push(b'\\'),
            b'x' => {
                let parsed = text
                    .get(i + 2..i + 4)
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match parsed {
                    Some(byte) => {
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                    None => out.extend_from_slice(b"\\x"),
                }
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
        i += 2;
    }

    out
}

// ==================== Project File ====================

/// Project definition: frame format plus group/dataset schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub title: String,
    pub separator: String,
    pub frame_start: String,
    pub frame_end: String,
    pub frame_detection: FrameDetection,
    pub decoder: DecoderMethod,
    /// Optional user script providing `parse(frame, separator)`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_parser_code: Option<String>,
    pub groups: Vec<Group>,
}

impl Default for ProjectFile {
    fn default() -> Self {
        Self {
            title: String::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
            frame_start: DEFAULT_FRAME_START.to_string(),
            frame_end: DEFAULT_FRAME_END.to_string(),
            frame_detection: FrameDetection::default(),
            decoder: DecoderMethod::default(),
            frame_parser_code: None,
            groups: Vec::new(),
        }
    }
}

impl ProjectFile {
    /// Create an empty project with default frame settings
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Load a project file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SerialVisError::Config(format!("Failed to read project file {:?}: {}", path, e))
        })?;

        let project = Self::from_json_str(&content).map_err(|e| {
            SerialVisError::Config(format!("Failed to parse project file {:?}: {}", path, e))
        })?;

        tracing::info!(
            "Loaded project '{}' from {:?} ({} groups, {} datasets)",
            project.title,
            path,
            project.groups.len(),
            project.dataset_count()
        );
        Ok(project)
    }

    /// Parse a project from its JSON text
    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| SerialVisError::Config(format!("Invalid project JSON: {}", e)))?;
        Self::from_json(&value)
    }

    /// Build a project from a JSON document
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            SerialVisError::Config("Project root must be a JSON object".to_string())
        })?;

        let defaults = Self::default();
        let mut project = Self {
            title: string_key(object, "title").unwrap_or(defaults.title),
            separator: string_key(object, "separator").unwrap_or(defaults.separator),
            frame_start: string_key(object, "frameStart").unwrap_or(defaults.frame_start),
            frame_end: string_key(object, "frameEnd").unwrap_or(defaults.frame_end),
            frame_detection: enum_key(object, "frameDetection"),
            decoder: enum_key(object, "decoder"),
            frame_parser_code: string_key(object, "frameParserCode")
                .filter(|code| !code.trim().is_empty()),
            groups: Vec::new(),
        };

        if let Some(groups) = object.get("groups").and_then(Value::as_array) {
            for entry in groups {
                match Group::from_json(entry, project.groups.len()) {
                    Some(group) => project.groups.push(group),
                    None => tracing::warn!("Dropping invalid group in project '{}'", project.title),
                }
            }
        }

        project.validate_indices();
        Ok(project)
    }

    /// Drop datasets whose index is below 1 or already used, then any
    /// group left empty
    fn validate_indices(&mut self) {
        let mut seen = HashSet::new();
        for group in &mut self.groups {
            let title = group.title.clone();
            group.datasets.retain(|dataset| {
                if dataset.index < 1 {
                    tracing::warn!(
                        "Dropping dataset '{}' in group '{}': index {} is below 1",
                        dataset.title,
                        title,
                        dataset.index
                    );
                    return false;
                }
                if !seen.insert(dataset.index) {
                    tracing::warn!(
                        "Dropping dataset '{}' in group '{}': index {} already used",
                        dataset.title,
                        title,
                        dataset.index
                    );
                    return false;
                }
                true
            });
        }

        self.groups.retain(|group| {
            if group.datasets.is_empty() {
                tracing::warn!("Dropping group '{}': no valid datasets left", group.title);
            }
            !group.datasets.is_empty()
        });

        for (group_id, group) in self.groups.iter_mut().enumerate() {
            group.group_id = group_id;
            for (dataset_id, dataset) in group.datasets.iter_mut().enumerate() {
                dataset.group_id = group_id;
                dataset.dataset_id = dataset_id;
            }
        }
    }

    /// Serialize the project to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SerialVisError::Config(format!("Failed to serialize project: {}", e)))
    }

    /// Save project file to disk as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SerialVisError::Config(format!("Failed to create project directory: {}", e))
            })?;
        }

        let content = self.to_json_string()?;
        std::fs::write(path, content).map_err(|e| {
            SerialVisError::Config(format!("Failed to write project file {:?}: {}", path, e))
        })
    }

    /// Start delimiter with escape sequences resolved
    pub fn start_delimiter(&self) -> Vec<u8> {
        resolve_escape_sequences(&self.frame_start)
    }

    /// End delimiter with escape sequences resolved
    pub fn end_delimiter(&self) -> Vec<u8> {
        resolve_escape_sequences(&self.frame_end)
    }

    pub fn dataset_count(&self) -> usize {
        self.groups.iter().map(|g| g.datasets.len()).sum()
    }

    /// Highest field index referenced by any dataset
    pub fn max_index(&self) -> i64 {
        self.groups
            .iter()
            .flat_map(|g| g.datasets.iter())
            .map(|d| d.index)
            .max()
            .unwrap_or(0)
    }
}

fn string_key(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn enum_key<T>(object: &Map<String, Value>, key: &str) -> T
where
    T: TryFrom<Value, Error = String> + Default,
{
    match object.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::try_from(value.clone()).unwrap_or_else(|e| {
            tracing::warn!("Invalid project key '{}': {}, using default", key, e);
            T::default()
        }),
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_defaults() {
        let project = ProjectFile::from_json_str("{}").unwrap();
        assert_eq!(project.separator, ",");
        assert_eq!(project.frame_start, "/*");
        assert_eq!(project.frame_end, "*/");
        assert_eq!(project.frame_detection, FrameDetection::EndDelimiterOnly);
        assert_eq!(project.decoder, DecoderMethod::PlainText);
        assert!(project.frame_parser_code.is_none());
        assert!(project.groups.is_empty());
    }

    #[test]
    fn test_enum_keys_by_name_and_index() {
        let project = ProjectFile::from_json(&json!({
            "frameDetection": "startAndEnd",
            "decoder": 2,
        }))
        .unwrap();
        assert_eq!(
            project.frame_detection,
            FrameDetection::StartAndEndDelimiter
        );
        assert_eq!(project.decoder, DecoderMethod::Base64);

        let project = ProjectFile::from_json(&json!({
            "frameDetection": 7,
            "decoder": "rot13",
        }))
        .unwrap();
        assert_eq!(project.frame_detection, FrameDetection::EndDelimiterOnly);
        assert_eq!(project.decoder, DecoderMethod::PlainText);
    }

    #[test]
    fn test_invalid_root_is_error() {
        assert!(ProjectFile::from_json_str("[1, 2]").is_err());
        assert!(ProjectFile::from_json_str("{ not json").is_err());
    }

    #[test]
    fn test_index_validation_drops_bad_datasets() {
        let project = ProjectFile::from_json(&json!({
            "groups": [
                {"title": "A", "datasets": [
                    {"title": "a1", "index": 1},
                    {"title": "a0", "index": 0},
                    {"title": "a2", "index": 2}
                ]},
                {"title": "B", "datasets": [{"title": "dup", "index": 1}]},
                {"title": "", "datasets": [{"title": "x", "index": 3}]},
                {"title": "C", "datasets": [{"title": "c3", "index": 3}]}
            ]
        }))
        .unwrap();

        assert_eq!(project.groups.len(), 2);
        assert_eq!(project.groups[0].title, "A");
        assert_eq!(project.groups[0].datasets.len(), 2);
        assert_eq!(project.groups[1].title, "C");
        assert_eq!(project.groups[1].group_id, 1);
        assert_eq!(project.groups[1].datasets[0].group_id, 1);
        assert_eq!(project.max_index(), 3);
    }

    #[test]
    fn test_array_datasets_are_not_bound() {
        let project = ProjectFile::from_json_str(
            r#"{"groups": [
                {"title": "Bogus", "datasets": [[1, "bogus"]]},
                {"title": "Real", "datasets": [{"title": "r", "index": 1}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(project.groups.len(), 1);
        assert_eq!(project.groups[0].title, "Real");
        assert_eq!(project.groups[0].datasets[0].title, "r");
    }

    #[test]
    fn test_blank_parser_code_is_none() {
        let project = ProjectFile::from_json(&json!({"frameParserCode": "   \n"})).unwrap();
        assert!(project.frame_parser_code.is_none());
    }

    #[test]
    fn test_project_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("project.json");

        let mut project = ProjectFile::new("Weather Station");
        project.frame_detection = FrameDetection::StartAndEndDelimiter;
        project.decoder = DecoderMethod::Hexadecimal;
        project.frame_parser_code = Some("fn parse(frame, separator) { [] }".to_string());
        project.groups.push(
            Group::from_json(
                &json!({"title": "Env", "widget": "datagrid",
                        "datasets": [{"title": "Temp", "index": 1, "units": "C"}]}),
                0,
            )
            .unwrap(),
        );
        project.save(&path).unwrap();

        let loaded = ProjectFile::load(&path).unwrap();
        assert_eq!(loaded, project);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["frameDetection"], "startAndEnd");
        assert_eq!(raw["decoder"], "hex");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ProjectFile::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SerialVisError::Config(_)));
    }

    #[test]
    fn test_resolve_escape_sequences() {
        assert_eq!(resolve_escape_sequences("\\n"), b"\n".to_vec());
        assert_eq!(resolve_escape_sequences("*/\\r\\n"), b"*/\r\n".to_vec());
        assert_eq!(resolve_escape_sequences("\\x02"), vec![0x02]);
        assert_eq!(resolve_escape_sequences("\\xZZ"), b"\\xZZ".to_vec());
        assert_eq!(resolve_escape_sequences("a\\qb"), b"a\\qb".to_vec());
        assert_eq!(resolve_escape_sequences("end\\"), b"end\\".to_vec());
        assert_eq!(resolve_escape_sequences("\\\\"), b"\\".to_vec());
    }

    #[test]
    fn test_enum_display_and_ids() {
        assert_eq!(FrameDetection::NoDelimiters.id(), "none");
        assert_eq!(DecoderMethod::Hexadecimal.to_string(), "Hexadecimal");
        assert_eq!(OperationMode::DeviceSendsJson.id(), "deviceSendsJson");
        assert_eq!(
            OperationMode::try_from(json!("QUICKPLOT")).unwrap(),
            OperationMode::QuickPlot
        );
    }
}
