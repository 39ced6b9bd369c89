//! Core data types for SerialVis-RS
//!
//! This module contains the data model that parsed frames are bound to.
//!
//! # Main Types
//!
//! - [`Dataset`] - One scalar measurement with its display metadata
//! - [`Group`] - A named collection of datasets sharing a widget
//! - [`Frame`] - The root of a built frame: ordered groups plus raw fields
//! - [`PipelineStats`] - Counters reported by the session pipeline
//!
//! # Value Semantics
//!
//! Frames are built wholesale for every payload. A [`Frame`] handed to a
//! consumer owns all of its data; cloning it never aliases state held by the
//! frame builder.
//!
//! # JSON Leniency
//!
//! Project files in the wild store numeric attributes either as numbers or
//! as numeric strings. Datasets accept both, falling back to the documented
//! default when a value cannot be interpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::BitOr;

/// Default number of samples for a dataset FFT
pub const DEFAULT_FFT_SAMPLES: usize = 256;

/// Default sampling rate (Hz) for a dataset FFT
pub const DEFAULT_FFT_SAMPLING_RATE: f64 = 100.0;

/// Widget attached to an individual dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DatasetWidget {
    /// No dedicated widget
    #[default]
    None,
    /// Horizontal/vertical bar
    Bar,
    /// Radial gauge
    Gauge,
    /// Compass rose
    Compass,
}

impl DatasetWidget {
    /// Identifier used in project files
    pub fn id(&self) -> &'static str {
        match self {
            DatasetWidget::None => "",
            DatasetWidget::Bar => "bar",
            DatasetWidget::Gauge => "gauge",
            DatasetWidget::Compass => "compass",
        }
    }

    /// Parse a widget identifier, unknown identifiers map to `None`
    pub fn from_id(id: &str) -> Self {
        match id.trim() {
            "bar" => DatasetWidget::Bar,
            "gauge" => DatasetWidget::Gauge,
            "compass" => DatasetWidget::Compass,
            _ => DatasetWidget::None,
        }
    }
}

impl From<String> for DatasetWidget {
    fn from(id: String) -> Self {
        DatasetWidget::from_id(&id)
    }
}

impl From<DatasetWidget> for String {
    fn from(widget: DatasetWidget) -> Self {
        widget.id().to_string()
    }
}

/// Widget attached to a whole group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupWidget {
    DataGrid,
    Accelerometer,
    Gyroscope,
    Gps,
    MultiPlot,
    #[default]
    None,
}

impl GroupWidget {
    /// Identifier used in project files
    pub fn id(&self) -> &'static str {
        match self {
            GroupWidget::DataGrid => "datagrid",
            GroupWidget::Accelerometer => "accelerometer",
            GroupWidget::Gyroscope => "gyro",
            GroupWidget::Gps => "map",
            GroupWidget::MultiPlot => "multiplot",
            GroupWidget::None => "",
        }
    }

    /// Parse a widget identifier, unknown identifiers map to `None`
    pub fn from_id(id: &str) -> Self {
        match id.trim() {
            "datagrid" => GroupWidget::DataGrid,
            "accelerometer" => GroupWidget::Accelerometer,
            "gyro" | "gyroscope" => GroupWidget::Gyroscope,
            "map" | "gps" => GroupWidget::Gps,
            "multiplot" => GroupWidget::MultiPlot,
            _ => GroupWidget::None,
        }
    }

    /// Dashboard widget generated by a group with this widget
    pub fn dashboard_widget(&self) -> Option<DashboardWidget> {
        match self {
            GroupWidget::DataGrid => Some(DashboardWidget::DataGrid),
            GroupWidget::Accelerometer => Some(DashboardWidget::Accelerometer),
            GroupWidget::Gyroscope => Some(DashboardWidget::Gyroscope),
            GroupWidget::Gps => Some(DashboardWidget::Gps),
            GroupWidget::MultiPlot => Some(DashboardWidget::MultiPlot),
            GroupWidget::None => None,
        }
    }
}

/// Kinds of dashboard widgets a frame can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardWidget {
    DataGrid,
    MultiPlot,
    Accelerometer,
    Gyroscope,
    Gps,
    Fft,
    Led,
    Plot,
    Bar,
    Gauge,
    Compass,
}

/// Combinable per-dataset visualization options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DatasetOptions(u8);

impl DatasetOptions {
    pub const NONE: DatasetOptions = DatasetOptions(0);
    pub const PLOT: DatasetOptions = DatasetOptions(1);
    pub const FFT: DatasetOptions = DatasetOptions(2);
    pub const BAR: DatasetOptions = DatasetOptions(4);
    pub const GAUGE: DatasetOptions = DatasetOptions(8);
    pub const COMPASS: DatasetOptions = DatasetOptions(16);
    pub const LED: DatasetOptions = DatasetOptions(32);

    /// Raw bit representation
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub fn contains(&self, other: DatasetOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DatasetOptions {
    type Output = DatasetOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        DatasetOptions(self.0 | rhs.0)
    }
}

/// One scalar measurement of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Position of the owning group within the frame
    #[serde(skip)]
    pub group_id: usize,
    /// Position within the owning group
    #[serde(skip)]
    pub dataset_id: usize,
    /// 1-based position within the parsed field list
    #[serde(default, deserialize_with = "lenient_i64")]
    pub index: i64,
    #[serde(default, alias = "t", deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, alias = "u", deserialize_with = "lenient_string")]
    pub units: String,
    /// Last received value, may be non-numeric
    #[serde(default, alias = "v", deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(default, alias = "w")]
    pub widget: DatasetWidget,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub alarm: f64,
    #[serde(default = "default_led_high", deserialize_with = "lenient_f64")]
    pub led_high: f64,
    #[serde(default)]
    pub graph: bool,
    #[serde(default)]
    pub fft: bool,
    #[serde(default)]
    pub led: bool,
    #[serde(default)]
    pub log: bool,
    #[serde(default = "default_fft_samples", deserialize_with = "lenient_fft_samples")]
    pub fft_samples: usize,
    #[serde(
        default = "default_fft_sampling_rate",
        deserialize_with = "lenient_sampling_rate"
    )]
    pub fft_sampling_rate: f64,
}

fn default_led_high() -> f64 {
    1.0
}

fn default_fft_samples() -> usize {
    DEFAULT_FFT_SAMPLES
}

fn default_fft_sampling_rate() -> f64 {
    DEFAULT_FFT_SAMPLING_RATE
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            group_id: 0,
            dataset_id: 0,
            index: 0,
            title: String::new(),
            units: String::new(),
            value: String::new(),
            widget: DatasetWidget::None,
            min: 0.0,
            max: 0.0,
            alarm: 0.0,
            led_high: default_led_high(),
            graph: false,
            fft: false,
            led: false,
            log: false,
            fft_samples: DEFAULT_FFT_SAMPLES,
            fft_sampling_rate: DEFAULT_FFT_SAMPLING_RATE,
        }
    }
}

impl Dataset {
    /// Create a dataset bound to a field index
    pub fn new(title: impl Into<String>, index: i64) -> Self {
        Self {
            title: title.into(),
            index,
            ..Default::default()
        }
    }

    /// Visualization options derived from the dataset flags and widget
    pub fn options(&self) -> DatasetOptions {
        let mut options = DatasetOptions::NONE;
        if self.graph {
            options = options | DatasetOptions::PLOT;
        }
        if self.fft {
            options = options | DatasetOptions::FFT;
        }
        if self.led {
            options = options | DatasetOptions::LED;
        }
        match self.widget {
            DatasetWidget::Bar => options | DatasetOptions::BAR,
            DatasetWidget::Gauge => options | DatasetOptions::GAUGE,
            DatasetWidget::Compass => options | DatasetOptions::COMPASS,
            DatasetWidget::None => options,
        }
    }

    /// Dashboard widgets generated by this dataset
    pub fn dashboard_widgets(&self) -> Vec<DashboardWidget> {
        let options = self.options();
        [
            (DatasetOptions::PLOT, DashboardWidget::Plot),
            (DatasetOptions::FFT, DashboardWidget::Fft),
            (DatasetOptions::LED, DashboardWidget::Led),
            (DatasetOptions::BAR, DashboardWidget::Bar),
            (DatasetOptions::GAUGE, DashboardWidget::Gauge),
            (DatasetOptions::COMPASS, DashboardWidget::Compass),
        ]
        .into_iter()
        .filter(|(flag, _)| options.contains(*flag))
        .map(|(_, widget)| widget)
        .collect()
    }

    /// Numeric interpretation of the current value
    ///
    /// Returns `None` for non-numeric values, which consumers treat as
    /// "no data point this frame".
    pub fn numeric_value(&self) -> Option<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// Whether the value exceeds a configured alarm threshold
    pub fn is_alarm(&self) -> bool {
        self.alarm != 0.0 && self.numeric_value().is_some_and(|v| v >= self.alarm)
    }

    /// Whether an LED bound to this dataset should be lit
    pub fn led_on(&self) -> bool {
        self.numeric_value().is_some_and(|v| v >= self.led_high)
    }

    /// Whether the configured min/max describe a usable range
    pub fn has_range(&self) -> bool {
        self.min != self.max
    }
}

/// A named collection of datasets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    #[serde(skip)]
    pub group_id: usize,
    pub title: String,
    pub widget: String,
    pub datasets: Vec<Dataset>,
}

impl Group {
    pub fn new(title: impl Into<String>, widget: impl Into<String>) -> Self {
        Self {
            group_id: 0,
            title: title.into(),
            widget: widget.into(),
            datasets: Vec::new(),
        }
    }

    /// Read a group from its JSON description
    ///
    /// The title is whitespace-simplified. Groups without a title or without
    /// datasets are rejected. Datasets that cannot be read are dropped; a group
    /// left with no datasets is rejected as well.
    pub fn from_json(value: &Value, group_id: usize) -> Option<Group> {
        let object = value.as_object()?;
        let title = object
            .get("title")
            .or_else(|| object.get("t"))
            .and_then(Value::as_str)
            .map(simplify_whitespace)
            .unwrap_or_default();
        if title.is_empty() {
            return None;
        }

        let widget = object
            .get("widget")
            .or_else(|| object.get("w"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let entries = object
            .get("datasets")
            .or_else(|| object.get("d"))
            .and_then(Value::as_array)?;

        let mut datasets = Vec::with_capacity(entries.len());
        for entry in entries {
            // Serde would also accept the sequence form of a dataset
            if !entry.is_object() {
                tracing::debug!("Dropping non-object dataset in group '{}'", title);
                continue;
            }
            match serde_json::from_value::<Dataset>(entry.clone()) {
                Ok(mut dataset) => {
                    dataset.title = simplify_whitespace(&dataset.title);
                    dataset.group_id = group_id;
                    dataset.dataset_id = datasets.len();
                    datasets.push(dataset);
                }
                Err(e) => {
                    tracing::debug!("Dropping unreadable dataset in group '{}': {}", title, e);
                }
            }
        }

        if datasets.is_empty() {
            return None;
        }

        Some(Group {
            group_id,
            title,
            widget,
            datasets,
        })
    }

    /// Serialize the group into its JSON description
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "widget": self.widget,
            "datasets": self.datasets,
        })
    }

    /// Typed view of the widget identifier
    pub fn widget_kind(&self) -> GroupWidget {
        GroupWidget::from_id(&self.widget)
    }
}

/// A fully built frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub title: String,
    pub groups: Vec<Group>,
    /// Raw field list the frame was bound from
    pub fields: Vec<String>,
    /// Monotonically increasing per builder
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
}

impl Frame {
    /// Group tree used by external consumers
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "title": self.title,
            "groups": self.groups.iter().map(Group::to_json).collect::<Vec<_>>(),
        })
    }

    /// Iterate over every dataset of every group
    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.groups.iter().flat_map(|g| g.datasets.iter())
    }

    pub fn dataset_count(&self) -> usize {
        self.groups.iter().map(|g| g.datasets.len()).sum()
    }

    /// Whether two frames share the same group/dataset layout
    pub fn same_structure(&self, other: &Frame) -> bool {
        self.groups.len() == other.groups.len()
            && self.groups.iter().zip(&other.groups).all(|(a, b)| {
                a.title == b.title
                    && a.widget == b.widget
                    && a.datasets.len() == b.datasets.len()
                    && a.datasets
                        .iter()
                        .zip(&b.datasets)
                        .all(|(x, y)| x.title == y.title && x.options() == y.options())
            })
    }
}

/// Statistics reported by the session pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Payloads extracted by the frame detector
    pub payloads_received: u64,
    /// Frames successfully built and emitted
    pub frames_built: u64,
    /// Payloads that failed to decode, parse or bind
    pub frames_dropped: u64,
    /// Payloads evicted from a full work queue
    pub queue_drops: u64,
    /// Payloads discarded because they belonged to an older configuration
    pub stale_payloads: u64,
    /// Detector buffers discarded for exceeding the size cap
    pub buffer_overflows: u64,
    /// Raw bytes fed to the detector
    pub bytes_received: u64,
}

impl PipelineStats {
    /// Percentage of processed payloads that produced a frame
    pub fn success_rate(&self) -> f64 {
        let total = self.frames_built + self.frames_dropped;
        if total == 0 {
            100.0
        } else {
            (self.frames_built as f64 / total as f64) * 100.0
        }
    }
}

/// Trim and collapse internal whitespace runs into single spaces
pub fn simplify_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn scalar_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    scalar_to_string(&value).ok_or_else(|| serde::de::Error::custom("expected a scalar value"))
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_f64(&value).filter(|v| v.is_finite()).unwrap_or(0.0))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_f64(&value)
        .filter(|v| v.is_finite())
        .map(|v| v as i64)
        .unwrap_or(0))
}

fn lenient_fft_samples<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_f64(&value)
        .filter(|v| v.is_finite() && *v >= 1.0)
        .map(|v| v as usize)
        .unwrap_or(DEFAULT_FFT_SAMPLES))
}

fn lenient_sampling_rate<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(scalar_to_f64(&value)
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(DEFAULT_FFT_SAMPLING_RATE))
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.units.is_empty() {
            write!(f, "{}: {}", self.title, self.value)
        } else {
            write!(f, "{}: {} {}", self.title, self.value, self.units)
        }
    }
}
